//! CLI commands for the ledger
//!
//! Implements the command handlers behind the `ledger` binary.

use crate::config::LedgerConfig;
use crate::crypto::KdfParams;
use crate::mining::MineOutcome;
use crate::service::LedgerContext;
use crate::wallet::Wallet;
use std::fs;
use std::path::Path;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Build the effective config from an optional file plus flag overrides
pub fn resolve_config(
    config_path: Option<&Path>,
    difficulty: Option<usize>,
    reward: Option<u64>,
) -> CliResult<LedgerConfig> {
    let mut config = match config_path {
        Some(path) => LedgerConfig::load(path)?,
        None => LedgerConfig::default(),
    };
    if let Some(d) = difficulty {
        config.chain.pow.zero_count = d;
    }
    if let Some(r) = reward {
        config.chain.block_reward = r;
    }
    Ok(config)
}

/// Generate a sealed key and print it with its public key
pub fn cmd_keygen(password: &str, wallet_out: Option<&Path>) -> CliResult<()> {
    let wallet = Wallet::generate(password, KdfParams::default())?;

    println!("🔐 New key generated!");
    println!("   🔑 Public key: {}", wallet.public_key());
    println!("   🔒 Sealed key: {}", wallet.sealed_key());

    if let Some(path) = wallet_out {
        wallet.save(path)?;
        println!("   📁 Saved to {:?}", path);
    }

    Ok(())
}

fn report_round(label: &str, outcome: &MineOutcome) -> bool {
    let stats = outcome.stats();
    match outcome {
        MineOutcome::Mined { block, .. } => {
            println!("\n   {} mined!", label);
            println!("   ├─ Hash: {}", &block.hash()[..16]);
            println!("   ├─ Transactions: {}", block.tx_count());
            println!("   ├─ Time: {}ms", stats.elapsed_ms);
            println!("   ├─ Attempts: {}", stats.attempts);
            println!("   └─ Hash rate: {:.2} H/s", stats.hash_rate);
            true
        }
        MineOutcome::Exhausted { .. } => {
            println!("⏱️  {} not found within budget ({} attempts)", label, stats.attempts);
            false
        }
        MineOutcome::Cancelled { .. } => {
            println!("📴 {} cancelled after {} attempts", label, stats.attempts);
            false
        }
    }
}

/// Scripted session: the creator mines, pays a second wallet, mines again
pub async fn cmd_demo(config: LedgerConfig, output: Option<&Path>) -> CliResult<()> {
    println!(
        "⛏️  Starting demo ledger (difficulty {}, reward {})",
        config.chain.pow.zero_count, config.chain.block_reward
    );
    println!(
        "   Expected attempts per block: {:.0}",
        config.chain.pow.expected_attempts()
    );

    let reward = config.chain.block_reward;
    let ledger = LedgerContext::new(config);
    let creator = Wallet::generate("creator", KdfParams::default())?.with_label("creator");
    let receiver = Wallet::generate("receiver", KdfParams::default())?.with_label("receiver");

    let outcome = ledger.mine_once(creator.public_key()).await?;
    if !report_round("Block 1", &outcome) {
        return Ok(());
    }

    let amount = (reward / 2).max(1);
    let tx_id = ledger
        .transfer(&creator, vec![receiver.public_key().to_string()], vec![amount])
        .await?;
    println!("\n📤 Transfer of {} coins submitted: {}", amount, &tx_id[..16]);

    let outcome = ledger.mine_once(creator.public_key()).await?;
    if !report_round("Block 2", &outcome) {
        return Ok(());
    }

    println!("\n💰 Balances");
    for wallet in [&creator, &receiver] {
        println!(
            "   {}: {} coins",
            wallet.label.as_deref().unwrap_or("-"),
            ledger.get_balance(wallet.public_key()).await
        );
    }

    let stats = ledger.chain_stats().await;
    println!("\n⛓️  Chain");
    println!("   ├─ Height: {}", stats.height);
    println!("   ├─ Total transactions: {}", stats.total_transactions);
    println!("   ├─ Total coins: {}", stats.total_coins);
    println!("   └─ Latest hash: {}...", &stats.latest_hash[..32]);

    let json = serde_json::to_string_pretty(&ledger.chain_json().await)?;
    match output {
        Some(path) => {
            fs::write(path, json)?;
            println!("\n📁 Chain written to {:?}", path);
        }
        None => println!("\n{}", json),
    }

    Ok(())
}
