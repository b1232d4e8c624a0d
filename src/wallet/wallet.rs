//! Wallet implementation for the ledger
//!
//! A wallet wraps one password-sealed private key and builds signed
//! transfers from the outputs the chain says it owns.

use crate::core::{Blockchain, Transaction, TransactionError, UnsignedTransaction, Utxo};
use crate::crypto::{derive_public_key, generate_sealed_key_with, KdfParams, KeyError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Wallet-related errors
#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Insufficient funds: have {have}, need {need}")]
    InsufficientFunds { have: u64, need: u64 },
    #[error("Transaction error: {0}")]
    TransactionError(#[from] TransactionError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Crypto error: {0}")]
    CryptoError(#[from] KeyError),
}

/// On-disk wallet form; the password is never written
#[derive(Debug, Serialize, Deserialize)]
struct WalletData {
    sealed_key: String,
    public_key: String,
    label: Option<String>,
}

/// A wallet for one sealed key
pub struct Wallet {
    sealed_key: String,
    password: String,
    public_key: String,
    /// Optional label for the wallet
    pub label: Option<String>,
}

impl Wallet {
    /// Open a wallet from an existing sealed key
    pub fn from_sealed_key(sealed_key: &str, password: &str) -> Result<Self, WalletError> {
        let public_key = derive_public_key(sealed_key, password)?;
        Ok(Self {
            sealed_key: sealed_key.to_string(),
            password: password.to_string(),
            public_key,
            label: None,
        })
    }

    /// Create a wallet around a freshly generated key
    pub fn generate(password: &str, kdf: KdfParams) -> Result<Self, WalletError> {
        let sealed_key = generate_sealed_key_with(password, kdf)?;
        Self::from_sealed_key(&sealed_key, password)
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    /// Get the wallet's public key (hex), which is also its ledger identity
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn sealed_key(&self) -> &str {
        &self.sealed_key
    }

    /// Get the balance from the blockchain
    pub fn balance(&self, blockchain: &Blockchain) -> u64 {
        blockchain.get_balance(&self.public_key)
    }

    /// Unspent outputs owned by this wallet
    pub fn utxos(&self, blockchain: &Blockchain) -> Vec<Utxo> {
        blockchain
            .get_utxos(&self.public_key)
            .into_iter()
            .filter(|utxo| blockchain.is_valid_utxo(utxo))
            .collect()
    }

    /// Create a signed transaction paying `amounts[i]` to `receivers[i]`.
    ///
    /// Outputs are selected in chain order until they cover the total. Any
    /// surplus comes back to the wallet as a final change output.
    pub fn create_transaction(
        &self,
        blockchain: &Blockchain,
        receivers: Vec<String>,
        amounts: Vec<u64>,
    ) -> Result<Transaction, WalletError> {
        let need = amounts
            .iter()
            .try_fold(0u64, |acc, a| acc.checked_add(*a))
            .ok_or(TransactionError::AmountOverflow)?;

        let mut selected = Vec::new();
        let mut selected_amount = 0u64;
        for utxo in self.utxos(blockchain) {
            if selected_amount >= need && !selected.is_empty() {
                break;
            }
            selected_amount = selected_amount.saturating_add(utxo.amount);
            selected.push(utxo);
        }

        if selected_amount < need || selected.is_empty() {
            return Err(WalletError::InsufficientFunds {
                have: selected_amount,
                need,
            });
        }

        let (mut receivers, mut amounts) = (receivers, amounts);
        let change = selected_amount - need;
        if change > 0 {
            receivers.push(self.public_key.clone());
            amounts.push(change);
        }

        let tx = UnsignedTransaction::new(selected, receivers, amounts)?
            .sign(&self.sealed_key, &self.password)?;
        tx.validate()?;
        Ok(tx)
    }

    /// Save the sealed key to file
    pub fn save(&self, path: &Path) -> Result<(), WalletError> {
        let data = WalletData {
            sealed_key: self.sealed_key.clone(),
            public_key: self.public_key.clone(),
            label: self.label.clone(),
        };

        let json = serde_json::to_string_pretty(&data)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load wallet from file, unsealing with `password`
    pub fn load(path: &Path, password: &str) -> Result<Self, WalletError> {
        let json = fs::read_to_string(path)?;
        let data: WalletData = serde_json::from_str(&json)?;

        let mut wallet = Self::from_sealed_key(&data.sealed_key, password)?;
        wallet.label = data.label;
        Ok(wallet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ChainParams, GenesisAllocation, PowTarget};
    use crate::mining::{Mempool, Miner, MiningBudget};
    use tempfile::tempdir;

    fn light() -> KdfParams {
        KdfParams::new(64, 1)
    }

    fn funded_chain(owner: &str, amount: u64) -> Blockchain {
        Blockchain::new(ChainParams {
            pow: PowTarget::new(1, 1),
            block_reward: 50,
            genesis: Some(GenesisAllocation {
                public_key: owner.to_string(),
                amount,
            }),
        })
    }

    #[test]
    fn test_wallet_identity() {
        let wallet = Wallet::generate("pw", light()).unwrap();
        assert_eq!(wallet.public_key().len(), 66);
        assert_eq!(
            derive_public_key(wallet.sealed_key(), "pw").unwrap(),
            wallet.public_key()
        );
        assert!(matches!(
            Wallet::from_sealed_key(wallet.sealed_key(), "nope"),
            Err(WalletError::CryptoError(KeyError::WrongPassword))
        ));
    }

    #[test]
    fn test_create_transaction_with_change() {
        let wallet = Wallet::generate("pw", light()).unwrap();
        let chain = funded_chain(wallet.public_key(), 100);

        let tx = wallet
            .create_transaction(&chain, vec!["bob".to_string()], vec![30])
            .unwrap();

        assert!(tx.is_valid());
        assert_eq!(tx.amounts(), &[30, 70]);
        assert_eq!(tx.receiver_public_keys()[1], wallet.public_key());
        assert_eq!(tx.burned().unwrap(), 0);
    }

    #[test]
    fn test_selection_spans_outputs() {
        let wallet = Wallet::generate("pw", light()).unwrap();
        let mut chain = funded_chain(wallet.public_key(), 100);
        let mut mempool = Mempool::new();
        Miner::new(wallet.public_key())
            .mine_once(&mut chain, &mut mempool, &MiningBudget::unbounded())
            .unwrap();
        assert_eq!(wallet.balance(&chain), 150);

        let tx = wallet
            .create_transaction(&chain, vec!["bob".to_string()], vec![120])
            .unwrap();
        assert_eq!(tx.inputs().len(), 2);
        assert_eq!(tx.total_output().unwrap(), 150);
    }

    #[test]
    fn test_insufficient_funds() {
        let wallet = Wallet::generate("pw", light()).unwrap();
        let chain = funded_chain(wallet.public_key(), 100);

        let result = wallet.create_transaction(&chain, vec!["bob".to_string()], vec![101]);
        assert!(matches!(
            result,
            Err(WalletError::InsufficientFunds { have: 100, need: 101 })
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wallet.json");
        let wallet = Wallet::generate("pw", light()).unwrap().with_label("alice");
        wallet.save(&path).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert!(!contents.contains("\"pw\""));

        let loaded = Wallet::load(&path, "pw").unwrap();
        assert_eq!(loaded.public_key(), wallet.public_key());
        assert_eq!(loaded.label.as_deref(), Some("alice"));
        assert!(Wallet::load(&path, "wrong").is_err());
    }
}
