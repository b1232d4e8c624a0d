//! Transaction handling for the ledger
//!
//! Implements a UTXO-based transaction model with password-sealed signing.
//! A regular transaction spends previously recorded outputs and pays one
//! or more receivers; a coinbase mints the block reward and spends nothing.
//! Any value the inputs carry beyond the outputs is burned.

use crate::crypto::{sha256_hex, sign_with_password, verify_hex_signature, KeyError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Transaction validation errors
#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Transaction has no inputs")]
    NoInputs,
    #[error("Transaction has no receivers")]
    NoReceivers,
    #[error("Receiver/amount mismatch: {receivers} receivers, {amounts} amounts")]
    LengthMismatch { receivers: usize, amounts: usize },
    #[error("Output {0} has a zero amount")]
    ZeroAmount(usize),
    #[error("Input {0} is referenced more than once")]
    DuplicateInput(OutPoint),
    #[error("Unbalanced transaction: inputs carry {inputs}, outputs pay {outputs}")]
    Unbalanced { inputs: u64, outputs: u64 },
    #[error("Amount overflow")]
    AmountOverflow,
    #[error("Signature does not verify for input owner {0}")]
    InvalidSignature(String),
    #[error("Crypto error: {0}")]
    CryptoError(#[from] KeyError),
}

// Derived Serialize impls over strings and integers cannot fail
fn canonical_json<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).unwrap_or_default()
}

// =============================================================================
// UTXO
// =============================================================================

/// Reference to one output of a recorded transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    pub tx_id: String,
    pub output_index: u32,
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_id, self.output_index)
    }
}

/// Unspent Transaction Output (UTXO)
///
/// Spentness is never stored here; it is derived from the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    /// Id of the transaction (or coinbase) that created this output
    pub tx_id: String,
    /// Position of the output in its transaction
    pub output_index: u32,
    /// Public key that owns the value
    pub owner: String,
    pub amount: u64,
}

impl Utxo {
    pub fn outpoint(&self) -> OutPoint {
        OutPoint {
            tx_id: self.tx_id.clone(),
            output_index: self.output_index,
        }
    }

    /// Check if this output belongs to the given public key
    pub fn is_owned_by(&self, public_key: &str) -> bool {
        self.owner == public_key
    }
}

/// The bytes a transaction signature covers
#[derive(Serialize)]
struct SigningPayload<'a> {
    inputs: &'a [Utxo],
    receiver_public_keys: &'a [String],
    amounts: &'a [u64],
}

fn signing_payload(inputs: &[Utxo], receiver_public_keys: &[String], amounts: &[u64]) -> Vec<u8> {
    canonical_json(&SigningPayload {
        inputs,
        receiver_public_keys,
        amounts,
    })
}

fn checked_sum<'a>(mut amounts: impl Iterator<Item = &'a u64>) -> Result<u64, TransactionError> {
    amounts.try_fold(0u64, |acc, amount| {
        acc.checked_add(*amount)
            .ok_or(TransactionError::AmountOverflow)
    })
}

// =============================================================================
// Unsigned Transaction
// =============================================================================

/// A transaction body awaiting its owner's signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    inputs: Vec<Utxo>,
    receiver_public_keys: Vec<String>,
    amounts: Vec<u64>,
}

impl UnsignedTransaction {
    /// Build a transaction body; receivers and amounts are parallel
    pub fn new(
        inputs: Vec<Utxo>,
        receiver_public_keys: Vec<String>,
        amounts: Vec<u64>,
    ) -> Result<Self, TransactionError> {
        if receiver_public_keys.len() != amounts.len() {
            return Err(TransactionError::LengthMismatch {
                receivers: receiver_public_keys.len(),
                amounts: amounts.len(),
            });
        }
        Ok(Self {
            inputs,
            receiver_public_keys,
            amounts,
        })
    }

    /// Canonical bytes covered by the signature
    pub fn signing_data(&self) -> Vec<u8> {
        signing_payload(&self.inputs, &self.receiver_public_keys, &self.amounts)
    }

    /// Sign with a sealed private key, producing the immutable transaction
    pub fn sign(self, sealed_key: &str, password: &str) -> Result<Transaction, TransactionError> {
        let signature = sign_with_password(&self.signing_data(), sealed_key, password)?;
        Ok(Transaction {
            inputs: self.inputs,
            receiver_public_keys: self.receiver_public_keys,
            amounts: self.amounts,
            signature,
        })
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// A signed transfer of value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    inputs: Vec<Utxo>,
    receiver_public_keys: Vec<String>,
    amounts: Vec<u64>,
    /// Hex compact ECDSA signature over the signing data
    signature: String,
}

impl Transaction {
    /// Reassemble a transaction from its parts (e.g. received from a signer)
    pub fn from_parts(
        inputs: Vec<Utxo>,
        receiver_public_keys: Vec<String>,
        amounts: Vec<u64>,
        signature: String,
    ) -> Self {
        Self {
            inputs,
            receiver_public_keys,
            amounts,
            signature,
        }
    }

    /// Transaction id: SHA-256 of the canonical serialization
    pub fn id(&self) -> String {
        sha256_hex(&canonical_json(self))
    }

    pub fn inputs(&self) -> &[Utxo] {
        &self.inputs
    }

    pub fn receiver_public_keys(&self) -> &[String] {
        &self.receiver_public_keys
    }

    pub fn amounts(&self) -> &[u64] {
        &self.amounts
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Canonical bytes covered by the signature
    pub fn signing_data(&self) -> Vec<u8> {
        signing_payload(&self.inputs, &self.receiver_public_keys, &self.amounts)
    }

    /// Sum of declared input amounts
    pub fn total_input(&self) -> Result<u64, TransactionError> {
        checked_sum(self.inputs.iter().map(|u| &u.amount))
    }

    /// Sum of output amounts
    pub fn total_output(&self) -> Result<u64, TransactionError> {
        checked_sum(self.amounts.iter())
    }

    /// Value carried by the inputs but paid to nobody
    pub fn burned(&self) -> Result<u64, TransactionError> {
        Ok(self.total_input()?.saturating_sub(self.total_output()?))
    }

    /// Outputs this transaction creates once recorded
    pub fn outputs(&self) -> Vec<Utxo> {
        let tx_id = self.id();
        self.receiver_public_keys
            .iter()
            .zip(&self.amounts)
            .enumerate()
            .map(|(index, (owner, amount))| Utxo {
                tx_id: tx_id.clone(),
                output_index: index as u32,
                owner: owner.clone(),
                amount: *amount,
            })
            .collect()
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Structural, balance and signature checks.
    ///
    /// Does not consult the chain: whether the inputs are still unspent is
    /// decided by the miner and by block insertion.
    pub fn validate(&self) -> Result<(), TransactionError> {
        if self.inputs.is_empty() {
            return Err(TransactionError::NoInputs);
        }
        if self.receiver_public_keys.is_empty() {
            return Err(TransactionError::NoReceivers);
        }
        if self.receiver_public_keys.len() != self.amounts.len() {
            return Err(TransactionError::LengthMismatch {
                receivers: self.receiver_public_keys.len(),
                amounts: self.amounts.len(),
            });
        }
        if let Some(index) = self.amounts.iter().position(|a| *a == 0) {
            return Err(TransactionError::ZeroAmount(index));
        }

        let mut seen = HashSet::new();
        for input in &self.inputs {
            if !seen.insert(input.outpoint()) {
                return Err(TransactionError::DuplicateInput(input.outpoint()));
            }
        }

        let inputs = self.total_input()?;
        let outputs = self.total_output()?;
        if inputs < outputs {
            return Err(TransactionError::Unbalanced { inputs, outputs });
        }

        let signing_data = self.signing_data();
        let owners: BTreeSet<&str> = self.inputs.iter().map(|u| u.owner.as_str()).collect();
        for owner in owners {
            if !verify_hex_signature(&signing_data, &self.signature, owner) {
                return Err(TransactionError::InvalidSignature(owner.to_string()));
            }
        }

        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

// =============================================================================
// Coinbase
// =============================================================================

/// Reward-only transaction paying the miner of a block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coinbase {
    pub receiver_public_key: String,
    pub amount: u64,
    /// Height of the block this coinbase rewards; keeps ids unique
    pub height: u64,
}

impl Coinbase {
    pub fn new(receiver_public_key: &str, amount: u64, height: u64) -> Self {
        Self {
            receiver_public_key: receiver_public_key.to_string(),
            amount,
            height,
        }
    }

    pub fn id(&self) -> String {
        sha256_hex(&canonical_json(self))
    }

    /// The single output this coinbase mints
    pub fn output(&self) -> Utxo {
        Utxo {
            tx_id: self.id(),
            output_index: 0,
            owner: self.receiver_public_key.clone(),
            amount: self.amount,
        }
    }
}

// =============================================================================
// Block entries
// =============================================================================

/// An entry in a block: the leading coinbase or a signed transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockTransaction {
    Coinbase(Coinbase),
    Transfer(Transaction),
}

impl BlockTransaction {
    pub fn id(&self) -> String {
        match self {
            BlockTransaction::Coinbase(cb) => cb.id(),
            BlockTransaction::Transfer(tx) => tx.id(),
        }
    }

    pub fn is_coinbase(&self) -> bool {
        matches!(self, BlockTransaction::Coinbase(_))
    }

    /// Outputs consumed by this entry (none for a coinbase)
    pub fn inputs(&self) -> &[Utxo] {
        match self {
            BlockTransaction::Coinbase(_) => &[],
            BlockTransaction::Transfer(tx) => tx.inputs(),
        }
    }

    /// Outputs created by this entry
    pub fn outputs(&self) -> Vec<Utxo> {
        match self {
            BlockTransaction::Coinbase(cb) => vec![cb.output()],
            BlockTransaction::Transfer(tx) => tx.outputs(),
        }
    }

    /// A coinbase is unconditionally valid; placement is checked by the chain
    pub fn is_valid(&self) -> bool {
        match self {
            BlockTransaction::Coinbase(_) => true,
            BlockTransaction::Transfer(tx) => tx.is_valid(),
        }
    }

    pub fn as_transfer(&self) -> Option<&Transaction> {
        match self {
            BlockTransaction::Transfer(tx) => Some(tx),
            BlockTransaction::Coinbase(_) => None,
        }
    }

    pub fn as_coinbase(&self) -> Option<&Coinbase> {
        match self {
            BlockTransaction::Coinbase(cb) => Some(cb),
            BlockTransaction::Transfer(_) => None,
        }
    }
}

impl From<Transaction> for BlockTransaction {
    fn from(tx: Transaction) -> Self {
        BlockTransaction::Transfer(tx)
    }
}

impl From<Coinbase> for BlockTransaction {
    fn from(cb: Coinbase) -> Self {
        BlockTransaction::Coinbase(cb)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{derive_public_key, generate_sealed_key_with, KdfParams};

    fn key(password: &str) -> (String, String) {
        let sealed = generate_sealed_key_with(password, KdfParams::new(64, 1)).unwrap();
        let public_key = derive_public_key(&sealed, password).unwrap();
        (sealed, public_key)
    }

    fn utxo(owner: &str, amount: u64, index: u32) -> Utxo {
        Utxo {
            tx_id: "ab".repeat(32),
            output_index: index,
            owner: owner.to_string(),
            amount,
        }
    }

    #[test]
    fn test_signed_transaction_is_valid() {
        let (sealed, pk) = key("pw");
        let tx = UnsignedTransaction::new(
            vec![utxo(&pk, 100, 0)],
            vec!["receiver".to_string()],
            vec![40],
        )
        .unwrap()
        .sign(&sealed, "pw")
        .unwrap();

        assert!(tx.is_valid());
        // Surplus of 60 is burned, not rejected
        assert_eq!(tx.burned().unwrap(), 60);
    }

    #[test]
    fn test_tampered_amount_invalidates_signature() {
        let (sealed, pk) = key("pw");
        let tx = UnsignedTransaction::new(vec![utxo(&pk, 100, 0)], vec!["r".to_string()], vec![40])
            .unwrap()
            .sign(&sealed, "pw")
            .unwrap();

        let tampered = Transaction::from_parts(
            tx.inputs().to_vec(),
            tx.receiver_public_keys().to_vec(),
            vec![90],
            tx.signature().to_string(),
        );
        assert!(matches!(
            tampered.validate(),
            Err(TransactionError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_signature_must_match_every_input_owner() {
        let (sealed, pk) = key("pw");
        let (_, other_pk) = key("other");
        let tx = UnsignedTransaction::new(
            vec![utxo(&pk, 10, 0), utxo(&other_pk, 10, 1)],
            vec!["r".to_string()],
            vec![5],
        )
        .unwrap()
        .sign(&sealed, "pw")
        .unwrap();

        assert!(matches!(
            tx.validate(),
            Err(TransactionError::InvalidSignature(owner)) if owner == other_pk
        ));
    }

    #[test]
    fn test_wrong_password_cannot_sign() {
        let (sealed, pk) = key("pw");
        let result = UnsignedTransaction::new(vec![utxo(&pk, 10, 0)], vec!["r".to_string()], vec![5])
            .unwrap()
            .sign(&sealed, "not-the-password");
        assert!(matches!(
            result,
            Err(TransactionError::CryptoError(KeyError::WrongPassword))
        ));
    }

    #[test]
    fn test_length_mismatch() {
        let result = UnsignedTransaction::new(vec![], vec!["a".to_string()], vec![]);
        assert!(matches!(
            result,
            Err(TransactionError::LengthMismatch { receivers: 1, amounts: 0 })
        ));

        let tx = Transaction::from_parts(
            vec![utxo("o", 10, 0)],
            vec!["a".to_string(), "b".to_string()],
            vec![1],
            String::new(),
        );
        assert!(matches!(
            tx.validate(),
            Err(TransactionError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_unbalanced_rejected() {
        let (sealed, pk) = key("pw");
        let tx = UnsignedTransaction::new(vec![utxo(&pk, 10, 0)], vec!["r".to_string()], vec![11])
            .unwrap()
            .sign(&sealed, "pw")
            .unwrap();
        assert!(matches!(
            tx.validate(),
            Err(TransactionError::Unbalanced { inputs: 10, outputs: 11 })
        ));
    }

    #[test]
    fn test_duplicate_input_rejected() {
        let (sealed, pk) = key("pw");
        let tx = UnsignedTransaction::new(
            vec![utxo(&pk, 10, 0), utxo(&pk, 10, 0)],
            vec!["r".to_string()],
            vec![15],
        )
        .unwrap()
        .sign(&sealed, "pw")
        .unwrap();
        assert!(matches!(
            tx.validate(),
            Err(TransactionError::DuplicateInput(_))
        ));
    }

    #[test]
    fn test_structural_rejections() {
        let no_inputs = Transaction::from_parts(vec![], vec!["r".to_string()], vec![1], String::new());
        assert!(matches!(no_inputs.validate(), Err(TransactionError::NoInputs)));

        let no_receivers = Transaction::from_parts(vec![utxo("o", 1, 0)], vec![], vec![], String::new());
        assert!(matches!(
            no_receivers.validate(),
            Err(TransactionError::NoReceivers)
        ));

        let zero = Transaction::from_parts(
            vec![utxo("o", 1, 0)],
            vec!["r".to_string()],
            vec![0],
            String::new(),
        );
        assert!(matches!(zero.validate(), Err(TransactionError::ZeroAmount(0))));
    }

    #[test]
    fn test_amount_overflow_rejected() {
        let (sealed, pk) = key("pw");
        let tx = UnsignedTransaction::new(
            vec![utxo(&pk, u64::MAX, 0)],
            vec!["a".to_string(), "b".to_string()],
            vec![u64::MAX, 1],
        )
        .unwrap()
        .sign(&sealed, "pw")
        .unwrap();

        assert_eq!(tx.total_input().unwrap(), u64::MAX);
        assert!(matches!(tx.total_output(), Err(TransactionError::AmountOverflow)));
        assert!(matches!(tx.validate(), Err(TransactionError::AmountOverflow)));
    }

    #[test]
    fn test_outputs_reference_transaction_id() {
        let (sealed, pk) = key("pw");
        let tx = UnsignedTransaction::new(
            vec![utxo(&pk, 100, 0)],
            vec!["a".to_string(), "b".to_string()],
            vec![30, 70],
        )
        .unwrap()
        .sign(&sealed, "pw")
        .unwrap();

        let outputs = tx.outputs();
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[1].tx_id, tx.id());
        assert_eq!(outputs[1].output_index, 1);
        assert_eq!(outputs[1].owner, "b");
        assert_eq!(outputs[1].amount, 70);
    }

    #[test]
    fn test_coinbase_ids_unique_per_height() {
        let cb1 = Coinbase::new("miner", 50, 1);
        let cb2 = Coinbase::new("miner", 50, 2);
        assert_ne!(cb1.id(), cb2.id());

        let entry = BlockTransaction::from(cb1.clone());
        assert!(entry.is_coinbase());
        assert!(entry.is_valid());
        assert!(entry.inputs().is_empty());
        assert_eq!(entry.outputs(), vec![cb1.output()]);
    }

    #[test]
    fn test_block_transaction_serde_tag() {
        let entry = BlockTransaction::from(Coinbase::new("miner", 50, 1));
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["kind"], "coinbase");

        let back: BlockTransaction = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }
}
