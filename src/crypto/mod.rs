//! Cryptographic capability consumed by the ledger
//!
//! This module provides:
//! - SHA-256 hashing and the hex leading-zero target check
//! - ECDSA key management (secp256k1) with password-sealed private keys
//! - Merkle roots over transaction ids

pub mod hash;
pub mod keys;
pub mod merkle;

pub use hash::{meets_target, sha256, sha256_hex};
pub use keys::{
    derive_public_key, generate_sealed_key, generate_sealed_key_with, public_key_from_hex,
    sign_message, sign_with_password, verify_hex_signature, verify_signature, KdfParams,
    KeyError, KeyPair,
};
pub use merkle::{calculate_merkle_root, transactions_root};
