//! ECDSA key management for the ledger
//!
//! Provides key pair generation, signing, and verification using the
//! secp256k1 elliptic curve, plus password-sealed private keys. A sealed
//! key is the only private-key form the rest of the crate ever handles:
//! every signing operation takes the sealed key together with its password.

use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::{
    aead::{Aead, NewAead},
    Key, XChaCha20Poly1305, XNonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use thiserror::Error;

use super::hash::sha256;

const SEALED_KEY_VERSION: u8 = 1;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 24;
const HEADER_LEN: usize = 1 + 4 + 4 + SALT_LEN + NONCE_LEN;

/// Upper bounds on KDF costs accepted from a sealed key (1 GiB, 16 passes)
pub const MAX_KDF_MEM_KIB: u32 = 1024 * 1024;
pub const MAX_KDF_TIME_COST: u32 = 16;

/// Errors that can occur during key operations
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid private key")]
    InvalidPrivateKey,
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Malformed sealed key: {0}")]
    MalformedSealedKey(String),
    #[error("Wrong password for sealed key")]
    WrongPassword,
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),
    #[error("Secp256k1 error: {0}")]
    Secp256k1Error(#[from] secp256k1::Error),
}

/// Argon2id cost parameters used when sealing a private key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub mem_kib: u32,
    /// Number of iterations
    pub time_cost: u32,
}

impl KdfParams {
    pub fn new(mem_kib: u32, time_cost: u32) -> Self {
        Self { mem_kib, time_cost }
    }

    fn check_bounds(&self) -> Result<(), KeyError> {
        if self.mem_kib > MAX_KDF_MEM_KIB || self.time_cost > MAX_KDF_TIME_COST {
            return Err(KeyError::MalformedSealedKey(format!(
                "KDF cost {} KiB x {} exceeds limit",
                self.mem_kib, self.time_cost
            )));
        }
        Ok(())
    }

    fn derive_key(&self, password: &str, salt: &[u8]) -> Result<[u8; 32], KeyError> {
        self.check_bounds()?;
        let params = Params::new(self.mem_kib, self.time_cost, 1, None)
            .map_err(|e| KeyError::KeyDerivation(e.to_string()))?;
        let mut key = [0u8; 32];
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
            .hash_password_into(password.as_bytes(), salt, &mut key)
            .map_err(|e| KeyError::KeyDerivation(e.to_string()))?;
        Ok(key)
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            mem_kib: 19 * 1024,
            time_cost: 2,
        }
    }
}

/// A key pair consisting of a private key and its corresponding public key
#[derive(Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut OsRng);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create a key pair from an existing secret key
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Get the public key as a hex string (compressed format)
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key.serialize())
    }

    /// Sign a message with the private key
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, KeyError> {
        sign_message(&self.secret_key, message)
    }

    /// Seal the private key under a password.
    ///
    /// Layout before hex encoding:
    /// `version | mem_kib (LE) | time_cost (LE) | salt | nonce | ciphertext`.
    pub fn seal(&self, password: &str, kdf: KdfParams) -> Result<String, KeyError> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let mut secret = self.secret_key.secret_bytes();
        let mut key = kdf.derive_key(password, &salt)?;
        let cipher = XChaCha20Poly1305::new(Key::from_slice(&key));
        let encrypted = cipher.encrypt(XNonce::from_slice(&nonce), &secret[..]);
        key.iter_mut().for_each(|b| *b = 0);
        secret.iter_mut().for_each(|b| *b = 0);
        let ciphertext =
            encrypted.map_err(|_| KeyError::KeyDerivation("encryption failed".to_string()))?;

        let mut sealed = Vec::with_capacity(HEADER_LEN + ciphertext.len());
        sealed.push(SEALED_KEY_VERSION);
        sealed.extend_from_slice(&kdf.mem_kib.to_le_bytes());
        sealed.extend_from_slice(&kdf.time_cost.to_le_bytes());
        sealed.extend_from_slice(&salt);
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(hex::encode(sealed))
    }

    /// Open a sealed private key with its password
    pub fn unseal(sealed_hex: &str, password: &str) -> Result<Self, KeyError> {
        let sealed = hex::decode(sealed_hex)
            .map_err(|_| KeyError::MalformedSealedKey("not hex".to_string()))?;
        if sealed.len() <= HEADER_LEN {
            return Err(KeyError::MalformedSealedKey("too short".to_string()));
        }
        if sealed[0] != SEALED_KEY_VERSION {
            return Err(KeyError::MalformedSealedKey(format!(
                "unsupported version {}",
                sealed[0]
            )));
        }

        let read_u32 = |at: usize| {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(&sealed[at..at + 4]);
            u32::from_le_bytes(buf)
        };
        let kdf = KdfParams::new(read_u32(1), read_u32(5));
        let salt_start = 9;
        let nonce_start = salt_start + SALT_LEN;
        let salt = &sealed[salt_start..nonce_start];
        let nonce = &sealed[nonce_start..HEADER_LEN];
        let ciphertext = &sealed[HEADER_LEN..];

        let mut key = kdf.derive_key(password, salt)?;
        let cipher = XChaCha20Poly1305::new(Key::from_slice(&key));
        let decrypted = cipher.decrypt(XNonce::from_slice(nonce), ciphertext);
        key.iter_mut().for_each(|b| *b = 0);

        let mut secret_bytes = decrypted.map_err(|_| KeyError::WrongPassword)?;
        let secret_key = SecretKey::from_slice(&secret_bytes);
        secret_bytes.iter_mut().for_each(|b| *b = 0);

        Ok(Self::from_secret_key(
            secret_key.map_err(|_| KeyError::InvalidPrivateKey)?,
        ))
    }
}

/// Generate a fresh key and return it sealed under `password`
pub fn generate_sealed_key(password: &str) -> Result<String, KeyError> {
    generate_sealed_key_with(password, KdfParams::default())
}

/// Generate a fresh sealed key with explicit KDF costs
pub fn generate_sealed_key_with(password: &str, kdf: KdfParams) -> Result<String, KeyError> {
    KeyPair::generate().seal(password, kdf)
}

/// Derive the public identity string of a sealed private key
pub fn derive_public_key(sealed_key: &str, password: &str) -> Result<String, KeyError> {
    Ok(KeyPair::unseal(sealed_key, password)?.public_key_hex())
}

/// Sign `message` with a sealed private key, returning a hex signature
pub fn sign_with_password(
    message: &[u8],
    sealed_key: &str,
    password: &str,
) -> Result<String, KeyError> {
    let key_pair = KeyPair::unseal(sealed_key, password)?;
    Ok(hex::encode(key_pair.sign(message)?))
}

/// Parse a public key from hex string
pub fn public_key_from_hex(hex_key: &str) -> Result<PublicKey, KeyError> {
    let bytes = hex::decode(hex_key).map_err(|_| KeyError::InvalidPublicKey)?;
    PublicKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPublicKey)
}

/// Sign a message with a secret key
pub fn sign_message(secret_key: &SecretKey, message: &[u8]) -> Result<Vec<u8>, KeyError> {
    let secp = Secp256k1::new();
    let hash = message_digest(message);

    let message = Message::from_digest_slice(&hash)?;
    let signature = secp.sign_ecdsa(&message, secret_key);
    Ok(signature.serialize_compact().to_vec())
}

/// Verify a signature against a public key
pub fn verify_signature(
    public_key: &PublicKey,
    message: &[u8],
    signature: &[u8],
) -> Result<bool, KeyError> {
    let secp = Secp256k1::new();
    let hash = message_digest(message);

    let message = Message::from_digest_slice(&hash)?;
    let sig = secp256k1::ecdsa::Signature::from_compact(signature)
        .map_err(|_| KeyError::InvalidSignature)?;

    match secp.verify_ecdsa(&message, &sig, public_key) {
        Ok(()) => Ok(true),
        Err(_) => Ok(false),
    }
}

/// Verify a hex signature against a hex public key.
///
/// Malformed keys or signatures simply fail verification.
pub fn verify_hex_signature(message: &[u8], signature_hex: &str, public_key_hex: &str) -> bool {
    let Ok(public_key) = public_key_from_hex(public_key_hex) else {
        return false;
    };
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };
    verify_signature(&public_key, message, &signature).unwrap_or(false)
}

// Messages that are already 32-byte digests are signed as-is
fn message_digest(message: &[u8]) -> Vec<u8> {
    if message.len() == 32 {
        message.to_vec()
    } else {
        sha256(message)
    }
}
