//! Optional payload confidentiality for the batch upload.
//!
//! The agent encrypts the serialized batch with RSA-OAEP (SHA-512) under a
//! configured PKCS#1 public key; the server decrypts with the paired
//! private key before JSON decoding. Encryption failure on the sender is
//! never worked around by sending plaintext.
//!
//! OAEP bounds the plaintext to `modulus_len - 2 * 64 - 2` bytes (126 for a
//! 2048-bit key), so this layer suits small batches only; larger payloads
//! fail closed.

use anyhow::{Context, Result};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha512;
use std::path::Path;

/// Loads a PKCS#1 PEM public key from disk.
pub fn load_public_key(path: &Path) -> Result<RsaPublicKey> {
    let pem = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read public key '{}'", path.display()))?;
    RsaPublicKey::from_pkcs1_pem(&pem)
        .with_context(|| format!("failed to parse public key '{}'", path.display()))
}

/// Loads a PKCS#1 PEM private key from disk.
pub fn load_private_key(path: &Path) -> Result<RsaPrivateKey> {
    let pem = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read private key '{}'", path.display()))?;
    RsaPrivateKey::from_pkcs1_pem(&pem)
        .with_context(|| format!("failed to parse private key '{}'", path.display()))
}

pub fn encrypt(plaintext: &[u8], key: &RsaPublicKey) -> Result<Vec<u8>> {
    let mut rng = rand::thread_rng();
    key.encrypt(&mut rng, Oaep::new::<Sha512>(), plaintext)
        .context("payload encryption failed")
}

pub fn decrypt(ciphertext: &[u8], key: &RsaPrivateKey) -> Result<Vec<u8>> {
    key.decrypt(Oaep::new::<Sha512>(), ciphertext)
        .context("payload decryption failed")
}
