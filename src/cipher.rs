//! Property encryption with ChaCha20-Poly1305.
//!
//! All encrypted properties of one entity share a single initialization
//! vector, stored in plain text next to them and regenerated on every save.
//! Each property gets its own nonce derived from that vector and the property
//! name, so two properties of the same entity never reuse a nonce.

use base64::{Engine, engine::general_purpose::STANDARD};
use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use rand::RngCore;

use std::fmt;

use crate::error::{Result, SismaError};

/// Size of the shared initialization vector in bytes.
pub const IV_SIZE: usize = 16;
/// Size of nonce in bytes (96 bits for ChaCha20-Poly1305).
pub const NONCE_SIZE: usize = 12;

const KEY_CONTEXT: &str = "sisma 2024-06 property encryption key";
const NONCE_CONTEXT: &str = "sisma 2024-06 property nonce";

#[derive(Clone)]
pub struct PropertyCipher {
    key: [u8; 32],
}

impl PropertyCipher {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }
    /// Stretches a configured passphrase into a 256-bit key.
    pub fn from_passphrase(passphrase: &str) -> Self {
        Self::new(blake3::derive_key(KEY_CONTEXT, passphrase.as_bytes()))
    }

    /// A fresh base64 encoded initialization vector.
    pub fn generate_iv() -> String {
        let mut iv = [0u8; IV_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut iv);
        STANDARD.encode(iv)
    }

    /// Encrypts `plaintext` for `property`, returning base64 text.
    pub fn encrypt(&self, property: &str, plaintext: &[u8], iv: &str) -> Result<String> {
        let nonce = derive_nonce(property, iv)
            .map_err(|message| SismaError::Encryption(format!("{}: {}", property, message)))?;
        let ciphertext = self
            .cipher()
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: property.as_bytes(),
                },
            )
            .map_err(|e| SismaError::Encryption(format!("{}: {}", property, e)))?;
        Ok(STANDARD.encode(ciphertext))
    }

    pub fn decrypt(&self, property: &str, ciphertext: &str, iv: &str) -> Result<Vec<u8>> {
        let failed = |message: String| SismaError::Decryption {
            property: property.to_string(),
            message,
        };
        let nonce = derive_nonce(property, iv).map_err(failed)?;
        let bytes = STANDARD
            .decode(ciphertext)
            .map_err(|e| failed(format!("invalid base64: {}", e)))?;
        self.cipher()
            .decrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &bytes,
                    aad: property.as_bytes(),
                },
            )
            .map_err(|_| failed(String::from("wrong key or tampered data")))
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.key))
    }
}

fn derive_nonce(property: &str, iv: &str) -> std::result::Result<[u8; NONCE_SIZE], String> {
    let iv = STANDARD
        .decode(iv)
        .map_err(|e| format!("invalid initialization vector: {}", e))?;
    if iv.len() != IV_SIZE {
        return Err(format!(
            "initialization vector of {} bytes, expected {}",
            iv.len(),
            IV_SIZE
        ));
    }
    let mut material = iv;
    material.extend_from_slice(property.as_bytes());
    let hash = blake3::derive_key(NONCE_CONTEXT, &material);
    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&hash[..NONCE_SIZE]);
    Ok(nonce)
}

impl fmt::Debug for PropertyCipher {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PropertyCipher(..)")
    }
}
