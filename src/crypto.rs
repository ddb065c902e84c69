//! Channel secret encryption module using AES-256-GCM
//!
//! This module provides encryption and decryption utilities for the WhatsApp
//! access tokens and webhook signing secrets stored per channel, using
//! AES-256-GCM with additional authenticated data (AAD) for context binding.

#![allow(deprecated)]

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use thiserror::Error;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::models::channel::Model as ChannelModel;

const VERSION_ENCRYPTED: u8 = 0x01;
const VERSION_FIELD_LEN: usize = 1;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MIN_ENCRYPTED_LEN: usize = VERSION_FIELD_LEN + NONCE_LEN + TAG_LEN;

/// Crypto error types
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("invalid ciphertext format")]
    InvalidFormat,
    #[error("empty ciphertext")]
    EmptyCiphertext,
}

/// Secure wrapper for encryption keys with zeroization
#[derive(Debug, Clone, Zeroize, ZeroizeOnDrop)]
pub struct ZeroizingKey(Vec<u8>);

/// Type alias for crypto keys
pub type CryptoKey = ZeroizingKey;

impl CryptoKey {
    /// Create a new crypto key from bytes
    pub fn new(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::EncryptionFailed(
                "Invalid key length: expected 32 bytes".to_string(),
            ));
        }
        Ok(ZeroizingKey(bytes))
    }

    /// Get the key as bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Encrypt bytes using AES-256-GCM
pub fn encrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
    let cipher = Aes256Gcm::new(cipher_key);

    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    // Prepend version byte and nonce to ciphertext
    let mut result = Vec::with_capacity(VERSION_FIELD_LEN + NONCE_LEN + ciphertext.len());
    result.push(VERSION_ENCRYPTED);
    result.extend_from_slice(&nonce);
    result.append(&mut ciphertext);

    Ok(result)
}

/// Decrypt bytes using AES-256-GCM
pub fn decrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.is_empty() {
        return Err(CryptoError::EmptyCiphertext);
    }

    if ciphertext[0] != VERSION_ENCRYPTED {
        return Err(CryptoError::InvalidFormat);
    }

    // Validate minimum length (version + nonce + tag)
    if ciphertext.len() < MIN_ENCRYPTED_LEN {
        return Err(CryptoError::InvalidFormat);
    }

    let nonce = Nonce::from_slice(&ciphertext[VERSION_FIELD_LEN..VERSION_FIELD_LEN + NONCE_LEN]);
    let tag_and_ct = &ciphertext[VERSION_FIELD_LEN + NONCE_LEN..];

    debug_assert!(tag_and_ct.len() >= TAG_LEN);

    let cipher_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
    let cipher = Aes256Gcm::new(cipher_key);

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: tag_and_ct,
                aad,
            },
        )
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

/// AAD string binding a channel secret to its owning client and phone number.
///
/// A ciphertext copied onto another channel row fails authentication instead
/// of decrypting to a usable secret.
fn channel_aad(client_id: Uuid, phone_number_id: &str) -> String {
    format!("{}|{}", client_id, phone_number_id)
}

/// Type alias for the decrypted secret pair of a channel
type ChannelSecrets = Result<(String, String), CryptoError>;

/// Encrypt the access token and signing secret for a channel
pub fn encrypt_channel_secrets(
    key: &CryptoKey,
    client_id: Uuid,
    phone_number_id: &str,
    access_token: &str,
    signing_secret: &str,
) -> Result<(Vec<u8>, Vec<u8>), CryptoError> {
    let aad = channel_aad(client_id, phone_number_id);

    let access_token_ciphertext = encrypt_bytes(key, aad.as_bytes(), access_token.as_bytes())?;
    let signing_secret_ciphertext = encrypt_bytes(key, aad.as_bytes(), signing_secret.as_bytes())?;

    Ok((access_token_ciphertext, signing_secret_ciphertext))
}

/// Decrypt both secrets of a channel row: (access_token, signing_secret)
pub fn decrypt_channel_secrets(key: &CryptoKey, channel: &ChannelModel) -> ChannelSecrets {
    let aad = channel_aad(channel.client_id, &channel.phone_number_id);

    let access_token = decrypt_bytes(key, aad.as_bytes(), &channel.access_token_ciphertext)
        .and_then(|bytes| {
            String::from_utf8(bytes)
                .map_err(|e| CryptoError::DecryptionFailed(format!("Invalid UTF-8: {}", e)))
        })?;

    let signing_secret = decrypt_bytes(key, aad.as_bytes(), &channel.signing_secret_ciphertext)
        .and_then(|bytes| {
            String::from_utf8(bytes)
                .map_err(|e| CryptoError::DecryptionFailed(format!("Invalid UTF-8: {}", e)))
        })?;

    Ok((access_token, signing_secret))
}
