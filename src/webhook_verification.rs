//! # Webhook Signature Verification
//!
//! This module verifies WhatsApp Cloud API webhook deliveries using
//! HMAC-SHA256 over the raw request body with constant-time comparison to
//! prevent timing attacks. Unlike a global secret, the signing secret is
//! per-channel and resolved (and decrypted) before verification runs.

use axum::http::StatusCode;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the payload signature
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

const SIGNATURE_PREFIX: &str = "sha256=";

/// Errors that can occur during webhook signature verification
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("Missing required signature header: {header}")]
    MissingSignature { header: String },

    #[error("Invalid signature format: {header}")]
    InvalidSignatureFormat { header: String },

    #[error("Signature verification failed")]
    VerificationFailed,
}

impl VerificationError {
    /// Returns the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        StatusCode::UNAUTHORIZED
    }
}

/// Result type for webhook verification
pub type VerificationResult<T> = Result<T, VerificationError>;

/// Verifies a Meta-style webhook signature using HMAC-SHA256.
///
/// The header format is `sha256=<hex digest>` computed over the raw request
/// body with the channel's signing secret.
pub fn verify_meta_signature(
    body: &[u8],
    signature_header: &str,
    secret: &str,
) -> VerificationResult<()> {
    tracing::debug!(body_size = body.len(), "Starting webhook signature verification");

    let signature_header = signature_header.trim();
    if signature_header.is_empty() {
        return Err(VerificationError::MissingSignature {
            header: "X-Hub-Signature-256".to_string(),
        });
    }

    if !signature_header.starts_with(SIGNATURE_PREFIX) {
        return Err(VerificationError::InvalidSignatureFormat {
            header: "X-Hub-Signature-256 must start with 'sha256='".to_string(),
        });
    }

    let provided_hex = &signature_header[SIGNATURE_PREFIX.len()..];

    // Compute HMAC-SHA256 of the body
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| VerificationError::VerificationFailed)?;
    mac.update(body);
    let expected_bytes = mac.finalize().into_bytes();

    // Decode the provided signature
    let provided_bytes =
        hex::decode(provided_hex).map_err(|_| VerificationError::InvalidSignatureFormat {
            header: "X-Hub-Signature-256 contains invalid hex".to_string(),
        })?;

    // Compare signatures using constant-time comparison to prevent timing attacks
    let expected_bytes_array: &[u8] = expected_bytes.as_ref();
    if subtle::ConstantTimeEq::ct_eq(expected_bytes_array, &provided_bytes[..]).into() {
        Ok(())
    } else {
        Err(VerificationError::VerificationFailed)
    }
}

/// Compute the signature header value for a body/secret pair.
///
/// Used by integration tests and by the channel setup tooling to produce
/// valid sample deliveries.
pub fn sign_payload(body: &[u8], secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    format!("{}{}", SIGNATURE_PREFIX, hex::encode(mac.finalize().into_bytes()))
}
