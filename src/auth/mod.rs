//! Shared-secret checks and callback signatures.
//!
//! Implements constant-time comparison to mitigate timing attacks.

use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// Header carrying the callback payload signature.
pub const SIGNATURE_HEADER: &str = "x-signature-256";

/// Check a request secret against the configured one.
pub fn secret_matches(provided: &str, expected: &str) -> bool {
    constant_time_compare(provided, expected)
}

/// Perform constant-time string comparison.
fn constant_time_compare(a: &str, b: &str) -> bool {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();

    // Constant-time comparison
    a_bytes.ct_eq(b_bytes).into()
}

/// Sign a callback body with the process key, formatted as `sha256=<hex>`.
pub fn sign_payload(key: &str, body: &[u8]) -> Result<String, InvalidLength> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key.as_bytes())?;
    mac.update(body);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Verify a signature produced by [`sign_payload`].
#[cfg(test)]
pub fn verify_signature(key: &str, body: &[u8], signature: &str) -> bool {
    sign_payload(key, body).is_ok_and(|expected| constant_time_compare(&expected, signature))
}
