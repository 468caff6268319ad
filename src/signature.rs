//! Webhook signature verification.
//!
//! GitHub signs each delivery with HMAC-SHA256 over the raw request body and
//! sends the result as `x-hub-signature-256: sha256=<hex>`. The comparison
//! against the computed digest uses a constant-time comparator; a direct
//! string equality would leak match length through timing.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::errors::DispatchError;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the sender-computed digest.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Verify `header` against the HMAC-SHA256 of `body` under `secret`.
///
/// The header must have the form `sha256=<hex>`. Missing header, malformed
/// hex, or digest mismatch all fail with [`DispatchError::Authentication`].
pub fn verify_signature(
    secret: &str,
    body: &[u8],
    header: Option<&str>,
) -> Result<(), DispatchError> {
    let header = header.ok_or_else(|| {
        DispatchError::Authentication("missing x-hub-signature-256 header".into())
    })?;
    let hex_digest = header.strip_prefix("sha256=").ok_or_else(|| {
        DispatchError::Authentication("signature header is not sha256=<hex>".into())
    })?;
    let provided = hex::decode(hex_digest)
        .map_err(|_| DispatchError::Authentication("signature is not valid hex".into()))?;

    // HMAC-SHA256 accepts keys of any length, so construction cannot fail.
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| DispatchError::Authentication("failed to initialize hmac".into()))?;
    mac.update(body);
    let expected = mac.finalize().into_bytes();

    if expected.ct_eq(provided.as_slice()).into() {
        Ok(())
    } else {
        Err(DispatchError::Authentication(
            "signature does not match request body".into(),
        ))
    }
}

/// Compute the `sha256=<hex>` signature value for `body`. Used by tests and
/// by operators generating reference signatures.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC-SHA256 accepts any key length");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}
