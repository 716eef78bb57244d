//! Webhook signature verification.
//!
//! The platform signs every webhook body with HMAC-SHA256 keyed by the
//! channel secret and sends the base64 digest in `x-line-signature`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-line-signature";

/// Check `signature` (base64) against the HMAC of `body`, in constant time.
pub fn verify_signature(channel_secret: &[u8], body: &[u8], signature: &str) -> bool {
    let mut mac =
        HmacSha256::new_from_slice(channel_secret).expect("HMAC accepts any key length");
    mac.update(body);
    let computed = STANDARD.encode(mac.finalize().into_bytes());
    computed.as_bytes().ct_eq(signature.trim().as_bytes()).unwrap_u8() == 1
}
