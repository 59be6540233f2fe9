//! Per-metric message authentication.
//!
//! Every signed metric carries `hex(HMAC-SHA256(key, "<id>:<kind>:<value>"))`
//! in its `hash` field. Verification recomputes the tag and compares through
//! [`ring::hmac::verify`], which is constant-time; a mismatch on any entry
//! rejects the whole payload on the receiving side.

use crate::types::MetricValue;
use ring::hmac;

fn label(id: &str, value: &MetricValue) -> String {
    format!("{id}:{}:{}", value.kind(), value.text())
}

/// Computes the hex-encoded signature for one metric.
///
/// # Examples
///
/// ```
/// use statmon_common::sign;
/// use statmon_common::types::MetricValue;
///
/// let value = MetricValue::Counter(2);
/// let sig = sign::sign_hex("PollCount", &value, "k1");
/// assert!(sign::verify_hex("PollCount", &value, "k1", &sig));
/// assert!(!sign::verify_hex("PollCount", &value, "k2", &sig));
/// ```
pub fn sign_hex(id: &str, value: &MetricValue, key: &str) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key.as_bytes());
    let tag = hmac::sign(&key, label(id, value).as_bytes());
    hex::encode(tag.as_ref())
}

/// Verifies a hex-encoded signature against the metric and key.
///
/// Returns `false` for malformed hex as well as for a tag mismatch.
pub fn verify_hex(id: &str, value: &MetricValue, key: &str, signature: &str) -> bool {
    let Ok(tag) = hex::decode(signature) else {
        return false;
    };
    let key = hmac::Key::new(hmac::HMAC_SHA256, key.as_bytes());
    hmac::verify(&key, label(id, value).as_bytes(), &tag).is_ok()
}
