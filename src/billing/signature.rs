//! Billing webhook signature verification
//!
//! Header format: `t=<unix seconds>,v1=<hex hmac>[,v1=<hex hmac>...]`.
//! The signed message is `"<t>.<raw body>"`, HMAC-SHA256 keyed with the
//! webhook secret.

use super::BillingError;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_SCHEME: &str = "v1";

pub struct SignatureVerifier {
    secret: Vec<u8>,
    tolerance_seconds: i64,
}

impl SignatureVerifier {
    pub fn new(secret: &str, tolerance_seconds: i64) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            tolerance_seconds,
        }
    }

    /// Verify a raw payload against its signature header
    pub fn verify(&self, payload: &[u8], header: &str) -> Result<(), BillingError> {
        self.verify_at(payload, header, Utc::now().timestamp())
    }

    fn verify_at(&self, payload: &[u8], header: &str, now: i64) -> Result<(), BillingError> {
        let (timestamp, signatures) = parse_header(header)?;

        let age = (now - timestamp).abs();
        if age > self.tolerance_seconds {
            return Err(BillingError::Signature(format!(
                "timestamp outside tolerance ({}s)",
                age
            )));
        }

        let expected = self.compute(timestamp, payload)?;
        if signatures
            .iter()
            .any(|candidate| constant_time_compare(candidate, &expected))
        {
            Ok(())
        } else {
            Err(BillingError::Signature(
                "no matching signature found".to_string(),
            ))
        }
    }

    fn compute(&self, timestamp: i64, payload: &[u8]) -> Result<String, BillingError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| BillingError::Signature(format!("invalid webhook secret: {}", e)))?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

fn parse_header(header: &str) -> Result<(i64, Vec<&str>), BillingError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let (key, value) = part
            .trim()
            .split_once('=')
            .ok_or_else(|| BillingError::Signature("malformed signature header".to_string()))?;

        match key {
            "t" => {
                timestamp = Some(value.parse::<i64>().map_err(|_| {
                    BillingError::Signature("invalid timestamp".to_string())
                })?)
            }
            SIGNATURE_SCHEME => signatures.push(value),
            // Other schemes are ignored
            _ => {}
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| BillingError::Signature("missing timestamp".to_string()))?;
    if signatures.is_empty() {
        return Err(BillingError::Signature(format!(
            "no {} signature present",
            SIGNATURE_SCHEME
        )));
    }

    Ok((timestamp, signatures))
}

/// Constant-time string comparison
pub(crate) fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}

/// Build a valid header for `payload`, as the provider would
#[cfg(test)]
pub(crate) fn sign_for_tests(secret: &str, payload: &[u8], timestamp: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{}.", timestamp).as_bytes());
    mac.update(payload);
    format!(
        "t={},{}={}",
        timestamp,
        SIGNATURE_SCHEME,
        hex::encode(mac.finalize().into_bytes())
    )
}
