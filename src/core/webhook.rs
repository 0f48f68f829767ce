//! HMAC signature verification for inbound webhooks.
//!
//! Two header formats are supported: a plain `sha256=<hex>` digest over the
//! raw request body (deploy webhook), and a structured `ts=<t>,v1=<hex>`
//! header where the signed manifest combines the payload id, the request id
//! header and the timestamp (payment webhook).

use std::collections::HashSet;

use constant_time_eq::constant_time_eq;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio::sync::Mutex;

use crate::utils::GuardResult;

type HmacSha256 = Hmac<Sha256>;

/// Compute an HMAC-SHA256 digest
pub(crate) fn hmac_sha256(secret: &[u8], message: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts keys of any length");
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

/// Compare a received hex digest against a computed digest in constant time.
/// Undecodable hex or a length mismatch is simply a failed match.
fn signature_matches(received_hex: &str, computed: &[u8]) -> bool {
    let Ok(received) = hex::decode(received_hex.trim()) else {
        return false;
    };
    received.len() == computed.len() && constant_time_eq(&received, computed)
}

/// Parsed components of a `ts=<t>,v1=<hex>` signature header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureParts {
    /// Timestamp of when the notification was sent
    pub ts: String,
    /// Received HMAC-SHA256 hex digest
    pub v1: String,
}

/// Parse a structured signature header. Returns None when either component
/// is missing; unknown keys are ignored.
pub fn parse_signature_header(header: &str) -> Option<SignatureParts> {
    let mut ts = None;
    let mut v1 = None;

    for part in header.split(',') {
        if let Some((key, value)) = part.split_once('=') {
            match key.trim() {
                "ts" => ts = Some(value.trim().to_string()),
                "v1" => v1 = Some(value.trim().to_string()),
                _ => {}
            }
        }
    }

    Some(SignatureParts { ts: ts?, v1: v1? })
}

/// Outcome of a webhook signature verification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// Signature recomputed and matched
    Verified,
    /// No secret configured and not in production: verification skipped
    Skipped,
    /// No secret configured in production: fail closed
    MissingSecret,
    /// Signature header absent or unparseable
    MissingSignature,
    /// Signature present but did not match
    Invalid,
}

impl Verification {
    /// Whether the payload may be acted upon
    pub fn is_trusted(&self) -> bool {
        matches!(self, Verification::Verified | Verification::Skipped)
    }
}

/// Verifies webhook signatures against a shared secret.
///
/// A missing secret rejects everything in production rather than silently
/// skipping verification; outside production the skip is logged loudly.
pub struct WebhookVerifier {
    /// Webhook name, used in logs
    name: &'static str,
    /// Shared secret, if configured
    secret: Option<String>,
    /// Production mode flag
    production: bool,
}

impl WebhookVerifier {
    /// Create a verifier for a named webhook
    pub fn new(name: &'static str, secret: Option<String>, production: bool) -> Self {
        Self {
            name,
            secret,
            production,
        }
    }

    fn configured_secret(&self) -> Result<&str, Verification> {
        match self.secret.as_deref() {
            Some(secret) if !secret.is_empty() => Ok(secret),
            _ if self.production => {
                tracing::error!(
                    webhook = %self.name,
                    "Webhook secret not configured, rejecting request"
                );
                Err(Verification::MissingSecret)
            }
            _ => {
                tracing::warn!(
                    webhook = %self.name,
                    "Webhook secret not configured, SKIPPING signature verification \
                     (non-production mode only)"
                );
                Err(Verification::Skipped)
            }
        }
    }

    /// Verify a `sha256=<hex>` signature computed over the raw request body
    pub fn verify_body(&self, body: &[u8], signature_header: Option<&str>) -> Verification {
        let secret = match self.configured_secret() {
            Ok(secret) => secret,
            Err(outcome) => return outcome,
        };

        let header = match signature_header {
            Some(header) if !header.is_empty() => header,
            _ => return Verification::MissingSignature,
        };

        let received = header.strip_prefix("sha256=").unwrap_or(header);
        let computed = hmac_sha256(secret.as_bytes(), body);

        if signature_matches(received, &computed) {
            Verification::Verified
        } else {
            Verification::Invalid
        }
    }

    /// Verify a `ts=<t>,v1=<hex>` signature over the manifest
    /// `id={data_id};request-id={request_id};ts={ts};`
    pub fn verify_manifest(
        &self,
        data_id: &str,
        request_id: &str,
        signature_header: Option<&str>,
    ) -> Verification {
        let secret = match self.configured_secret() {
            Ok(secret) => secret,
            Err(outcome) => return outcome,
        };

        let parts = match signature_header.and_then(parse_signature_header) {
            Some(parts) => parts,
            None => return Verification::MissingSignature,
        };

        let manifest = format!("id={};request-id={};ts={};", data_id, request_id, parts.ts);
        let computed = hmac_sha256(secret.as_bytes(), manifest.as_bytes());

        if signature_matches(&parts.v1, &computed) {
            Verification::Verified
        } else {
            Verification::Invalid
        }
    }
}

/// Durable record of processed payment transactions.
///
/// Webhook delivery is at-least-once, so a duplicate notification must be a
/// no-op instead of double-applying side effects. Production deployments
/// back this with their persistence layer, keyed by transaction identifier.
#[async_trait::async_trait]
pub trait TransactionStore: Send + Sync {
    /// Whether this transaction identifier has already been processed
    async fn is_recorded(&self, transaction_id: &str) -> GuardResult<bool>;

    /// Record a transaction identifier as processed
    async fn record(&self, transaction_id: &str) -> GuardResult<()>;
}

/// In-memory transaction store for single-node deployments and tests
#[derive(Debug, Default)]
pub struct MemoryTransactionStore {
    seen: Mutex<HashSet<String>>,
}

impl MemoryTransactionStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl TransactionStore for MemoryTransactionStore {
    async fn is_recorded(&self, transaction_id: &str) -> GuardResult<bool> {
        let seen = self.seen.lock().await;
        Ok(seen.contains(transaction_id))
    }

    async fn record(&self, transaction_id: &str) -> GuardResult<()> {
        let mut seen = self.seen.lock().await;
        seen.insert(transaction_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 4231 test case 2: key "Jefe", data "what do ya want for nothing?"
    const RFC4231_DIGEST: &str =
        "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843";

    #[test]
    fn test_hmac_sha256_known_vector() {
        let digest = hmac_sha256(b"Jefe", b"what do ya want for nothing?");
        assert_eq!(hex::encode(digest), RFC4231_DIGEST);
    }

    #[test]
    fn test_parse_signature_header() {
        let parts = parse_signature_header("ts=1704067200,v1=abcdef").unwrap();
        assert_eq!(parts.ts, "1704067200");
        assert_eq!(parts.v1, "abcdef");

        let parts = parse_signature_header(" ts = 17 , extra = 1 , v1 = ff ").unwrap();
        assert_eq!(parts.ts, "17");
        assert_eq!(parts.v1, "ff");

        assert!(parse_signature_header("ts=17").is_none());
        assert!(parse_signature_header("v1=ff").is_none());
        assert!(parse_signature_header("").is_none());
        assert!(parse_signature_header("garbage").is_none());
    }

    #[test]
    fn test_verify_body_roundtrip() {
        let verifier = WebhookVerifier::new("deploy", Some("s3cr3t".to_string()), true);
        let body = br#"{"data":{"id":"123"}}"#;
        let header = format!("sha256={}", hex::encode(hmac_sha256(b"s3cr3t", body)));

        assert_eq!(
            verifier.verify_body(body, Some(&header)),
            Verification::Verified
        );
    }

    #[test]
    fn test_verify_body_rejects_tampering() {
        let verifier = WebhookVerifier::new("deploy", Some("s3cr3t".to_string()), true);
        let body = br#"{"data":{"id":"123"}}"#;
        let header = format!("sha256={}", hex::encode(hmac_sha256(b"s3cr3t", body)));

        // Flip one byte of the body
        let tampered = br#"{"data":{"id":"124"}}"#;
        assert_eq!(
            verifier.verify_body(tampered, Some(&header)),
            Verification::Invalid
        );

        // All-zero signature
        let zeros = format!("sha256={}", "0".repeat(64));
        assert_eq!(
            verifier.verify_body(body, Some(&zeros)),
            Verification::Invalid
        );

        // Undecodable hex
        assert_eq!(
            verifier.verify_body(body, Some("sha256=not-hex")),
            Verification::Invalid
        );

        // Missing header
        assert_eq!(verifier.verify_body(body, None), Verification::MissingSignature);
    }

    #[test]
    fn test_missing_secret_fails_closed_in_production() {
        let verifier = WebhookVerifier::new("deploy", None, true);
        assert_eq!(
            verifier.verify_body(b"payload", Some("sha256=00")),
            Verification::MissingSecret
        );

        let empty = WebhookVerifier::new("deploy", Some(String::new()), true);
        assert_eq!(
            empty.verify_body(b"payload", Some("sha256=00")),
            Verification::MissingSecret
        );
    }

    #[test]
    fn test_missing_secret_skips_outside_production() {
        let verifier = WebhookVerifier::new("deploy", None, false);
        let outcome = verifier.verify_body(b"payload", None);
        assert_eq!(outcome, Verification::Skipped);
        assert!(outcome.is_trusted());
    }

    #[test]
    fn test_verify_manifest_roundtrip() {
        let verifier = WebhookVerifier::new("payment", Some("s3cr3t".to_string()), true);
        let manifest = "id=123;request-id=req-77;ts=1704067200;";
        let digest = hex::encode(hmac_sha256(b"s3cr3t", manifest.as_bytes()));
        let header = format!("ts=1704067200,v1={}", digest);

        assert_eq!(
            verifier.verify_manifest("123", "req-77", Some(&header)),
            Verification::Verified
        );

        // A different payload id invalidates the signature
        assert_eq!(
            verifier.verify_manifest("124", "req-77", Some(&header)),
            Verification::Invalid
        );

        // A different timestamp changes the manifest
        let stale = format!("ts=1704067201,v1={}", digest);
        assert_eq!(
            verifier.verify_manifest("123", "req-77", Some(&stale)),
            Verification::Invalid
        );

        // Header without both components
        assert_eq!(
            verifier.verify_manifest("123", "req-77", Some("ts=1704067200")),
            Verification::MissingSignature
        );
    }

    #[tokio::test]
    async fn test_transaction_store_idempotency() {
        let store = MemoryTransactionStore::new();
        assert!(!store.is_recorded("tx-1").await.unwrap());

        store.record("tx-1").await.unwrap();
        assert!(store.is_recorded("tx-1").await.unwrap());
        assert!(!store.is_recorded("tx-2").await.unwrap());

        // Recording again is harmless
        store.record("tx-1").await.unwrap();
        assert!(store.is_recorded("tx-1").await.unwrap());
    }
}
