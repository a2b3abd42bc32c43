//! TI1-HMAC-SHA256 request signer for gateway and file-manager calls
//!
//! Signing covers the request's identity headers (host, action, version,
//! service, content type, method, timestamp, nonce). Canonical forms are
//! built from sorted lowercase header names so transport-layer reordering
//! can never invalidate a signature, and the signature is derived through a
//! keyed HMAC chain - the secret never leaves this module.

use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "TI1-HMAC-SHA256";
const SCOPE_SUFFIX: &str = "ti1_request";

/// One call's signing input. Immutable once built; every outbound HTTP
/// attempt gets a fresh context (new timestamp and nonce), retries included,
/// because signatures are time-bound and must not be reused across attempts.
#[derive(Debug, Clone)]
pub struct SignContext {
    pub host: String,
    pub action: String,
    pub version: String,
    pub service: String,
    pub content_type: String,
    pub method: String,
    pub secret_id: String,
    pub secret_key: String,
    pub timestamp: i64,
    pub nonce: u32,
}

impl SignContext {
    /// Build a context stamped with the current time and a fresh nonce.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        host: &str,
        action: &str,
        version: &str,
        service: &str,
        content_type: &str,
        method: &str,
        secret_id: &str,
        secret_key: &str,
    ) -> Self {
        Self {
            host: host.to_string(),
            action: action.to_string(),
            version: version.to_string(),
            service: service.to_string(),
            content_type: content_type.to_string(),
            method: method.to_string(),
            secret_id: secret_id.to_string(),
            secret_key: secret_key.to_string(),
            timestamp: Utc::now().timestamp(),
            nonce: fresh_nonce(),
        }
    }

    fn require(&self) -> Result<()> {
        let missing = [
            ("host", &self.host),
            ("action", &self.action),
            ("version", &self.version),
            ("service", &self.service),
            ("content_type", &self.content_type),
            ("method", &self.method),
            ("secret_id", &self.secret_id),
            ("secret_key", &self.secret_key),
        ]
        .iter()
        .find(|(_, v)| v.is_empty())
        .map(|(k, _)| *k);

        match missing {
            Some(field) => Err(Error::Config(format!("missing signing field: {field}"))),
            None => Ok(()),
        }
    }
}

/// Nonce source without a rand dependency: sub-second clock entropy.
fn fresh_nonce() -> u32 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos()
}

/// Builds the signed header set for one HTTP attempt.
pub struct SignatureEngine;

impl SignatureEngine {
    /// Produce the full header mapping for the given context, including the
    /// `authorization` value a server holding the same secret key can
    /// independently recompute.
    pub fn build_headers(ctx: &SignContext) -> Result<BTreeMap<String, String>> {
        ctx.require()?;

        // Lowercase keys; BTreeMap keeps the canonical forms sorted.
        let mut headers = BTreeMap::new();
        headers.insert("host".to_string(), ctx.host.clone());
        headers.insert("content-type".to_string(), ctx.content_type.clone());
        headers.insert("x-ti-action".to_string(), ctx.action.clone());
        headers.insert("x-ti-service".to_string(), ctx.service.clone());
        headers.insert("x-ti-version".to_string(), ctx.version.clone());
        headers.insert("x-ti-timestamp".to_string(), ctx.timestamp.to_string());
        headers.insert("x-ti-nonce".to_string(), ctx.nonce.to_string());

        let canonical_headers = Self::canonical_headers(&headers);
        let signed_headers = Self::signed_headers(&headers);

        let canonical_request = format!(
            "{}\n{}\n{}",
            ctx.method, canonical_headers, signed_headers
        );

        let date_stamp = Utc
            .timestamp_opt(ctx.timestamp, 0)
            .single()
            .ok_or_else(|| Error::Config("signing timestamp out of range".to_string()))?
            .format("%Y%m%d")
            .to_string();

        let credential_scope = format!("{}/{}/{}", date_stamp, ctx.service, SCOPE_SUFFIX);
        let canonical_request_hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM, ctx.timestamp, credential_scope, canonical_request_hash
        );

        let signing_key = Self::derive_signing_key(&ctx.secret_key, &date_stamp, &ctx.service);
        let signature = hex::encode(Self::hmac_sha256(&signing_key, string_to_sign.as_bytes()));

        let authorization = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM, ctx.secret_id, credential_scope, signed_headers, signature
        );
        headers.insert("authorization".to_string(), authorization);

        Ok(headers)
    }

    /// Canonical headers - keys already lowercase and sorted by BTreeMap
    fn canonical_headers(headers: &BTreeMap<String, String>) -> String {
        let mut result = String::with_capacity(headers.len() * 48);
        for (k, v) in headers {
            result.push_str(k);
            result.push(':');
            result.push_str(v.trim());
            result.push('\n');
        }
        result
    }

    /// Signed headers list - sorted keys joined with ';'
    fn signed_headers(headers: &BTreeMap<String, String>) -> String {
        let mut result = String::with_capacity(headers.len() * 16);
        let mut first = true;
        for k in headers.keys() {
            if !first {
                result.push(';');
            }
            result.push_str(k);
            first = false;
        }
        result
    }

    /// Derive the signing key from the secret (3 chained HMAC operations)
    fn derive_signing_key(secret_key: &str, date_stamp: &str, service: &str) -> [u8; 32] {
        let seed = format!("TI1{secret_key}").into_bytes();
        let k_date = Self::hmac_sha256(&seed, date_stamp.as_bytes());
        let k_service = Self::hmac_sha256(&k_date, service.as_bytes());
        Self::hmac_sha256(&k_service, SCOPE_SUFFIX.as_bytes())
    }

    /// HMAC-SHA256 returning a fixed-size array (no heap allocation)
    fn hmac_sha256(key: &[u8], msg: &[u8]) -> [u8; 32] {
        let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
        mac.update(msg);
        let result = mac.finalize().into_bytes();
        let mut output = [0u8; 32];
        output.copy_from_slice(&result);
        output
    }
}
