// Request signing - approximates the file host's API authentication
//
// The real digest-to-header transform lives in a WASM module that has not been
// reverse-engineered. Instead of one signature we emit a ranked list of
// candidate encodings and let the caller try them in order.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, ORIGIN, REFERER, USER_AGENT,
};
use serde_json::Value;
use sha1::Sha1;
use sha2::{Digest, Sha256};

use super::errors::ResolveError;
use crate::config::ResolverConfig;

/// Serialize a value the way the genuine client does before hashing.
///
/// Top-level `null` is empty and a top-level string is itself. Anything nested
/// in an array or object is a JSON literal. Object keys are sorted so equal
/// payloads always produce the same bytes.
pub fn serialize(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => {
            let mut out = String::new();
            write_nested(other, &mut out);
            out
        }
    }
}

fn write_nested(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => out.push_str(&Value::String(s.clone()).to_string()),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_nested(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_nested(&map[key.as_str()], out);
            }
            out.push('}');
        }
    }
}

/// `"{METHOD} {PATH} | params={..} | body={..} | ts={..}"`
pub fn canonical_string(
    method: &str,
    path: &str,
    params: Option<&Value>,
    body: Option<&Value>,
    timestamp_millis: u64,
) -> String {
    format!(
        "{} {} | params={} | body={} | ts={}",
        method.to_uppercase(),
        path,
        params.map(serialize).unwrap_or_default(),
        body.map(serialize).unwrap_or_default(),
        timestamp_millis
    )
}

/// Current wall-clock time in milliseconds
pub fn now_millis() -> u64 {
    let nanos = time::OffsetDateTime::now_utc().unix_timestamp_nanos();
    (nanos / 1_000_000).max(0) as u64
}

/// One guessed signature value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureCandidate {
    pub label: &'static str,
    /// Header octets; not always printable (see `raw`)
    pub bytes: Vec<u8>,
}

impl SignatureCandidate {
    pub fn header_value(&self) -> Result<HeaderValue, ResolveError> {
        HeaderValue::from_bytes(&self.bytes).map_err(|_| {
            ResolveError::InvalidHeader(format!("candidate '{}' is not a legal header value", self.label))
        })
    }
}

type Encoder = fn(&str, &[u8; 32]) -> Vec<u8>;

fn encode_raw(_canonical: &str, digest: &[u8; 32]) -> Vec<u8> {
    digest.to_vec()
}

fn encode_hex(_canonical: &str, digest: &[u8; 32]) -> Vec<u8> {
    hex::encode(digest).into_bytes()
}

fn encode_base64(_canonical: &str, digest: &[u8; 32]) -> Vec<u8> {
    STANDARD.encode(digest).into_bytes()
}

fn encode_base64_canonical(canonical: &str, _digest: &[u8; 32]) -> Vec<u8> {
    STANDARD.encode(canonical).into_bytes()
}

// Weaker checksum some client builds are seen to send
fn encode_sha1(canonical: &str, _digest: &[u8; 32]) -> Vec<u8> {
    hex::encode(Sha1::digest(canonical.as_bytes())).into_bytes()
}

/// Ranked encoders, tried in this order
pub const SIGNATURE_ENCODERS: &[(&str, Encoder)] = &[
    ("raw", encode_raw),
    ("hex", encode_hex),
    ("base64", encode_base64),
    ("base64-canonical", encode_base64_canonical),
    ("sha1", encode_sha1),
];

/// Everything needed to sign one request attempt.
///
/// Build a fresh one per attempt; the timestamp must be current.
#[derive(Debug, Clone)]
pub struct SigningContext {
    pub method: String,
    pub path: String,
    pub canonical_string: String,
    pub timestamp_millis: u64,
    pub digest: [u8; 32],
    pub digest_encodings: Vec<SignatureCandidate>,
}

impl SigningContext {
    pub fn build(
        method: &str,
        path: &str,
        params: Option<&Value>,
        body: Option<&Value>,
        timestamp_millis: u64,
    ) -> Self {
        let canonical = canonical_string(method, path, params, body, timestamp_millis);
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&Sha256::digest(canonical.as_bytes()));

        let digest_encodings = SIGNATURE_ENCODERS
            .iter()
            .map(|&(label, encode)| SignatureCandidate {
                label,
                bytes: encode(&canonical, &digest),
            })
            .collect();

        Self {
            method: method.to_uppercase(),
            path: path.to_string(),
            canonical_string: canonical,
            timestamp_millis,
            digest,
            digest_encodings,
        }
    }

    pub fn build_now(method: &str, path: &str, params: Option<&Value>, body: Option<&Value>) -> Self {
        Self::build(method, path, params, body, now_millis())
    }

    pub fn candidate_count(&self) -> usize {
        self.digest_encodings.len()
    }

    /// Full header set for one candidate
    pub fn headers(
        &self,
        candidate: &SignatureCandidate,
        config: &ResolverConfig,
    ) -> Result<HeaderMap, ResolveError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(header_name(&config.signature_header)?, candidate.header_value()?);
        headers.insert(
            header_name(&config.timestamp_header)?,
            HeaderValue::from(self.timestamp_millis),
        );
        headers.insert(ORIGIN, header_value(config.site_base.trim_end_matches('/'))?);
        headers.insert(REFERER, header_value(&format!("{}/", config.site_base.trim_end_matches('/')))?);
        headers.insert(USER_AGENT, header_value(&config.user_agent)?);
        Ok(headers)
    }
}

fn header_name(name: &str) -> Result<HeaderName, ResolveError> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| ResolveError::InvalidHeader(format!("bad header name '{}'", name)))
}

fn header_value(value: &str) -> Result<HeaderValue, ResolveError> {
    HeaderValue::from_str(value)
        .map_err(|_| ResolveError::InvalidHeader(format!("bad header value '{}'", value)))
}
