//! Signed server requests for trusted ("silent") logins
//!
//! A server that shares `client_secret` with OpenEd asserts a user's identity
//! by signing a small JSON envelope. The browser hands the result to
//! `/oauth/silent_login` and receives an access token without an interactive
//! login.
//!
//! Wire form: `base64url(hex(HMAC-SHA256(secret, E))) + "." + E` where
//! `E = base64url(json(envelope))`. The MAC covers the *encoded* envelope, and
//! the signature encodes the lowercase hex digest rather than the raw MAC
//! bytes. Both details are what the backend checks, so they are reproduced
//! exactly.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use rand::RngExt;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::constants::{NONCE_BYTES, SIGNING_ALGORITHM};
use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Envelope keys that callers may not override through extra fields.
const RESERVED_FIELDS: [&str; 4] = ["username", "client_id", "token", "algorithm"];

/// Identity assertion carried inside a signed request.
///
/// Serializes with the fixed fields first, then `extra` in key order. Extra
/// fields carry just-in-time account data such as `role`, `first_name` or
/// `password`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub username: String,
    pub client_id: String,
    /// Single-use random nonce, hex-encoded
    pub token: String,
    pub algorithm: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

/// Generate a signed request asserting `username` for `client_id`.
///
/// Every call draws a fresh nonce from the OS-seeded CSPRNG, so two requests
/// for the same user never share a `token`.
///
/// Rejects blank `username`, `client_id` or `client_secret`, and extra
/// fields that collide with the fixed envelope keys.
pub fn generate(
    username: &str,
    client_id: &str,
    client_secret: &str,
    extra: &BTreeMap<String, String>,
) -> Result<String> {
    if username.trim().is_empty() {
        return Err(Error::InvalidInput("username must not be empty".into()));
    }
    if client_id.trim().is_empty() {
        return Err(Error::InvalidInput("client_id must not be empty".into()));
    }
    if client_secret.is_empty() {
        return Err(Error::InvalidInput("client_secret must not be empty".into()));
    }
    if let Some(key) = extra.keys().find(|k| RESERVED_FIELDS.contains(&k.as_str())) {
        return Err(Error::InvalidInput(format!(
            "extra field `{key}` collides with a reserved envelope field"
        )));
    }

    let envelope = Envelope {
        username: username.to_owned(),
        client_id: client_id.to_owned(),
        token: generate_nonce(),
        algorithm: SIGNING_ALGORITHM.to_owned(),
        extra: extra.clone(),
    };

    sign_envelope(&envelope, client_secret)
}

/// Verify a signed request against `client_secret` and return its envelope.
///
/// The comparison is constant-time. Fails with `InvalidSignature` when the
/// input is malformed, the MAC does not match, or the envelope names an
/// algorithm other than HMAC-SHA256.
pub fn verify(signed_request: &str, client_secret: &str) -> Result<Envelope> {
    let (encoded_signature, encoded_envelope) = signed_request
        .split_once('.')
        .ok_or_else(|| Error::InvalidSignature("missing `.` separator".into()))?;

    let hex_digest = URL_SAFE_NO_PAD
        .decode(encoded_signature)
        .map_err(|e| Error::InvalidSignature(format!("signature is not base64url: {e}")))?;
    let expected = hex::decode(&hex_digest)
        .map_err(|e| Error::InvalidSignature(format!("signature is not a hex digest: {e}")))?;

    let mut mac = new_mac(client_secret)?;
    mac.update(encoded_envelope.as_bytes());
    mac.verify_slice(&expected)
        .map_err(|_| Error::InvalidSignature("signature mismatch".into()))?;

    let json = URL_SAFE_NO_PAD
        .decode(encoded_envelope)
        .map_err(|e| Error::InvalidSignature(format!("envelope is not base64url: {e}")))?;
    let envelope: Envelope = serde_json::from_slice(&json)
        .map_err(|e| Error::InvalidSignature(format!("malformed envelope: {e}")))?;

    if envelope.algorithm != SIGNING_ALGORITHM {
        return Err(Error::InvalidSignature(format!(
            "unsupported algorithm {}",
            envelope.algorithm
        )));
    }

    Ok(envelope)
}

/// Fresh nonce: `NONCE_BYTES` random bytes as lowercase hex.
fn generate_nonce() -> String {
    let mut bytes = [0u8; NONCE_BYTES];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

fn sign_envelope(envelope: &Envelope, client_secret: &str) -> Result<String> {
    let json = serde_json::to_vec(envelope)
        .map_err(|e| Error::InvalidInput(format!("serializing envelope: {e}")))?;
    let encoded_envelope = URL_SAFE_NO_PAD.encode(json);
    let encoded_signature = sign(&encoded_envelope, client_secret)?;
    Ok(format!("{encoded_signature}.{encoded_envelope}"))
}

/// `base64url(hex(HMAC-SHA256(secret, data)))`
fn sign(data: &str, client_secret: &str) -> Result<String> {
    let mut mac = new_mac(client_secret)?;
    mac.update(data.as_bytes());
    let hex_digest = hex::encode(mac.finalize().into_bytes());
    Ok(URL_SAFE_NO_PAD.encode(hex_digest))
}

fn new_mac(client_secret: &str) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(client_secret.as_bytes())
        .map_err(|e| Error::InvalidInput(format!("unusable client_secret: {e}")))
}
