//! Token record parsing
//!
//! Both login paths deliver the token as loose key/value pairs: the implicit
//! flow through a redirect fragment, silent login through a JSON object. Both
//! end up as a [`TokenRecord`] whose `expires_in` has been converted from a
//! relative number of seconds into an absolute unix timestamp in
//! milliseconds.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{Error, Result};

/// Persisted field holding the bearer token
pub const ACCESS_TOKEN_FIELD: &str = "access_token";

/// Persisted field holding the absolute expiry (epoch ms, stringified)
pub const EXPIRES_IN_FIELD: &str = "expires_in";

/// A bearer token plus whatever the provider sent alongside it.
///
/// `expires_at: None` means the token never expires client-side; only a
/// server-side 401 will reveal that it is stale.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenRecord {
    pub access_token: Option<String>,
    /// Expiration as unix timestamp in milliseconds
    pub expires_at: Option<u64>,
    /// Other provider fields (`token_type`, `scope`, ...) stored verbatim
    pub extra: BTreeMap<String, String>,
}

impl TokenRecord {
    /// Parse the token string handed back by the authorization redirect.
    ///
    /// Accepts `#access_token=abc&expires_in=60` (one leading `#`, `?` or `&`
    /// is stripped). Keys and values are percent-decoded; a literal `+` is
    /// kept, not read as a space. A redirect carrying an OAuth `error` is
    /// reported as [`Error::Authorization`].
    pub fn parse_redirect(raw: &str, now_millis: u64) -> Result<Self> {
        let params = raw
            .strip_prefix(|c| matches!(c, '#' | '?' | '&'))
            .unwrap_or(raw)
            .replace('+', "%2B");

        let pairs = url::form_urlencoded::parse(params.as_bytes())
            .filter(|(key, _)| !key.is_empty())
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect::<BTreeMap<_, _>>();

        if let Some(error) = pairs.get("error") {
            let detail = pairs.get("error_description").unwrap_or(error);
            return Err(Error::Authorization(detail.clone()));
        }

        Self::from_fields(pairs, now_millis)
    }

    /// Build a record from the JSON object returned by a token exchange.
    ///
    /// String values are kept as-is; numbers and booleans keep their JSON
    /// text; `null` fields are dropped.
    pub fn from_response(fields: serde_json::Map<String, Value>, now_millis: u64) -> Result<Self> {
        let pairs = fields
            .into_iter()
            .filter_map(|(key, value)| match value {
                Value::Null => None,
                Value::String(s) => Some((key, s)),
                other => Some((key, other.to_string())),
            })
            .collect::<BTreeMap<_, _>>();

        Self::from_fields(pairs, now_millis)
    }

    fn from_fields(mut pairs: BTreeMap<String, String>, now_millis: u64) -> Result<Self> {
        let access_token = pairs.remove(ACCESS_TOKEN_FIELD);
        let expires_at = pairs
            .remove(EXPIRES_IN_FIELD)
            .map(|secs| absolute_expiry(&secs, now_millis))
            .transpose()?;

        Ok(Self {
            access_token,
            expires_at,
            extra: pairs,
        })
    }

    /// Whether the token has expired at `now_millis`.
    ///
    /// Strict comparison: a token is valid only while `now < expires_at`, so
    /// one expiring exactly now is already expired.
    pub fn is_expired(&self, now_millis: u64) -> bool {
        is_expired_at(self.expires_at, now_millis)
    }

    /// Field/value pairs to persist, unprefixed.
    pub fn fields(&self) -> Vec<(String, String)> {
        let mut fields = Vec::with_capacity(self.extra.len() + 2);
        if let Some(token) = &self.access_token {
            fields.push((ACCESS_TOKEN_FIELD.to_owned(), token.clone()));
        }
        if let Some(expires_at) = self.expires_at {
            fields.push((EXPIRES_IN_FIELD.to_owned(), expires_at.to_string()));
        }
        fields.extend(self.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        fields
    }
}

/// Strict expiry check shared by records and persisted expiry values.
pub(crate) fn is_expired_at(expires_at: Option<u64>, now_millis: u64) -> bool {
    match expires_at {
        Some(expires_at) => now_millis >= expires_at,
        None => false,
    }
}

/// Convert a relative `expires_in` (seconds) to an absolute epoch-ms instant.
fn absolute_expiry(secs: &str, now_millis: u64) -> Result<u64> {
    let secs: u64 = secs
        .trim()
        .parse()
        .map_err(|e| Error::InvalidResponse(format!("expires_in {secs:?} is not a number: {e}")))?;
    Ok(now_millis.saturating_add(secs.saturating_mul(1000)))
}
