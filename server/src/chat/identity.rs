//! Display-name resolution from a connection's opening query string.
//!
//! Clients connect with `?nickname=<name>`. The parser is deliberately literal:
//! it splits the whole query on `=` and pairs up the resulting tokens, which is
//! what existing clients are built against. It does not understand `&`, so
//! `a=1&b=2` is read as `a -> "1&b"` followed by a dangling key `2`.

use percent_encoding::percent_decode_str;
use std::borrow::Cow;
use std::collections::HashMap;

/// Query parameter carrying the display name.
pub const NICKNAME_KEY: &str = "nickname";

/// Decoded request parameters, keyed by raw (undecoded) parameter name.
pub type RequestParams = HashMap<String, String>;

/// Failure while resolving identity for a connection.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// A `%` was not followed by two hex digits.
    #[error("malformed percent-encoding at byte {position} in {value:?}")]
    InvalidPercentEncoding { value: String, position: usize },

    /// Decoded bytes are not valid UTF-8.
    #[error("decoded value {value:?} is not valid UTF-8")]
    InvalidUtf8 { value: String },

    /// A key token had no value token after it.
    #[error("parameter {key:?} has no value")]
    MissingValue { key: String },
}

/// Parse the raw query string into decoded parameters.
///
/// Returns `Ok(None)` when the query is absent or empty. Tokens produced by
/// splitting on `=` alternate key, value, key, value; trailing empty tokens are
/// dropped first, so `nickname=` is a key without a value.
pub fn resolve_params(query: Option<&str>) -> Result<Option<RequestParams>, IdentityError> {
    let query = match query {
        Some(q) if !q.is_empty() => q,
        _ => return Ok(None),
    };

    let mut tokens: Vec<&str> = query.split('=').collect();
    while tokens.last().is_some_and(|t| t.is_empty()) {
        tokens.pop();
    }

    let mut params = RequestParams::new();
    let mut tokens = tokens.into_iter();
    while let Some(key) = tokens.next() {
        let value = tokens.next().ok_or_else(|| IdentityError::MissingValue {
            key: key.to_string(),
        })?;
        params.insert(key.to_string(), form_decode(value)?);
    }

    Ok(Some(params))
}

/// Resolve the `nickname` parameter, if the client supplied one.
pub fn resolve_nickname(query: Option<&str>) -> Result<Option<String>, IdentityError> {
    Ok(resolve_params(query)?.and_then(|mut params| params.remove(NICKNAME_KEY)))
}

/// Decode an `application/x-www-form-urlencoded` value: `+` is a space and
/// `%XX` is a byte. Rejects truncated or non-hex escapes.
fn form_decode(raw: &str) -> Result<String, IdentityError> {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while let Some(offset) = bytes[i..].iter().position(|&b| b == b'%') {
        let at = i + offset;
        let valid = matches!(
            bytes.get(at + 1..at + 3),
            Some([hi, lo]) if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit()
        );
        if !valid {
            return Err(IdentityError::InvalidPercentEncoding {
                value: raw.to_string(),
                position: at,
            });
        }
        i = at + 3;
    }

    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .map(Cow::into_owned)
        .map_err(|_| IdentityError::InvalidUtf8 {
            value: raw.to_string(),
        })
}
