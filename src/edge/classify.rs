//! Response classification for edge reads.
//!
//! Order of checks:
//! 1. body starts with markup → [`EdgeError::Malformed`] (the proxy's own
//!    error page; checked before the status because proxies serve these with 200)
//! 2. non-2xx status → [`EdgeError::Server`]
//! 3. decode: bare shape first, then `{ "data": … }`, then `{ "<resource>": … }`
//! 4. nothing fits → [`EdgeError::Decode`]

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::EdgeError;

#[must_use]
pub fn is_markup(body: &str) -> bool {
    body.trim_start().starts_with('<')
}

/// Markup and status checks shared by every resource.
pub fn check_response(status: u16, body: &str) -> Result<(), EdgeError> {
    if is_markup(body) {
        return Err(EdgeError::Malformed { body: body.to_string() });
    }
    if !(200..300).contains(&status) {
        return Err(EdgeError::Server { status, body: body.to_string() });
    }
    Ok(())
}

/// Classify a list resource (`/movies`, `/lists/{user}`).
pub fn classify_list<T: DeserializeOwned>(resource: &str, status: u16, body: &str) -> Result<Vec<T>, EdgeError> {
    check_response(status, body)?;
    decode_list(resource, body)
}

/// Classify a single-object resource (`/statistics/{user}`, `/profile/{user}`).
pub fn classify_object<T: DeserializeOwned>(resource: &str, status: u16, body: &str) -> Result<T, EdgeError> {
    check_response(status, body)?;
    decode_object(resource, body)
}

fn envelope<'a>(value: &'a Value, resource: &str) -> Option<&'a Value> {
    value.get("data").or_else(|| value.get(resource))
}

pub fn decode_list<T: DeserializeOwned>(resource: &str, body: &str) -> Result<Vec<T>, EdgeError> {
    let bare_err = match serde_json::from_str::<Vec<T>>(body) {
        Ok(items) => return Ok(items),
        Err(e) => e,
    };

    let value: Value = serde_json::from_str(body)
        .map_err(|e| EdgeError::Decode(format!("{resource}: not JSON: {e}")))?;

    match envelope(&value, resource) {
        Some(inner @ Value::Array(_)) => serde_json::from_value(inner.clone())
            .map_err(|e| EdgeError::Decode(format!("{resource}: enveloped array: {e}"))),
        _ => Err(EdgeError::Decode(format!("{resource}: {bare_err}"))),
    }
}

pub fn decode_object<T: DeserializeOwned>(resource: &str, body: &str) -> Result<T, EdgeError> {
    let bare_err = match serde_json::from_str::<T>(body) {
        Ok(obj) => return Ok(obj),
        Err(e) => e,
    };

    let value: Value = serde_json::from_str(body)
        .map_err(|e| EdgeError::Decode(format!("{resource}: not JSON: {e}")))?;

    let inner = match (&value, envelope(&value, resource)) {
        (_, Some(inner)) => inner,
        // Single-row array, as row APIs return it
        (Value::Array(rows), None) if rows.len() == 1 => &rows[0],
        _ => return Err(EdgeError::Decode(format!("{resource}: {bare_err}"))),
    };
    match inner {
        Value::Array(rows) if rows.len() == 1 => serde_json::from_value(rows[0].clone()),
        other => serde_json::from_value(other.clone()),
    }
    .map_err(|e| EdgeError::Decode(format!("{resource}: enveloped object: {e}")))
}
