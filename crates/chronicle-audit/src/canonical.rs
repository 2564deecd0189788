//! Canonical JSON.
//!
//! Identical logical content must hash identically, whatever order its
//! fields were inserted in.  The canonical form is compact JSON with:
//!
//! - object keys sorted by their UTF-8 bytes, at every depth
//! - arrays kept in order
//! - strings escaped exactly as `serde_json` escapes them
//! - numbers in `serde_json`'s fixed, locale-independent notation
//! - explicit `null` kept; absent optional fields never appear
//!
//! Anything that cannot be rendered deterministically is an `Encoding`
//! error: non-string map keys, non-finite floats, or nesting deeper than
//! `MAX_DEPTH`.

use serde::Serialize;
use serde_json::Value;

use chronicle_contracts::error::{ChronicleError, ChronicleResult};

/// Deepest nesting accepted in a payload.
pub const MAX_DEPTH: usize = 64;

/// Canonical bytes of a JSON value.
pub fn canonicalize(value: &Value) -> ChronicleResult<Vec<u8>> {
    let mut out = Vec::with_capacity(256);
    write_value(value, 0, &mut out)?;
    Ok(out)
}

/// Canonical bytes of any serializable value.
///
/// Fails with `Encoding` when the value has no JSON form (for example a map
/// keyed by tuples) or the float it contains is not finite.
pub fn canonicalize_serializable<T: Serialize + ?Sized>(value: &T) -> ChronicleResult<Vec<u8>> {
    let value = to_json(value)?;
    canonicalize(&value)
}

/// Convert to a JSON value, rejecting values that do not map onto JSON.
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> ChronicleResult<Value> {
    serde_json::to_value(value).map_err(|e| ChronicleError::Encoding {
        reason: format!("value cannot be represented as JSON: {}", e),
    })
}

/// Check a value can be canonicalized without producing the bytes.
pub fn check(value: &Value) -> ChronicleResult<()> {
    check_depth(value, 0)
}

fn check_depth(value: &Value, depth: usize) -> ChronicleResult<()> {
    if depth > MAX_DEPTH {
        return Err(too_deep());
    }
    match value {
        Value::Array(items) => items.iter().try_for_each(|v| check_depth(v, depth + 1)),
        Value::Object(map) => map.values().try_for_each(|v| check_depth(v, depth + 1)),
        Value::Number(n) => check_number(n),
        _ => Ok(()),
    }
}

fn too_deep() -> ChronicleError {
    ChronicleError::Encoding {
        reason: format!("value nests deeper than {} levels", MAX_DEPTH),
    }
}

fn check_number(n: &serde_json::Number) -> ChronicleResult<()> {
    match n.as_f64() {
        Some(f) if !f.is_finite() => Err(ChronicleError::Encoding {
            reason: format!("non-finite number {}", n),
        }),
        _ => Ok(()),
    }
}

fn write_value(value: &Value, depth: usize, out: &mut Vec<u8>) -> ChronicleResult<()> {
    if depth > MAX_DEPTH {
        return Err(too_deep());
    }
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(n) => {
            check_number(n)?;
            out.extend_from_slice(n.to_string().as_bytes());
        }
        Value::String(s) => write_string(s, out)?,
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(item, depth + 1, out)?;
            }
            out.push(b']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
            out.push(b'{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_string(key, out)?;
                out.push(b':');
                write_value(item, depth + 1, out)?;
            }
            out.push(b'}');
        }
    }
    Ok(())
}

fn write_string(s: &str, out: &mut Vec<u8>) -> ChronicleResult<()> {
    serde_json::to_writer(&mut *out, s).map_err(|e| ChronicleError::Encoding {
        reason: format!("failed to encode string: {}", e),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
