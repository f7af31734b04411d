//! Recursive `Value` -> `serde_json::Value` encoder.
//!
//! Plain JSON shapes are passed through. Everything else is resolved in a
//! fixed order: sequence form, complex, timestamp, mapping form. Objects that
//! expose both a sequence and a mapping are written as sequences.
use serde_json::Value as Json;

use crate::error::EncodeError;
use crate::value::{DomainObject, Value};

/// Encode a value tree. Errors name the offending node as a JSON Pointer.
pub fn encode(value: &Value<'_>) -> Result<Json, EncodeError> {
    let mut path = String::new();
    encode_at(value, &mut path)
}

fn encode_at(v: &Value<'_>, path: &mut String) -> Result<Json, EncodeError> {
    Ok(match v {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::from(*i),
        Value::UInt(u) => Json::from(*u),
        Value::Float(f) => float(*f, path)?,
        Value::Str(s) => Json::String(s.to_string()),
        Value::List(items) => {
            let mut arr = Vec::with_capacity(items.len());
            for (i, it) in items.iter().enumerate() {
                arr.push(child(path, &i.to_string(), |p| encode_at(it, p))?);
            }
            Json::Array(arr)
        }
        Value::Dict(entries) => {
            let mut map = serde_json::Map::with_capacity(entries.len());
            for (k, val) in entries {
                let encoded = child(path, k, |p| encode_at(val, p))?;
                map.insert(k.to_string(), encoded);
            }
            Json::Object(map)
        }
        other => return encode_fallback(other, path),
    })
}

// The `default` hook of a JSON serializer: only reached for values plain JSON
// cannot express.
fn encode_fallback(v: &Value<'_>, path: &mut String) -> Result<Json, EncodeError> {
    if let Some(seq) = as_sequence(v) {
        return encode_at(&seq, path);
    }
    if let Value::Complex(c) = v {
        return Ok(Json::Array(vec![float(c.re, path)?, float(c.im, path)?]));
    }
    if let Value::Timestamp(ts) = v {
        return Ok(Json::String(ts.to_iso()));
    }
    if let Some(entries) = as_mapping(v) {
        return encode_at(&Value::Dict(entries), path);
    }
    Err(EncodeError::Unsupported {
        type_name: v.type_name().into_owned(),
        path: path.clone(),
    })
}

fn as_sequence<'a>(v: &Value<'a>) -> Option<Value<'a>> {
    match v {
        Value::Array(arr) => Some(arr.to_list()),
        Value::Object(obj) => {
            let obj: &'a dyn DomainObject = *obj;
            obj.to_list()
        }
        _ => None,
    }
}

fn as_mapping<'a>(v: &Value<'a>) -> Option<Vec<(std::borrow::Cow<'a, str>, Value<'a>)>> {
    match v {
        Value::Object(obj) => {
            let obj: &'a dyn DomainObject = *obj;
            obj.to_dict()
        }
        _ => None,
    }
}

fn float(f: f64, path: &str) -> Result<Json, EncodeError> {
    serde_json::Number::from_f64(f)
        .map(Json::Number)
        .ok_or_else(|| EncodeError::NonFinite {
            value: f,
            path: path.to_string(),
        })
}

fn child<T>(
    path: &mut String,
    segment: &str,
    f: impl FnOnce(&mut String) -> Result<T, EncodeError>,
) -> Result<T, EncodeError> {
    let len = path.len();
    path.push('/');
    path.push_str(&escape_token(segment));
    let out = f(path);
    path.truncate(len);
    out
}

fn escape_token(tok: &str) -> String {
    let s = tok.replace('~', "~0");
    s.replace('/', "~1")
}
