//! Deterministic cache key generation
//!
//! Keys have the form `{prefix}:{md5_hex}`. String payloads are hashed as-is;
//! anything else is first rendered as canonical JSON with sorted object keys,
//! `", "` / `": "` separators, non-ASCII characters escaped as `\uXXXX` and
//! floats spelled the way Python's `repr` spells them.
//! That layout matches Python's `json.dumps(data, sort_keys=True)`, so keys
//! written by older services stay addressable.

use md5::{Digest, Md5};
use serde_json::Value;

/// Build the cache key for `payload` under `prefix`.
///
/// ```
/// use ouroboros_cache::cache::generate_key;
/// use serde_json::json;
///
/// let key = generate_key("search", &json!({"q": "rust", "k": 5}));
/// assert!(key.starts_with("search:"));
/// assert_eq!(key, generate_key("search", &json!({"k": 5, "q": "rust"})));
/// ```
pub fn generate_key(prefix: &str, payload: &Value) -> String {
    let digest = match payload {
        Value::String(s) => content_digest(s),
        other => content_digest(&canonical_json(other)),
    };
    format!("{}:{}", prefix, digest)
}

/// Lowercase hex MD5 of the UTF-8 bytes of `text`.
pub fn content_digest(text: &str) -> String {
    format!("{:x}", Md5::digest(text.as_bytes()))
}

/// Canonical JSON text of `value`.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => write_float(out, f),
            _ => out.push_str(&n.to_string()),
        },
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            // Sorted here, whatever order the map iterates in
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_string(out, key);
                out.push_str(": ");
                write_value(out, item);
            }
            out.push('}');
        }
    }
}

/// Python `repr(float)`: shortest round-trip digits, positional for
/// exponents in `-4..16`, otherwise `d.ddde±XX`.
fn write_float(out: &mut String, f: f64) {
    if f.is_sign_negative() {
        out.push('-');
    }
    if f == 0.0 {
        out.push_str("0.0");
        return;
    }

    // `{:e}` yields the shortest digits that round-trip, e.g. "1.23456e2"
    let sci = format!("{:e}", f.abs());
    let (mantissa, exp) = match sci.split_once('e').map(|(m, e)| (m, e.parse::<i32>())) {
        Some((m, Ok(e))) => (m, e),
        _ => {
            out.push_str(&sci);
            return;
        }
    };
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();

    if (-4..16).contains(&exp) {
        if exp < 0 {
            out.push_str("0.");
            out.extend(std::iter::repeat('0').take((-exp - 1) as usize));
            out.push_str(&digits);
        } else {
            let int_len = exp as usize + 1;
            if digits.len() <= int_len {
                out.push_str(&digits);
                out.extend(std::iter::repeat('0').take(int_len - digits.len()));
                out.push_str(".0");
            } else {
                out.push_str(&digits[..int_len]);
                out.push('.');
                out.push_str(&digits[int_len..]);
            }
        }
    } else {
        out.push_str(&digits[..1]);
        if digits.len() > 1 {
            out.push('.');
            out.push_str(&digits[1..]);
        }
        let sign = if exp < 0 { '-' } else { '+' };
        out.push_str(&format!("e{}{:02}", sign, exp.abs()));
    }
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            ' '..='~' => out.push(c),
            _ => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    out.push_str(&format!("\\u{:04x}", unit));
                }
            }
        }
    }
    out.push('"');
}
