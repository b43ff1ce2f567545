//! Deterministic request fingerprints.
//!
//! A fingerprint is the SHA-256 of a canonical JSON rendering: object keys
//! are sorted at every nesting level, so two requests that differ only in
//! key order map to the same cache entry. Array order is significant.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Render `value` as compact JSON with recursively sorted object keys.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::from(key.as_str()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Fingerprint `value` within `namespace` (e.g. the resource name).
///
/// The result reads `<namespace>:<hex sha256>`.
pub fn fingerprint(namespace: &str, value: &Value) -> String {
    let digest = Sha256::new()
        .chain_update(namespace.as_bytes())
        .chain_update([0u8])
        .chain_update(canonical_json(value).as_bytes())
        .finalize();
    format!("{}:{}", namespace, hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_order_is_normalized() {
        let a: Value = serde_json::from_str(
            r#"{"criteria":{"fiscal_years":[2023,2024],"org_names":["MIT"]},"limit":50,"offset":0}"#,
        )
        .unwrap();
        let b: Value = serde_json::from_str(
            r#"{"offset":0,"limit":50,"criteria":{"org_names":["MIT"],"fiscal_years":[2023,2024]}}"#,
        )
        .unwrap();

        assert_eq!(canonical_json(&a), canonical_json(&b));
        assert_eq!(fingerprint("projects", &a), fingerprint("projects", &b));
    }

    #[test]
    fn test_semantic_differences_change_fingerprint() {
        let base = json!({"criteria": {"fiscal_years": [2023, 2024]}, "offset": 0});
        let reordered_array = json!({"criteria": {"fiscal_years": [2024, 2023]}, "offset": 0});
        let other_offset = json!({"criteria": {"fiscal_years": [2023, 2024]}, "offset": 500});

        let fp = fingerprint("projects", &base);
        assert_ne!(fp, fingerprint("projects", &reordered_array));
        assert_ne!(fp, fingerprint("projects", &other_offset));
        assert_ne!(fp, fingerprint("publications", &base));
    }

    #[test]
    fn test_canonical_rendering() {
        let value = json!({"b": [true, null, "x\"y"], "a": {"d": 1.5, "c": -2}});
        assert_eq!(canonical_json(&value), r#"{"a":{"c":-2,"d":1.5},"b":[true,null,"x\"y"]}"#);
    }

    #[test]
    fn test_fingerprint_shape() {
        let fp = fingerprint("projects", &json!({}));
        let (ns, digest) = fp.split_once(':').unwrap();
        assert_eq!(ns, "projects");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
