//! Deterministic cache key construction.

use serde_json::Value;

/// Build a cache key from a base name and a parameter object.
///
/// Object keys are sorted at every depth before stringification, so two
/// parameter sets that differ only in property order map to the same key.
/// `Value::Null` params yield the bare base name.
pub fn make_cache_key(base: &str, params: &Value) -> String {
  if params.is_null() {
    return base.to_string();
  }
  format!("{}:{}", base, canonical_json(params))
}

/// Serialize a JSON value with object keys in sorted order.
///
/// Does not rely on `serde_json::Map` ordering, which flips to insertion order
/// when any crate in the build enables `preserve_order`.
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
        out.push_str(&Value::String(key.clone()).to_string());
        out.push(':');
        write_canonical(&map[key.as_str()], out);
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
