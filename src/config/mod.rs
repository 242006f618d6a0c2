pub mod loader;

// Re-export commonly used types
pub use loader::ConfigSource;

use std::collections::BTreeMap;
use toml::Value;

/// Merged configuration mapping.
///
/// Keys are flat, dot-separated paths (`"ai.model"`); nested tables from
/// TOML sources are flattened on load. Later sources override earlier
/// ones key by key, so the mapping always reflects the full precedence
/// chain handed to `configure`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    values: BTreeMap<String, Value>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw value lookup by flattened key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.values.get(key).and_then(Value::as_integer)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.get(key).and_then(Value::as_bool)
    }

    pub fn get_float(&self, key: &str) -> Option<f64> {
        self.values.get(key).and_then(Value::as_float)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate entries in deterministic (sorted key) order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Overlay `layer` onto this mapping; overlapping keys take the
    /// layer's value.
    pub(crate) fn apply_layer(&mut self, layer: BTreeMap<String, Value>) {
        for (key, value) in layer {
            self.values.insert(key, value);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.values.clear();
    }
}

/// Flatten a TOML table into dot-separated keys, recursing through
/// nested tables. Arrays and scalars are stored as-is.
pub(crate) fn flatten_table(prefix: &str, table: toml::Table, out: &mut BTreeMap<String, Value>) {
    for (key, value) in table {
        let path = if prefix.is_empty() {
            key
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            Value::Table(nested) => flatten_table(&path, nested, out),
            other => {
                out.insert(path, other);
            }
        }
    }
}
