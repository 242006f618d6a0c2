use std::{collections::BTreeMap, env, fs, path::PathBuf};

use toml::Value;
use tracing::debug;

use super::flatten_table;
use crate::errors::ConfigError;

/// A single configuration source fed to `ServiceManager::configure`.
///
/// Sources are merged in the order given; later sources override
/// overlapping keys.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// In-memory key/value pairs, keys already flattened.
    Values(BTreeMap<String, Value>),
    /// TOML file; `~` is expanded relative to the user's home.
    File(PathBuf),
    /// Process environment variables starting with `prefix`. The key is
    /// the remainder lowercased, with `__` mapped to `.` so nested
    /// sections can be addressed (`APP_AI__MODEL` becomes `ai.model`).
    Env { prefix: String },
}

impl ConfigSource {
    /// In-memory source from any iterator of key/value pairs.
    pub fn values<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Self::Values(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    pub fn env(prefix: impl Into<String>) -> Self {
        Self::Env {
            prefix: prefix.into(),
        }
    }

    /// Materialize this source into a flat key/value layer.
    pub(crate) fn load(&self) -> Result<BTreeMap<String, Value>, ConfigError> {
        match self {
            Self::Values(map) => Ok(map.clone()),
            Self::File(path) => load_toml_file(path),
            Self::Env { prefix } => Ok(collect_env_vars(prefix)),
        }
    }
}

fn load_toml_file(path: &PathBuf) -> Result<BTreeMap<String, Value>, ConfigError> {
    let expanded = shellexpand::tilde(&path.to_string_lossy().into_owned()).into_owned();

    let content = fs::read_to_string(&expanded)
        .map_err(|e| ConfigError::FileRead(expanded.clone(), e))?;

    let table: toml::Table =
        toml::from_str(&content).map_err(|e| ConfigError::TomlParse(expanded.clone(), e))?;

    let mut out = BTreeMap::new();
    flatten_table("", table, &mut out);
    debug!(path = %expanded, keys = out.len(), "loaded configuration file");
    Ok(out)
}

fn collect_env_vars(prefix: &str) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    for (key, value) in env::vars() {
        if let Some(rest) = key.strip_prefix(prefix) {
            let rest = rest.trim_start_matches('_');
            if rest.is_empty() {
                continue;
            }
            let flat = rest.to_lowercase().replace("__", ".");
            out.insert(flat, Value::String(value));
        }
    }
    debug!(prefix, keys = out.len(), "collected environment variables");
    out
}
