// Environment variable loading
//
// Variables named `<PREFIX>_<SECTION>__<KEY>` become `{ section: { key: value } }`.
// A double underscore separates nesting levels; single underscores stay part
// of the key, so `CONDUIT_LOGGING__THREAD_IDS` sets `logging.thread_ids`.

use crate::{ConfigError, Result};
use serde_json::{Map, Value};
use std::env;

/// Prefix used when none is given.
pub const DEFAULT_PREFIX: &str = "CONDUIT";

/// Separator between nesting levels in a variable name.
pub const NESTING_SEPARATOR: &str = "__";

/// Environment variable loader
#[derive(Debug, Clone)]
pub struct EnvLoader {
    prefix: String,
}

impl EnvLoader {
    /// Create a loader reading variables that start with `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into().trim_end_matches('_').to_uppercase();
        Self { prefix }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Build an override tree from the process environment.
    pub fn load(&self) -> Value {
        self.load_from(env::vars())
    }

    /// Build an override tree from the given variables, ignoring those
    /// without the prefix.
    pub fn load_from<I, K, V>(&self, vars: I) -> Value
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut tree = Value::Object(Map::new());
        for (key, value) in vars {
            if let Some(path) = self.strip(key.as_ref()) {
                insert_path(&mut tree, &path, parse_scalar(value.into()));
            }
        }
        tree
    }

    /// Read one variable by its unprefixed name, e.g. `LOGGING__LEVEL`.
    pub fn load_var(&self, key: &str) -> Result<String> {
        let full_key = format!("{}_{}", self.prefix, key.to_uppercase());
        env::var(&full_key).map_err(|e| ConfigError::LoadError(format!("{full_key}: {e}")))
    }

    /// Read one variable, falling back to `default`.
    pub fn load_var_or(&self, key: &str, default: &str) -> String {
        self.load_var(key).unwrap_or_else(|_| default.to_string())
    }

    fn strip(&self, key: &str) -> Option<Vec<String>> {
        let rest = key.strip_prefix(&self.prefix)?.strip_prefix('_')?;
        key_path(rest)
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

/// Split a variable name into lowercase path segments.
pub(crate) fn key_path(key: &str) -> Option<Vec<String>> {
    let path: Vec<String> = key
        .split(NESTING_SEPARATOR)
        .map(|segment| segment.trim().to_lowercase())
        .collect();
    if path.iter().any(String::is_empty) {
        return None;
    }
    Some(path)
}

/// Environment values are strings; booleans are the only scalars settings need.
pub(crate) fn parse_scalar(value: String) -> Value {
    match value.trim() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(value),
    }
}

pub(crate) fn insert_path(tree: &mut Value, path: &[String], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };

    let mut node = tree;
    for segment in parents {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let Value::Object(map) = node else {
            return;
        };
        node = map
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        map.insert(last.clone(), value);
    }
}

/// Deep-merge `overlay` into `base`. Objects merge key by key; anything else
/// in `overlay` replaces what `base` had.
pub fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
