// Configuration file loaders

use crate::env::{DEFAULT_PREFIX, insert_path, key_path, parse_scalar};
use crate::{ConfigError, Result};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Toml,
    Env,
}

impl FileFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "json" => Some(FileFormat::Json),
            "toml" => Some(FileFormat::Toml),
            "env" => Some(FileFormat::Env),
            _ => None,
        }
    }

    /// Detect the format of `path`. A bare `.env` file is the env format.
    pub fn from_path(path: &Path) -> Option<Self> {
        if path.file_name().and_then(|n| n.to_str()) == Some(".env") {
            return Some(FileFormat::Env);
        }
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

/// Parses configuration files into a `serde_json::Value` tree.
#[derive(Debug, Clone, Copy)]
pub struct ConfigLoader {
    format: FileFormat,
}

impl ConfigLoader {
    pub fn new(format: FileFormat) -> Self {
        Self { format }
    }

    /// Pick the format from the file name.
    pub fn auto(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let format = FileFormat::from_path(path)
            .ok_or_else(|| ConfigError::LoadError(format!("Unsupported format: {}", path.display())))?;
        Ok(Self::new(format))
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    /// Load configuration from file
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Value> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadError(format!("Failed to read {}: {}", path.display(), e)))?;

        self.parse(&content)
    }

    /// Parse configuration from string
    pub fn parse(&self, content: &str) -> Result<Value> {
        let value = match self.format {
            FileFormat::Json => Self::parse_json(content)?,
            FileFormat::Toml => Self::parse_toml(content)?,
            FileFormat::Env => Self::parse_env(content)?,
        };

        if !value.is_object() {
            return Err(ConfigError::ParseError("top level must be a table".to_string()));
        }
        Ok(value)
    }

    fn parse_json(content: &str) -> Result<Value> {
        serde_json::from_str(content).map_err(|e| ConfigError::ParseError(format!("JSON parse error: {}", e)))
    }

    fn parse_toml(content: &str) -> Result<Value> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))
    }

    /// `KEY=value` lines, nested on `__` like environment variables. The
    /// `CONDUIT_` prefix is optional in files.
    fn parse_env(content: &str) -> Result<Value> {
        let mut tree = Value::Object(Map::new());

        for item in dotenvy::from_read_iter(content.as_bytes()) {
            let (key, value) = item.map_err(|e| ConfigError::ParseError(format!("env parse error: {}", e)))?;
            let name = key
                .strip_prefix(DEFAULT_PREFIX)
                .and_then(|rest| rest.strip_prefix('_'))
                .unwrap_or(&key);
            let path = key_path(name).ok_or_else(|| ConfigError::invalid(&key, value.clone()))?;
            insert_path(&mut tree, &path, parse_scalar(value));
        }

        Ok(tree)
    }
}
