// Typed settings for the kernel, the exception handler and logging

use crate::env::{EnvLoader, merge};
use crate::loader::ConfigLoader;
use crate::{ConfigError, Result};
use conduit_core::{
    ErrorKind, ExceptionHandler, ExceptionHandlerConfig, JsonMediaTypeFormatter, Kernel, LogConfig,
    MediaTypeNegotiator, PlainTextMediaTypeFormatter, Severity, SeveritySet,
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// All settings, one section per concern.
///
/// Every section and field is optional in the source; missing ones take
/// their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub logging: LogConfig,
    pub exceptions: ExceptionSettings,
    pub negotiation: NegotiationSettings,
}

/// What the exception handler logs and raises.
///
/// Lists accept either an array or a comma-separated string, so they can be
/// set from an environment variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExceptionSettings {
    #[serde(deserialize_with = "string_or_list")]
    pub logged_severities: Vec<String>,
    #[serde(deserialize_with = "string_or_list")]
    pub thrown_severities: Vec<String>,
    /// Error kinds never logged, e.g. `route_not_found`.
    #[serde(deserialize_with = "string_or_list")]
    pub unlogged_kinds: Vec<String>,
}

impl Default for ExceptionSettings {
    fn default() -> Self {
        let defaults = ExceptionHandlerConfig::default();
        Self {
            logged_severities: severity_names(defaults.logged_severities),
            thrown_severities: severity_names(defaults.thrown_severities),
            unlogged_kinds: Vec::new(),
        }
    }
}

/// Formatters offered for negotiation, in preference order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NegotiationSettings {
    /// `json` and/or `text`
    #[serde(deserialize_with = "string_or_list")]
    pub formatters: Vec<String>,
    pub default_charset: String,
}

impl Default for NegotiationSettings {
    fn default() -> Self {
        Self {
            formatters: vec!["json".to_string(), "text".to_string()],
            default_charset: "utf-8".to_string(),
        }
    }
}

impl Settings {
    /// Deserialize settings from a value tree.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| ConfigError::DeserializationError(e.to_string()))
    }

    /// Load settings from a single file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        SettingsLoader::new().file(path)?.build()
    }

    /// Defaults overridden by `CONDUIT_*` environment variables.
    pub fn from_env() -> Result<Self> {
        SettingsLoader::new().env().build()
    }

    pub fn log_config(&self) -> LogConfig {
        self.logging.clone()
    }

    pub fn exception_handler_config(&self) -> Result<ExceptionHandlerConfig> {
        let exceptions = &self.exceptions;
        let mut config = ExceptionHandlerConfig::new()
            .logged_severities(parse_severities("exceptions.logged_severities", &exceptions.logged_severities)?)
            .thrown_severities(parse_severities("exceptions.thrown_severities", &exceptions.thrown_severities)?);

        for name in &exceptions.unlogged_kinds {
            let kind =
                ErrorKind::from_str(name).ok_or_else(|| ConfigError::invalid("exceptions.unlogged_kinds", name.clone()))?;
            config = config.without_logging(kind);
        }

        Ok(config)
    }

    /// An exception handler with the default registry and these settings.
    pub fn exception_handler(&self) -> Result<ExceptionHandler> {
        Ok(ExceptionHandler::default().with_config(self.exception_handler_config()?))
    }

    pub fn negotiator(&self) -> Result<MediaTypeNegotiator> {
        let negotiation = &self.negotiation;
        if negotiation.formatters.is_empty() {
            return Err(ConfigError::ValidationError(
                "negotiation.formatters needs at least one formatter".to_string(),
            ));
        }
        if negotiation.default_charset.trim().is_empty() {
            return Err(ConfigError::invalid("negotiation.default_charset", ""));
        }

        let mut negotiator = MediaTypeNegotiator::new().with_default_charset(negotiation.default_charset.trim());
        for name in &negotiation.formatters {
            negotiator = match name.trim().to_lowercase().as_str() {
                "json" => negotiator.with_formatter(JsonMediaTypeFormatter::new()),
                "text" | "plain" => negotiator.with_formatter(PlainTextMediaTypeFormatter::new()),
                _ => return Err(ConfigError::invalid("negotiation.formatters", name.clone())),
            };
        }

        Ok(negotiator)
    }

    /// Check every section can be turned into its core type.
    pub fn validate(&self) -> Result<()> {
        self.logging
            .env_filter()
            .map_err(|e| ConfigError::ValidationError(format!("logging: {}", e)))?;
        self.exception_handler_config()?;
        self.negotiator()?;
        Ok(())
    }

    /// Install the negotiator and exception handler on `kernel`.
    pub fn configure(&self, kernel: Kernel) -> Result<Kernel> {
        Ok(kernel
            .with_negotiator(Arc::new(self.negotiator()?))
            .with_exception_handler(self.exception_handler()?))
    }
}

/// Layers configuration sources, later ones overriding earlier ones.
#[derive(Debug, Clone)]
pub struct SettingsLoader {
    tree: Value,
    env: EnvLoader,
}

impl SettingsLoader {
    pub fn new() -> Self {
        Self {
            tree: Value::Object(Map::new()),
            env: EnvLoader::default(),
        }
    }

    /// Use a different environment variable prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env = EnvLoader::new(prefix);
        self
    }

    /// Layer a TOML, JSON or env file.
    pub fn file(mut self, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let layer = ConfigLoader::auto(path)?.load_file(path)?;
        debug!(path = %path.display(), "Loaded configuration file");
        merge(&mut self.tree, layer);
        Ok(self)
    }

    /// Layer a file if it exists.
    pub fn optional_file(self, path: impl AsRef<Path>) -> Result<Self> {
        if path.as_ref().exists() {
            self.file(path)
        } else {
            Ok(self)
        }
    }

    /// Layer a `.env` file's prefixed variables without touching the
    /// process environment.
    pub fn dotenv(mut self, path: impl AsRef<Path>) -> Result<Self> {
        let mut vars = Vec::new();
        for item in dotenvy::from_path_iter(path.as_ref()).map_err(|e| ConfigError::LoadError(e.to_string()))? {
            vars.push(item.map_err(|e| ConfigError::ParseError(e.to_string()))?);
        }
        merge(&mut self.tree, self.env.load_from(vars));
        Ok(self)
    }

    /// Layer the process environment.
    pub fn env(mut self) -> Self {
        merge(&mut self.tree, self.env.load());
        self
    }

    /// Layer explicit variables, as if they came from the environment.
    pub fn vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        merge(&mut self.tree, self.env.load_from(vars));
        self
    }

    /// Layer a value tree.
    pub fn value(mut self, value: Value) -> Self {
        merge(&mut self.tree, value);
        self
    }

    /// Deserialize and validate the layered settings.
    pub fn build(self) -> Result<Settings> {
        let settings = Settings::from_value(self.tree)?;
        settings.validate()?;
        Ok(settings)
    }
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_severities(key: &str, names: &[String]) -> Result<SeveritySet> {
    names
        .iter()
        .map(|name| Severity::from_str(name).ok_or_else(|| ConfigError::invalid(key, name.clone())))
        .collect()
}

fn severity_names(set: SeveritySet) -> Vec<String> {
    set.iter().map(|s| s.as_str().to_string()).collect()
}

fn string_or_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        OneOrMany::Many(list) => list,
    })
}
