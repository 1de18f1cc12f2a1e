// Configuration loading for Conduit
// Layers TOML, JSON and .env files with CONDUIT_* environment variables and
// turns the result into the core's logging, negotiation and exception
// handling types.

pub mod env;
pub mod error;
pub mod loader;
pub mod settings;

pub use env::{DEFAULT_PREFIX, EnvLoader, NESTING_SEPARATOR, merge};
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};
pub use settings::{ExceptionSettings, NegotiationSettings, Settings, SettingsLoader};
