//! Connection resolution.
//!
//! A session is opened against a named connection. The name is looked up in
//! a [`SettingsStore`]; the resulting [`ConnectionDescriptor`] is handed to a
//! [`StoreConnector`] that produces the [`DataStore`].
//!
//! Three settings sources are provided:
//! - [`MemorySettings`] for tests and embedded use
//! - [`EnvSettings`], reading `WORKSESSION_<NAME>_PROVIDER` and
//!   `WORKSESSION_<NAME>_CONNECTION_STRING`
//! - [`JsonFileSettings`], reading a JSON file with a `connections` table

use crate::error::{CoreError, CoreResult};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use worksession_store::DataStore;

/// Provider and connection string of a named connection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectionSettings {
    /// Provider that understands the connection string.
    pub provider: String,
    /// Provider-specific connection string.
    pub connection_string: String,
}

impl ConnectionSettings {
    /// Creates connection settings.
    pub fn new(provider: impl Into<String>, connection_string: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            connection_string: connection_string.into(),
        }
    }
}

/// A resolved, validated connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    /// Name the connection was requested by.
    pub name: String,
    /// Provider that understands the connection string.
    pub provider: String,
    /// Provider-specific connection string.
    pub connection_string: String,
}

impl ConnectionDescriptor {
    /// Creates a descriptor.
    pub fn new(
        name: impl Into<String>,
        provider: impl Into<String>,
        connection_string: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            provider: provider.into(),
            connection_string: connection_string.into(),
        }
    }
}

/// A source of named connection settings.
pub trait SettingsStore: Send + Sync {
    /// Looks up a connection.
    ///
    /// Returns `Ok(None)` if the name is not configured and `Err` if the
    /// settings source itself is unreadable or malformed.
    fn connection(&self, name: &str) -> CoreResult<Option<ConnectionSettings>>;
}

/// Settings held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySettings {
    connections: HashMap<String, ConnectionSettings>,
}

impl MemorySettings {
    /// Creates empty settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection.
    #[must_use]
    pub fn with_connection(
        mut self,
        name: impl Into<String>,
        provider: impl Into<String>,
        connection_string: impl Into<String>,
    ) -> Self {
        self.connections.insert(
            name.into(),
            ConnectionSettings::new(provider, connection_string),
        );
        self
    }
}

impl SettingsStore for MemorySettings {
    fn connection(&self, name: &str) -> CoreResult<Option<ConnectionSettings>> {
        Ok(self.connections.get(name).cloned())
    }
}

/// Settings read from environment variables.
#[derive(Debug, Clone)]
pub struct EnvSettings {
    prefix: String,
}

impl EnvSettings {
    /// Default variable prefix.
    pub const DEFAULT_PREFIX: &'static str = "WORKSESSION";

    /// Creates settings using the default prefix.
    #[must_use]
    pub fn new() -> Self {
        Self::with_prefix(Self::DEFAULT_PREFIX)
    }

    /// Creates settings using a custom prefix.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Returns the variable name holding a connection attribute.
    #[must_use]
    pub fn variable(&self, name: &str, attribute: &str) -> String {
        let name: String = name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect();
        format!("{}_{}_{}", self.prefix, name, attribute)
    }

    fn read(&self, name: &str, attribute: &str) -> CoreResult<Option<String>> {
        match env::var(self.variable(name, attribute)) {
            Ok(value) => Ok(Some(value)),
            Err(env::VarError::NotPresent) => Ok(None),
            Err(e) => Err(CoreError::configuration_missing(name, e.to_string())),
        }
    }
}

impl Default for EnvSettings {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsStore for EnvSettings {
    fn connection(&self, name: &str) -> CoreResult<Option<ConnectionSettings>> {
        let provider = self.read(name, "PROVIDER")?;
        let connection_string = self.read(name, "CONNECTION_STRING")?;
        if provider.is_none() && connection_string.is_none() {
            return Ok(None);
        }
        Ok(Some(ConnectionSettings {
            provider: provider.unwrap_or_default(),
            connection_string: connection_string.unwrap_or_default(),
        }))
    }
}

#[derive(Debug, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    connections: HashMap<String, ConnectionSettings>,
}

/// Settings read from a JSON file.
///
/// ```json
/// { "connections": { "main": { "provider": "memory", "connection_string": "orders" } } }
/// ```
///
/// The file is read on every lookup. A missing file means nothing is
/// configured.
#[derive(Debug, Clone)]
pub struct JsonFileSettings {
    path: PathBuf,
}

impl JsonFileSettings {
    /// Creates settings backed by the given file.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Returns the settings file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for JsonFileSettings {
    fn connection(&self, name: &str) -> CoreResult<Option<ConnectionSettings>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut file: SettingsFile = serde_json::from_str(&text)?;
        Ok(file.connections.remove(name))
    }
}

/// Resolves connection names to validated descriptors.
pub struct ConnectionResolver<'a> {
    settings: &'a dyn SettingsStore,
}

impl<'a> ConnectionResolver<'a> {
    /// Creates a resolver over a settings source.
    #[must_use]
    pub fn new(settings: &'a dyn SettingsStore) -> Self {
        Self { settings }
    }

    /// Resolves a connection by name.
    ///
    /// Fails with [`CoreError::ConfigurationMissing`] if the name is not
    /// configured, the settings source cannot be read, or the provider or
    /// connection string is empty.
    pub fn resolve(&self, name: &str) -> CoreResult<ConnectionDescriptor> {
        let settings = match self.settings.connection(name) {
            Ok(Some(settings)) => settings,
            Ok(None) => {
                warn!(connection = name, "connection not configured");
                return Err(CoreError::configuration_missing(name, "not configured"));
            }
            Err(CoreError::ConfigurationMissing { reason, .. }) => {
                warn!(connection = name, %reason, "connection settings invalid");
                return Err(CoreError::configuration_missing(name, reason));
            }
            Err(e) => {
                warn!(connection = name, error = %e, "connection settings unreadable");
                return Err(CoreError::configuration_missing(name, e.to_string()));
            }
        };

        if settings.provider.trim().is_empty() {
            return Err(CoreError::configuration_missing(name, "provider is empty"));
        }
        if settings.connection_string.trim().is_empty() {
            return Err(CoreError::configuration_missing(
                name,
                "connection string is empty",
            ));
        }

        debug!(connection = name, provider = %settings.provider, "resolved connection");
        Ok(ConnectionDescriptor {
            name: name.to_string(),
            provider: settings.provider,
            connection_string: settings.connection_string,
        })
    }
}

/// Opens a data store for a resolved connection.
pub trait StoreConnector {
    /// Connects to the store described by `descriptor`.
    fn connect(&self, descriptor: &ConnectionDescriptor) -> CoreResult<Arc<dyn DataStore>>;
}

impl<F> StoreConnector for F
where
    F: Fn(&ConnectionDescriptor) -> CoreResult<Arc<dyn DataStore>>,
{
    fn connect(&self, descriptor: &ConnectionDescriptor) -> CoreResult<Arc<dyn DataStore>> {
        self(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn memory_settings_resolve() {
        let settings = MemorySettings::new().with_connection("main", "memory", "orders");
        let descriptor = ConnectionResolver::new(&settings).resolve("main").unwrap();
        assert_eq!(descriptor, ConnectionDescriptor::new("main", "memory", "orders"));
    }

    #[test]
    fn unknown_name_is_missing() {
        let settings = MemorySettings::new();
        let err = ConnectionResolver::new(&settings).resolve("main").unwrap_err();
        assert!(matches!(
            err,
            CoreError::ConfigurationMissing { ref name, .. } if name == "main"
        ));
    }

    #[test]
    fn empty_fields_are_invalid() {
        let settings = MemorySettings::new()
            .with_connection("a", "", "orders")
            .with_connection("b", "memory", "  ");
        let resolver = ConnectionResolver::new(&settings);
        assert!(matches!(
            resolver.resolve("a"),
            Err(CoreError::ConfigurationMissing { .. })
        ));
        assert!(matches!(
            resolver.resolve("b"),
            Err(CoreError::ConfigurationMissing { .. })
        ));
    }

    #[test]
    fn env_settings_resolve() {
        let settings = EnvSettings::with_prefix("WS_CONN_TEST");
        assert_eq!(
            settings.variable("reporting-db", "PROVIDER"),
            "WS_CONN_TEST_REPORTING_DB_PROVIDER"
        );
        env::set_var("WS_CONN_TEST_REPORTING_DB_PROVIDER", "memory");
        env::set_var("WS_CONN_TEST_REPORTING_DB_CONNECTION_STRING", "reports");

        let descriptor = ConnectionResolver::new(&settings)
            .resolve("reporting-db")
            .unwrap();
        assert_eq!(descriptor.provider, "memory");
        assert_eq!(descriptor.connection_string, "reports");

        assert!(ConnectionResolver::new(&settings).resolve("absent").is_err());
    }

    #[test]
    fn env_settings_partial_is_invalid() {
        let settings = EnvSettings::with_prefix("WS_PARTIAL_TEST");
        env::set_var("WS_PARTIAL_TEST_MAIN_PROVIDER", "memory");
        let err = ConnectionResolver::new(&settings).resolve("main").unwrap_err();
        assert!(err.to_string().contains("connection string is empty"));
    }

    #[test]
    fn json_file_settings() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"connections": {{"main": {{"provider": "memory", "connection_string": "orders"}}}}}}"#
        )
        .unwrap();

        let settings = JsonFileSettings::new(file.path());
        let resolver = ConnectionResolver::new(&settings);
        assert_eq!(resolver.resolve("main").unwrap().connection_string, "orders");
        assert!(resolver.resolve("other").is_err());
    }

    #[test]
    fn malformed_json_is_missing() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();

        let settings = JsonFileSettings::new(file.path());
        let err = ConnectionResolver::new(&settings).resolve("main").unwrap_err();
        assert!(matches!(err, CoreError::ConfigurationMissing { .. }));
    }

    #[test]
    fn missing_file_is_not_configured() {
        let dir = tempfile::tempdir().unwrap();
        let settings = JsonFileSettings::new(dir.path().join("settings.json"));
        assert!(settings.connection("main").unwrap().is_none());
    }
}
