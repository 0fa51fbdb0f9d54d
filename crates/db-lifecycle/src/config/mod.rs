//! Configuration loading and validation.
//!
//! Configuration is plain YAML deserialized with serde; see
//! [`Config::from_yaml`] for the schema. Driver-specific connection options
//! are built from these settings inside the engine managers.

mod types;
mod validation;

use std::path::Path;

use crate::error::Result;

pub use types::{AdminConfig, Config, ConnectionConfig};

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    /// Parse configuration from a YAML string and validate it.
    ///
    /// ```
    /// use db_lifecycle::Config;
    ///
    /// let config = Config::from_yaml(r#"
    /// dialect: postgres
    /// connection:
    ///   host: localhost
    ///   user: app
    ///   password: secret
    ///   database: app_test
    /// admin:
    ///   super_user: postgres
    ///   super_password: secret
    ///   collation_candidates: ["en_US.utf8", "C.UTF-8"]
    /// "#)
    /// .unwrap();
    /// assert_eq!(config.connection.database, "app_test");
    /// ```
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate field values. Called by [`Config::from_yaml`] and by the
    /// manager factory for configurations built in code.
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}
