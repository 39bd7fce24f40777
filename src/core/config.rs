//! Engine configuration
//!
//! Built in code with `with_*` setters or loaded from RON. Every field has a
//! default, so a config file only needs the fields it changes:
//!
//! ```ron
//! (
//!     asset_dir: Some("assets/game"),
//!     log_events: false,
//! )
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Paths of the assets the engine loads at startup, inside the engine
/// assembly
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultAssets {
    /// Texture shown in place of anything that failed to load
    pub missing_texture: String,
    pub shader: String,
    pub material: String,
    pub font_package: String,
}

impl Default for DefaultAssets {
    fn default() -> Self {
        Self {
            missing_texture: String::from("textures/missing.png"),
            shader: String::from("shaders/default.json"),
            material: String::from("materials/default.json"),
            font_package: String::from("fonts/default.json"),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Name the built-in assembly is registered under
    pub engine_assembly: String,
    /// Name the application assembly is registered under
    pub app_assembly: String,
    /// Directory served as the application assembly, if any
    pub asset_dir: Option<PathBuf>,
    /// Location prefix given to libraries created through the engine
    pub library_location: String,
    /// Log every lifecycle event at `info`
    pub log_events: bool,
    pub defaults: DefaultAssets,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            engine_assembly: String::from("engine"),
            app_assembly: String::from("game"),
            asset_dir: None,
            library_location: String::new(),
            log_events: true,
            defaults: DefaultAssets::default(),
        }
    }
}

impl EngineConfig {
    /// Set the application asset directory
    #[must_use]
    pub fn with_asset_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.asset_dir = Some(dir.into());
        self
    }

    /// Set the application assembly name
    #[must_use]
    pub fn with_app_assembly(mut self, name: impl Into<String>) -> Self {
        self.app_assembly = name.into();
        self
    }

    /// Set the location prefix for new libraries
    #[must_use]
    pub fn with_library_location(mut self, location: impl Into<String>) -> Self {
        self.library_location = location.into();
        self
    }

    /// Enable or disable event logging
    #[must_use]
    pub fn with_log_events(mut self, log_events: bool) -> Self {
        self.log_events = log_events;
        self
    }

    /// Replace the default asset paths
    #[must_use]
    pub fn with_defaults(mut self, defaults: DefaultAssets) -> Self {
        self.defaults = defaults;
        self
    }

    /// Check for settings the engine cannot start with
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` describing the problem
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine_assembly.is_empty() || self.app_assembly.is_empty() {
            return Err(ConfigError::Invalid("assembly names must not be empty".into()));
        }
        if self.engine_assembly == self.app_assembly {
            return Err(ConfigError::Invalid(format!(
                "engine and application assemblies share the name `{}`",
                self.app_assembly
            )));
        }
        if let Some(dir) = &self.asset_dir {
            if !dir.is_dir() {
                return Err(ConfigError::Invalid(format!(
                    "asset directory {} does not exist",
                    dir.display()
                )));
            }
        }
        Ok(())
    }

    /// Parse a config from RON text
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Deserialize` if the text is not a valid config
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        ron::from_str(text).map_err(|e| ConfigError::Deserialize(e.to_string()))
    }

    /// Load a config from a RON file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn load_ron(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_ron_str(&content)
    }

    /// Save the config as pretty RON
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails
    pub fn save_ron(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;
        fs::write(path, text)?;
        Ok(())
    }
}

/// Errors that can occur while loading or checking a config
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Deserialization error: {0}")]
    Deserialize(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}
