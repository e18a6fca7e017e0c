//! Configuration management.

use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Path to the `SQLite` database file.
    pub database_path: PathBuf,
    /// Drop and recreate every table at startup. Destroys all data;
    /// intended for development and test harnesses.
    pub refresh_database_at_startup: bool,
    /// Name given to the budget the factory creates when the catalog is
    /// empty.
    pub default_budget_name: String,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Database file path.
    pub database_path: Option<String>,
    /// Drop and recreate tables at startup.
    pub refresh_database_at_startup: Option<bool>,
    /// Default budget name.
    pub default_budget_name: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            refresh_database_at_startup: false,
            default_budget_name: "My Budget".to_string(),
        }
    }
}

impl EngineConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] if the file cannot be read
    /// or parsed.
    pub fn load_from_file(path: &std::path::Path) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::InvalidInput(format!("read config file: {e}")))?;

        let file: ConfigFile = toml::from_str(&contents)
            .map_err(|e| crate::Error::InvalidInput(format!("parse config file: {e}")))?;

        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the following paths in order:
    /// 1. Platform-specific config dir (`~/Library/Application Support/fiscus/` on macOS)
    /// 2. XDG config dir (`~/.config/fiscus/` for Unix compatibility)
    ///
    /// Returns default configuration if no config file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let platform_config = base_dirs.config_dir().join("fiscus").join("config.toml");
        if platform_config.exists() {
            if let Ok(config) = Self::load_from_file(&platform_config) {
                return config;
            }
        }

        let xdg_config = base_dirs
            .home_dir()
            .join(".config")
            .join("fiscus")
            .join("config.toml");
        if xdg_config.exists() {
            if let Ok(config) = Self::load_from_file(&xdg_config) {
                return config;
            }
        }

        Self::default()
    }

    /// Converts a `ConfigFile` to `EngineConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(database_path) = file.database_path {
            config.database_path = PathBuf::from(database_path);
        }
        if let Some(refresh) = file.refresh_database_at_startup {
            config.refresh_database_at_startup = refresh;
        }
        if let Some(name) = file.default_budget_name {
            config.default_budget_name = name;
        }

        config
    }

    /// Sets the database path.
    #[must_use]
    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    /// Sets the default budget name.
    #[must_use]
    pub fn with_default_budget_name(mut self, name: impl Into<String>) -> Self {
        self.default_budget_name = name.into();
        self
    }
}

/// Platform data directory (`~/.local/share/fiscus/fiscus.db` on Linux),
/// falling back to the working directory when no home is resolvable.
fn default_database_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "fiscus").map_or_else(
        || PathBuf::from("fiscus.db"),
        |dirs| dirs.data_dir().join("fiscus.db"),
    )
}
