use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
}

fn default_use_switching_function() -> bool {
    true
}

/// Options controlling how forces are emitted for one topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SystemConfig {
    /// Whether the system has a periodic box.
    pub periodic: bool,
    #[serde(default = "default_use_switching_function")]
    pub use_switching_function: bool,
    #[serde(default)]
    pub long_range_correction: bool,
}

impl SystemConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigLoadError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigLoadError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigLoadError::Toml {
            path: path.to_string_lossy().to_string(),
            source: e,
        })
    }
}

#[derive(Default)]
pub struct SystemConfigBuilder {
    periodic: Option<bool>,
    use_switching_function: Option<bool>,
    long_range_correction: Option<bool>,
}

impl SystemConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn periodic(mut self, periodic: bool) -> Self {
        self.periodic = Some(periodic);
        self
    }
    pub fn use_switching_function(mut self, enabled: bool) -> Self {
        self.use_switching_function = Some(enabled);
        self
    }
    pub fn long_range_correction(mut self, enabled: bool) -> Self {
        self.long_range_correction = Some(enabled);
        self
    }

    pub fn build(self) -> Result<SystemConfig, ConfigError> {
        Ok(SystemConfig {
            periodic: self
                .periodic
                .ok_or(ConfigError::MissingParameter("periodic"))?,
            use_switching_function: self
                .use_switching_function
                .unwrap_or_else(default_use_switching_function),
            long_range_correction: self.long_range_correction.unwrap_or(false),
        })
    }
}
