//! Configuration for the surface layer

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Settings for the context registry and surface backends
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSurfaceConfig {
    /// Shader cache directory handed to the drawing library. When absent the
    /// library recompiles shaders on every process start.
    pub cache_dir: Option<String>,
    /// Whether the context registry may be fully torn down while unused and
    /// lazily rebuilt on next access.
    pub recyclable_context: bool,
    /// Create a dedicated protected-memory redraw device for DRM content.
    pub enable_protected_redraw: bool,
    /// Tick interval in milliseconds for the software vsync fallback.
    pub soft_vsync_interval_ms: u64,
}

impl Default for RenderSurfaceConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            recyclable_context: true,
            enable_protected_redraw: false,
            soft_vsync_interval_ms: 16,
        }
    }
}

impl RenderSurfaceConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

        if path.ends_with(".toml") {
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }
}
