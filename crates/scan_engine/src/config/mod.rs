//! Configuration system
//!
//! Tuning knobs for index construction and space carving. Every section
//! has working defaults; files are only needed to override them.

pub use serde::{Serialize, Deserialize};

use crate::foundation::math::utils::deg_to_rad;

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(ConfigError::Io)?;

        // Try different formats
        if path.ends_with(".toml") {
            Self::from_toml_str(&contents)
        } else if path.ends_with(".ron") {
            ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Parse configuration from TOML text
    fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, Default::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Point index construction and query settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointIndexConfig {
    /// Subsets at or below this size become leaves
    pub leaf_threshold: usize,

    /// Maximum angle between a query normal and an accepted point normal
    pub normal_tolerance_degrees: f32,
}

impl Default for PointIndexConfig {
    fn default() -> Self {
        Self {
            leaf_threshold: 16,
            normal_tolerance_degrees: 45.0,
        }
    }
}

impl PointIndexConfig {
    /// Normal tolerance in radians
    pub fn normal_tolerance(&self) -> f32 {
        deg_to_rad(self.normal_tolerance_degrees)
    }
}

/// Ray cache and carving sweep settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarveConfig {
    /// Cells per side of the direction grid
    pub grid_resolution: usize,

    /// Relative padding applied to cube spheres when selecting and caching
    /// candidate rays
    pub sphere_inflation: f32,

    /// Deepest subdivision level a sweep will reach
    pub max_depth: u32,
}

impl Default for CarveConfig {
    fn default() -> Self {
        Self {
            grid_resolution: 128,
            sphere_inflation: 1e-3,
            max_depth: 6,
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Point index settings
    pub point_index: PointIndexConfig,

    /// Carving settings
    pub carving: CarveConfig,
}

impl Config for EngineConfig {}
