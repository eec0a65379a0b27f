use std::collections::HashMap;
use std::env;

use serde::{Deserialize, Serialize};

use crate::config::{parse_bool, ConfigError, ConfigSource, ConfigValidator, RangeValidator};

pub const ENV_STRUCTURAL_FALLBACK: &str = "WIREBOX_STRUCTURAL_FALLBACK";
pub const ENV_CLEAR_CACHE_ON_OVERRIDE: &str = "WIREBOX_CLEAR_CACHE_ON_OVERRIDE";
pub const ENV_MAX_RESOLUTION_DEPTH: &str = "WIREBOX_MAX_RESOLUTION_DEPTH";

const DEFAULT_MAX_RESOLUTION_DEPTH: usize = 64;
const MAX_RESOLUTION_DEPTH_LIMIT: usize = 4096;

/// Container behaviour switches
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Fall back to a structural scan of the registry when no exact key matches
    pub structural_fallback: bool,
    /// Default for overrides that do not say otherwise
    pub clear_cache_on_override: bool,
    /// Longest chain of nested constructions before resolution gives up
    pub max_resolution_depth: usize,
    #[serde(skip)]
    sources: HashMap<String, ConfigSource>,
}

impl ContainerConfig {
    pub fn new() -> Self {
        Self {
            structural_fallback: true,
            clear_cache_on_override: true,
            max_resolution_depth: DEFAULT_MAX_RESOLUTION_DEPTH,
            sources: HashMap::new(),
        }
    }

    pub fn with_structural_fallback(mut self, enabled: bool) -> Self {
        self.structural_fallback = enabled;
        self.sources
            .insert("structural_fallback".to_string(), ConfigSource::Programmatic);
        self
    }

    pub fn with_clear_cache_on_override(mut self, enabled: bool) -> Self {
        self.clear_cache_on_override = enabled;
        self.sources
            .insert("clear_cache_on_override".to_string(), ConfigSource::Programmatic);
        self
    }

    pub fn with_max_resolution_depth(mut self, depth: usize) -> Self {
        self.max_resolution_depth = depth;
        self.sources
            .insert("max_resolution_depth".to_string(), ConfigSource::Programmatic);
        self
    }

    /// Load configuration from environment variables over the defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::new();

        if let Ok(value) = env::var(ENV_STRUCTURAL_FALLBACK) {
            config.structural_fallback = parse_bool("structural_fallback", &value)?;
            config.sources.insert(
                "structural_fallback".to_string(),
                ConfigSource::EnvVar(ENV_STRUCTURAL_FALLBACK.to_string()),
            );
        }

        if let Ok(value) = env::var(ENV_CLEAR_CACHE_ON_OVERRIDE) {
            config.clear_cache_on_override = parse_bool("clear_cache_on_override", &value)?;
            config.sources.insert(
                "clear_cache_on_override".to_string(),
                ConfigSource::EnvVar(ENV_CLEAR_CACHE_ON_OVERRIDE.to_string()),
            );
        }

        if let Ok(value) = env::var(ENV_MAX_RESOLUTION_DEPTH) {
            config.max_resolution_depth = value.trim().parse().map_err(|_| {
                ConfigError::invalid_value(
                    "max_resolution_depth",
                    value.clone(),
                    "positive integer",
                )
            })?;
            config.sources.insert(
                "max_resolution_depth".to_string(),
                ConfigSource::EnvVar(ENV_MAX_RESOLUTION_DEPTH.to_string()),
            );
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.from_document()
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.from_document()
    }

    fn from_document(mut self) -> Result<Self, ConfigError> {
        for field in Self::FIELDS {
            self.sources.insert(field.to_string(), ConfigSource::Document);
        }
        self.validate()?;
        Ok(self)
    }

    const FIELDS: [&'static str; 3] = [
        "structural_fallback",
        "clear_cache_on_override",
        "max_resolution_depth",
    ];

    pub fn validate(&self) -> Result<(), ConfigError> {
        RangeValidator::new("max_resolution_depth", 1, MAX_RESOLUTION_DEPTH_LIMIT)
            .validate(&self.max_resolution_depth)
    }

    /// Get configuration source information for debugging
    pub fn config_sources(&self) -> HashMap<String, ConfigSource> {
        let defaults = [
            ("structural_fallback", "true".to_string()),
            ("clear_cache_on_override", "true".to_string()),
            ("max_resolution_depth", DEFAULT_MAX_RESOLUTION_DEPTH.to_string()),
        ];

        defaults
            .into_iter()
            .map(|(field, default)| {
                let source = self
                    .sources
                    .get(field)
                    .cloned()
                    .unwrap_or(ConfigSource::Default(default));
                (field.to_string(), source)
            })
            .collect()
    }
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self::new()
    }
}
