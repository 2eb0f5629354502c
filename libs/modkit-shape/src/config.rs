//! Shaping configuration.
//!
//! Layered with figment: built-in defaults, then an optional YAML file, then
//! `MODKIT_SHAPE__*` environment variables (`__` separates nested keys, e.g.
//! `MODKIT_SHAPE__DELTA__RETENTION=1h`).

use std::path::Path;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::naming::NamingPolicy;
use crate::query::QueryLimits;
use crate::shape::ShapeOptions;

pub const ENV_PREFIX: &str = "MODKIT_SHAPE__";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShapeConfig {
    /// Wire naming for member names and nested object keys.
    pub naming_policy: NamingPolicy,

    /// Drop members whose value is null from shaped output.
    pub ignore_nulls: bool,

    pub limits: QueryLimits,

    pub delta: DeltaConfig,
}

impl Default for ShapeConfig {
    fn default() -> Self {
        Self {
            naming_policy: NamingPolicy::CamelCase,
            ignore_nulls: false,
            limits: QueryLimits::default(),
            delta: DeltaConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeltaConfig {
    /// How long an issued delta link stays resolvable.
    #[serde(default = "default_retention", with = "humantime_serde")]
    pub retention: Duration,
}

fn default_retention() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

impl Default for DeltaConfig {
    fn default() -> Self {
        Self {
            retention: default_retention(),
        }
    }
}

impl ShapeConfig {
    /// Load from defaults, `path` (when given) and the environment.
    ///
    /// # Errors
    /// Returns `ConfigError` when a layer holds an unknown key or a value of
    /// the wrong type.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        Self::from_figment(&figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// # Errors
    /// Returns `ConfigError` when the figment does not extract.
    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        Ok(figment.extract()?)
    }

    #[must_use]
    pub fn shape_options(&self) -> ShapeOptions {
        ShapeOptions {
            naming: self.naming_policy,
            ignore_nulls: self.ignore_nulls,
        }
    }
}
