//! Bridge configuration, validation, and error types.
//!
//! [`BridgeConfig`] is the builder-input for [`Bridge`](crate::Bridge).
//! Every field has a default, so a TOML document only needs to name the
//! values it overrides. [`validate()`](BridgeConfig::validate) checks
//! structural invariants at startup.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected while loading or validating a [`BridgeConfig`].
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ConfigError {
    /// `fixed_delta_seconds` is NaN, infinite, or not positive.
    #[error("fixed_delta_seconds must be finite and positive, got {value}")]
    InvalidFixedDelta {
        /// The invalid value.
        value: f64,
    },
    /// A duration setting is zero.
    #[error("{name} must be at least 1 ms")]
    ZeroDuration {
        /// Name of the offending setting.
        name: &'static str,
    },
    /// An ego role name is empty.
    #[error("ego role names must not be empty")]
    EmptyEgoRoleName,
    /// The pseudo id counter would start at zero.
    #[error("pseudo_id_base must be positive")]
    ZeroPseudoIdBase,
    /// The TOML document could not be parsed.
    #[error("invalid config: {reason}")]
    Parse {
        /// Parser message.
        reason: String,
    },
}

// ── BridgeConfig ───────────────────────────────────────────────────

/// Complete configuration for a [`Bridge`](crate::Bridge).
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// Pace the simulator from the bridge. Default: true.
    pub synchronous_mode: bool,
    /// Another client drives the simulator; follow its ticks. Default: false.
    pub passive: bool,
    /// Block each step until every ego vehicle received a control
    /// command. Default: false.
    pub wait_for_vehicle_control: bool,
    /// Fixed simulation step in seconds. Default: 0.05.
    pub fixed_delta_seconds: f64,
    /// Mirror sensors spawned by other clients. Default: true.
    pub register_all_sensors: bool,
    /// Role names that mark a vehicle as consumer-controlled.
    pub ego_role_names: Vec<String>,
    /// Reconciliation interval. Default: 100 ms.
    pub update_interval_ms: u64,
    /// Per-attempt wait for a due sensor sample. Default: 1000 ms.
    pub sensor_timeout_ms: u64,
    /// Per-step wait for ego control acknowledgements. Default: 1000 ms.
    pub control_timeout_ms: u64,
    /// First id handed to pseudo objects. Default: 10000.
    pub pseudo_id_base: u64,
    /// Seed for blueprint and spawn-point selection. Default: 0.
    pub seed: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            synchronous_mode: true,
            passive: false,
            wait_for_vehicle_control: false,
            fixed_delta_seconds: 0.05,
            register_all_sensors: true,
            ego_role_names: ["hero", "ego_vehicle", "hero1", "hero2", "hero3"]
                .into_iter()
                .map(String::from)
                .collect(),
            update_interval_ms: 100,
            sensor_timeout_ms: 1000,
            control_timeout_ms: 1000,
            pseudo_id_base: 10_000,
            seed: 0,
        }
    }
}

impl BridgeConfig {
    /// Parse a TOML document and validate it.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.fixed_delta_seconds.is_finite() || self.fixed_delta_seconds <= 0.0 {
            return Err(ConfigError::InvalidFixedDelta {
                value: self.fixed_delta_seconds,
            });
        }
        for (name, value) in [
            ("update_interval_ms", self.update_interval_ms),
            ("sensor_timeout_ms", self.sensor_timeout_ms),
            ("control_timeout_ms", self.control_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroDuration { name });
            }
        }
        if self.ego_role_names.iter().any(|r| r.is_empty()) {
            return Err(ConfigError::EmptyEgoRoleName);
        }
        if self.pseudo_id_base == 0 {
            return Err(ConfigError::ZeroPseudoIdBase);
        }
        Ok(())
    }

    /// Whether the bridge drives the simulator step by step.
    pub fn sync_mode(&self) -> bool {
        self.synchronous_mode && !self.passive
    }

    /// Reconciliation interval.
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    /// Per-attempt sensor wait.
    pub fn sensor_timeout(&self) -> Duration {
        Duration::from_millis(self.sensor_timeout_ms)
    }

    /// Per-step acknowledgement wait.
    pub fn control_timeout(&self) -> Duration {
        Duration::from_millis(self.control_timeout_ms)
    }
}
