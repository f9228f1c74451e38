use thiserror::Error;

use crate::config::models::{BalancingAlgorithm, ProxyConfig, TargetSpec};

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },

    #[error("Invalid weight entry '{entry}' in {key} (expected hostname:weight)")]
    InvalidWeight { key: String, entry: String },

    #[error("Target group '{group}' is configured for WEIGHTED balancing but has no weights map")]
    MissingWeights { group: String },

    #[error("Target group '{group}' has no weight entry for hostname '{hostname}'")]
    MissingWeightEntry { group: String, hostname: String },

    #[error("Listener rule path prefix must not be empty")]
    EmptyPathPrefix,

    #[error("Configuration validation failed: {message}")]
    ValidationFailed { message: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Startup configuration validator. Everything reported here is fatal; the
/// process must not serve traffic with a partially understood configuration.
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &ProxyConfig) -> ConfigResult<()> {
        let mut errors = Vec::new();

        for rule in &config.rules {
            if rule.path_prefix.is_empty() {
                errors.push(ConfigError::EmptyPathPrefix);
            }
        }

        if config.algorithm == BalancingAlgorithm::Weighted {
            for group in &config.groups {
                let Some(weights) = &group.weights else {
                    errors.push(ConfigError::MissingWeights {
                        group: group.name.clone(),
                    });
                    continue;
                };

                for spec in group.targets.split(',').filter_map(TargetSpec::parse) {
                    if !weights.contains_key(&spec.host) {
                        errors.push(ConfigError::MissingWeightEntry {
                            group: group.name.clone(),
                            hostname: spec.host,
                        });
                    }
                }
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::ValidationFailed {
                message: errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; "),
            }),
        }
    }
}
