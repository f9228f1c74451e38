use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::config::models::{
    BalancingAlgorithm, HealthCheckConfig, ListenerRuleConfig, ProxyConfig, TargetGroupConfig,
};
use crate::config::validation::{ConfigError, ConfigResult};

impl ProxyConfig {
    /// Load the configuration from process environment variables.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load the configuration through an arbitrary key lookup. Production code
    /// uses [`ProxyConfig::from_env`]; tests supply a map.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let listener_port = parse_var(&lookup, "LISTENER_PORT", 8080u16)?;
        let timeout_ms = parse_var(&lookup, "CONNECTION_TIMEOUT", 5000u64)?;
        let algorithm =
            BalancingAlgorithm::parse(&lookup("LOAD_BALANCING_ALGORITHM").unwrap_or_default());
        let header_convention = parse_bool(lookup("HEADER_CONVENTION_ENABLE"));
        let session_ttl_ms = parse_var(&lookup, "SESSION_TTL", 300_000u64)?;

        Ok(ProxyConfig {
            listener_port,
            connection_timeout: Duration::from_millis(timeout_ms),
            algorithm,
            header_convention,
            session_ttl_ms,
            rules: scan_rules(&lookup),
            groups: scan_groups(&lookup)?,
        })
    }
}

/// Scan `LISTENER_RULE_{N}_*` variables, N contiguous from 1. A rule without a
/// target group is skipped but does not stop the scan.
fn scan_rules<F>(lookup: &F) -> Vec<ListenerRuleConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut rules = Vec::new();
    let mut index = 1;

    loop {
        let path_prefix = match lookup(&format!("LISTENER_RULE_{index}_PATH_PREFIX")) {
            Some(prefix) if !prefix.is_empty() => prefix,
            _ => break,
        };

        let path_rewrite = lookup(&format!("LISTENER_RULE_{index}_PATH_REWRITE")).unwrap_or_default();
        let target_group = lookup(&format!("LISTENER_RULE_{index}_TARGET_GROUP"));

        match target_group {
            Some(target_group) if !target_group.is_empty() => {
                rules.push(ListenerRuleConfig {
                    path_prefix,
                    path_rewrite,
                    target_group,
                });
            }
            _ => {
                tracing::warn!(index, "listener rule has no target group, skipping");
            }
        }

        index += 1;
    }

    rules
}

/// Scan `TARGET_GROUP_{N}_*` variables, N contiguous from 1. A group with an
/// empty target list contributes nothing.
fn scan_groups<F>(lookup: &F) -> ConfigResult<Vec<TargetGroupConfig>>
where
    F: Fn(&str) -> Option<String>,
{
    let mut groups = Vec::new();
    let mut index = 1;

    loop {
        let name = match lookup(&format!("TARGET_GROUP_{index}_NAME")) {
            Some(name) if !name.is_empty() => name,
            _ => break,
        };

        let targets = lookup(&format!("TARGET_GROUP_{index}_TARGETS")).unwrap_or_default();
        if targets.is_empty() {
            tracing::warn!(group = %name, "target group has no targets, skipping");
            index += 1;
            continue;
        }

        let weights_key = format!("TARGET_GROUP_{index}_WEIGHTS");
        let weights = match lookup(&weights_key) {
            Some(raw) => Some(parse_weights(&weights_key, &raw)?),
            None => None,
        };

        let defaults = HealthCheckConfig::default();
        let health_check = HealthCheckConfig {
            enabled: parse_bool(lookup(&format!("TARGET_GROUP_{index}_HEALTH_CHECK_ENABLED"))),
            path: lookup(&format!("TARGET_GROUP_{index}_HEALTH_CHECK_PATH"))
                .filter(|path| !path.is_empty())
                .unwrap_or(defaults.path),
            interval_ms: parse_var(
                lookup,
                &format!("TARGET_GROUP_{index}_HEALTH_CHECK_INTERVAL"),
                defaults.interval_ms,
            )?,
            succeed_threshold: parse_var(
                lookup,
                &format!("TARGET_GROUP_{index}_HEALTH_CHECK_SUCCEED_THRESHOLD"),
                defaults.succeed_threshold,
            )?,
            failure_threshold: parse_var(
                lookup,
                &format!("TARGET_GROUP_{index}_HEALTH_CHECK_FAILURE_THRESHOLD"),
                defaults.failure_threshold,
            )?,
        };

        groups.push(TargetGroupConfig {
            name,
            targets,
            weights,
            health_check,
        });

        index += 1;
    }

    Ok(groups)
}

/// Parse a comma list of `hostname:weight` entries. Malformed entries are
/// fatal rather than silently dropped.
fn parse_weights(key: &str, raw: &str) -> ConfigResult<HashMap<String, u32>> {
    let mut weights = HashMap::new();

    for entry in raw.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }

        let parsed = entry.rsplit_once(':').and_then(|(host, weight)| {
            let weight = weight.trim().parse::<u32>().ok()?;
            Some((host.trim().to_string(), weight))
        });

        match parsed {
            Some((host, weight)) if !host.is_empty() => {
                weights.insert(host, weight.max(1));
            }
            _ => {
                return Err(ConfigError::InvalidWeight {
                    key: key.to_string(),
                    entry: entry.to_string(),
                });
            }
        }
    }

    Ok(weights)
}

fn parse_bool(raw: Option<String>) -> bool {
    raw.is_some_and(|value| value.trim().eq_ignore_ascii_case("true"))
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> ConfigResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw,
            })
        }
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_with_empty_environment() {
        let config =
            ProxyConfig::from_lookup(|_| None).expect("empty environment should load defaults");

        assert_eq!(config.listener_port, 8080);
        assert_eq!(config.connection_timeout, Duration::from_millis(5000));
        assert_eq!(config.algorithm, BalancingAlgorithm::RoundRobin);
        assert!(!config.header_convention);
        assert_eq!(config.session_ttl_ms, 300_000);
        assert!(config.rules.is_empty());
        assert!(config.groups.is_empty());
    }

    #[test]
    fn test_contiguous_rule_scan_stops_at_gap() {
        let lookup = lookup_from(&[
            ("LISTENER_RULE_1_PATH_PREFIX", "/a"),
            ("LISTENER_RULE_1_TARGET_GROUP", "g1"),
            ("LISTENER_RULE_2_PATH_PREFIX", "/b"),
            ("LISTENER_RULE_2_TARGET_GROUP", "g2"),
            // Rule 3 is missing; rule 4 must not be discovered.
            ("LISTENER_RULE_4_PATH_PREFIX", "/d"),
            ("LISTENER_RULE_4_TARGET_GROUP", "g4"),
        ]);

        let config = ProxyConfig::from_lookup(lookup).expect("config should load");
        let prefixes: Vec<&str> = config.rules.iter().map(|r| r.path_prefix.as_str()).collect();
        assert_eq!(prefixes, vec!["/a", "/b"]);
    }

    #[test]
    fn test_rule_without_target_group_is_skipped_but_scan_continues() {
        let lookup = lookup_from(&[
            ("LISTENER_RULE_1_PATH_PREFIX", "/orphan"),
            ("LISTENER_RULE_2_PATH_PREFIX", "/api"),
            ("LISTENER_RULE_2_PATH_REWRITE", "/api"),
            ("LISTENER_RULE_2_TARGET_GROUP", "backend"),
        ]);

        let config = ProxyConfig::from_lookup(lookup).expect("config should load");
        assert_eq!(config.rules.len(), 1);
        assert_eq!(config.rules[0].path_prefix, "/api");
        assert_eq!(config.rules[0].path_rewrite, "/api");
        assert_eq!(config.rules[0].target_group, "backend");
    }

    #[test]
    fn test_group_scan_with_weights_and_health() {
        let lookup = lookup_from(&[
            ("TARGET_GROUP_1_NAME", "web"),
            ("TARGET_GROUP_1_TARGETS", "h1:8081,h2:8082"),
            ("TARGET_GROUP_1_WEIGHTS", "h1:1, h2:3"),
            ("TARGET_GROUP_1_HEALTH_CHECK_ENABLED", "true"),
            ("TARGET_GROUP_1_HEALTH_CHECK_PATH", "/ping"),
            ("TARGET_GROUP_1_HEALTH_CHECK_INTERVAL", "500"),
            ("TARGET_GROUP_1_HEALTH_CHECK_SUCCEED_THRESHOLD", "1"),
            ("TARGET_GROUP_1_HEALTH_CHECK_FAILURE_THRESHOLD", "4"),
        ]);

        let config = ProxyConfig::from_lookup(lookup).expect("config should load");
        assert_eq!(config.groups.len(), 1);

        let group = &config.groups[0];
        assert_eq!(group.name, "web");
        let weights = group.weights.as_ref().expect("weights should be present");
        assert_eq!(weights.get("h1"), Some(&1));
        assert_eq!(weights.get("h2"), Some(&3));
        assert!(group.health_check.enabled);
        assert_eq!(group.health_check.path, "/ping");
        assert_eq!(group.health_check.interval_ms, 500);
        assert_eq!(group.health_check.succeed_threshold, 1);
        assert_eq!(group.health_check.failure_threshold, 4);
    }

    #[test]
    fn test_group_health_defaults() {
        let lookup = lookup_from(&[
            ("TARGET_GROUP_1_NAME", "web"),
            ("TARGET_GROUP_1_TARGETS", "h1:8081"),
        ]);

        let config = ProxyConfig::from_lookup(lookup).expect("config should load");
        let health = &config.groups[0].health_check;
        assert!(!health.enabled);
        assert_eq!(health.path, "/health");
        assert_eq!(health.interval_ms, 60_000);
        assert_eq!(health.succeed_threshold, 2);
        assert_eq!(health.failure_threshold, 2);
        assert!(config.groups[0].weights.is_none());
    }

    #[test]
    fn test_malformed_weight_entry_is_fatal() {
        let lookup = lookup_from(&[
            ("TARGET_GROUP_1_NAME", "web"),
            ("TARGET_GROUP_1_TARGETS", "h1:8081"),
            ("TARGET_GROUP_1_WEIGHTS", "h1:not-a-number"),
        ]);

        let err = ProxyConfig::from_lookup(lookup).expect_err("weights should be rejected");
        assert!(matches!(err, ConfigError::InvalidWeight { .. }));
    }

    #[test]
    fn test_malformed_numeric_variable_is_fatal() {
        let lookup = lookup_from(&[("LISTENER_PORT", "eighty")]);
        let err = ProxyConfig::from_lookup(lookup).expect_err("port should be rejected");
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_zero_weight_is_clamped_to_one() {
        let lookup = lookup_from(&[
            ("TARGET_GROUP_1_NAME", "web"),
            ("TARGET_GROUP_1_TARGETS", "h1:8081"),
            ("TARGET_GROUP_1_WEIGHTS", "h1:0"),
        ]);

        let config = ProxyConfig::from_lookup(lookup).expect("config should load");
        let weights = config.groups[0].weights.as_ref().expect("weights present");
        assert_eq!(weights.get("h1"), Some(&1));
    }
}
