use std::collections::HashMap;
use std::time::Duration;

/// Balancing policy applied across all target groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BalancingAlgorithm {
    #[default]
    RoundRobin,
    Weighted,
    Sticky,
    LeastResponseTime,
}

impl BalancingAlgorithm {
    /// Parse the `LOAD_BALANCING_ALGORITHM` value. Unknown names fall back to
    /// round-robin.
    pub fn parse(name: &str) -> Self {
        match name.trim() {
            "WEIGHTED" => BalancingAlgorithm::Weighted,
            "STICKY" => BalancingAlgorithm::Sticky,
            "LRT" => BalancingAlgorithm::LeastResponseTime,
            _ => BalancingAlgorithm::RoundRobin,
        }
    }
}

/// One `host[:port][/base]` entry from a target group's target list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    pub host: String,
    pub port: u16,
    /// Empty, or starts with `/` and carries no trailing `/`.
    pub base_uri: String,
}

impl TargetSpec {
    /// Parse a single spec. Returns `None` for empty entries and entries with
    /// an unparsable or out-of-range port, which are skipped silently.
    pub fn parse(spec: &str) -> Option<Self> {
        let spec = spec.trim();
        if spec.is_empty() {
            return None;
        }

        let (address, base) = match spec.find('/') {
            Some(idx) => (&spec[..idx], &spec[idx..]),
            None => (spec, ""),
        };

        let (host, port) = match address.rsplit_once(':') {
            Some((host, port_str)) => {
                let port = port_str.parse::<u16>().ok().filter(|port| *port > 0)?;
                (host, port)
            }
            None => (address, 80),
        };

        if host.is_empty() {
            return None;
        }

        Some(TargetSpec {
            host: host.to_string(),
            port,
            base_uri: base.trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ListenerRuleConfig {
    pub path_prefix: String,
    pub path_rewrite: String,
    pub target_group: String,
}

#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    pub enabled: bool,
    pub path: String,
    pub interval_ms: u64,
    pub succeed_threshold: u32,
    pub failure_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: "/health".to_string(),
            interval_ms: 60_000,
            succeed_threshold: 2,
            failure_threshold: 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TargetGroupConfig {
    pub name: String,
    /// Comma-delimited `host[:port][/base]` specs, expanded at startup.
    pub targets: String,
    /// `hostname -> weight`; `None` when the WEIGHTS variable was absent.
    pub weights: Option<HashMap<String, u32>>,
    pub health_check: HealthCheckConfig,
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub listener_port: u16,
    pub connection_timeout: Duration,
    pub algorithm: BalancingAlgorithm,
    pub header_convention: bool,
    pub session_ttl_ms: u64,
    pub rules: Vec<ListenerRuleConfig>,
    pub groups: Vec<TargetGroupConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_parse_known_names() {
        assert_eq!(
            BalancingAlgorithm::parse("ROUND_ROBIN"),
            BalancingAlgorithm::RoundRobin
        );
        assert_eq!(
            BalancingAlgorithm::parse("WEIGHTED"),
            BalancingAlgorithm::Weighted
        );
        assert_eq!(
            BalancingAlgorithm::parse("STICKY"),
            BalancingAlgorithm::Sticky
        );
        assert_eq!(
            BalancingAlgorithm::parse("LRT"),
            BalancingAlgorithm::LeastResponseTime
        );
    }

    #[test]
    fn test_algorithm_parse_unknown_falls_back_to_round_robin() {
        assert_eq!(
            BalancingAlgorithm::parse("LEAST_CONN"),
            BalancingAlgorithm::RoundRobin
        );
        assert_eq!(BalancingAlgorithm::parse(""), BalancingAlgorithm::RoundRobin);
    }

    #[test]
    fn test_target_spec_full_form() {
        let spec = TargetSpec::parse("api.internal:9000/v2").expect("spec should parse");
        assert_eq!(spec.host, "api.internal");
        assert_eq!(spec.port, 9000);
        assert_eq!(spec.base_uri, "/v2");
    }

    #[test]
    fn test_target_spec_defaults() {
        let spec = TargetSpec::parse("api.internal").expect("spec should parse");
        assert_eq!(spec.port, 80);
        assert_eq!(spec.base_uri, "");
    }

    #[test]
    fn test_target_spec_base_uri_normalization() {
        // A lone "/" collapses to empty, trailing slashes are stripped.
        assert_eq!(
            TargetSpec::parse("h:81/").expect("spec should parse").base_uri,
            ""
        );
        assert_eq!(
            TargetSpec::parse("h:81/api/").expect("spec should parse").base_uri,
            "/api"
        );
    }

    #[test]
    fn test_target_spec_bad_port_is_skipped() {
        assert!(TargetSpec::parse("h:http").is_none());
        assert!(TargetSpec::parse("h:0").is_none());
        assert!(TargetSpec::parse("h:70000").is_none());
        assert!(TargetSpec::parse("").is_none());
        assert!(TargetSpec::parse("  ").is_none());
    }
}
