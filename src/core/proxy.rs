use std::collections::HashMap;
use std::sync::Arc;

use http::StatusCode;
use thiserror::Error;

use crate::config::models::ProxyConfig;
use crate::core::rules::{ListenerRule, RuleTable};
use crate::core::selector::{ClientInfo, Selector};
use crate::core::target::Target;
use crate::core::target_group::TargetGroup;

/// Errors produced while resolving a request to a target.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RoutingError {
    #[error("no listener rule matches '{path}'")]
    NoRoute { path: String },

    #[error("listener rule references unknown target group '{group}'")]
    UnknownGroup { group: String },

    #[error("target group '{group}' has no healthy targets")]
    NoHealthyTargets { group: String },

    #[error("selection produced no target for group '{group}'")]
    SelectionFailed { group: String },
}

impl RoutingError {
    /// The synthetic status returned to the client for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            RoutingError::NoRoute { .. } => StatusCode::NOT_FOUND,
            RoutingError::UnknownGroup { .. }
            | RoutingError::NoHealthyTargets { .. }
            | RoutingError::SelectionFailed { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

pub type RoutingResult<T> = Result<T, RoutingError>;

/// A fully resolved routing decision.
#[derive(Debug)]
pub struct RoutedRequest {
    pub target: Arc<Target>,
    pub group: Arc<TargetGroup>,
    /// The request path after the rule's prefix rewrite.
    pub path: String,
}

/// Owns the routing configuration graph: the rule table, the target groups
/// and the selector state. Built once at startup and shared by reference.
pub struct ProxyService {
    rule_table: RuleTable,
    groups: HashMap<String, Arc<TargetGroup>>,
    selector: Selector,
}

impl ProxyService {
    pub fn new(config: &ProxyConfig) -> Self {
        let rule_table = RuleTable::new(config.rules.iter().map(ListenerRule::from_config).collect());

        let groups = config
            .groups
            .iter()
            .map(|group| (group.name.clone(), Arc::new(TargetGroup::new(group))))
            .collect();

        Self {
            rule_table,
            groups,
            selector: Selector::new(config.algorithm, config.session_ttl_ms),
        }
    }

    pub fn rule_table(&self) -> &RuleTable {
        &self.rule_table
    }

    pub fn groups(&self) -> impl Iterator<Item = &Arc<TargetGroup>> {
        self.groups.values()
    }

    pub fn group(&self, name: &str) -> Option<&Arc<TargetGroup>> {
        self.groups.get(name)
    }

    /// Match the path against the rule table, select a target from the
    /// group's healthy view and rewrite the path for forwarding.
    pub fn resolve(&self, path: &str, client: &ClientInfo) -> RoutingResult<RoutedRequest> {
        let rule = self
            .rule_table
            .find(path)
            .ok_or_else(|| RoutingError::NoRoute {
                path: path.to_string(),
            })?;

        let group = self
            .groups
            .get(&rule.target_group)
            .ok_or_else(|| RoutingError::UnknownGroup {
                group: rule.target_group.clone(),
            })?;

        if group.healthy_view().is_empty() {
            return Err(RoutingError::NoHealthyTargets {
                group: rule.target_group.clone(),
            });
        }

        let target = self
            .selector
            .pick(group, client)
            .ok_or_else(|| RoutingError::SelectionFailed {
                group: rule.target_group.clone(),
            })?;

        Ok(RoutedRequest {
            target,
            group: group.clone(),
            path: rule.rewrite_uri(path),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::models::{
        BalancingAlgorithm, HealthCheckConfig, ListenerRuleConfig, ProxyConfig, TargetGroupConfig,
    };
    use std::time::Duration;

    fn config() -> ProxyConfig {
        ProxyConfig {
            listener_port: 8080,
            connection_timeout: Duration::from_millis(5000),
            algorithm: BalancingAlgorithm::RoundRobin,
            header_convention: false,
            session_ttl_ms: 300_000,
            rules: vec![
                ListenerRuleConfig {
                    path_prefix: "/api".to_string(),
                    path_rewrite: "/api".to_string(),
                    target_group: "web".to_string(),
                },
                ListenerRuleConfig {
                    path_prefix: "/ghost".to_string(),
                    path_rewrite: String::new(),
                    target_group: "missing".to_string(),
                },
                ListenerRuleConfig {
                    path_prefix: "/drained".to_string(),
                    path_rewrite: String::new(),
                    target_group: "drained".to_string(),
                },
            ],
            groups: vec![
                TargetGroupConfig {
                    name: "web".to_string(),
                    targets: "10.0.0.1:8081".to_string(),
                    weights: None,
                    health_check: HealthCheckConfig::default(),
                },
                TargetGroupConfig {
                    name: "drained".to_string(),
                    // Unparsable spec: the group exists with zero targets.
                    targets: "10.0.0.9:bad".to_string(),
                    weights: None,
                    health_check: HealthCheckConfig::default(),
                },
            ],
        }
    }

    #[test]
    fn test_resolve_picks_target_and_rewrites_path() {
        let service = ProxyService::new(&config());
        let routed = service
            .resolve("/api/users/1", &ClientInfo::default())
            .expect("resolve should succeed");

        assert_eq!(routed.target.ip, "10.0.0.1");
        assert_eq!(routed.target.port, 8081);
        assert_eq!(routed.path, "/users/1");
        assert_eq!(routed.group.name(), "web");
    }

    #[test]
    fn test_resolve_no_route_maps_to_404() {
        let service = ProxyService::new(&config());
        let err = service
            .resolve("/nowhere", &ClientInfo::default())
            .expect_err("no rule should match");

        assert!(matches!(err, RoutingError::NoRoute { .. }));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_resolve_unknown_group_maps_to_503() {
        let service = ProxyService::new(&config());
        let err = service
            .resolve("/ghost/1", &ClientInfo::default())
            .expect_err("group does not exist");

        assert!(matches!(err, RoutingError::UnknownGroup { .. }));
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_resolve_empty_group_maps_to_503() {
        let service = ProxyService::new(&config());
        let err = service
            .resolve("/drained/x", &ClientInfo::default())
            .expect_err("group has zero targets");

        assert!(matches!(err, RoutingError::NoHealthyTargets { .. }));
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
