use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::models::{HealthCheckConfig, TargetGroupConfig, TargetSpec};
use crate::core::target::Target;

/// A named set of targets sharing a balancing policy and health parameters.
///
/// The target list and the weighted expansion are fixed at construction;
/// only per-target health flags and metrics mutate afterwards.
#[derive(Debug)]
pub struct TargetGroup {
    name: String,
    targets: Vec<Arc<Target>>,
    /// Indices into `targets`, each repeated `weight` times in original
    /// order. Empty when the group has no weights map.
    weighted_order: Vec<usize>,
    health_check: HealthCheckConfig,
    checker_running: AtomicBool,
}

impl TargetGroup {
    pub fn new(config: &TargetGroupConfig) -> Self {
        Self::with_resolver(config, resolve_ipv4)
    }

    fn with_resolver<R>(config: &TargetGroupConfig, resolver: R) -> Self
    where
        R: Fn(&str) -> Vec<String>,
    {
        let mut targets = Vec::new();

        for spec in config.targets.split(',').filter_map(TargetSpec::parse) {
            let weight = config
                .weights
                .as_ref()
                .and_then(|weights| weights.get(&spec.host).copied())
                .unwrap_or(1);

            let addresses = resolver(&spec.host);
            if addresses.is_empty() {
                tracing::warn!(group = %config.name, host = %spec.host, "hostname did not resolve, no targets added");
            }

            for ip in addresses {
                targets.push(Arc::new(Target::new(
                    ip,
                    spec.port,
                    spec.base_uri.clone(),
                    spec.host.clone(),
                    weight,
                )));
            }
        }

        // Built once; the target set never changes after construction.
        let weighted_order = match &config.weights {
            Some(_) => targets
                .iter()
                .enumerate()
                .flat_map(|(index, target)| {
                    std::iter::repeat_n(index, target.weight as usize)
                })
                .collect(),
            None => Vec::new(),
        };

        Self {
            name: config.name.clone(),
            targets,
            weighted_order,
            health_check: config.health_check.clone(),
            checker_running: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn targets(&self) -> &[Arc<Target>] {
        &self.targets
    }

    pub fn health_check(&self) -> &HealthCheckConfig {
        &self.health_check
    }

    /// Recorded by the health checker task once it starts; until then the
    /// healthy view is the full target list even when checking is enabled.
    pub fn mark_checker_running(&self) {
        self.checker_running.store(true, Ordering::Release);
    }

    pub fn checker_running(&self) -> bool {
        self.checker_running.load(Ordering::Acquire)
    }

    fn is_selectable(&self, target: &Target) -> bool {
        if !self.health_check.enabled || !self.checker_running() {
            return true;
        }
        target.health.is_healthy()
    }

    /// The targets currently eligible for selection.
    pub fn healthy_view(&self) -> Vec<Arc<Target>> {
        self.targets
            .iter()
            .filter(|target| self.is_selectable(target))
            .cloned()
            .collect()
    }

    /// The cached weight expansion restricted to currently eligible targets.
    /// Empty when the group carries no weights map.
    pub fn weighted_view(&self) -> Vec<Arc<Target>> {
        self.weighted_order
            .iter()
            .map(|&index| &self.targets[index])
            .filter(|target| self.is_selectable(target))
            .cloned()
            .collect()
    }
}

/// Resolve a host to its IPv4 addresses. Dotted-quad literals are used
/// directly; names go through the system resolver, deduplicated in
/// resolution order. Unresolvable names yield no addresses.
fn resolve_ipv4(host: &str) -> Vec<String> {
    if host.parse::<Ipv4Addr>().is_ok() {
        return vec![host.to_string()];
    }

    let mut addresses: Vec<String> = Vec::new();
    if let Ok(resolved) = (host, 0u16).to_socket_addrs() {
        for addr in resolved {
            if let IpAddr::V4(v4) = addr.ip() {
                let ip = v4.to_string();
                if !addresses.contains(&ip) {
                    addresses.push(ip);
                }
            }
        }
    }
    addresses
}
