use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;

use crate::config::models::BalancingAlgorithm;
use crate::core::target::Target;
use crate::core::target_group::TargetGroup;

/// Connection facts about the requesting client. The same derivation feeds
/// sticky-session identity and the X-Forwarded-For / X-Real-IP synthesis, so
/// the proxy always agrees with itself about who the client is.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    /// Raw `X-Forwarded-For` value from the incoming request, if any.
    pub forwarded_for: Option<String>,
    pub peer_addr: Option<SocketAddr>,
}

impl ClientInfo {
    /// First X-Forwarded-For entry, else the peer address.
    pub fn client_ip(&self) -> Option<String> {
        if let Some(forwarded) = &self.forwarded_for {
            if let Some(first) = forwarded.split(',').next() {
                let first = first.trim();
                if !first.is_empty() {
                    return Some(first.to_string());
                }
            }
        }
        self.peer_addr.map(|addr| addr.ip().to_string())
    }

    /// Sticky-session identifier; `"unknown"` when nothing identifies the
    /// client.
    pub fn identifier(&self) -> String {
        self.client_ip().unwrap_or_else(|| "unknown".to_string())
    }
}

struct StickySession {
    target: Arc<Target>,
    expires_at_ms: u64,
}

/// Mutable selection state, one per target group.
#[derive(Default)]
struct GroupState {
    counter: AtomicUsize,
    sessions: Mutex<HashMap<String, StickySession>>,
}

/// Applies the configured balancing policy over a group's healthy view.
pub struct Selector {
    algorithm: BalancingAlgorithm,
    session_ttl_ms: u64,
    groups: DashMap<String, Arc<GroupState>>,
}

impl Selector {
    pub fn new(algorithm: BalancingAlgorithm, session_ttl_ms: u64) -> Self {
        Self {
            algorithm,
            session_ttl_ms,
            groups: DashMap::new(),
        }
    }

    /// Pick a target, or `None` when the group has nothing selectable.
    pub fn pick(&self, group: &TargetGroup, client: &ClientInfo) -> Option<Arc<Target>> {
        self.pick_at(group, client, now_ms())
    }

    fn pick_at(&self, group: &TargetGroup, client: &ClientInfo, now_ms: u64) -> Option<Arc<Target>> {
        let candidates = group.healthy_view();
        if candidates.is_empty() {
            return None;
        }

        match self.algorithm {
            BalancingAlgorithm::RoundRobin => self.round_robin(group.name(), &candidates),
            BalancingAlgorithm::Weighted => {
                let weighted = group.weighted_view();
                if weighted.is_empty() {
                    // Unreachable after startup validation; a group without
                    // weights must never be selected under WEIGHTED.
                    return None;
                }
                self.round_robin(group.name(), &weighted)
            }
            BalancingAlgorithm::Sticky => self.sticky(group, &candidates, client, now_ms),
            BalancingAlgorithm::LeastResponseTime => Some(Self::least_response_time(&candidates)),
        }
    }

    fn state(&self, group: &str) -> Arc<GroupState> {
        self.groups.entry(group.to_string()).or_default().clone()
    }

    fn round_robin(&self, group: &str, candidates: &[Arc<Target>]) -> Option<Arc<Target>> {
        let state = self.state(group);
        // Atomically increment and get the counter value; concurrent callers
        // may interleave but every pick lands on a valid index.
        let count = state.counter.fetch_add(1, Ordering::SeqCst);
        candidates.get(count % candidates.len()).cloned()
    }

    fn sticky(
        &self,
        group: &TargetGroup,
        candidates: &[Arc<Target>],
        client: &ClientInfo,
        now_ms: u64,
    ) -> Option<Arc<Target>> {
        let client_id = client.identifier();
        let state = self.state(group.name());
        let mut sessions = state.sessions.lock().unwrap();

        if let Some(session) = sessions.get_mut(&client_id) {
            if now_ms < session.expires_at_ms {
                if let Some(current) = candidates
                    .iter()
                    .find(|candidate| candidate.same_endpoint(&session.target))
                {
                    // Refresh the stored instance to the current view's object.
                    session.target = current.clone();
                    return Some(current.clone());
                }
            }
            // Expired, or the bound target left the healthy view.
            sessions.remove(&client_id);
        }

        let fresh = self.round_robin(group.name(), candidates)?;
        sessions.insert(
            client_id,
            StickySession {
                target: fresh.clone(),
                expires_at_ms: now_ms + self.session_ttl_ms,
            },
        );
        Some(fresh)
    }

    /// Smallest `active_connections * max(avg_ttfb, 0.001)` wins; ties keep
    /// the earlier candidate. The floor keeps cold targets from winning on a
    /// zero denominator alone.
    fn least_response_time(candidates: &[Arc<Target>]) -> Arc<Target> {
        let mut best = &candidates[0];
        let mut best_metric = f64::INFINITY;

        for candidate in candidates {
            let avg_ttfb = candidate.metrics.avg_ttfb().max(0.001);
            let metric = candidate.metrics.active_connections() as f64 * avg_ttfb;
            if metric < best_metric {
                best = candidate;
                best_metric = metric;
            }
        }

        best.clone()
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
