use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};

// Constants for health status to replace magic numbers
const HEALTH_STATUS_UNHEALTHY: u8 = 0;
const HEALTH_STATUS_HEALTHY: u8 = 1;

/// Bounded TTFB history; old samples fall off once the ring is full.
const TTFB_SAMPLE_CAPACITY: usize = 1000;

/// Tracks the health latch and hysteresis counters of a single target.
///
/// The latch is read on the hot path by every request; the counters are
/// written only by the owning group's health checker task.
#[derive(Debug)]
pub struct TargetHealth {
    /// Current health status (uses atomic for thread safety)
    status: AtomicU8, // Uses HEALTH_STATUS_* constants
    /// Counter for consecutive successful health checks
    pub consecutive_successes: AtomicU32,
    /// Counter for consecutive failed health checks
    pub consecutive_failures: AtomicU32,
}

impl TargetHealth {
    /// A new target starts healthy with both counters at zero, so traffic
    /// flows before the first probe completes.
    pub fn new() -> Self {
        Self {
            status: AtomicU8::new(HEALTH_STATUS_HEALTHY),
            consecutive_successes: AtomicU32::new(0),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    pub fn is_healthy(&self) -> bool {
        // Use Acquire ordering for better correctness when reading status
        self.status.load(Ordering::Acquire) == HEALTH_STATUS_HEALTHY
    }

    pub fn set_healthy(&self, healthy: bool) {
        let status = if healthy {
            HEALTH_STATUS_HEALTHY
        } else {
            HEALTH_STATUS_UNHEALTHY
        };
        // Use Release ordering for updates to ensure visibility to other threads
        self.status.store(status, Ordering::Release);
    }

    pub fn consecutive_successes(&self) -> u32 {
        self.consecutive_successes.load(Ordering::Relaxed)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }
}

impl Default for TargetHealth {
    fn default() -> Self {
        Self::new()
    }
}

/// Runtime load metrics consulted by the least-response-time policy.
#[derive(Debug, Default)]
pub struct TargetMetrics {
    active_connections: AtomicU32,
    ttfb_samples: Mutex<VecDeque<f64>>,
}

impl TargetMetrics {
    pub fn inc_active(&self) {
        self.active_connections.fetch_add(1, Ordering::AcqRel);
    }

    /// Saturating decrement; the gauge never goes below zero.
    pub fn dec_active(&self) {
        let _ = self
            .active_connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            });
    }

    pub fn active_connections(&self) -> u32 {
        self.active_connections.load(Ordering::Acquire)
    }

    pub fn record_ttfb(&self, seconds: f64) {
        let mut samples = self.ttfb_samples.lock().unwrap();
        if samples.len() == TTFB_SAMPLE_CAPACITY {
            samples.pop_front();
        }
        samples.push_back(seconds);
    }

    /// Arithmetic mean of the recorded samples, 0.0 when none exist.
    pub fn avg_ttfb(&self) -> f64 {
        let samples = self.ttfb_samples.lock().unwrap();
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().sum::<f64>() / samples.len() as f64
    }
}

/// A single upstream endpoint: a resolved IPv4 address plus port and optional
/// base URI, carrying the originating hostname for weight lookup and
/// stickiness across re-resolutions.
#[derive(Debug)]
pub struct Target {
    pub ip: String,
    pub port: u16,
    /// Empty, or starts with `/` and carries no trailing `/`.
    pub base_uri: String,
    pub hostname: String,
    pub weight: u32,
    pub metrics: TargetMetrics,
    pub health: TargetHealth,
}

impl Target {
    pub fn new(ip: String, port: u16, base_uri: String, hostname: String, weight: u32) -> Self {
        Self {
            ip,
            port,
            base_uri,
            hostname,
            weight: weight.max(1),
            metrics: TargetMetrics::default(),
            health: TargetHealth::new(),
        }
    }

    /// Construct the upstream URL for an already-rewritten request path.
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("http://{}:{}{}{}", self.ip, self.port, self.base_uri, path)
        } else {
            format!("http://{}:{}{}/{}", self.ip, self.port, self.base_uri, path)
        }
    }

    /// Two targets refer to the same endpoint when ip and port agree,
    /// regardless of which group object produced them.
    pub fn same_endpoint(&self, other: &Target) -> bool {
        self.ip == other.ip && self.port == other.port
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}{}", self.ip, self.port, self.base_uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> Target {
        Target::new(
            "10.0.0.1".to_string(),
            8081,
            "/v1".to_string(),
            "backend.internal".to_string(),
            1,
        )
    }

    #[test]
    fn test_url_for_joins_base_uri_and_path() {
        let target = target();
        assert_eq!(target.url_for("/users"), "http://10.0.0.1:8081/v1/users");
        assert_eq!(target.url_for("users"), "http://10.0.0.1:8081/v1/users");
    }

    #[test]
    fn test_url_for_without_base_uri() {
        let target = Target::new(
            "10.0.0.1".to_string(),
            80,
            String::new(),
            "h".to_string(),
            1,
        );
        assert_eq!(target.url_for("/"), "http://10.0.0.1:80/");
    }

    #[test]
    fn test_weight_is_clamped_to_at_least_one() {
        let target = Target::new("10.0.0.1".to_string(), 80, String::new(), "h".to_string(), 0);
        assert_eq!(target.weight, 1);
    }

    #[test]
    fn test_active_connection_gauge_saturates_at_zero() {
        let metrics = TargetMetrics::default();
        metrics.dec_active();
        assert_eq!(metrics.active_connections(), 0);

        metrics.inc_active();
        metrics.inc_active();
        metrics.dec_active();
        assert_eq!(metrics.active_connections(), 1);
    }

    #[test]
    fn test_avg_ttfb_is_zero_without_samples() {
        let metrics = TargetMetrics::default();
        assert_eq!(metrics.avg_ttfb(), 0.0);
    }

    #[test]
    fn test_avg_ttfb_is_arithmetic_mean() {
        let metrics = TargetMetrics::default();
        metrics.record_ttfb(0.1);
        metrics.record_ttfb(0.3);
        assert!((metrics.avg_ttfb() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_ttfb_ring_is_bounded() {
        let metrics = TargetMetrics::default();
        for _ in 0..TTFB_SAMPLE_CAPACITY {
            metrics.record_ttfb(1.0);
        }
        // The ring is full of 1.0s; pushing 0.0s drags the mean down, which
        // proves old samples are being evicted.
        for _ in 0..TTFB_SAMPLE_CAPACITY {
            metrics.record_ttfb(0.0);
        }
        assert_eq!(metrics.avg_ttfb(), 0.0);
    }

    #[test]
    fn test_health_starts_healthy_with_zeroed_counters() {
        let health = TargetHealth::new();
        assert!(health.is_healthy());
        assert_eq!(health.consecutive_successes(), 0);
        assert_eq!(health.consecutive_failures(), 0);
    }

    #[test]
    fn test_health_latch_transitions() {
        let health = TargetHealth::new();
        health.set_healthy(false);
        assert!(!health.is_healthy());
        health.set_healthy(true);
        assert!(health.is_healthy());
    }

    #[test]
    fn test_same_endpoint_ignores_hostname() {
        let a = Target::new(
            "10.0.0.1".to_string(),
            80,
            String::new(),
            "a.internal".to_string(),
            1,
        );
        let b = Target::new(
            "10.0.0.1".to_string(),
            80,
            "/base".to_string(),
            "b.internal".to_string(),
            3,
        );
        assert!(a.same_endpoint(&b));
    }
}
