use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use http::StatusCode;
use tokio::time::sleep;

use crate::config::models::HealthCheckConfig;
use crate::core::target::Target;
use crate::core::target_group::TargetGroup;
use crate::ports::http_client::UpstreamClient;
use crate::utils::shutdown::ShutdownToken;

/// Fixed probe timeout, independent of the forwarding timeout.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Background prober for one target group. Each round walks the group's
/// targets sequentially, applies the observation to the per-target health
/// state, then sleeps the configured interval. The stop token is observed
/// between probes and between rounds.
pub struct HealthChecker<C> {
    group: Arc<TargetGroup>,
    client: Arc<C>,
    token: ShutdownToken,
}

impl<C: UpstreamClient> HealthChecker<C> {
    pub fn new(group: Arc<TargetGroup>, client: Arc<C>, token: ShutdownToken) -> Self {
        Self {
            group,
            client,
            token,
        }
    }

    pub async fn run(mut self) {
        let settings = self.group.health_check().clone();
        if !settings.enabled {
            tracing::info!(group = self.group.name(), "health checking is disabled");
            return;
        }

        let interval = Duration::from_millis(settings.interval_ms);
        self.group.mark_checker_running();

        tracing::info!(
            group = self.group.name(),
            interval_ms = settings.interval_ms,
            path = %settings.path,
            succeed_threshold = settings.succeed_threshold,
            failure_threshold = settings.failure_threshold,
            "health checker started"
        );

        loop {
            for target in self.group.targets() {
                if self.token.is_shutdown_requested() {
                    tracing::info!(group = self.group.name(), "health checker stopping");
                    return;
                }

                let url = format!("http://{}:{}{}", target.ip, target.port, settings.path);
                // Only an exact 200 counts as success; timeouts and transport
                // errors are failures like any other.
                let success = matches!(
                    self.client.probe(&url, PROBE_TIMEOUT).await,
                    Ok(status) if status == StatusCode::OK
                );
                Self::apply_observation(target, success, &settings);
            }

            tokio::select! {
                _ = self.token.cancelled() => {
                    tracing::info!(group = self.group.name(), "health checker stopping");
                    return;
                }
                _ = sleep(interval) => {}
            }
        }
    }

    /// Apply one probe observation to a target's health state. Each
    /// observation zeroes the opposite counter, so the two are never
    /// simultaneously nonzero; crossing a threshold flips the latch.
    fn apply_observation(target: &Target, success: bool, settings: &HealthCheckConfig) {
        let health = &target.health;

        if success {
            health.consecutive_failures.store(0, Ordering::Release);
            let successes = health.consecutive_successes.fetch_add(1, Ordering::AcqRel) + 1;

            if successes >= settings.succeed_threshold && !health.is_healthy() {
                tracing::info!(target = %target, successes, "target is now HEALTHY");
                health.set_healthy(true);
            }
        } else {
            health.consecutive_successes.store(0, Ordering::Release);
            let failures = health.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;

            tracing::debug!(
                target = %target,
                failures,
                threshold = settings.failure_threshold,
                "health probe failed"
            );

            if failures >= settings.failure_threshold && health.is_healthy() {
                tracing::warn!(target = %target, failures, "target is now UNHEALTHY");
                health.set_healthy(false);
            }
        }
    }
}
