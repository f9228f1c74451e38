use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::timeout;

use shunt::config::{ConfigValidator, ProxyConfig};
use shunt::tracing_setup::init_tracing;
use shunt::{
    Forwarder, ForwarderSettings, HealthChecker, PooledHttpClient, ProxyHandler, ProxyServer,
    ProxyService, Shutdown,
};

/// Bounded wait for health checker tasks at shutdown.
const CHECKER_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = ProxyConfig::from_env().context("Failed to load configuration")?;
    ConfigValidator::validate(&config).context("Invalid configuration")?;

    let proxy = Arc::new(ProxyService::new(&config));
    log_effective_config(&proxy);

    let client = Arc::new(PooledHttpClient::new());
    let forwarder = Forwarder::new(
        client.clone(),
        ForwarderSettings {
            listener_port: config.listener_port,
            connection_timeout: config.connection_timeout,
            header_convention: config.header_convention,
        },
    );
    let handler = Arc::new(ProxyHandler::new(proxy.clone(), forwarder));

    let shutdown = Arc::new(Shutdown::new());

    // One long-lived checker task per group with health checking enabled.
    let mut checker_handles = Vec::new();
    for group in proxy.groups() {
        if group.health_check().enabled {
            let checker = HealthChecker::new(group.clone(), client.clone(), shutdown.token());
            checker_handles.push(tokio::spawn(checker.run()));
        }
    }

    let server = ProxyServer::new(handler, config.listener_port);
    let signal_listener = shutdown.clone();
    server
        .run_until(async move { signal_listener.listen_for_ctrl_c().await })
        .await?;

    // Reached after graceful shutdown: stop the checkers and wait, bounded.
    shutdown.trigger();
    for handle in checker_handles {
        if timeout(CHECKER_JOIN_TIMEOUT, handle).await.is_err() {
            tracing::warn!("health checker did not stop within the join timeout");
        }
    }

    tracing::info!("shutdown complete");
    Ok(())
}

fn log_effective_config(proxy: &ProxyService) {
    for rule in proxy.rule_table().rules() {
        tracing::info!(
            prefix = %rule.path_prefix,
            rewrite = %rule.path_rewrite,
            group = %rule.target_group,
            "configured listener rule"
        );
    }

    for group in proxy.groups() {
        for target in group.targets() {
            tracing::info!(
                group = group.name(),
                target = %target,
                hostname = %target.hostname,
                weight = target.weight,
                "configured target"
            );
        }
    }
}
