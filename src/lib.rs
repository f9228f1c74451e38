/// Shunt - an HTTP layer-7 reverse proxy and load balancer
///
/// This crate provides a reverse proxy server with features like:
/// - Path-prefix routing with prefix rewrite
/// - Round-robin, weighted, sticky and least-response-time balancing
/// - Active health checking with hysteresis
/// - X-Forwarded-* header synthesis
// Re-export public modules with explicit visibility controls
pub mod config;
pub mod ports;
pub mod tracing_setup;

// These modules are implementation details and should not be directly used by users
pub(crate) mod adapters;
pub(crate) mod core;
pub(crate) mod utils;

// Re-export the specific types needed by the binary crate and tests
pub use crate::adapters::health_checker::HealthChecker;
pub use crate::adapters::http::server::ProxyServer;
pub use crate::adapters::http_client::PooledHttpClient;
pub use crate::adapters::http_handler::{ForwardRequest, Forwarder, ForwarderSettings, ProxyHandler};
pub use crate::core::proxy::{ProxyService, RoutedRequest, RoutingError};
pub use crate::core::rules::{ListenerRule, RuleTable};
pub use crate::core::selector::ClientInfo;
pub use crate::core::target::Target;
pub use crate::core::target_group::TargetGroup;
pub use crate::utils::shutdown::{Shutdown, ShutdownToken};
