pub mod loader;
pub mod models;
pub mod validation;

pub use models::{
    BalancingAlgorithm, HealthCheckConfig, ListenerRuleConfig, ProxyConfig, TargetGroupConfig,
    TargetSpec,
};
pub use validation::{ConfigError, ConfigResult, ConfigValidator};
