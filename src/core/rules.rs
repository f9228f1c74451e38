use crate::config::models::ListenerRuleConfig;

/// Binds a URI path prefix to a target group, with an optional prefix to
/// strip before forwarding.
#[derive(Debug, Clone)]
pub struct ListenerRule {
    pub path_prefix: String,
    pub path_rewrite: String,
    pub target_group: String,
}

impl ListenerRule {
    pub fn from_config(config: &ListenerRuleConfig) -> Self {
        Self {
            path_prefix: config.path_prefix.clone(),
            path_rewrite: config.path_rewrite.clone(),
            target_group: config.target_group.clone(),
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        path.starts_with(&self.path_prefix)
    }

    /// Strip exactly one leading occurrence of `path_rewrite` and re-root the
    /// result at `/`. Operates on the path only; the query string is carried
    /// separately by the caller.
    pub fn rewrite_uri(&self, uri: &str) -> String {
        if self.path_rewrite.is_empty() {
            return uri.to_string();
        }
        match uri.strip_prefix(&self.path_rewrite) {
            Some(rest) if rest.starts_with('/') => rest.to_string(),
            Some(rest) => format!("/{rest}"),
            None => uri.to_string(),
        }
    }
}

/// Listener rules ordered longest prefix first; ties keep configuration
/// order. The first match wins.
pub struct RuleTable {
    rules: Vec<ListenerRule>,
}

impl RuleTable {
    pub fn new(mut rules: Vec<ListenerRule>) -> Self {
        // Stable sort, so equal-length prefixes stay in configuration order.
        rules.sort_by(|a, b| b.path_prefix.len().cmp(&a.path_prefix.len()));
        Self { rules }
    }

    pub fn find(&self, path: &str) -> Option<&ListenerRule> {
        self.rules.iter().find(|rule| rule.matches(path))
    }

    pub fn rules(&self) -> &[ListenerRule] {
        &self.rules
    }
}
