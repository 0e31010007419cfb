//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Look up the matching route for a request path
//! - Resolve the rate limit rule that applies to a path
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks); a reload
//!   builds a new Router and swaps it in
//! - O(n) path prefix scan (acceptable for typical route counts)
//! - Explicit `None` rather than a silent default route

use crate::config::schema::GatewayConfig;
use crate::routing::matcher::PathPrefixMatcher;
use crate::security::rate_limit::RateLimitRule;

#[derive(Debug, Clone)]
pub struct CompiledRoute {
    pub name: String,
    pub upstream: String,
    pub priority: u32,
    pub matcher: PathPrefixMatcher,
    pub rule: RateLimitRule,
}

#[derive(Debug, Clone)]
pub struct Router {
    routes: Vec<CompiledRoute>,
    default_rule: RateLimitRule,
}

impl Router {
    /// Compile the route table. Higher priority wins; among equal
    /// priorities the longer prefix wins, then declaration order.
    pub fn new(config: &GatewayConfig) -> Self {
        let default_rule = config.rate_limit.default_rule();

        let mut routes: Vec<CompiledRoute> = config
            .routes
            .iter()
            .map(|r| CompiledRoute {
                name: r.name.clone(),
                upstream: r.upstream.clone(),
                priority: r.priority,
                matcher: PathPrefixMatcher::new(r.path_prefix.clone()),
                rule: r.rate_limit.map(RateLimitRule::from).unwrap_or(default_rule),
            })
            .collect();

        routes.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| b.matcher.specificity().cmp(&a.matcher.specificity()))
        });

        Self { routes, default_rule }
    }

    pub fn match_path(&self, path: &str) -> Option<&CompiledRoute> {
        self.routes.iter().find(|r| r.matcher.matches(path))
    }

    /// Route key and rule for rate limiting. Unrouted paths are limited per
    /// path under the default rule.
    pub fn rate_limit_for<'a>(&'a self, path: &'a str) -> (&'a str, RateLimitRule) {
        match self.match_path(path) {
            Some(route) => (route.name.as_str(), route.rule),
            None => (path, self.default_rule),
        }
    }

    pub fn routes(&self) -> &[CompiledRoute] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
