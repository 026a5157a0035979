//! Route table lookup.

use axum::http::Method;

use crate::config::schema::{RouteConfig, RouteKind};
use crate::routing::matcher::{AndMatcher, Matcher, MethodMatcher, PathPrefixMatcher};

/// A compiled route.
#[derive(Debug)]
pub struct Route {
    pub name: String,
    pub kind: RouteKind,
    priority: u32,
    prefix_len: usize,
    matcher: AndMatcher,
}

/// Immutable route table, compiled at startup.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Compile routes. Higher priority first, then longer prefixes first.
    ///
    /// Routes with an unparseable method are skipped with an error log;
    /// config validation rejects them earlier.
    pub fn from_config(configs: &[RouteConfig]) -> Self {
        let mut routes: Vec<Route> = configs
            .iter()
            .filter_map(|config| {
                let path = PathPrefixMatcher::new(config.path.clone());
                let prefix_len = path.len();
                let mut matchers: Vec<Box<dyn Matcher>> = vec![Box::new(path)];

                if let Some(method) = &config.method {
                    match Method::from_bytes(method.to_ascii_uppercase().as_bytes()) {
                        Ok(method) => matchers.push(Box::new(MethodMatcher::new(method))),
                        Err(_) => {
                            tracing::error!(route = %config.name, method = %method, "Skipping route with invalid method");
                            return None;
                        }
                    }
                }

                Some(Route {
                    name: config.name.clone(),
                    kind: config.kind.clone(),
                    priority: config.priority,
                    prefix_len,
                    matcher: AndMatcher::new(matchers),
                })
            })
            .collect();

        routes.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| b.prefix_len.cmp(&a.prefix_len))
        });

        tracing::debug!(routes = routes.len(), "Route table compiled");
        Self { routes }
    }

    /// First matching route, if any.
    pub fn match_request(&self, method: &Method, path: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.matcher.matches(method, path))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
