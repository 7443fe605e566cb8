//! Route table.
//!
//! # Responsibilities
//! - Register routes (methods + pattern + options → handler + store)
//! - Look up the route for a method, path and request
//! - Return the matched route with its path parameters, or no match
//!
//! # Design Decisions
//! - One radix tree per method (`matchit`), O(path length) lookup
//! - Routes sharing a pattern are kept in registration order; constrained
//!   routes are tried before unconstrained ones
//! - Append-only: routes are never removed, and the table is frozen behind
//!   an `Arc` once the server starts

use axum::body::Body;
use axum::http::{Method, Request};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::routing::handler::{Handler, Params, Store};
use crate::routing::matcher::RouteOptions;

/// Errors raised while registering routes.
#[derive(Debug, Error)]
pub enum RouteError {
    /// The pattern is malformed or conflicts with an existing one.
    #[error("invalid route {method} {pattern}: {source}")]
    Insert {
        method: Method,
        pattern: String,
        #[source]
        source: matchit::InsertError,
    },

    /// A route needs at least one method.
    #[error("route {0} has no methods")]
    NoMethods(String),
}

/// One or more HTTP methods.
pub trait IntoMethods {
    fn into_methods(self) -> Vec<Method>;
}

impl IntoMethods for Method {
    fn into_methods(self) -> Vec<Method> {
        vec![self]
    }
}

impl IntoMethods for Vec<Method> {
    fn into_methods(self) -> Vec<Method> {
        self
    }
}

impl IntoMethods for &[Method] {
    fn into_methods(self) -> Vec<Method> {
        self.to_vec()
    }
}

impl<const N: usize> IntoMethods for [Method; N] {
    fn into_methods(self) -> Vec<Method> {
        self.into()
    }
}

/// A registered route.
pub struct Route {
    methods: Vec<Method>,
    pattern: String,
    options: RouteOptions,
    handler: Arc<dyn Handler>,
    store: Option<Store>,
}

impl Route {
    pub fn new(methods: impl IntoMethods, pattern: &str, handler: impl Handler) -> Self {
        Self {
            methods: methods.into_methods(),
            pattern: normalize_pattern(pattern),
            options: RouteOptions::default(),
            handler: Arc::new(handler),
            store: None,
        }
    }

    pub fn with_options(mut self, options: RouteOptions) -> Self {
        self.options = options;
        self
    }

    /// Attach an opaque value the handler can read at dispatch time.
    pub fn with_store<T: Send + Sync + 'static>(mut self, store: T) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }

    pub fn store(&self) -> Option<&Store> {
        self.store.as_ref()
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("methods", &self.methods)
            .field("pattern", &self.pattern)
            .field("options", &self.options)
            .field("has_store", &self.store.is_some())
            .finish()
    }
}

/// Result of a successful lookup.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub route: Arc<Route>,
    pub params: Params,
}

/// Method-keyed radix trees over registered routes.
#[derive(Default)]
pub struct Router {
    trees: HashMap<Method, matchit::Router<usize>>,
    slots: Vec<Vec<Arc<Route>>>,
    slot_index: HashMap<(Method, String), usize>,
    ignore_trailing_slash: bool,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat `/users/` and `/users` as the same path.
    pub fn ignore_trailing_slash(mut self, ignore: bool) -> Self {
        self.ignore_trailing_slash = ignore;
        self
    }

    /// Register `handler` for `methods` on `pattern`.
    pub fn add_handler(
        &mut self,
        methods: impl IntoMethods,
        pattern: &str,
        handler: impl Handler,
    ) -> Result<&mut Self, RouteError> {
        self.add(Route::new(methods, pattern, handler))
    }

    /// Register a fully described route.
    pub fn add(&mut self, mut route: Route) -> Result<&mut Self, RouteError> {
        if route.methods.is_empty() {
            return Err(RouteError::NoMethods(route.pattern));
        }
        if self.ignore_trailing_slash {
            route.pattern = trim_trailing_slash(&route.pattern).to_string();
        }

        // Stage every method's insert first so a conflict leaves the table
        // untouched.
        let route = Arc::new(route);
        let mut staged: HashMap<Method, matchit::Router<usize>> = HashMap::new();
        let mut new_slots: Vec<((Method, String), usize)> = Vec::new();
        let mut targets: Vec<usize> = Vec::new();
        let mut next_slot = self.slots.len();

        for method in &route.methods {
            let key = (method.clone(), route.pattern.clone());
            let existing = self
                .slot_index
                .get(&key)
                .copied()
                .or_else(|| new_slots.iter().find(|(k, _)| *k == key).map(|(_, slot)| *slot));
            let slot = match existing {
                Some(slot) => slot,
                None => {
                    let tree = staged
                        .entry(method.clone())
                        .or_insert_with(|| self.trees.get(method).cloned().unwrap_or_default());
                    tree.insert(route.pattern.clone(), next_slot)
                        .map_err(|source| RouteError::Insert {
                            method: method.clone(),
                            pattern: route.pattern.clone(),
                            source,
                        })?;
                    new_slots.push((key, next_slot));
                    next_slot += 1;
                    next_slot - 1
                }
            };
            if !targets.contains(&slot) {
                targets.push(slot);
            }
        }

        self.trees.extend(staged);
        self.slot_index.extend(new_slots);
        self.slots.resize_with(next_slot, Vec::new);
        for slot in targets {
            self.slots[slot].push(Arc::clone(&route));
        }

        tracing::debug!(
            methods = ?route.methods,
            pattern = %route.pattern,
            constrained = route.options.is_constrained(),
            "route registered"
        );
        Ok(self)
    }

    /// Find the route for `path`, checking constraints against `req`.
    pub fn find(&self, method: &Method, path: &str, req: &Request<Body>) -> Option<RouteMatch> {
        let tree = self.trees.get(method)?;
        let slashed;
        let matched = if self.ignore_trailing_slash {
            // Patterns added before the flag was set may still end in '/'.
            let trimmed = trim_trailing_slash(path);
            slashed = format!("{trimmed}/");
            tree.at(trimmed).or_else(|_| tree.at(&slashed)).ok()?
        } else {
            tree.at(path).ok()?
        };
        let candidates = self.slots.get(*matched.value)?;

        let route = candidates
            .iter()
            .filter(|route| route.options.is_constrained())
            .chain(candidates.iter().filter(|route| !route.options.is_constrained()))
            .find(|route| route.options.matches(req))?;

        let mut params = Params::new();
        for (name, value) in matched.params.iter() {
            params.push(name, value);
        }

        Some(RouteMatch {
            route: Arc::clone(route),
            params,
        })
    }

    /// Number of registered routes (per method and pattern).
    pub fn len(&self) -> usize {
        self.slots.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.slots.iter().flatten().collect::<Vec<_>>())
            .field("ignore_trailing_slash", &self.ignore_trailing_slash)
            .finish()
    }
}

/// Accept `:name` and a trailing `*` alongside `{name}` and `{*name}`.
fn normalize_pattern(pattern: &str) -> String {
    let segments: Vec<&str> = pattern.split('/').collect();
    let last = segments.len() - 1;
    segments
        .iter()
        .enumerate()
        .map(|(i, segment)| match segment.strip_prefix(':') {
            Some(name) => format!("{{{name}}}"),
            None if *segment == "*" && i == last => "{*wildcard}".to_string(),
            None => segment.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn trim_trailing_slash(path: &str) -> &str {
    if path.len() > 1 {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    }
}
