//! Route registration and dispatch.
//!
//! Routes are collected into a [`CommandRegistry`] during setup. Converting
//! the registry into a [`Router`] freezes it: the router has no mutating
//! methods, so it can be shared behind an `Arc` by every connection without
//! locking.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use super::DISPATCH_TARGET;
use super::context::{RequestContext, keys};
use super::errors::{DispatchError, DispatchResult, RegistryError};
use super::route::Route;

/// Setup-time collection of routes.
#[derive(Debug, Default)]
pub struct CommandRegistry {
    routes: HashMap<String, Route>,
}

impl CommandRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a route.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateRoute`] when the name is taken. The
    /// existing route is kept.
    pub fn register(&mut self, route: Route) -> Result<(), RegistryError> {
        if self.routes.contains_key(route.name()) {
            return Err(RegistryError::DuplicateRoute {
                name: route.name().to_owned(),
            });
        }
        self.routes.insert(route.name().to_owned(), route);
        Ok(())
    }

    /// Number of registered routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns true when no route is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Freezes the registry.
    #[must_use]
    pub fn into_router(self) -> Router {
        let catalog = self
            .routes
            .values()
            .map(|route| (route.name().to_owned(), route.help().to_owned()))
            .collect();
        Router {
            routes: self.routes,
            catalog,
        }
    }
}

/// Read-only route table that executes pipelines.
#[derive(Debug)]
pub struct Router {
    routes: HashMap<String, Route>,
    catalog: BTreeMap<String, String>,
}

impl Router {
    /// Looks up a route by exact name.
    #[must_use]
    pub fn route(&self, name: &str) -> Option<&Route> {
        self.routes.get(name)
    }

    /// Route names mapped to their help text, sorted by name.
    #[must_use]
    pub const fn catalog(&self) -> &BTreeMap<String, String> {
        &self.catalog
    }

    /// Runs the route registered under `name` against `context`.
    ///
    /// An unknown name fails with [`DispatchError::CommandNotFound`] without
    /// touching `context`. Otherwise the route catalogue is stored under
    /// [`keys::ROUTES`] and each step runs in order, its published values
    /// merged into `context` before the next step resolves its bindings. The
    /// first failing step ends the pipeline. On success the result carries
    /// whatever is stored under [`keys::OUTPUT`].
    pub fn dispatch(&self, name: &str, context: &mut RequestContext) -> DispatchResult {
        let Some(route) = self.route(name) else {
            debug!(target: DISPATCH_TARGET, command = name, "no route for command");
            return DispatchError::command_not_found(name).into();
        };

        context.insert(keys::ROUTES, self.catalog.clone());
        for step in route.steps() {
            debug!(
                target: DISPATCH_TARGET,
                route = route.name(),
                step = step.name(),
                "running step"
            );
            match step.run(context) {
                Ok(published) => context.extend(published.into_entries()),
                Err(source) => {
                    debug!(
                        target: DISPATCH_TARGET,
                        route = route.name(),
                        step = step.name(),
                        error = %source,
                        "step failed"
                    );
                    return DispatchError::Execution {
                        route: route.name().to_owned(),
                        step: step.name().to_owned(),
                        source,
                    }
                    .into();
                }
            }
        }
        DispatchResult::success(context.output())
    }
}
