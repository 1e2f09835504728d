//! Routes every gateway ships with.

use std::collections::BTreeMap;

use tracing::trace;

use super::DISPATCH_TARGET;
use super::context::{ContextValue, keys};
use super::errors::RegistryError;
use super::registry::CommandRegistry;
use super::route::{Params, Published, Route, Step, StepError};

/// Liveness probe route name.
pub const PING: &str = "ping";
/// Route catalogue route name.
pub const HELP: &str = "help";
/// Environment echo route name.
pub const ENV: &str = "env";

/// Answers `pong`.
#[must_use]
pub fn ping_route() -> Route {
    Route::new(PING, "Handles an exec ping.").step(
        Step::new("ping", ping)
            .bind("request", keys::REQUEST)
            .bind("channel", keys::CHANNEL),
    )
}

/// Lists every registered route with its help text.
#[must_use]
pub fn help_route() -> Route {
    Route::new(HELP, "Lists the available commands.")
        .step(Step::new("help", help).bind("routes", keys::ROUTES))
}

/// Prints the environment variables set on the channel.
#[must_use]
pub fn env_route() -> Route {
    Route::new(ENV, "Prints the channel environment.")
        .step(Step::new("env", env).bind_or("env", keys::ENV, BTreeMap::<String, String>::new()))
}

/// Registry holding `ping`, `help` and `env`.
///
/// # Errors
///
/// Returns [`RegistryError::DuplicateRoute`] only if the built-in names
/// collide, which they do not; callers extending the registry see the same
/// error for their own routes.
pub fn default_registry() -> Result<CommandRegistry, RegistryError> {
    let mut registry = CommandRegistry::new();
    registry.register(ping_route())?;
    registry.register(help_route())?;
    registry.register(env_route())?;
    Ok(registry)
}

fn ping(params: &Params) -> Result<Published, StepError> {
    let request = params.text("request")?;
    let channel = params.get("channel").and_then(ContextValue::as_channel);
    trace!(target: DISPATCH_TARGET, request, ?channel, "ping");
    Ok(Published::new().output("pong"))
}

fn help(params: &Params) -> Result<Published, StepError> {
    let routes = params.map("routes")?;
    let width = routes.keys().map(String::len).max().unwrap_or(0);
    let body: String = routes
        .iter()
        .map(|(name, help)| format!("{name:<width$}  {help}\n"))
        .collect();
    Ok(Published::new().output(body))
}

fn env(params: &Params) -> Result<Published, StepError> {
    let env = params.map("env")?;
    let body: String = env
        .iter()
        .map(|(name, value)| format!("{name}={value}\n"))
        .collect();
    Ok(Published::new().output(body))
}
