//! Command dispatch for exec requests.
//!
//! An exec payload is split into a command name and an argument string
//! ([`ExecRequest`]). The name selects a [`Route`] from a frozen [`Router`];
//! the route's steps run in order against a [`RequestContext`] that lives for
//! that one dispatch.
//!
//! ## Pipelines
//!
//! Each [`Step`] declares bindings from parameter names to context keys. The
//! step handler receives only those parameters and returns the values it
//! wants published. Published values are merged into the context before the
//! next step runs, so a route such as
//!
//! ```text
//! deploy: check(app <- args) -> apply(app <- args, token <- checked)
//! ```
//!
//! passes the `checked` value from the first step to the second. The response
//! body is whatever ends up under [`keys::OUTPUT`].

pub mod builtin;
mod command_line;
mod context;
mod errors;
mod registry;
mod route;

pub use self::command_line::ExecRequest;
pub use self::context::{ContextValue, RequestContext, keys};
pub use self::errors::{
    DispatchError, DispatchResult, EXIT_COMMAND_NOT_FOUND, EXIT_FAILURE, RegistryError,
};
pub use self::registry::{CommandRegistry, Router};
pub use self::route::{Binding, Params, Published, Route, Step, StepError, StepHandler};

/// Tracing target for dispatch operations.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");
