//! Process supervision: launch sequencing and signal handling.

mod errors;
mod launch;
mod signals;

pub use errors::LaunchError;
pub use launch::run_daemon;
pub use signals::ShutdownError;

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
