//! Test suites for the gateway library.

mod circuit_behaviour;
mod support;
