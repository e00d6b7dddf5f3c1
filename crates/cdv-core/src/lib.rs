//! cdv-core: the Codriver session.
//!
//! Configuration, the host shell capability, the process runner, the
//! conversation store, model and classifier clients, built-in directives and
//! the dispatcher that ties them together. Exposed as a library for
//! integration testing.

pub mod attachment;
pub mod classifier;
pub mod config;
pub mod directive;
pub mod dispatch;
pub mod history;
pub mod interrupt;
pub mod model;
pub mod platform;
pub mod renderer;
pub mod repl;
pub mod runner;
pub mod save;
pub mod session;
pub mod style;
