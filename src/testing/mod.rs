//! Testing utilities and mock implementations
//!
//! Mock providers, search and progress sinks for exercising pipelines
//! without API keys or network access.

pub mod mocks;

pub use mocks::*;
