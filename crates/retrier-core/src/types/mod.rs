//! Type definitions for retry policies and runtime configuration

mod runtime_config;

pub use runtime_config::*;
