//! Configuration loading and management

mod loader;

pub use loader::{ConfigLoader, RUNTIME_CONFIG_FILE};
