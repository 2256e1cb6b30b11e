//! CLI command implementations

pub mod config;
pub mod exec;
pub mod rpc;
pub mod version;

use crate::output;
use retrier_core::RetryError;
use std::fmt::Display;

/// Exit status after an interrupt, as shells report SIGINT
const EXIT_INTERRUPTED: i32 = 130;

/// Exit status for a session that ended without a value
///
/// A cancelled session exits with 130; anything else uses `code`.
pub fn exit_code<E>(err: &RetryError<E>, code: i32) -> i32 {
    if err.is_cancelled() {
        EXIT_INTERRUPTED
    } else {
        code
    }
}

/// Report a failed session on stderr and exit the process
pub fn fail<E: Display>(err: &RetryError<E>, code: i32) -> ! {
    output::error(&err.to_string());
    std::process::exit(exit_code(err, code))
}
