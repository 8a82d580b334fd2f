//! Logger setup for hosts and tools.
//!
//! The crate itself only logs through the `log` facade.

mod init;

pub use init::{init_logging, LoggingConfig};
