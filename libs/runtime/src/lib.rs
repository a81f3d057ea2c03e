//! Shared runtime plumbing for the starmap server: layered configuration,
//! logging initialization and signal-driven shutdown.

pub mod config;
pub mod logging;
pub mod shutdown;

pub use config::{AppConfig, CliArgs, LoggingConfig, ServerConfig};
pub use shutdown::wait_for_shutdown;
