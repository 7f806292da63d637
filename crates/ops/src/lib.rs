//! Chorus operator CLI.
//!
//! Inspects tenant resolution and maintains per-tenant dead-letter queues
//! directly against the registry and tenant database files.

pub mod commands;
pub mod config;

pub use commands::{Command, Context, DlqCommand, KeyCommand, TenantCommand, run};
pub use config::{Cli, OpsConfig};

/// Initializes the tracing subscriber for logging.
///
/// `RUST_LOG` takes precedence over `level` when set. Logs go to stderr so
/// command output on stdout stays machine-readable.
pub fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("chorus_ops={level},chorus_persistence={level}"))
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}
