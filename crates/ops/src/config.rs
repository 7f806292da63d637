//! Operator CLI configuration.
//!
//! Every option can come from the command line or the environment.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `CHORUS_REGISTRY_DB` | registry.db | Path of the central tenant registry |
//! | `CHORUS_DATA_DIR` | tenants | Directory holding tenant database files |
//! | `CHORUS_LOG_LEVEL` | warn | Log level |
//! | `CHORUS_TENANT_ID_PATTERN` | `^[A-Za-z0-9][A-Za-z0-9_-]{0,63}$` | Allowed tenant identifiers |

use std::path::PathBuf;

use chorus_persistence::tenant::TenantManagerConfig;
use clap::{Args, Parser};
use regex::Regex;

use crate::commands::Command;

/// Inspect and maintain Chorus tenant databases.
#[derive(Debug, Parser)]
#[command(name = "chorus-ops", version)]
#[command(about = "Inspect tenants and maintain their dead-letter queues")]
pub struct Cli {
    /// Connection options.
    #[command(flatten)]
    pub config: OpsConfig,

    /// What to do.
    #[command(subcommand)]
    pub command: Command,
}

/// Where the registry and tenant databases live.
#[derive(Debug, Clone, Args)]
pub struct OpsConfig {
    /// Path of the central tenant registry database.
    #[arg(long, global = true, env = "CHORUS_REGISTRY_DB", default_value = "registry.db")]
    pub registry_db: PathBuf,

    /// Directory holding one database file per tenant.
    #[arg(long, global = true, env = "CHORUS_DATA_DIR", default_value = "tenants")]
    pub data_dir: PathBuf,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, global = true, env = "CHORUS_LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Allowed tenant identifiers (regex pattern).
    #[arg(
        long,
        global = true,
        env = "CHORUS_TENANT_ID_PATTERN",
        default_value = r"^[A-Za-z0-9][A-Za-z0-9_-]{0,63}$"
    )]
    pub tenant_id_pattern: String,
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            registry_db: PathBuf::from("registry.db"),
            data_dir: PathBuf::from("tenants"),
            log_level: "warn".to_string(),
            tenant_id_pattern: TenantManagerConfig::default().tenant_id_pattern,
        }
    }
}

impl OpsConfig {
    /// Validates the configuration, returning every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.registry_db.as_os_str().is_empty() {
            errors.push("Registry database path cannot be empty".to_string());
        }

        if self.data_dir.as_os_str().is_empty() {
            errors.push("Data directory cannot be empty".to_string());
        }

        if !["error", "warn", "info", "debug", "trace"]
            .contains(&self.log_level.to_ascii_lowercase().as_str())
        {
            errors.push(format!("Unknown log level: {}", self.log_level));
        }

        if let Err(e) = Regex::new(&self.tenant_id_pattern) {
            errors.push(format!("Invalid tenant id pattern: {}", e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// The tenant manager configuration this CLI runs with.
    ///
    /// Registry records are never cached: every command reads the registry.
    pub fn manager_config(&self) -> TenantManagerConfig {
        TenantManagerConfig::default()
            .with_registry_cache_ttl_secs(0)
            .with_data_dir(self.data_dir.clone())
            .with_tenant_id_pattern(self.tenant_id_pattern.clone())
    }
}
