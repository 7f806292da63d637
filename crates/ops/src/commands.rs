//! Subcommands and their handlers.
//!
//! Handlers write human-readable output to the given writer, or JSON when
//! `--json` is set, so they can be driven from tests without a terminal.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, bail};
use chorus_persistence::backends::sqlite::{SqliteConnector, SqliteTenantRegistry};
use chorus_persistence::crypto::{ENCRYPTION_KEY_ENV_VAR, EncryptionVault};
use chorus_persistence::dlq::DeadLetterQueue;
use chorus_persistence::tenant::{TenantConnectionManager, TenantId, TenantRegistry, TenantStatus};
use chorus_persistence::types::{DlqCategory, DlqEntry, DlqFilter, DlqStatus, PageRequest};
use chorus_persistence::Backend;
use clap::Subcommand;
use serde_json::json;
use tracing::info;

use crate::config::OpsConfig;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Top-level commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Tenant registry operations.
    #[command(subcommand)]
    Tenant(TenantCommand),

    /// Dead-letter queue operations.
    #[command(subcommand)]
    Dlq(DlqCommand),

    /// Field encryption key operations.
    #[command(subcommand)]
    Key(KeyCommand),
}

/// Field encryption key operations.
#[derive(Debug, Subcommand)]
pub enum KeyCommand {
    /// Load `ENCRYPTION_KEY` and round-trip a probe value through it.
    Check,
}

/// Tenant registry operations.
#[derive(Debug, Subcommand)]
pub enum TenantCommand {
    /// List every registered tenant.
    List,

    /// Resolve a tenant and run a health check on its database.
    Check {
        /// Tenant identifier.
        tenant: String,
    },

    /// Change a tenant's lifecycle status.
    SetStatus {
        /// Tenant identifier.
        tenant: String,
        /// New status (active, suspended, deleted).
        status: TenantStatus,
    },
}

/// Dead-letter queue operations.
#[derive(Debug, Subcommand)]
pub enum DlqCommand {
    /// List entries, most recent attempt first.
    List {
        /// Tenant identifier.
        tenant: String,
        /// Only entries in this status (PENDING, RESOLVED, DEAD_LETTER).
        #[arg(long)]
        status: Option<DlqStatus>,
        /// Only entries of this category (SMS_SEND, WEBHOOK_INBOUND, ...).
        #[arg(long)]
        category: Option<DlqCategory>,
        /// Page number, starting at 1.
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// Entries per page.
        #[arg(long, default_value_t = 20)]
        page_size: u32,
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Print one entry as JSON.
    Show {
        /// Tenant identifier.
        tenant: String,
        /// Entry id.
        id: String,
    },

    /// Count entries per status.
    Stats {
        /// Tenant identifier.
        tenant: String,
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Mark a pending entry resolved.
    Resolve {
        /// Tenant identifier.
        tenant: String,
        /// Entry id.
        id: String,
        /// Note stored in the entry's metadata.
        #[arg(long)]
        note: Option<String>,
    },

    /// Give up on a pending entry.
    MarkDead {
        /// Tenant identifier.
        tenant: String,
        /// Entry id.
        id: String,
        /// Why the entry is abandoned.
        #[arg(long)]
        reason: String,
    },

    /// Delete resolved entries older than a duration such as `30days`.
    Purge {
        /// Tenant identifier.
        tenant: String,
        /// Minimum age of purged entries (whole days).
        #[arg(long, value_parser = humantime::parse_duration, default_value = "30days")]
        older_than: Duration,
    },
}

/// Open stores shared by every handler.
#[derive(Debug)]
pub struct Context {
    registry: Arc<SqliteTenantRegistry>,
    manager: Arc<TenantConnectionManager>,
    dlq: DeadLetterQueue,
}

impl Context {
    /// Opens the registry and prepares a tenant manager.
    pub fn open(config: &OpsConfig) -> anyhow::Result<Self> {
        let registry = Arc::new(
            SqliteTenantRegistry::open(&config.registry_db).with_context(|| {
                format!("Failed to open registry {}", config.registry_db.display())
            })?,
        );
        let manager_config = config.manager_config();
        let connector = Arc::new(SqliteConnector::from_config(&manager_config));
        let manager = Arc::new(TenantConnectionManager::new(
            manager_config,
            registry.clone(),
            connector,
        )?);
        let dlq = DeadLetterQueue::new(Arc::clone(&manager));
        Ok(Self {
            registry,
            manager,
            dlq,
        })
    }

    /// The registry.
    pub fn registry(&self) -> &Arc<SqliteTenantRegistry> {
        &self.registry
    }
}

/// Runs a command.
pub async fn run(command: Command, ctx: &Context, out: &mut dyn Write) -> anyhow::Result<()> {
    match command {
        Command::Tenant(cmd) => run_tenant(cmd, ctx, out).await,
        Command::Dlq(cmd) => run_dlq(cmd, ctx, out).await,
        Command::Key(KeyCommand::Check) => {
            let vault = EncryptionVault::from_env()
                .with_context(|| format!("{} is not usable", ENCRYPTION_KEY_ENV_VAR))?;
            check_key(&vault, out)
        }
    }
}

fn check_key(vault: &EncryptionVault, out: &mut dyn Write) -> anyhow::Result<()> {
    let probe = "123456789";
    let stored = vault.encrypt(probe)?;
    if vault.decrypt(&stored)? != probe {
        bail!("Encryption key failed to round-trip a probe value");
    }
    writeln!(out, "key:      ok")?;
    Ok(())
}

async fn run_tenant(command: TenantCommand, ctx: &Context, out: &mut dyn Write) -> anyhow::Result<()> {
    match command {
        TenantCommand::List => {
            for record in ctx.registry.list()? {
                writeln!(
                    out,
                    "{}\t{}\t{}",
                    record.id, record.status, record.display_name
                )?;
            }
        }
        TenantCommand::Check { tenant } => {
            let tenant_id = TenantId::new(tenant);
            let Some(record) = ctx.registry.fetch(&tenant_id).await? else {
                bail!("Tenant {} is not registered", tenant_id);
            };
            writeln!(out, "tenant:   {}", record.id)?;
            writeln!(out, "name:     {}", record.display_name)?;
            writeln!(out, "database: {}", record.database_identifier)?;
            writeln!(out, "status:   {}", record.status)?;

            let handle = ctx
                .manager
                .resolve(&tenant_id)
                .await
                .with_context(|| format!("Tenant {} cannot be resolved", tenant_id))?;
            handle
                .health_check()
                .await
                .with_context(|| format!("Tenant {} failed its health check", tenant_id))?;
            writeln!(out, "health:   ok")?;
        }
        TenantCommand::SetStatus { tenant, status } => {
            let tenant_id = TenantId::new(tenant);
            if !ctx.registry.set_status(&tenant_id, status).await? {
                bail!("Tenant {} is not registered", tenant_id);
            }
            info!(tenant_id = %tenant_id, status = %status, "Tenant status changed");
            writeln!(out, "{} is now {}", tenant_id, status)?;
        }
    }
    Ok(())
}

async fn run_dlq(command: DlqCommand, ctx: &Context, out: &mut dyn Write) -> anyhow::Result<()> {
    match command {
        DlqCommand::List {
            tenant,
            status,
            category,
            page,
            page_size,
            json,
        } => {
            let filter = DlqFilter {
                status,
                category,
                external_id: None,
            };
            let page = ctx
                .dlq
                .list(&TenantId::new(tenant), &filter, PageRequest::new(page, page_size))
                .await?;
            if json {
                writeln!(out, "{}", serde_json::to_string_pretty(&page)?)?;
            } else {
                for entry in &page.items {
                    write_row(out, entry)?;
                }
                writeln!(
                    out,
                    "page {}/{} ({} entries)",
                    page.pagination.page,
                    page.pagination.total_pages.max(1),
                    page.pagination.total
                )?;
            }
        }
        DlqCommand::Show { tenant, id } => {
            let Some(entry) = ctx.dlq.get(&TenantId::new(tenant), &id).await? else {
                bail!("No dead-letter entry {}", id);
            };
            writeln!(out, "{}", serde_json::to_string_pretty(&entry)?)?;
        }
        DlqCommand::Stats { tenant, json } => {
            let stats = ctx.dlq.stats(&TenantId::new(tenant)).await?;
            if json {
                writeln!(out, "{}", serde_json::to_string(&stats)?)?;
            } else {
                writeln!(out, "pending:     {}", stats.pending)?;
                writeln!(out, "resolved:    {}", stats.resolved)?;
                writeln!(out, "dead_letter: {}", stats.dead_letter)?;
                writeln!(out, "total:       {}", stats.total())?;
            }
        }
        DlqCommand::Resolve { tenant, id, note } => {
            let metadata = json!({
                "resolved_by": "chorus-ops",
                "resolution_note": note,
            });
            let entry = ctx
                .dlq
                .resolve(&TenantId::new(tenant), &id, Some(metadata))
                .await?;
            writeln!(out, "{} {}", entry.id, entry.status)?;
        }
        DlqCommand::MarkDead { tenant, id, reason } => {
            let entry = ctx
                .dlq
                .mark_dead(&TenantId::new(tenant), &id, &reason)
                .await?;
            writeln!(out, "{} {}", entry.id, entry.status)?;
        }
        DlqCommand::Purge { tenant, older_than } => {
            let days = older_than_days(older_than)?;
            let purged = ctx
                .dlq
                .purge_resolved_older_than(&TenantId::new(tenant), days)
                .await?;
            writeln!(out, "purged {} resolved entries older than {} days", purged, days)?;
        }
    }
    Ok(())
}

fn write_row(out: &mut dyn Write, entry: &DlqEntry) -> std::io::Result<()> {
    writeln!(
        out,
        "{}\t{}\t{}\t{}\t{}\t{}",
        entry.id,
        entry.category,
        entry.status,
        entry.retry_count,
        entry.last_attempt_at.format("%Y-%m-%d %H:%M:%S"),
        entry.error_message
    )
}

/// Whole days in a duration, rounded down.
fn older_than_days(duration: Duration) -> anyhow::Result<u32> {
    u32::try_from(duration.as_secs() / SECONDS_PER_DAY).context("Purge age is too large")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_older_than_days_rounds_down() {
        assert_eq!(older_than_days(humantime::parse_duration("30days").unwrap()).unwrap(), 30);
        assert_eq!(older_than_days(humantime::parse_duration("36h").unwrap()).unwrap(), 1);
        assert_eq!(older_than_days(Duration::from_secs(5)).unwrap(), 0);
    }

    #[test]
    fn test_check_key() {
        let vault = EncryptionVault::from_hex(&"ab".repeat(32)).unwrap();
        let mut out = Vec::new();
        check_key(&vault, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "key:      ok\n");
    }
}
