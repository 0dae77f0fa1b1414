use super::{header, open_ledger};
use crate::AuditCommands;
use anyhow::{Context, Result};
use chrono::{NaiveTime, TimeZone, Utc};
use medledger::LedgerConfig;

pub fn execute(config: LedgerConfig, cmd: AuditCommands) -> Result<bool> {
    let default_days = config.retention.retention_days;
    let ledger = open_ledger(config)?;
    let audit = ledger.audit();

    match cmd {
        AuditCommands::List {
            limit,
            operation,
            actor,
        } => {
            let events = audit
                .get_audit_logs(limit, operation.as_deref(), actor.as_deref())
                .context("Failed to read audit log")?;
            header(&format!("Audit Events ({})", events.len()));
            for event in &events {
                println!(
                    "{}  {:<20} {:<16} {:<8} {}",
                    event.timestamp.to_rfc3339(),
                    event.operation,
                    event.actor_id,
                    event.status.as_str(),
                    event.resource_path
                );
            }
        }
        AuditCommands::Cleanup {
            days,
            dry_run,
            execute: _,
        } => {
            let days = days.unwrap_or(default_days);
            let stats = audit
                .cleanup_old_logs(days, dry_run)
                .context("Failed to apply audit retention")?;
            if dry_run {
                println!(
                    "Dry run: {} audit events older than {} days would be removed ({} kept)",
                    stats.would_delete, days, stats.kept
                );
            } else {
                println!(
                    "Removed {} audit events older than {} days ({} kept)",
                    stats.deleted, days, stats.kept
                );
            }
        }
        AuditCommands::Stats { days } => {
            let days = days.unwrap_or(default_days);
            let stats = audit
                .get_retention_stats(days)
                .context("Failed to compute retention stats")?;
            header(&format!("Audit Retention ({} days)", days));
            println!("Total events:      {}", stats.total);
            println!("Within retention:  {}", stats.within_retention);
            println!(
                "Beyond retention:  {} ({:.1}%)",
                stats.beyond_retention, stats.percentage_old
            );
            if let Some(oldest) = stats.oldest {
                println!("Oldest:            {}", oldest.to_rfc3339());
            }
            if let Some(newest) = stats.newest {
                println!("Newest:            {}", newest.to_rfc3339());
            }
        }
        AuditCommands::Export { start, end } => {
            let end = end
                .succ_opt()
                .context("End date out of range")?;
            let start = Utc.from_utc_datetime(&start.and_time(NaiveTime::MIN));
            let end = Utc.from_utc_datetime(&end.and_time(NaiveTime::MIN));
            let events = audit.export(start, end).context("Failed to export audit log")?;
            for event in &events {
                println!("{}", serde_json::to_string(event)?);
            }
        }
    }

    ledger.close().context("Failed to close ledger")?;
    Ok(true)
}
