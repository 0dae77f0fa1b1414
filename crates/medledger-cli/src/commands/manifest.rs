use super::{header, open_ledger, verdict};
use crate::ManifestCommands;
use anyhow::{Context, Result};
use medledger::LedgerConfig;

pub fn execute(config: LedgerConfig, cmd: ManifestCommands) -> Result<bool> {
    let ledger = open_ledger(config)?;
    let chain = ledger.manifests();

    let passed = match cmd {
        ManifestCommands::Create { date } => {
            let manifest = chain
                .create_daily_manifest(date)
                .context("Failed to create daily manifest")?;
            println!("Manifest created for {}", manifest.date);
            println!("  Events:        {}", manifest.event_count);
            println!("  Access log:    {}", manifest.access_log_hash);
            println!(
                "  Previous:      {}",
                manifest.previous_manifest_hash.as_deref().unwrap_or("none")
            );
            println!("  Manifest hash: {}", manifest.manifest_hash);
            true
        }
        ManifestCommands::Verify { start, end } => {
            let report = chain
                .verify_manifest_chain(start, end)
                .context("Failed to verify manifest chain")?;
            header("Manifest Chain Verification");
            println!("Manifests checked: {}", report.manifests_checked);
            if !report.pruned_dates.is_empty() {
                println!(
                    "Pruned by retention (access log not checked): {}",
                    report.pruned_dates.len()
                );
            }
            for error in &report.errors {
                println!("  {}", error);
            }
            println!("\nResult: {}", verdict(report.valid));
            report.valid
        }
        ManifestCommands::List { start, end } => {
            let manifests = chain
                .list_manifests(start, end)
                .context("Failed to list manifests")?;
            header(&format!("Daily Manifests ({})", manifests.len()));
            for manifest in &manifests {
                let linked = if manifest.previous_manifest_hash.is_some() {
                    "linked"
                } else {
                    "segment start"
                };
                println!(
                    "{}  {:>6} events  {}  {}",
                    manifest.date,
                    manifest.event_count,
                    &manifest.manifest_hash[..16.min(manifest.manifest_hash.len())],
                    linked
                );
            }
            true
        }
    };

    ledger.close().context("Failed to close ledger")?;
    Ok(passed)
}
