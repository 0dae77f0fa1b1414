use super::{header, open_ledger, verdict};
use anyhow::{Context, Result};
use medledger::{Ledger, LedgerConfig, RecordContainer};

pub fn init(config: LedgerConfig, owner: &str, force: bool) -> Result<bool> {
    let path = config.container.path.clone();
    let ledger = Ledger::initialize(config, owner, force)
        .with_context(|| format!("Failed to initialize ledger at {}", path.display()))?;

    let identity = ledger
        .identity()
        .context("Failed to read identity")?
        .context("Identity missing after initialization")?;
    ledger.close().context("Failed to close ledger")?;

    println!("Initialized ledger at {}", path.display());
    println!("  User UUID: {}", identity.user_uuid);
    Ok(true)
}

pub fn validate(config: &LedgerConfig) -> Result<bool> {
    let path = &config.container.path;
    let report = RecordContainer::validate(path, config.container.embedding_dim);

    header("Container Validation");
    println!("Path: {}", path.display());
    for warning in &report.warnings {
        println!("  warning: {}", warning);
    }
    for error in &report.errors {
        println!("  error: {}", error);
    }
    println!("\nResult: {}", verdict(report.valid));
    Ok(report.valid)
}

pub fn stats(config: LedgerConfig) -> Result<bool> {
    let ledger = open_ledger(config)?;
    let stats = ledger.get_stats().context("Failed to collect stats")?;

    header("Ledger Statistics");
    println!("Path: {}", ledger.config().container.path.display());
    println!("Created: {}", stats.created_at.as_deref().unwrap_or("unknown"));
    match stats.schema_version {
        Some(version) => println!("Schema version: {}", version),
        None => println!("Schema version: unknown"),
    }
    println!("File size: {} bytes", stats.file_size);
    println!();
    println!("Interaction records: {}", stats.records);
    println!("Embeddings: {}", stats.embeddings);
    println!("Audit events: {}", stats.audit_events);

    let manifests = ledger
        .manifests()
        .list_manifests(None, None)
        .context("Failed to list manifests")?;
    println!("Daily manifests: {}", manifests.len());
    if let Some(latest) = manifests.last() {
        println!("Latest manifest: {}", latest.date);
    }

    ledger.close().context("Failed to close ledger")?;
    Ok(true)
}
