pub mod audit;
pub mod container;
pub mod identity;
pub mod logs;
pub mod manifest;

use anyhow::{Context, Result};
use medledger::{Ledger, LedgerConfig};

pub(crate) fn open_ledger(config: LedgerConfig) -> Result<Ledger> {
    let path = config.container.path.clone();
    Ledger::open(config).with_context(|| format!("Failed to open ledger at {}", path.display()))
}

pub(crate) fn header(title: &str) {
    println!("{}", title);
    println!("{}", "=".repeat(60));
}

pub(crate) fn verdict(passed: bool) -> &'static str {
    if passed {
        "PASS"
    } else {
        "FAIL"
    }
}
