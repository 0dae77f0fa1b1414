use super::{open_ledger, verdict};
use crate::IdentityCommands;
use anyhow::{Context, Result};
use medledger::{identity, LedgerConfig};

pub fn execute(config: LedgerConfig, cmd: IdentityCommands) -> Result<bool> {
    let ledger = open_ledger(config)?;
    let container = ledger.container();

    let passed = match cmd {
        IdentityCommands::Add { owner } => {
            let record = identity::add(container, &owner).context("Failed to add identity")?;
            println!("Identity added");
            println!("  User UUID: {}", record.user_uuid);
            true
        }
        IdentityCommands::Verify { owner } => {
            let verified = identity::verify(container, &owner).context("Failed to verify owner")?;
            println!("Owner verification: {}", verdict(verified));
            verified
        }
        IdentityCommands::Show => {
            match identity::show(container).context("Failed to read identity")? {
                Some(record) => {
                    println!("User UUID:  {}", record.user_uuid);
                    println!("Owner hash: {}", record.owner_hash);
                    println!("Created:    {}", record.created_at.to_rfc3339());
                }
                None => println!("No identity recorded"),
            }
            true
        }
    };

    ledger.close().context("Failed to close ledger")?;
    Ok(passed)
}
