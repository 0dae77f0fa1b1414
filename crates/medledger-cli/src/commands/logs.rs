use crate::LogsCommands;
use anyhow::{Context, Result};
use medledger::{ChannelLogs, LedgerConfig, LogChannel};

pub fn execute(config: LedgerConfig, cmd: LogsCommands) -> Result<bool> {
    let logs = ChannelLogs::open(config.logs).context("Failed to open channel logs")?;

    match cmd {
        LogsCommands::Rotate { all } => {
            let rotated = if all {
                logs.rotate_all().context("Failed to rotate logs")?
            } else {
                let mut rotated = Vec::new();
                for channel in LogChannel::ALL {
                    if logs.should_rotate(channel)? {
                        rotated.extend(
                            logs.rotate_log(channel)
                                .with_context(|| format!("Failed to rotate {} log", channel))?,
                        );
                    }
                }
                rotated
            };
            println!("Rotated {} log files", rotated.len());
            for path in &rotated {
                println!("  {}", path.display());
            }
        }
        LogsCommands::Cleanup => {
            let report = logs.cleanup_all().context("Failed to apply log retention")?;
            println!("Deleted {} log files", report.deleted.len());
            for path in &report.deleted {
                println!("  {}", path.display());
            }
            println!("Archived {} access log files", report.archived.len());
            for path in &report.archived {
                println!("  {}", path.display());
            }
        }
    }
    Ok(true)
}
