//! Channel-partitioned structured log files
//!
//! Each concern (requests, model calls, storage, access) writes JSON lines to
//! its own directory, one file per day. Files are rotated by date or size into
//! gzip archives and retained per channel.
//!
//! Features:
//! - `ChannelLayer`: a `tracing_subscriber::Layer` that routes events by target
//!   (`medledger::request`, `medledger::access`, ...) into channel files
//! - Rotation with gzip compression; same-day re-rotation gets a time suffix
//! - Retention per channel: expired files are deleted, except for the access
//!   channel, whose files are moved to the archive directory and never deleted

mod channels;
mod layer;

pub use channels::{ChannelLogs, CleanupReport};
pub use layer::ChannelLayer;
