pub mod audit;
pub mod manifest;
pub mod record;
pub mod schema;
pub mod time;
pub mod value;

pub use audit::{AuditEvent, AuditStatus};
pub use manifest::DailyManifest;
pub use record::{EmbeddingRecord, IdentityRecord, InteractionRecord, Record, RetentionMark};
pub use schema::{ColumnKind, ColumnSpec, SectionSpec};
pub use value::{ColumnValue, Row};
