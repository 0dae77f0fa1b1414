//! Section/column catalog of the record container.
//!
//! A section is a group of parallel columns; record N of a section is the
//! value at index N of every column. Columns only ever grow.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const INTERACTIONS: &str = "interactions";
pub const EMBEDDINGS: &str = "embeddings";
pub const IDENTITY: &str = "identity";
pub const AUDIT: &str = "audit";
/// Ledger of sanctioned retention rebuilds
pub const RETENTION: &str = "retention";

/// Storage type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    Text,
    Integer,
    Real,
    /// Fixed-width f32 vector
    Vector { width: usize },
}

impl ColumnKind {
    /// Name stored in the catalog
    pub fn tag(&self) -> &'static str {
        match self {
            ColumnKind::Text => "text",
            ColumnKind::Integer => "integer",
            ColumnKind::Real => "real",
            ColumnKind::Vector { .. } => "vector",
        }
    }

    pub fn width(&self) -> Option<usize> {
        match self {
            ColumnKind::Vector { width } => Some(*width),
            _ => None,
        }
    }

    pub fn from_tag(tag: &str, width: Option<usize>) -> Option<Self> {
        match (tag, width) {
            ("text", _) => Some(ColumnKind::Text),
            ("integer", _) => Some(ColumnKind::Integer),
            ("real", _) => Some(ColumnKind::Real),
            ("vector", Some(width)) => Some(ColumnKind::Vector { width }),
            _ => None,
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnKind::Vector { width } => write!(f, "vector[{}]", width),
            other => f.write_str(other.tag()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
}

impl ColumnSpec {
    pub fn text(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ColumnKind::Text,
        }
    }

    pub fn vector(name: &str, width: usize) -> Self {
        Self {
            name: name.to_string(),
            kind: ColumnKind::Vector { width },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionSpec {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
}

impl SectionSpec {
    fn text_section(name: &str, columns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            columns: columns.iter().map(|c| ColumnSpec::text(c)).collect(),
        }
    }

    pub fn interactions() -> Self {
        Self::text_section(
            INTERACTIONS,
            &[
                "record_id",
                "timestamp",
                "session_id",
                "transcript",
                "note",
                "model_id",
                "metadata",
            ],
        )
    }

    pub fn embeddings(dim: usize) -> Self {
        Self {
            name: EMBEDDINGS.to_string(),
            columns: vec![
                ColumnSpec::text("record_id"),
                ColumnSpec::vector("vector", dim),
                ColumnSpec::text("model"),
            ],
        }
    }

    pub fn identity() -> Self {
        Self::text_section(IDENTITY, &["user_uuid", "owner_hash", "salt", "created_at"])
    }

    pub fn audit() -> Self {
        Self::text_section(
            AUDIT,
            &[
                "event_id",
                "timestamp",
                "operation",
                "actor_id",
                "resource_path",
                "payload_hash",
                "result_hash",
                "status",
                "metadata",
            ],
        )
    }

    pub fn retention() -> Self {
        Self {
            name: RETENTION.to_string(),
            columns: vec![
                ColumnSpec::text("recorded_at"),
                ColumnSpec::text("section"),
                ColumnSpec::text("cutoff"),
                ColumnSpec {
                    name: "removed".to_string(),
                    kind: ColumnKind::Integer,
                },
            ],
        }
    }

    /// Every section a freshly initialized container carries.
    pub fn required(embedding_dim: usize) -> Vec<Self> {
        vec![
            Self::interactions(),
            Self::embeddings(embedding_dim),
            Self::identity(),
            Self::audit(),
            Self::retention(),
        ]
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }
}
