use crate::error::{LedgerError, Result};
use crate::types::schema::ColumnKind;
use std::collections::BTreeMap;

/// A single cell of a column
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Text(String),
    Integer(i64),
    Real(f64),
    Vector(Vec<f32>),
}

impl ColumnValue {
    /// Check that this value may be stored in a column of `kind`.
    pub fn check_kind(&self, kind: &ColumnKind) -> Result<()> {
        match (self, kind) {
            (ColumnValue::Text(_), ColumnKind::Text)
            | (ColumnValue::Integer(_), ColumnKind::Integer)
            | (ColumnValue::Real(_), ColumnKind::Real) => Ok(()),
            (ColumnValue::Vector(v), ColumnKind::Vector { width }) => {
                if v.len() == *width {
                    Ok(())
                } else {
                    Err(LedgerError::SchemaInvalid(format!(
                        "Vector width {} does not match column width {}",
                        v.len(),
                        width
                    )))
                }
            }
            (value, kind) => Err(LedgerError::SchemaInvalid(format!(
                "Value {:?} cannot be stored in {} column",
                value.kind_name(),
                kind
            ))),
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            ColumnValue::Text(_) => "text",
            ColumnValue::Integer(_) => "integer",
            ColumnValue::Real(_) => "real",
            ColumnValue::Vector(_) => "vector",
        }
    }

    /// Little-endian f32 encoding used for vector columns.
    pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(vector.len() * 4);
        for v in vector {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes
    }

    pub fn decode_vector(bytes: &[u8]) -> Result<Vec<f32>> {
        if bytes.len() % 4 != 0 {
            return Err(LedgerError::SchemaInvalid(format!(
                "Vector blob length {} is not a multiple of 4",
                bytes.len()
            )));
        }
        Ok(bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect())
    }
}

impl From<&str> for ColumnValue {
    fn from(text: &str) -> Self {
        ColumnValue::Text(text.to_string())
    }
}

impl From<String> for ColumnValue {
    fn from(text: String) -> Self {
        ColumnValue::Text(text)
    }
}

/// One logical record: the values at `index` across every column of a section.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub index: u64,
    values: BTreeMap<String, ColumnValue>,
}

impl Row {
    pub fn new(index: u64) -> Self {
        Self {
            index,
            values: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, column: impl Into<String>, value: ColumnValue) {
        self.values.insert(column.into(), value);
    }

    pub fn get(&self, column: &str) -> Option<&ColumnValue> {
        self.values.get(column)
    }

    pub fn text(&self, column: &str) -> Result<&str> {
        match self.values.get(column) {
            Some(ColumnValue::Text(text)) => Ok(text),
            Some(_) => Err(LedgerError::SchemaInvalid(format!(
                "Column '{}' is not text",
                column
            ))),
            None => Err(LedgerError::NotFound(format!("column '{}'", column))),
        }
    }

    pub fn vector(&self, column: &str) -> Result<&[f32]> {
        match self.values.get(column) {
            Some(ColumnValue::Vector(v)) => Ok(v),
            Some(_) => Err(LedgerError::SchemaInvalid(format!(
                "Column '{}' is not a vector",
                column
            ))),
            None => Err(LedgerError::NotFound(format!("column '{}'", column))),
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = (&String, &ColumnValue)> {
        self.values.iter()
    }
}
