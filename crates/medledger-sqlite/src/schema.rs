//! Table layout of the container file.
//!
//! - `_container_meta(key, value)` - schema version, creation time, embedding width
//! - `_columns(section, name, kind, width, position)` - the section catalog
//! - `"{section}__{column}"(idx INTEGER PRIMARY KEY, value)` - one table per column

use crate::sql_err;
use medledger_core::{ColumnKind, ColumnSpec, ColumnValue, LedgerError, Result, SectionSpec};
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;

pub const SCHEMA_VERSION: u32 = 1;

pub fn table_name(section: &str, column: &str) -> String {
    format!("{}__{}", section, column)
}

pub(crate) fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn check_identifier(ident: &str) -> Result<()> {
    let ok = !ident.is_empty()
        && ident
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && !ident.contains("__");
    if ok {
        Ok(())
    } else {
        Err(LedgerError::SchemaInvalid(format!(
            "Illegal section or column name '{}'",
            ident
        )))
    }
}

pub(crate) fn sql_type(kind: &ColumnKind) -> &'static str {
    match kind {
        ColumnKind::Text => "TEXT",
        ColumnKind::Integer => "INTEGER",
        ColumnKind::Real => "REAL",
        ColumnKind::Vector { .. } => "BLOB",
    }
}

/// Create the catalog and metadata tables
pub fn init_catalog(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _container_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )
    .map_err(sql_err)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS _columns (
            section TEXT NOT NULL,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            width INTEGER,
            position INTEGER NOT NULL,
            PRIMARY KEY (section, name)
        )",
        [],
    )
    .map_err(sql_err)?;

    Ok(())
}

pub fn set_meta(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO _container_meta (key, value) VALUES (?1, ?2)",
        params![key, value],
    )
    .map_err(sql_err)?;
    Ok(())
}

pub fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM _container_meta WHERE key = ?1",
        [key],
        |row| row.get(0),
    )
    .optional()
    .map_err(sql_err)
}

/// Create one column table with its append-only triggers
pub fn create_column_table(conn: &Connection, table: &str, kind: &ColumnKind) -> Result<()> {
    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS {} (idx INTEGER PRIMARY KEY, value {} NOT NULL)",
            quote(table),
            sql_type(kind)
        ),
        [],
    )
    .map_err(sql_err)?;
    install_triggers(conn, table)
}

/// Refuse UPDATE and DELETE on a column table at the storage level
pub fn install_triggers(conn: &Connection, table: &str) -> Result<()> {
    for (suffix, op) in [("no_update", "UPDATE"), ("no_delete", "DELETE")] {
        conn.execute(
            &format!(
                "CREATE TRIGGER IF NOT EXISTS {trigger} BEFORE {op} ON {table}
                 BEGIN SELECT RAISE(ABORT, 'append-only: {op} refused on {name}'); END",
                trigger = quote(&format!("{}__{}", table, suffix)),
                op = op,
                table = quote(table),
                name = table,
            ),
            [],
        )
        .map_err(sql_err)?;
    }
    Ok(())
}

/// Create every column table of a section and register it in the catalog.
///
/// Idempotent: existing tables and catalog rows are left untouched.
pub fn create_section(conn: &Connection, spec: &SectionSpec) -> Result<()> {
    check_identifier(&spec.name)?;
    if spec.columns.is_empty() {
        return Err(LedgerError::SchemaInvalid(format!(
            "Section '{}' has no columns",
            spec.name
        )));
    }
    for (position, column) in spec.columns.iter().enumerate() {
        check_identifier(&column.name)?;
        create_column_table(conn, &table_name(&spec.name, &column.name), &column.kind)?;
        conn.execute(
            "INSERT OR IGNORE INTO _columns (section, name, kind, width, position)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                spec.name,
                column.name,
                column.kind.tag(),
                column.kind.width().map(|w| w as i64),
                position as i64
            ],
        )
        .map_err(sql_err)?;
    }
    Ok(())
}

/// Load the section catalog, columns in declaration order
pub fn load_catalog(conn: &Connection) -> Result<BTreeMap<String, SectionSpec>> {
    let mut stmt = conn
        .prepare("SELECT section, name, kind, width FROM _columns ORDER BY section, position")
        .map_err(sql_err)?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<i64>>(3)?,
            ))
        })
        .map_err(sql_err)?;

    let mut catalog: BTreeMap<String, SectionSpec> = BTreeMap::new();
    for row in rows {
        let (section, name, tag, width) = row.map_err(sql_err)?;
        let kind = ColumnKind::from_tag(&tag, width.map(|w| w as usize)).ok_or_else(|| {
            LedgerError::SchemaInvalid(format!(
                "Column {}.{} has unknown kind '{}'",
                section, name, tag
            ))
        })?;
        catalog
            .entry(section.clone())
            .or_insert_with(|| SectionSpec {
                name: section,
                columns: Vec::new(),
            })
            .columns
            .push(ColumnSpec { name, kind });
    }
    Ok(catalog)
}

pub fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get(0),
        )
        .map_err(sql_err)?;
    Ok(count > 0)
}

pub fn table_len(conn: &Connection, table: &str) -> Result<u64> {
    let count: i64 = conn
        .query_row(&format!("SELECT COUNT(*) FROM {}", quote(table)), [], |row| {
            row.get(0)
        })
        .map_err(sql_err)?;
    Ok(count as u64)
}

pub fn column_len(conn: &Connection, section: &str, column: &str) -> Result<u64> {
    table_len(conn, &table_name(section, column))
}

pub(crate) fn to_sql(value: &ColumnValue) -> Value {
    match value {
        ColumnValue::Text(text) => Value::Text(text.clone()),
        ColumnValue::Integer(i) => Value::Integer(*i),
        ColumnValue::Real(r) => Value::Real(*r),
        ColumnValue::Vector(v) => Value::Blob(ColumnValue::encode_vector(v)),
    }
}

pub(crate) fn from_sql(kind: &ColumnKind, value: ValueRef<'_>) -> Result<ColumnValue> {
    let mismatch = || LedgerError::SchemaInvalid(format!("Stored value is not {}", kind));
    match (kind, value) {
        (ColumnKind::Text, ValueRef::Text(bytes)) => Ok(ColumnValue::Text(
            String::from_utf8(bytes.to_vec()).map_err(|_| mismatch())?,
        )),
        (ColumnKind::Integer, ValueRef::Integer(i)) => Ok(ColumnValue::Integer(i)),
        (ColumnKind::Real, ValueRef::Real(r)) => Ok(ColumnValue::Real(r)),
        (ColumnKind::Vector { width }, ValueRef::Blob(bytes)) => {
            let vector = ColumnValue::decode_vector(bytes)?;
            if vector.len() != *width {
                return Err(LedgerError::SchemaInvalid(format!(
                    "Stored vector has width {}, column declares {}",
                    vector.len(),
                    width
                )));
            }
            Ok(ColumnValue::Vector(vector))
        }
        _ => Err(mismatch()),
    }
}
