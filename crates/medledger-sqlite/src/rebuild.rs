//! Retention rebuild of a section.
//!
//! This is the one sanctioned path that removes committed records. It never
//! mutates a column in place: each column is copied into a fresh table holding
//! only the retained rows (renumbered densely from zero), the old table is
//! dropped and the new one renamed into its place. Everything happens inside a
//! single immediate transaction, so readers see either the old section or the
//! rebuilt one. The same transaction appends a marker record describing the
//! rebuild, so the removal itself leaves an append-only trace.

use crate::container::{query_rows, Direction, RecordContainer};
use crate::schema::{self, quote, sql_type, table_name};
use crate::sql_err;
use medledger_core::{ColumnSpec, LedgerError, Record, Result, Row, SectionSpec};
use rusqlite::{params, Connection};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildOutcome {
    pub kept: u64,
    pub removed: u64,
}

/// Rewrite `section` so that it holds only the rows `retain` accepts, in their
/// original order, and append the marker built by `marker` to its own section.
///
/// Rows are selected under the container lock inside the rebuild transaction,
/// so a record appended concurrently is either seen by `retain` or lands after
/// the rebuild. When every row is retained nothing is written and no marker is
/// appended.
pub fn replace_section_retaining<M, F, K>(
    container: &RecordContainer,
    section: &str,
    mut retain: F,
    marker: K,
) -> Result<RebuildOutcome>
where
    M: Record,
    F: FnMut(&Row) -> Result<bool>,
    K: FnOnce(&RebuildOutcome) -> M,
{
    if M::section() == section {
        return Err(LedgerError::InvalidState(format!(
            "rebuild marker cannot live in the rebuilt section '{}'",
            section
        )));
    }
    let spec = container.section_spec(section)?;
    let marker_spec = container.section_spec(M::section())?;
    let conn = container.lock();

    conn.execute_batch("BEGIN IMMEDIATE").map_err(sql_err)?;
    let result = select_rows(&conn, &spec, &mut retain).and_then(|(keep, total)| {
        if keep.len() as u64 == total {
            return Ok(RebuildOutcome {
                kept: total,
                removed: 0,
            });
        }
        let outcome = rebuild(&conn, section, &spec.columns, &keep)?;
        append_marker(&conn, M::section(), &marker_spec.columns, &marker(&outcome))?;
        Ok(outcome)
    });
    match result {
        Ok(outcome) => {
            conn.execute_batch("COMMIT").map_err(sql_err)?;
            if outcome.removed > 0 {
                tracing::info!(
                    target: "medledger::storage",
                    section,
                    kept = outcome.kept,
                    removed = outcome.removed,
                    "Rebuilt section"
                );
            }
            Ok(outcome)
        }
        Err(e) => {
            if let Err(rollback) = conn.execute_batch("ROLLBACK") {
                tracing::warn!(
                    target: "medledger::storage",
                    section,
                    error = %rollback,
                    "Rollback of section rebuild failed"
                );
            }
            Err(e)
        }
    }
}

/// Indices `retain` accepts, and the number of rows visited
fn select_rows<F>(conn: &Connection, spec: &SectionSpec, retain: &mut F) -> Result<(BTreeSet<u64>, u64)>
where
    F: FnMut(&Row) -> Result<bool>,
{
    let mut keep = BTreeSet::new();
    let mut total = 0u64;
    query_rows(conn, spec, None, Direction::Forward, |row| {
        total += 1;
        if retain(&row)? {
            keep.insert(row.index);
        }
        Ok(true)
    })?;
    Ok((keep, total))
}

fn append_marker<M: Record>(
    conn: &Connection,
    section: &str,
    columns: &[ColumnSpec],
    marker: &M,
) -> Result<()> {
    let values = marker.to_columns();
    let index = schema::column_len(conn, section, &columns[0].name)?;
    for column in columns {
        let value = values
            .iter()
            .find(|(name, _)| *name == column.name)
            .map(|(_, value)| value)
            .ok_or_else(|| {
                LedgerError::SchemaInvalid(format!(
                    "marker is missing column '{}.{}'",
                    section, column.name
                ))
            })?;
        value.check_kind(&column.kind)?;
        if schema::column_len(conn, section, &column.name)? != index {
            return Err(LedgerError::SchemaInvalid(format!(
                "columns of '{}' have unequal lengths",
                section
            )));
        }
        conn.execute(
            &format!(
                "INSERT INTO {} (idx, value) VALUES (?1, ?2)",
                quote(&table_name(section, &column.name))
            ),
            params![index as i64, schema::to_sql(value)],
        )
        .map_err(sql_err)?;
    }
    Ok(())
}

fn rebuild(
    conn: &Connection,
    section: &str,
    columns: &[ColumnSpec],
    keep: &BTreeSet<u64>,
) -> Result<RebuildOutcome> {
    let total = schema::column_len(conn, section, &columns[0].name)?;
    for column in columns {
        let len = schema::column_len(conn, section, &column.name)?;
        if len != total {
            return Err(LedgerError::SchemaInvalid(format!(
                "columns of '{}' have unequal lengths, refusing to rebuild",
                section
            )));
        }
    }
    if let Some(&last) = keep.iter().next_back() {
        if last >= total {
            return Err(LedgerError::InvalidState(format!(
                "cannot retain {}[{}], section has {} records",
                section, last, total
            )));
        }
    }

    conn.execute_batch(
        "CREATE TEMP TABLE IF NOT EXISTS _rebuild_keep (idx INTEGER PRIMARY KEY);
         DELETE FROM temp._rebuild_keep;",
    )
    .map_err(sql_err)?;
    {
        let mut insert = conn
            .prepare("INSERT INTO temp._rebuild_keep (idx) VALUES (?1)")
            .map_err(sql_err)?;
        for idx in keep {
            insert.execute(params![*idx as i64]).map_err(sql_err)?;
        }
    }

    for column in columns {
        let table = table_name(section, &column.name);
        let staging = format!("_rebuild_{}", table);
        conn.execute_batch(&format!(
            "CREATE TABLE {staging} (idx INTEGER PRIMARY KEY, value {ty} NOT NULL);
             INSERT INTO {staging} (idx, value)
                 SELECT ROW_NUMBER() OVER (ORDER BY idx) - 1, value FROM {table}
                 WHERE idx IN (SELECT idx FROM temp._rebuild_keep);
             DROP TABLE {table};
             ALTER TABLE {staging} RENAME TO {table};",
            staging = quote(&staging),
            ty = sql_type(&column.kind),
            table = quote(&table),
        ))
        .map_err(sql_err)?;
        schema::install_triggers(conn, &table)?;
    }
    conn.execute_batch("DROP TABLE temp._rebuild_keep").map_err(sql_err)?;

    let kept = keep.len() as u64;
    for column in columns {
        if schema::column_len(conn, section, &column.name)? != kept {
            return Err(LedgerError::InvalidState(format!(
                "rebuild of '{}' left column '{}' with the wrong length",
                section, column.name
            )));
        }
    }

    Ok(RebuildOutcome {
        kept,
        removed: total - kept,
    })
}
