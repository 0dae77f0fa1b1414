//! Scoped append-only policy guard.
//!
//! A guard opens an immediate transaction, records the length of every
//! catalogued column (`original_sizes`) and only lets writes land at or after
//! those lengths. [`AppendOnlyGuard::commit`] re-reads every length and refuses
//! to commit if any column shrank or a section's columns drifted apart.
//! Dropping a guard without committing rolls the transaction back.

use crate::schema::{self, column_len, quote, table_name};
use crate::sql_err;
use medledger_core::{observe, ColumnValue, LedgerError, Result, SectionSpec};
use parking_lot::MutexGuard;
use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use std::ops::Range;

pub struct AppendOnlyGuard<'a> {
    conn: MutexGuard<'a, Connection>,
    catalog: BTreeMap<String, SectionSpec>,
    original_sizes: BTreeMap<(String, String), u64>,
    in_txn: bool,
}

impl<'a> AppendOnlyGuard<'a> {
    pub(crate) fn begin(conn: MutexGuard<'a, Connection>) -> Result<Self> {
        conn.execute_batch("BEGIN IMMEDIATE").map_err(sql_err)?;

        let mut guard = Self {
            conn,
            catalog: BTreeMap::new(),
            original_sizes: BTreeMap::new(),
            in_txn: true,
        };
        // Any error below drops the guard, which rolls back.
        guard.catalog = schema::load_catalog(&guard.conn)?;
        guard.original_sizes = guard.snapshot()?;
        Ok(guard)
    }

    fn snapshot(&self) -> Result<BTreeMap<(String, String), u64>> {
        let mut sizes = BTreeMap::new();
        for spec in self.catalog.values() {
            for column in &spec.columns {
                let len = column_len(&self.conn, &spec.name, &column.name)?;
                sizes.insert((spec.name.clone(), column.name.clone()), len);
            }
        }
        Ok(sizes)
    }

    fn section(&self, section: &str) -> Result<&SectionSpec> {
        self.catalog
            .get(section)
            .ok_or_else(|| LedgerError::NotFound(format!("section '{}'", section)))
    }

    /// Length of a column when the scope was entered
    pub fn original_size(&self, section: &str, column: &str) -> Result<u64> {
        self.original_sizes
            .get(&(section.to_string(), column.to_string()))
            .copied()
            .ok_or_else(|| LedgerError::NotFound(format!("column '{}.{}'", section, column)))
    }

    /// Length of a column right now, including writes made in this scope
    pub fn current_size(&self, section: &str, column: &str) -> Result<u64> {
        self.original_size(section, column)?;
        column_len(&self.conn, section, column)
    }

    /// Reject writes that target a row that existed when the scope began.
    pub fn validate_write_index(&self, section: &str, column: &str, index: u64) -> Result<bool> {
        let original = self.original_size(section, column)?;
        if index < original {
            observe::record_violation();
            return Err(LedgerError::AppendOnlyViolation(format!(
                "write to {}.{}[{}] would overwrite committed data (length {})",
                section, column, index, original
            )));
        }
        Ok(true)
    }

    /// Reject any resize below the current length.
    pub fn validate_resize(&self, section: &str, column: &str, new_size: u64) -> Result<bool> {
        let current = self.current_size(section, column)?;
        if new_size < current {
            observe::record_violation();
            return Err(LedgerError::AppendOnlyViolation(format!(
                "resize of {}.{} from {} to {} would discard data",
                section, column, current, new_size
            )));
        }
        Ok(true)
    }

    /// Append values to the end of one column. Returns the first new index.
    pub fn append_column(
        &mut self,
        section: &str,
        column: &str,
        values: &[ColumnValue],
    ) -> Result<u64> {
        let kind = self
            .section(section)?
            .column(column)
            .ok_or_else(|| LedgerError::NotFound(format!("column '{}.{}'", section, column)))?
            .kind;
        for value in values {
            value.check_kind(&kind)?;
        }

        let start = self.current_size(section, column)?;
        self.validate_resize(section, column, start + values.len() as u64)?;

        let sql = format!(
            "INSERT INTO {} (idx, value) VALUES (?1, ?2)",
            quote(&table_name(section, column))
        );
        let mut stmt = self.conn.prepare_cached(&sql).map_err(sql_err)?;
        for (offset, value) in values.iter().enumerate() {
            let index = start + offset as u64;
            self.validate_write_index(section, column, index)?;
            stmt.execute(params![index as i64, schema::to_sql(value)])
                .map_err(sql_err)?;
        }
        Ok(start)
    }

    /// Append whole records, column by column.
    ///
    /// Every row must name exactly the section's columns.
    pub fn append_rows(
        &mut self,
        section: &str,
        rows: &[Vec<(&'static str, ColumnValue)>],
    ) -> Result<Range<u64>> {
        let spec = self.section(section)?.clone();
        for row in rows {
            if row.len() != spec.columns.len() {
                return Err(LedgerError::SchemaInvalid(format!(
                    "record has {} columns, section '{}' has {}",
                    row.len(),
                    section,
                    spec.columns.len()
                )));
            }
        }

        let mut first = None;
        for column in &spec.columns {
            let values = rows
                .iter()
                .map(|row| {
                    row.iter()
                        .find(|(name, _)| *name == column.name)
                        .map(|(_, value)| value.clone())
                        .ok_or_else(|| {
                            LedgerError::SchemaInvalid(format!(
                                "record is missing column '{}.{}'",
                                section, column.name
                            ))
                        })
                })
                .collect::<Result<Vec<_>>>()?;
            let start = self.append_column(section, &column.name, &values)?;
            match first {
                None => first = Some(start),
                Some(expected) if expected != start => {
                    return Err(LedgerError::SchemaInvalid(format!(
                        "columns of '{}' have unequal lengths ({} vs {})",
                        section, expected, start
                    )));
                }
                Some(_) => {}
            }
        }

        let start = first.unwrap_or(0);
        Ok(start..start + rows.len() as u64)
    }

    /// Check growth-only and equal section lengths, then commit.
    pub fn commit(mut self) -> Result<()> {
        if let Err(e) = self.verify_growth() {
            self.rollback();
            return Err(e);
        }
        self.conn.execute_batch("COMMIT").map_err(sql_err)?;
        self.in_txn = false;
        Ok(())
    }

    /// Discard everything written in this scope.
    pub fn abort(mut self) {
        self.rollback();
    }

    fn rollback(&mut self) {
        if self.in_txn {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                tracing::warn!(
                    target: "medledger::storage",
                    error = %e,
                    "Rollback of append scope failed"
                );
            }
            self.in_txn = false;
        }
    }

    fn verify_growth(&self) -> Result<()> {
        let current = self.snapshot()?;
        for (key, original) in &self.original_sizes {
            let now = current.get(key).copied().unwrap_or(0);
            if now < *original {
                observe::record_violation();
                return Err(LedgerError::AppendOnlyViolation(format!(
                    "{}.{} shrank from {} to {}",
                    key.0, key.1, original, now
                )));
            }
        }

        for spec in self.catalog.values() {
            let lengths: Vec<u64> = spec
                .columns
                .iter()
                .filter_map(|c| current.get(&(spec.name.clone(), c.name.clone())).copied())
                .collect();
            if lengths.windows(2).any(|w| w[0] != w[1]) {
                return Err(LedgerError::SchemaInvalid(format!(
                    "columns of '{}' have unequal lengths {:?}",
                    spec.name, lengths
                )));
            }
        }
        Ok(())
    }
}

impl<'a> Drop for AppendOnlyGuard<'a> {
    fn drop(&mut self) {
        if self.in_txn {
            tracing::debug!(target: "medledger::storage", "append scope dropped without commit, rolling back");
            self.rollback();
        }
    }
}
