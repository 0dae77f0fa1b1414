use crate::guard::AppendOnlyGuard;
use crate::schema::{self, quote, table_name, SCHEMA_VERSION};
use crate::sql_err;
use medledger_core::types::schema::IDENTITY;
use medledger_core::types::time::{format_timestamp, now};
use medledger_core::{
    ColumnKind, ContainerConfig, IdentityRecord, LedgerError, Record, Result, Row, SectionSpec,
};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, OpenFlags, ToSql};
use std::path::{Path, PathBuf};

/// Scan order over a section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Oldest first
    Forward,
    /// Newest first
    Backward,
}

/// Read-only readiness report. Never an error: problems are listed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerStats {
    /// Record count per section
    pub sections: Vec<(String, u64)>,
    pub file_size: u64,
    pub created_at: Option<String>,
    pub schema_version: Option<u32>,
}

impl ContainerStats {
    pub fn count(&self, section: &str) -> u64 {
        self.sections
            .iter()
            .find(|(name, _)| name == section)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }
}

/// The hierarchical append-only record container.
///
/// Owns the only write connection to its file. Sections are created empty at
/// initialization and only grow afterwards; every write goes through an
/// [`AppendOnlyGuard`].
pub struct RecordContainer {
    conn: Mutex<Connection>,
    config: ContainerConfig,
}

impl RecordContainer {
    /// Create a new container with every required section and its identity row.
    ///
    /// Fails with `AlreadyExists` when the file is present, unless `force` is
    /// set, in which case the existing file is moved aside to a timestamped
    /// `.bak` sibling rather than removed.
    pub fn initialize(config: ContainerConfig, owner_identifier: &str, force: bool) -> Result<Self> {
        if config.path.exists() {
            if !force {
                return Err(LedgerError::AlreadyExists(format!(
                    "container {}",
                    config.path.display()
                )));
            }
            let backup = Self::move_aside(&config.path)?;
            tracing::warn!(
                target: "medledger::storage",
                "Re-initializing container, previous file kept at {}",
                backup.display()
            );
        }

        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            &config.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
        .map_err(sql_err)?;
        Self::configure_connection(&conn, &config)?;

        conn.execute_batch("BEGIN IMMEDIATE").map_err(sql_err)?;
        let created = Self::create_layout(&conn, &config);
        match created {
            Ok(()) => conn.execute_batch("COMMIT").map_err(sql_err)?,
            Err(e) => {
                if let Err(rollback) = conn.execute_batch("ROLLBACK") {
                    tracing::warn!(
                        target: "medledger::storage",
                        error = %rollback,
                        "Rollback of container layout failed"
                    );
                }
                return Err(e);
            }
        }

        let container = Self {
            conn: Mutex::new(conn),
            config,
        };

        let identity = IdentityRecord::generate(owner_identifier);
        let mut guard = container.begin_append()?;
        guard.append_rows(IDENTITY, &[identity.to_columns()])?;
        guard.commit()?;

        tracing::info!(
            target: "medledger::storage",
            "Initialized container {} (identity {})",
            container.config.path.display(),
            identity.user_uuid
        );
        Ok(container)
    }

    /// Open an existing container.
    ///
    /// Sections added to the schema after the file was created (such as the
    /// audit section) are created empty on open.
    pub fn open(config: ContainerConfig) -> Result<Self> {
        if !config.path.exists() {
            return Err(LedgerError::NotFound(format!(
                "container {}",
                config.path.display()
            )));
        }

        let conn = Connection::open_with_flags(&config.path, OpenFlags::SQLITE_OPEN_READ_WRITE)
            .map_err(sql_err)?;
        Self::configure_connection(&conn, &config)?;

        if !schema::table_exists(&conn, "_columns")? {
            return Err(LedgerError::SchemaInvalid(format!(
                "{} is not a medledger container",
                config.path.display()
            )));
        }

        let container = Self {
            conn: Mutex::new(conn),
            config,
        };
        for spec in SectionSpec::required(container.config.embedding_dim) {
            container.ensure_section(&spec)?;
        }
        Ok(container)
    }

    fn create_layout(conn: &Connection, config: &ContainerConfig) -> Result<()> {
        schema::init_catalog(conn)?;
        schema::set_meta(conn, "schema_version", &SCHEMA_VERSION.to_string())?;
        schema::set_meta(conn, "created_at", &format_timestamp(&now()))?;
        schema::set_meta(conn, "embedding_dim", &config.embedding_dim.to_string())?;
        for spec in SectionSpec::required(config.embedding_dim) {
            schema::create_section(conn, &spec)?;
        }
        Ok(())
    }

    fn configure_connection(conn: &Connection, cfg: &ContainerConfig) -> Result<()> {
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| LedgerError::Config(e.to_string()))?;
        conn.pragma_update(None, "synchronous", cfg.synchronous.as_pragma())
            .map_err(|e| LedgerError::Config(e.to_string()))?;
        Ok(())
    }

    fn move_aside(path: &Path) -> Result<PathBuf> {
        // Fold any WAL content into the main file before it moves.
        if let Ok(conn) = Connection::open(path) {
            let _ = conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE)");
        }

        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.6f");
        let backup = PathBuf::from(format!("{}.{}.bak", path.display(), stamp));
        std::fs::rename(path, &backup)?;
        for suffix in ["-wal", "-shm"] {
            let sidecar = PathBuf::from(format!("{}{}", path.display(), suffix));
            if sidecar.exists() {
                std::fs::rename(&sidecar, format!("{}{}", backup.display(), suffix))?;
            }
        }
        Ok(backup)
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    /// Enter an append-only write scope.
    pub fn begin_append(&self) -> Result<AppendOnlyGuard<'_>> {
        AppendOnlyGuard::begin(self.conn.lock())
    }

    /// Create a section if it does not exist yet. Idempotent.
    pub fn ensure_section(&self, spec: &SectionSpec) -> Result<()> {
        let conn = self.conn.lock();
        schema::create_section(&conn, spec)
    }

    pub fn section_spec(&self, section: &str) -> Result<SectionSpec> {
        let conn = self.conn.lock();
        schema::load_catalog(&conn)?
            .remove(section)
            .ok_or_else(|| LedgerError::NotFound(format!("section '{}'", section)))
    }

    /// Number of records in a section (length of its first column)
    pub fn section_len(&self, section: &str) -> Result<u64> {
        let spec = self.section_spec(section)?;
        let conn = self.conn.lock();
        schema::column_len(&conn, section, &spec.columns[0].name)
    }

    pub fn column_len(&self, section: &str, column: &str) -> Result<u64> {
        let spec = self.section_spec(section)?;
        if spec.column(column).is_none() {
            return Err(LedgerError::NotFound(format!("column '{}.{}'", section, column)));
        }
        let conn = self.conn.lock();
        schema::column_len(&conn, section, column)
    }

    /// Visit the rows of a section in order until `visit` returns `false`.
    ///
    /// The connection stays locked while visiting: `visit` must not call back
    /// into the container.
    pub fn scan<F>(&self, section: &str, direction: Direction, visit: F) -> Result<()>
    where
        F: FnMut(Row) -> Result<bool>,
    {
        let spec = self.section_spec(section)?;
        let conn = self.conn.lock();
        query_rows(&conn, &spec, None, direction, visit)
    }

    pub fn read_row(&self, section: &str, index: u64) -> Result<Row> {
        let spec = self.section_spec(section)?;
        let conn = self.conn.lock();
        let mut found = None;
        query_rows(&conn, &spec, Some(index), Direction::Forward, |row| {
            found = Some(row);
            Ok(false)
        })?;
        found.ok_or_else(|| LedgerError::NotFound(format!("{}[{}]", section, index)))
    }

    /// Decode up to `limit` records of a section in the given order.
    pub fn read_records<R: Record>(&self, direction: Direction, limit: Option<usize>) -> Result<Vec<R>> {
        let mut out = Vec::new();
        if limit == Some(0) {
            return Ok(out);
        }
        self.scan(R::section(), direction, |row| {
            out.push(R::from_row(&row)?);
            Ok(limit.map_or(true, |l| out.len() < l))
        })?;
        Ok(out)
    }

    /// Whether a text column holds `value` at any index
    pub fn contains_text(&self, section: &str, column: &str, value: &str) -> Result<bool> {
        let spec = self.section_spec(section)?;
        match spec.column(column).map(|c| c.kind) {
            Some(ColumnKind::Text) => {}
            Some(_) => {
                return Err(LedgerError::SchemaInvalid(format!(
                    "{}.{} is not a text column",
                    section, column
                )))
            }
            None => return Err(LedgerError::NotFound(format!("column '{}.{}'", section, column))),
        }
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(
                &format!(
                    "SELECT COUNT(*) FROM {} WHERE value = ?1",
                    quote(&table_name(section, column))
                ),
                [value],
                |row| row.get(0),
            )
            .map_err(sql_err)?;
        Ok(count > 0)
    }

    pub fn stats(&self) -> Result<ContainerStats> {
        let conn = self.conn.lock();
        let catalog = schema::load_catalog(&conn)?;
        let mut sections = Vec::new();
        for spec in catalog.values() {
            let len = schema::column_len(&conn, &spec.name, &spec.columns[0].name)?;
            sections.push((spec.name.clone(), len));
        }
        let created_at = schema::get_meta(&conn, "created_at")?;
        let schema_version = schema::get_meta(&conn, "schema_version")?.and_then(|v| v.parse().ok());
        drop(conn);

        Ok(ContainerStats {
            sections,
            file_size: std::fs::metadata(&self.config.path)?.len(),
            created_at,
            schema_version,
        })
    }

    /// Check the on-disk shape of a container without opening it for writing.
    ///
    /// Used as a readiness probe: problems are reported, never raised.
    pub fn validate(path: &Path, embedding_dim: usize) -> ValidationReport {
        let mut report = ValidationReport::default();
        if let Err(e) = validate_into(path, embedding_dim, &mut report) {
            report.errors.push(e.to_string());
        }
        report.valid = report.errors.is_empty();
        report
    }

    /// Confirm the container can be opened read-only and read end to end.
    ///
    /// Returns `false` on a missing file or any corruption; never errors.
    pub fn verify_integrity(path: &Path) -> bool {
        match check_integrity(path) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    target: "medledger::storage",
                    "Integrity check failed for {}: {}",
                    path.display(),
                    e
                );
                false
            }
        }
    }
}

fn open_read_only(path: &Path) -> Result<Connection> {
    if !path.exists() {
        return Err(LedgerError::NotFound(format!("container {}", path.display())));
    }
    Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY).map_err(sql_err)
}

fn validate_into(path: &Path, embedding_dim: usize, report: &mut ValidationReport) -> Result<()> {
    let conn = open_read_only(path)?;
    if !schema::table_exists(&conn, "_columns")? {
        report.errors.push("missing section catalog".to_string());
        return Ok(());
    }
    let catalog = schema::load_catalog(&conn)?;

    for expected in SectionSpec::required(embedding_dim) {
        let Some(actual) = catalog.get(&expected.name) else {
            report.errors.push(format!("missing section '{}'", expected.name));
            continue;
        };

        let mut lengths = Vec::new();
        for column in &expected.columns {
            let Some(found) = actual.column(&column.name) else {
                report
                    .errors
                    .push(format!("missing column '{}.{}'", expected.name, column.name));
                continue;
            };
            match (column.kind, found.kind) {
                (ColumnKind::Vector { width: want }, ColumnKind::Vector { width: got })
                    if want != got =>
                {
                    report.errors.push(format!(
                        "column '{}.{}' has width {}, expected {}",
                        expected.name, column.name, got, want
                    ));
                }
                (want, got) if want.tag() != got.tag() => {
                    report.errors.push(format!(
                        "column '{}.{}' is {}, expected {}",
                        expected.name, column.name, got, want
                    ));
                }
                _ => {}
            }

            let table = table_name(&expected.name, &column.name);
            if !schema::table_exists(&conn, &table)? {
                report
                    .errors
                    .push(format!("column table '{}' is missing", table));
                continue;
            }
            lengths.push(schema::table_len(&conn, &table)?);
        }

        if lengths.windows(2).any(|w| w[0] != w[1]) {
            report.errors.push(format!(
                "columns of '{}' have unequal lengths {:?}",
                expected.name, lengths
            ));
        }
        if expected.name == IDENTITY {
            match lengths.first().copied() {
                Some(0) => report.warnings.push("no identity record".to_string()),
                Some(n) if n > 1 => report
                    .errors
                    .push(format!("{} identity records, expected exactly one", n)),
                _ => {}
            }
        }
    }
    Ok(())
}

fn check_integrity(path: &Path) -> Result<()> {
    let conn = open_read_only(path)?;
    let status: String = conn
        .query_row("PRAGMA quick_check", [], |row| row.get(0))
        .map_err(sql_err)?;
    if status != "ok" {
        return Err(LedgerError::SchemaInvalid(format!("quick_check: {}", status)));
    }
    for spec in schema::load_catalog(&conn)?.values() {
        query_rows(&conn, spec, None, Direction::Forward, |_| Ok(true))?;
    }
    Ok(())
}

/// Join every column table of a section on `idx` and decode each row.
pub(crate) fn query_rows<F>(
    conn: &Connection,
    spec: &SectionSpec,
    index: Option<u64>,
    direction: Direction,
    mut visit: F,
) -> Result<()>
where
    F: FnMut(Row) -> Result<bool>,
{
    let mut select = vec!["c0.idx".to_string()];
    let mut from = String::new();
    for (i, column) in spec.columns.iter().enumerate() {
        select.push(format!("c{}.value", i));
        let table = quote(&table_name(&spec.name, &column.name));
        if i == 0 {
            from.push_str(&format!("{} AS c0", table));
        } else {
            from.push_str(&format!(" JOIN {} AS c{i} ON c{i}.idx = c0.idx", table, i = i));
        }
    }
    let filter = if index.is_some() { " WHERE c0.idx = ?1" } else { "" };
    let order = match direction {
        Direction::Forward => "ASC",
        Direction::Backward => "DESC",
    };
    let sql = format!(
        "SELECT {} FROM {}{} ORDER BY c0.idx {}",
        select.join(", "),
        from,
        filter,
        order
    );

    let mut stmt = conn.prepare(&sql).map_err(sql_err)?;
    let index_param = index.map(|i| i as i64);
    let params: Vec<&dyn ToSql> = match &index_param {
        Some(i) => vec![i as &dyn ToSql],
        None => vec![],
    };
    let mut rows = stmt.query(params.as_slice()).map_err(sql_err)?;
    while let Some(r) = rows.next().map_err(sql_err)? {
        let idx: i64 = r.get(0).map_err(sql_err)?;
        let mut row = Row::new(idx as u64);
        for (i, column) in spec.columns.iter().enumerate() {
            let value = schema::from_sql(&column.kind, r.get_ref(i + 1).map_err(sql_err)?)?;
            row.insert(column.name.clone(), value);
        }
        if !visit(row)? {
            break;
        }
    }
    Ok(())
}
