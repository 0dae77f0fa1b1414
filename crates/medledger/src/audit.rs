//! Audit log subsystem.
//!
//! One row per sensitive operation. Request and result bodies are never
//! stored, only their content hashes (see [`medledger_core::hash_payload`]).

use chrono::{DateTime, NaiveDate, Utc};
use medledger_core::types::schema::AUDIT;
use medledger_core::{
    observe, AuditEvent, AuditStatus, Payload, Record, Result, Row, SectionSpec,
};
use medledger_sqlite::{Direction, RecordContainer};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Appends and queries audit events of one container
#[derive(Clone)]
pub struct AuditLog {
    container: Arc<RecordContainer>,
    section_ready: Arc<AtomicBool>,
}

impl AuditLog {
    pub fn new(container: Arc<RecordContainer>) -> Self {
        Self {
            container,
            section_ready: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn container(&self) -> &Arc<RecordContainer> {
        &self.container
    }

    fn ensure_section(&self) -> Result<()> {
        if !self.section_ready.load(Ordering::Acquire) {
            self.container.ensure_section(&SectionSpec::audit())?;
            self.section_ready.store(true, Ordering::Release);
        }
        Ok(())
    }

    pub(crate) fn has_section(&self) -> Result<bool> {
        match self.container.section_spec(AUDIT) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Hash the payloads, build the event and append it. Returns the event id.
    #[allow(clippy::too_many_arguments)]
    pub fn append_audit_log(
        &self,
        operation: &str,
        actor_id: &str,
        resource_path: &str,
        payload: &Payload,
        result: &Payload,
        status: AuditStatus,
        metadata: Option<Value>,
    ) -> Result<String> {
        let mut event = AuditEvent::new(operation, actor_id, resource_path, payload, result, status);
        if let Some(metadata) = metadata {
            event = event.with_metadata(metadata);
        }
        self.append_event(event)
    }

    /// Append a prepared event through the append-only guard.
    pub fn append_event(&self, event: AuditEvent) -> Result<String> {
        self.ensure_section()?;

        let appended = (|| {
            let mut guard = self.container.begin_append()?;
            guard.append_rows(AUDIT, &[event.to_columns()])?;
            guard.commit()
        })();
        observe::record_audit_append(appended.is_ok());
        appended?;

        tracing::info!(
            target: "medledger::access",
            event_id = %event.event_id,
            operation = %event.operation,
            actor_id = %event.actor_id,
            resource = %event.resource_path,
            status = %event.status,
            "Audit event recorded"
        );
        Ok(event.event_id)
    }

    /// Collaborator entry point: audit failures are logged, never propagated,
    /// so they cannot fail the operation being audited.
    #[allow(clippy::too_many_arguments)]
    pub fn record_best_effort(
        &self,
        operation: &str,
        actor_id: &str,
        resource_path: &str,
        payload: &Payload,
        result: &Payload,
        status: AuditStatus,
        metadata: Option<Value>,
    ) -> Option<String> {
        match self.append_audit_log(
            operation,
            actor_id,
            resource_path,
            payload,
            result,
            status,
            metadata,
        ) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(
                    target: "medledger::access",
                    operation,
                    actor_id,
                    "Failed to record audit event: {}",
                    e
                );
                None
            }
        }
    }

    /// Newest first, filtered, at most `limit` events.
    ///
    /// A container without an audit section yields an empty list.
    pub fn get_audit_logs(
        &self,
        limit: usize,
        operation: Option<&str>,
        actor_id: Option<&str>,
    ) -> Result<Vec<AuditEvent>> {
        let mut events = Vec::new();
        if limit == 0 || !self.has_section()? {
            return Ok(events);
        }
        self.container.scan(AUDIT, Direction::Backward, |row| {
            let event = AuditEvent::from_row(&row)?;
            let matches = operation.map_or(true, |op| event.operation == op)
                && actor_id.map_or(true, |actor| event.actor_id == actor);
            if matches {
                events.push(event);
            }
            Ok(events.len() < limit)
        })?;
        Ok(events)
    }

    /// Events with `start <= timestamp < end`, oldest first
    pub fn export(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<AuditEvent>> {
        let mut events = Vec::new();
        self.for_each(|_, event| {
            if event.timestamp >= start && event.timestamp < end {
                events.push(event);
            }
            Ok(())
        })?;
        Ok(events)
    }

    /// Events of one UTC day in stored order
    pub fn events_on(&self, date: NaiveDate) -> Result<Vec<AuditEvent>> {
        let mut events = Vec::new();
        self.for_each(|_, event| {
            if event.timestamp.date_naive() == date {
                events.push(event);
            }
            Ok(())
        })?;
        Ok(events)
    }

    /// Visit every event oldest first together with its index.
    pub(crate) fn for_each<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(u64, AuditEvent) -> Result<()>,
    {
        if !self.has_section()? {
            return Ok(());
        }
        self.container.scan(AUDIT, Direction::Forward, |row| {
            let index = row.index;
            visit(index, AuditEvent::from_row(&row)?)?;
            Ok(true)
        })
    }

    /// Visit every stored row oldest first without decoding it.
    pub(crate) fn for_each_row<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(Row),
    {
        if !self.has_section()? {
            return Ok(());
        }
        self.container.scan(AUDIT, Direction::Forward, |row| {
            visit(row);
            Ok(true)
        })
    }

    pub fn count(&self) -> Result<u64> {
        if !self.has_section()? {
            return Ok(0);
        }
        self.container.section_len(AUDIT)
    }
}
