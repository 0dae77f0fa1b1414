//! Optional metrics instrumentation.
//!
//! When the `observe` feature is enabled, key operations emit counters and
//! histograms via the [`metrics`] crate. A downstream application must install
//! a recorder (e.g. `metrics-exporter-prometheus`) to collect the data.
//!
//! Without the feature every function here is a zero-cost no-op.

/// Record a buffered-writer flush.
///
/// - `medledger.writer.flushes_total` – counter with `section` label
/// - `medledger.writer.records_flushed_total` – counter
/// - `medledger.writer.flush_duration_seconds` – histogram
#[inline]
pub fn record_flush(section: &'static str, records: usize, duration: std::time::Duration) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("medledger.writer.flushes_total", "section" => section).increment(1);
        metrics::counter!("medledger.writer.records_flushed_total", "section" => section)
            .increment(records as u64);
        metrics::histogram!("medledger.writer.flush_duration_seconds")
            .record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (section, records, duration);
    }
}

/// Record an attempted append-only violation.
///
/// - `medledger.guard.violations_total` – counter
#[inline]
pub fn record_violation() {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("medledger.guard.violations_total").increment(1);
    }
}

/// Record an audit append.
///
/// - `medledger.audit.appends_total` – counter with `outcome` label
#[inline]
pub fn record_audit_append(success: bool) {
    #[cfg(feature = "observe")]
    {
        let outcome = if success { "ok" } else { "fail" };
        metrics::counter!("medledger.audit.appends_total", "outcome" => outcome).increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = success;
    }
}

/// Record creation of a daily manifest.
///
/// - `medledger.manifest.created_total` – counter
/// - `medledger.manifest.events_total` – counter of events folded
#[inline]
pub fn record_manifest_created(event_count: u64) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("medledger.manifest.created_total").increment(1);
        metrics::counter!("medledger.manifest.events_total").increment(event_count);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = event_count;
    }
}

/// Record a chain verification run.
///
/// - `medledger.manifest.verifications_total` – counter with `outcome` label
/// - `medledger.manifest.verification_duration_seconds` – histogram
#[inline]
pub fn record_chain_verification(duration: std::time::Duration, valid: bool) {
    #[cfg(feature = "observe")]
    {
        let outcome = if valid { "valid" } else { "invalid" };
        metrics::counter!("medledger.manifest.verifications_total", "outcome" => outcome)
            .increment(1);
        metrics::histogram!("medledger.manifest.verification_duration_seconds")
            .record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (duration, valid);
    }
}

/// Record a log rotation.
///
/// - `medledger.logs.rotations_total` – counter with `channel` label
#[inline]
pub fn record_rotation(channel: &'static str) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("medledger.logs.rotations_total", "channel" => channel).increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = channel;
    }
}
