//! Container ownership.
//!
//! Each container carries exactly one identity row. The owner identifier is
//! never stored; ownership is proven by recomputing its salted hash.

use medledger_core::types::schema::IDENTITY;
use medledger_core::{IdentityRecord, LedgerError, Record, Result};
use medledger_sqlite::{Direction, RecordContainer};

/// Write the identity row of a container that has none.
pub fn add(container: &RecordContainer, owner_identifier: &str) -> Result<IdentityRecord> {
    if container.section_len(IDENTITY)? > 0 {
        return Err(LedgerError::AlreadyExists(format!(
            "identity of {}",
            container.path().display()
        )));
    }

    let identity = IdentityRecord::generate(owner_identifier);
    let mut guard = container.begin_append()?;
    guard.append_rows(IDENTITY, &[identity.to_columns()])?;
    guard.commit()?;

    tracing::info!(
        target: "medledger::access",
        user_uuid = %identity.user_uuid,
        "Identity added"
    );
    Ok(identity)
}

/// The container's identity, if it has one
pub fn show(container: &RecordContainer) -> Result<Option<IdentityRecord>> {
    let mut records: Vec<IdentityRecord> = container.read_records(Direction::Forward, Some(1))?;
    Ok(records.pop())
}

/// Whether `owner_identifier` owns the container.
pub fn verify(container: &RecordContainer, owner_identifier: &str) -> Result<bool> {
    let identity = show(container)?
        .ok_or_else(|| LedgerError::NotFound(format!("identity of {}", container.path().display())))?;
    let verified = identity.verify_owner(owner_identifier);
    tracing::info!(
        target: "medledger::access",
        user_uuid = %identity.user_uuid,
        verified,
        "Identity verification"
    );
    Ok(verified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use medledger_core::ContainerConfig;
    use tempfile::TempDir;

    fn setup() -> (RecordContainer, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = ContainerConfig::new(temp_dir.path().join("ledger.db")).with_embedding_dim(2);
        (RecordContainer::initialize(config, "owner@clinic", false).unwrap(), temp_dir)
    }

    #[test]
    fn test_identity_written_once() {
        let (container, _temp) = setup();
        let err = add(&container, "someone").unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyExists(_)));
        assert_eq!(container.section_len(IDENTITY).unwrap(), 1);
    }

    #[test]
    fn test_verify_owner() {
        let (container, _temp) = setup();
        assert!(verify(&container, "owner@clinic").unwrap());
        assert!(!verify(&container, "intruder").unwrap());

        let identity = show(&container).unwrap().unwrap();
        assert_eq!(identity.user_uuid.len(), 36);
        assert!(!identity.owner_hash.contains("owner"));
    }
}
