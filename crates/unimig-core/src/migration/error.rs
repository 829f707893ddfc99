//! Migration-specific error types.

use thiserror::Error;

use super::plan::PhaseKind;
use crate::connector::ConnectorError;
use crate::store::key::MigrationId;

/// Errors raised while planning, executing, or rolling back a migration.
///
/// `Connectivity`, `TargetSchemaMissing` and `DependencyUnmet` are raised
/// before any data is written. Data-quality and classification problems are
/// never errors; they surface as validation findings.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Source or target cannot be reached.
    #[error("cannot reach {endpoint}: {reason}")]
    Connectivity {
        /// The unreachable endpoint.
        endpoint: String,
        /// Underlying reason.
        reason: String,
    },

    /// Required EAV tables are absent from the target.
    #[error("target schema missing tables: {}", .missing.join(", "))]
    TargetSchemaMissing {
        /// Names of the missing tables.
        missing: Vec<String>,
    },

    /// A phase's prerequisite did not complete.
    #[error("phase {phase} depends on {dependency}, which has not completed")]
    DependencyUnmet {
        /// The phase that cannot start.
        phase: PhaseKind,
        /// The unmet prerequisite.
        dependency: PhaseKind,
    },

    /// A batch kept failing after all retries.
    #[error("batch {batch_no} of {table} failed after {attempts} attempts: {reason}")]
    BatchFailed {
        /// Source table.
        table: String,
        /// 1-based batch number.
        batch_no: u64,
        /// Attempts made.
        attempts: u32,
        /// Last error.
        reason: String,
    },

    /// Post-migration checks did not pass.
    #[error("validation failed: {message}")]
    ValidationFailed {
        /// Description of the mismatch.
        message: String,
    },

    /// The emergency rollback window has passed.
    #[error("rollback window expired for {migration_id}: {elapsed_secs}s elapsed, window {window_secs}s")]
    RollbackWindowExpired {
        /// Migration being rolled back.
        migration_id: MigrationId,
        /// Seconds since the migration started.
        elapsed_secs: u64,
        /// Configured window.
        window_secs: u64,
    },

    /// No log exists for the migration.
    #[error("migration not found: {migration_id}")]
    MigrationNotFound {
        /// The missing migration.
        migration_id: MigrationId,
    },

    /// The plan is internally inconsistent.
    #[error("invalid plan: {message}")]
    InvalidPlan {
        /// Description of the inconsistency.
        message: String,
    },

    /// Persisted state could not be interpreted.
    #[error("migration state corrupted: {message}")]
    StateCorrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Connector failure outside the batch retry loop.
    #[error("connector error: {0}")]
    Connector(#[from] ConnectorError),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Script output failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),
}

impl MigrationError {
    /// Whether the error aborts before any data is written.
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            MigrationError::Connectivity { .. }
                | MigrationError::TargetSchemaMissing { .. }
                | MigrationError::DependencyUnmet { .. }
                | MigrationError::InvalidPlan { .. }
        )
    }

    pub(crate) fn from_connector(err: ConnectorError) -> Self {
        match err {
            ConnectorError::Unreachable { endpoint, reason } => {
                MigrationError::Connectivity { endpoint, reason }
            }
            other => MigrationError::Connector(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MigrationError::BatchFailed {
            table: "OCRD".to_string(),
            batch_no: 1201,
            attempts: 3,
            reason: "timeout".to_string(),
        };
        assert!(err.to_string().contains("batch 1201 of OCRD"));

        let err = MigrationError::TargetSchemaMissing {
            missing: vec!["universal_entities".to_string(), "entity_properties".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "target schema missing tables: universal_entities, entity_properties"
        );
        assert!(err.is_preflight());
    }

    #[test]
    fn test_unreachable_maps_to_connectivity() {
        let err = MigrationError::from_connector(ConnectorError::Unreachable {
            endpoint: "erp".to_string(),
            reason: "refused".to_string(),
        });
        assert!(matches!(err, MigrationError::Connectivity { .. }));
        let err = MigrationError::from_connector(ConnectorError::Read("x".to_string()));
        assert!(matches!(err, MigrationError::Connector(_)));
    }
}
