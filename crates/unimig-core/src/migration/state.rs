//! Persisted migration log.
//!
//! The log is the only durable artifact the engine needs between runs. It
//! holds one [`MigrationState`] per migration plus append-only table and
//! batch records keyed by (migration, phase, table[, batch]), so workers on
//! different tables never write the same key.

use rkyv::{Archive, Deserialize, Serialize};
use std::fmt;

use super::error::MigrationError;
use super::plan::PhaseKind;
use crate::connector::BatchCursor;
use crate::store::key::{current_timestamp, MigrationId};

/// Overall state of a migration.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    /// Created but not started.
    Pending,
    /// Phases in progress.
    Running,
    /// All phases and post-validation passed.
    Complete,
    /// Data moved but post-validation found mismatches.
    ValidationFailed,
    /// A phase failed.
    Failed,
    /// Stopped by a cancellation signal; resumable.
    Cancelled,
    /// Rolled back.
    RolledBack,
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationStatus::Pending => write!(f, "pending"),
            MigrationStatus::Running => write!(f, "running"),
            MigrationStatus::Complete => write!(f, "complete"),
            MigrationStatus::ValidationFailed => write!(f, "validation_failed"),
            MigrationStatus::Failed => write!(f, "failed"),
            MigrationStatus::Cancelled => write!(f, "cancelled"),
            MigrationStatus::RolledBack => write!(f, "rolled_back"),
        }
    }
}

/// Status of a phase or table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    Running,
    Complete,
    Failed,
    Cancelled,
    Skipped,
    RolledBack,
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseStatus::Pending => write!(f, "pending"),
            PhaseStatus::Running => write!(f, "running"),
            PhaseStatus::Complete => write!(f, "complete"),
            PhaseStatus::Failed => write!(f, "failed"),
            PhaseStatus::Cancelled => write!(f, "cancelled"),
            PhaseStatus::Skipped => write!(f, "skipped"),
            PhaseStatus::RolledBack => write!(f, "rolled_back"),
        }
    }
}

/// Progress of one phase.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct PhaseProgress {
    pub phase: PhaseKind,
    pub status: PhaseStatus,
    /// Microseconds since epoch.
    pub started_at: Option<u64>,
    pub completed_at: Option<u64>,
    pub rows_processed: u64,
    pub batches_committed: u64,
    pub error: Option<String>,
}

impl PhaseProgress {
    pub fn new(phase: PhaseKind) -> Self {
        Self {
            phase,
            status: PhaseStatus::Pending,
            started_at: None,
            completed_at: None,
            rows_processed: 0,
            batches_committed: 0,
            error: None,
        }
    }

    pub fn start(&mut self) {
        self.status = PhaseStatus::Running;
        self.started_at = Some(current_timestamp());
        self.completed_at = None;
        self.error = None;
    }

    pub fn finish(&mut self, status: PhaseStatus) {
        self.status = status;
        self.completed_at = Some(current_timestamp());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.finish(PhaseStatus::Failed);
        self.error = Some(error.into());
    }
}

/// Persistent state of one migration.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct MigrationState {
    pub migration_id: [u8; 16],
    pub source_name: String,
    pub status: MigrationStatus,
    /// First start, kept across resumes; bounds the emergency rollback window.
    pub started_at: Option<u64>,
    pub completed_at: Option<u64>,
    pub dry_run: bool,
    pub runs: u32,
    pub error: Option<String>,
    pub phases: Vec<PhaseProgress>,
}

impl MigrationState {
    pub fn new(migration_id: MigrationId, source_name: impl Into<String>, dry_run: bool) -> Self {
        Self {
            migration_id: *migration_id.as_bytes(),
            source_name: source_name.into(),
            status: MigrationStatus::Pending,
            started_at: None,
            completed_at: None,
            dry_run,
            runs: 0,
            error: None,
            phases: PhaseKind::ALL.iter().copied().map(PhaseProgress::new).collect(),
        }
    }

    pub fn id(&self) -> MigrationId {
        MigrationId::from_bytes(self.migration_id)
    }

    /// Begin (or resume) a run.
    pub fn start(&mut self) {
        self.status = MigrationStatus::Running;
        self.runs += 1;
        self.completed_at = None;
        self.error = None;
        if self.started_at.is_none() {
            self.started_at = Some(current_timestamp());
        }
    }

    pub fn finish(&mut self, status: MigrationStatus, error: Option<String>) {
        self.status = status;
        self.error = error;
        self.completed_at = Some(current_timestamp());
    }

    pub fn phase(&self, kind: PhaseKind) -> Option<&PhaseProgress> {
        self.phases.iter().find(|p| p.phase == kind)
    }

    pub fn phase_mut(&mut self, kind: PhaseKind) -> Option<&mut PhaseProgress> {
        self.phases.iter_mut().find(|p| p.phase == kind)
    }

    /// Whether a resume can pick up where the last run stopped.
    pub fn can_resume(&self) -> bool {
        matches!(
            self.status,
            MigrationStatus::Running
                | MigrationStatus::Failed
                | MigrationStatus::Cancelled
                | MigrationStatus::RolledBack
        )
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, MigrationError> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| MigrationError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MigrationError> {
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(bytes)
            .map_err(|e| MigrationError::Deserialization(e.to_string()))
    }
}

/// Outcome of one batch attempt.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Committed,
    Failed,
}

/// Log row for one batch. Committed rows double as checkpoints.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct BatchRecord {
    pub migration_id: [u8; 16],
    pub phase: PhaseKind,
    pub table: String,
    /// 1-based.
    pub batch_no: u64,
    pub rows_read: u64,
    pub rows_written: u64,
    pub rows_rejected: u64,
    /// Running totals for the table up to and including this batch.
    pub total_read: u64,
    pub total_written: u64,
    pub total_rejected: u64,
    /// Read position after this batch, as JSON.
    pub cursor: Option<String>,
    pub status: BatchStatus,
    pub attempts: u32,
    pub started_at: u64,
    pub completed_at: u64,
    pub error: Option<String>,
}

impl BatchRecord {
    pub fn to_bytes(&self) -> Result<Vec<u8>, MigrationError> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| MigrationError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MigrationError> {
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(bytes)
            .map_err(|e| MigrationError::Deserialization(e.to_string()))
    }

    /// Decode the cursor.
    pub fn cursor(&self) -> Result<Option<BatchCursor>, MigrationError> {
        self.cursor
            .as_deref()
            .map(serde_json::from_str::<BatchCursor>)
            .transpose()
            .map_err(|e| MigrationError::StateCorrupted {
                message: format!("bad cursor for {} batch {}: {}", self.table, self.batch_no, e),
            })
    }
}

/// Encode a cursor for a batch record.
pub fn encode_cursor(cursor: &BatchCursor) -> Result<String, MigrationError> {
    serde_json::to_string(cursor).map_err(|e| MigrationError::Serialization(e.to_string()))
}

/// Log row summarizing one table within a phase.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct TableRecord {
    pub migration_id: [u8; 16],
    pub phase: PhaseKind,
    pub table: String,
    pub status: PhaseStatus,
    pub batches_committed: u64,
    pub rows_read: u64,
    pub rows_written: u64,
    pub rows_rejected: u64,
    pub started_at: u64,
    pub completed_at: Option<u64>,
    pub error: Option<String>,
}

impl TableRecord {
    pub fn to_bytes(&self) -> Result<Vec<u8>, MigrationError> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| MigrationError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MigrationError> {
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(bytes)
            .map_err(|e| MigrationError::Deserialization(e.to_string()))
    }
}

/// Sled-backed migration log.
#[derive(Clone)]
pub struct MigrationLog {
    state: sled::Tree,
    log: sled::Tree,
}

impl MigrationLog {
    /// Tree holding one state record per migration.
    pub const STATE_TREE: &'static str = "migration:state";
    /// Tree holding table and batch records.
    pub const LOG_TREE: &'static str = "migration:log";

    /// Open or create the log.
    pub fn open(db: &sled::Db) -> Result<Self, MigrationError> {
        Ok(Self {
            state: db.open_tree(Self::STATE_TREE)?,
            log: db.open_tree(Self::LOG_TREE)?,
        })
    }

    pub fn save_state(&self, state: &MigrationState) -> Result<(), MigrationError> {
        self.state
            .insert(Self::state_key(&state.migration_id), state.to_bytes()?)?;
        Ok(())
    }

    pub fn load_state(&self, id: &MigrationId) -> Result<Option<MigrationState>, MigrationError> {
        match self.state.get(Self::state_key(id.as_bytes()))? {
            Some(bytes) => Ok(Some(MigrationState::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All migrations, oldest start first.
    pub fn list_states(&self) -> Result<Vec<MigrationState>, MigrationError> {
        let mut states = Vec::new();
        for entry in self.state.scan_prefix(b"migration:") {
            let (_, value) = entry?;
            states.push(MigrationState::from_bytes(&value)?);
        }
        states.sort_by_key(|s| (s.started_at, s.migration_id));
        Ok(states)
    }

    /// Append (or overwrite a failed attempt of) a batch record.
    pub fn record_batch(&self, record: &BatchRecord) -> Result<(), MigrationError> {
        let key = Self::batch_key(&record.migration_id, record.phase, &record.table, record.batch_no);
        self.log.insert(key, record.to_bytes()?)?;
        Ok(())
    }

    pub fn record_table(&self, record: &TableRecord) -> Result<(), MigrationError> {
        let key = Self::table_key(&record.migration_id, record.phase, &record.table);
        self.log.insert(key, record.to_bytes()?)?;
        Ok(())
    }

    /// Highest committed batch for a table, if any.
    pub fn latest_checkpoint(
        &self,
        id: &MigrationId,
        phase: PhaseKind,
        table: &str,
    ) -> Result<Option<BatchRecord>, MigrationError> {
        let prefix = Self::batch_prefix(id.as_bytes(), phase, table);
        for entry in self.log.scan_prefix(prefix).rev() {
            let (_, value) = entry?;
            let record = BatchRecord::from_bytes(&value)?;
            if record.status == BatchStatus::Committed {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Every batch record of a migration, in key order.
    pub fn batches(&self, id: &MigrationId) -> Result<Vec<BatchRecord>, MigrationError> {
        let mut out = Vec::new();
        for entry in self.log.scan_prefix(Self::batch_id_prefix(id.as_bytes())) {
            let (_, value) = entry?;
            out.push(BatchRecord::from_bytes(&value)?);
        }
        Ok(out)
    }

    /// Every table record of a migration.
    pub fn tables(&self, id: &MigrationId) -> Result<Vec<TableRecord>, MigrationError> {
        let mut out = Vec::new();
        for entry in self.log.scan_prefix(Self::table_id_prefix(id.as_bytes())) {
            let (_, value) = entry?;
            out.push(TableRecord::from_bytes(&value)?);
        }
        Ok(out)
    }

    /// Drop table and batch records of one phase (after rolling it back).
    pub fn clear_phase(&self, id: &MigrationId, phase: PhaseKind) -> Result<u64, MigrationError> {
        let mut prefixes = Vec::new();
        let mut batch = Self::batch_id_prefix(id.as_bytes());
        batch.push(phase.code());
        prefixes.push(batch);
        let mut table = Self::table_id_prefix(id.as_bytes());
        table.push(phase.code());
        prefixes.push(table);
        self.remove_prefixes(&prefixes)
    }

    /// Drop every table and batch record of a migration.
    pub fn clear(&self, id: &MigrationId) -> Result<u64, MigrationError> {
        self.remove_prefixes(&[
            Self::batch_id_prefix(id.as_bytes()),
            Self::table_id_prefix(id.as_bytes()),
        ])
    }

    pub fn flush(&self) -> Result<(), MigrationError> {
        self.state.flush()?;
        self.log.flush()?;
        Ok(())
    }

    fn remove_prefixes(&self, prefixes: &[Vec<u8>]) -> Result<u64, MigrationError> {
        let mut removed = 0;
        for prefix in prefixes {
            let keys: Vec<sled::IVec> = self
                .log
                .scan_prefix(prefix)
                .keys()
                .collect::<Result<_, _>>()?;
            for key in keys {
                self.log.remove(key)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn state_key(id: &[u8; 16]) -> Vec<u8> {
        let mut key = Vec::with_capacity(26);
        key.extend_from_slice(b"migration:");
        key.extend_from_slice(id);
        key
    }

    fn batch_id_prefix(id: &[u8; 16]) -> Vec<u8> {
        let mut key = Vec::with_capacity(64);
        key.extend_from_slice(b"batch:");
        key.extend_from_slice(id);
        key
    }

    fn table_id_prefix(id: &[u8; 16]) -> Vec<u8> {
        let mut key = Vec::with_capacity(64);
        key.extend_from_slice(b"table:");
        key.extend_from_slice(id);
        key
    }

    /// Table names are terminated by a zero byte so `orders` never prefixes
    /// `orders_archive`.
    fn batch_prefix(id: &[u8; 16], phase: PhaseKind, table: &str) -> Vec<u8> {
        let mut key = Self::batch_id_prefix(id);
        key.push(phase.code());
        key.extend_from_slice(table.to_ascii_lowercase().as_bytes());
        key.push(0);
        key
    }

    fn batch_key(id: &[u8; 16], phase: PhaseKind, table: &str, batch_no: u64) -> Vec<u8> {
        let mut key = Self::batch_prefix(id, phase, table);
        key.extend_from_slice(&batch_no.to_be_bytes());
        key
    }

    fn table_key(id: &[u8; 16], phase: PhaseKind, table: &str) -> Vec<u8> {
        let mut key = Self::table_id_prefix(id);
        key.push(phase.code());
        key.extend_from_slice(table.to_ascii_lowercase().as_bytes());
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::Value;

    fn id() -> MigrationId {
        MigrationId::from_bytes([7u8; 16])
    }

    fn batch(batch_no: u64, status: BatchStatus) -> BatchRecord {
        BatchRecord {
            migration_id: *id().as_bytes(),
            phase: PhaseKind::MasterData,
            table: "OCRD".to_string(),
            batch_no,
            rows_read: 10,
            rows_written: 10,
            rows_rejected: 0,
            total_read: batch_no * 10,
            total_written: batch_no * 10,
            total_rejected: 0,
            cursor: Some(
                encode_cursor(&BatchCursor {
                    key: vec![Value::text(format!("C{:04}", batch_no * 10))],
                    ties: 1,
                })
                .unwrap(),
            ),
            status,
            attempts: 1,
            started_at: 1,
            completed_at: 2,
            error: None,
        }
    }

    fn open_log() -> (tempfile::TempDir, MigrationLog) {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();
        (dir, MigrationLog::open(&db).unwrap())
    }

    #[test]
    fn test_state_round_trip() {
        let (_dir, log) = open_log();
        let mut state = MigrationState::new(id(), "erp", false);
        state.start();
        state.phase_mut(PhaseKind::MasterData).unwrap().start();
        log.save_state(&state).unwrap();

        let loaded = log.load_state(&id()).unwrap().unwrap();
        assert_eq!(loaded, state);
        assert_eq!(loaded.status, MigrationStatus::Running);
        assert!(loaded.can_resume());
        assert_eq!(log.list_states().unwrap().len(), 1);
    }

    #[test]
    fn test_latest_checkpoint_skips_failed_batches() {
        let (_dir, log) = open_log();
        for n in 1..=300 {
            log.record_batch(&batch(n, BatchStatus::Committed)).unwrap();
        }
        log.record_batch(&batch(301, BatchStatus::Failed)).unwrap();

        let checkpoint = log
            .latest_checkpoint(&id(), PhaseKind::MasterData, "ocrd")
            .unwrap()
            .unwrap();
        assert_eq!(checkpoint.batch_no, 300);
        assert_eq!(
            checkpoint.cursor().unwrap().map(|c| c.key),
            Some(vec![Value::text("C3000")])
        );
        assert!(log
            .latest_checkpoint(&id(), PhaseKind::TransactionalData, "OCRD")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_table_names_do_not_collide() {
        let (_dir, log) = open_log();
        let mut other = batch(5, BatchStatus::Committed);
        other.table = "OCRD_ARCHIVE".to_string();
        log.record_batch(&other).unwrap();
        log.record_batch(&batch(2, BatchStatus::Committed)).unwrap();

        let checkpoint = log
            .latest_checkpoint(&id(), PhaseKind::MasterData, "OCRD")
            .unwrap()
            .unwrap();
        assert_eq!(checkpoint.batch_no, 2);
    }

    #[test]
    fn test_clear_phase_and_all() {
        let (_dir, log) = open_log();
        log.record_batch(&batch(1, BatchStatus::Committed)).unwrap();
        let mut trans = batch(1, BatchStatus::Committed);
        trans.phase = PhaseKind::TransactionalData;
        log.record_batch(&trans).unwrap();

        assert_eq!(log.clear_phase(&id(), PhaseKind::TransactionalData).unwrap(), 1);
        assert_eq!(log.batches(&id()).unwrap().len(), 1);
        assert_eq!(log.clear(&id()).unwrap(), 1);
        assert!(log.batches(&id()).unwrap().is_empty());
    }
}
