pub mod audit;
pub mod entities;
pub mod mapping;
pub mod syncer;
pub mod watermark;

use serde::Serialize;

/// Per-record failure descriptor carried in a batch summary.
#[derive(Debug, Clone, Serialize)]
pub struct RecordFailure {
    /// Remote primary key, when the record carried one.
    pub record_id: Option<i64>,
    pub message: String,
}

/// Outcome of one insert or update batch for one entity type.
/// This is the sole observable result of a handler call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub success: u32,
    pub skipped: u32,
    pub errors: u32,
    pub total: u32,
    pub failures: Vec<RecordFailure>,
}

impl BatchSummary {
    pub fn record_success(&mut self) {
        self.success += 1;
    }

    pub fn record_skip(&mut self) {
        self.skipped += 1;
    }

    pub fn record_failure(&mut self, record_id: Option<i64>, message: impl Into<String>) {
        self.errors += 1;
        self.failures.push(RecordFailure {
            record_id,
            message: message.into(),
        });
    }
}

/// Insert + update summaries for one entity bucket of a pass.
#[derive(Debug, Clone, Serialize)]
pub struct EntityReport {
    pub entity: &'static str,
    pub created: BatchSummary,
    pub updated: BatchSummary,
}

impl EntityReport {
    pub fn errors(&self) -> u32 {
        self.created.errors + self.updated.errors
    }

    pub fn applied(&self) -> u32 {
        self.created.success + self.updated.success
    }
}

/// Report returned after one sync pass.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub status: SyncStatus,
    pub entities: Vec<EntityReport>,
    /// True when the pass persisted a new watermark.
    pub watermark_advanced: bool,
}

impl SyncReport {
    pub fn offline() -> Self {
        Self {
            status: SyncStatus::Offline,
            entities: Vec::new(),
            watermark_advanced: false,
        }
    }

    pub fn no_changes() -> Self {
        Self {
            status: SyncStatus::NoChanges,
            entities: Vec::new(),
            watermark_advanced: false,
        }
    }

    /// Derive the pass status from per-entity counts.
    pub fn from_entities(entities: Vec<EntityReport>, watermark_advanced: bool) -> Self {
        let failed: u32 = entities.iter().map(|e| e.errors()).sum();
        let applied: u32 = entities.iter().map(|e| e.applied()).sum();
        let status = if failed == 0 {
            SyncStatus::Success
        } else if applied > 0 {
            SyncStatus::PartialFailure
        } else {
            SyncStatus::Failed
        };
        Self {
            status,
            entities,
            watermark_advanced,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncStatus {
    Success,
    PartialFailure,
    Failed,
    /// Remote payload carried no created/updated items; watermark untouched.
    NoChanges,
    /// Connectivity probe failed; the pass never started.
    Offline,
}

/// Report returned after one audit queue drain.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditDrainReport {
    /// Rows acknowledged by the remote and flipped to synced.
    pub sent: u32,
    /// Rows left unsynced for the next poll.
    pub failed: u32,
    /// Rows with no relevant change, marked synced to avoid retry loops.
    pub skipped: u32,
}
