use super::PendingCounts;
use crate::domain::value_objects::offline::{EntityId, RecordKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Rejected,
    Unreachable,
    OrderingViolation,
    Storage,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Rejected => "rejected",
            FailureKind::Unreachable => "unreachable",
            FailureKind::OrderingViolation => "ordering_violation",
            FailureKind::Storage => "storage",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFailure {
    pub item_id: RecordKey,
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub confirmed: Vec<EntityId>,
    pub uploaded_attachments: u64,
    pub skipped_attachments: u64,
    pub failures: Vec<SyncFailure>,
    pub remaining: PendingCounts,
}

impl SyncReport {
    pub fn begin(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            finished_at: started_at,
            confirmed: Vec::new(),
            uploaded_attachments: 0,
            skipped_attachments: 0,
            failures: Vec::new(),
            remaining: PendingCounts::default(),
        }
    }

    pub fn record_failure(&mut self, item_id: RecordKey, kind: FailureKind, message: String) {
        self.failures.push(SyncFailure {
            item_id,
            kind,
            message,
        });
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failure_count(&self, kind: FailureKind) -> usize {
        self.failures.iter().filter(|f| f.kind == kind).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadySyncing,
    Offline,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::AlreadySyncing => "already_syncing",
            SkipReason::Offline => "offline",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "report", rename_all = "snake_case")]
pub enum SyncOutcome {
    Skipped(SkipReason),
    Completed(SyncReport),
    Partial(SyncReport),
}

impl SyncOutcome {
    pub fn from_report(report: SyncReport) -> Self {
        if report.is_clean() {
            SyncOutcome::Completed(report)
        } else {
            SyncOutcome::Partial(report)
        }
    }

    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            SyncOutcome::Completed(report) | SyncOutcome::Partial(report) => Some(report),
            SyncOutcome::Skipped(_) => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, SyncOutcome::Skipped(_))
    }
}
