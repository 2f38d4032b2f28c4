use serde::Serialize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PassOutcomeStatus {
    Completed,
    Partial,
    Failed,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetricsSnapshot {
    pub total_completed: u64,
    pub total_partial: u64,
    pub total_failed: u64,
    pub consecutive_failure: u64,
    pub last_success_ms: Option<u64>,
    pub last_failure_ms: Option<u64>,
    pub last_outcome: Option<PassOutcomeStatus>,
    pub last_trigger: Option<String>,
    pub last_duration_ms: Option<u64>,
    pub last_confirmed_count: Option<u32>,
    pub last_uploaded_count: Option<u32>,
    pub last_failure_count: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassMetadata {
    pub trigger: Option<String>,
    pub duration_ms: Option<u64>,
    pub confirmed_count: Option<u32>,
    pub uploaded_count: Option<u32>,
    pub failure_count: Option<u32>,
}

#[derive(Default, Clone)]
struct LastPassMetadata {
    outcome: Option<PassOutcomeStatus>,
    trigger: Option<String>,
    duration_ms: Option<u64>,
    confirmed_count: Option<u32>,
    uploaded_count: Option<u32>,
    failure_count: Option<u32>,
}

/// Counters for sync passes run by one synchronizer.
pub struct SyncMetrics {
    completed: AtomicU64,
    partial: AtomicU64,
    failed: AtomicU64,
    consecutive_failure: AtomicU64,
    last_success_ms: AtomicU64,
    last_failure_ms: AtomicU64,
    metadata: Mutex<LastPassMetadata>,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self {
            completed: AtomicU64::new(0),
            partial: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            consecutive_failure: AtomicU64::new(0),
            last_success_ms: AtomicU64::new(0),
            last_failure_ms: AtomicU64::new(0),
            metadata: Mutex::new(LastPassMetadata::default()),
        }
    }

    pub fn record(&self, status: PassOutcomeStatus, meta: &PassMetadata) -> SyncMetricsSnapshot {
        match status {
            PassOutcomeStatus::Completed => {
                self.completed.fetch_add(1, Ordering::Relaxed);
                self.last_success_ms
                    .store(current_unix_ms(), Ordering::Relaxed);
                self.consecutive_failure.store(0, Ordering::Relaxed);
            }
            PassOutcomeStatus::Partial | PassOutcomeStatus::Failed => {
                if status == PassOutcomeStatus::Partial {
                    self.partial.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.failed.fetch_add(1, Ordering::Relaxed);
                }
                self.last_failure_ms
                    .store(current_unix_ms(), Ordering::Relaxed);
                self.consecutive_failure.fetch_add(1, Ordering::Relaxed);
            }
        }

        if let Ok(mut guard) = self.metadata.lock() {
            guard.outcome = Some(status);
            guard.trigger = meta.trigger.clone();
            guard.duration_ms = meta.duration_ms;
            guard.confirmed_count = meta.confirmed_count;
            guard.uploaded_count = meta.uploaded_count;
            guard.failure_count = meta.failure_count;
        }

        self.snapshot()
    }

    pub fn snapshot(&self) -> SyncMetricsSnapshot {
        let metadata = self
            .metadata
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_else(|_| LastPassMetadata::default());

        SyncMetricsSnapshot {
            total_completed: self.completed.load(Ordering::Relaxed),
            total_partial: self.partial.load(Ordering::Relaxed),
            total_failed: self.failed.load(Ordering::Relaxed),
            consecutive_failure: self.consecutive_failure.load(Ordering::Relaxed),
            last_success_ms: to_option(self.last_success_ms.load(Ordering::Relaxed)),
            last_failure_ms: to_option(self.last_failure_ms.load(Ordering::Relaxed)),
            last_outcome: metadata.outcome,
            last_trigger: metadata.trigger,
            last_duration_ms: metadata.duration_ms,
            last_confirmed_count: metadata.confirmed_count,
            last_uploaded_count: metadata.uploaded_count,
            last_failure_count: metadata.failure_count,
        }
    }
}

impl Default for SyncMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn to_option(value: u64) -> Option<u64> {
    if value == 0 { None } else { Some(value) }
}

fn current_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(0)
}
