use super::offline_queue_service::{OfflineQueueService, OfflineQueueServiceTrait};
use crate::application::ports::connectivity::ConnectivityStatus;
use crate::application::ports::query_cache::QueryCacheInvalidator;
use crate::application::ports::remote_data_api::{RemoteDataApi, RemoteError, RemoteRecord};
use crate::domain::entities::offline::{
    FailureKind, MutationDraft, PendingAttachment, PendingCounts, PendingMutation, SyncOutcome,
    SyncReport, SyncState, SkipReason,
};
use crate::domain::value_objects::offline::{
    EntityId, EntityPayload, EntityTable, MutationAction, RecordKey,
};
use crate::infrastructure::offline::metrics::{
    PassMetadata, PassOutcomeStatus, SyncMetrics, SyncMetricsSnapshot,
};
use crate::shared::config::AppConfig;
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Instant;
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    Startup,
    Reconnect,
    Manual,
}

impl SyncTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncTrigger::Startup => "startup",
            SyncTrigger::Reconnect => "reconnect",
            SyncTrigger::Manual => "manual",
        }
    }
}

/// Remote table and column names the synchronizer writes to.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub entity_table: EntityTable,
    pub hold_rejected: bool,
    pub bucket: String,
    pub attachment_table: EntityTable,
    pub owner_column: String,
    pub url_column: String,
    pub flag_column: String,
}

impl SyncSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        Ok(Self {
            entity_table: EntityTable::new(config.remote.reports_table.clone())
                .map_err(AppError::ConfigurationError)?,
            hold_rejected: config.sync.hold_rejected,
            bucket: config.attachments.bucket.clone(),
            attachment_table: EntityTable::new(config.attachments.table.clone())
                .map_err(AppError::ConfigurationError)?,
            owner_column: config.attachments.owner_column.clone(),
            url_column: config.attachments.url_column.clone(),
            flag_column: config.attachments.flag_column.clone(),
        })
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            entity_table: EntityTable::reports(),
            hold_rejected: true,
            bucket: "report-photos".to_string(),
            attachment_table: EntityTable::photos(),
            owner_column: "report_id".to_string(),
            url_column: "url".to_string(),
            flag_column: "has_photos".to_string(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SyncStatus {
    pub state: SyncState,
    pub is_syncing: bool,
    pub pending: PendingCounts,
    pub last_sync: Option<DateTime<Utc>>,
    pub metrics: SyncMetricsSnapshot,
}

pub struct SyncService {
    queue: Arc<OfflineQueueService>,
    remote: Arc<dyn RemoteDataApi>,
    connectivity: Arc<dyn ConnectivityStatus>,
    cache: Option<Arc<dyn QueryCacheInvalidator>>,
    settings: SyncSettings,
    in_progress: AtomicBool,
    state: watch::Sender<SyncState>,
    last_sync: RwLock<Option<DateTime<Utc>>>,
    metrics: SyncMetrics,
    path_clock: PathClock,
}

/// Clears the in-progress flag even when a pass is dropped mid-flight.
struct PassGuard<'a> {
    service: &'a SyncService,
}

impl<'a> PassGuard<'a> {
    fn acquire(service: &'a SyncService) -> Option<Self> {
        service
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        service.state.send_replace(SyncState::Syncing);
        Some(Self { service })
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        let remaining = self.service.queue.counts().current();
        self.service.state.send_if_modified(|state| {
            if *state == SyncState::Syncing {
                *state = SyncState::SyncFailed { remaining };
                true
            } else {
                false
            }
        });
        self.service.in_progress.store(false, Ordering::Release);
    }
}

/// Hands out strictly increasing millisecond stamps for upload paths. Only the running pass
/// touches it.
struct PathClock {
    last: AtomicI64,
}

impl PathClock {
    fn new() -> Self {
        Self {
            last: AtomicI64::new(0),
        }
    }

    fn next(&self) -> i64 {
        let next = Utc::now()
            .timestamp_millis()
            .max(self.last.load(Ordering::Acquire) + 1);
        self.last.store(next, Ordering::Release);
        next
    }

    /// Never hand out a stamp already claimed by a persisted path.
    fn observe(&self, stamp: i64) {
        self.last.fetch_max(stamp, Ordering::AcqRel);
    }
}

struct PassContext {
    report: SyncReport,
    touched: BTreeSet<String>,
    drained: HashSet<RecordKey>,
}

impl SyncService {
    pub fn new(
        queue: Arc<OfflineQueueService>,
        remote: Arc<dyn RemoteDataApi>,
        connectivity: Arc<dyn ConnectivityStatus>,
        settings: SyncSettings,
    ) -> Self {
        let (state, _) = watch::channel(SyncState::Idle);
        Self {
            queue,
            remote,
            connectivity,
            cache: None,
            settings,
            in_progress: AtomicBool::new(false),
            state,
            last_sync: RwLock::new(None),
            metrics: SyncMetrics::new(),
            path_clock: PathClock::new(),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn QueryCacheInvalidator>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    pub fn is_syncing(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    pub async fn status(&self) -> SyncStatus {
        SyncStatus {
            state: self.state(),
            is_syncing: self.is_syncing(),
            pending: self.queue.counts().current(),
            last_sync: *self.last_sync.read().await,
            metrics: self.metrics.snapshot(),
        }
    }

    /// Spawn the auto-sync task: one pass at startup, then one per reconnect while work is pending.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let service = Arc::clone(self);
        let mut online_rx = service.connectivity.subscribe();

        tokio::spawn(async move {
            let mut was_online = *online_rx.borrow_and_update();
            service.sync_if_pending(SyncTrigger::Startup).await;

            while online_rx.changed().await.is_ok() {
                let online = *online_rx.borrow_and_update();
                if online && !was_online {
                    tracing::info!(target: "offline::sync", "connection restored");
                    service.sync_if_pending(SyncTrigger::Reconnect).await;
                }
                was_online = online;
            }

            tracing::debug!(target: "offline::sync", "connectivity channel closed; auto-sync stopped");
        })
    }

    pub async fn trigger_sync(&self) -> Result<SyncOutcome, AppError> {
        self.run(SyncTrigger::Manual).await
    }

    pub async fn run(&self, trigger: SyncTrigger) -> Result<SyncOutcome, AppError> {
        if !self.connectivity.is_online() {
            tracing::debug!(
                target: "offline::sync",
                trigger = trigger.as_str(),
                "sync skipped while offline"
            );
            return Ok(SyncOutcome::Skipped(SkipReason::Offline));
        }

        let Some(_guard) = PassGuard::acquire(self) else {
            tracing::debug!(
                target: "offline::sync",
                trigger = trigger.as_str(),
                "sync already in progress"
            );
            return Ok(SyncOutcome::Skipped(SkipReason::AlreadySyncing));
        };

        tracing::info!(target: "offline::sync", trigger = trigger.as_str(), "sync pass started");
        let started = Instant::now();
        let result = self.run_pass().await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(report) => {
                let status = if report.is_clean() {
                    self.state.send_replace(SyncState::Idle);
                    PassOutcomeStatus::Completed
                } else {
                    self.state.send_replace(SyncState::SyncFailed {
                        remaining: report.remaining,
                    });
                    PassOutcomeStatus::Partial
                };
                *self.last_sync.write().await = Some(report.finished_at);

                self.metrics.record(
                    status,
                    &PassMetadata {
                        trigger: Some(trigger.as_str().to_string()),
                        duration_ms: Some(duration_ms),
                        confirmed_count: Some(report.confirmed.len() as u32),
                        uploaded_count: Some(report.uploaded_attachments as u32),
                        failure_count: Some(report.failures.len() as u32),
                    },
                );
                tracing::info!(
                    target: "offline::sync",
                    trigger = trigger.as_str(),
                    confirmed = report.confirmed.len(),
                    uploaded = report.uploaded_attachments,
                    failures = report.failures.len(),
                    remaining_mutations = report.remaining.mutations,
                    remaining_attachments = report.remaining.attachments,
                    duration_ms,
                    "sync pass finished"
                );
                Ok(SyncOutcome::from_report(report))
            }
            Err(err) => {
                let remaining = self.queue.counts().current();
                self.state.send_replace(SyncState::SyncFailed { remaining });
                self.metrics.record(
                    PassOutcomeStatus::Failed,
                    &PassMetadata {
                        trigger: Some(trigger.as_str().to_string()),
                        duration_ms: Some(duration_ms),
                        ..PassMetadata::default()
                    },
                );
                tracing::error!(
                    target: "offline::sync",
                    trigger = trigger.as_str(),
                    error = %err,
                    "sync pass failed"
                );
                Err(err)
            }
        }
    }

    async fn sync_if_pending(&self, trigger: SyncTrigger) {
        let counts = self.queue.refresh_counts().await;
        let replayable = counts.mutations.saturating_sub(counts.held_mutations) + counts.attachments;
        if replayable == 0 {
            return;
        }

        if let Err(err) = self.run(trigger).await {
            tracing::warn!(
                target: "offline::sync",
                trigger = trigger.as_str(),
                error = %err,
                "automatic sync failed"
            );
        }
    }

    async fn run_pass(&self) -> Result<SyncReport, AppError> {
        let snapshot = self.queue.list_pending_mutations().await?;
        let mut ctx = PassContext {
            report: SyncReport::begin(Utc::now()),
            touched: BTreeSet::new(),
            drained: HashSet::new(),
        };
        let snapshot_ids: HashSet<RecordKey> = snapshot.iter().map(|m| m.id.clone()).collect();

        for mutation in snapshot {
            if mutation.is_held() {
                tracing::debug!(target: "offline::sync", id = %mutation.id, "held mutation skipped");
                self.skip_attachments_of(&mutation.id, &mut ctx).await;
                continue;
            }

            match self.replay(&mutation).await {
                Ok(record) => self.confirm(mutation, record, &mut ctx).await,
                Err(err) => {
                    self.handle_replay_failure(&mutation, err, &mut ctx).await;
                    self.skip_attachments_of(&mutation.id, &mut ctx).await;
                }
            }
        }

        self.drain_orphans(&snapshot_ids, &mut ctx).await;

        if let Some(cache) = &self.cache {
            for table in &ctx.touched {
                cache.invalidate_table(table).await;
            }
        }

        let mut report = ctx.report;
        report.remaining = self.queue.refresh_counts().await;
        report.finished_at = Utc::now();
        Ok(report)
    }

    async fn replay(&self, mutation: &PendingMutation) -> Result<Option<RemoteRecord>, RemoteError> {
        match mutation.action {
            MutationAction::Create => self
                .remote
                .create_entity(&mutation.table, &mutation.payload)
                .await
                .map(Some),
            MutationAction::Update => self
                .remote
                .update_entity(&mutation.table, &mutation.id, &mutation.payload)
                .await
                .map(Some),
            MutationAction::Delete => self
                .remote
                .delete_entity(&mutation.table, &mutation.id)
                .await
                .map(|_| None),
        }
    }

    async fn confirm(
        &self,
        mutation: PendingMutation,
        record: Option<RemoteRecord>,
        ctx: &mut PassContext,
    ) {
        ctx.touched.insert(mutation.table.to_string());

        match self
            .queue
            .settle_mutation(&mutation.id, mutation.revision)
            .await
        {
            Ok(_) => {}
            Err(err) => {
                // The remote write went through; the replay next pass is an upsert on the same key.
                tracing::warn!(
                    target: "offline::sync",
                    id = %mutation.id,
                    error = %err,
                    "failed to settle synced mutation"
                );
                ctx.report
                    .record_failure(mutation.id.clone(), FailureKind::Storage, err.to_string());
                return;
            }
        }

        let confirmed = EntityId::ClientProvisional(mutation.id.clone())
            .confirm(record.and_then(|r| r.id));
        tracing::debug!(
            target: "offline::sync",
            id = %mutation.id,
            action = mutation.action.as_str(),
            "mutation confirmed"
        );
        ctx.report.confirmed.push(confirmed.clone());

        if mutation.action == MutationAction::Delete {
            return;
        }
        // Attachments left behind by a failed upload must not wait on a mutation that is gone.
        if let Err(err) = self
            .queue
            .confirm_attachment_owner(&mutation.id, confirmed.key())
            .await
        {
            ctx.report
                .record_failure(mutation.id.clone(), FailureKind::Storage, err.to_string());
            return;
        }
        self.drain_attachments(confirmed.key(), &mutation.table, ctx).await;
    }

    async fn handle_replay_failure(
        &self,
        mutation: &PendingMutation,
        err: RemoteError,
        ctx: &mut PassContext,
    ) {
        let message = err.to_string();
        let (kind, hold) = match &err {
            RemoteError::Rejected { .. } => (FailureKind::Rejected, self.settings.hold_rejected),
            RemoteError::Unreachable(_) | RemoteError::InvalidResponse(_) => {
                (FailureKind::Unreachable, false)
            }
        };

        if kind == FailureKind::Rejected {
            tracing::warn!(
                target: "offline::sync",
                id = %mutation.id,
                action = mutation.action.as_str(),
                held = hold,
                error = %message,
                "remote store rejected mutation"
            );
        } else {
            tracing::info!(
                target: "offline::sync",
                id = %mutation.id,
                error = %message,
                "remote store unreachable; mutation stays queued"
            );
        }

        if let Err(store_err) = self
            .queue
            .record_mutation_failure(&mutation.id, &message, hold)
            .await
        {
            tracing::warn!(
                target: "offline::sync",
                id = %mutation.id,
                error = %store_err,
                "failed to record sync attempt"
            );
        }
        ctx.report.record_failure(mutation.id.clone(), kind, message);
    }

    async fn skip_attachments_of(&self, owner: &RecordKey, ctx: &mut PassContext) {
        if let Ok(attachments) = self.queue.list_pending_attachments(Some(owner)).await {
            ctx.report.skipped_attachments += attachments.len() as u64;
        }
    }

    /// Upload the owner's queued attachments oldest first, then flag the owner as having photos.
    async fn drain_attachments(
        &self,
        owner: &RecordKey,
        table: &EntityTable,
        ctx: &mut PassContext,
    ) {
        ctx.drained.insert(owner.clone());
        let attachments = match self.queue.list_pending_attachments(Some(owner)).await {
            Ok(attachments) => attachments,
            Err(err) => {
                ctx.report
                    .record_failure(owner.clone(), FailureKind::Storage, err.to_string());
                return;
            }
        };
        if attachments.is_empty() {
            return;
        }
        for stamp in attachments.iter().filter_map(PendingAttachment::path_stamp) {
            self.path_clock.observe(stamp);
        }

        let total = attachments.len();
        let mut uploaded = 0usize;
        for attachment in attachments {
            let path = match self.object_path_for(&attachment).await {
                Ok(path) => path,
                Err(err) => {
                    tracing::warn!(
                        target: "offline::sync",
                        id = %attachment.id,
                        error = %err,
                        "failed to record attachment storage path"
                    );
                    ctx.report.record_failure(
                        attachment.id.clone(),
                        FailureKind::Storage,
                        err.to_string(),
                    );
                    break;
                }
            };
            match self.upload(&attachment, &path, ctx).await {
                Ok(()) => {
                    uploaded += 1;
                    if let Err(err) = self.queue.dequeue_attachment(&attachment.id).await {
                        tracing::warn!(
                            target: "offline::sync",
                            id = %attachment.id,
                            error = %err,
                            "failed to dequeue uploaded attachment"
                        );
                    }
                }
                Err(err) => {
                    let message = err.to_string();
                    tracing::warn!(
                        target: "offline::sync",
                        id = %attachment.id,
                        owner = %owner,
                        error = %message,
                        "attachment upload failed"
                    );
                    if let Err(store_err) =
                        self.queue.record_attachment_failure(&attachment.id, &message).await
                    {
                        tracing::warn!(
                            target: "offline::sync",
                            id = %attachment.id,
                            error = %store_err,
                            "failed to record attachment attempt"
                        );
                    }
                    let kind = if err.is_retryable() {
                        FailureKind::Unreachable
                    } else {
                        FailureKind::Rejected
                    };
                    ctx.report.record_failure(attachment.id.clone(), kind, message);
                    break;
                }
            }
        }

        ctx.report.uploaded_attachments += uploaded as u64;
        ctx.report.skipped_attachments += (total - uploaded) as u64;
        if uploaded > 0 {
            self.mark_has_attachments(owner, table, ctx).await;
        }
    }

    /// Path recorded on an earlier attempt, or a fresh one persisted before anything is uploaded.
    async fn object_path_for(&self, attachment: &PendingAttachment) -> Result<String, AppError> {
        if let Some(path) = &attachment.storage_path {
            return Ok(path.clone());
        }
        let path = attachment.object_path(self.path_clock.next());
        self.queue.assign_storage_path(&attachment.id, &path).await?;
        Ok(path)
    }

    async fn upload(
        &self,
        attachment: &PendingAttachment,
        path: &str,
        ctx: &mut PassContext,
    ) -> Result<(), RemoteError> {
        let object = self
            .remote
            .upload_binary(
                &self.settings.bucket,
                path,
                attachment.file.bytes.clone(),
                attachment.file.content_type.as_deref(),
            )
            .await?;
        let url = self
            .remote
            .public_reference(&object.bucket, &object.path)
            .await?;

        // Keyed on the attachment so a retried row insert merges instead of duplicating.
        let mut row = Map::new();
        row.insert("id".to_string(), Value::String(attachment.id.to_string()));
        row.insert(
            self.settings.owner_column.clone(),
            Value::String(attachment.owner_entity_id.to_string()),
        );
        row.insert(self.settings.url_column.clone(), Value::String(url));
        self.remote
            .create_entity(&self.settings.attachment_table, &EntityPayload::from(row))
            .await?;

        ctx.touched
            .insert(self.settings.attachment_table.to_string());
        tracing::debug!(
            target: "offline::sync",
            id = %attachment.id,
            path = %object.path,
            "attachment uploaded"
        );
        Ok(())
    }

    async fn mark_has_attachments(
        &self,
        owner: &RecordKey,
        table: &EntityTable,
        ctx: &mut PassContext,
    ) {
        let mut flag = Map::new();
        flag.insert(self.settings.flag_column.clone(), Value::Bool(true));
        let payload = EntityPayload::from(flag);

        let err = match self
            .remote
            .update_entity(table, owner, &payload)
            .await
        {
            Ok(_) => return,
            Err(err) => err,
        };

        tracing::warn!(
            target: "offline::sync",
            owner = %owner,
            error = %err,
            "failed to flag entity with attachments; queued for the next pass"
        );
        let kind = if err.is_retryable() {
            FailureKind::Unreachable
        } else {
            FailureKind::Rejected
        };
        ctx.report.record_failure(owner.clone(), kind, err.to_string());

        let draft = MutationDraft::update(table.clone(), owner.clone(), payload);
        if let Err(queue_err) = self.queue.enqueue_mutation(draft).await {
            tracing::error!(
                target: "offline::sync",
                owner = %owner,
                error = %queue_err,
                "failed to queue attachment flag update"
            );
        }
    }

    async fn drain_orphans(&self, snapshot_ids: &HashSet<RecordKey>, ctx: &mut PassContext) {
        let attachments = match self.queue.list_pending_attachments(None).await {
            Ok(attachments) => attachments,
            Err(err) => {
                tracing::warn!(
                    target: "offline::sync",
                    error = %err,
                    "failed to read pending attachments"
                );
                return;
            }
        };

        let mut owners: Vec<(RecordKey, bool, u64)> = Vec::new();
        for attachment in attachments
            .iter()
            .filter(|a| {
                !snapshot_ids.contains(&a.owner_entity_id)
                    && !ctx.drained.contains(&a.owner_entity_id)
            })
        {
            match owners
                .iter_mut()
                .find(|(owner, _, _)| owner == &attachment.owner_entity_id)
            {
                Some((_, confirmed, count)) => {
                    *confirmed |= attachment.owner_confirmed;
                    *count += 1;
                }
                None => owners.push((
                    attachment.owner_entity_id.clone(),
                    attachment.owner_confirmed,
                    1,
                )),
            }
        }

        for (owner, confirmed, count) in owners {
            if confirmed {
                let table = self.settings.entity_table.clone();
                self.drain_attachments(&owner, &table, ctx).await;
                continue;
            }

            match self.queue.get_mutation(&owner).await {
                Ok(Some(_)) => {
                    // Owner was queued after the snapshot; its attachments go with it next pass.
                    ctx.report.skipped_attachments += count;
                }
                Ok(None) => {
                    let message = format!(
                        "{count} attachment(s) reference {owner}, which is neither queued nor confirmed"
                    );
                    tracing::warn!(
                        target: "offline::sync",
                        owner = %owner,
                        count,
                        "attachment owner unknown; upload skipped"
                    );
                    ctx.report.skipped_attachments += count;
                    ctx.report
                        .record_failure(owner, FailureKind::OrderingViolation, message);
                }
                Err(err) => {
                    ctx.report.skipped_attachments += count;
                    ctx.report
                        .record_failure(owner, FailureKind::Storage, err.to_string());
                }
            }
        }
    }

    pub fn metrics(&self) -> SyncMetricsSnapshot {
        self.metrics.snapshot()
    }
}
