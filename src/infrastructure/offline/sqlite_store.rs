use super::mappers::{pending_attachment_from_row, pending_mutation_from_row};
use super::rows::{PendingAttachmentRow, PendingMutationRow};
use crate::application::ports::offline_store::{Collection, OfflineStore, SettleOutcome};
use crate::domain::entities::offline::{PendingAttachment, PendingCounts, PendingMutation};
use crate::domain::value_objects::offline::{MutationAction, QueueItemStatus, RecordKey};
use crate::infrastructure::database::ConnectionPool;
use crate::shared::error::AppError;
use async_trait::async_trait;
use sqlx::SqlitePool;

const MUTATION_COLUMNS: &str = "id, entity_table, action, payload, enqueued_at, status, revision, \
     attempt_count, last_error, last_attempt_at";

const ATTACHMENT_COLUMNS: &str = "id, owner_entity_id, owner_confirmed, file_name, content_type, \
     content, enqueued_at, attempt_count, last_error, storage_path";

pub struct SqliteOfflineStore {
    pool: ConnectionPool,
}

impl SqliteOfflineStore {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self::new(ConnectionPool::from_pool(pool))
    }

    async fn pool(&self) -> Result<&SqlitePool, AppError> {
        self.pool.get().await
    }
}

#[async_trait]
impl OfflineStore for SqliteOfflineStore {
    async fn put_mutation(&self, mutation: &PendingMutation) -> Result<(), AppError> {
        let payload = mutation.payload.to_json_string()?;

        // Upsert keeps `seq`, so an overwritten record holds its replay position.
        sqlx::query(
            r#"
            INSERT INTO pending_mutations (
                id, entity_table, action, payload, enqueued_at,
                status, revision, attempt_count, last_error, last_attempt_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                entity_table = excluded.entity_table,
                action = excluded.action,
                payload = excluded.payload,
                enqueued_at = excluded.enqueued_at,
                status = excluded.status,
                revision = excluded.revision,
                attempt_count = excluded.attempt_count,
                last_error = excluded.last_error,
                last_attempt_at = excluded.last_attempt_at
            "#,
        )
        .bind(mutation.id.as_str())
        .bind(mutation.table.as_str())
        .bind(mutation.action.as_str())
        .bind(&payload)
        .bind(mutation.enqueued_at)
        .bind(mutation.status.as_str())
        .bind(i64::from(mutation.revision))
        .bind(i64::from(mutation.attempt_count))
        .bind(&mutation.last_error)
        .bind(mutation.last_attempt_at)
        .execute(self.pool().await?)
        .await?;

        Ok(())
    }

    async fn get_mutation(&self, id: &RecordKey) -> Result<Option<PendingMutation>, AppError> {
        let row = sqlx::query_as::<_, PendingMutationRow>(&format!(
            "SELECT {MUTATION_COLUMNS} FROM pending_mutations WHERE id = ?1"
        ))
        .bind(id.as_str())
        .fetch_optional(self.pool().await?)
        .await?;

        row.map(pending_mutation_from_row).transpose()
    }

    async fn list_mutations(&self) -> Result<Vec<PendingMutation>, AppError> {
        let rows = sqlx::query_as::<_, PendingMutationRow>(&format!(
            "SELECT {MUTATION_COLUMNS} FROM pending_mutations ORDER BY enqueued_at ASC, seq ASC"
        ))
        .fetch_all(self.pool().await?)
        .await?;

        rows.into_iter().map(pending_mutation_from_row).collect()
    }

    async fn put_attachment(&self, attachment: &PendingAttachment) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO pending_attachments (
                id, owner_entity_id, owner_confirmed, file_name, content_type,
                content, enqueued_at, attempt_count, last_error, storage_path
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                owner_entity_id = excluded.owner_entity_id,
                owner_confirmed = excluded.owner_confirmed,
                file_name = excluded.file_name,
                content_type = excluded.content_type,
                content = excluded.content,
                enqueued_at = excluded.enqueued_at,
                attempt_count = excluded.attempt_count,
                last_error = excluded.last_error,
                storage_path = excluded.storage_path
            "#,
        )
        .bind(attachment.id.as_str())
        .bind(attachment.owner_entity_id.as_str())
        .bind(attachment.owner_confirmed)
        .bind(&attachment.file.file_name)
        .bind(&attachment.file.content_type)
        .bind(&attachment.file.bytes)
        .bind(attachment.enqueued_at)
        .bind(i64::from(attachment.attempt_count))
        .bind(&attachment.last_error)
        .bind(&attachment.storage_path)
        .execute(self.pool().await?)
        .await?;

        Ok(())
    }

    async fn list_attachments(&self) -> Result<Vec<PendingAttachment>, AppError> {
        let rows = sqlx::query_as::<_, PendingAttachmentRow>(&format!(
            "SELECT {ATTACHMENT_COLUMNS} FROM pending_attachments ORDER BY enqueued_at ASC, seq ASC"
        ))
        .fetch_all(self.pool().await?)
        .await?;

        rows.into_iter().map(pending_attachment_from_row).collect()
    }

    async fn list_attachments_by_owner(
        &self,
        owner: &RecordKey,
    ) -> Result<Vec<PendingAttachment>, AppError> {
        let rows = sqlx::query_as::<_, PendingAttachmentRow>(&format!(
            "SELECT {ATTACHMENT_COLUMNS} FROM pending_attachments \
             WHERE owner_entity_id = ?1 ORDER BY enqueued_at ASC, seq ASC"
        ))
        .bind(owner.as_str())
        .fetch_all(self.pool().await?)
        .await?;

        rows.into_iter().map(pending_attachment_from_row).collect()
    }

    async fn delete_attachments_by_owner(&self, owner: &RecordKey) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM pending_attachments WHERE owner_entity_id = ?1")
            .bind(owner.as_str())
            .execute(self.pool().await?)
            .await?;

        Ok(result.rows_affected())
    }

    async fn confirm_attachment_owner(
        &self,
        from: &RecordKey,
        to: &RecordKey,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE pending_attachments
            SET owner_entity_id = ?1, owner_confirmed = 1
            WHERE owner_entity_id = ?2
            "#,
        )
        .bind(to.as_str())
        .bind(from.as_str())
        .execute(self.pool().await?)
        .await?;

        Ok(result.rows_affected())
    }

    async fn assign_storage_path(&self, id: &RecordKey, path: &str) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE pending_attachments SET storage_path = ?1 WHERE id = ?2")
            .bind(path)
            .bind(id.as_str())
            .execute(self.pool().await?)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, collection: Collection, id: &RecordKey) -> Result<bool, AppError> {
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE id = ?1",
            collection.table_name()
        ))
        .bind(id.as_str())
        .execute(self.pool().await?)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn clear(&self, collection: Collection) -> Result<u64, AppError> {
        let result = sqlx::query(&format!("DELETE FROM {}", collection.table_name()))
            .execute(self.pool().await?)
            .await?;

        Ok(result.rows_affected())
    }

    async fn settle_mutation(
        &self,
        id: &RecordKey,
        revision: u32,
    ) -> Result<SettleOutcome, AppError> {
        let mut tx = self.pool().await?.begin().await?;

        let removed = sqlx::query("DELETE FROM pending_mutations WHERE id = ?1 AND revision = ?2")
            .bind(id.as_str())
            .bind(i64::from(revision))
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let outcome = if removed > 0 {
            SettleOutcome::Removed
        } else {
            let current: Option<(String,)> =
                sqlx::query_as("SELECT action FROM pending_mutations WHERE id = ?1")
                    .bind(id.as_str())
                    .fetch_optional(&mut *tx)
                    .await?;

            match current {
                None => SettleOutcome::Missing,
                Some(_) => {
                    // The row exists remotely now; a queued create must replay as an update.
                    sqlx::query(
                        "UPDATE pending_mutations SET action = ?1 WHERE id = ?2 AND action = ?3",
                    )
                    .bind(MutationAction::Update.as_str())
                    .bind(id.as_str())
                    .bind(MutationAction::Create.as_str())
                    .execute(&mut *tx)
                    .await?;
                    SettleOutcome::Superseded
                }
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn record_mutation_attempt(
        &self,
        id: &RecordKey,
        error: &str,
        attempted_at: i64,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE pending_mutations
            SET attempt_count = attempt_count + 1, last_error = ?1, last_attempt_at = ?2
            WHERE id = ?3
            "#,
        )
        .bind(error)
        .bind(attempted_at)
        .bind(id.as_str())
        .execute(self.pool().await?)
        .await?;

        Ok(())
    }

    async fn record_attachment_attempt(&self, id: &RecordKey, error: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE pending_attachments
            SET attempt_count = attempt_count + 1, last_error = ?1
            WHERE id = ?2
            "#,
        )
        .bind(error)
        .bind(id.as_str())
        .execute(self.pool().await?)
        .await?;

        Ok(())
    }

    async fn set_mutation_status(
        &self,
        id: &RecordKey,
        status: QueueItemStatus,
        error: Option<&str>,
    ) -> Result<bool, AppError> {
        let result =
            sqlx::query("UPDATE pending_mutations SET status = ?1, last_error = ?2 WHERE id = ?3")
                .bind(status.as_str())
                .bind(error)
                .bind(id.as_str())
                .execute(self.pool().await?)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn pending_counts(&self) -> Result<PendingCounts, AppError> {
        let pool = self.pool().await?;

        let (mutations, held): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN status = 'held' THEN 1 ELSE 0 END), 0)
            FROM pending_mutations
            "#,
        )
        .fetch_one(pool)
        .await?;

        let (attachments,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pending_attachments")
            .fetch_one(pool)
            .await?;

        Ok(PendingCounts::new(
            mutations.max(0) as u64,
            attachments.max(0) as u64,
            held.max(0) as u64,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::offline::{
        AttachmentFile, EntityPayload, EntityTable, MutationAction,
    };
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_store() -> SqliteOfflineStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        ConnectionPool::migrate(&pool).await.unwrap();

        SqliteOfflineStore::from_pool(pool)
    }

    fn key(value: &str) -> RecordKey {
        RecordKey::parse(value).unwrap()
    }

    fn mutation(id: &str, action: MutationAction, enqueued_at: i64) -> PendingMutation {
        PendingMutation::new(
            key(id),
            EntityTable::reports(),
            action,
            EntityPayload::new(json!({"train_number": id})).unwrap(),
            enqueued_at,
        )
    }

    fn attachment(id: &str, owner: &str, enqueued_at: i64) -> PendingAttachment {
        PendingAttachment::new(
            key(id),
            key(owner),
            false,
            AttachmentFile::new(format!("{id}.jpg"), Some("image/jpeg".into()), vec![1, 2, 3])
                .unwrap(),
            enqueued_at,
        )
    }

    #[tokio::test]
    async fn test_mutations_are_listed_in_enqueue_order_with_ties_by_insertion() {
        let store = setup_store().await;
        store
            .put_mutation(&mutation("b", MutationAction::Create, 200))
            .await
            .unwrap();
        store
            .put_mutation(&mutation("c", MutationAction::Create, 100))
            .await
            .unwrap();
        store
            .put_mutation(&mutation("a", MutationAction::Create, 200))
            .await
            .unwrap();

        let ids: Vec<String> = store
            .list_mutations()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id.to_string())
            .collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_overwrite_keeps_replay_position() {
        let store = setup_store().await;
        store
            .put_mutation(&mutation("first", MutationAction::Create, 100))
            .await
            .unwrap();
        store
            .put_mutation(&mutation("second", MutationAction::Create, 100))
            .await
            .unwrap();

        let mut first = store.get_mutation(&key("first")).await.unwrap().unwrap();
        first
            .absorb(
                MutationAction::Update,
                EntityPayload::new(json!({"status": "Submitted"})).unwrap(),
            )
            .unwrap();
        store.put_mutation(&first).await.unwrap();

        let listed = store.list_mutations().await.unwrap();
        assert_eq!(listed[0].id.as_str(), "first");
        assert_eq!(listed[0].revision, 2);
        assert_eq!(listed[0].payload.get("status"), Some(&json!("Submitted")));
    }

    #[tokio::test]
    async fn test_settle_removes_only_unchanged_revision() {
        let store = setup_store().await;
        let original = mutation("r1", MutationAction::Create, 100);
        store.put_mutation(&original).await.unwrap();

        let mut edited = original.clone();
        edited
            .absorb(
                MutationAction::Update,
                EntityPayload::new(json!({"notes": "late edit"})).unwrap(),
            )
            .unwrap();
        store.put_mutation(&edited).await.unwrap();

        let outcome = store.settle_mutation(&key("r1"), 1).await.unwrap();
        assert_eq!(outcome, SettleOutcome::Superseded);

        let remaining = store.get_mutation(&key("r1")).await.unwrap().unwrap();
        assert_eq!(remaining.action, MutationAction::Update);
        assert_eq!(remaining.revision, 2);

        let outcome = store.settle_mutation(&key("r1"), 2).await.unwrap();
        assert_eq!(outcome, SettleOutcome::Removed);
        assert!(store.get_mutation(&key("r1")).await.unwrap().is_none());

        let outcome = store.settle_mutation(&key("r1"), 2).await.unwrap();
        assert_eq!(outcome, SettleOutcome::Missing);
    }

    #[tokio::test]
    async fn test_attachments_round_trip_bytes_and_filter_by_owner() {
        let store = setup_store().await;
        store.put_attachment(&attachment("p2", "r1", 20)).await.unwrap();
        store.put_attachment(&attachment("p1", "r1", 10)).await.unwrap();
        store.put_attachment(&attachment("p3", "r2", 5)).await.unwrap();

        let owned = store.list_attachments_by_owner(&key("r1")).await.unwrap();
        assert_eq!(owned.len(), 2);
        assert_eq!(owned[0].id.as_str(), "p1");
        assert_eq!(owned[0].file.bytes, vec![1, 2, 3]);

        assert_eq!(store.delete_attachments_by_owner(&key("r1")).await.unwrap(), 2);
        assert_eq!(store.list_attachments().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_confirm_attachment_owner_repoints_rows() {
        let store = setup_store().await;
        store.put_attachment(&attachment("p1", "local-1", 10)).await.unwrap();
        store.put_attachment(&attachment("p2", "local-2", 20)).await.unwrap();

        let moved = store
            .confirm_attachment_owner(&key("local-1"), &key("srv-1"))
            .await
            .unwrap();
        assert_eq!(moved, 1);

        let owned = store.list_attachments_by_owner(&key("srv-1")).await.unwrap();
        assert_eq!(owned.len(), 1);
        assert!(owned[0].owner_confirmed);
        assert!(store
            .list_attachments_by_owner(&key("local-1"))
            .await
            .unwrap()
            .is_empty());
        let untouched = store.list_attachments_by_owner(&key("local-2")).await.unwrap();
        assert!(!untouched[0].owner_confirmed);
    }

    #[tokio::test]
    async fn test_storage_path_is_kept_across_retries() {
        let store = setup_store().await;
        store.put_attachment(&attachment("p1", "r1", 10)).await.unwrap();
        assert_eq!(store.list_attachments().await.unwrap()[0].storage_path, None);

        assert!(store
            .assign_storage_path(&key("p1"), "r1/1700000000000.jpg")
            .await
            .unwrap());
        assert!(!store
            .assign_storage_path(&key("missing"), "r1/1.jpg")
            .await
            .unwrap());

        store
            .record_attachment_attempt(&key("p1"), "timeout")
            .await
            .unwrap();
        store
            .confirm_attachment_owner(&key("r1"), &key("r1"))
            .await
            .unwrap();

        let stored = store.list_attachments().await.unwrap();
        assert_eq!(stored[0].storage_path.as_deref(), Some("r1/1700000000000.jpg"));
        assert_eq!(stored[0].attempt_count, 1);
    }

    #[tokio::test]
    async fn test_counts_track_held_and_attempts() {
        let store = setup_store().await;
        store
            .put_mutation(&mutation("r1", MutationAction::Create, 1))
            .await
            .unwrap();
        store
            .put_mutation(&mutation("r2", MutationAction::Create, 2))
            .await
            .unwrap();
        store.put_attachment(&attachment("p1", "r1", 3)).await.unwrap();

        store
            .record_mutation_attempt(&key("r2"), "timeout", 50)
            .await
            .unwrap();
        assert!(
            store
                .set_mutation_status(&key("r2"), QueueItemStatus::Held, Some("422"))
                .await
                .unwrap()
        );

        let counts = store.pending_counts().await.unwrap();
        assert_eq!(counts, PendingCounts::new(2, 1, 1));

        let r2 = store.get_mutation(&key("r2")).await.unwrap().unwrap();
        assert_eq!(r2.attempt_count, 1);
        assert_eq!(r2.last_attempt_at, Some(50));
        assert_eq!(r2.last_error.as_deref(), Some("422"));

        assert_eq!(store.clear(Collection::Mutations).await.unwrap(), 2);
        assert!(!store.delete(Collection::Attachments, &key("nope")).await.unwrap());
        assert!(store.delete(Collection::Attachments, &key("p1")).await.unwrap());
        assert!(!store.pending_counts().await.unwrap().has_pending_changes());
    }
}
