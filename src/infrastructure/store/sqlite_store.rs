use super::mappers::{map_attachment, map_cached_entity, map_pending_operation};
use super::rows::{AttachmentRow, CachedEntityRow, PendingOperationRow};
use crate::application::ports::local_store::{EntityPredicate, LocalStore};
use crate::domain::entities::{
    AttachmentRecord, CachedEntity, OperationDraft, PendingOperation, QueueCounts,
};
use crate::domain::value_objects::{
    AttachmentId, Collection, EntityId, OperationId, OperationType,
};
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};
use std::collections::BTreeMap;

const REFRESH_MARKER_PATTERN: &str = "refreshed_at:%";

const SELECT_OPERATION: &str = r#"
    SELECT id, operation_type, collection, target_id, payload, enqueued_at,
           retry_count, last_error, last_attempt_at, synced, synced_at
    FROM pending_operations
"#;

const SELECT_ATTACHMENT: &str = r#"
    SELECT id, owner_id, encoded_payload, mime_type, phase, byte_size, width, height,
           sha256, captured_at, uploaded, uploaded_at, marked_for_deletion
    FROM attachments
"#;

/// SQLite-backed [`LocalStore`].
#[derive(Clone)]
pub struct SqliteLocalStore {
    pool: Pool<Sqlite>,
}

impl SqliteLocalStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    async fn upsert_entity<'e, E>(executor: E, entity: &CachedEntity) -> Result<(), AppError>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let data = serde_json::to_string(&entity.data)?;
        sqlx::query(
            r#"
            INSERT INTO cached_entities (collection, entity_id, data, cached_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(collection, entity_id) DO UPDATE SET
                data = excluded.data,
                cached_at = excluded.cached_at
            "#,
        )
        .bind(entity.collection.as_str())
        .bind(entity.id.as_str())
        .bind(data)
        .bind(entity.cached_at.timestamp_millis())
        .execute(executor)
        .await?;
        Ok(())
    }

    async fn upsert_metadata<'e, E>(executor: E, key: &str, value: &str) -> Result<(), AppError>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"
            INSERT INTO sync_metadata (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().timestamp_millis())
        .execute(executor)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl LocalStore for SqliteLocalStore {
    async fn put_entity(&self, entity: &CachedEntity) -> Result<(), AppError> {
        Self::upsert_entity(&self.pool, entity).await
    }

    async fn get_entity(
        &self,
        collection: &Collection,
        id: &EntityId,
    ) -> Result<Option<CachedEntity>, AppError> {
        let row = sqlx::query_as::<_, CachedEntityRow>(
            r#"
            SELECT collection, entity_id, data, cached_at
            FROM cached_entities
            WHERE collection = ?1 AND entity_id = ?2
            "#,
        )
        .bind(collection.as_str())
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(map_cached_entity).transpose()
    }

    async fn query_entities(
        &self,
        collection: &Collection,
        predicate: EntityPredicate<'_>,
    ) -> Result<Vec<CachedEntity>, AppError> {
        let rows = sqlx::query_as::<_, CachedEntityRow>(
            r#"
            SELECT collection, entity_id, data, cached_at
            FROM cached_entities
            WHERE collection = ?1
            ORDER BY entity_id ASC
            "#,
        )
        .bind(collection.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut entities = Vec::with_capacity(rows.len());
        for row in rows {
            let entity = map_cached_entity(row)?;
            if predicate(&entity) {
                entities.push(entity);
            }
        }
        Ok(entities)
    }

    async fn bulk_put_entities(&self, entities: &[CachedEntity]) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        for entity in entities {
            Self::upsert_entity(&mut *tx, entity).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn replace_collection(
        &self,
        collection: &Collection,
        entities: &[CachedEntity],
        marker: Option<(&str, &str)>,
    ) -> Result<(), AppError> {
        if let Some(stray) = entities.iter().find(|e| &e.collection != collection) {
            return Err(AppError::Validation(format!(
                "entity {} belongs to {} not {}",
                stray.id, stray.collection, collection
            )));
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM cached_entities WHERE collection = ?1")
            .bind(collection.as_str())
            .execute(&mut *tx)
            .await?;
        for entity in entities {
            Self::upsert_entity(&mut *tx, entity).await?;
        }
        if let Some((key, value)) = marker {
            Self::upsert_metadata(&mut *tx, key, value).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_entity(
        &self,
        collection: &Collection,
        id: &EntityId,
    ) -> Result<bool, AppError> {
        let result =
            sqlx::query("DELETE FROM cached_entities WHERE collection = ?1 AND entity_id = ?2")
                .bind(collection.as_str())
                .bind(id.as_str())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear_entities(&self) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM cached_entities")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM sync_metadata WHERE key LIKE ?1")
            .bind(REFRESH_MARKER_PATTERN)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn append_operation(&self, draft: &OperationDraft) -> Result<OperationId, AppError> {
        let payload = serde_json::to_string(&draft.payload)?;
        let attachment_id = draft.payload.attachment_id().map(|id| id.as_str().to_string());

        let result = sqlx::query(
            r#"
            INSERT INTO pending_operations (
                operation_type, collection, target_id, attachment_id, payload,
                enqueued_at, retry_count, synced
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 0)
            "#,
        )
        .bind(draft.operation_type().as_str())
        .bind(draft.collection.as_str())
        .bind(draft.target_id.as_str())
        .bind(attachment_id)
        .bind(payload)
        .bind(draft.enqueued_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        OperationId::new(result.last_insert_rowid()).map_err(AppError::Storage)
    }

    async fn get_operation(&self, id: OperationId) -> Result<Option<PendingOperation>, AppError> {
        let row = sqlx::query_as::<_, PendingOperationRow>(&format!("{SELECT_OPERATION} WHERE id = ?1"))
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await?;

        row.map(map_pending_operation).transpose()
    }

    async fn list_unsynced_operations(&self) -> Result<Vec<PendingOperation>, AppError> {
        let rows = sqlx::query_as::<_, PendingOperationRow>(&format!(
            "{SELECT_OPERATION} WHERE synced = 0 ORDER BY enqueued_at ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(map_pending_operation).collect()
    }

    async fn mark_operation_synced(
        &self,
        id: OperationId,
        synced_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE pending_operations
            SET synced = 1, synced_at = ?1
            WHERE id = ?2 AND synced = 0
            "#,
        )
        .bind(synced_at.timestamp_millis())
        .bind(id.value())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_operation_failure(
        &self,
        id: OperationId,
        error: &str,
        attempted_at: DateTime<Utc>,
    ) -> Result<Option<u32>, AppError> {
        let retry_count: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE pending_operations
            SET retry_count = retry_count + 1, last_error = ?1, last_attempt_at = ?2
            WHERE id = ?3 AND synced = 0
            RETURNING retry_count
            "#,
        )
        .bind(error)
        .bind(attempted_at.timestamp_millis())
        .bind(id.value())
        .fetch_optional(&self.pool)
        .await?;

        Ok(retry_count.map(|(count,)| u32::try_from(count.max(0)).unwrap_or(u32::MAX)))
    }

    async fn delete_operation(&self, id: OperationId) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM pending_operations WHERE id = ?1")
            .bind(id.value())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_failed_operations(&self, max_retries: u32) -> Result<u64, AppError> {
        let result =
            sqlx::query("DELETE FROM pending_operations WHERE synced = 0 AND retry_count >= ?1")
                .bind(i64::from(max_retries))
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    async fn delete_unsynced_for_attachment(
        &self,
        operation_type: OperationType,
        attachment_id: &AttachmentId,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            DELETE FROM pending_operations
            WHERE synced = 0 AND operation_type = ?1 AND attachment_id = ?2
            "#,
        )
        .bind(operation_type.as_str())
        .bind(attachment_id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn purge_synced_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            "DELETE FROM pending_operations WHERE synced = 1 AND synced_at IS NOT NULL AND synced_at < ?1",
        )
        .bind(cutoff.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn queue_counts(&self, max_retries: u32) -> Result<QueueCounts, AppError> {
        let grouped: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT operation_type, COUNT(*)
            FROM pending_operations
            WHERE synced = 0
            GROUP BY operation_type
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut pending_by_type = BTreeMap::new();
        for (operation_type, count) in grouped {
            let kind: OperationType = operation_type
                .parse()
                .map_err(|err: String| AppError::Storage(format!("corrupt row: {err}")))?;
            pending_by_type.insert(kind, count.max(0) as u64);
        }

        let (failed,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM pending_operations WHERE synced = 0 AND retry_count >= ?1",
        )
        .bind(i64::from(max_retries))
        .fetch_one(&self.pool)
        .await?;

        let latest_error: Option<(Option<String>,)> = sqlx::query_as(
            r#"
            SELECT last_error FROM pending_operations
            WHERE synced = 0 AND last_error IS NOT NULL
            ORDER BY last_attempt_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(QueueCounts {
            pending_by_type,
            failed: failed.max(0) as u64,
            latest_error: latest_error.and_then(|(error,)| error),
        })
    }

    async fn put_attachment(&self, record: &AttachmentRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO attachments (
                id, owner_id, encoded_payload, mime_type, phase, byte_size, width, height,
                sha256, captured_at, uploaded, uploaded_at, marked_for_deletion
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT(id) DO UPDATE SET
                owner_id = excluded.owner_id,
                encoded_payload = excluded.encoded_payload,
                mime_type = excluded.mime_type,
                phase = excluded.phase,
                byte_size = excluded.byte_size,
                width = excluded.width,
                height = excluded.height,
                sha256 = excluded.sha256,
                captured_at = excluded.captured_at,
                uploaded = excluded.uploaded,
                uploaded_at = excluded.uploaded_at,
                marked_for_deletion = excluded.marked_for_deletion
            "#,
        )
        .bind(record.id.as_str())
        .bind(record.owner_id.as_str())
        .bind(record.encoded_payload.as_deref())
        .bind(&record.mime_type)
        .bind(record.phase.as_str())
        .bind(i64::try_from(record.byte_size).unwrap_or(i64::MAX))
        .bind(i64::from(record.width))
        .bind(i64::from(record.height))
        .bind(&record.sha256)
        .bind(record.captured_at.timestamp_millis())
        .bind(record.uploaded)
        .bind(record.uploaded_at.map(|at| at.timestamp_millis()))
        .bind(record.marked_for_deletion)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_attachment(
        &self,
        id: &AttachmentId,
    ) -> Result<Option<AttachmentRecord>, AppError> {
        let row = sqlx::query_as::<_, AttachmentRow>(&format!("{SELECT_ATTACHMENT} WHERE id = ?1"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(map_attachment).transpose()
    }

    async fn list_attachments(
        &self,
        owner_id: &EntityId,
    ) -> Result<Vec<AttachmentRecord>, AppError> {
        let rows = sqlx::query_as::<_, AttachmentRow>(&format!(
            "{SELECT_ATTACHMENT} WHERE owner_id = ?1 ORDER BY captured_at ASC, id ASC"
        ))
        .bind(owner_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(map_attachment).collect()
    }

    async fn mark_attachment_uploaded(
        &self,
        id: &AttachmentId,
        uploaded_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE attachments
            SET uploaded = 1, uploaded_at = ?1, encoded_payload = NULL
            WHERE id = ?2
            "#,
        )
        .bind(uploaded_at.timestamp_millis())
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_attachment_for_deletion(&self, id: &AttachmentId) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE attachments SET marked_for_deletion = 1 WHERE id = ?1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_attachment(&self, id: &AttachmentId) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM attachments WHERE id = ?1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_metadata(&self, key: &str) -> Result<Option<String>, AppError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM sync_metadata WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(value,)| value))
    }

    async fn set_metadata(&self, key: &str, value: &str) -> Result<(), AppError> {
        Self::upsert_metadata(&self.pool, key, value).await
    }

    async fn clear_all(&self) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        for table in [
            "cached_entities",
            "attachments",
            "pending_operations",
            "sync_metadata",
        ] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
