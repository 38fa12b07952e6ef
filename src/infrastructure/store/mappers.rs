use super::rows::{AttachmentRow, CachedEntityRow, PendingOperationRow};
use crate::domain::entities::{AttachmentRecord, CachedEntity, OperationPayload, PendingOperation};
use crate::domain::value_objects::{
    AttachmentId, Collection, EntityId, OperationId, OperationType, PhotoPhase,
};
use crate::shared::error::AppError;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};

pub(super) fn millis_to_datetime(value: i64) -> Result<DateTime<Utc>, AppError> {
    Utc.timestamp_millis_opt(value)
        .single()
        .ok_or_else(|| corrupt(format!("invalid timestamp: {value}")))
}

fn optional_millis(value: Option<i64>) -> Result<Option<DateTime<Utc>>, AppError> {
    value.map(millis_to_datetime).transpose()
}

fn corrupt(message: impl Into<String>) -> AppError {
    AppError::Storage(format!("corrupt row: {}", message.into()))
}

pub(super) fn map_cached_entity(row: CachedEntityRow) -> Result<CachedEntity, AppError> {
    let data: Map<String, Value> = match serde_json::from_str(&row.data)
        .map_err(|err| corrupt(format!("entity data: {err}")))?
    {
        Value::Object(map) => map,
        _ => return Err(corrupt("entity data is not an object")),
    };

    Ok(CachedEntity {
        collection: Collection::new(row.collection).map_err(corrupt)?,
        id: EntityId::new(row.entity_id).map_err(corrupt)?,
        data,
        cached_at: millis_to_datetime(row.cached_at)?,
    })
}

pub(super) fn map_pending_operation(row: PendingOperationRow) -> Result<PendingOperation, AppError> {
    let operation_type: OperationType = row.operation_type.parse().map_err(corrupt)?;
    let payload: OperationPayload = serde_json::from_str(&row.payload)
        .map_err(|err| corrupt(format!("operation {} payload: {err}", row.id)))?;
    if payload.operation_type() != operation_type {
        return Err(corrupt(format!(
            "operation {} type {} does not match payload {}",
            row.id,
            operation_type,
            payload.operation_type()
        )));
    }

    Ok(PendingOperation {
        id: OperationId::new(row.id).map_err(corrupt)?,
        operation_type,
        collection: Collection::new(row.collection).map_err(corrupt)?,
        target_id: EntityId::new(row.target_id).map_err(corrupt)?,
        payload,
        enqueued_at: millis_to_datetime(row.enqueued_at)?,
        retry_count: u32::try_from(row.retry_count.max(0)).unwrap_or(u32::MAX),
        last_error: row.last_error,
        last_attempt_at: optional_millis(row.last_attempt_at)?,
        synced: row.synced,
        synced_at: optional_millis(row.synced_at)?,
    })
}

pub(super) fn map_attachment(row: AttachmentRow) -> Result<AttachmentRecord, AppError> {
    let phase: PhotoPhase = row.phase.parse().map_err(corrupt)?;

    Ok(AttachmentRecord {
        id: AttachmentId::new(row.id).map_err(corrupt)?,
        owner_id: EntityId::new(row.owner_id).map_err(corrupt)?,
        encoded_payload: row.encoded_payload,
        mime_type: row.mime_type,
        phase,
        byte_size: u64::try_from(row.byte_size).map_err(|_| corrupt("negative byte size"))?,
        width: u32::try_from(row.width).map_err(|_| corrupt("invalid width"))?,
        height: u32::try_from(row.height).map_err(|_| corrupt("invalid height"))?,
        sha256: row.sha256,
        captured_at: millis_to_datetime(row.captured_at)?,
        uploaded: row.uploaded,
        uploaded_at: optional_millis(row.uploaded_at)?,
        marked_for_deletion: row.marked_for_deletion,
    })
}
