use crate::application::ports::RemoteReader;
use crate::domain::entities::ConflictCheck;
use crate::domain::value_objects::{Collection, EntityId};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::warn;

/// Last-writer-wins with notification: a conflict is reported when the remote
/// entity changed after the operation was queued. It never blocks the apply.
pub struct ConflictDetector {
    reader: Arc<dyn RemoteReader>,
}

impl ConflictDetector {
    pub fn new(reader: Arc<dyn RemoteReader>) -> Self {
        Self { reader }
    }

    pub async fn check(
        &self,
        collection: &Collection,
        target_id: &EntityId,
        enqueued_at: DateTime<Utc>,
    ) -> ConflictCheck {
        // Locally generated ids have no remote copy yet.
        if target_id.is_local() {
            return ConflictCheck::clear(None);
        }

        match self.reader.modified_at(collection, target_id).await {
            Ok(Some(remote_version)) => ConflictCheck {
                has_conflict: remote_version > enqueued_at,
                remote_version: Some(remote_version),
            },
            Ok(None) => ConflictCheck::clear(None),
            Err(err) => {
                warn!(
                    target: "fieldsync::dispatcher",
                    collection = %collection,
                    target_id = %target_id,
                    error = %err,
                    "remote version unknown; conflict check skipped"
                );
                ConflictCheck::clear(None)
            }
        }
    }
}
