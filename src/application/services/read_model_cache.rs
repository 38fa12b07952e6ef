use crate::application::ports::{LocalStore, RemoteReader};
use crate::domain::entities::{CachedEntity, FieldPatch, NetworkState};
use crate::domain::value_objects::{Collection, EntityId};
use crate::shared::error::AppError;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, info, warn};

const REFRESHED_AT_PREFIX: &str = "refreshed_at:";

fn refreshed_at_key(scope: &Collection) -> String {
    format!("{REFRESHED_AT_PREFIX}{scope}")
}

/// Cached-or-remote reads over the local mirror of remote collections.
pub struct ReadModelCache {
    store: Arc<dyn LocalStore>,
    reader: Arc<dyn RemoteReader>,
    network: watch::Receiver<NetworkState>,
    freshness: chrono::Duration,
    in_flight: Mutex<HashSet<Collection>>,
}

impl ReadModelCache {
    pub fn new(
        store: Arc<dyn LocalStore>,
        reader: Arc<dyn RemoteReader>,
        network: watch::Receiver<NetworkState>,
        freshness: chrono::Duration,
    ) -> Self {
        Self {
            store,
            reader,
            network,
            freshness,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Fetches the scope from the remote and swaps it into the store in one
    /// transaction.
    pub async fn refresh(&self, scope: &Collection) -> Result<Vec<CachedEntity>, AppError> {
        let records = self
            .reader
            .fetch_collection(scope)
            .await
            .map_err(|err| AppError::RemoteApply(format!("refresh {scope}: {err}")))?;

        let now = Utc::now();
        let entities: Vec<CachedEntity> = records
            .into_iter()
            .map(|record| CachedEntity {
                collection: scope.clone(),
                id: record.id,
                data: record.data,
                cached_at: now,
            })
            .collect();

        let marker_key = refreshed_at_key(scope);
        let marker_value = now.timestamp_millis().to_string();
        self.store
            .replace_collection(scope, &entities, Some((&marker_key, &marker_value)))
            .await?;

        info!(
            target: "fieldsync::cache",
            collection = %scope,
            entities = entities.len(),
            "collection refreshed"
        );
        Ok(entities)
    }

    /// Serves the local copy. When online, a stale scope is refreshed in the
    /// background; a scope that was never fetched is fetched inline.
    pub async fn get_cached_or_remote(
        self: &Arc<Self>,
        scope: &Collection,
    ) -> Result<Vec<CachedEntity>, AppError> {
        let cached = self.store.query_entities(scope, &|_| true).await?;
        if !self.is_online() {
            return Ok(cached);
        }

        let last_refreshed = self.last_refreshed(scope).await?;
        if last_refreshed.is_none() && cached.is_empty() {
            return match self.refresh(scope).await {
                Ok(fresh) => Ok(fresh),
                Err(err) => {
                    warn!(
                        target: "fieldsync::cache",
                        collection = %scope,
                        error = %err,
                        "initial fetch failed; serving empty cache"
                    );
                    Ok(cached)
                }
            };
        }

        let stale = last_refreshed.map_or(true, |at| Utc::now() - at > self.freshness);
        if stale {
            self.spawn_refresh(scope.clone());
        }
        Ok(cached)
    }

    pub async fn get(
        &self,
        scope: &Collection,
        id: &EntityId,
    ) -> Result<Option<CachedEntity>, AppError> {
        self.store.get_entity(scope, id).await
    }

    /// Optimistically patches the cached record, creating it when absent.
    /// Independent of whether the matching operation has been drained.
    pub async fn update_locally(
        &self,
        scope: &Collection,
        id: &EntityId,
        patch: &FieldPatch,
    ) -> Result<CachedEntity, AppError> {
        let now = Utc::now();
        let entity = match self.store.get_entity(scope, id).await? {
            Some(mut entity) => {
                entity.apply_patch(patch, now);
                entity
            }
            None => CachedEntity {
                collection: scope.clone(),
                id: id.clone(),
                data: patch.fields().clone(),
                cached_at: now,
            },
        };
        self.store.put_entity(&entity).await?;
        debug!(
            target: "fieldsync::cache",
            collection = %scope,
            id = %id,
            fields = patch.fields().len(),
            "optimistic update applied"
        );
        Ok(entity)
    }

    pub async fn last_refreshed(
        &self,
        scope: &Collection,
    ) -> Result<Option<DateTime<Utc>>, AppError> {
        let Some(raw) = self.store.get_metadata(&refreshed_at_key(scope)).await? else {
            return Ok(None);
        };
        let millis = raw
            .parse::<i64>()
            .map_err(|_| AppError::Storage(format!("corrupt refresh marker for {scope}: {raw}")))?;
        Ok(Utc.timestamp_millis_opt(millis).single())
    }

    /// Drops every cached entity and refresh marker. The operation log is
    /// untouched.
    pub async fn clear(&self) -> Result<(), AppError> {
        self.store.clear_entities().await?;
        info!(target: "fieldsync::cache", "read-model cache cleared");
        Ok(())
    }

    fn is_online(&self) -> bool {
        self.network.borrow().is_online
    }

    fn spawn_refresh(self: &Arc<Self>, scope: Collection) {
        {
            let Ok(mut in_flight) = self.in_flight.lock() else {
                return;
            };
            if !in_flight.insert(scope.clone()) {
                return;
            }
        }

        let cache = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = cache.refresh(&scope).await {
                warn!(
                    target: "fieldsync::cache",
                    collection = %scope,
                    error = %err,
                    "background refresh failed"
                );
            }
            if let Ok(mut in_flight) = cache.in_flight.lock() {
                in_flight.remove(&scope);
            }
        });
    }
}
