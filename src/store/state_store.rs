//! Dual-store for onboarding state.
//!
//! Full state lives in the ephemeral cache; a step-only mirror lives in
//! the durable database. Writes go to both and fail only when both sides
//! fail. Reads prefer the cache and silently resynthesize from the mirror
//! when the cache copy is gone.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::StateError;
use crate::onboarding::state::{OnboardingState, OnboardingStep};
use crate::store::cache::EphemeralStore;
use crate::store::traits::Database;

pub struct StateStore {
    cache: Arc<dyn EphemeralStore>,
    db: Arc<dyn Database>,
    ttl: Duration,
}

impl StateStore {
    pub fn new(cache: Arc<dyn EphemeralStore>, db: Arc<dyn Database>, ttl: Duration) -> Self {
        Self { cache, db, ttl }
    }

    fn key(user_id: Uuid) -> String {
        format!("onboarding:{user_id}")
    }

    /// Write the full state to the cache and the step mirror to the
    /// database. Succeeds if at least one side took the write.
    pub async fn save(&self, user_id: Uuid, state: &OnboardingState) -> Result<(), StateError> {
        let cache_result = match serde_json::to_value(state) {
            Ok(value) => {
                self.cache
                    .set_with_ttl(&Self::key(user_id), value, self.ttl)
                    .await
            }
            Err(e) => Err(StateError::Cache(format!("serialize: {e}"))),
        };
        if let Err(e) = &cache_result {
            warn!(user_id = %user_id, error = %e, "Cache write for onboarding state failed");
        }

        let backup_result = self
            .db
            .save_onboarding_backup(user_id, state.step.as_str(), state.updated_at)
            .await;
        if let Err(e) = &backup_result {
            warn!(user_id = %user_id, error = %e, "Durable backup for onboarding state failed");
        }

        match (cache_result, backup_result) {
            (Err(cache_err), Err(backup_err)) => Err(StateError::BothStoresFailed {
                user_id,
                reason: format!("cache: {cache_err}; backup: {backup_err}"),
            }),
            _ => Ok(()),
        }
    }

    /// Load the state, preferring the cache. On a cache miss (eviction,
    /// restart, corruption) the durable step mirror is used to resume at
    /// the recorded step without telling the user anything was lost.
    pub async fn load(&self, user_id: Uuid) -> Result<Option<OnboardingState>, StateError> {
        match self.cache.get(&Self::key(user_id)).await {
            Ok(Some(value)) => match serde_json::from_value::<OnboardingState>(value) {
                Ok(state) if !state.is_expired(self.ttl) => return Ok(Some(state)),
                Ok(_) => {
                    debug!(user_id = %user_id, "Cached onboarding state expired");
                    let _ = self.cache.delete(&Self::key(user_id)).await;
                }
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "Corrupt cached onboarding state, falling back to backup");
                    let _ = self.cache.delete(&Self::key(user_id)).await;
                }
            },
            Ok(None) => {}
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Cache read for onboarding state failed");
            }
        }

        let backup = self
            .db
            .load_onboarding_backup(user_id)
            .await
            .map_err(|e| StateError::Cache(format!("backup read: {e}")))?;

        match backup {
            Some((step_name, updated_at)) => {
                // An unparseable step name means the backup row is junk.
                // Treat it as absent so onboarding restarts cleanly instead
                // of erroring the whole turn.
                let step = match step_name.parse::<OnboardingStep>() {
                    Ok(step) => step,
                    Err(e) => {
                        warn!(user_id = %user_id, step = %step_name, error = %e, "Unreadable onboarding backup, treating as absent");
                        return Ok(None);
                    }
                };
                let mut state = OnboardingState::resume_at(step);
                state.updated_at = updated_at;
                if state.is_expired(self.ttl) {
                    debug!(user_id = %user_id, "Onboarding backup expired");
                    return Ok(None);
                }
                info!(user_id = %user_id, step = %step, "Recovered onboarding state from durable backup");
                // Refresh the cache so the next read is fast again.
                if let Err(e) = self.save(user_id, &state).await {
                    warn!(user_id = %user_id, error = %e, "Failed to re-cache recovered state");
                }
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    /// Remove the state from both sides. Best effort on each; only a
    /// double failure is an error.
    pub async fn delete(&self, user_id: Uuid) -> Result<(), StateError> {
        let cache_result = self.cache.delete(&Self::key(user_id)).await;
        if let Err(e) = &cache_result {
            warn!(user_id = %user_id, error = %e, "Cache delete for onboarding state failed");
        }

        let backup_result = self
            .db
            .delete_onboarding_backup(user_id)
            .await
            .map_err(|e| StateError::Cache(format!("backup delete: {e}")));
        if let Err(e) = &backup_result {
            warn!(user_id = %user_id, error = %e, "Durable backup delete failed");
        }

        match (cache_result, backup_result) {
            (Err(cache_err), Err(backup_err)) => Err(StateError::BothStoresFailed {
                user_id,
                reason: format!("cache: {cache_err}; backup: {backup_err}"),
            }),
            _ => Ok(()),
        }
    }
}
