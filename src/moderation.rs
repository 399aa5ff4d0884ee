use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::models::{Event, EventEdit, PendingEvent, Role};
use crate::store::{ModerationStore, StoreError};

#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("admin role required")]
    Forbidden,
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ModerationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ModerationError::NotFound(what),
            other => ModerationError::Store(other),
        }
    }
}

#[derive(Clone)]
pub struct ModerationService {
    store: Arc<dyn ModerationStore>,
}

impl ModerationService {
    pub fn new(store: Arc<dyn ModerationStore>) -> Self {
        Self { store }
    }

    /// Role lookup failures count as "not an admin".
    pub async fn is_admin(&self, user_id: &str) -> bool {
        match self.store.role_for(user_id).await {
            Ok(role) => role == Some(Role::Admin),
            Err(err) => {
                warn!(%user_id, error = %err, "role lookup failed");
                false
            }
        }
    }

    /// Hands out a [`Moderator`] only to signed-in admins.
    pub async fn authorize(&self, user_id: Option<&str>) -> Result<Moderator, ModerationError> {
        let Some(user_id) = user_id.map(str::trim).filter(|id| !id.is_empty()) else {
            return Err(ModerationError::Forbidden);
        };
        if !self.is_admin(user_id).await {
            return Err(ModerationError::Forbidden);
        }
        Ok(Moderator {
            store: Arc::clone(&self.store),
            user_id: user_id.to_string(),
        })
    }
}

/// Moderation actions for an authorized admin.
pub struct Moderator {
    store: Arc<dyn ModerationStore>,
    user_id: String,
}

impl Moderator {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub async fn queue(&self) -> Result<Vec<PendingEvent>, ModerationError> {
        Ok(self.store.pending_queue().await?)
    }

    #[instrument(skip(self), fields(admin = %self.user_id))]
    pub async fn approve(&self, id: &str) -> Result<Event, ModerationError> {
        let event = self.store.approve_pending(id).await?;
        info!("event approved");
        Ok(event)
    }

    #[instrument(skip(self), fields(admin = %self.user_id))]
    pub async fn reject(&self, id: &str) -> Result<(), ModerationError> {
        self.store.reject_pending(id).await?;
        info!("event rejected");
        Ok(())
    }

    #[instrument(skip(self, edit), fields(admin = %self.user_id))]
    pub async fn edit(&self, id: &str, edit: &EventEdit) -> Result<PendingEvent, ModerationError> {
        Ok(self.store.update_pending(id, edit).await?)
    }
}
