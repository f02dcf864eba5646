use std::sync::Arc;
use tracing::{debug, warn};

use crate::database::Repository;
use crate::utils::error::ApiError;

/// RAG permission gate. The policy itself lives outside the core (database
/// functions maintained by the access-control context); this service only
/// enforces the boolean answers.
pub struct PermissionService {
    repository: Arc<Repository>,
}

impl PermissionService {
    pub fn new(repository: Arc<Repository>) -> Self {
        Self { repository }
    }

    pub async fn can_ask(&self, user_id: i32) -> Result<bool, ApiError> {
        let allowed = self
            .repository
            .can_ask(user_id)
            .await
            .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

        if allowed {
            debug!("User {} may ask questions", user_id);
        } else {
            warn!("User {} denied chat access", user_id);
        }
        Ok(allowed)
    }

    pub async fn can_index(&self, user_id: i32) -> Result<bool, ApiError> {
        let allowed = self
            .repository
            .can_index(user_id)
            .await
            .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

        if allowed {
            debug!("User {} may index documents", user_id);
        } else {
            warn!("User {} denied indexing access", user_id);
        }
        Ok(allowed)
    }

    pub async fn require_ask(&self, user_id: i32) -> Result<(), ApiError> {
        if !self.can_ask(user_id).await? {
            return Err(ApiError::Forbidden(format!(
                "User {} is not allowed to use the RAG chat",
                user_id
            )));
        }
        Ok(())
    }

    pub async fn require_index(&self, user_id: i32) -> Result<(), ApiError> {
        if !self.can_index(user_id).await? {
            return Err(ApiError::Forbidden(format!(
                "User {} is not allowed to index documents",
                user_id
            )));
        }
        Ok(())
    }
}
