use axum::extract::State;
use axum::Json;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;

use crate::models::api::{HealthCheckResponse, SystemInfoResponse};
use crate::models::rag_options::RagOptions;
use crate::state::AppState;
use crate::utils::error::ApiError;

/// GET /api/rag/health — aggregate status over all backends.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthCheckResponse> {
    let mut services = HashMap::new();
    let mut errors = Vec::new();

    match state.repository.ping().await {
        Ok(()) => {
            services.insert("database".to_string(), "healthy".to_string());
        }
        Err(error) => {
            services.insert("database".to_string(), "unhealthy".to_string());
            errors.push(format!("Database: {}", error));
        }
    }

    match state
        .vector_store
        .collection_info(&state.settings.qdrant.collection_name)
        .await
    {
        Ok(_) => {
            services.insert("vector_store".to_string(), "healthy".to_string());
        }
        Err(error) => {
            services.insert("vector_store".to_string(), "unhealthy".to_string());
            errors.push(format!("Vector store: {}", error));
        }
    }

    let embedding_info = state.embedding.info();
    services.insert(
        "embedding_provider".to_string(),
        format!("{} ({})", embedding_info.provider, embedding_info.model),
    );

    for (provider, configured) in state.llm.provider_status() {
        services.insert(
            format!("llm_{}", provider),
            if configured {
                "configured".to_string()
            } else {
                "no_api_key".to_string()
            },
        );
    }

    let overall_status = if errors.is_empty() {
        "healthy".to_string()
    } else if errors.len() < services.len() {
        "degraded".to_string()
    } else {
        "unhealthy".to_string()
    };

    Json(HealthCheckResponse {
        overall_status,
        services,
        errors,
        timestamp: Utc::now(),
    })
}

/// GET /api/rag/system/info — diagnostics.
pub async fn system_info(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SystemInfoResponse>, ApiError> {
    let vector_store = state
        .vector_store
        .collection_info(&state.settings.qdrant.collection_name)
        .await
        .map_err(|e| ApiError::VectorStoreError(e.to_string()))?;

    let total_documents = state
        .repository
        .count_indexed_documents()
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;
    let total_chunks = state
        .repository
        .count_chunks()
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    let embedding_provider = serde_json::to_value(state.embedding.info())
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    Ok(Json(SystemInfoResponse {
        vector_store,
        embedding_provider,
        total_documents,
        total_chunks,
        available_options: RagOptions::available_options(),
    }))
}
