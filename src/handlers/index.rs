use axum::extract::{Path, Query, State};
use axum::Json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::database::models::IndexedDocumentRow;
use crate::models::api::{
    IndexDocumentRequest, IndexDocumentResponse, IndexedDocumentInfo, ListDocumentsParams,
    ReindexDocumentResponse,
};
use crate::state::AppState;
use crate::utils::error::ApiError;

/// POST /api/rag/documents/index
pub async fn index_document(
    State(state): State<Arc<AppState>>,
    Json(request): Json<IndexDocumentRequest>,
) -> Result<Json<IndexDocumentResponse>, ApiError> {
    info!(
        upload_document_id = request.upload_document_id,
        force_reindex = request.force_reindex,
        "Index request"
    );

    if let Some(user_id) = request.user_id {
        state.permissions.require_index(user_id).await?;
    }

    let start = Instant::now();
    let outcome = state
        .indexing
        .index_document(request.upload_document_id, request.force_reindex)
        .await?;
    let processing_time_ms = start.elapsed().as_millis() as u64;

    let document = enrich_document(&state, &outcome.document).await;
    let message = format!(
        "Dokument erfolgreich indexiert. {} Chunks erstellt.",
        outcome.chunks_created
    );

    Ok(Json(IndexDocumentResponse {
        success: true,
        document,
        chunks_created: outcome.chunks_created,
        processing_time_ms,
        message,
    }))
}

/// POST /api/rag/documents/{id}/reindex
pub async fn reindex_document(
    State(state): State<Arc<AppState>>,
    Path(indexed_document_id): Path<i32>,
) -> Result<Json<ReindexDocumentResponse>, ApiError> {
    info!(indexed_document_id, "Reindex request");

    let start = Instant::now();
    let outcome = state.indexing.reindex_document(indexed_document_id).await?;
    let processing_time_ms = start.elapsed().as_millis() as u64;

    let document = enrich_document(&state, &outcome.document).await;
    let message = format!(
        "Dokument erfolgreich re-indexiert. {} alte Chunks gelöscht, {} neue Chunks erstellt.",
        outcome.old_chunks_deleted, outcome.chunks_created
    );

    Ok(Json(ReindexDocumentResponse {
        success: true,
        document,
        old_chunks_deleted: outcome.old_chunks_deleted,
        new_chunks_created: outcome.chunks_created,
        processing_time_ms,
        message,
    }))
}

/// GET /api/rag/documents
pub async fn list_documents(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListDocumentsParams>,
) -> Result<Json<Vec<IndexedDocumentInfo>>, ApiError> {
    let page = params.page.max(1);
    let size = params.size.clamp(1, 100);
    let offset = ((page - 1) * size) as i64;

    let rows = state
        .repository
        .list_indexed_documents(size as i64, offset)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    let mut documents = Vec::with_capacity(rows.len());
    for row in &rows {
        documents.push(enrich_document(&state, row).await);
    }

    if let Some(status) = &params.status {
        documents.retain(|d| d.status.eq_ignore_ascii_case(status));
    }
    if let Some(document_type) = &params.document_type {
        documents.retain(|d| d.document_type.eq_ignore_ascii_case(document_type));
    }

    Ok(Json(documents))
}

/// GET /api/rag/documents/types/counts
pub async fn document_type_counts(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HashMap<String, i64>>, ApiError> {
    let counts = state
        .repository
        .document_type_counts()
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    Ok(Json(
        counts
            .into_iter()
            .map(|row| (row.document_type, row.indexed_count))
            .collect(),
    ))
}

async fn enrich_document(state: &AppState, row: &IndexedDocumentRow) -> IndexedDocumentInfo {
    let upload = state
        .repository
        .get_upload_document(row.upload_document_id)
        .await
        .ok()
        .flatten();

    IndexedDocumentInfo {
        id: row.id,
        upload_document_id: row.upload_document_id,
        document_title: upload
            .as_ref()
            .map(|u| u.title.clone())
            .unwrap_or_else(|| format!("Dokument {}", row.upload_document_id)),
        document_type: upload
            .map(|u| u.document_type)
            .unwrap_or_else(|| "Unknown".to_string()),
        status: if row.total_chunks > 0 {
            "indexed".to_string()
        } else {
            "processing".to_string()
        },
        indexed_at: row.indexed_at,
        total_chunks: row.total_chunks,
        last_updated: row.last_updated_at,
    }
}
