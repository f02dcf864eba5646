use axum::extract::State;
use axum::Json;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::models::api::{SearchRequest, SearchResponse, SearchResultItem};
use crate::services::retrieval::{RetrievalService, SearchResult};
use crate::state::AppState;
use crate::utils::error::ApiError;
use crate::vector::SearchFilters;

/// POST /api/rag/search — ad-hoc search without chat persistence.
pub async fn search_documents(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    info!(query = %request.query, top_k = request.top_k, "Search request");

    let filters = SearchFilters {
        document_id: None,
        document_type: request.document_type.clone(),
        page_numbers: request.page_numbers.clone(),
    };

    let start = Instant::now();
    let results = if request.use_hybrid_search {
        state
            .retrieval
            .search_with_reranking(
                &request.query,
                &filters,
                request.top_k,
                request.score_threshold,
            )
            .await?
    } else {
        state
            .retrieval
            .search(
                &request.query,
                &filters,
                request.top_k,
                request.score_threshold,
                false,
            )
            .await?
    };
    let search_time_ms = start.elapsed().as_millis() as u64;

    let items: Vec<SearchResultItem> = results.iter().map(result_item).collect();
    let total_results = items.len();

    Ok(Json(SearchResponse {
        results: items,
        total_results,
        query: request.query.clone(),
        search_time_ms,
        suggestions: RetrievalService::suggest_improvements(&request.query),
    }))
}

fn result_item(result: &SearchResult) -> SearchResultItem {
    let payload = &result.payload;
    SearchResultItem {
        chunk_id: result.chunk_id.clone(),
        score: result.score,
        document_id: payload
            .get("document_id")
            .and_then(Value::as_i64)
            .unwrap_or(0) as i32,
        document_type: payload
            .get("document_type")
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
            .to_string(),
        page_numbers: payload
            .get("page_numbers")
            .and_then(Value::as_array)
            .map(|pages| pages.iter().filter_map(Value::as_i64).map(|p| p as i32).collect())
            .unwrap_or_default(),
        chunk_type: payload
            .get("chunk_type")
            .and_then(Value::as_str)
            .unwrap_or("text")
            .to_string(),
        text: result.chunk_text().to_string(),
    }
}
