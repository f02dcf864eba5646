use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ===== Indexing =====

#[derive(Debug, Deserialize)]
pub struct IndexDocumentRequest {
    pub upload_document_id: i32,
    #[serde(default)]
    pub force_reindex: bool,
    #[serde(default)]
    pub user_id: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct IndexedDocumentInfo {
    pub id: i32,
    pub upload_document_id: i32,
    pub document_title: String,
    pub document_type: String,
    pub status: String,
    pub indexed_at: DateTime<Utc>,
    pub total_chunks: i32,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct IndexDocumentResponse {
    pub success: bool,
    pub document: IndexedDocumentInfo,
    pub chunks_created: usize,
    pub processing_time_ms: u64,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ReindexDocumentResponse {
    pub success: bool,
    pub document: IndexedDocumentInfo,
    pub old_chunks_deleted: usize,
    pub new_chunks_created: usize,
    pub processing_time_ms: u64,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ListDocumentsParams {
    pub status: Option<String>,
    pub document_type: Option<String>,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub size: usize,
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    20
}

// ===== Chat =====

#[derive(Debug, Deserialize)]
pub struct AskQuestionRequest {
    pub question: String,
    #[serde(default)]
    pub session_id: Option<i32>,
    #[serde(default)]
    pub user_id: Option<i32>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,
    #[serde(default)]
    pub filters: Option<QuestionFilters>,
    #[serde(default = "default_true")]
    pub use_hybrid_search: bool,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_top_k() -> usize {
    5
}

fn default_score_threshold() -> f32 {
    0.7
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuestionFilters {
    pub document_type: Option<String>,
    pub document_type_id: Option<i32>,
    #[serde(default)]
    pub interest_group_ids: Vec<i32>,
}

/// Denormalized pointer from an assistant answer back to the chunk and page
/// preview it used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceReference {
    pub document_id: i32,
    pub document_title: String,
    pub page_number: i32,
    pub chunk_id: String,
    pub preview_image_path: String,
    pub relevance_score: f32,
    pub text_excerpt: String,
}

impl SourceReference {
    pub fn new(
        document_id: i32,
        document_title: String,
        page_number: i32,
        chunk_id: String,
        preview_image_path: String,
        relevance_score: f32,
        text_excerpt: String,
    ) -> Self {
        Self {
            document_id,
            document_title,
            page_number,
            chunk_id,
            preview_image_path,
            relevance_score: relevance_score.clamp(0.0, 1.0),
            text_excerpt,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AskQuestionResponse {
    pub answer: String,
    pub session_id: Option<i32>,
    pub source_references: Vec<SourceReference>,
    pub model_used: String,
    pub processing_time_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub user_id: i32,
    pub session_name: String,
}

#[derive(Debug, Serialize)]
pub struct ChatSessionResponse {
    pub id: i32,
    pub user_id: i32,
    pub session_name: String,
    pub created_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

#[derive(Debug, Serialize)]
pub struct ChatMessageResponse {
    pub id: i32,
    pub role: String,
    pub content: String,
    pub source_references: Vec<SourceReference>,
    pub ai_model_used: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ChatHistoryResponse {
    pub session_id: i32,
    pub messages: Vec<ChatMessageResponse>,
    pub total_messages: usize,
}

#[derive(Debug, Deserialize)]
pub struct ListSessionsParams {
    pub user_id: i32,
}

// ===== Search =====

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub page_numbers: Option<Vec<i32>>,
    #[serde(default = "default_true")]
    pub use_hybrid_search: bool,
}

#[derive(Debug, Serialize)]
pub struct SearchResultItem {
    pub chunk_id: String,
    pub score: f32,
    pub document_id: i32,
    pub document_type: String,
    pub page_numbers: Vec<i32>,
    pub chunk_type: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResultItem>,
    pub total_results: usize,
    pub query: String,
    pub search_time_ms: u64,
    pub suggestions: Vec<String>,
}

// ===== Diagnostics =====

#[derive(Debug, Serialize)]
pub struct SystemInfoResponse {
    pub vector_store: serde_json::Value,
    pub embedding_provider: serde_json::Value,
    pub total_documents: i64,
    pub total_chunks: i64,
    pub available_options: HashMap<&'static str, Vec<&'static str>>,
}

#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub overall_status: String,
    pub services: HashMap<String, String>,
    pub errors: Vec<String>,
    pub timestamp: DateTime<Utc>,
}
