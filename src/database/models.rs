use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::HashMap;

use crate::models::api::SourceReference;

/// Row in `rag_indexed_documents`. One per fully ingested source document.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct IndexedDocumentRow {
    pub id: i32,
    pub upload_document_id: i32,
    pub qdrant_collection_name: String,
    pub total_chunks: i32,
    pub embedding_model: String,
    pub indexed_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

/// Row in `rag_document_chunks`. Never updated in place; re-index deletes
/// and recreates.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DocumentChunkRow {
    pub id: i32,
    pub rag_indexed_document_id: i32,
    pub chunk_id: String,
    pub chunk_text: String,
    pub chunk_index: i32,
    pub page_numbers: Json<Vec<i32>>,
    pub heading_hierarchy: Json<Vec<String>>,
    pub chunk_type: String,
    pub token_count: i32,
    pub sentence_count: Option<i32>,
    pub has_overlap: bool,
    pub overlap_sentence_count: i32,
    pub qdrant_point_id: String,
    pub created_at: DateTime<Utc>,
}

/// Row in `rag_chat_sessions`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ChatSessionRow {
    pub id: i32,
    pub user_id: i32,
    pub session_name: String,
    pub created_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

/// Row in `rag_chat_messages`. User messages carry no source references.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ChatMessageRow {
    pub id: i32,
    pub session_id: i32,
    pub role: String,
    pub content: String,
    pub source_chunk_ids: Json<Vec<String>>,
    pub confidence_scores: Json<HashMap<String, f32>>,
    pub source_references: Json<Vec<SourceReference>>,
    pub ai_model_used: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ===== Gateway rows (external upload context, read-only) =====

/// Upload-context document as the RAG core sees it.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UploadDocumentRow {
    pub id: i32,
    pub title: String,
    pub document_type: String,
    pub status: String,
}

/// One page of an uploaded document with its vision-AI JSON blob.
#[derive(Debug, Clone, FromRow)]
pub struct DocumentPageRow {
    pub page_number: i32,
    pub preview_image_path: Option<String>,
    pub vision_json: Option<Json<Value>>,
}

/// Active prompt template of a document type.
#[derive(Debug, Clone, FromRow, Deserialize, Serialize)]
pub struct PromptTemplateRow {
    pub id: i32,
    pub name: String,
    pub prompt_text: String,
    pub status: String,
}

/// Per-document-type aggregate for the counts endpoint.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DocumentTypeCountRow {
    pub document_type: String,
    pub indexed_count: i64,
}
