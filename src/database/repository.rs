use anyhow::Result;
use chrono::Utc;
use serde_json::Value;
use sqlx::types::Json;
use std::collections::HashMap;
use tracing::debug;

use super::models::{
    ChatMessageRow, ChatSessionRow, DocumentChunkRow, DocumentPageRow, DocumentTypeCountRow,
    IndexedDocumentRow, PromptTemplateRow, UploadDocumentRow,
};
use super::DbPool;
use crate::models::api::SourceReference;
use crate::models::DocumentChunk;

pub struct Repository {
    pool: DbPool,
}

impl Repository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    // ===== Indexed documents =====

    pub async fn insert_indexed_document(
        &self,
        upload_document_id: i32,
        collection_name: &str,
        total_chunks: i32,
        embedding_model: &str,
    ) -> Result<IndexedDocumentRow> {
        let row = sqlx::query_as::<_, IndexedDocumentRow>(
            r#"INSERT INTO rag_indexed_documents
               (upload_document_id, qdrant_collection_name, total_chunks, embedding_model, indexed_at, last_updated_at)
               VALUES ($1, $2, $3, $4, $5, $5)
               RETURNING id, upload_document_id, qdrant_collection_name, total_chunks,
                         embedding_model, indexed_at, last_updated_at"#,
        )
        .bind(upload_document_id)
        .bind(collection_name)
        .bind(total_chunks)
        .bind(embedding_model)
        .bind(Utc::now())
        .fetch_one(self.pool.get_pool())
        .await?;

        Ok(row)
    }

    pub async fn update_indexed_document(
        &self,
        id: i32,
        total_chunks: i32,
        embedding_model: &str,
    ) -> Result<IndexedDocumentRow> {
        let row = sqlx::query_as::<_, IndexedDocumentRow>(
            r#"UPDATE rag_indexed_documents
               SET total_chunks = $2, embedding_model = $3, last_updated_at = $4
               WHERE id = $1
               RETURNING id, upload_document_id, qdrant_collection_name, total_chunks,
                         embedding_model, indexed_at, last_updated_at"#,
        )
        .bind(id)
        .bind(total_chunks)
        .bind(embedding_model)
        .bind(Utc::now())
        .fetch_one(self.pool.get_pool())
        .await?;

        Ok(row)
    }

    pub async fn get_indexed_document(&self, id: i32) -> Result<Option<IndexedDocumentRow>> {
        let row = sqlx::query_as::<_, IndexedDocumentRow>(
            r#"SELECT id, upload_document_id, qdrant_collection_name, total_chunks,
                      embedding_model, indexed_at, last_updated_at
               FROM rag_indexed_documents WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(self.pool.get_pool())
        .await?;

        Ok(row)
    }

    pub async fn get_indexed_document_by_upload_id(
        &self,
        upload_document_id: i32,
    ) -> Result<Option<IndexedDocumentRow>> {
        let row = sqlx::query_as::<_, IndexedDocumentRow>(
            r#"SELECT id, upload_document_id, qdrant_collection_name, total_chunks,
                      embedding_model, indexed_at, last_updated_at
               FROM rag_indexed_documents WHERE upload_document_id = $1"#,
        )
        .bind(upload_document_id)
        .fetch_optional(self.pool.get_pool())
        .await?;

        Ok(row)
    }

    pub async fn list_indexed_documents(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<IndexedDocumentRow>> {
        let rows = sqlx::query_as::<_, IndexedDocumentRow>(
            r#"SELECT id, upload_document_id, qdrant_collection_name, total_chunks,
                      embedding_model, indexed_at, last_updated_at
               FROM rag_indexed_documents
               ORDER BY indexed_at DESC
               LIMIT $1 OFFSET $2"#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(rows)
    }

    pub async fn delete_indexed_document(&self, id: i32) -> Result<bool> {
        let result = sqlx::query("DELETE FROM rag_indexed_documents WHERE id = $1")
            .bind(id)
            .execute(self.pool.get_pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn count_indexed_documents(&self) -> Result<i64> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM rag_indexed_documents")
                .fetch_one(self.pool.get_pool())
                .await?;

        Ok(count)
    }

    /// Indexed-document count per document type, joined through the upload
    /// context tables.
    pub async fn document_type_counts(&self) -> Result<Vec<DocumentTypeCountRow>> {
        let rows = sqlx::query_as::<_, DocumentTypeCountRow>(
            r#"SELECT dt.name AS document_type, COUNT(rid.id) AS indexed_count
               FROM rag_indexed_documents rid
               JOIN upload_documents ud ON ud.id = rid.upload_document_id
               JOIN document_types dt ON dt.id = ud.document_type_id
               GROUP BY dt.name
               ORDER BY dt.name"#,
        )
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(rows)
    }

    // ===== Chunks =====

    /// Insert all chunks of one indexing run in a single transaction,
    /// preserving the order produced by the chunking engine.
    pub async fn insert_chunks_batch(
        &self,
        indexed_document_id: i32,
        chunks: &[DocumentChunk],
    ) -> Result<usize> {
        let mut transaction = self.pool.get_pool().begin().await?;
        let now = Utc::now();

        for (index, chunk) in chunks.iter().enumerate() {
            sqlx::query(
                r#"INSERT INTO rag_document_chunks
                   (rag_indexed_document_id, chunk_id, chunk_text, chunk_index, page_numbers,
                    heading_hierarchy, chunk_type, token_count, sentence_count, has_overlap,
                    overlap_sentence_count, qdrant_point_id, created_at)
                   VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"#,
            )
            .bind(indexed_document_id)
            .bind(&chunk.chunk_id)
            .bind(&chunk.text)
            .bind(index as i32)
            .bind(Json(&chunk.metadata.page_numbers))
            .bind(Json(&chunk.metadata.heading_hierarchy))
            .bind(chunk.metadata.chunk_type.as_str())
            .bind(chunk.metadata.token_count as i32)
            .bind(chunk.metadata.sentence_count.map(|c| c as i32))
            .bind(chunk.metadata.has_overlap)
            .bind(chunk.metadata.overlap_sentence_count as i32)
            .bind(chunk.point_id())
            .bind(now)
            .execute(&mut *transaction)
            .await?;
        }

        transaction.commit().await?;
        debug!(
            "Inserted {} chunk rows for indexed document {}",
            chunks.len(),
            indexed_document_id
        );

        Ok(chunks.len())
    }

    pub async fn delete_chunks_by_indexed_document_id(
        &self,
        indexed_document_id: i32,
    ) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM rag_document_chunks WHERE rag_indexed_document_id = $1")
                .bind(indexed_document_id)
                .execute(self.pool.get_pool())
                .await?;

        Ok(result.rows_affected())
    }

    pub async fn get_chunks_by_indexed_document_id(
        &self,
        indexed_document_id: i32,
    ) -> Result<Vec<DocumentChunkRow>> {
        let rows = sqlx::query_as::<_, DocumentChunkRow>(
            r#"SELECT id, rag_indexed_document_id, chunk_id, chunk_text, chunk_index,
                      page_numbers, heading_hierarchy, chunk_type, token_count, sentence_count,
                      has_overlap, overlap_sentence_count, qdrant_point_id, created_at
               FROM rag_document_chunks
               WHERE rag_indexed_document_id = $1
               ORDER BY chunk_index"#,
        )
        .bind(indexed_document_id)
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(rows)
    }

    pub async fn get_chunk_by_chunk_id(&self, chunk_id: &str) -> Result<Option<DocumentChunkRow>> {
        let row = sqlx::query_as::<_, DocumentChunkRow>(
            r#"SELECT id, rag_indexed_document_id, chunk_id, chunk_text, chunk_index,
                      page_numbers, heading_hierarchy, chunk_type, token_count, sentence_count,
                      has_overlap, overlap_sentence_count, qdrant_point_id, created_at
               FROM rag_document_chunks
               WHERE chunk_id = $1"#,
        )
        .bind(chunk_id)
        .fetch_optional(self.pool.get_pool())
        .await?;

        Ok(row)
    }

    pub async fn count_chunks(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM rag_document_chunks")
            .fetch_one(self.pool.get_pool())
            .await?;

        Ok(count)
    }

    // ===== Chat sessions =====

    pub async fn create_session(&self, user_id: i32, session_name: &str) -> Result<ChatSessionRow> {
        let row = sqlx::query_as::<_, ChatSessionRow>(
            r#"INSERT INTO rag_chat_sessions (user_id, session_name, created_at, is_active)
               VALUES ($1, $2, $3, TRUE)
               RETURNING id, user_id, session_name, created_at, last_message_at, is_active"#,
        )
        .bind(user_id)
        .bind(session_name)
        .bind(Utc::now())
        .fetch_one(self.pool.get_pool())
        .await?;

        Ok(row)
    }

    pub async fn get_session(&self, session_id: i32) -> Result<Option<ChatSessionRow>> {
        let row = sqlx::query_as::<_, ChatSessionRow>(
            r#"SELECT id, user_id, session_name, created_at, last_message_at, is_active
               FROM rag_chat_sessions WHERE id = $1"#,
        )
        .bind(session_id)
        .fetch_optional(self.pool.get_pool())
        .await?;

        Ok(row)
    }

    pub async fn rename_session(
        &self,
        session_id: i32,
        session_name: &str,
    ) -> Result<Option<ChatSessionRow>> {
        let row = sqlx::query_as::<_, ChatSessionRow>(
            r#"UPDATE rag_chat_sessions SET session_name = $2 WHERE id = $1
               RETURNING id, user_id, session_name, created_at, last_message_at, is_active"#,
        )
        .bind(session_id)
        .bind(session_name)
        .fetch_optional(self.pool.get_pool())
        .await?;

        Ok(row)
    }

    pub async fn list_sessions_by_user(&self, user_id: i32) -> Result<Vec<ChatSessionRow>> {
        let rows = sqlx::query_as::<_, ChatSessionRow>(
            r#"SELECT id, user_id, session_name, created_at, last_message_at, is_active
               FROM rag_chat_sessions
               WHERE user_id = $1
               ORDER BY last_message_at DESC NULLS LAST, created_at DESC"#,
        )
        .bind(user_id)
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(rows)
    }

    /// Delete a session and cascade to its messages.
    pub async fn delete_session(&self, session_id: i32) -> Result<bool> {
        let mut transaction = self.pool.get_pool().begin().await?;

        sqlx::query("DELETE FROM rag_chat_messages WHERE session_id = $1")
            .bind(session_id)
            .execute(&mut *transaction)
            .await?;

        let result = sqlx::query("DELETE FROM rag_chat_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&mut *transaction)
            .await?;

        transaction.commit().await?;

        Ok(result.rows_affected() > 0)
    }

    // ===== Chat messages =====

    #[allow(clippy::too_many_arguments)]
    pub async fn insert_message(
        &self,
        session_id: i32,
        role: &str,
        content: &str,
        source_chunk_ids: &[String],
        confidence_scores: &HashMap<String, f32>,
        source_references: &[SourceReference],
        ai_model_used: Option<&str>,
    ) -> Result<ChatMessageRow> {
        let now = Utc::now();
        let mut transaction = self.pool.get_pool().begin().await?;

        let row = sqlx::query_as::<_, ChatMessageRow>(
            r#"INSERT INTO rag_chat_messages
               (session_id, role, content, source_chunk_ids, confidence_scores,
                source_references, ai_model_used, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               RETURNING id, session_id, role, content, source_chunk_ids, confidence_scores,
                         source_references, ai_model_used, created_at"#,
        )
        .bind(session_id)
        .bind(role)
        .bind(content)
        .bind(Json(source_chunk_ids))
        .bind(Json(confidence_scores))
        .bind(Json(source_references))
        .bind(ai_model_used)
        .bind(now)
        .fetch_one(&mut *transaction)
        .await?;

        sqlx::query("UPDATE rag_chat_sessions SET last_message_at = $2 WHERE id = $1")
            .bind(session_id)
            .bind(now)
            .execute(&mut *transaction)
            .await?;

        transaction.commit().await?;

        Ok(row)
    }

    /// Messages of one session in chronological order.
    pub async fn get_messages_by_session(&self, session_id: i32) -> Result<Vec<ChatMessageRow>> {
        let rows = sqlx::query_as::<_, ChatMessageRow>(
            r#"SELECT id, session_id, role, content, source_chunk_ids, confidence_scores,
                      source_references, ai_model_used, created_at
               FROM rag_chat_messages
               WHERE session_id = $1
               ORDER BY created_at, id"#,
        )
        .bind(session_id)
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(rows)
    }

    // ===== Upload context gateway (read-only) =====

    pub async fn get_upload_document(&self, upload_document_id: i32) -> Result<Option<UploadDocumentRow>> {
        let row = sqlx::query_as::<_, UploadDocumentRow>(
            r#"SELECT ud.id, ud.title, dt.name AS document_type, ud.status
               FROM upload_documents ud
               JOIN document_types dt ON dt.id = ud.document_type_id
               WHERE ud.id = $1"#,
        )
        .bind(upload_document_id)
        .fetch_optional(self.pool.get_pool())
        .await?;

        Ok(row)
    }

    /// Pages of an uploaded document with their vision-AI JSON, in page order.
    pub async fn get_document_pages(&self, upload_document_id: i32) -> Result<Vec<DocumentPageRow>> {
        let rows = sqlx::query_as::<_, DocumentPageRow>(
            r#"SELECT page_number, preview_image_path, vision_json
               FROM upload_document_pages
               WHERE upload_document_id = $1
               ORDER BY page_number"#,
        )
        .bind(upload_document_id)
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(rows)
    }

    pub async fn get_preview_image_path(
        &self,
        upload_document_id: i32,
        page_number: i32,
    ) -> Result<Option<String>> {
        let path = sqlx::query_scalar::<_, Option<String>>(
            r#"SELECT preview_image_path FROM upload_document_pages
               WHERE upload_document_id = $1 AND page_number = $2"#,
        )
        .bind(upload_document_id)
        .bind(page_number)
        .fetch_optional(self.pool.get_pool())
        .await?;

        Ok(path.flatten())
    }

    // ===== Prompt template gateway (read-only) =====

    /// Newest active prompt template of a document type, if any.
    pub async fn get_active_prompt_template(
        &self,
        document_type: &str,
    ) -> Result<Option<PromptTemplateRow>> {
        let row = sqlx::query_as::<_, PromptTemplateRow>(
            r#"SELECT pt.id, pt.name, pt.prompt_text, pt.status
               FROM prompt_templates pt
               JOIN document_types dt ON pt.document_type_id = dt.id
               WHERE dt.name = $1 AND pt.status = 'active'
               ORDER BY pt.created_at DESC
               LIMIT 1"#,
        )
        .bind(document_type)
        .fetch_optional(self.pool.get_pool())
        .await?;

        Ok(row)
    }

    // ===== Permission gateway =====

    pub async fn can_ask(&self, user_id: i32) -> Result<bool> {
        let allowed = sqlx::query_scalar::<_, bool>("SELECT rag_can_ask($1)")
            .bind(user_id)
            .fetch_one(self.pool.get_pool())
            .await?;

        Ok(allowed)
    }

    pub async fn can_index(&self, user_id: i32) -> Result<bool> {
        let allowed = sqlx::query_scalar::<_, bool>("SELECT rag_can_index($1)")
            .bind(user_id)
            .fetch_one(self.pool.get_pool())
            .await?;

        Ok(allowed)
    }

    // ===== Health =====

    pub async fn ping(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(self.pool.get_pool())
            .await?;

        Ok(())
    }
}

/// Convert stored vision JSON into the chunking engine's input value.
pub fn vision_json_of_page(page: &DocumentPageRow) -> Option<Value> {
    page.vision_json.as_ref().map(|json| json.0.clone())
}
