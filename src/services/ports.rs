//! Narrow capability contracts over the metadata store and its neighbors.
//!
//! Use cases depend on these instead of the full repository so tests can
//! inject fixtures per concern. `Repository` implements all of them.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

use crate::database::models::{
    ChatMessageRow, ChatSessionRow, DocumentChunkRow, DocumentPageRow, IndexedDocumentRow,
    PromptTemplateRow, UploadDocumentRow,
};
use crate::database::Repository;
use crate::models::api::SourceReference;
use crate::models::DocumentChunk;
use crate::services::event_bus::{EventBus, SystemEvent};

/// Read access to the external upload context.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UploadGateway: Send + Sync {
    async fn get_upload_document(&self, upload_document_id: i32) -> Result<Option<UploadDocumentRow>>;
    async fn get_document_pages(&self, upload_document_id: i32) -> Result<Vec<DocumentPageRow>>;
    async fn get_preview_image_path(
        &self,
        upload_document_id: i32,
        page_number: i32,
    ) -> Result<Option<String>>;
}

/// Indexed-document records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IndexedDocumentStore: Send + Sync {
    async fn insert(
        &self,
        upload_document_id: i32,
        collection_name: &str,
        total_chunks: i32,
        embedding_model: &str,
    ) -> Result<IndexedDocumentRow>;
    async fn update(&self, id: i32, total_chunks: i32, embedding_model: &str)
        -> Result<IndexedDocumentRow>;
    async fn get(&self, id: i32) -> Result<Option<IndexedDocumentRow>>;
    async fn get_by_upload_id(&self, upload_document_id: i32) -> Result<Option<IndexedDocumentRow>>;
    async fn delete(&self, id: i32) -> Result<bool>;
}

/// Chunk records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChunkStore: Send + Sync {
    async fn insert_batch(
        &self,
        indexed_document_id: i32,
        chunks: &[DocumentChunk],
    ) -> Result<usize>;
    async fn delete_by_indexed_document_id(&self, indexed_document_id: i32) -> Result<u64>;
    async fn get_by_indexed_document_id(
        &self,
        indexed_document_id: i32,
    ) -> Result<Vec<DocumentChunkRow>>;
    async fn get_by_chunk_id(&self, chunk_id: &str) -> Result<Option<DocumentChunkRow>>;
}

/// Chat sessions and messages.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn create_session(&self, user_id: i32, session_name: &str) -> Result<ChatSessionRow>;
    async fn get_session(&self, session_id: i32) -> Result<Option<ChatSessionRow>>;
    async fn rename_session(
        &self,
        session_id: i32,
        session_name: &str,
    ) -> Result<Option<ChatSessionRow>>;
    async fn list_sessions_by_user(&self, user_id: i32) -> Result<Vec<ChatSessionRow>>;
    async fn delete_session(&self, session_id: i32) -> Result<bool>;
    #[allow(clippy::too_many_arguments)]
    async fn insert_message<'a>(
        &self,
        session_id: i32,
        role: &str,
        content: &str,
        source_chunk_ids: &[String],
        confidence_scores: &HashMap<String, f32>,
        source_references: &[SourceReference],
        ai_model_used: Option<&'a str>,
    ) -> Result<ChatMessageRow>;
    async fn get_messages_by_session(&self, session_id: i32) -> Result<Vec<ChatMessageRow>>;
}

/// Active prompt templates per document type.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PromptTemplateSource: Send + Sync {
    async fn get_active_for_document_type(
        &self,
        document_type: &str,
    ) -> Result<Option<PromptTemplateRow>>;
}

/// Domain event publication.
#[cfg_attr(test, mockall::automock)]
pub trait EventSink: Send + Sync {
    fn publish(&self, event: SystemEvent);
}

// ===== Repository implementations =====

#[async_trait]
impl UploadGateway for Repository {
    async fn get_upload_document(&self, upload_document_id: i32) -> Result<Option<UploadDocumentRow>> {
        Repository::get_upload_document(self, upload_document_id).await
    }

    async fn get_document_pages(&self, upload_document_id: i32) -> Result<Vec<DocumentPageRow>> {
        Repository::get_document_pages(self, upload_document_id).await
    }

    async fn get_preview_image_path(
        &self,
        upload_document_id: i32,
        page_number: i32,
    ) -> Result<Option<String>> {
        Repository::get_preview_image_path(self, upload_document_id, page_number).await
    }
}

#[async_trait]
impl IndexedDocumentStore for Repository {
    async fn insert(
        &self,
        upload_document_id: i32,
        collection_name: &str,
        total_chunks: i32,
        embedding_model: &str,
    ) -> Result<IndexedDocumentRow> {
        self.insert_indexed_document(
            upload_document_id,
            collection_name,
            total_chunks,
            embedding_model,
        )
        .await
    }

    async fn update(
        &self,
        id: i32,
        total_chunks: i32,
        embedding_model: &str,
    ) -> Result<IndexedDocumentRow> {
        self.update_indexed_document(id, total_chunks, embedding_model)
            .await
    }

    async fn get(&self, id: i32) -> Result<Option<IndexedDocumentRow>> {
        self.get_indexed_document(id).await
    }

    async fn get_by_upload_id(
        &self,
        upload_document_id: i32,
    ) -> Result<Option<IndexedDocumentRow>> {
        self.get_indexed_document_by_upload_id(upload_document_id).await
    }

    async fn delete(&self, id: i32) -> Result<bool> {
        self.delete_indexed_document(id).await
    }
}

#[async_trait]
impl ChunkStore for Repository {
    async fn insert_batch(
        &self,
        indexed_document_id: i32,
        chunks: &[DocumentChunk],
    ) -> Result<usize> {
        self.insert_chunks_batch(indexed_document_id, chunks).await
    }

    async fn delete_by_indexed_document_id(&self, indexed_document_id: i32) -> Result<u64> {
        self.delete_chunks_by_indexed_document_id(indexed_document_id)
            .await
    }

    async fn get_by_indexed_document_id(
        &self,
        indexed_document_id: i32,
    ) -> Result<Vec<DocumentChunkRow>> {
        self.get_chunks_by_indexed_document_id(indexed_document_id)
            .await
    }

    async fn get_by_chunk_id(&self, chunk_id: &str) -> Result<Option<DocumentChunkRow>> {
        self.get_chunk_by_chunk_id(chunk_id).await
    }
}

#[async_trait]
impl ChatStore for Repository {
    async fn create_session(&self, user_id: i32, session_name: &str) -> Result<ChatSessionRow> {
        Repository::create_session(self, user_id, session_name).await
    }

    async fn get_session(&self, session_id: i32) -> Result<Option<ChatSessionRow>> {
        Repository::get_session(self, session_id).await
    }

    async fn rename_session(
        &self,
        session_id: i32,
        session_name: &str,
    ) -> Result<Option<ChatSessionRow>> {
        Repository::rename_session(self, session_id, session_name).await
    }

    async fn list_sessions_by_user(&self, user_id: i32) -> Result<Vec<ChatSessionRow>> {
        Repository::list_sessions_by_user(self, user_id).await
    }

    async fn delete_session(&self, session_id: i32) -> Result<bool> {
        Repository::delete_session(self, session_id).await
    }

    async fn insert_message<'a>(
        &self,
        session_id: i32,
        role: &str,
        content: &str,
        source_chunk_ids: &[String],
        confidence_scores: &HashMap<String, f32>,
        source_references: &[SourceReference],
        ai_model_used: Option<&'a str>,
    ) -> Result<ChatMessageRow> {
        Repository::insert_message(
            self,
            session_id,
            role,
            content,
            source_chunk_ids,
            confidence_scores,
            source_references,
            ai_model_used,
        )
        .await
    }

    async fn get_messages_by_session(&self, session_id: i32) -> Result<Vec<ChatMessageRow>> {
        Repository::get_messages_by_session(self, session_id).await
    }
}

#[async_trait]
impl PromptTemplateSource for Repository {
    async fn get_active_for_document_type(
        &self,
        document_type: &str,
    ) -> Result<Option<PromptTemplateRow>> {
        self.get_active_prompt_template(document_type).await
    }
}

impl EventSink for EventBus {
    fn publish(&self, event: SystemEvent) {
        EventBus::publish(self, event);
    }
}
