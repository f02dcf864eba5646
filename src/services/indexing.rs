//! Indexing Use Case: pages → chunks → embeddings → vectors → metadata.
//!
//! Idempotent per upload document: a re-run deletes prior chunk rows and
//! vector points before inserting, so the final state is a function of the
//! current vision JSON alone. Concurrent runs for the same document are
//! serialized by a per-document lock; distinct documents index in parallel.

use chrono::Utc;
use dashmap::DashMap;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::embedding::{EmbeddingError, EmbeddingProvider};
use super::event_bus::SystemEvent;
use super::ports::{ChunkStore, EventSink, IndexedDocumentStore, PromptTemplateSource, UploadGateway};
use crate::database::models::{IndexedDocumentRow, UploadDocumentRow};
use crate::database::repository::vision_json_of_page;
use crate::document::{ChunkBuilder, ChunkingEngine, ChunkingStrategy};
use crate::models::DocumentChunk;
use crate::utils::error::ApiError;
use crate::vector::{VectorPoint, VectorStore};

const EMBED_BATCH_TIMEOUT: Duration = Duration::from_secs(120);
const VECTOR_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct IndexOutcome {
    pub document: IndexedDocumentRow,
    pub chunks_created: usize,
    pub old_chunks_deleted: usize,
}

pub struct IndexingService {
    upload_gateway: Arc<dyn UploadGateway>,
    indexed_docs: Arc<dyn IndexedDocumentStore>,
    chunk_store: Arc<dyn ChunkStore>,
    prompt_source: Arc<dyn PromptTemplateSource>,
    embedding: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    events: Arc<dyn EventSink>,
    collection_name: String,
    batch_size: usize,
    document_locks: DashMap<i32, Arc<Mutex<()>>>,
}

impl IndexingService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        upload_gateway: Arc<dyn UploadGateway>,
        indexed_docs: Arc<dyn IndexedDocumentStore>,
        chunk_store: Arc<dyn ChunkStore>,
        prompt_source: Arc<dyn PromptTemplateSource>,
        embedding: Arc<dyn EmbeddingProvider>,
        vector_store: Arc<dyn VectorStore>,
        events: Arc<dyn EventSink>,
        collection_name: String,
        batch_size: usize,
    ) -> Self {
        Self {
            upload_gateway,
            indexed_docs,
            chunk_store,
            prompt_source,
            embedding,
            vector_store,
            events,
            collection_name,
            batch_size: batch_size.max(1),
            document_locks: DashMap::new(),
        }
    }

    fn lock_for(&self, upload_document_id: i32) -> Arc<Mutex<()>> {
        self.document_locks
            .entry(upload_document_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Index one approved document.
    pub async fn index_document(
        &self,
        upload_document_id: i32,
        force_reindex: bool,
    ) -> Result<IndexOutcome, ApiError> {
        let lock = self.lock_for(upload_document_id);
        let _guard = lock.lock().await;

        let upload = self
            .upload_gateway
            .get_upload_document(upload_document_id)
            .await
            .map_err(|e| ApiError::DatabaseError(e.to_string()))?
            .ok_or_else(|| {
                ApiError::NotFound(format!("Document {} not found", upload_document_id))
            })?;

        if !upload.status.eq_ignore_ascii_case("approved") {
            return Err(ApiError::BadRequest(format!(
                "Document must be approved for indexing (status: {})",
                upload.status
            )));
        }

        let existing = self
            .indexed_docs
            .get_by_upload_id(upload_document_id)
            .await
            .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

        let mut old_chunks_deleted = 0;
        if let Some(existing) = &existing {
            if !force_reindex {
                return Err(ApiError::BadRequest(format!(
                    "Document {} is already indexed; set force_reindex to rebuild",
                    upload_document_id
                )));
            }
            old_chunks_deleted = self.delete_previous_state(existing).await?;
        }

        let (document, chunks_created) = self.run_pipeline(&upload, existing).await?;

        self.events.publish(SystemEvent::DocumentIndexed {
            upload_document_id,
            chunk_count: chunks_created,
            timestamp: Utc::now(),
        });

        Ok(IndexOutcome {
            document,
            chunks_created,
            old_chunks_deleted,
        })
    }

    /// Re-index by indexed-document id: drop all derived state, rebuild from
    /// the current vision JSON, report old and new chunk counts.
    pub async fn reindex_document(
        &self,
        indexed_document_id: i32,
    ) -> Result<IndexOutcome, ApiError> {
        let indexed = self
            .indexed_docs
            .get(indexed_document_id)
            .await
            .map_err(|e| ApiError::DatabaseError(e.to_string()))?
            .ok_or_else(|| {
                ApiError::NotFound(format!(
                    "Indexed document {} not found",
                    indexed_document_id
                ))
            })?;

        let lock = self.lock_for(indexed.upload_document_id);
        let _guard = lock.lock().await;

        let upload = self
            .upload_gateway
            .get_upload_document(indexed.upload_document_id)
            .await
            .map_err(|e| ApiError::DatabaseError(e.to_string()))?
            .ok_or_else(|| {
                ApiError::NotFound(format!(
                    "Source document {} of indexed document {} not found",
                    indexed.upload_document_id, indexed_document_id
                ))
            })?;

        let old_chunks_deleted = self.delete_previous_state(&indexed).await?;
        let (document, chunks_created) = self.run_pipeline(&upload, Some(indexed)).await?;

        self.events.publish(SystemEvent::DocumentReindexed {
            upload_document_id: upload.id,
            old_chunk_count: old_chunks_deleted,
            new_chunk_count: chunks_created,
            timestamp: Utc::now(),
        });

        Ok(IndexOutcome {
            document,
            chunks_created,
            old_chunks_deleted,
        })
    }

    async fn delete_previous_state(
        &self,
        indexed: &IndexedDocumentRow,
    ) -> Result<usize, ApiError> {
        let deleted_points = tokio::time::timeout(
            VECTOR_TIMEOUT,
            self.vector_store
                .delete_by_document(&self.collection_name, indexed.upload_document_id),
        )
        .await
        .map_err(|_| ApiError::Timeout("Vector delete timeout".to_string()))?
        .map_err(|e| ApiError::VectorStoreError(e.to_string()))?;

        let deleted_rows = self
            .chunk_store
            .delete_by_indexed_document_id(indexed.id)
            .await
            .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

        info!(
            upload_document_id = indexed.upload_document_id,
            deleted_points, deleted_rows, "Removed previous index state"
        );

        Ok(deleted_rows as usize)
    }

    /// Steps 3-8 of the pipeline: chunk, embed, upsert, persist.
    async fn run_pipeline(
        &self,
        upload: &UploadDocumentRow,
        existing: Option<IndexedDocumentRow>,
    ) -> Result<(IndexedDocumentRow, usize), ApiError> {
        let pages = self
            .upload_gateway
            .get_document_pages(upload.id)
            .await
            .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

        // Prompt template first, vision JSON second.
        let prompt_text = match self
            .prompt_source
            .get_active_for_document_type(&upload.document_type)
            .await
        {
            Ok(template) => template.map(|t| t.prompt_text),
            Err(error) => {
                warn!(%error, document_type = %upload.document_type, "Prompt template lookup failed");
                None
            }
        };

        let first_json = pages.iter().find_map(vision_json_of_page);
        let strategy = ChunkingStrategy::select(
            prompt_text.as_deref(),
            first_json.as_ref().unwrap_or(&serde_json::Value::Null),
        );
        info!(
            upload_document_id = upload.id,
            document_type = %upload.document_type,
            strategy = strategy.as_str(),
            pages = pages.len(),
            "Indexing document"
        );

        let mut builder = ChunkBuilder::new(upload.id);
        for page in &pages {
            let Some(vision_json) = vision_json_of_page(page) else {
                debug!(page = page.page_number, "Page has no vision JSON, skipping");
                continue;
            };
            ChunkingEngine::chunk_page(&mut builder, page.page_number, &vision_json, strategy);
        }

        let chunks: Vec<DocumentChunk> = builder
            .finish()
            .into_iter()
            .filter(|chunk| match chunk.validate() {
                Ok(()) => true,
                Err(error) => {
                    warn!(chunk_id = %chunk.chunk_id, %error, "Dropping invalid chunk");
                    false
                }
            })
            .collect();

        let embeddings = self.embed_chunks(&chunks).await?;
        let embedding_model = embeddings
            .first()
            .map(|e| e.model.clone())
            .unwrap_or_else(|| self.embedding.info().model);

        if !chunks.is_empty() {
            tokio::time::timeout(
                VECTOR_TIMEOUT,
                self.vector_store
                    .ensure_collection(&self.collection_name, self.embedding.dimensions()),
            )
            .await
            .map_err(|_| ApiError::Timeout("Vector store timeout".to_string()))?
            .map_err(|e| ApiError::VectorStoreError(e.to_string()))?;

            let points: Vec<VectorPoint> = chunks
                .iter()
                .zip(&embeddings)
                .map(|(chunk, embedding)| VectorPoint {
                    id: chunk.point_id(),
                    vector: embedding.vector.clone(),
                    payload: json!({
                        "document_id": upload.id,
                        "document_type": upload.document_type,
                        "page_numbers": chunk.metadata.page_numbers,
                        "chunk_id": chunk.chunk_id,
                        "chunk_text": chunk.text,
                        "chunk_type": chunk.metadata.chunk_type.as_str(),
                        "heading_hierarchy": chunk.metadata.heading_hierarchy,
                        "token_count": chunk.metadata.token_count
                    }),
                })
                .collect();

            let inserted = tokio::time::timeout(
                VECTOR_TIMEOUT,
                self.vector_store.upsert_batch(&self.collection_name, points),
            )
            .await
            .map_err(|_| ApiError::Timeout("Vector upsert timeout".to_string()))?
            .map_err(|e| ApiError::VectorStoreError(e.to_string()))?;

            if inserted != chunks.len() {
                // Partial batch: report the precise count and fail the run;
                // re-index recovers the consistent state.
                return Err(ApiError::VectorStoreError(format!(
                    "Vector batch incomplete: {} of {} points inserted",
                    inserted,
                    chunks.len()
                )));
            }
        }

        let document = match existing {
            Some(existing) => self
                .indexed_docs
                .update(existing.id, chunks.len() as i32, &embedding_model)
                .await
                .map_err(|e| ApiError::DatabaseError(e.to_string()))?,
            None => self
                .indexed_docs
                .insert(
                    upload.id,
                    &self.collection_name,
                    chunks.len() as i32,
                    &embedding_model,
                )
                .await
                .map_err(|e| ApiError::DatabaseError(e.to_string()))?,
        };

        if !chunks.is_empty() {
            self.chunk_store
                .insert_batch(document.id, &chunks)
                .await
                .map_err(|e| ApiError::DatabaseError(e.to_string()))?;
        }

        info!(
            upload_document_id = upload.id,
            indexed_document_id = document.id,
            chunks = chunks.len(),
            model = %embedding_model,
            "Document indexed"
        );

        Ok((document, chunks.len()))
    }

    /// Batched embedding, order preserved. Rate limits are reported as such
    /// so operators can back off and retry the run.
    async fn embed_chunks(
        &self,
        chunks: &[DocumentChunk],
    ) -> Result<Vec<super::embedding::EmbeddingVector>, ApiError> {
        let mut embeddings = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();

            let batch_result =
                tokio::time::timeout(EMBED_BATCH_TIMEOUT, self.embedding.generate_batch(&texts))
                    .await
                    .map_err(|_| ApiError::Timeout("Embedding batch timeout".to_string()))?;

            match batch_result {
                Ok(vectors) => embeddings.extend(vectors),
                Err(EmbeddingError::RateLimited(detail)) => {
                    return Err(ApiError::EmbeddingError(format!(
                        "Embedding provider rate limited on chunk batch: {}",
                        detail
                    )));
                }
                Err(error) => {
                    return Err(ApiError::EmbeddingError(error.to_string()));
                }
            }
        }

        Ok(embeddings)
    }
}
