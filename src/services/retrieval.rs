//! Retrieval Service: query validation, hybrid search, reranking, filter
//! helpers.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::embedding::{EmbeddingError, EmbeddingProvider};
use crate::utils::error::ApiError;
use crate::utils::limiters::Limiters;
use crate::utils::similarity::text_relevance;
use crate::vector::{SearchFilters, VectorHit, VectorStore};

const MIN_QUERY_CHARS: usize = 3;
const MAX_QUERY_CHARS: usize = 1000;

const EMBED_TIMEOUT: Duration = Duration::from_secs(10);
const SEARCH_TIMEOUT: Duration = Duration::from_secs(15);

/// One ranked result, ready for prompt composition.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub chunk_id: String,
    pub point_id: String,
    pub score: f32,
    pub payload: serde_json::Value,
}

impl SearchResult {
    fn from_hit(hit: VectorHit) -> Self {
        let chunk_id = hit
            .chunk_id()
            .map(str::to_string)
            .unwrap_or_else(|| hit.point_id.clone());
        Self {
            chunk_id,
            point_id: hit.point_id,
            score: hit.score,
            payload: hit.payload,
        }
    }

    pub fn chunk_text(&self) -> &str {
        self.payload
            .get("chunk_text")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
    }
}

pub struct RetrievalService {
    embedding: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    collection_name: String,
    limiters: Arc<Limiters>,
}

impl RetrievalService {
    pub fn new(
        embedding: Arc<dyn EmbeddingProvider>,
        vector_store: Arc<dyn VectorStore>,
        collection_name: String,
        limiters: Arc<Limiters>,
    ) -> Self {
        Self {
            embedding,
            vector_store,
            collection_name,
            limiters,
        }
    }

    /// Queries must be 3-1000 characters after trimming.
    pub fn validate_query(query: &str) -> Result<(), ApiError> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(ApiError::BadRequest(
                "Suchanfrage darf nicht leer sein".to_string(),
            ));
        }
        if trimmed.len() < MIN_QUERY_CHARS {
            return Err(ApiError::BadRequest(
                "Suchanfrage muss mindestens 3 Zeichen lang sein".to_string(),
            ));
        }
        if query.len() > MAX_QUERY_CHARS {
            return Err(ApiError::BadRequest(
                "Suchanfrage ist zu lang (max. 1000 Zeichen)".to_string(),
            ));
        }
        Ok(())
    }

    /// Hints shown next to ad-hoc search results.
    pub fn suggest_improvements(query: &str) -> Vec<String> {
        let mut suggestions = Vec::new();
        let lower = query.to_lowercase();

        if query.len() < 10 {
            suggestions
                .push("Verwende spezifischere Begriffe für bessere Ergebnisse".to_string());
        }

        let question_words = ["was", "wie", "wo", "wann", "warum", "wer"];
        if !question_words.iter().any(|w| lower.contains(w)) {
            suggestions.push(
                "Formuliere deine Anfrage als Frage für bessere Ergebnisse".to_string(),
            );
        }

        let generic_words = ["dokument", "text", "information", "daten"];
        if generic_words.iter().any(|w| lower.contains(w)) {
            suggestions
                .push("Verwende spezifischere Begriffe statt allgemeiner Wörter".to_string());
        }

        suggestions
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, ApiError> {
        let slot = self
            .limiters
            .checkout(&self.limiters.embedding, "query_embedding")
            .await
            .map_err(|e| ApiError::EmbeddingError(e.to_string()))?;
        debug!(
            wait_ms = slot.waited.as_millis() as u64,
            op = "query_embedding",
            "wait_queue"
        );

        match tokio::time::timeout(EMBED_TIMEOUT, self.embedding.generate(query)).await {
            Ok(Ok(embedding)) => Ok(embedding.vector),
            Ok(Err(EmbeddingError::RateLimited(detail))) => {
                warn!("Query embedding rate limited: {}", detail);
                Err(ApiError::EmbeddingError(format!("Rate limited: {}", detail)))
            }
            Ok(Err(error)) => {
                warn!("Query embedding failed: {}", error);
                Err(ApiError::EmbeddingError(error.to_string()))
            }
            Err(_) => {
                warn!("Query embedding timeout after {:?}", EMBED_TIMEOUT);
                Err(ApiError::Timeout("Embedding timeout".to_string()))
            }
        }
    }

    /// Default path: validate, embed, hybrid (or pure vector) search.
    pub async fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
        top_k: usize,
        score_threshold: f32,
        use_hybrid: bool,
    ) -> Result<Vec<SearchResult>, ApiError> {
        Self::validate_query(query)?;

        let query_vector = self.embed_query(query).await?;

        let _slot = self
            .limiters
            .checkout(&self.limiters.vector_search, "vector_search")
            .await
            .map_err(|e| ApiError::VectorStoreError(e.to_string()))?;
        debug!(
            wait_ms = _slot.waited.as_millis() as u64,
            op = "vector_search",
            "wait_queue"
        );

        let exec_start = Instant::now();
        let search_future = async {
            if use_hybrid {
                self.vector_store
                    .search_hybrid(
                        &self.collection_name,
                        &query_vector,
                        query,
                        filters,
                        top_k,
                        score_threshold,
                    )
                    .await
            } else {
                self.vector_store
                    .search(
                        &self.collection_name,
                        &query_vector,
                        filters,
                        top_k,
                        score_threshold,
                    )
                    .await
            }
        };

        let hits = match tokio::time::timeout(SEARCH_TIMEOUT, search_future).await {
            Ok(Ok(hits)) => hits,
            Ok(Err(error)) => {
                warn!("Vector search failed: {}", error);
                return Err(ApiError::VectorStoreError(error.to_string()));
            }
            Err(_) => {
                warn!("Vector search timeout after {:?}", SEARCH_TIMEOUT);
                return Err(ApiError::Timeout("Search timeout".to_string()));
            }
        };
        debug!(
            exec_ms = exec_start.elapsed().as_millis() as u64,
            results = hits.len(),
            "vector_search"
        );

        Ok(hits.into_iter().map(SearchResult::from_hit).collect())
    }

    /// Rerank path: over-fetch 3x at a relaxed threshold, reweight with
    /// `0.6 * vector + 0.4 * text_relevance`, trim to top_k.
    pub async fn search_with_reranking(
        &self,
        query: &str,
        filters: &SearchFilters,
        top_k: usize,
        score_threshold: f32,
    ) -> Result<Vec<SearchResult>, ApiError> {
        let mut results = self
            .search(query, filters, top_k * 3, score_threshold * 0.8, true)
            .await?;

        for result in &mut results {
            let relevance = text_relevance(query, result.chunk_text());
            result.score = result.score * 0.6 + relevance * 0.4;
        }
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(top_k);

        Ok(results)
    }

    pub async fn search_by_document_type(
        &self,
        query: &str,
        document_type: &str,
        top_k: usize,
        score_threshold: f32,
    ) -> Result<Vec<SearchResult>, ApiError> {
        let filters = SearchFilters::by_document_type(document_type);
        self.search(query, &filters, top_k, score_threshold, true).await
    }

    pub async fn search_by_page_range(
        &self,
        query: &str,
        page_numbers: Vec<i32>,
        top_k: usize,
        score_threshold: f32,
    ) -> Result<Vec<SearchResult>, ApiError> {
        let filters = SearchFilters::by_page_range(page_numbers);
        self.search(query, &filters, top_k, score_threshold, true).await
    }

    pub async fn search_with_filters(
        &self,
        query: &str,
        filters: SearchFilters,
        top_k: usize,
        score_threshold: f32,
    ) -> Result<Vec<SearchResult>, ApiError> {
        self.search(query, &filters, top_k, score_threshold, true).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::LimitsConfig;
    use crate::services::embedding::{EmbeddingProvider, LocalEmbeddingProvider};
    use crate::vector::memory::InMemoryVectorStore;
    use crate::vector::VectorPoint;
    use serde_json::json;

    fn limiters() -> Arc<Limiters> {
        Arc::new(Limiters::new(&LimitsConfig {
            embedding_concurrency: 4,
            vector_search_concurrency: 4,
            llm_generate_concurrency: 2,
            acquire_timeout_ms: 1000,
        }))
    }

    async fn service_with_chunks(texts: &[(&str, &str)]) -> RetrievalService {
        let embedding: Arc<dyn EmbeddingProvider> = Arc::new(LocalEmbeddingProvider::new(None));
        let store = Arc::new(InMemoryVectorStore::new());
        store.ensure_collection("rag_documents", 384).await.unwrap();

        let mut points = Vec::new();
        for (chunk_id, text) in texts {
            let vector = embedding.generate(text).await.unwrap().vector;
            points.push(VectorPoint {
                id: crate::utils::point_id::point_id_for_chunk(chunk_id),
                vector,
                payload: json!({
                    "document_id": 1,
                    "document_type": "SOP",
                    "page_numbers": [1],
                    "chunk_id": chunk_id,
                    "chunk_text": text,
                    "chunk_type": "text",
                    "heading_hierarchy": [],
                    "token_count": 10
                }),
            });
        }
        store.upsert_batch("rag_documents", points).await.unwrap();

        RetrievalService::new(embedding, store, "rag_documents".to_string(), limiters())
    }

    #[test]
    fn test_query_validation_bounds() {
        assert!(RetrievalService::validate_query("ab").is_err());
        assert!(RetrievalService::validate_query("   ").is_err());
        assert!(RetrievalService::validate_query(&"x".repeat(1001)).is_err());
        assert!(RetrievalService::validate_query("Was passiert in Schritt 6?").is_ok());
    }

    #[tokio::test]
    async fn test_exact_text_query_finds_its_chunk() {
        let service = service_with_chunks(&[
            ("doc_1_page_1_step_6", "Prozessschritt 6: Fehlerprüfung"),
            ("doc_1_page_1_step_7", "Prozessschritt 7: Dokumentation"),
        ])
        .await;

        // Hybrid search for a chunk's own text must surface that chunk.
        let results = service
            .search(
                "Prozessschritt 6: Fehlerprüfung",
                &SearchFilters::default(),
                5,
                0.3,
                true,
            )
            .await
            .unwrap();

        assert!(!results.is_empty());
        assert_eq!(results[0].chunk_id, "doc_1_page_1_step_6");
    }

    #[tokio::test]
    async fn test_no_match_filters_return_empty_not_error() {
        let service =
            service_with_chunks(&[("doc_1_page_1_text_0", "Inhalt ohne Bezug")]).await;

        let filters = SearchFilters::by_document_type("Datenblatt");
        let results = service
            .search("beliebige Frage", &filters, 5, 0.1, true)
            .await
            .unwrap();

        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_reranking_trims_to_top_k() {
        let service = service_with_chunks(&[
            ("doc_1_page_1_text_0", "Sicherheitswarnung Kleber Augen"),
            ("doc_1_page_1_text_1", "Lagerung kühl und trocken"),
            ("doc_1_page_1_text_2", "Entsorgung über Sondermüll"),
            ("doc_1_page_1_text_3", "Erste Hilfe bei Hautkontakt"),
        ])
        .await;

        let results = service
            .search_with_reranking(
                "Sicherheitswarnung Kleber",
                &SearchFilters::default(),
                2,
                0.05,
            )
            .await
            .unwrap();

        assert!(results.len() <= 2);
        if results.len() == 2 {
            assert!(results[0].score >= results[1].score);
        }
    }

    #[test]
    fn test_suggestions() {
        let suggestions = RetrievalService::suggest_improvements("dokument");
        assert!(!suggestions.is_empty());

        let good = RetrievalService::suggest_improvements(
            "Wie lange muss der Kleber aushärten bevor belastet wird?",
        );
        assert!(good.is_empty());
    }
}
