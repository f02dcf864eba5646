pub mod qdrant;

#[cfg(test)]
pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::similarity::text_relevance;

pub use qdrant::QdrantVectorStore;

/// One point to upsert: deterministic id, dense vector, payload metadata.
#[derive(Debug, Clone, Serialize)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Value,
}

/// One search hit as returned by the store.
#[derive(Debug, Clone, Deserialize)]
pub struct VectorHit {
    pub point_id: String,
    pub score: f32,
    pub payload: Value,
}

impl VectorHit {
    pub fn chunk_id(&self) -> Option<&str> {
        self.payload.get("chunk_id").and_then(Value::as_str)
    }

    pub fn chunk_text(&self) -> &str {
        self.payload
            .get("chunk_text")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}

/// Payload-level equality filters supported by the search path.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub document_id: Option<i32>,
    pub document_type: Option<String>,
    /// Matches points whose `page_numbers` payload contains any of these.
    pub page_numbers: Option<Vec<i32>>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.document_id.is_none() && self.document_type.is_none() && self.page_numbers.is_none()
    }

    pub fn by_document_type(document_type: impl Into<String>) -> Self {
        Self {
            document_type: Some(document_type.into()),
            ..Self::default()
        }
    }

    pub fn by_page_range(page_numbers: Vec<i32>) -> Self {
        Self {
            page_numbers: Some(page_numbers),
            ..Self::default()
        }
    }
}

/// Vector database contract. One named collection, cosine distance, point
/// ids are UUIDs (callers map chunk ids through UUID5 before upserting).
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn ensure_collection(&self, name: &str, dimension: usize) -> Result<()>;

    /// Upsert a batch. Returns the number of points accepted; the store is
    /// not transactional across points.
    async fn upsert_batch(&self, name: &str, points: Vec<VectorPoint>) -> Result<usize>;

    async fn search(
        &self,
        name: &str,
        query_vector: &[f32],
        filters: &SearchFilters,
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<VectorHit>>;

    async fn delete_point(&self, name: &str, point_id: &str) -> Result<()>;

    /// Delete all points carrying this document id (scroll, then delete).
    /// Returns the number of removed points.
    async fn delete_by_document(&self, name: &str, document_id: i32) -> Result<usize>;

    async fn collection_info(&self, name: &str) -> Result<Value>;

    /// Vector search blended with lexical overlap. Over-fetches 2x the
    /// requested top_k at a relaxed threshold, rescores with
    /// `0.7 * vector + 0.3 * text_overlap`, re-sorts and trims.
    async fn search_hybrid(
        &self,
        name: &str,
        query_vector: &[f32],
        query_text: &str,
        filters: &SearchFilters,
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<VectorHit>> {
        let candidates = self
            .search(name, query_vector, filters, top_k * 2, min_score * 0.5)
            .await?;

        let mut hybrid: Vec<VectorHit> = candidates
            .into_iter()
            .filter_map(|mut hit| {
                let text_score = text_relevance(query_text, hit.chunk_text());
                let blended = hit.score * 0.7 + text_score * 0.3;
                if blended >= min_score {
                    hit.score = blended;
                    Some(hit)
                } else {
                    None
                }
            })
            .collect();

        hybrid.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hybrid.truncate(top_k);

        Ok(hybrid)
    }
}

#[cfg(test)]
mod tests {
    use super::memory::InMemoryVectorStore;
    use super::*;
    use serde_json::json;

    fn payload(chunk_id: &str, text: &str) -> Value {
        json!({
            "document_id": 1,
            "document_type": "SOP",
            "page_numbers": [1],
            "chunk_id": chunk_id,
            "chunk_text": text,
            "chunk_type": "text",
            "heading_hierarchy": [],
            "token_count": 10
        })
    }

    #[tokio::test]
    async fn test_hybrid_search_prefers_lexical_overlap() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("rag_documents", 3).await.unwrap();

        // Two points equally similar to the query vector; only one shares
        // words with the query text.
        store
            .upsert_batch(
                "rag_documents",
                vec![
                    VectorPoint {
                        id: "11111111-1111-1111-1111-111111111111".to_string(),
                        vector: vec![1.0, 0.1, 0.0],
                        payload: payload("doc_1_page_1_text_0", "Fehlerprüfung im Schritt sechs"),
                    },
                    VectorPoint {
                        id: "22222222-2222-2222-2222-222222222222".to_string(),
                        vector: vec![1.0, 0.0, 0.1],
                        payload: payload("doc_1_page_1_text_1", "Lagerbestand im Hochregal"),
                    },
                ],
            )
            .await
            .unwrap();

        let hits = store
            .search_hybrid(
                "rag_documents",
                &[1.0, 0.05, 0.05],
                "Fehlerprüfung Schritt",
                &SearchFilters::default(),
                2,
                0.5,
            )
            .await
            .unwrap();

        assert!(!hits.is_empty());
        assert_eq!(hits[0].chunk_id(), Some("doc_1_page_1_text_0"));
    }

    #[tokio::test]
    async fn test_hybrid_search_trims_to_top_k() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("rag_documents", 2).await.unwrap();

        let points: Vec<VectorPoint> = (0..6)
            .map(|i| VectorPoint {
                id: format!("00000000-0000-0000-0000-00000000000{}", i),
                vector: vec![1.0, i as f32 * 0.01],
                payload: payload(&format!("doc_1_page_1_text_{}", i), "gleicher inhalt"),
            })
            .collect();
        store.upsert_batch("rag_documents", points).await.unwrap();

        let hits = store
            .search_hybrid(
                "rag_documents",
                &[1.0, 0.0],
                "gleicher inhalt",
                &SearchFilters::default(),
                3,
                0.1,
            )
            .await
            .unwrap();

        assert_eq!(hits.len(), 3);
        // descending order
        assert!(hits[0].score >= hits[1].score);
        assert!(hits[1].score >= hits[2].score);
    }

    #[tokio::test]
    async fn test_filters_that_match_nothing_return_empty() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("rag_documents", 2).await.unwrap();
        store
            .upsert_batch(
                "rag_documents",
                vec![VectorPoint {
                    id: "33333333-3333-3333-3333-333333333333".to_string(),
                    vector: vec![1.0, 0.0],
                    payload: payload("doc_1_page_1_text_0", "inhalt"),
                }],
            )
            .await
            .unwrap();

        let filters = SearchFilters::by_document_type("Datenblatt");
        let hits = store
            .search("rag_documents", &[1.0, 0.0], &filters, 5, 0.0)
            .await
            .unwrap();

        assert!(hits.is_empty());
    }
}
