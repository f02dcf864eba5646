//! In-memory vector store used by tests.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;

use super::{SearchFilters, VectorHit, VectorPoint, VectorStore};

/// Ranking score for the fake store. Degenerate inputs (dimension mismatch,
/// zero-length or zero-magnitude embeddings) rank at 0.0 instead of erroring,
/// which keeps fixtures forgiving.
fn rank_score(query: &[f32], candidate: &[f32]) -> f32 {
    if query.is_empty() || query.len() != candidate.len() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut query_sq = 0.0f32;
    let mut candidate_sq = 0.0f32;
    for (q, c) in query.iter().zip(candidate) {
        dot += q * c;
        query_sq += q * q;
        candidate_sq += c * c;
    }

    let denominator = query_sq.sqrt() * candidate_sq.sqrt();
    if denominator == 0.0 {
        return 0.0;
    }
    (dot / denominator).clamp(-1.0, 1.0)
}

#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: Mutex<HashMap<String, Collection>>,
}

struct Collection {
    dimension: usize,
    points: Vec<VectorPoint>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn point_count(&self, name: &str) -> usize {
        self.collections
            .lock()
            .unwrap()
            .get(name)
            .map(|c| c.points.len())
            .unwrap_or(0)
    }

    fn matches(filters: &SearchFilters, payload: &Value) -> bool {
        if let Some(document_id) = filters.document_id {
            if payload.get("document_id").and_then(Value::as_i64) != Some(document_id as i64) {
                return false;
            }
        }
        if let Some(document_type) = &filters.document_type {
            if payload.get("document_type").and_then(Value::as_str) != Some(document_type.as_str())
            {
                return false;
            }
        }
        if let Some(page_numbers) = &filters.page_numbers {
            let pages: Vec<i64> = payload
                .get("page_numbers")
                .and_then(Value::as_array)
                .map(|arr| arr.iter().filter_map(Value::as_i64).collect())
                .unwrap_or_default();
            if !page_numbers.iter().any(|p| pages.contains(&(*p as i64))) {
                return false;
            }
        }
        true
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn ensure_collection(&self, name: &str, dimension: usize) -> Result<()> {
        self.collections
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_insert(Collection {
                dimension,
                points: Vec::new(),
            });
        Ok(())
    }

    async fn upsert_batch(&self, name: &str, points: Vec<VectorPoint>) -> Result<usize> {
        let mut collections = self.collections.lock().unwrap();
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| anyhow::anyhow!("collection {} does not exist", name))?;

        let count = points.len();
        for point in points {
            collection.points.retain(|existing| existing.id != point.id);
            collection.points.push(point);
        }
        Ok(count)
    }

    async fn search(
        &self,
        name: &str,
        query_vector: &[f32],
        filters: &SearchFilters,
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<VectorHit>> {
        let collections = self.collections.lock().unwrap();
        let collection = collections
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("collection {} does not exist", name))?;

        let mut hits: Vec<VectorHit> = collection
            .points
            .iter()
            .filter(|point| Self::matches(filters, &point.payload))
            .filter_map(|point| {
                let score = rank_score(query_vector, &point.vector);
                if score >= min_score {
                    Some(VectorHit {
                        point_id: point.id.clone(),
                        score,
                        payload: point.payload.clone(),
                    })
                } else {
                    None
                }
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn delete_point(&self, name: &str, point_id: &str) -> Result<()> {
        let mut collections = self.collections.lock().unwrap();
        if let Some(collection) = collections.get_mut(name) {
            collection.points.retain(|point| point.id != point_id);
        }
        Ok(())
    }

    async fn delete_by_document(&self, name: &str, document_id: i32) -> Result<usize> {
        let mut collections = self.collections.lock().unwrap();
        let Some(collection) = collections.get_mut(name) else {
            return Ok(0);
        };

        let before = collection.points.len();
        collection.points.retain(|point| {
            point.payload.get("document_id").and_then(Value::as_i64) != Some(document_id as i64)
        });
        Ok(before - collection.points.len())
    }

    async fn collection_info(&self, name: &str) -> Result<Value> {
        let collections = self.collections.lock().unwrap();
        let (dimension, count) = collections
            .get(name)
            .map(|c| (c.dimension, c.points.len()))
            .unwrap_or((0, 0));

        Ok(json!({
            "name": name,
            "vector_size": dimension,
            "distance": "Cosine",
            "points_count": count
        }))
    }
}
