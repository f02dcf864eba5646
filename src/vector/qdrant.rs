//! Qdrant REST adapter.
//!
//! All vector-database interaction goes through this type. The collection is
//! created lazily with cosine distance and the dimensionality of whichever
//! embedding provider was selected at startup.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{SearchFilters, VectorHit, VectorPoint, VectorStore};
use crate::config::QdrantConfig;
use crate::utils::point_id::point_id_for_chunk;

/// Scroll page size when collecting the points of one document for deletion.
const SCROLL_LIMIT: usize = 10_000;

pub struct QdrantVectorStore {
    client: Client,
    base_url: String,
}

impl QdrantVectorStore {
    pub fn new(config: &QdrantConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        let response = self
            .client
            .get(self.url(&format!("/collections/{}", name)))
            .send()
            .await
            .context("Failed to reach Qdrant")?;

        Ok(response.status().is_success())
    }

    fn build_filter(filters: &SearchFilters) -> Option<Value> {
        let mut must = Vec::new();

        if let Some(document_id) = filters.document_id {
            must.push(json!({"key": "document_id", "match": {"value": document_id}}));
        }
        if let Some(document_type) = &filters.document_type {
            must.push(json!({"key": "document_type", "match": {"value": document_type}}));
        }
        if let Some(page_numbers) = &filters.page_numbers {
            must.push(json!({"key": "page_numbers", "match": {"any": page_numbers}}));
        }

        if must.is_empty() {
            None
        } else {
            Some(json!({"must": must}))
        }
    }

    async fn scroll_point_ids(&self, name: &str, document_id: i32) -> Result<Vec<Value>> {
        let mut point_ids = Vec::new();
        let mut offset: Option<Value> = None;

        loop {
            let mut body = json!({
                "filter": {
                    "must": [{"key": "document_id", "match": {"value": document_id}}]
                },
                "limit": SCROLL_LIMIT,
                "with_payload": false,
                "with_vector": false
            });
            if let Some(next) = &offset {
                body["offset"] = next.clone();
            }

            let response = self
                .client
                .post(self.url(&format!("/collections/{}/points/scroll", name)))
                .json(&body)
                .send()
                .await
                .context("Qdrant scroll request failed")?;

            if !response.status().is_success() {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                anyhow::bail!("Qdrant scroll error ({}): {}", status, text);
            }

            let body: Value = response.json().await.context("Invalid scroll response")?;
            let points = body["result"]["points"]
                .as_array()
                .cloned()
                .unwrap_or_default();
            for point in &points {
                if let Some(id) = point.get("id") {
                    point_ids.push(id.clone());
                }
            }

            let next_page = body["result"]["next_page_offset"].clone();
            if next_page.is_null() || points.is_empty() {
                break;
            }
            offset = Some(next_page);
        }

        Ok(point_ids)
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn ensure_collection(&self, name: &str, dimension: usize) -> Result<()> {
        if self.collection_exists(name).await? {
            return Ok(());
        }

        let body = json!({
            "vectors": {
                "size": dimension,
                "distance": "Cosine"
            }
        });

        let response = self
            .client
            .put(self.url(&format!("/collections/{}", name)))
            .json(&body)
            .send()
            .await
            .context("Qdrant create collection request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Failed to create Qdrant collection ({}): {}", status, text);
        }

        debug!(collection = name, dimension, "Created Qdrant collection");
        Ok(())
    }

    async fn upsert_batch(&self, name: &str, points: Vec<VectorPoint>) -> Result<usize> {
        if points.is_empty() {
            return Ok(0);
        }

        let count = points.len();
        // Qdrant only accepts UUID point ids; chunk-id-shaped strings are
        // mapped through their deterministic UUID5 projection.
        let body = json!({
            "points": points
                .iter()
                .map(|p| json!({
                    "id": point_id_for_chunk(&p.id),
                    "vector": p.vector,
                    "payload": p.payload
                }))
                .collect::<Vec<_>>()
        });

        let response = self
            .client
            .put(self.url(&format!("/collections/{}/points?wait=true", name)))
            .json(&body)
            .send()
            .await
            .context("Qdrant upsert request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Qdrant upsert error ({}): {}", status, text);
        }

        debug!(collection = name, points = count, "Upserted vector batch");
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
        let mut body = json!({
            "vector": query_vector,
            "limit": top_k,
            "score_threshold": min_score,
            "with_payload": true
        });
        if let Some(filter) = Self::build_filter(filters) {
            body["filter"] = filter;
        }

        let response = self
            .client
            .post(self.url(&format!("/collections/{}/points/search", name)))
            .json(&body)
            .send()
            .await
            .context("Qdrant search request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Qdrant search error ({}): {}", status, text);
        }

        let body: Value = response.json().await.context("Invalid search response")?;
        let hits = body["result"]
            .as_array()
            .map(|results| {
                results
                    .iter()
                    .map(|hit| VectorHit {
                        point_id: hit["id"]
                            .as_str()
                            .map(str::to_string)
                            .unwrap_or_else(|| hit["id"].to_string()),
                        score: hit["score"].as_f64().unwrap_or(0.0) as f32,
                        payload: hit.get("payload").cloned().unwrap_or(Value::Null),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(hits)
    }

    async fn delete_point(&self, name: &str, point_id: &str) -> Result<()> {
        let body = json!({"points": [point_id_for_chunk(point_id)]});

        let response = self
            .client
            .post(self.url(&format!("/collections/{}/points/delete?wait=true", name)))
            .json(&body)
            .send()
            .await
            .context("Qdrant delete request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Qdrant delete error ({}): {}", status, text);
        }

        Ok(())
    }

    async fn delete_by_document(&self, name: &str, document_id: i32) -> Result<usize> {
        let point_ids = self.scroll_point_ids(name, document_id).await?;
        if point_ids.is_empty() {
            return Ok(0);
        }

        let count = point_ids.len();
        let body = json!({"points": point_ids});

        let response = self
            .client
            .post(self.url(&format!("/collections/{}/points/delete?wait=true", name)))
            .json(&body)
            .send()
            .await
            .context("Qdrant batch delete request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Qdrant batch delete error ({}): {}", status, text);
        }

        debug!(
            collection = name,
            document_id, deleted = count, "Deleted document points"
        );
        Ok(count)
    }

    async fn collection_info(&self, name: &str) -> Result<Value> {
        let response = self
            .client
            .get(self.url(&format!("/collections/{}", name)))
            .send()
            .await
            .context("Qdrant collection info request failed")?;

        if !response.status().is_success() {
            warn!(collection = name, "Collection info unavailable");
            return Ok(json!({
                "name": name,
                "vector_size": 0,
                "distance": "cosine",
                "points_count": 0
            }));
        }

        let body: Value = response.json().await.context("Invalid collection info")?;
        let result = &body["result"];

        Ok(json!({
            "name": name,
            "vector_size": result["config"]["params"]["vectors"]["size"].as_u64().unwrap_or(0),
            "distance": result["config"]["params"]["vectors"]["distance"].as_str().unwrap_or("Cosine"),
            "points_count": result["points_count"].as_u64().unwrap_or(0)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_construction() {
        let filters = SearchFilters {
            document_id: Some(42),
            document_type: Some("SOP".to_string()),
            page_numbers: Some(vec![1, 2]),
        };
        let filter = QdrantVectorStore::build_filter(&filters).unwrap();
        let must = filter["must"].as_array().unwrap();
        assert_eq!(must.len(), 3);
        assert_eq!(must[0]["key"], "document_id");
        assert_eq!(must[2]["match"]["any"], json!([1, 2]));
    }

    #[test]
    fn test_empty_filters_build_nothing() {
        assert!(QdrantVectorStore::build_filter(&SearchFilters::default()).is_none());
    }
}
