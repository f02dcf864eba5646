//! Chunking Engine: document-type-aware decomposition of vision JSON into
//! typed retrieval chunks.

use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, warn};

use super::vision::{self, PageData};
use super::{datasheet, flowchart, generic, sop, work_instruction};
use crate::models::{ChunkMetadata, ChunkType, DocumentChunk};
use crate::utils::token_estimator::estimate_tokens;

/// Per-document-type chunking strategy.
///
/// Dispatch is an ordered predicate list so priority is explicit; in
/// particular datasheets are recognized before work instructions, because a
/// datasheet prompt may nest `processing_instructions` with a `step_number`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkingStrategy {
    Sop,
    WorkInstruction,
    Flowchart,
    Datasheet,
    Generic,
}

impl ChunkingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkingStrategy::Sop => "sop",
            ChunkingStrategy::WorkInstruction => "work_instruction",
            ChunkingStrategy::Flowchart => "flowchart",
            ChunkingStrategy::Datasheet => "datasheet",
            ChunkingStrategy::Generic => "generic",
        }
    }

    /// Scan a prompt template for the JSON schema keys it instructs the
    /// vision model to produce. Keys are matched quoted so `"steps"` does
    /// not fire on `"process_steps"`.
    pub fn detect_in_prompt(prompt_text: &str) -> Option<Self> {
        let has = |key: &str| {
            prompt_text.contains(&format!("\"{}\"", key))
                || prompt_text.contains(&format!("'{}'", key))
        };

        if has("nodes") {
            return Some(ChunkingStrategy::Flowchart);
        }
        if has("technical_specifications") {
            return Some(ChunkingStrategy::Datasheet);
        }
        if has("steps") && has("step_number") {
            return Some(ChunkingStrategy::WorkInstruction);
        }
        if has("process_steps") {
            return Some(ChunkingStrategy::Sop);
        }
        None
    }

    /// Inspect the vision JSON itself for the same signals. Used when the
    /// prompt scan is inconclusive.
    pub fn detect_in_json(content: &Value) -> Option<Self> {
        let has_key = |key: &str| content.get(key).is_some();

        if has_key("nodes") {
            return Some(ChunkingStrategy::Flowchart);
        }
        if has_key("technical_specifications") {
            return Some(ChunkingStrategy::Datasheet);
        }
        if has_key("steps") {
            let steps_have_numbers = content
                .get("steps")
                .and_then(Value::as_array)
                .map(|steps| steps.iter().any(|step| step.get("step_number").is_some()))
                .unwrap_or(false);
            if steps_have_numbers {
                return Some(ChunkingStrategy::WorkInstruction);
            }
        }
        if has_key("process_steps") {
            return Some(ChunkingStrategy::Sop);
        }
        None
    }

    /// Full selection: active prompt template first, vision JSON second,
    /// generic otherwise.
    pub fn select(prompt_text: Option<&str>, content: &Value) -> Self {
        if let Some(prompt) = prompt_text {
            if let Some(strategy) = Self::detect_in_prompt(prompt) {
                return strategy;
            }
        }
        Self::detect_in_json(content).unwrap_or(ChunkingStrategy::Generic)
    }
}

/// Accumulates chunks for one document, guaranteeing unique chunk ids and a
/// stable ordinal order across pages.
pub struct ChunkBuilder {
    document_id: i32,
    page_number: i32,
    used_ids: HashSet<String>,
    chunks: Vec<DocumentChunk>,
}

impl ChunkBuilder {
    pub fn new(document_id: i32) -> Self {
        Self {
            document_id,
            page_number: 1,
            used_ids: HashSet::new(),
            chunks: Vec::new(),
        }
    }

    pub fn set_page(&mut self, page_number: i32) {
        self.page_number = page_number;
    }

    pub fn page_number(&self) -> i32 {
        self.page_number
    }

    /// Append a chunk. Empty text is dropped silently; colliding roles get a
    /// numeric suffix so no two chunks of a document share an identifier.
    pub fn push(
        &mut self,
        role: &str,
        chunk_type: ChunkType,
        heading_hierarchy: Vec<String>,
        text: String,
    ) {
        let text = text.trim().to_string();
        if text.is_empty() {
            return;
        }

        let base_id = format!(
            "doc_{}_page_{}_{}",
            self.document_id, self.page_number, role
        );
        let chunk_id = if self.used_ids.contains(&base_id) {
            let mut suffix = 1;
            loop {
                let candidate = format!("{}_{}", base_id, suffix);
                if !self.used_ids.contains(&candidate) {
                    break candidate;
                }
                suffix += 1;
            }
        } else {
            base_id
        };
        self.used_ids.insert(chunk_id.clone());

        let mut metadata = ChunkMetadata::new(
            vec![self.page_number],
            heading_hierarchy,
            chunk_type,
            estimate_tokens(&text),
        );
        metadata.sentence_count = Some(count_sentences(&text));

        self.chunks.push(DocumentChunk::new(chunk_id, text, metadata));
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn finish(self) -> Vec<DocumentChunk> {
        self.chunks
    }
}

fn count_sentences(text: &str) -> usize {
    text.split(|c| matches!(c, '.' | '!' | '?'))
        .filter(|s| !s.trim().is_empty())
        .count()
        .max(1)
}

/// The engine proper: strategy selection plus the per-page loop with the
/// generic degradation path.
pub struct ChunkingEngine;

impl ChunkingEngine {
    /// Chunk one page's vision JSON into the builder. A failing strategy
    /// degrades to the generic fallback for that page only.
    pub fn chunk_page(
        builder: &mut ChunkBuilder,
        page_number: i32,
        raw_json: &Value,
        strategy: ChunkingStrategy,
    ) {
        for page in vision::unwrap_pages(raw_json, page_number) {
            Self::chunk_page_content(builder, &page, strategy);
        }
    }

    fn chunk_page_content(builder: &mut ChunkBuilder, page: &PageData, strategy: ChunkingStrategy) {
        builder.set_page(page.page_number);
        let before = builder.len();

        let result = match strategy {
            ChunkingStrategy::Sop => sop::chunk(builder, &page.content),
            ChunkingStrategy::WorkInstruction => work_instruction::chunk(builder, &page.content),
            ChunkingStrategy::Flowchart => flowchart::chunk(builder, &page.content),
            ChunkingStrategy::Datasheet => datasheet::chunk(builder, &page.content),
            ChunkingStrategy::Generic => generic::chunk(builder, &page.content),
        };

        if let Err(error) = result {
            warn!(
                page = page.page_number,
                strategy = strategy.as_str(),
                %error,
                "Chunking strategy failed for page, degrading to generic"
            );
            if strategy != ChunkingStrategy::Generic {
                if let Err(fallback_error) = generic::chunk(builder, &page.content) {
                    warn!(
                        page = page.page_number,
                        %fallback_error,
                        "Generic fallback produced no chunks for page"
                    );
                }
            }
        }

        debug!(
            page = page.page_number,
            strategy = strategy.as_str(),
            chunks = builder.len() - before,
            "Chunked page"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prompt_dispatch_flowchart() {
        let prompt = r#"Erzeuge JSON mit "nodes" und "connections"."#;
        assert_eq!(
            ChunkingStrategy::detect_in_prompt(prompt),
            Some(ChunkingStrategy::Flowchart)
        );
    }

    #[test]
    fn test_prompt_dispatch_datasheet_before_work_instruction() {
        // Datasheet prompts may nest processing steps with a step_number;
        // technical_specifications must win.
        let prompt = r#"{"technical_specifications": {}, "processing_instructions": [{"step_number": 1, "steps": []}]}"#;
        assert_eq!(
            ChunkingStrategy::detect_in_prompt(prompt),
            Some(ChunkingStrategy::Datasheet)
        );
    }

    #[test]
    fn test_prompt_dispatch_work_instruction_requires_both_keys() {
        let with_both = r#"{"steps": [{"step_number": 1}]}"#;
        assert_eq!(
            ChunkingStrategy::detect_in_prompt(with_both),
            Some(ChunkingStrategy::WorkInstruction)
        );

        let only_steps = r#"{"steps": []}"#;
        assert_eq!(ChunkingStrategy::detect_in_prompt(only_steps), None);
    }

    #[test]
    fn test_prompt_dispatch_sop_not_shadowed_by_quoted_steps() {
        // "process_steps" must not satisfy the quoted "steps" predicate
        let prompt = r#"{"process_steps": [{"step_number": 6}]}"#;
        assert_eq!(
            ChunkingStrategy::detect_in_prompt(prompt),
            Some(ChunkingStrategy::Sop)
        );
    }

    #[test]
    fn test_json_dispatch_fallback() {
        let content = json!({"process_steps": [{"step_number": 1}]});
        assert_eq!(
            ChunkingStrategy::select(None, &content),
            ChunkingStrategy::Sop
        );

        let unknown = json!({"text": "plain"});
        assert_eq!(
            ChunkingStrategy::select(None, &unknown),
            ChunkingStrategy::Generic
        );
    }

    #[test]
    fn test_prompt_wins_over_json() {
        let prompt = r#"liefert "nodes" zurück"#;
        let content = json!({"process_steps": []});
        assert_eq!(
            ChunkingStrategy::select(Some(prompt), &content),
            ChunkingStrategy::Flowchart
        );
    }

    #[test]
    fn test_builder_deduplicates_ids() {
        let mut builder = ChunkBuilder::new(7);
        builder.set_page(1);
        builder.push("meta", ChunkType::Metadata, vec![], "Erster".to_string());
        builder.push("meta", ChunkType::Metadata, vec![], "Zweiter".to_string());

        let chunks = builder.finish();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chunk_id, "doc_7_page_1_meta");
        assert_eq!(chunks[1].chunk_id, "doc_7_page_1_meta_1");
    }

    #[test]
    fn test_builder_drops_empty_text() {
        let mut builder = ChunkBuilder::new(7);
        builder.push("meta", ChunkType::Metadata, vec![], "   ".to_string());
        assert!(builder.is_empty());
    }

    #[test]
    fn test_malformed_page_degrades_to_generic() {
        // SOP strategy cannot find process structure, but the page still has
        // plain text the generic fallback can index.
        let mut builder = ChunkBuilder::new(3);
        let content = json!({"text": "Nur Fliesstext ohne Struktur."});
        ChunkingEngine::chunk_page(&mut builder, 1, &content, ChunkingStrategy::Sop);

        let chunks = builder.finish();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].metadata.chunk_type, ChunkType::Text);
    }

    #[test]
    fn test_legacy_envelope_reaches_strategy() {
        let mut builder = ChunkBuilder::new(3);
        let raw = json!({
            "pages": [{
                "page_number": 4,
                "content": {"text": "Inhalt auf Seite vier."}
            }]
        });
        ChunkingEngine::chunk_page(&mut builder, 1, &raw, ChunkingStrategy::Generic);

        let chunks = builder.finish();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].metadata.page_numbers, vec![4]);
        assert!(chunks[0].chunk_id.starts_with("doc_3_page_4_"));
    }
}
