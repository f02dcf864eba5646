use serde::{Deserialize, Serialize};

use crate::utils::point_id::point_id_for_chunk;

/// Structural role of a chunk. Closed set so retrieval can filter on role
/// (e.g. only `safety_warnings`) as well as on content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Metadata,
    ProcessStep,
    WorkStep,
    FlowchartNode,
    FlowchartDecision,
    FlowchartConnections,
    CriticalRule,
    Compliance,
    References,
    Definitions,
    TechnicalSpecsPhysical,
    TechnicalSpecsChemical,
    TechnicalSpecsPerformance,
    TechnicalSpecsEnvironmental,
    ApplicationAreas,
    MaterialCompatibility,
    ProcessingInstruction,
    CuringInformation,
    SafetySymbols,
    SafetyWarnings,
    FirstAid,
    StorageRequirements,
    Disposal,
    ProductVariant,
    AdditionalInformation,
    DatasheetMetadata,
    Text,
    Table,
}

impl ChunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkType::Metadata => "metadata",
            ChunkType::ProcessStep => "process_step",
            ChunkType::WorkStep => "work_step",
            ChunkType::FlowchartNode => "flowchart_node",
            ChunkType::FlowchartDecision => "flowchart_decision",
            ChunkType::FlowchartConnections => "flowchart_connections",
            ChunkType::CriticalRule => "critical_rule",
            ChunkType::Compliance => "compliance",
            ChunkType::References => "references",
            ChunkType::Definitions => "definitions",
            ChunkType::TechnicalSpecsPhysical => "technical_specs_physical",
            ChunkType::TechnicalSpecsChemical => "technical_specs_chemical",
            ChunkType::TechnicalSpecsPerformance => "technical_specs_performance",
            ChunkType::TechnicalSpecsEnvironmental => "technical_specs_environmental",
            ChunkType::ApplicationAreas => "application_areas",
            ChunkType::MaterialCompatibility => "material_compatibility",
            ChunkType::ProcessingInstruction => "processing_instruction",
            ChunkType::CuringInformation => "curing_information",
            ChunkType::SafetySymbols => "safety_symbols",
            ChunkType::SafetyWarnings => "safety_warnings",
            ChunkType::FirstAid => "first_aid",
            ChunkType::StorageRequirements => "storage_requirements",
            ChunkType::Disposal => "disposal",
            ChunkType::ProductVariant => "product_variant",
            ChunkType::AdditionalInformation => "additional_information",
            ChunkType::DatasheetMetadata => "datasheet_metadata",
            ChunkType::Text => "text",
            ChunkType::Table => "table",
        }
    }
}

/// Structured metadata attached to every chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub page_numbers: Vec<i32>,
    pub heading_hierarchy: Vec<String>,
    pub chunk_type: ChunkType,
    pub token_count: usize,
    pub sentence_count: Option<usize>,
    pub has_overlap: bool,
    pub overlap_sentence_count: usize,
}

impl ChunkMetadata {
    pub fn new(page_numbers: Vec<i32>, heading_hierarchy: Vec<String>, chunk_type: ChunkType, token_count: usize) -> Self {
        Self {
            page_numbers,
            heading_hierarchy,
            chunk_type,
            token_count,
            sentence_count: None,
            has_overlap: false,
            overlap_sentence_count: 0,
        }
    }

    pub fn is_multi_page(&self) -> bool {
        self.page_numbers.len() > 1
    }
}

/// A retrieval unit produced by the chunking engine, before persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Human-readable identifier, e.g. `doc_42_page_1_step_6`.
    pub chunk_id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

impl DocumentChunk {
    pub fn new(chunk_id: String, text: String, metadata: ChunkMetadata) -> Self {
        Self {
            chunk_id,
            text,
            metadata,
        }
    }

    /// Deterministic vector-store point id (UUID5 over the chunk id).
    pub fn point_id(&self) -> String {
        point_id_for_chunk(&self.chunk_id)
    }

    /// Enforce the chunk invariants: non-empty text, at least one page.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.chunk_id.trim().is_empty() {
            anyhow::bail!("chunk_id cannot be empty");
        }
        if self.text.trim().is_empty() {
            anyhow::bail!("chunk_text cannot be empty");
        }
        if self.metadata.page_numbers.is_empty() {
            anyhow::bail!("chunk must cover at least one page");
        }
        Ok(())
    }
}
