//! Technical datasheet chunking.
//!
//! Safety topics (symbols, warnings, first aid, storage, disposal) become
//! separate chunks so each hazard topic is retrievable on its own; the four
//! technical-specification groups are only emitted when the vision model
//! actually filled them.

use anyhow::Result;
use serde_json::Value;

use super::chunker::ChunkBuilder;
use super::vision::{
    is_empty_value, object_list, render_lines, sanitize_id_fragment, scalar_field, str_field,
    string_list,
};
use crate::models::ChunkType;

pub fn chunk(builder: &mut ChunkBuilder, content: &Value) -> Result<()> {
    let has_structure = content.get("technical_specifications").is_some()
        || content.get("datasheet_metadata").is_some()
        || content.get("safety_data").is_some();
    if !has_structure {
        anyhow::bail!("no datasheet structure in vision JSON");
    }

    if let Some(metadata) = content.get("datasheet_metadata") {
        if !is_empty_value(metadata) {
            builder.push(
                "meta",
                ChunkType::DatasheetMetadata,
                vec!["Produktinformationen".to_string()],
                render_lines(metadata),
            );
        }
    }

    if let Some(specs) = content.get("technical_specifications") {
        let groups: [(&str, &str, &str, ChunkType); 4] = [
            (
                "physical",
                "specs_physical",
                "Physikalische Eigenschaften",
                ChunkType::TechnicalSpecsPhysical,
            ),
            (
                "chemical",
                "specs_chemical",
                "Chemische Eigenschaften",
                ChunkType::TechnicalSpecsChemical,
            ),
            (
                "performance",
                "specs_performance",
                "Leistungsdaten",
                ChunkType::TechnicalSpecsPerformance,
            ),
            (
                "environmental",
                "specs_environmental",
                "Umgebungsbedingungen",
                ChunkType::TechnicalSpecsEnvironmental,
            ),
        ];

        for (key, role, heading, chunk_type) in groups {
            if let Some(group) = specs.get(key) {
                if !is_empty_value(group) {
                    builder.push(
                        role,
                        chunk_type,
                        vec!["Technische Daten".to_string(), heading.to_string()],
                        format!("{}:\n{}", heading, render_lines(group)),
                    );
                }
            }
        }
    }

    if let Some(application) = content.get("application_info") {
        let areas = string_list(application, "application_areas");
        if !areas.is_empty() {
            builder.push(
                "application_areas",
                ChunkType::ApplicationAreas,
                vec!["Anwendung".to_string()],
                format!("Anwendungsbereiche:\n{}", areas.join("\n")),
            );
        }

        let compatibility = string_list(application, "material_compatibility");
        if !compatibility.is_empty() {
            builder.push(
                "material_compatibility",
                ChunkType::MaterialCompatibility,
                vec!["Anwendung".to_string()],
                format!("Materialverträglichkeit:\n{}", compatibility.join("\n")),
            );
        }

        for instruction in object_list(application, "processing_instructions") {
            let step_number = scalar_field(&instruction, "step_number");
            let text = str_field(&instruction, "instruction")
                .or_else(|| str_field(&instruction, "description"))
                .unwrap_or_else(|| render_lines(&instruction));
            if text.is_empty() {
                continue;
            }

            let (role, line) = match &step_number {
                Some(number) => (
                    format!("processing_step_{}", number),
                    format!("Verarbeitungsschritt {}: {}", number, text),
                ),
                None => ("processing_step".to_string(), format!("Verarbeitung: {}", text)),
            };
            builder.push(
                &role,
                ChunkType::ProcessingInstruction,
                vec!["Verarbeitung".to_string()],
                line,
            );
        }

        if let Some(curing) = application.get("curing_information") {
            if !is_empty_value(curing) {
                builder.push(
                    "curing",
                    ChunkType::CuringInformation,
                    vec!["Verarbeitung".to_string(), "Aushärtung".to_string()],
                    format!("Aushärtung:\n{}", render_lines(curing)),
                );
            }
        }
    }

    if let Some(safety) = content.get("safety_data") {
        chunk_safety(builder, safety);
    }

    for variant in object_list(content, "product_variants") {
        let name = str_field(&variant, "name")
            .or_else(|| str_field(&variant, "id"))
            .unwrap_or_default();
        let text = render_lines(&variant);
        if text.is_empty() {
            continue;
        }

        let role = if name.is_empty() {
            "variant".to_string()
        } else {
            format!("variant_{}", sanitize_id_fragment(&name))
        };
        builder.push(
            &role,
            ChunkType::ProductVariant,
            vec!["Produktvarianten".to_string()],
            format!("Produktvariante:\n{}", text),
        );
    }

    if let Some(additional) = content.get("additional_information") {
        if !is_empty_value(additional) {
            builder.push(
                "additional_info",
                ChunkType::AdditionalInformation,
                vec!["Weitere Informationen".to_string()],
                render_lines(additional),
            );
        }
    }

    Ok(())
}

/// GHS symbols plus H/P statements are combined into one symbols chunk;
/// every other hazard topic stays separate.
fn chunk_safety(builder: &mut ChunkBuilder, safety: &Value) {
    let mut symbol_lines = Vec::new();
    let ghs = string_list(safety, "ghs_symbols");
    if !ghs.is_empty() {
        symbol_lines.push(format!("GHS-Symbole: {}", ghs.join(", ")));
    }
    let h_statements = string_list(safety, "h_statements");
    if !h_statements.is_empty() {
        symbol_lines.push(format!("H-Sätze:\n{}", h_statements.join("\n")));
    }
    let p_statements = string_list(safety, "p_statements");
    if !p_statements.is_empty() {
        symbol_lines.push(format!("P-Sätze:\n{}", p_statements.join("\n")));
    }
    if !symbol_lines.is_empty() {
        builder.push(
            "safety_symbols",
            ChunkType::SafetySymbols,
            vec!["Sicherheit".to_string(), "Kennzeichnung".to_string()],
            symbol_lines.join("\n"),
        );
    }

    let topics: [(&str, &str, &str, ChunkType); 4] = [
        (
            "safety_warnings",
            "safety_warnings",
            "Sicherheitswarnungen",
            ChunkType::SafetyWarnings,
        ),
        ("first_aid", "first_aid", "Erste Hilfe", ChunkType::FirstAid),
        (
            "storage_requirements",
            "storage",
            "Lagerung",
            ChunkType::StorageRequirements,
        ),
        ("disposal", "disposal", "Entsorgung", ChunkType::Disposal),
    ];

    for (key, role, heading, chunk_type) in topics {
        let entries = string_list(safety, key);
        let text = if entries.is_empty() {
            safety
                .get(key)
                .filter(|v| !is_empty_value(v))
                .map(render_lines)
                .unwrap_or_default()
        } else {
            entries.join("\n")
        };
        if !text.is_empty() {
            builder.push(
                role,
                chunk_type,
                vec!["Sicherheit".to_string(), heading.to_string()],
                format!("{}:\n{}", heading, text),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ChunkBuilder;
    use serde_json::json;

    fn chunk_content(content: Value) -> Vec<crate::models::DocumentChunk> {
        let mut builder = ChunkBuilder::new(77);
        builder.set_page(1);
        chunk(&mut builder, &content).unwrap();
        builder.finish()
    }

    #[test]
    fn test_safety_topics_are_separate_chunks() {
        let chunks = chunk_content(json!({
            "datasheet_metadata": {"product": "Industriekleber X3"},
            "safety_data": {
                "ghs_symbols": ["GHS07"],
                "h_statements": ["H319 Verursacht schwere Augenreizung."],
                "safety_warnings": ["Kann Augenreizung verursachen."],
                "first_aid": ["Bei Augenkontakt mit Wasser spülen."],
                "storage_requirements": ["Kühl und trocken lagern."],
                "disposal": ["Inhalt der örtlichen Sondermüllsammlung zuführen."]
            }
        }));

        let warnings = chunks
            .iter()
            .find(|c| c.metadata.chunk_type == ChunkType::SafetyWarnings)
            .expect("safety warnings chunk");
        assert_eq!(warnings.chunk_id, "doc_77_page_1_safety_warnings");
        assert!(warnings.text.contains("Kann Augenreizung verursachen."));

        let symbols = chunks
            .iter()
            .find(|c| c.metadata.chunk_type == ChunkType::SafetySymbols)
            .expect("symbols chunk");
        assert!(symbols.text.contains("GHS07"));
        assert!(symbols.text.contains("H319"));

        assert!(chunks.iter().any(|c| c.metadata.chunk_type == ChunkType::FirstAid));
        assert!(chunks
            .iter()
            .any(|c| c.metadata.chunk_type == ChunkType::StorageRequirements));
        assert!(chunks.iter().any(|c| c.metadata.chunk_type == ChunkType::Disposal));
    }

    #[test]
    fn test_only_filled_spec_groups_emitted() {
        let chunks = chunk_content(json!({
            "technical_specifications": {
                "physical": {"viskositaet": "3500 mPas", "dichte": "1.1 g/cm3"},
                "chemical": {},
                "performance": {"zugfestigkeit": "22 N/mm2"},
                "environmental": null
            }
        }));

        let types: Vec<ChunkType> = chunks.iter().map(|c| c.metadata.chunk_type).collect();
        assert!(types.contains(&ChunkType::TechnicalSpecsPhysical));
        assert!(types.contains(&ChunkType::TechnicalSpecsPerformance));
        assert!(!types.contains(&ChunkType::TechnicalSpecsChemical));
        assert!(!types.contains(&ChunkType::TechnicalSpecsEnvironmental));
    }

    #[test]
    fn test_variants_and_processing_steps() {
        let chunks = chunk_content(json!({
            "technical_specifications": {"physical": {"farbe": "transparent"}},
            "application_info": {
                "application_areas": ["Metallverklebung"],
                "material_compatibility": ["Edelstahl", "Aluminium"],
                "processing_instructions": [
                    {"step_number": 1, "instruction": "Oberfläche entfetten."},
                    {"step_number": 2, "instruction": "Kleber dünn auftragen."}
                ],
                "curing_information": {"handfest": "10 Minuten", "endfest": "24 Stunden"}
            },
            "product_variants": [
                {"name": "5 ml Tube", "article_number": "X3-005"},
                {"name": "50 ml Kartusche", "article_number": "X3-050"}
            ],
            "additional_information": "Nur für den industriellen Gebrauch."
        }));

        assert!(chunks
            .iter()
            .any(|c| c.chunk_id == "doc_77_page_1_processing_step_2"));
        assert!(chunks
            .iter()
            .any(|c| c.chunk_id == "doc_77_page_1_variant_5_ml_tube"));
        assert!(chunks
            .iter()
            .any(|c| c.metadata.chunk_type == ChunkType::CuringInformation));
        assert!(chunks
            .iter()
            .any(|c| c.metadata.chunk_type == ChunkType::AdditionalInformation));
    }

    #[test]
    fn test_missing_structure_rejected() {
        let mut builder = ChunkBuilder::new(77);
        assert!(chunk(&mut builder, &json!({"nodes": []})).is_err());
    }
}
