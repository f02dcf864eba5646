//! Work instruction chunking.
//!
//! One self-contained chunk per work step: lists are flattened to multi-line
//! text so a retrieved step carries its article data, consumables, tools,
//! safety instructions and quality checks without a second lookup. Hazard
//! notes on chemicals and adhesives are taken over verbatim.

use anyhow::Result;
use serde_json::Value;

use super::chunker::ChunkBuilder;
use super::vision::{is_empty_value, object_list, render_lines, scalar_field, str_field, string_list};
use crate::models::ChunkType;

pub fn chunk(builder: &mut ChunkBuilder, content: &Value) -> Result<()> {
    let has_structure =
        content.get("steps").is_some() || content.get("process_overview").is_some();
    if !has_structure {
        anyhow::bail!("no work instruction structure in vision JSON");
    }

    if let Some(metadata) = content.get("document_metadata") {
        if !is_empty_value(metadata) {
            builder.push(
                "meta",
                ChunkType::Metadata,
                vec!["Dokumentinformationen".to_string()],
                render_lines(metadata),
            );
        }
    }

    if let Some(overview) = content.get("process_overview") {
        let mut lines = Vec::new();
        if let Some(goal) = str_field(overview, "goal") {
            lines.push(format!("Ziel: {}", goal));
        }
        if let Some(scope) = str_field(overview, "scope") {
            lines.push(format!("Geltungsbereich: {}", scope));
        }
        let general_safety = string_list(overview, "general_safety");
        if !general_safety.is_empty() {
            lines.push(format!("Allgemeine Sicherheit:\n{}", general_safety.join("\n")));
        }
        if lines.is_empty() && !is_empty_value(overview) {
            lines.push(render_lines(overview));
        }
        builder.push(
            "overview",
            ChunkType::Metadata,
            vec!["Prozessübersicht".to_string()],
            lines.join("\n"),
        );
    }

    for step in object_list(content, "steps") {
        let step_number = scalar_field(&step, "step_number");
        let title = str_field(&step, "title")
            .or_else(|| str_field(&step, "label"))
            .unwrap_or_default();

        let mut lines = Vec::new();
        match (&step_number, title.is_empty()) {
            (Some(number), false) => lines.push(format!("Arbeitsschritt {}: {}", number, title)),
            (Some(number), true) => lines.push(format!("Arbeitsschritt {}", number)),
            (None, false) => lines.push(format!("Arbeitsschritt: {}", title)),
            (None, true) => lines.push("Arbeitsschritt".to_string()),
        }
        if let Some(description) = str_field(&step, "description") {
            lines.push(format!("Beschreibung: {}", description));
        }

        if let Some(article_data) = step.get("article_data") {
            if !is_empty_value(article_data) {
                lines.push(format!("Artikeldaten:\n{}", render_lines(article_data)));
            }
        }

        let consumables = object_list(&step, "consumables");
        if !consumables.is_empty() {
            lines.push("Verbrauchsmaterialien:".to_string());
            for consumable in &consumables {
                lines.push(render_consumable(consumable));
            }
        } else {
            let flat = string_list(&step, "consumables");
            if !flat.is_empty() {
                lines.push(format!("Verbrauchsmaterialien:\n{}", flat.join("\n")));
            }
        }

        let tools = string_list(&step, "tools");
        if !tools.is_empty() {
            lines.push(format!("Werkzeuge: {}", tools.join(", ")));
        }
        let safety = string_list(&step, "safety_instructions");
        if !safety.is_empty() {
            lines.push(format!("Sicherheitshinweise:\n{}", safety.join("\n")));
        }
        let quality_checks = string_list(&step, "quality_checks");
        if !quality_checks.is_empty() {
            lines.push(format!("Qualitätsprüfungen:\n{}", quality_checks.join("\n")));
        }

        let role = match &step_number {
            Some(number) => format!("step_{}", number),
            None => "step".to_string(),
        };
        let heading = if title.is_empty() {
            vec!["Arbeitsschritte".to_string()]
        } else {
            vec!["Arbeitsschritte".to_string(), title]
        };
        builder.push(&role, ChunkType::WorkStep, heading, lines.join("\n"));
    }

    Ok(())
}

/// Consumables carry hazard notes that must survive verbatim; everything the
/// vision model emitted for the entry is kept.
fn render_consumable(consumable: &Value) -> String {
    if let Some(name) = str_field(consumable, "name") {
        let mut line = format!("- {}", name);
        if let Some(article_number) = scalar_field(consumable, "article_number") {
            line.push_str(&format!(" (Artikelnummer: {})", article_number));
        }
        if let Some(quantity) = scalar_field(consumable, "quantity") {
            line.push_str(&format!(", Menge: {}", quantity));
        }
        if let Some(hazard) = str_field(consumable, "hazard_notes") {
            line.push_str(&format!("\n  Gefahrenhinweis: {}", hazard));
        }
        line
    } else {
        format!("- {}", render_lines(consumable))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ChunkBuilder;
    use serde_json::json;

    fn chunk_content(content: Value) -> Vec<crate::models::DocumentChunk> {
        let mut builder = ChunkBuilder::new(11);
        builder.set_page(1);
        chunk(&mut builder, &content).unwrap();
        builder.finish()
    }

    #[test]
    fn test_work_step_is_self_contained() {
        let chunks = chunk_content(json!({
            "process_overview": {"goal": "Freilaufwelle tauschen", "scope": "Werkstatt"},
            "steps": [{
                "step_number": 3,
                "title": "Passfeder montieren",
                "description": "Passfeder in die Nut einsetzen.",
                "article_data": {"article_number": "123.456.789", "name": "Passfeder"},
                "consumables": [{
                    "name": "Loctite 243",
                    "article_number": "243-50",
                    "hazard_notes": "Kann allergische Hautreaktionen verursachen."
                }],
                "tools": ["Drehmomentschlüssel", "Kunststoffhammer"],
                "safety_instructions": ["Schutzbrille tragen"],
                "quality_checks": ["Sitz der Passfeder prüfen"]
            }]
        }));

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chunk_id, "doc_11_page_1_overview");

        let step = &chunks[1];
        assert_eq!(step.chunk_id, "doc_11_page_1_step_3");
        assert_eq!(step.metadata.chunk_type, ChunkType::WorkStep);
        assert!(step.text.contains("Passfeder montieren"));
        assert!(step.text.contains("123.456.789"));
        assert!(step.text.contains("Loctite 243"));
        // Hazard note verbatim
        assert!(step.text.contains("Kann allergische Hautreaktionen verursachen."));
        assert!(step.text.contains("Drehmomentschlüssel"));
        assert!(step.text.contains("Sitz der Passfeder prüfen"));
    }

    #[test]
    fn test_steps_without_numbers_get_unique_ids() {
        let chunks = chunk_content(json!({
            "steps": [
                {"title": "Vorbereiten"},
                {"title": "Montieren"}
            ]
        }));

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chunk_id, "doc_11_page_1_step");
        assert_eq!(chunks[1].chunk_id, "doc_11_page_1_step_1");
    }

    #[test]
    fn test_plain_text_page_rejected() {
        let mut builder = ChunkBuilder::new(11);
        assert!(chunk(&mut builder, &json!({"text": "prosa"})).is_err());
    }
}
