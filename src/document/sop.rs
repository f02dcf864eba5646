//! SOP / process description chunking.
//!
//! Emits one metadata chunk, one chunk per process step, a combined
//! compliance chunk, one chunk per critical rule, plus references and
//! definitions, so retrieval can target a single step or rule directly.

use anyhow::Result;
use serde_json::Value;

use super::chunker::ChunkBuilder;
use super::vision::{is_empty_value, object_list, render_lines, scalar_field, str_field, string_list};
use crate::models::ChunkType;

pub fn chunk(builder: &mut ChunkBuilder, content: &Value) -> Result<()> {
    let has_structure = content.get("process_steps").is_some()
        || content.get("document_metadata").is_some()
        || content.get("critical_rules").is_some();
    if !has_structure {
        anyhow::bail!("no SOP structure in vision JSON");
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

    for step in object_list(content, "process_steps") {
        let step_number = scalar_field(&step, "step_number");
        let label = str_field(&step, "label")
            .or_else(|| str_field(&step, "title"))
            .unwrap_or_default();

        let mut lines = Vec::new();
        match (&step_number, label.is_empty()) {
            (Some(number), false) => lines.push(format!("Prozessschritt {}: {}", number, label)),
            (Some(number), true) => lines.push(format!("Prozessschritt {}", number)),
            (None, false) => lines.push(format!("Prozessschritt: {}", label)),
            (None, true) => lines.push("Prozessschritt".to_string()),
        }
        if let Some(description) = str_field(&step, "description") {
            lines.push(format!("Beschreibung: {}", description));
        }
        if let Some(responsible) = str_field(&step, "responsible")
            .or_else(|| str_field(&step, "responsible_department"))
        {
            lines.push(format!("Verantwortlich: {}", responsible));
        }
        let inputs = string_list(&step, "inputs");
        if !inputs.is_empty() {
            lines.push(format!("Eingaben: {}", inputs.join(", ")));
        }
        let outputs = string_list(&step, "outputs");
        if !outputs.is_empty() {
            lines.push(format!("Ausgaben: {}", outputs.join(", ")));
        }
        if let Some(decision) = step.get("decision").or_else(|| step.get("decision_branches")) {
            if !is_empty_value(decision) {
                lines.push(format!("Entscheidung: {}", render_lines(decision)));
            }
        }
        let notes = string_list(&step, "notes");
        if !notes.is_empty() {
            lines.push(format!("Hinweise: {}", notes.join(" ")));
        }

        let role = match &step_number {
            Some(number) => format!("step_{}", number),
            None => "step".to_string(),
        };
        let heading = if label.is_empty() {
            vec!["Prozessschritte".to_string()]
        } else {
            vec!["Prozessschritte".to_string(), label]
        };
        builder.push(&role, ChunkType::ProcessStep, heading, lines.join("\n"));
    }

    let compliance = string_list(content, "compliance_requirements");
    if !compliance.is_empty() {
        let text = format!("Compliance-Anforderungen:\n{}", compliance.join("\n"));
        builder.push(
            "compliance",
            ChunkType::Compliance,
            vec!["Compliance".to_string()],
            text,
        );
    }

    for (index, rule) in object_list(content, "critical_rules").iter().enumerate() {
        let rule_text = str_field(rule, "rule")
            .or_else(|| str_field(rule, "text"))
            .unwrap_or_else(|| render_lines(rule));
        if rule_text.is_empty() {
            continue;
        }

        let mut lines = vec![format!("Kritische Regel: {}", rule_text)];
        if let Some(step_ref) = scalar_field(rule, "step_reference") {
            lines.push(format!("Bezieht sich auf Schritt: {}", step_ref));
        }
        builder.push(
            &format!("rule_{}", index + 1),
            ChunkType::CriticalRule,
            vec!["Kritische Regeln".to_string()],
            lines.join("\n"),
        );
    }

    let references = string_list(content, "references");
    if !references.is_empty() {
        builder.push(
            "references",
            ChunkType::References,
            vec!["Mitgeltende Dokumente".to_string()],
            format!("Referenzen:\n{}", references.join("\n")),
        );
    }

    if let Some(definitions) = content.get("definitions") {
        let text = render_definitions(definitions);
        if !text.is_empty() {
            builder.push(
                "definitions",
                ChunkType::Definitions,
                vec!["Begriffe und Definitionen".to_string()],
                text,
            );
        }
    }

    Ok(())
}

fn render_definitions(definitions: &Value) -> String {
    match definitions {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| {
                let term = str_field(item, "term")?;
                let definition = str_field(item, "definition").unwrap_or_default();
                Some(format!("{}: {}", term, definition))
            })
            .collect::<Vec<_>>()
            .join("\n"),
        other => render_lines(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ChunkBuilder;
    use serde_json::json;

    fn chunk_content(content: Value) -> Vec<crate::models::DocumentChunk> {
        let mut builder = ChunkBuilder::new(42);
        builder.set_page(1);
        chunk(&mut builder, &content).unwrap();
        builder.finish()
    }

    #[test]
    fn test_step_chunk_id_uses_step_number() {
        let chunks = chunk_content(json!({
            "process_steps": [{
                "step_number": 6,
                "label": "Fehlerprüfung",
                "description": "Prüfe den Fehler",
                "responsible": "QMB"
            }]
        }));

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_id, "doc_42_page_1_step_6");
        assert_eq!(chunks[0].metadata.chunk_type, ChunkType::ProcessStep);
        assert!(chunks[0].text.contains("Fehlerprüfung"));
        assert!(chunks[0].text.contains("Prüfe den Fehler"));
        assert!(chunks[0].text.contains("QMB"));
    }

    #[test]
    fn test_full_sop_emits_all_sections() {
        let chunks = chunk_content(json!({
            "document_metadata": {"title": "SOP-001", "version": "2.0"},
            "process_steps": [
                {"step_number": 1, "label": "Eingang", "inputs": ["Reklamation"], "outputs": ["Ticket"]},
                {"step_number": 2, "label": "Bewertung", "decision": {"ja": "Schritt 3", "nein": "Ende"}}
            ],
            "compliance_requirements": ["ISO 13485 Kap. 8.2", "MDR Artikel 83"],
            "critical_rules": [{"rule": "Fristen einhalten", "step_reference": 2}],
            "references": ["SOP-002"],
            "definitions": [{"term": "CAPA", "definition": "Korrektur- und Vorbeugemassnahme"}]
        }));

        let types: Vec<ChunkType> = chunks.iter().map(|c| c.metadata.chunk_type).collect();
        assert!(types.contains(&ChunkType::Metadata));
        assert!(types.contains(&ChunkType::ProcessStep));
        assert!(types.contains(&ChunkType::Compliance));
        assert!(types.contains(&ChunkType::CriticalRule));
        assert!(types.contains(&ChunkType::References));
        assert!(types.contains(&ChunkType::Definitions));

        let compliance = chunks
            .iter()
            .find(|c| c.metadata.chunk_type == ChunkType::Compliance)
            .unwrap();
        assert!(compliance.text.contains("ISO 13485"));
        assert!(compliance.text.contains("MDR Artikel 83"));

        let rule = chunks
            .iter()
            .find(|c| c.metadata.chunk_type == ChunkType::CriticalRule)
            .unwrap();
        assert_eq!(rule.chunk_id, "doc_42_page_1_rule_1");
        assert!(rule.text.contains("Bezieht sich auf Schritt: 2"));
    }

    #[test]
    fn test_unstructured_page_is_rejected() {
        let mut builder = ChunkBuilder::new(42);
        let result = chunk(&mut builder, &json!({"text": "nur text"}));
        assert!(result.is_err());
    }
}
