//! Flowchart chunking.
//!
//! Nodes and decision points become individual chunks so questions about a
//! single process station can hit exactly that node; all edges land in one
//! connections chunk because routing questions usually need the whole graph.

use anyhow::Result;
use serde_json::Value;

use super::chunker::ChunkBuilder;
use super::vision::{
    is_empty_value, object_list, render_lines, sanitize_id_fragment, scalar_field, str_field,
    string_list,
};
use crate::models::ChunkType;

pub fn chunk(builder: &mut ChunkBuilder, content: &Value) -> Result<()> {
    let has_structure = content.get("nodes").is_some() || content.get("diagram").is_some();
    if !has_structure {
        anyhow::bail!("no flowchart structure in vision JSON");
    }

    if let Some(diagram) = content.get("diagram").or_else(|| content.get("diagram_overview")) {
        let mut lines = Vec::new();
        if let Some(title) = str_field(diagram, "title") {
            lines.push(format!("Flussdiagramm: {}", title));
        }
        if let Some(description) = str_field(diagram, "description") {
            lines.push(format!("Beschreibung: {}", description));
        }
        if let Some(purpose) = str_field(diagram, "purpose") {
            lines.push(format!("Zweck: {}", purpose));
        }
        let swimlanes = string_list(diagram, "swimlanes");
        if !swimlanes.is_empty() {
            lines.push(format!("Verantwortungsbereiche: {}", swimlanes.join(", ")));
        }
        builder.push(
            "diagram",
            ChunkType::Metadata,
            vec!["Diagrammübersicht".to_string()],
            lines.join("\n"),
        );
    }

    for node in object_list(content, "nodes") {
        let node_id = scalar_field(&node, "id");
        let label = str_field(&node, "label").unwrap_or_default();

        let mut lines = Vec::new();
        match (&node_id, label.is_empty()) {
            (Some(id), false) => lines.push(format!("Knoten {}: {}", id, label)),
            (Some(id), true) => lines.push(format!("Knoten {}", id)),
            (None, false) => lines.push(format!("Knoten: {}", label)),
            (None, true) => lines.push("Knoten".to_string()),
        }
        if let Some(node_type) = str_field(&node, "type") {
            lines.push(format!("Typ: {}", node_type));
        }
        if let Some(description) = str_field(&node, "description") {
            lines.push(format!("Beschreibung: {}", description));
        }
        if let Some(responsible) = str_field(&node, "responsible")
            .or_else(|| str_field(&node, "responsible_department"))
        {
            lines.push(format!("Verantwortlich: {}", responsible));
        }
        let inputs = string_list(&node, "inputs");
        if !inputs.is_empty() {
            lines.push(format!("Eingaben: {}", inputs.join(", ")));
        }
        let outputs = string_list(&node, "outputs");
        if !outputs.is_empty() {
            lines.push(format!("Ausgaben: {}", outputs.join(", ")));
        }
        let notes = string_list(&node, "notes");
        if !notes.is_empty() {
            lines.push(format!("Hinweise: {}", notes.join(" ")));
        }

        let role = match &node_id {
            Some(id) => format!("node_{}", sanitize_id_fragment(id)),
            None => "node".to_string(),
        };
        let heading = if label.is_empty() {
            vec!["Knoten".to_string()]
        } else {
            vec!["Knoten".to_string(), label]
        };
        builder.push(&role, ChunkType::FlowchartNode, heading, lines.join("\n"));
    }

    for (index, decision) in object_list(content, "decision_points").iter().enumerate() {
        let question = str_field(decision, "question")
            .or_else(|| str_field(decision, "label"))
            .unwrap_or_default();

        let mut lines = Vec::new();
        if !question.is_empty() {
            lines.push(format!("Entscheidung: {}", question));
        }
        let options = object_list(decision, "options");
        if options.is_empty() {
            let flat = string_list(decision, "options");
            if !flat.is_empty() {
                lines.push(format!("Optionen: {}", flat.join(", ")));
            }
        } else {
            lines.push("Optionen:".to_string());
            for option in &options {
                let label = str_field(option, "label").unwrap_or_else(|| render_lines(option));
                match str_field(option, "target") {
                    Some(target) => lines.push(format!("- {} → {}", label, target)),
                    None => lines.push(format!("- {}", label)),
                }
            }
        }
        if let Some(default) = str_field(decision, "default") {
            lines.push(format!("Standardpfad: {}", default));
        }

        builder.push(
            &format!("decision_{}", index + 1),
            ChunkType::FlowchartDecision,
            vec!["Entscheidungspunkte".to_string()],
            lines.join("\n"),
        );
    }

    let connections = object_list(content, "connections");
    if !connections.is_empty() {
        let mut lines = vec!["Verbindungen:".to_string()];
        for connection in &connections {
            let from = scalar_field(connection, "from").unwrap_or_else(|| "?".to_string());
            let to = scalar_field(connection, "to").unwrap_or_else(|| "?".to_string());
            let mut line = format!("- {} → {}", from, to);
            if let Some(label) = str_field(connection, "label") {
                line.push_str(&format!(" ({})", label));
            }
            if let Some(condition) = str_field(connection, "condition") {
                line.push_str(&format!(", Bedingung: {}", condition));
            }
            if let Some(edge_type) = str_field(connection, "type") {
                line.push_str(&format!(", Typ: {}", edge_type));
            }
            lines.push(line);
        }
        builder.push(
            "connections",
            ChunkType::FlowchartConnections,
            vec!["Verbindungen".to_string()],
            lines.join("\n"),
        );
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

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ChunkBuilder;
    use serde_json::json;

    fn chunk_content(content: Value) -> Vec<crate::models::DocumentChunk> {
        let mut builder = ChunkBuilder::new(5);
        builder.set_page(1);
        chunk(&mut builder, &content).unwrap();
        builder.finish()
    }

    #[test]
    fn test_nodes_decisions_connections() {
        let chunks = chunk_content(json!({
            "diagram": {
                "title": "Reklamationsprozess",
                "purpose": "Ablauf der Fehlerbehandlung",
                "swimlanes": ["Vertrieb", "QM"]
            },
            "nodes": [
                {"id": "n1", "type": "start", "label": "Reklamation eingegangen"},
                {"id": "n5", "type": "process", "label": "Fehler prüfen", "responsible": "QM"}
            ],
            "decision_points": [{
                "question": "Fehler bestätigt?",
                "options": [
                    {"label": "Ja", "target": "n6"},
                    {"label": "Nein", "target": "n9"}
                ],
                "default": "n9"
            }],
            "connections": [
                {"from": "n1", "to": "n5", "type": "sequence"},
                {"from": "n5", "to": "n6", "condition": "Fehler bestätigt"}
            ]
        }));

        let node = chunks
            .iter()
            .find(|c| c.chunk_id == "doc_5_page_1_node_n5")
            .expect("node chunk");
        assert_eq!(node.metadata.chunk_type, ChunkType::FlowchartNode);
        assert!(node.text.contains("Fehler prüfen"));

        let decision = chunks
            .iter()
            .find(|c| c.metadata.chunk_type == ChunkType::FlowchartDecision)
            .expect("decision chunk");
        assert!(decision.text.contains("Fehler bestätigt?"));
        assert!(decision.text.contains("Ja → n6"));
        assert!(decision.text.contains("Standardpfad: n9"));

        let connections = chunks
            .iter()
            .find(|c| c.metadata.chunk_type == ChunkType::FlowchartConnections)
            .expect("connections chunk");
        assert!(connections.text.contains("n1 → n5"));
        assert!(connections.text.contains("Bedingung: Fehler bestätigt"));

        assert!(chunks.iter().any(|c| c.chunk_id == "doc_5_page_1_diagram"));
    }

    #[test]
    fn test_missing_nodes_rejected() {
        let mut builder = ChunkBuilder::new(5);
        assert!(chunk(&mut builder, &json!({"steps": []})).is_err());
    }
}
