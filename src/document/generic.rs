//! Generic fallback chunking: plain text chunks plus flattened table rows.
//!
//! Used for document types without a structured strategy and as the
//! degradation path when a structured strategy fails on a page.

use anyhow::Result;
use serde_json::Value;

use super::chunker::ChunkBuilder;
use super::vision::{object_list, str_field, string_list};
use crate::models::ChunkType;

/// Upper bound per text chunk; sections are grouped until the next paragraph
/// would cross it.
const MAX_CHUNK_CHARS: usize = 1200;

pub fn chunk(builder: &mut ChunkBuilder, content: &Value) -> Result<()> {
    let mut text_parts: Vec<String> = Vec::new();

    match content {
        Value::String(s) if !s.trim().is_empty() => text_parts.push(s.trim().to_string()),
        _ => {
            if let Some(text) = str_field(content, "text") {
                text_parts.push(text);
            }
            // Image descriptions and OCR text are folded into text chunks;
            // there is no separate image retrieval role.
            for image in object_list(content, "images") {
                let mut lines = Vec::new();
                if let Some(description) = str_field(&image, "description") {
                    lines.push(format!("Abbildung: {}", description));
                }
                if let Some(ocr) = str_field(&image, "ocr_text") {
                    lines.push(ocr);
                }
                if !lines.is_empty() {
                    text_parts.push(lines.join("\n"));
                }
            }
        }
    }

    let mut text_index = 0;
    for piece in split_into_chunks(&text_parts.join("\n\n")) {
        builder.push(
            &format!("text_{}", text_index),
            ChunkType::Text,
            Vec::new(),
            piece,
        );
        text_index += 1;
    }

    for (table_index, table) in object_list(content, "tables").iter().enumerate() {
        let rows = flatten_table(table);
        if rows.is_empty() {
            continue;
        }
        let mut lines = Vec::new();
        if let Some(title) = str_field(table, "title") {
            lines.push(format!("Tabelle: {}", title));
        }
        lines.extend(rows);
        builder.push(
            &format!("table_{}", table_index),
            ChunkType::Table,
            Vec::new(),
            lines.join("\n"),
        );
    }

    Ok(())
}

/// Group paragraphs into chunks of at most `MAX_CHUNK_CHARS`. A single
/// oversized paragraph becomes its own chunk rather than being cut mid-word.
fn split_into_chunks(text: &str) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in trimmed.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }
        if !current.is_empty() && current.len() + paragraph.len() + 2 > MAX_CHUNK_CHARS {
            chunks.push(current.clone());
            current.clear();
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

fn flatten_table(table: &Value) -> Vec<String> {
    table
        .get("data")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| {
                    let cells: Vec<String> = match row {
                        Value::Array(_) => row
                            .as_array()
                            .map(|cells| {
                                cells
                                    .iter()
                                    .map(|c| match c {
                                        Value::String(s) => s.trim().to_string(),
                                        other => other.to_string(),
                                    })
                                    .collect()
                            })
                            .unwrap_or_default(),
                        _ => return None,
                    };
                    if cells.iter().all(|c| c.is_empty()) {
                        None
                    } else {
                        Some(cells.join(" | "))
                    }
                })
                .collect()
        })
        .unwrap_or_else(|| {
            let rows = string_list(table, "rows");
            rows
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ChunkBuilder;
    use serde_json::json;

    fn chunk_content(content: Value) -> Vec<crate::models::DocumentChunk> {
        let mut builder = ChunkBuilder::new(1);
        builder.set_page(1);
        chunk(&mut builder, &content).unwrap();
        builder.finish()
    }

    #[test]
    fn test_text_tables_and_images() {
        let chunks = chunk_content(json!({
            "text": "Arbeitsanweisung WA-001: Freilaufwelle\nArtikelnummer: 123.456.789",
            "tables": [{
                "data": [
                    ["Teil", "Artikelnummer", "Beschreibung"],
                    ["Freilaufwelle", "123.456.789", "Hauptkomponente"],
                    ["Lager", "987.654.321", "Lagerung"]
                ]
            }],
            "images": [{
                "description": "Freilaufwelle Montage",
                "ocr_text": "Freilaufwelle 123.456.789"
            }]
        }));

        let text_chunks: Vec<_> = chunks
            .iter()
            .filter(|c| c.metadata.chunk_type == ChunkType::Text)
            .collect();
        let table_chunks: Vec<_> = chunks
            .iter()
            .filter(|c| c.metadata.chunk_type == ChunkType::Table)
            .collect();

        assert!(!text_chunks.is_empty());
        assert_eq!(table_chunks.len(), 1);
        assert!(table_chunks[0].text.contains("Freilaufwelle | 123.456.789 | Hauptkomponente"));
        assert!(table_chunks[0].text.contains("987.654.321"));
        // OCR text from images lands in a text chunk
        assert!(text_chunks
            .iter()
            .any(|c| c.text.contains("Freilaufwelle Montage")));
    }

    #[test]
    fn test_long_text_is_split() {
        let paragraph = "Absatz mit Inhalt. ".repeat(30);
        let text = format!("{}\n\n{}\n\n{}", paragraph, paragraph, paragraph);
        let chunks = chunk_content(json!({ "text": text }));

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert_eq!(chunk.metadata.chunk_type, ChunkType::Text);
        }
    }

    #[test]
    fn test_plain_string_content() {
        let chunks = chunk_content(json!("Nur ein einzelner Satz."));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_id, "doc_1_page_1_text_0");
    }

    #[test]
    fn test_empty_page_emits_nothing() {
        let chunks = chunk_content(json!({"text": "", "tables": []}));
        assert!(chunks.is_empty());
    }
}
