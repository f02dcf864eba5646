//! Document-type prompt instructions for the chat orchestrator.
//!
//! The active prompt template of a document type primarily instructs the
//! vision model what JSON to emit; here its schema keys double as the
//! dispatch signal for the answer-style instructions, the same signals the
//! chunking engine uses.

use crate::document::ChunkingStrategy;

/// Citation instruction shared by all instruction blocks. The literal
/// `**Referenz**: chunk N` marker is what the UI parses for click-through.
const CITATION_RULE: &str = r#"7. WICHTIG: Wenn du Informationen aus einem Chunk verwendest, füge direkt nach dem entsprechenden Satz eine Referenz hinzu:
   **Referenz**: chunk [Nummer]
   Beispiel: "Im Schritt 6 wird der Fehler geprüft. **Referenz**: chunk 1"
   Die Referenz muss direkt nach dem verwendeten Text stehen, NICHT am Ende."#;

pub fn instructions_for_prompt(prompt_text: Option<&str>) -> String {
    let strategy = prompt_text.and_then(ChunkingStrategy::detect_in_prompt);

    match strategy {
        Some(ChunkingStrategy::Flowchart) => format!(
            r#"ANWEISUNGEN (Flussdiagramm):
1. Beantworte die Frage präzise basierend auf dem Prozessfluss und den Entscheidungspunkten
2. Fokussiere dich auf die relevanten Schritte und Entscheidungen im Prozess
3. Verwende konkrete Informationen aus den Knoten und Verbindungen
4. Wenn nach spezifischen Informationen gefragt wird (z.B. Artikelnummern, Schritte), gib diese exakt an
5. Antworte auf Deutsch, kurz und präzise
6. Wenn die Antwort nicht im Kontext steht, sage das ehrlich
{}"#,
            CITATION_RULE
        ),
        Some(ChunkingStrategy::WorkInstruction) => format!(
            r#"ANWEISUNGEN (Arbeitsanweisung):
1. Beantworte die Frage präzise basierend auf den konkreten Schritten und Anweisungen
2. Verwende die exakten Schrittnummern und Beschreibungen aus dem Dokument
3. Wenn nach spezifischen Informationen gefragt wird (z.B. Artikelnummern, Teilenummern), gib diese EXAKT aus dem Dokument an
4. Fokussiere dich auf die relevanten Textpassagen - vermeide unnötige Erklärungen
5. Antworte auf Deutsch, kurz und präzise - nur die relevanten Informationen
6. Wenn die Antwort nicht im Kontext steht, sage das ehrlich
{}"#,
            CITATION_RULE
        ),
        Some(ChunkingStrategy::Sop) => format!(
            r#"ANWEISUNGEN (SOP/Prozess):
1. Beantworte die Frage präzise basierend auf den Prozessschritten und Compliance-Anforderungen
2. Verwende die konkreten Prozessschritte und kritischen Regeln aus dem Dokument
3. Wenn nach spezifischen Informationen gefragt wird, gib diese exakt an
4. Strukturiere deine Antwort nach Prozessschritten wenn relevant
5. Antworte auf Deutsch, präzise und fokussiert
6. Wenn die Antwort nicht im Kontext steht, sage das ehrlich
{}"#,
            CITATION_RULE
        ),
        Some(ChunkingStrategy::Datasheet) => format!(
            r#"ANWEISUNGEN (Datenblatt):
1. Beantworte die Frage präzise basierend auf den technischen Daten und Sicherheitsangaben
2. Gib Kennwerte, Artikelnummern und Warnhinweise EXAKT aus dem Dokument wieder
3. Unterscheide klar zwischen technischen Daten, Verarbeitung und Sicherheit
4. Strukturiere deine Antwort übersichtlich
5. Antworte auf Deutsch, kurz und präzise
6. Wenn die Antwort nicht im Kontext steht, sage das ehrlich
{}"#,
            CITATION_RULE
        ),
        _ => generic_instructions(),
    }
}

pub fn generic_instructions() -> String {
    format!(
        r#"ANWEISUNGEN:
1. Beantworte die Frage präzise und hilfreich basierend auf dem strukturierten Kontext
2. Verwende die Metadaten (Überschriften, Seiten, Typ) für präzise Referenzen
3. Wenn nach spezifischen Informationen gefragt wird (z.B. Artikelnummern), gib diese exakt an
4. Strukturiere deine Antwort übersichtlich mit klaren Abschnitten
5. Antworte auf Deutsch
6. Wenn die Antwort nicht im Kontext steht, sage das ehrlich
{}"#,
        CITATION_RULE
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flowchart_prompt_selects_flowchart_instructions() {
        let prompt = r#"Extrahiere "nodes" und "connections" aus dem Diagramm."#;
        let instructions = instructions_for_prompt(Some(prompt));
        assert!(instructions.contains("Flussdiagramm"));
        assert!(instructions.contains("**Referenz**: chunk"));
    }

    #[test]
    fn test_unknown_prompt_falls_back_to_generic() {
        let instructions = instructions_for_prompt(Some("Freitext ohne Schema"));
        assert!(instructions.starts_with("ANWEISUNGEN:"));
        assert!(instructions.contains("**Referenz**: chunk"));
    }

    #[test]
    fn test_missing_prompt_falls_back_to_generic() {
        let instructions = instructions_for_prompt(None);
        assert!(instructions.starts_with("ANWEISUNGEN:"));
    }
}
