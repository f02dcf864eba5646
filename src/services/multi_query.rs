//! Multi-query expansion: ask the LLM for reformulations of a question to
//! improve retrieval recall.

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use super::llm::LlmProvider;

const MAX_VARIANTS: usize = 5;
const EXPANSION_MODEL: &str = "gpt-4o-mini";

static NUMBERING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\.\s*").expect("valid regex"));

pub struct MultiQueryService {
    llm: Arc<dyn LlmProvider>,
}

impl MultiQueryService {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Produce up to five deduplicated variants, the original query first.
    /// LLM failures propagate; the caller decides how to degrade.
    pub async fn generate_queries(&self, original_query: &str) -> Result<Vec<String>> {
        let original = original_query.trim();
        if original.is_empty() {
            anyhow::bail!("Query cannot be empty");
        }

        let prompt = format!(
            r#"Erstelle 3-5 verschiedene Formulierungen für diese Frage, um bessere Suchergebnisse zu erzielen:

Original: {}

Erstelle Varianten die:
- Synonyme verwenden
- Verschiedene Formulierungen nutzen
- Fachbegriffe und Umgangssprache mischen
- Verschiedene Fragewörter verwenden

Format: Eine Frage pro Zeile, nummeriert."#,
            original
        );

        let completion = self.llm.generate(EXPANSION_MODEL, &prompt).await?;

        let mut variants = vec![original.to_string()];
        variants.extend(parse_variants(&completion.content));

        let mut seen = HashSet::new();
        let mut unique = Vec::new();
        for variant in variants {
            let normalized = variant.to_lowercase();
            if seen.insert(normalized) {
                unique.push(variant);
            }
            if unique.len() >= MAX_VARIANTS {
                break;
            }
        }

        debug!(count = unique.len(), "Expanded query variants");
        Ok(unique)
    }
}

fn parse_variants(response: &str) -> Vec<String> {
    response
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| NUMBERING.replace(line, "").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}
