//! Chat Orchestrator: answer a question in the context of a session,
//! grounded in retrieved chunks, with source references the UI can click
//! through to page previews.
//!
//! Contract pinned by tests: LLM failures and empty retrievals never raise
//! out of the use case; both produce a canned assistant message recorded
//! against the session.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::event_bus::SystemEvent;
use super::llm::LlmProvider;
use super::multi_query::MultiQueryService;
use super::ports::{ChatStore, EventSink, PromptTemplateSource, UploadGateway};
use super::prompts;
use super::retrieval::{RetrievalService, SearchResult};
use crate::database::models::{ChatMessageRow, ChatSessionRow};
use crate::models::api::{AskQuestionRequest, SourceReference};
use crate::utils::error::ApiError;
use crate::vector::SearchFilters;

/// Marker recorded as `ai_model_used` when no chunks were retrieved and the
/// LLM was therefore not invoked.
pub const NO_CONTEXT_MODEL: &str = "no_context";

const NO_CONTEXT_ANSWER: &str = "Entschuldigung, ich konnte keine relevanten Informationen zu Ihrer Frage in den verfügbaren Dokumenten finden. Bitte stellen Sie eine andere Frage oder überprüfen Sie, ob die Dokumente korrekt indexiert sind.";

const EMPTY_ANSWER_FALLBACK: &str = "Entschuldigung, ich konnte keine Antwort generieren. Bitte versuchen Sie es erneut oder verwenden Sie ein anderes Modell (z.B. GPT-4o Mini).";

const EXCERPT_CHARS: usize = 200;

#[derive(Debug)]
pub struct AnswerOutcome {
    pub content: String,
    pub model_used: String,
    pub source_references: Vec<SourceReference>,
    pub message: Option<ChatMessageRow>,
}

pub struct ChatService {
    chat_store: Arc<dyn ChatStore>,
    upload_gateway: Arc<dyn UploadGateway>,
    prompt_source: Arc<dyn PromptTemplateSource>,
    retrieval: Arc<RetrievalService>,
    llm: Arc<dyn LlmProvider>,
    multi_query: Option<Arc<MultiQueryService>>,
    events: Arc<dyn EventSink>,
}

impl ChatService {
    pub fn new(
        chat_store: Arc<dyn ChatStore>,
        upload_gateway: Arc<dyn UploadGateway>,
        prompt_source: Arc<dyn PromptTemplateSource>,
        retrieval: Arc<RetrievalService>,
        llm: Arc<dyn LlmProvider>,
        multi_query: Option<Arc<MultiQueryService>>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            chat_store,
            upload_gateway,
            prompt_source,
            retrieval,
            llm,
            multi_query,
            events,
        }
    }

    pub async fn ask_question(
        &self,
        request: &AskQuestionRequest,
    ) -> Result<AnswerOutcome, ApiError> {
        RetrievalService::validate_query(&request.question)?;

        if !self.llm.is_known_model(&request.model) {
            return Err(ApiError::BadRequest(format!(
                "Unbekanntes Modell: {}",
                request.model
            )));
        }

        // Session must exist before anything is persisted.
        if let Some(session_id) = request.session_id {
            self.require_session(session_id).await?;
            self.chat_store
                .insert_message(
                    session_id,
                    "user",
                    request.question.trim(),
                    &[],
                    &HashMap::new(),
                    &[],
                    None,
                )
                .await
                .map_err(|e| ApiError::DatabaseError(e.to_string()))?;
        }

        let queries = self.expand_query(&request.question).await;
        let filters = build_filters(request);
        let results = self
            .retrieve(&queries, &filters, request)
            .await?;

        if results.is_empty() {
            info!("No chunks retrieved, returning canned answer without LLM call");
            return self
                .record_assistant_message(
                    request.session_id,
                    NO_CONTEXT_ANSWER,
                    NO_CONTEXT_MODEL,
                    &[],
                )
                .await;
        }

        let document_type = results
            .iter()
            .find_map(|r| {
                r.payload
                    .get("document_type")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .or_else(|| {
                request
                    .filters
                    .as_ref()
                    .and_then(|f| f.document_type.clone())
            });

        let prompt = self
            .compose_prompt(&request.question, &results, document_type.as_deref())
            .await;

        match self.llm.generate(&request.model, &prompt).await {
            Ok(completion) if !completion.content.trim().is_empty() => {
                self.record_assistant_message(
                    request.session_id,
                    completion.content.trim(),
                    &completion.model_used,
                    &results,
                )
                .await
            }
            Ok(_) => {
                warn!(model = %request.model, "LLM returned empty content");
                self.record_assistant_message(
                    request.session_id,
                    EMPTY_ANSWER_FALLBACK,
                    &request.model,
                    &[],
                )
                .await
            }
            Err(error) => {
                // Surfaced to the user, never re-raised.
                warn!(model = %request.model, %error, "LLM generation failed");
                let answer = format!(
                    "Entschuldigung, bei der Antwortgenerierung ist ein Fehler aufgetreten: {}. Bitte versuchen Sie es erneut oder verwenden Sie ein anderes Modell (z.B. GPT-4o Mini oder Gemini 2.5 Flash).",
                    error
                );
                self.record_assistant_message(request.session_id, &answer, &request.model, &[])
                    .await
            }
        }
    }

    async fn require_session(&self, session_id: i32) -> Result<ChatSessionRow, ApiError> {
        self.chat_store
            .get_session(session_id)
            .await
            .map_err(|e| ApiError::DatabaseError(e.to_string()))?
            .ok_or_else(|| ApiError::NotFound(format!("Session {} nicht gefunden", session_id)))
    }

    /// Optional multi-query expansion; degrades to the original question.
    async fn expand_query(&self, question: &str) -> Vec<String> {
        let Some(multi_query) = &self.multi_query else {
            return vec![question.to_string()];
        };

        match multi_query.generate_queries(question).await {
            Ok(variants) => variants,
            Err(error) => {
                warn!(%error, "Query expansion failed, proceeding with original question");
                vec![question.to_string()]
            }
        }
    }

    /// Retrieve over all query variants, deduplicate by chunk id keeping the
    /// best score, and trim to the requested top_k.
    async fn retrieve(
        &self,
        queries: &[String],
        filters: &SearchFilters,
        request: &AskQuestionRequest,
    ) -> Result<Vec<SearchResult>, ApiError> {
        let top_k = request.top_k.max(1);
        let mut best: HashMap<String, SearchResult> = HashMap::new();

        for query in queries {
            let results = self
                .retrieval
                .search(query, filters, top_k, request.score_threshold, request.use_hybrid_search)
                .await?;
            for result in results {
                match best.get(&result.chunk_id) {
                    Some(existing) if existing.score >= result.score => {}
                    _ => {
                        best.insert(result.chunk_id.clone(), result);
                    }
                }
            }
        }

        let mut merged: Vec<SearchResult> = best.into_values().collect();
        merged.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        merged.truncate(top_k);

        debug!(variants = queries.len(), results = merged.len(), "Retrieval complete");
        Ok(merged)
    }

    /// Context block per the numbered-chunk format the citation instruction
    /// refers to, plus document-type-specific answer instructions.
    async fn compose_prompt(
        &self,
        question: &str,
        results: &[SearchResult],
        document_type: Option<&str>,
    ) -> String {
        let mut context = String::new();
        for (index, result) in results.iter().enumerate() {
            let payload = &result.payload;
            let mut meta_lines = Vec::new();

            if let Some(headings) = payload.get("heading_hierarchy").and_then(Value::as_array) {
                let path: Vec<&str> = headings.iter().filter_map(Value::as_str).collect();
                if !path.is_empty() {
                    meta_lines.push(format!("Überschriften: {}", path.join(" > ")));
                }
            }
            if let Some(pages) = payload.get("page_numbers").and_then(Value::as_array) {
                let pages: Vec<String> = pages
                    .iter()
                    .filter_map(Value::as_i64)
                    .map(|p| p.to_string())
                    .collect();
                if !pages.is_empty() {
                    meta_lines.push(format!("Seiten: {}", pages.join(", ")));
                }
            }
            if let Some(chunk_type) = payload.get("chunk_type").and_then(Value::as_str) {
                meta_lines.push(format!("Typ: {}", chunk_type));
            }

            let meta = if meta_lines.is_empty() {
                "Keine Metadaten verfügbar".to_string()
            } else {
                meta_lines.join("\n")
            };

            context.push_str(&format!(
                "Chunk {}:\n{}\n\nInhalt:\n{}\n\n---\n\n",
                index + 1,
                meta,
                result.chunk_text()
            ));
        }

        let instructions = match document_type {
            Some(document_type) => {
                let template = self
                    .prompt_source
                    .get_active_for_document_type(document_type)
                    .await
                    .ok()
                    .flatten();
                prompts::instructions_for_prompt(template.as_ref().map(|t| t.prompt_text.as_str()))
            }
            None => prompts::generic_instructions(),
        };

        format!(
            r#"Du bist ein Experte für Qualitätsmanagement und medizinische Dokumentation. Beantworte die folgende Frage basierend auf den bereitgestellten strukturierten Dokument-Auszügen.

KONTEXT (aus indexierten Dokumenten mit Metadaten):
{}

FRAGE: {}

{}

ANTWORT (strukturiert mit Metadaten-Referenzen direkt im Text):"#,
            context, question, instructions
        )
    }

    /// Persist the assistant message with sources and emit the chat event.
    /// Without a session the answer is returned unpersisted.
    async fn record_assistant_message(
        &self,
        session_id: Option<i32>,
        content: &str,
        model_used: &str,
        results: &[SearchResult],
    ) -> Result<AnswerOutcome, ApiError> {
        let source_chunk_ids: Vec<String> =
            results.iter().map(|r| r.chunk_id.clone()).collect();
        let confidence_scores: HashMap<String, f32> = results
            .iter()
            .map(|r| (r.chunk_id.clone(), r.score.clamp(0.0, 1.0)))
            .collect();
        let source_references = self.materialize_source_references(results).await;

        let message = match session_id {
            Some(session_id) => {
                let row = self
                    .chat_store
                    .insert_message(
                        session_id,
                        "assistant",
                        content,
                        &source_chunk_ids,
                        &confidence_scores,
                        &source_references,
                        Some(model_used),
                    )
                    .await
                    .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

                self.events.publish(SystemEvent::ChatMessageCreated {
                    session_id,
                    message_id: row.id,
                    ai_model_used: model_used.to_string(),
                    timestamp: chrono::Utc::now(),
                });

                Some(row)
            }
            None => None,
        };

        Ok(AnswerOutcome {
            content: content.to_string(),
            model_used: model_used.to_string(),
            source_references,
            message,
        })
    }

    /// Resolve retrieval hits back to clickable origins: document title from
    /// the upload context, page preview path, text excerpt.
    async fn materialize_source_references(
        &self,
        results: &[SearchResult],
    ) -> Vec<SourceReference> {
        let mut references = Vec::with_capacity(results.len());
        let mut title_cache: HashMap<i32, String> = HashMap::new();

        for result in results {
            let document_id = result
                .payload
                .get("document_id")
                .and_then(Value::as_i64)
                .unwrap_or(0) as i32;
            let page_number = result
                .payload
                .get("page_numbers")
                .and_then(Value::as_array)
                .and_then(|pages| pages.first())
                .and_then(Value::as_i64)
                .unwrap_or(1) as i32;

            let title = match title_cache.get(&document_id) {
                Some(title) => title.clone(),
                None => {
                    let title = self
                        .upload_gateway
                        .get_upload_document(document_id)
                        .await
                        .ok()
                        .flatten()
                        .map(|doc| doc.title)
                        .unwrap_or_else(|| format!("Dokument {}", document_id));
                    title_cache.insert(document_id, title.clone());
                    title
                }
            };

            let preview_image_path = self
                .upload_gateway
                .get_preview_image_path(document_id, page_number)
                .await
                .ok()
                .flatten()
                .unwrap_or_default();

            let text = result.chunk_text();
            let excerpt = if text.chars().count() > EXCERPT_CHARS {
                let cut: String = text.chars().take(EXCERPT_CHARS).collect();
                format!("{}...", cut)
            } else {
                text.to_string()
            };

            references.push(SourceReference::new(
                document_id,
                title,
                page_number,
                result.chunk_id.clone(),
                preview_image_path,
                result.score,
                excerpt,
            ));
        }

        references
    }

    // ===== Session use cases =====

    pub async fn create_session(
        &self,
        user_id: i32,
        session_name: &str,
    ) -> Result<ChatSessionRow, ApiError> {
        if session_name.trim().is_empty() {
            return Err(ApiError::BadRequest(
                "Session name cannot be empty".to_string(),
            ));
        }
        if user_id <= 0 {
            return Err(ApiError::BadRequest("user_id must be positive".to_string()));
        }

        self.chat_store
            .create_session(user_id, session_name.trim())
            .await
            .map_err(|e| ApiError::DatabaseError(e.to_string()))
    }

    pub async fn rename_session(
        &self,
        session_id: i32,
        session_name: &str,
    ) -> Result<ChatSessionRow, ApiError> {
        if session_name.trim().is_empty() {
            return Err(ApiError::BadRequest(
                "Session name cannot be empty".to_string(),
            ));
        }

        self.chat_store
            .rename_session(session_id, session_name.trim())
            .await
            .map_err(|e| ApiError::DatabaseError(e.to_string()))?
            .ok_or_else(|| ApiError::NotFound(format!("Session {} nicht gefunden", session_id)))
    }

    pub async fn list_sessions(&self, user_id: i32) -> Result<Vec<ChatSessionRow>, ApiError> {
        self.chat_store
            .list_sessions_by_user(user_id)
            .await
            .map_err(|e| ApiError::DatabaseError(e.to_string()))
    }

    pub async fn delete_session(&self, session_id: i32) -> Result<(), ApiError> {
        let deleted = self
            .chat_store
            .delete_session(session_id)
            .await
            .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

        if !deleted {
            return Err(ApiError::NotFound(format!(
                "Session {} nicht gefunden",
                session_id
            )));
        }
        Ok(())
    }

    /// Chronological history, `ai_model_used` preserved per message.
    pub async fn get_history(&self, session_id: i32) -> Result<Vec<ChatMessageRow>, ApiError> {
        self.require_session(session_id).await?;
        self.chat_store
            .get_messages_by_session(session_id)
            .await
            .map_err(|e| ApiError::DatabaseError(e.to_string()))
    }
}

fn build_filters(request: &AskQuestionRequest) -> SearchFilters {
    let mut filters = SearchFilters::default();
    if let Some(question_filters) = &request.filters {
        filters.document_type = question_filters.document_type.clone();
    }
    filters
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::LimitsConfig;
    use crate::database::models::UploadDocumentRow;
    use crate::models::api::QuestionFilters;
    use crate::services::embedding::{EmbeddingProvider, LocalEmbeddingProvider};
    use crate::services::llm::{LlmCompletion, MockLlmProvider};
    use crate::vector::VectorStore;
    use crate::services::ports::{
        MockChatStore, MockEventSink, MockPromptTemplateSource, MockUploadGateway,
    };
    use crate::utils::limiters::Limiters;
    use crate::vector::memory::InMemoryVectorStore;
    use crate::vector::VectorPoint;
    use chrono::Utc;
    use serde_json::json;
    use sqlx::types::Json;

    fn message_row(
        id: i32,
        session_id: i32,
        role: &str,
        content: &str,
        model: Option<&str>,
    ) -> ChatMessageRow {
        ChatMessageRow {
            id,
            session_id,
            role: role.to_string(),
            content: content.to_string(),
            source_chunk_ids: Json(Vec::new()),
            confidence_scores: Json(HashMap::new()),
            source_references: Json(Vec::new()),
            ai_model_used: model.map(str::to_string),
            created_at: Utc::now(),
        }
    }

    fn session_row(id: i32) -> ChatSessionRow {
        ChatSessionRow {
            id,
            user_id: 1,
            session_name: "Testsitzung".to_string(),
            created_at: Utc::now(),
            last_message_at: None,
            is_active: true,
        }
    }

    fn completion(content: &str, model: &str) -> LlmCompletion {
        LlmCompletion {
            content: content.to_string(),
            model_used: model.to_string(),
            provider: "openai".to_string(),
            tokens_used: 42,
        }
    }

    async fn retrieval_with_chunks(
        chunks: &[(&str, &str, &str)],
    ) -> Arc<RetrievalService> {
        let embedding: Arc<dyn EmbeddingProvider> = Arc::new(LocalEmbeddingProvider::new(None));
        let store = Arc::new(InMemoryVectorStore::new());
        store.ensure_collection("rag_documents", 384).await.unwrap();

        let mut points = Vec::new();
        for (chunk_id, chunk_type, text) in chunks {
            let vector = embedding.generate(text).await.unwrap().vector;
            points.push(VectorPoint {
                id: crate::utils::point_id::point_id_for_chunk(chunk_id),
                vector,
                payload: json!({
                    "document_id": 42,
                    "document_type": "SOP",
                    "page_numbers": [1],
                    "chunk_id": chunk_id,
                    "chunk_type": chunk_type,
                    "chunk_text": text,
                    "heading_hierarchy": ["Prozessschritte"],
                    "token_count": 12
                }),
            });
        }
        store.upsert_batch("rag_documents", points).await.unwrap();

        let limiters = Arc::new(Limiters::new(&LimitsConfig {
            embedding_concurrency: 4,
            vector_search_concurrency: 4,
            llm_generate_concurrency: 2,
            acquire_timeout_ms: 1000,
        }));
        Arc::new(RetrievalService::new(
            embedding,
            store,
            "rag_documents".to_string(),
            limiters,
        ))
    }

    struct Fixture {
        chat_store: MockChatStore,
        upload: MockUploadGateway,
        prompts: MockPromptTemplateSource,
        llm: MockLlmProvider,
        events: MockEventSink,
    }

    impl Fixture {
        fn new() -> Self {
            let mut upload = MockUploadGateway::new();
            upload.expect_get_upload_document().returning(|id| {
                Ok(Some(UploadDocumentRow {
                    id,
                    title: "SOP Reklamationsbearbeitung".to_string(),
                    document_type: "SOP".to_string(),
                    status: "approved".to_string(),
                }))
            });
            upload
                .expect_get_preview_image_path()
                .returning(|doc, page| Ok(Some(format!("/previews/{}/{}.png", doc, page))));

            let mut prompts = MockPromptTemplateSource::new();
            prompts
                .expect_get_active_for_document_type()
                .returning(|_| Ok(None));

            Self {
                chat_store: MockChatStore::new(),
                upload,
                prompts,
                llm: MockLlmProvider::new(),
                events: MockEventSink::new(),
            }
        }

        fn known_models(&mut self) {
            self.llm
                .expect_is_known_model()
                .returning(|model| {
                    ["gpt-4o-mini", "gpt-5-mini", "gemini-2.5-flash"].contains(&model)
                });
        }

        async fn build(self, chunks: &[(&str, &str, &str)]) -> ChatService {
            ChatService::new(
                Arc::new(self.chat_store),
                Arc::new(self.upload),
                Arc::new(self.prompts),
                retrieval_with_chunks(chunks).await,
                Arc::new(self.llm),
                None,
                Arc::new(self.events),
            )
        }
    }

    fn request(question: &str, session_id: Option<i32>, model: &str) -> AskQuestionRequest {
        AskQuestionRequest {
            question: question.to_string(),
            session_id,
            user_id: Some(1),
            model: model.to_string(),
            top_k: 5,
            score_threshold: 0.2,
            filters: None,
            use_hybrid_search: true,
        }
    }

    #[tokio::test]
    async fn test_answer_carries_sources_and_model() {
        let mut fixture = Fixture::new();
        fixture.known_models();

        fixture
            .chat_store
            .expect_get_session()
            .returning(|id| Ok(Some(session_row(id))));

        let persisted: Arc<std::sync::Mutex<Vec<(String, String, Option<String>)>>> =
            Arc::new(std::sync::Mutex::new(Vec::new()));
        let capture = persisted.clone();
        fixture.chat_store.expect_insert_message().returning(
            move |session_id, role, content, _, _, _, model| {
                capture.lock().unwrap().push((
                    role.to_string(),
                    content.to_string(),
                    model.map(str::to_string),
                ));
                Ok(message_row(1, session_id, role, content, model))
            },
        );
        fixture.events.expect_publish().times(1).return_const(());
        fixture.llm.expect_generate().returning(|_, prompt| {
            assert!(prompt.contains("Chunk 1:"));
            assert!(prompt.contains("**Referenz**: chunk"));
            Ok(completion(
                "Im Prozessschritt 6 wird der Fehler geprüft (Fehlerprüfung). **Referenz**: chunk 1",
                "gpt-4o-mini",
            ))
        });

        let service = fixture
            .build(&[(
                "doc_42_page_1_step_6",
                "process_step",
                "Prozessschritt 6: Fehlerprüfung\nBeschreibung: Prüfe den Fehler",
            )])
            .await;

        let outcome = service
            .ask_question(&request(
                "Prozessschritt 6 Fehlerprüfung was passiert?",
                Some(9),
                "gpt-4o-mini",
            ))
            .await
            .unwrap();

        assert!(outcome.content.contains("Fehlerprüfung"));
        assert_eq!(outcome.model_used, "gpt-4o-mini");
        assert_eq!(outcome.source_references.len(), 1);

        let reference = &outcome.source_references[0];
        assert_eq!(reference.chunk_id, "doc_42_page_1_step_6");
        assert_eq!(reference.document_id, 42);
        assert_eq!(reference.page_number, 1);
        assert_eq!(reference.document_title, "SOP Reklamationsbearbeitung");
        assert_eq!(reference.preview_image_path, "/previews/42/1.png");
        assert!((0.0..=1.0).contains(&reference.relevance_score));

        // user message first, then assistant with the model recorded
        let messages = persisted.lock().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].0, "user");
        assert_eq!(messages[0].2, None);
        assert_eq!(messages[1].0, "assistant");
        assert_eq!(messages[1].2.as_deref(), Some("gpt-4o-mini"));
    }

    #[tokio::test]
    async fn test_empty_retrieval_returns_canned_answer_without_llm() {
        let mut fixture = Fixture::new();
        fixture.known_models();
        fixture
            .chat_store
            .expect_get_session()
            .returning(|id| Ok(Some(session_row(id))));
        fixture.chat_store.expect_insert_message().returning(
            |session_id, role, content, _, _, _, model| {
                Ok(message_row(1, session_id, role, content, model))
            },
        );
        fixture.events.expect_publish().times(1).return_const(());
        // the LLM must not be invoked
        fixture.llm.expect_generate().times(0);

        let service = fixture.build(&[]).await;
        let outcome = service
            .ask_question(&request("Was steht im Dokument?", Some(3), "gpt-4o-mini"))
            .await
            .unwrap();

        assert_eq!(outcome.model_used, NO_CONTEXT_MODEL);
        assert!(outcome.source_references.is_empty());
        assert!(outcome.content.contains("keine relevanten Informationen"));
    }

    #[tokio::test]
    async fn test_unknown_session_is_404_and_persists_nothing() {
        let mut fixture = Fixture::new();
        fixture.known_models();
        fixture.chat_store.expect_get_session().returning(|_| Ok(None));
        fixture.chat_store.expect_insert_message().times(0);

        let service = fixture.build(&[]).await;
        let error = service
            .ask_question(&request("Was steht im Dokument?", Some(99), "gpt-4o-mini"))
            .await
            .unwrap_err();

        assert!(matches!(error, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_llm_failure_becomes_assistant_message_not_error() {
        let mut fixture = Fixture::new();
        fixture.known_models();
        fixture
            .chat_store
            .expect_get_session()
            .returning(|id| Ok(Some(session_row(id))));
        fixture.chat_store.expect_insert_message().returning(
            |session_id, role, content, _, _, _, model| {
                Ok(message_row(1, session_id, role, content, model))
            },
        );
        fixture.events.expect_publish().times(1).return_const(());
        fixture
            .llm
            .expect_generate()
            .returning(|_, _| Err(anyhow::anyhow!("provider down")));

        let service = fixture
            .build(&[("doc_42_page_1_text_0", "text", "Relevanter Inhalt zum Thema Frage")])
            .await;

        let outcome = service
            .ask_question(&request(
                "Relevanter Inhalt zum Thema Frage?",
                Some(3),
                "gpt-4o-mini",
            ))
            .await
            .expect("LLM failure must not raise");

        assert!(outcome.content.contains("Fehler"));
        assert!(outcome.content.contains("anderes Modell"));
        assert!(outcome.source_references.is_empty());
    }

    #[tokio::test]
    async fn test_empty_llm_answer_becomes_canned_message() {
        let mut fixture = Fixture::new();
        fixture.known_models();
        fixture
            .chat_store
            .expect_get_session()
            .returning(|id| Ok(Some(session_row(id))));
        fixture.chat_store.expect_insert_message().returning(
            |session_id, role, content, _, _, _, model| {
                Ok(message_row(1, session_id, role, content, model))
            },
        );
        fixture.events.expect_publish().times(1).return_const(());
        fixture
            .llm
            .expect_generate()
            .returning(|_, _| Ok(completion("   ", "gpt-4o-mini")));

        let service = fixture
            .build(&[("doc_42_page_1_text_0", "text", "Relevanter Inhalt zum Thema Frage")])
            .await;

        let outcome = service
            .ask_question(&request(
                "Relevanter Inhalt zum Thema Frage?",
                Some(3),
                "gpt-4o-mini",
            ))
            .await
            .unwrap();

        assert!(outcome.content.contains("keine Antwort generieren"));
    }

    #[tokio::test]
    async fn test_model_recorded_per_message() {
        let mut fixture = Fixture::new();
        fixture.known_models();
        fixture
            .chat_store
            .expect_get_session()
            .returning(|id| Ok(Some(session_row(id))));

        let models: Arc<std::sync::Mutex<Vec<Option<String>>>> =
            Arc::new(std::sync::Mutex::new(Vec::new()));
        let capture = models.clone();
        fixture.chat_store.expect_insert_message().returning(
            move |session_id, role, content, _, _, _, model| {
                if role == "assistant" {
                    capture.lock().unwrap().push(model.map(str::to_string));
                }
                Ok(message_row(1, session_id, role, content, model))
            },
        );
        fixture.events.expect_publish().times(2).return_const(());
        fixture
            .llm
            .expect_generate()
            .returning(|model, _| Ok(completion("Antwort mit Inhalt.", model)));

        let service = fixture
            .build(&[("doc_42_page_1_text_0", "text", "Relevanter Inhalt zum Thema Frage")])
            .await;

        service
            .ask_question(&request(
                "Relevanter Inhalt zum Thema Frage?",
                Some(5),
                "gpt-4o-mini",
            ))
            .await
            .unwrap();
        service
            .ask_question(&request(
                "Relevanter Inhalt zum Thema Frage nochmal?",
                Some(5),
                "gemini-2.5-flash",
            ))
            .await
            .unwrap();

        let recorded = models.lock().unwrap();
        assert_eq!(
            recorded.as_slice(),
            &[
                Some("gpt-4o-mini".to_string()),
                Some("gemini-2.5-flash".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_short_question_rejected() {
        let mut fixture = Fixture::new();
        fixture.known_models();
        let service = fixture.build(&[]).await;

        let error = service
            .ask_question(&request("ab", None, "gpt-4o-mini"))
            .await
            .unwrap_err();
        assert!(matches!(error, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_unknown_model_rejected() {
        let mut fixture = Fixture::new();
        fixture.known_models();
        let service = fixture.build(&[]).await;

        let error = service
            .ask_question(&request("Was passiert in Schritt 6?", None, "gpt-2"))
            .await
            .unwrap_err();
        assert!(matches!(error, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_document_type_filter_narrows_retrieval() {
        let mut fixture = Fixture::new();
        fixture.known_models();
        fixture.llm.expect_generate().times(0);
        fixture
            .chat_store
            .expect_get_session()
            .returning(|id| Ok(Some(session_row(id))));
        fixture.chat_store.expect_insert_message().returning(
            |session_id, role, content, _, _, _, model| {
                Ok(message_row(1, session_id, role, content, model))
            },
        );
        fixture.events.expect_publish().times(1).return_const(());

        // Store only holds SOP chunks; filtering for Datenblatt must yield
        // the canned no-context answer.
        let service = fixture
            .build(&[("doc_42_page_1_text_0", "text", "SOP Inhalt")])
            .await;

        let mut ask = request("Welche Sicherheitswarnungen gelten?", Some(2), "gpt-4o-mini");
        ask.filters = Some(QuestionFilters {
            document_type: Some("Datenblatt".to_string()),
            document_type_id: None,
            interest_group_ids: Vec::new(),
        });

        let outcome = service.ask_question(&ask).await.unwrap();
        assert_eq!(outcome.model_used, NO_CONTEXT_MODEL);
    }
}
