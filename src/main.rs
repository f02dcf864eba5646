use anyhow::Result;
use axum::{
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing::info;

use qms_rag_server::config::Settings;
use qms_rag_server::database::{DbPool, Repository};
use qms_rag_server::handlers;
use qms_rag_server::security::PermissionService;
use qms_rag_server::services::embedding::create_embedding_provider;
use qms_rag_server::services::{
    ChatService, EventBus, IndexingService, LlmService, MultiQueryService, RetrievalService,
};
use qms_rag_server::state::AppState;
use qms_rag_server::utils::limiters::Limiters;
use qms_rag_server::vector::{QdrantVectorStore, VectorStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,qms_rag_server=debug".to_string()),
        )
        .with_target(true)
        .json()
        .init();

    info!("🚀 Starting QMS RAG Server...");

    let settings = Settings::load()?;
    info!("✅ Configuration loaded");

    let db_pool = DbPool::new(&settings.database).await?;
    info!("✅ Database connection established");

    let repository = Arc::new(Repository::new(db_pool));
    let limiters = Arc::new(Limiters::new(&settings.limits));
    let event_bus = Arc::new(EventBus::new(256));

    let embedding = create_embedding_provider(&settings.embedding).await;
    let embedding_info = embedding.info();
    info!(
        provider = %embedding_info.provider,
        model = %embedding_info.model,
        dimensions = embedding_info.dimensions,
        "✅ Embedding provider selected"
    );

    let vector_store: Arc<dyn VectorStore> = Arc::new(QdrantVectorStore::new(&settings.qdrant));
    vector_store
        .ensure_collection(&settings.qdrant.collection_name, embedding.dimensions())
        .await?;
    info!(
        collection = %settings.qdrant.collection_name,
        "✅ Vector store collection ready"
    );

    let llm = Arc::new(LlmService::new(settings.llm.clone()));

    let retrieval = Arc::new(RetrievalService::new(
        embedding.clone(),
        vector_store.clone(),
        settings.qdrant.collection_name.clone(),
        limiters.clone(),
    ));

    let indexing = Arc::new(IndexingService::new(
        repository.clone(),
        repository.clone(),
        repository.clone(),
        repository.clone(),
        embedding.clone(),
        vector_store.clone(),
        event_bus.clone(),
        settings.qdrant.collection_name.clone(),
        settings.embedding.batch_size,
    ));

    let multi_query = if settings.rag.multi_query_enabled {
        let provider: Arc<dyn qms_rag_server::services::LlmProvider> = llm.clone();
        Some(Arc::new(MultiQueryService::new(provider)))
    } else {
        None
    };

    let chat = Arc::new(ChatService::new(
        repository.clone(),
        repository.clone(),
        repository.clone(),
        retrieval.clone(),
        llm.clone(),
        multi_query,
        event_bus.clone(),
    ));

    let permissions = Arc::new(PermissionService::new(repository.clone()));

    let state = Arc::new(AppState {
        settings: settings.clone(),
        repository,
        embedding,
        vector_store,
        retrieval,
        indexing,
        chat,
        llm,
        permissions,
        event_bus,
    });

    let app = build_router(state);

    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));
    info!("🎯 Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/rag/documents/index", post(handlers::index::index_document))
        .route(
            "/api/rag/documents/{id}/reindex",
            post(handlers::index::reindex_document),
        )
        .route("/api/rag/documents", get(handlers::index::list_documents))
        .route(
            "/api/rag/documents/types/counts",
            get(handlers::index::document_type_counts),
        )
        .route("/api/rag/chat/ask", post(handlers::chat::ask_question))
        .route(
            "/api/rag/chat/sessions",
            post(handlers::chat::create_session).get(handlers::chat::list_sessions),
        )
        .route(
            "/api/rag/chat/sessions/{id}",
            put(handlers::chat::rename_session).delete(handlers::chat::delete_session),
        )
        .route(
            "/api/rag/chat/sessions/{id}/history",
            get(handlers::chat::get_history),
        )
        .route("/api/rag/search", post(handlers::search::search_documents))
        .route("/api/rag/system/info", get(handlers::health::system_info))
        .route("/api/rag/health", get(handlers::health::health_check))
        .with_state(state)
        .layer(
            CorsLayer::permissive()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(false)),
        )
}
