use std::path::Path;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use travel_assist::config::AppConfig;
use travel_assist::http;
use travel_assist::llm::{LlmBackend, ModelRouter, create_provider};
use travel_assist::orchestrator::ConversationOrchestrator;
use travel_assist::places::{GooglePlaces, PlaceSearch};
use travel_assist::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()?;

    let db: Arc<dyn Database> =
        Arc::new(LibSqlBackend::new_local(Path::new(&config.db_path)).await?);

    let knowledge =
        create_provider(LlmBackend::Anthropic, &config.knowledge_model, "knowledge")?;
    let traveler =
        create_provider(LlmBackend::OpenAiChat, &config.traveler_model, "traveler")?;
    let router = ModelRouter::new(
        knowledge,
        traveler,
        config.model_timeout,
        config.keywords.clone(),
    );

    let places: Option<Arc<dyn PlaceSearch>> = config
        .places_api_key
        .clone()
        .map(|key| Arc::new(GooglePlaces::new(key)) as Arc<dyn PlaceSearch>);
    if places.is_none() {
        info!("Place search not configured; external lookups disabled");
    }

    let orchestrator = Arc::new(ConversationOrchestrator::new(db, router, places, &config));

    let addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "Listening");
    axum::serve(listener, http::router(orchestrator)).await?;
    Ok(())
}
