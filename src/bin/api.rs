use finance_analytics_assistant::{
    analytics::AnalyticsEngine,
    api::start_server,
    assistant::Assistant,
    clock::{Clock, SystemClock},
    config::Config,
    llm::GeminiClient,
    memory::{ConversationStore, InMemoryConversationStore, PgConversationStore},
    source::{InMemoryTransactionSource, PgTransactionSource, TransactionSource},
    tools::ToolRegistry,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    let config = Config::from_env()?;

    // RUST_LOG wins over LOG_LEVEL
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Finance Analytics Assistant - API Server");
    info!("Port: {}", config.port);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let Some(api_key) = config.gemini_api_key.clone() else {
        return Err("GEMINI_API_KEY is not set (see .env.example)".into());
    };
    let mut gemini = GeminiClient::new(api_key, config.gemini_model.clone())?;
    if let Some(base_url) = &config.gemini_base_url {
        gemini = gemini.with_base_url(base_url.clone());
    }

    let store: Arc<dyn ConversationStore> = match &config.database_url {
        Some(url) => {
            info!("Conversation store: postgres");
            Arc::new(PgConversationStore::connect_lazy(url, clock.clone())?)
        }
        None => {
            warn!("DATABASE_URL not set; conversations are kept in memory");
            Arc::new(InMemoryConversationStore::new(clock.clone()))
        }
    };

    // Bank sync writes the transactions table; a seed file stands in for it locally.
    let source: Arc<dyn TransactionSource> = match (&config.database_url, &config.transactions_file) {
        (Some(url), _) => {
            info!("Transaction source: postgres");
            Arc::new(PgTransactionSource::connect_lazy(url)?)
        }
        (None, Some(path)) => {
            info!("Transaction source: {}", path);
            Arc::new(InMemoryTransactionSource::from_file(path)?)
        }
        (None, None) => {
            return Err("no transaction data: set DATABASE_URL or TRANSACTIONS_FILE (see .env.example)".into());
        }
    };
    let tools = ToolRegistry::new(AnalyticsEngine::new(source), clock.clone());

    let assistant = Arc::new(Assistant::new(
        Arc::new(gemini),
        tools,
        store,
        clock,
        config.assistant(),
    ));

    info!("Assistant initialized with {} tools", assistant.tools().list().len());

    start_server(assistant, config.port).await?;

    Ok(())
}
