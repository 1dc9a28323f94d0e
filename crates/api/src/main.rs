mod cache;
mod config;
mod metrics;
mod retry;
mod routes;

use anyhow::{Context, Result};
use extract::{GenerationOptions, NodeCategory, OllamaClient, OpenAiClient, TextGenerator};
use index::{GraphStore, MemoryGraphStore, Neo4jStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use verify::{FutureHouseClient, HypothesisVerifier};

use crate::cache::CachedGenerator;
use crate::config::{AppConfig, LlmBackend, LogFormat, StoreBackend};
use crate::retry::{RetryPolicy, Retrying};
use crate::routes::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_tracing(config.log_format);

    let policy = RetryPolicy::from_config(&config.retry);
    let store = connect_store(&config, policy).await?;

    let extraction_llm = build_generator(
        &config,
        config.llm.model(),
        GenerationOptions {
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
        },
    )?;
    let question_llm = build_generator(
        &config,
        config.llm.question_model(),
        GenerationOptions {
            temperature: 0.3,
            max_tokens: 200,
        },
    )?;

    let extraction_llm: Arc<dyn TextGenerator> =
        Arc::new(Retrying::new(extraction_llm, policy, "graph_extraction"));
    let question_llm: Arc<dyn TextGenerator> = if config.cache.enabled {
        Arc::new(Retrying::new(
            CachedGenerator::new(question_llm, config.cache.max_entries),
            policy,
            "question_generation",
        ))
    } else {
        Arc::new(Retrying::new(question_llm, policy, "question_generation"))
    };

    let verifier = build_verifier(&config)?;

    let state = Arc::new(AppState::new(
        config.clone(),
        store,
        extraction_llm,
        question_llm,
        verifier,
    ));
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;

    info!("Server listening on http://{}", config.server.bind);

    axum::serve(listener, app).await?;
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

async fn connect_store(config: &AppConfig, policy: RetryPolicy) -> Result<Arc<dyn GraphStore>> {
    match config.store.backend {
        StoreBackend::Memory => {
            info!("Using in-memory graph store");
            Ok(Arc::new(MemoryGraphStore::new()))
        }
        StoreBackend::Neo4j => {
            let neo4j = &config.neo4j;
            let store = policy
                .retry("neo4j_connect", || {
                    Neo4jStore::connect(&neo4j.uri, &neo4j.username, &neo4j.password)
                })
                .await
                .context("Could not reach Neo4j; check NEO4J_URL and credentials")?;

            let labels: Vec<&str> = NodeCategory::ALL.iter().map(|c| c.label()).collect();
            store.init_schema(&labels).await?;
            Ok(Arc::new(store))
        }
    }
}

fn build_generator(
    config: &AppConfig,
    model: &str,
    options: GenerationOptions,
) -> Result<Arc<dyn TextGenerator>> {
    let llm = &config.llm;
    let client: Arc<dyn TextGenerator> = match llm.backend {
        LlmBackend::Ollama => Arc::new(
            OllamaClient::new(llm.endpoint(), model.to_string()).with_options(options),
        ),
        LlmBackend::OpenAi => {
            let api_key = llm
                .api_key
                .clone()
                .context("OPENAI_API_KEY is required for the openai backend")?;
            Arc::new(
                OpenAiClient::new(llm.endpoint(), api_key, model.to_string())
                    .with_options(options),
            )
        }
    };
    info!(backend = ?llm.backend, model, "Configured text generator");
    Ok(client)
}

/// `None` when no API key is configured; the rest of the pipeline still runs.
fn build_verifier(config: &AppConfig) -> Result<Option<HypothesisVerifier>> {
    let verification = &config.verification;
    let Some(api_key) = verification.api_key.clone() else {
        warn!("FUTUREHOUSE_API_KEY not set; hypothesis verification disabled");
        return Ok(None);
    };

    let client = FutureHouseClient::new(verification.base_url.clone(), api_key)?.with_polling(
        Duration::from_secs(verification.poll_interval_secs),
        Duration::from_secs(verification.timeout_secs),
    );
    let verifier = HypothesisVerifier::new(Arc::new(client), &verification.output_dir)
        .with_context(|| format!("Failed to create {}", verification.output_dir.display()))?
        .with_max_questions(verification.max_questions)
        .with_job_kind(verification.job);

    Ok(Some(verifier))
}
