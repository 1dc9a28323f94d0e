use anyhow::{Context, Result};
use ingest::ChunkerConfig;
use query::DiscoveryOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use verify::JobKind;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub log_format: LogFormat,
    pub store: StoreConfig,
    pub neo4j: Neo4jConfig,
    pub llm: LlmConfig,
    pub chunking: ChunkingConfig,
    pub discovery: DiscoveryOptions,
    pub verification: VerificationConfig,
    pub retry: RetryConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Neo4j,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Wipe the graph at the start of every `/run`, so each run only sees
    /// its own document.
    pub clear_before_run: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Neo4j,
            clear_before_run: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Neo4jConfig {
    pub uri: String,
    pub username: String,
    pub password: String,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            username: "neo4j".to_string(),
            password: "0123456789".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    #[default]
    Ollama,
    OpenAi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    /// Defaults to the backend's usual endpoint.
    pub base_url: Option<String>,
    /// Defaults to `llama3` on Ollama and `gpt-4o-mini` on OpenAI.
    pub model: Option<String>,
    /// Model for phrasing questions; falls back to `model`.
    pub question_model: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl LlmConfig {
    pub fn endpoint(&self) -> String {
        match (&self.base_url, self.backend) {
            (Some(url), _) => url.clone(),
            (None, LlmBackend::Ollama) => "http://localhost:11434".to_string(),
            (None, LlmBackend::OpenAi) => "https://api.openai.com".to_string(),
        }
    }

    pub fn model(&self) -> &str {
        match (&self.model, self.backend) {
            (Some(model), _) => model,
            (None, LlmBackend::Ollama) => "llama3",
            (None, LlmBackend::OpenAi) => "gpt-4o-mini",
        }
    }

    pub fn question_model(&self) -> &str {
        self.question_model.as_deref().unwrap_or_else(|| self.model())
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: LlmBackend::Ollama,
            base_url: None,
            model: None,
            question_model: None,
            api_key: None,
            temperature: 0.2,
            max_tokens: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub enabled: bool,
    pub max_chars: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        let chunker = ChunkerConfig::default();
        Self {
            enabled: true,
            max_chars: chunker.max_chars,
            overlap: chunker.overlap,
        }
    }
}

impl ChunkingConfig {
    pub fn chunker(&self) -> ChunkerConfig {
        ChunkerConfig {
            max_chars: self.max_chars,
            overlap: self.overlap,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub job: JobKind,
    pub max_questions: usize,
    pub output_dir: PathBuf,
    pub timeout_secs: u64,
    pub poll_interval_secs: u64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            base_url: verify::DEFAULT_BASE_URL.to_string(),
            api_key: None,
            job: JobKind::Owl,
            max_questions: verify::DEFAULT_MAX_QUESTIONS,
            output_dir: PathBuf::from("hypothesis_results"),
            timeout_secs: 1200,
            poll_interval_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 10000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10000,
        }
    }
}

impl AppConfig {
    /// Defaults, then the TOML file named by `CHRONOS_CONFIG`, then `.env`
    /// and process environment overrides.
    pub fn load() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenvy::dotenv();

        let mut config = match std::env::var("CHRONOS_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("parse error in {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply environment overrides. `var` is injected so tests need not touch
    /// the process environment.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        if let Some(bind) = var("CHRONOS_BIND") {
            self.server.bind = bind;
        }
        if let Some(uri) = var("NEO4J_URL") {
            self.neo4j.uri = uri;
        }
        if let Some(username) = var("NEO4J_USERNAME") {
            self.neo4j.username = username;
        }
        if let Some(password) = var("NEO4J_PASSWORD") {
            self.neo4j.password = password;
        }
        if let Some(key) = var("OPENAI_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if self.llm.backend == LlmBackend::Ollama {
            if let Some(url) = var("OLLAMA_URL") {
                self.llm.base_url = Some(url);
            }
        }
        if let Some(key) = var("FUTUREHOUSE_API_KEY").or_else(|| var("FUTURE_HOUSE_API_KEY")) {
            self.verification.api_key = Some(key);
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.chunking.chunker().validate().context("invalid [chunking] section")?;
        if self.discovery.match_limit == 0 {
            anyhow::bail!("discovery.match_limit must be positive");
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            anyhow::bail!("retry.initial_backoff_ms must not exceed retry.max_backoff_ms");
        }
        if self.llm.backend == LlmBackend::OpenAi && self.llm.api_key.is_none() {
            anyhow::bail!("llm.backend = \"openai\" needs OPENAI_API_KEY");
        }
        Ok(())
    }
}
