use axum::{
    Json, Router,
    extract::{Path as UrlPath, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use extract::{Extractor, TextGenerator};
use index::{GraphExport, GraphStats, GraphStore, IndexOptions, Indexer, IngestReport, NodeNeighbourhood, StoredNode};
use query::{DiscoveredPattern, DiscoveryOptions, PatternDiscovery};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use uuid::Uuid;
use verify::{HypothesisResult, HypothesisVerifier};

use crate::config::AppConfig;
use crate::metrics::{Metrics, MetricsSnapshot, TimedOperation};

pub struct AppState {
    config: AppConfig,
    store: Arc<dyn GraphStore>,
    indexer: Indexer,
    discovery: PatternDiscovery,
    verifier: Option<HypothesisVerifier>,
    metrics: Arc<Metrics>,
    /// Held by anything that writes or clears the graph.
    pipeline_lock: Mutex<()>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn GraphStore>,
        extraction_llm: Arc<dyn TextGenerator>,
        question_llm: Arc<dyn TextGenerator>,
        verifier: Option<HypothesisVerifier>,
    ) -> Self {
        Self {
            indexer: Indexer::new(Extractor::new(extraction_llm), store.clone()),
            discovery: PatternDiscovery::new(store.clone(), question_llm),
            config,
            store,
            verifier,
            metrics: Metrics::new(),
            pipeline_lock: Mutex::new(()),
        }
    }

    fn index_options(&self, chunking: Option<bool>) -> IndexOptions {
        IndexOptions {
            use_chunking: chunking.unwrap_or(self.config.chunking.enabled),
            chunker: self.config.chunking.chunker(),
        }
    }

    async fn ingest(&self, req: &IngestRequest) -> Result<Vec<IngestReport>, ApiError> {
        let documents = load_documents(req).await?;
        let options = self.index_options(req.chunking);

        let mut reports = Vec::with_capacity(documents.len());
        for (element_id, text) in documents {
            let timer = TimedOperation::start();
            let report = self
                .indexer
                .index_text(&text, &element_id, &options)
                .await
                .map_err(|e| {
                    ApiError::internal(e).with_hint("check the LLM backend, or reduce chunking.max_chars")
                })?;
            self.metrics.record_ingest(timer.elapsed(), &report);
            reports.push(report);
        }
        Ok(reports)
    }

    async fn discover(&self, overrides: &DiscoverRequest) -> Result<Vec<DiscoveredPattern>, ApiError> {
        let options = overrides.apply(self.config.discovery);
        let timer = TimedOperation::start();
        let patterns = self
            .discovery
            .discover(&options)
            .await
            .map_err(|e| ApiError::internal(e).with_hint("check Neo4j connection"))?;
        self.metrics.record_discovery(timer.elapsed(), patterns.len());
        Ok(patterns)
    }

    async fn verify(&self, questions: &[String]) -> Result<Vec<HypothesisResult>, ApiError> {
        let verifier = self.verifier.as_ref().ok_or_else(|| ApiError {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: "hypothesis verification is not configured".to_string(),
            hint: Some("set FUTUREHOUSE_API_KEY"),
        })?;
        let timer = TimedOperation::start();
        let results = verifier.verify(questions).await;
        self.metrics.record_verification(timer.elapsed(), results.len());
        Ok(results)
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ingest", post(ingest_document))
        .route("/discover", post(discover_patterns))
        .route("/verify", post(verify_hypotheses))
        .route("/run", post(run_pipeline))
        .route("/stats", get(get_stats))
        .route("/clear", post(clear_graph))
        .route("/metrics", get(get_metrics))
        .route("/export", get(export_graph))
        .route("/nodes", get(list_nodes))
        .route("/nodes/:key/relationships", get(node_relationships))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    hint: Option<&'static str>,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            hint: None,
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
            hint: None,
        }
    }

    fn internal(e: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("{:#}", e),
            hint: None,
        }
    }

    fn with_hint(mut self, hint: &'static str) -> Self {
        self.hint = Some(hint);
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, error = %self.message, hint = self.hint, "Request failed");
        }
        (
            self.status,
            Json(json!({ "error": self.message, "hint": self.hint })),
        )
            .into_response()
    }
}

/// Count the request and pass the outcome through.
fn tracked<T>(state: &AppState, result: Result<T, ApiError>) -> Result<T, ApiError> {
    state.metrics.record_request(result.is_ok());
    result
}

#[derive(Debug, Default, Deserialize)]
pub struct IngestRequest {
    pub path: Option<String>,
    pub text: Option<String>,
    pub element_id: Option<String>,
    pub chunking: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DiscoverRequest {
    pub max_length: Option<usize>,
    pub max_patterns_per_length: Option<usize>,
    pub match_limit: Option<usize>,
}

impl DiscoverRequest {
    fn apply(&self, mut options: DiscoveryOptions) -> DiscoveryOptions {
        if let Some(max_length) = self.max_length {
            options.max_length = max_length;
        }
        if let Some(max) = self.max_patterns_per_length {
            options.max_patterns_per_length = max;
        }
        if let Some(limit) = self.match_limit {
            options.match_limit = limit;
        }
        options
    }
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub questions: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RunRequest {
    #[serde(flatten)]
    pub document: IngestRequest,
    pub clear: Option<bool>,
    pub verify: Option<bool>,
    #[serde(default)]
    pub discovery: DiscoverRequest,
}

/// `GET /nodes`: search when `search` is set, otherwise sample.
#[derive(Debug, Default, Deserialize)]
pub struct NodesQuery {
    pub search: Option<String>,
    /// Property to search; defaults to `id`.
    pub property: Option<String>,
    pub label: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Serialize)]
struct HealthResponse {
    store: String,
    verification: bool,
}

#[derive(Serialize)]
struct IngestResponse {
    documents: Vec<IngestReport>,
}

#[derive(Serialize)]
struct RunResponse {
    documents: Vec<IngestReport>,
    graph: GraphStats,
    patterns: Vec<DiscoveredPattern>,
    results: Vec<HypothesisResult>,
}

fn element_id_for(path: &Path, fallback: &str) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| fallback.to_string())
}

/// File stems, except where two files share one (`a.txt`, `a.md`); those
/// keep their extension.
fn element_ids(docs: &[ingest::Document]) -> Vec<String> {
    let stems: Vec<String> = docs
        .iter()
        .map(|doc| element_id_for(Path::new(&doc.source), &doc.doc_id))
        .collect();

    docs.iter()
        .zip(&stems)
        .map(|(doc, stem)| {
            if stems.iter().filter(|s| *s == stem).count() == 1 {
                return stem.clone();
            }
            Path::new(&doc.source)
                .file_name()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| doc.doc_id.clone())
        })
        .collect()
}

/// `(element_id, text)` pairs for an ingest request.
async fn load_documents(req: &IngestRequest) -> Result<Vec<(String, String)>, ApiError> {
    if let Some(text) = &req.text {
        let element_id = req
            .element_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        return Ok(vec![(element_id, text.clone())]);
    }

    let Some(path) = &req.path else {
        return Err(ApiError::bad_request("either `text` or `path` is required"));
    };
    let path = PathBuf::from(path);

    if path.is_file() {
        let doc = ingest::read_document(&path)
            .await
            .map_err(|e| ApiError::bad_request(format!("{:#}", e)))?;
        let element_id = req
            .element_id
            .clone()
            .unwrap_or_else(|| element_id_for(&path, &doc.doc_id));
        Ok(vec![(element_id, doc.text)])
    } else if path.is_dir() {
        let docs = ingest::read_documents(&path)
            .await
            .map_err(|e| ApiError::bad_request(format!("{:#}", e)))?;
        let ids = element_ids(&docs);
        Ok(ids.into_iter().zip(docs).map(|(id, doc)| (id, doc.text)).collect())
    } else {
        Err(ApiError::not_found(format!("no such file or directory: {}", path.display())))
    }
}

async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let (status, store) = match state.store.ping().await {
        Ok(()) => (StatusCode::OK, "ok".to_string()),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, format!("error: {:#}", e)),
    };
    (
        status,
        Json(HealthResponse {
            store,
            verification: state.verifier.is_some(),
        }),
    )
}

async fn ingest_document(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, ApiError> {
    let _guard = state.pipeline_lock.lock().await;
    let result = state.ingest(&req).await;
    tracked(&state, result).map(|documents| Json(IngestResponse { documents }))
}

async fn discover_patterns(
    State(state): State<Arc<AppState>>,
    req: Option<Json<DiscoverRequest>>,
) -> Result<Json<Vec<DiscoveredPattern>>, ApiError> {
    let overrides = req.map(|Json(r)| r).unwrap_or_default();
    let result = state.discover(&overrides).await;
    tracked(&state, result).map(Json)
}

async fn verify_hypotheses(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<Vec<HypothesisResult>>, ApiError> {
    let result = state.verify(&req.questions).await;
    tracked(&state, result).map(Json)
}

/// Clear (optionally), ingest, discover and verify in one request.
async fn run_pipeline(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RunRequest>,
) -> Result<Json<RunResponse>, ApiError> {
    let _guard = state.pipeline_lock.lock().await;
    let result = run_locked(&state, &req).await;
    tracked(&state, result).map(Json)
}

async fn run_locked(state: &AppState, req: &RunRequest) -> Result<RunResponse, ApiError> {
    if req.clear.unwrap_or(state.config.store.clear_before_run) {
        state
            .store
            .clear_all()
            .await
            .map_err(|e| ApiError::internal(e).with_hint("check Neo4j connection"))?;
        info!("Cleared graph before run");
    }

    let documents = state.ingest(&req.document).await?;
    let graph = state.store.stats().await.map_err(ApiError::internal)?;
    if graph.is_empty() {
        warn!("Knowledge graph is empty after ingestion; check the extraction output format");
    }

    let patterns = state.discover(&req.discovery).await?;

    let results = if req.verify.unwrap_or(true) && state.verifier.is_some() && !patterns.is_empty() {
        let questions: Vec<String> = patterns.iter().map(|p| p.question.clone()).collect();
        state.verify(&questions).await?
    } else {
        if state.verifier.is_none() {
            warn!("Skipping verification: set FUTUREHOUSE_API_KEY to enable it");
        }
        Vec::new()
    };

    Ok(RunResponse {
        documents,
        graph,
        patterns,
        results,
    })
}

async fn get_stats(State(state): State<Arc<AppState>>) -> Result<Json<GraphStats>, ApiError> {
    let result = state
        .store
        .stats()
        .await
        .map_err(|e| ApiError::internal(e).with_hint("check Neo4j connection"));
    tracked(&state, result).map(Json)
}

async fn clear_graph(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
    let _guard = state.pipeline_lock.lock().await;
    let result = state
        .store
        .clear_all()
        .await
        .map_err(|e| ApiError::internal(e).with_hint("check Neo4j connection"));
    tracked(&state, result).map(|()| StatusCode::NO_CONTENT)
}

async fn export_graph(State(state): State<Arc<AppState>>) -> Result<Json<GraphExport>, ApiError> {
    let result = state
        .store
        .export()
        .await
        .map_err(|e| ApiError::internal(e).with_hint("check Neo4j connection"));
    tracked(&state, result).map(Json)
}

async fn list_nodes(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NodesQuery>,
) -> Result<Json<Vec<StoredNode>>, ApiError> {
    let result = match &query.search {
        Some(needle) => {
            let property = query.property.as_deref().unwrap_or("id");
            state.store.search_nodes(property, needle, query.limit.unwrap_or(10)).await
        }
        None => {
            state
                .store
                .sample_nodes(query.label.as_deref(), query.limit.unwrap_or(5))
                .await
        }
    }
    .map_err(|e| ApiError::internal(e).with_hint("check Neo4j connection"));
    tracked(&state, result).map(Json)
}

async fn node_relationships(
    State(state): State<Arc<AppState>>,
    UrlPath(key): UrlPath<String>,
) -> Result<Json<NodeNeighbourhood>, ApiError> {
    let result = match state.store.node_relationships(&key).await {
        Ok(Some(found)) => Ok(found),
        Ok(None) => Err(ApiError::not_found(format!("no node with id or name {}", key))),
        Err(e) => Err(ApiError::internal(e).with_hint("check Neo4j connection")),
    };
    tracked(&state, result).map(Json)
}

async fn get_metrics(State(state): State<Arc<AppState>>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}
