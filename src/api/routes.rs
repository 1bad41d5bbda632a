//! HTTP route definitions.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Html,
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::types::{DeletedResponse, HealthResponse, SendMessageRequest};
use crate::agent::Agent;
use crate::config::Config;
use crate::session::{
    session_cleanup_loop, FilterSelection, FilterUpdate, SessionError, SessionSnapshot,
    SessionStore, SubmitOutcome,
};
use crate::store::PropertyStore;
use crate::tools::{ToolError, ToolInfo, ToolRegistry};

const INDEX_HTML: &str = include_str!("../../static/index.html");

/// Shared application state.
pub struct AppState {
    pub agent: Arc<Agent>,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(agent: Agent) -> Self {
        Self {
            agent: Arc::new(agent),
            sessions: SessionStore::new(),
        }
    }
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let store = PropertyStore::new(&config.store);
    match store.count().await {
        Ok(listings) => tracing::info!(
            path = %store.path().display(),
            listings,
            "Opened property store"
        ),
        Err(e) => tracing::warn!(
            path = %store.path().display(),
            error = %e,
            "Property store is not readable; searches will fail until it is"
        ),
    }

    let agent = Agent::new(&config, ToolRegistry::new(store))?;
    let state = Arc::new(AppState::new(agent));

    tokio::spawn(session_cleanup_loop(
        state.sessions.clone(),
        Duration::from_secs(config.session_ttl_secs),
    ));

    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/health", get(health))
        .route("/api/tools", get(list_tools))
        .route("/api/sessions", post(create_session))
        .route(
            "/api/sessions/:id",
            get(get_session).delete(delete_session),
        )
        .route("/api/sessions/:id/messages", post(send_message))
        .route("/api/sessions/:id/clear", post(clear_session))
        .route(
            "/api/sessions/:id/filters",
            get(get_filters).put(update_filters).delete(reset_filters),
        )
        .route("/api/sessions/:id/search", post(search_with_filters))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn session_error(e: SessionError) -> (StatusCode, String) {
    let status = match &e {
        SessionError::NotFound(_) => StatusCode::NOT_FOUND,
        SessionError::Busy => StatusCode::CONFLICT,
        SessionError::EmptyMessage | SessionError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        SessionError::Interrupted(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

fn tool_error(e: ToolError) -> (StatusCode, String) {
    let status = match &e {
        ToolError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        ToolError::UnknownTool(_) | ToolError::Execution(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let listings = state.agent.tools().store().count().await.ok();
    let status = match listings {
        Some(_) => "ok",
        None => "degraded",
    };
    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model: state.agent.model().to_string(),
        listings,
    })
}

async fn list_tools(State(state): State<Arc<AppState>>) -> Json<Vec<ToolInfo>> {
    Json(state.agent.tools().list_tools())
}

async fn create_session(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<SessionSnapshot>) {
    (StatusCode::CREATED, Json(state.sessions.create().await))
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, (StatusCode, String)> {
    state.sessions.snapshot(id).await.map(Json).map_err(session_error)
}

async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeletedResponse>, (StatusCode, String)> {
    state.sessions.remove(id).await.map_err(session_error)?;
    Ok(Json(DeletedResponse { deleted: true }))
}

async fn send_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<SubmitOutcome>, (StatusCode, String)> {
    state
        .sessions
        .submit(id, Arc::clone(&state.agent), &req.content)
        .await
        .map(Json)
        .map_err(session_error)
}

async fn clear_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, (StatusCode, String)> {
    state.sessions.clear(id).await.map(Json).map_err(session_error)
}

async fn get_filters(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<FilterSelection>, (StatusCode, String)> {
    state.sessions.filters(id).await.map(Json).map_err(session_error)
}

async fn update_filters(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(update): Json<FilterUpdate>,
) -> Result<Json<FilterSelection>, (StatusCode, String)> {
    state
        .sessions
        .update_filters(id, update)
        .await
        .map(Json)
        .map_err(session_error)
}

async fn reset_filters(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<FilterSelection>, (StatusCode, String)> {
    state
        .sessions
        .reset_filters(id)
        .await
        .map(Json)
        .map_err(session_error)
}

/// Run `search_properties` with the session's filters, bypassing the model.
async fn search_with_filters(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let filters = state.sessions.filters(id).await.map_err(session_error)?;
    state
        .agent
        .tools()
        .execute("search_properties", filters.to_search_args())
        .await
        .map(Json)
        .map_err(tool_error)
}
