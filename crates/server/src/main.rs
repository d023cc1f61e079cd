use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use behaviors::RequestParams;
use serde::Deserialize;
use shared::{
    domain::{Actor, TicketId},
    error::{ApiError, ErrorCode},
    protocol::{AuditLogEntry, TicketGridPage, TicketPayload},
};
use storage::{AuditTable, Storage};
use tower_http::limit::RequestBodyLimitLayer;
use tower_sessions::{session_store::ExpiredDeletion, Session, SessionManagerLayer};
use tower_sessions_sqlx_store::SqliteStore;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod api;
mod app_state;
mod config;
mod session;
mod ticket;

use api::{
    create_ticket, delete_ticket, list_tickets, ticket_logs, update_ticket, ApiContext,
    CreateTicketRequest, UpdateTicketRequest,
};
use app_state::AppState;
use config::{load_settings, prepare_database_url};
use session::{load_grid_session, session_layer, session_store, store_grid_session};

const MAX_BODY_BYTES: usize = 64 * 1024;
const ACTOR_HEADER: &str = "x-username";
const EXPIRED_SESSION_SWEEP_SECS: u64 = 60;

type HttpError = (StatusCode, Json<ApiError>);

#[derive(Debug, Deserialize)]
struct LogsQuery {
    model_id: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    let api = ApiContext::new(
        storage.clone(),
        AuditTable::named(settings.audit_table.clone()),
        settings.default_page_size,
    )?;

    let store = session_store(&storage).await?;
    let sweeper = store
        .clone()
        .continuously_delete_expired(tokio::time::Duration::from_secs(EXPIRED_SESSION_SWEEP_SECS));
    tokio::spawn(async move {
        if let Err(error) = sweeper.await {
            error!(%error, "expired session cleanup stopped");
        }
    });
    let sessions = session_layer(store, &settings.session_cookie, settings.session_idle_minutes);

    let app = build_router(Arc::new(AppState { api }), sessions);

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>, sessions: SessionManagerLayer<SqliteStore>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/tickets", get(http_list_tickets).post(http_create_ticket))
        .route(
            "/tickets/:ticket_id",
            axum::routing::put(http_update_ticket).delete(http_delete_ticket),
        )
        .route("/tickets/:ticket_id/logs", get(http_ticket_logs))
        .layer(sessions)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, HttpError> {
    state
        .api
        .storage
        .health_check()
        .await
        .map_err(|e| {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiError::new(ErrorCode::Internal, e.to_string())),
            )
        })?;
    Ok("ok")
}

async fn http_list_tickets(
    State(state): State<Arc<AppState>>,
    session: Session,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<TicketGridPage>, HttpError> {
    let mut grid_session = load_grid_session(&session).await.map_err(session_error)?;
    let request = RequestParams::from_pairs(params);

    let page = list_tickets(&state.api, &mut grid_session, &request)
        .await
        .map_err(api_error)?;

    store_grid_session(&session, &grid_session)
        .await
        .map_err(session_error)?;
    Ok(Json(page))
}

async fn http_create_ticket(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateTicketRequest>,
) -> Result<(StatusCode, Json<TicketPayload>), HttpError> {
    let actor = actor_from_headers(&headers);
    let ticket = create_ticket(&state.api, &actor, req)
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

async fn http_update_ticket(
    State(state): State<Arc<AppState>>,
    Path(ticket_id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<UpdateTicketRequest>,
) -> Result<Json<TicketPayload>, HttpError> {
    let actor = actor_from_headers(&headers);
    update_ticket(&state.api, &actor, TicketId(ticket_id), req)
        .await
        .map(Json)
        .map_err(api_error)
}

async fn http_delete_ticket(
    State(state): State<Arc<AppState>>,
    Path(ticket_id): Path<i64>,
    headers: HeaderMap,
) -> Result<StatusCode, HttpError> {
    let actor = actor_from_headers(&headers);
    delete_ticket(&state.api, &actor, TicketId(ticket_id))
        .await
        .map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_ticket_logs(
    State(state): State<Arc<AppState>>,
    Path(ticket_id): Path<i64>,
    Query(q): Query<LogsQuery>,
) -> Result<Json<Vec<AuditLogEntry>>, HttpError> {
    ticket_logs(&state.api, TicketId(ticket_id), q.model_id.as_deref())
        .await
        .map(Json)
        .map_err(api_error)
}

/// Requests without a username header act as the system.
fn actor_from_headers(headers: &HeaderMap) -> Actor {
    headers
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| Actor::User(name.to_string()))
        .unwrap_or(Actor::System)
}

fn api_error(err: ApiError) -> HttpError {
    let status = match err.code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    status_error(status, err)
}

fn status_error(status: StatusCode, err: ApiError) -> HttpError {
    if status.is_server_error() {
        error!(message = %err.message, "request failed");
    }
    (status, Json(err))
}

fn session_error(err: tower_sessions::session::Error) -> HttpError {
    status_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        ApiError::new(ErrorCode::Internal, err.to_string()),
    )
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
