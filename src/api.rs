//! JSON HTTP surface over the session state machine.
//!
//! Every response carries the session snapshot plus the `Decision` the call
//! produced, so a blocked round comes back with its verdicts and findings.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::mailer::parse_contacts;
use crate::pipeline::{Contact, Request};
use crate::session::{ApprovalStateMachine, Decision, Session, SessionStore};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SessionStore>,
    pub machine: Arc<ApprovalStateMachine>,
}

/// Build the router with session and health routes.
pub fn session_routes(store: Arc<SessionStore>, machine: Arc<ApprovalStateMachine>) -> Router {
    let state = AppState { store, machine };

    Router::new()
        .route("/health", get(health))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/{id}", get(get_session))
        .route("/api/sessions/{id}/approve", post(approve_session))
        .route("/api/sessions/{id}/reject", post(reject_session))
        .route("/api/sessions/{id}/retry", post(retry_session))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([header::CONTENT_TYPE]),
        )
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "sales-agent"
    }))
}

// ── Sessions ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CreateSessionRequest {
    text: String,
    sender_name: String,
    #[serde(default)]
    recipients: Vec<Contact>,
    /// Pasted name/email table, appended to `recipients`.
    #[serde(default)]
    contacts: Option<String>,
}

async fn create_session(
    State(state): State<AppState>,
    Json(body): Json<CreateSessionRequest>,
) -> Response {
    let mut recipients = body.recipients;
    let mut rejected_rows = Vec::new();
    if let Some(table) = body.contacts.as_deref() {
        match parse_contacts(table) {
            Ok(list) => {
                recipients.extend(list.contacts);
                rejected_rows = list.rejected;
            }
            Err(e) => return error(StatusCode::BAD_REQUEST, e.to_string()),
        }
    }

    let request = match Request::new(body.text, body.sender_name, recipients) {
        Ok(request) => request,
        Err(e) => return error(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let (id, handle) = state.store.create().await;
    let mut session = handle.lock().await;
    let decision = state.machine.submit(&mut session, request).await;
    info!(session = %id, decision = decision.label(), "Session submitted");

    let status = match &decision {
        Decision::Drafted { .. } => StatusCode::CREATED,
        other => status_for(other),
    };
    (
        status,
        Json(serde_json::json!({
            "session": &*session,
            "decision": decision,
            "rejected_rows": rejected_rows,
        })),
    )
        .into_response()
}

async fn get_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let handle = match lookup(&state, &id).await {
        Ok(handle) => handle,
        Err(response) => return response,
    };
    let session = handle.lock().await;
    (StatusCode::OK, Json(serde_json::json!(&*session))).into_response()
}

async fn approve_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    decide(state, &id, Action::Approve).await
}

async fn reject_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    decide(state, &id, Action::Reject).await
}

async fn retry_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    decide(state, &id, Action::Retry).await
}

#[derive(Clone, Copy)]
enum Action {
    Approve,
    Reject,
    Retry,
}

async fn decide(state: AppState, id: &str, action: Action) -> Response {
    let handle = match lookup(&state, id).await {
        Ok(handle) => handle,
        Err(response) => return response,
    };
    let mut session = handle.lock().await;
    let decision = match action {
        Action::Approve => state.machine.approve(&mut session).await,
        Action::Reject => state.machine.reject(&mut session).await,
        Action::Retry => state.machine.retry(&mut session).await,
    };
    respond(&session, decision)
}

async fn lookup(
    state: &AppState,
    id: &str,
) -> Result<Arc<tokio::sync::Mutex<Session>>, Response> {
    let Ok(id) = Uuid::parse_str(id) else {
        return Err(error(StatusCode::BAD_REQUEST, "Invalid session ID".into()));
    };
    state.store.get(id).await.map_err(|e| {
        warn!(session = %id, "Session lookup failed");
        error(StatusCode::NOT_FOUND, e.to_string())
    })
}

fn respond(session: &Session, decision: Decision) -> Response {
    (
        status_for(&decision),
        Json(serde_json::json!({
            "session": session,
            "decision": decision,
        })),
    )
        .into_response()
}

/// Ignored transitions conflict with the session state; blocked rounds are
/// unprocessable; a round with no candidate is an upstream failure.
fn status_for(decision: &Decision) -> StatusCode {
    match decision {
        Decision::Ignored { .. } => StatusCode::CONFLICT,
        Decision::Blocked { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        Decision::Failed { .. } => StatusCode::BAD_GATEWAY,
        Decision::Drafted { .. } | Decision::Sent { .. } => StatusCode::OK,
    }
}

fn error(status: StatusCode, message: String) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}
