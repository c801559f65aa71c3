//! HTTP surface. Every request carries the caller's identity and Google token;
//! remote clients are built from that token per request.

use axum::{
    Json, Router, async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, warn};

use crate::agent::Agent;
use crate::agent::dispatch::{self, ActionResult};
use crate::agent::intent::{CalendarIntent, Domain, EventTarget, NormalizedIntent};
use crate::dashboard;
use crate::error::ErrorKind;
use crate::google::{ClientFactory, RemoteClients, RemoteError};

const USER_HEADER: &str = "x-user-id";

#[derive(Clone)]
pub struct AppState {
    pub agent: Agent,
    pub factory: Arc<dyn ClientFactory>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/agent/calendar", post(agent_calendar))
        .route("/agent/email", post(agent_email))
        .route("/agent/tasks", post(agent_tasks))
        .route("/interpret", post(interpret))
        .route("/calendar/today", get(calendar_today))
        .route("/calendar/range", get(calendar_range))
        .route("/calendar/overview", get(calendar_overview))
        .route("/calendar/delete", post(calendar_delete))
        .route("/task/alltask", get(all_tasks))
        .route("/task/:id/complete", patch(complete_task))
        .route("/task/:id/delete", delete(delete_task))
        .route("/emails", get(emails_inbox))
        .route("/emails/lastweek", get(emails_last_week))
        .route("/emails/action", post(email_action))
        .with_state(state)
}

/// Bind and serve until ctrl-c.
pub async fn serve(state: AppState, bind_addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(addr = %listener.local_addr()?, "Listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
        })
        .await?;
    Ok(())
}

/// HTTP status for a failure category.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::MalformedOutput | ErrorKind::UnknownAction | ErrorKind::ValidationFailed => {
            StatusCode::BAD_REQUEST
        }
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::RemoteRejected => StatusCode::BAD_GATEWAY,
        ErrorKind::RemoteUnavailable => StatusCode::UNAUTHORIZED,
    }
}

/// An `ActionResult` with the status its error kind implies.
pub struct Reply(pub ActionResult);

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        let status = self.0.error_kind.map(status_for).unwrap_or(StatusCode::OK);
        (status, Json(self.0)).into_response()
    }
}

/// Failure from a helper endpoint.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl From<RemoteError> for ApiError {
    fn from(err: RemoteError) -> Self {
        warn!(error = %err, "Remote call failed");
        Self::new(status_for(err.kind()), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "success": false, "message": self.message });
        (self.status, Json(body)).into_response()
    }
}

/// Caller identity alone, for endpoints that never reach Google.
pub struct UserId(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match header_value(parts, USER_HEADER) {
            Some(user_id) => Ok(UserId(user_id.to_string())),
            None => Err(ApiError::new(StatusCode::UNAUTHORIZED, "Unauthorized").into_response()),
        }
    }
}

/// Caller identity plus the Google access token from the `Authorization` header.
pub struct Session {
    pub user_id: String,
    access_token: String,
}

impl Session {
    fn clients(&self, factory: &dyn ClientFactory) -> RemoteClients {
        factory.for_token(&self.access_token)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let UserId(user_id) = UserId::from_request_parts(parts, state).await?;

        let token = header_value(parts, header::AUTHORIZATION.as_str())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty());
        let Some(token) = token else {
            let kind = ErrorKind::RemoteUnavailable;
            return Err(Reply(ActionResult::failure(kind, kind.user_message())).into_response());
        };

        Ok(Session {
            user_id,
            access_token: token.to_string(),
        })
    }
}

fn header_value<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Deserialize)]
pub struct PromptBody {
    #[serde(default)]
    prompt: String,
}

async fn run_agent(state: &AppState, session: &Session, domain: Domain, prompt: &str) -> Reply {
    if prompt.trim().is_empty() {
        return Reply(ActionResult::failure(
            ErrorKind::ValidationFailed,
            "A prompt is required.",
        ));
    }
    let clients = session.clients(state.factory.as_ref());
    let result = state.agent.handle(domain, prompt, &clients).await;
    if let Some(diagnostic) = &result.diagnostic {
        warn!(user = %session.user_id, %domain, diagnostic = %diagnostic, "Agent request failed");
    }
    Reply(result)
}

async fn agent_calendar(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<PromptBody>,
) -> Reply {
    run_agent(&state, &session, Domain::Calendar, &body.prompt).await
}

async fn agent_email(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<PromptBody>,
) -> Reply {
    run_agent(&state, &session, Domain::Email, &body.prompt).await
}

async fn agent_tasks(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<PromptBody>,
) -> Reply {
    run_agent(&state, &session, Domain::Tasks, &body.prompt).await
}

async fn interpret(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let agent = body.get("agent").and_then(Value::as_str);
    match state.agent.summarize(agent, &body).await {
        Ok(text) => Ok(Json(json!({ "success": true, "response": text }))),
        Err(e) => {
            warn!(user = %user_id, error = %e, "Summary failed");
            Err(ApiError::new(status_for(e.kind()), "Failed to interpret JSON"))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DayQuery {
    date: Option<String>,
}

async fn calendar_today(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<DayQuery>,
) -> Result<Json<Value>, ApiError> {
    let ctx = state.agent.date_context();
    let date = match query.date.as_deref() {
        Some(text) => NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
            .map_err(|_| ApiError::bad_request(format!("Invalid date: {}", text)))?,
        None => ctx.anchor_date,
    };

    let clients = session.clients(state.factory.as_ref());
    let events = dashboard::events_on(clients.calendar.as_ref(), date, ctx.offset()).await?;
    Ok(Json(json!({ "success": true, "events": events })))
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    start: Option<String>,
    end: Option<String>,
}

async fn calendar_range(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<RangeQuery>,
) -> Result<Json<Value>, ApiError> {
    let offset = state.agent.date_context().offset();
    let (Some(start), Some(end)) = (query.start.as_deref(), query.end.as_deref()) else {
        return Err(ApiError::bad_request("Missing required params"));
    };
    let start = dashboard::parse_bound(start, offset, false)
        .ok_or_else(|| ApiError::bad_request(format!("Invalid start: {}", start)))?;
    let end = dashboard::parse_bound(end, offset, true)
        .ok_or_else(|| ApiError::bad_request(format!("Invalid end: {}", end)))?;

    let clients = session.clients(state.factory.as_ref());
    let events = dashboard::events_between(clients.calendar.as_ref(), start, end).await?;
    Ok(Json(json!({ "success": true, "events": events })))
}

async fn calendar_overview(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Value>, ApiError> {
    let ctx = state.agent.date_context();
    let clients = session.clients(state.factory.as_ref());
    let overview = dashboard::overview(&clients, &ctx).await?;
    Ok(Json(json!({
        "success": true,
        "events": overview.events,
        "tasks": overview.tasks,
    })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteEventBody {
    event_id: Option<String>,
    title: Option<String>,
}

async fn calendar_delete(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<DeleteEventBody>,
) -> Reply {
    let target = EventTarget {
        event_id: body.event_id.filter(|s| !s.trim().is_empty()),
        title: body.title.filter(|s| !s.trim().is_empty()),
    };
    let intent = NormalizedIntent::Calendar(CalendarIntent::DeleteEvent(target));
    let ctx = state.agent.date_context();
    let clients = session.clients(state.factory.as_ref());
    Reply(dispatch::dispatch(&intent, &clients, &ctx, state.agent.tz_name()).await)
}

async fn all_tasks(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<dashboard::TaskBuckets>, ApiError> {
    let ctx = state.agent.date_context();
    let clients = session.clients(state.factory.as_ref());
    let buckets = dashboard::task_buckets(clients.tasks.as_ref(), &ctx).await?;
    Ok(Json(buckets))
}

async fn complete_task(
    State(state): State<AppState>,
    session: Session,
    Path(task_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let clients = session.clients(state.factory.as_ref());
    let task = dashboard::complete_task(clients.tasks.as_ref(), &task_id).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Task marked as completed",
        "task": task,
    })))
}

async fn delete_task(
    State(state): State<AppState>,
    session: Session,
    Path(task_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let clients = session.clients(state.factory.as_ref());
    dashboard::delete_task(clients.tasks.as_ref(), &task_id).await?;
    Ok(Json(json!({ "success": true, "message": "Task deleted successfully" })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxQuery {
    q: Option<String>,
    max_results: Option<u32>,
}

async fn emails_inbox(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<InboxQuery>,
) -> Result<Json<Value>, ApiError> {
    let clients = session.clients(state.factory.as_ref());
    let emails = dashboard::inbox(
        clients.mail.as_ref(),
        query.q.as_deref().unwrap_or_default(),
        query.max_results.unwrap_or(dashboard::INBOX_PAGE_SIZE),
    )
    .await?;
    Ok(Json(json!({ "success": true, "emails": emails })))
}

async fn emails_last_week(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Value>, ApiError> {
    let ctx = state.agent.date_context();
    let clients = session.clients(state.factory.as_ref());
    let emails = dashboard::last_week_emails(clients.mail.as_ref(), &ctx).await?;
    Ok(Json(json!({ "success": true, "emails": emails })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailActionBody {
    email_id: Option<String>,
    action: Option<String>,
}

async fn email_action(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<EmailActionBody>,
) -> Result<Json<Value>, ApiError> {
    let email_id = body.email_id.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let action = body.action.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let (Some(email_id), Some(action)) = (email_id, action) else {
        return Err(ApiError::bad_request("Email ID and action required"));
    };
    let action: dashboard::MailAction = action.parse().map_err(ApiError::bad_request)?;

    let clients = session.clients(state.factory.as_ref());
    dashboard::apply_mail_action(clients.mail.as_ref(), email_id, action).await?;
    Ok(Json(json!({ "success": true, "message": action.done_message() })))
}
