//! HTTP handlers for Herald server.
//!
//! This module wires event dispatch and channel authorization to routes.

use crate::config::Config;
use crate::error::ApiError;
use crate::events;
use crate::metrics;
use anyhow::Result;
use axum::{
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Form, Json, Router,
};
use herald_core::{
    AuthSigner, Authorizer, ChannelName, Dispatcher, InMemoryDirectory, Payload, Topic, User,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Health check route.
pub const HEALTH_PATH: &str = "/health";
/// Event submission route.
pub const EVENTS_PATH: &str = "/events";

/// Shared server state.
pub struct AppState {
    /// Event dispatcher.
    pub dispatcher: Dispatcher,
    /// Private channel authorizer.
    pub authorizer: Authorizer<Arc<InMemoryDirectory>>,
    /// Connections held by each user, maintained by connection events.
    pub directory: Arc<InMemoryDirectory>,
    /// Auth token signer.
    pub signer: AuthSigner,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    ///
    /// # Errors
    ///
    /// Returns an error if the event handlers cannot be registered.
    pub fn new(config: Config) -> Result<Self> {
        let directory = Arc::new(InMemoryDirectory::new());
        let registry = events::registry(directory.clone())?;
        info!(events = ?registry.names(), "Registered event handlers");

        if config.auth.app_secret.is_empty() {
            warn!("No auth.app_secret configured, auth tokens are signed with an empty key");
        }

        Ok(Self {
            dispatcher: Dispatcher::new(registry),
            authorizer: Authorizer::new(directory.clone()),
            directory,
            signer: AuthSigner::new(&config.auth.app_key, &config.auth.app_secret),
            config,
        })
    }
}

/// Build the HTTP router.
///
/// The auth path must have passed [`Config::validate`].
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(health_handler))
        .route(EVENTS_PATH, post(event_handler))
        .route(&state.config.auth.path, post(auth_handler))
        .layer(DefaultBodyLimit::max(state.config.limits.max_body_bytes))
        .with_state(state)
}

/// Run the HTTP server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let state = Arc::new(AppState::new(config)?);
    let app = app(state.clone());

    let listener = TcpListener::bind(addr).await?;

    info!("Herald server listening on {}", addr);
    info!("Auth endpoint: http://{}{}", addr, state.config.auth.path);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "users": state.directory.user_count(),
        "connections": state.directory.connection_count()
    }))
}

/// Event submission.
#[derive(Debug, Deserialize)]
struct EventRequest {
    name: String,
    #[serde(default)]
    args: Payload,
}

#[derive(Debug, Serialize)]
struct EventResponse {
    status: &'static str,
}

/// Dispatch a named event.
async fn event_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EventRequest>,
) -> Result<(StatusCode, Json<EventResponse>), ApiError> {
    let limit = state.config.limits.max_args;
    if request.args.len() > limit {
        return Err(ApiError::TooManyArgs {
            count: request.args.len(),
            limit,
        });
    }

    let start = Instant::now();
    let outcome = state.dispatcher.dispatch(&request.name, &request.args);
    metrics::record_latency("events", start.elapsed().as_secs_f64());

    let dispatch = match outcome {
        Ok(dispatch) => dispatch,
        Err(e) => {
            metrics::record_event("failed");
            return Err(e.into());
        }
    };

    metrics::record_event(dispatch.as_str());
    debug!(event = %request.name, outcome = dispatch.as_str(), "Event dispatched");

    Ok((
        StatusCode::ACCEPTED,
        Json(EventResponse {
            status: dispatch.as_str(),
        }),
    ))
}

/// Pusher channel auth form.
#[derive(Debug, Deserialize)]
struct AuthRequest {
    socket_id: String,
    channel_name: String,
}

#[derive(Debug, Serialize)]
struct AuthResponse {
    auth: String,
}

/// Authorize a private channel subscription.
async fn auth_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(request): Form<AuthRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let start = Instant::now();
    let user = caller(&headers, &state.config.auth.user_header)?;

    let authorization = state.authorizer.authorize(&user, &request.channel_name);
    metrics::record_authorization(topic_label(&request.channel_name), authorization.is_success());

    if !authorization.is_success() {
        return Err(ApiError::Forbidden(request.channel_name));
    }

    let auth = state.signer.sign(&request.socket_id, &request.channel_name)?;
    metrics::record_latency("auth", start.elapsed().as_secs_f64());

    debug!(
        user = %user.id(),
        channel = %request.channel_name,
        socket = %request.socket_id,
        "Channel authorized"
    );

    Ok(Json(AuthResponse { auth }))
}

/// Identify the calling user from the configured header.
fn caller(headers: &HeaderMap, header: &str) -> Result<User, ApiError> {
    headers
        .get(header)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(User::new)
        .ok_or_else(|| ApiError::MissingUser(header.to_string()))
}

/// Bounded label for authorization metrics.
fn topic_label(channel: &str) -> &'static str {
    match ChannelName::parse(channel).as_ref().map(ChannelName::topic) {
        Some(Topic::User) => "user",
        Some(Topic::Connection) => "connection",
        Some(Topic::Other(_)) => "other",
        None => "unrecognized",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use herald_core::UserId;
    use tower::ServiceExt;

    fn test_state() -> Arc<AppState> {
        state_with(Config::default())
    }

    fn state_with(mut config: Config) -> Arc<AppState> {
        config.auth.app_key = "key".to_string();
        config.auth.app_secret = "secret".to_string();
        config.limits.max_args = 4;
        Arc::new(AppState::new(config).unwrap())
    }

    fn event_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/events")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn auth_request(user: Option<&str>, socket_id: &str, channel: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/pusher/auth")
            .header("content-type", "application/x-www-form-urlencoded");
        if let Some(user) = user {
            builder = builder.header("x-user-id", user);
        }
        builder
            .body(Body::from(format!(
                "socket_id={socket_id}&channel_name={channel}"
            )))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app(test_state())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["connections"], 0);
    }

    #[tokio::test]
    async fn test_event_handled() {
        let response = app(test_state())
            .oneshot(event_request(r#"{"name": "GenericEvent", "args": [10]}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(json_body(response).await["status"], "handled");
    }

    #[tokio::test]
    async fn test_event_unknown_is_ignored() {
        let response = app(test_state())
            .oneshot(event_request(r#"{"name": "MadeUpNothingness", "args": [10]}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(json_body(response).await["status"], "ignored");
    }

    #[tokio::test]
    async fn test_event_handler_failure() {
        let response = app(test_state())
            .oneshot(event_request(r#"{"name": "ConnectionOpened", "args": [42]}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json_body(response).await["code"], "HANDLER_FAILED");
    }

    #[tokio::test]
    async fn test_event_too_many_args() {
        let response = app(test_state())
            .oneshot(event_request(r#"{"name": "GenericEvent", "args": [1, 2, 3, 4, 5]}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_event_body_over_limit() {
        let mut config = Config::default();
        config.limits.max_body_bytes = 64;
        let state = state_with(config);

        let text = "x".repeat(200);
        let body = format!(r#"{{"name": "GenericEvent", "args": ["{text}"]}}"#);
        let response = app(state).oneshot(event_request(&body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_event_large_numeric_ids() {
        let state = test_state();

        let response = app(state.clone())
            .oneshot(event_request(
                r#"{"name": "ConnectionOpened", "args": [18446744073709551615, 7]}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(
            state
                .directory
                .connections(&UserId::from("18446744073709551615")),
            vec!["7"]
        );
    }

    #[tokio::test]
    async fn test_auth_user_channel() {
        let state = test_state();

        let response = app(state.clone())
            .oneshot(auth_request(Some("42"), "1234.1234", "private-user-42"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let token = json_body(response).await["auth"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(token.starts_with("key:"));
        assert!(state.signer.verify("1234.1234", "private-user-42", &token));

        let response = app(state)
            .oneshot(auth_request(Some("43"), "1234.1234", "private-user-42"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_auth_connection_channel_follows_events() {
        let state = test_state();

        let denied = app(state.clone())
            .oneshot(auth_request(Some("42"), "1.1", "private-connection-7"))
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);

        let opened = app(state.clone())
            .oneshot(event_request(r#"{"name": "ConnectionOpened", "args": [42, 7]}"#))
            .await
            .unwrap();
        assert_eq!(opened.status(), StatusCode::ACCEPTED);
        assert_eq!(state.directory.connections(&UserId::from("42")), vec!["7"]);

        let granted = app(state)
            .oneshot(auth_request(Some("42"), "1.1", "private-connection-7"))
            .await
            .unwrap();
        assert_eq!(granted.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_auth_rejections() {
        let state = test_state();

        let response = app(state.clone())
            .oneshot(auth_request(None, "1.1", "private-user-42"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app(state.clone())
            .oneshot(auth_request(Some("42"), "1.1", "presence-lobby"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app(state)
            .oneshot(auth_request(Some("42"), "bogus", "private-user-42"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "INVALID_SOCKET_ID");
    }

    #[test]
    fn test_topic_label() {
        assert_eq!(topic_label("private-user-1"), "user");
        assert_eq!(topic_label("private-connection-1"), "connection");
        assert_eq!(topic_label("private-team-1"), "other");
        assert_eq!(topic_label("lobby"), "unrecognized");
    }
}
