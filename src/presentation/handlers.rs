// HTTP request handlers
use crate::application::controller::ControlError;
use crate::application::settings::{AppearanceSettings, ConnectionSettings};
use crate::domain::connection::ConnectionStatus;
use crate::domain::dashboard::Dashboard;
use crate::domain::telemetry::ChartExport;
use crate::infrastructure::http_response::json_download;
use crate::infrastructure::update_stream::stream_from_receiver;
use crate::presentation::app_state::AppState;
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, State},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Login required")]
    Unauthorized,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error(transparent)]
    Control(#[from] ControlError),

    #[error("{0:#}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::Control(ControlError::NotConnected) => StatusCode::CONFLICT,
            ApiError::Control(ControlError::Config(_)) | ApiError::Control(ControlError::Chart(_)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Control(ControlError::Transport(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Control(ControlError::Stopped) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Proof that the request carries the current login token, either as a
/// bearer header or as a `token` query parameter (for WebSocket clients).
pub struct Authenticated;

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).or_else(|| query_token(parts));
        match token {
            Some(token) if state.sessions.is_valid(&token) => Ok(Authenticated),
            _ => Err(ApiError::Unauthorized),
        }
    }
}

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

fn query_token(parts: &Parts) -> Option<String> {
    parts
        .uri
        .query()?
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
        .map(str::to_string)
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub connection: ConnectionSettings,
    pub appearance: AppearanceSettings,
    pub auto_connecting: bool,
}

#[derive(Serialize, Deserialize)]
pub struct PauseState {
    pub paused: bool,
}

#[derive(Deserialize)]
pub struct AutoRefreshRequest {
    pub seconds: u64,
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    if !state.login.accepts(&request.username, &request.password) {
        tracing::warn!("Rejected login for '{}'", request.username);
        return Err(ApiError::InvalidCredentials);
    }

    let token = state.sessions.issue();
    let connection = state.settings.load_connection();
    let appearance = state.settings.load_appearance();
    tracing::info!("User '{}' logged in", request.username);

    let auto_connecting = state.auto_connect && connection.is_complete();
    if auto_connecting {
        if let Err(e) = state.dashboard.connect(connection.clone()).await {
            tracing::warn!("Auto-connect with saved settings failed: {}", e);
        }
    }

    Ok(Json(LoginResponse {
        token,
        connection: connection.redacted(),
        appearance,
        auto_connecting,
    }))
}

pub async fn logout(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, ApiError> {
    state.dashboard.logout().await?;
    state.sessions.revoke();
    tracing::info!("User logged out");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn connect(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
    Json(settings): Json<ConnectionSettings>,
) -> Result<StatusCode, ApiError> {
    let settings = settings.restore_password(&state.settings.load_connection());
    state.dashboard.connect(settings).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn disconnect(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, ApiError> {
    state.dashboard.disconnect().await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn refresh(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, ApiError> {
    state.dashboard.refresh().await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn send_test_data(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, ApiError> {
    state.dashboard.send_test_data().await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn pause_messages(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
) -> Result<Json<PauseState>, ApiError> {
    let paused = state.dashboard.pause().await?;
    Ok(Json(PauseState { paused }))
}

pub async fn resume_messages(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
) -> Result<Json<PauseState>, ApiError> {
    let paused = state.dashboard.resume().await?;
    Ok(Json(PauseState { paused }))
}

pub async fn toggle_messages(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
) -> Result<Json<PauseState>, ApiError> {
    let paused = state.dashboard.toggle_pause().await?;
    Ok(Json(PauseState { paused }))
}

pub async fn clear_messages(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, ApiError> {
    state.dashboard.clear_messages().await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn clear_charts(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, ApiError> {
    state.dashboard.clear_charts().await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn export_charts(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let export = state.dashboard.export_charts().await?;
    match json_download(&export, &export.file_name()) {
        Ok(response) => Ok(response.into_response()),
        Err(status) => Ok(status.into_response()),
    }
}

pub async fn import_charts(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
    Json(export): Json<ChartExport>,
) -> Result<StatusCode, ApiError> {
    state.dashboard.import_charts(export).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_dashboard(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Dashboard>, ApiError> {
    Ok(Json(state.dashboard.snapshot().await?))
}

pub async fn get_status(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
) -> Result<Json<ConnectionStatus>, ApiError> {
    Ok(Json(state.dashboard.snapshot().await?.connection))
}

/// Snapshot followed by live updates as newline-delimited JSON
pub async fn stream_updates(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    // Subscribe before the snapshot so nothing falls in between
    let rx = state.sink.subscribe();
    let snapshot = state.dashboard.snapshot().await?;
    Ok(stream_from_receiver(snapshot, rx).into_response())
}

pub async fn get_connection_settings(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
) -> Json<ConnectionSettings> {
    Json(state.settings.load_connection().redacted())
}

pub async fn put_connection_settings(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
    Json(settings): Json<ConnectionSettings>,
) -> Result<StatusCode, ApiError> {
    let settings = settings.restore_password(&state.settings.load_connection());
    state.settings.save_connection(&settings)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn reset_connection_settings(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
) -> Result<Json<ConnectionSettings>, ApiError> {
    let defaults = state.settings.reset_connection()?;
    Ok(Json(defaults.redacted()))
}

pub async fn get_appearance(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
) -> Json<AppearanceSettings> {
    Json(state.settings.load_appearance())
}

pub async fn put_appearance(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
    Json(appearance): Json<AppearanceSettings>,
) -> Result<StatusCode, ApiError> {
    state.settings.save_appearance(&appearance)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn put_auto_refresh(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
    Json(request): Json<AutoRefreshRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .dashboard
        .set_auto_refresh(Duration::from_secs(request.seconds))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
