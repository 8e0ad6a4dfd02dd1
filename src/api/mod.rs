//! HTTP server for the web UI variant
//!
//! Serves a single-page UI with a "Start Listening" button; each button
//! press runs one full pipeline interaction on the host (the machine that
//! owns the microphone and speakers) and returns the transcript and reply
//! for display. Playback is fire-and-forget through [`DetachedPlayer`].

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::audio::{AudioPlayer, AudioSample, DetachedPlayer, record_utterance};
use crate::config::Config;
use crate::pipeline::{Outcome, Pipeline};
use crate::{Error, Result};

static INDEX_HTML: &str = include_str!("index.html");

/// Captures one utterance from the host microphone
type Recorder = Arc<dyn Fn() -> Result<AudioSample> + Send + Sync>;

/// Builds a fresh player for each interaction's artifact
type PlayerFactory = Arc<dyn Fn() -> Box<dyn AudioPlayer + Send> + Send + Sync>;

/// Shared state for API handlers
pub struct ApiState {
    pipeline: Pipeline,
    recorder: Recorder,
    make_player: PlayerFactory,
    /// Held across one full capture→play cycle; the microphone and
    /// speakers are process-wide resources, so interactions serialize
    interaction_lock: tokio::sync::Mutex<()>,
}

/// Web UI server wrapping the interaction pipeline
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
}

impl ApiServer {
    /// Wire the server against the real microphone, providers, and speakers
    #[must_use]
    pub fn new(config: &Config, port: u16) -> Self {
        let capture = config.capture.clone();
        let state = ApiState {
            pipeline: Pipeline::new(config),
            recorder: Arc::new(move || record_utterance(&capture)),
            make_player: Arc::new(|| Box::new(DetachedPlayer::new())),
            interaction_lock: tokio::sync::Mutex::new(()),
        };

        Self {
            state: Arc::new(state),
            port,
        }
    }

    /// Build a server from explicit collaborators
    #[must_use]
    pub fn with_state(
        pipeline: Pipeline,
        recorder: Recorder,
        make_player: PlayerFactory,
        port: u16,
    ) -> Self {
        Self {
            state: Arc::new(ApiState {
                pipeline,
                recorder,
                make_player,
                interaction_lock: tokio::sync::Mutex::new(()),
            }),
            port,
        }
    }

    /// Build the router with all routes
    fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/", get(index))
            .route("/health", get(health))
            .route("/api/interact", post(interact))
            .with_state(Arc::clone(&self.state))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until interrupted
    ///
    /// # Errors
    ///
    /// Returns error if the server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Config(format!("failed to bind UI server: {e}")))?;

        tracing::info!(port = self.port, "UI server listening");

        axum::serve(listener, self.router())
            .await
            .map_err(|e| Error::Config(format!("UI server error: {e}")))?;

        Ok(())
    }
}

/// Serve the single-page UI
async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Liveness probe
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Response for one interaction
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct InteractResponse {
    /// What the user said (present on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,

    /// The spoken reply (present on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,

    /// User-visible notice for recoverable outcomes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

/// Run one capture → transcribe → respond → synthesize-and-play cycle
async fn interact(
    State(state): State<Arc<ApiState>>,
) -> std::result::Result<Json<InteractResponse>, ApiError> {
    // One interaction at a time: concurrent captures would contend for the
    // same microphone, and concurrent replies would talk over each other
    let _interaction = state.interaction_lock.lock().await;

    let recorder = Arc::clone(&state.recorder);
    let sample = tokio::task::spawn_blocking(move || recorder())
        .await
        .map_err(|e| Error::Audio(format!("capture task failed: {e}")))
        .and_then(|captured| captured)?;

    let outcome = state.pipeline.converse(&sample).await?;

    match outcome {
        Outcome::Reply {
            transcript,
            reply,
            artifact,
        } => {
            // Fire-and-forget: the playback thread owns the artifact and
            // deletes it when done
            let mut player = (state.make_player)();
            player.play(artifact)?;

            Ok(Json(InteractResponse {
                transcript: Some(transcript),
                reply: Some(reply),
                notice: None,
            }))
        }
        recoverable => Ok(Json(InteractResponse {
            transcript: None,
            reply: None,
            notice: recoverable.notice(),
        })),
    }
}

/// Maps classified pipeline errors onto HTTP statuses
#[derive(Debug)]
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::AuthFailure(_) => StatusCode::UNAUTHORIZED,
            Error::QuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            Error::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": { "message": self.0.to_string() }
        });

        (status, Json(body)).into_response()
    }
}
