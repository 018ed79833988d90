use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::engine::Engine;
use crate::engine::Feature;
use crate::engine::Light;
use crate::engine::TurnOffOptions;
use crate::engine::TurnOnOptions;
use crate::error::Error;

/// Response for the /v1/ping endpoint
#[derive(Serialize)]
struct PingResponse {
    status: String,
}

/// Response for the /v1/info endpoint
#[derive(Serialize)]
struct InfoResponse {
    version: String,
    hostname: String,
    lights: usize,
}

/// Host-facing view of one light
#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct LightView {
    id: String,
    name: String,
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    brightness: Option<u8>,
    on: bool,
    supported_features: Vec<String>,
}

impl From<&Light> for LightView {
    fn from(light: &Light) -> Self {
        Self {
            id: light.id().to_string(),
            name: light.display_name(),
            kind: light.kind().to_string(),
            brightness: light.brightness(),
            on: light.is_on(),
            supported_features: light
                .supported_features()
                .iter()
                .map(Feature::to_string)
                .collect(),
        }
    }
}

/// Body of POST /v1/lights/:id/turn_on
#[derive(Debug, Default, Deserialize)]
struct TurnOnRequest {
    brightness: Option<i64>,
    /// Seconds
    transition: Option<f64>,
}

/// Body of POST /v1/lights/:id/turn_off
#[derive(Debug, Default, Deserialize)]
struct TurnOffRequest {
    /// Seconds
    transition: Option<f64>,
}

/// Zero, negative, or non-finite durations mean "switch immediately".
fn transition_duration(seconds: Option<f64>) -> Option<Duration> {
    seconds
        .and_then(|s| Duration::try_from_secs_f64(s).ok())
        .filter(|d| !d.is_zero())
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(e: Error) -> Response {
    let status = match e {
        Error::UnknownLightId(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
        .into_response()
}

/// Decode an optional JSON body. An empty body means "all defaults", anything else
/// must decode or the request is rejected with 400.
fn parse_body<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, Response> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("Invalid request body: {}", e),
            }),
        )
            .into_response()
    })
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    version: &'static str,
    engine: Arc<Engine>,
}

/// Handler for GET /v1/ping
#[tracing::instrument]
async fn ping() -> impl IntoResponse {
    tracing::debug!("Handling /v1/ping request");
    (
        StatusCode::OK,
        Json(PingResponse {
            status: "ok".to_string(),
        }),
    )
}

/// Handler for GET /v1/info
#[tracing::instrument(skip(state))]
async fn info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::debug!("Handling /v1/info request");

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    (
        StatusCode::OK,
        Json(InfoResponse {
            version: state.version.to_string(),
            hostname,
            lights: state.engine.registry().len(),
        }),
    )
}

/// Handler for GET /v1/lights
#[tracing::instrument(skip(state))]
async fn list_lights(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let lights: Vec<LightView> = state
        .engine
        .registry()
        .iter()
        .map(|light| LightView::from(light.as_ref()))
        .collect();
    (StatusCode::OK, Json(lights))
}

/// Handler for GET /v1/lights/:id
#[tracing::instrument(skip(state))]
async fn get_light(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.engine.light(&id) {
        Ok(light) => (StatusCode::OK, Json(LightView::from(light.as_ref()))).into_response(),
        Err(e) => error_response(e),
    }
}

/// Handler for POST /v1/lights/:id/turn_on
#[tracing::instrument(skip(state))]
async fn turn_on(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Response {
    let request: TurnOnRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(rejection) => return rejection,
    };
    let options = TurnOnOptions {
        brightness: request.brightness.map(|b| b.clamp(0, 255) as u8),
        transition: transition_duration(request.transition),
    };

    match state.engine.turn_on(&id, options) {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => error_response(e),
    }
}

/// Handler for POST /v1/lights/:id/turn_off
#[tracing::instrument(skip(state))]
async fn turn_off(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Response {
    let request: TurnOffRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(rejection) => return rejection,
    };
    let options = TurnOffOptions {
        transition: transition_duration(request.transition),
    };

    match state.engine.turn_off(&id, options) {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => error_response(e),
    }
}

/// Create the API router with all endpoints
fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/ping", get(ping))
        .route("/v1/info", get(info))
        .route("/v1/lights", get(list_lights))
        .route("/v1/lights/:id", get(get_light))
        .route("/v1/lights/:id/turn_on", post(turn_on))
        .route("/v1/lights/:id/turn_off", post(turn_off))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP API server
///
/// Binds to `listen:port` and serves until `shutdown_rx` fires.
pub async fn serve(
    engine: Arc<Engine>,
    listen: String,
    port: u16,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let version = env!("CARGO_PKG_VERSION");

    let state = Arc::new(AppState { version, engine });
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", listen, port).parse()?;
    tracing::info!("Starting HTTP API server on {}", addr);

    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            tracing::info!("HTTP API server shutting down gracefully");
        })
        .await?;

    Ok(())
}
