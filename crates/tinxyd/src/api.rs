use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Deserialize;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::platform::AccessorySnapshot;
use crate::platform::CharacteristicValue;
use crate::platform::Identity;
use crate::platform::Platform;
use crate::platform::PlatformError;

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
    accessories: usize,
}

/// Body and response of the characteristic endpoints
#[derive(Debug, Serialize, Deserialize)]
struct CharacteristicBody {
    value: CharacteristicValue,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    version: &'static str,
    platform: Arc<Platform>,
}

struct ApiError(PlatformError);

impl From<PlatformError> for ApiError {
    fn from(e: PlatformError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            PlatformError::UnknownAccessory(_) => StatusCode::NOT_FOUND,
            PlatformError::Unbound(_) => StatusCode::CONFLICT,
            PlatformError::Write(_) => StatusCode::BAD_GATEWAY,
        };
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
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
            accessories: state.platform.accessory_count(),
        }),
    )
}

/// Handler for GET /v1/accessories
#[tracing::instrument(skip(state))]
async fn list_accessories(State(state): State<Arc<AppState>>) -> Json<Vec<AccessorySnapshot>> {
    Json(
        state
            .platform
            .accessories()
            .iter()
            .map(|a| a.snapshot())
            .collect(),
    )
}

/// Handler for GET /v1/accessories/:identity/characteristic
#[tracing::instrument(skip(state))]
async fn get_characteristic(
    State(state): State<Arc<AppState>>,
    Path(identity): Path<Identity>,
) -> Result<Json<CharacteristicBody>, ApiError> {
    let value = state.platform.get_characteristic(&identity).await?;
    Ok(Json(CharacteristicBody { value }))
}

/// Handler for PUT /v1/accessories/:identity/characteristic
#[tracing::instrument(skip(state))]
async fn set_characteristic(
    State(state): State<Arc<AppState>>,
    Path(identity): Path<Identity>,
    Json(body): Json<CharacteristicBody>,
) -> Result<StatusCode, ApiError> {
    state
        .platform
        .set_characteristic(&identity, body.value)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Create the API router with all endpoints
fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/ping", get(ping))
        .route("/v1/info", get(info))
        .route("/v1/accessories", get(list_accessories))
        .route(
            "/v1/accessories/:identity/characteristic",
            get(get_characteristic).put(set_characteristic),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP API server
///
/// This function will bind to the specified address and serve the API endpoints.
/// It will run until the provided shutdown signal is triggered.
///
/// # Arguments
/// * `listen` - The IP address to listen on (e.g., "127.0.0.1")
/// * `port` - The port to listen on (e.g., 8581)
/// * `platform` - The platform whose accessories are exposed
/// * `shutdown_rx` - A oneshot receiver that will trigger graceful shutdown
///
/// # Returns
/// Returns Ok(()) if the server shuts down gracefully, or an error if startup fails
pub async fn serve(
    listen: String,
    port: u16,
    platform: Arc<Platform>,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let version = env!("CARGO_PKG_VERSION");

    let state = Arc::new(AppState { version, platform });
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
