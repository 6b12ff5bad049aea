use argh::FromArgs;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::{get, post},
};
use bagbrand::{
    ClientConfig, DEFAULT_ENDPOINT, DEFAULT_SECRETS_PATH, DetectionEngine, EngineError,
    EngineResult, EngineState, GroqClient, ImagePayload, resolve_api_key,
};
use serde_json::json;
use std::{path::PathBuf, sync::Arc, time::Duration};

mod messages;

use messages::DetectionStatus;

// defaults for the server
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;

// phone photos are routinely larger than axum's 2 MiB default
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

const INDEX_HTML: &str = include_str!("index.html");

type Engine = DetectionEngine<GroqClient>;

#[derive(FromArgs)]
/// Bag Brand Detector: upload a photo of a bag and get its brand.
struct DetectorArgs {
    /// the host to run the server on
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to run the server on
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// secrets file read when GROQ_API_KEY is not set in the environment
    #[argh(option, short = 's', default = "PathBuf::from(DEFAULT_SECRETS_PATH)")]
    secrets: PathBuf,

    /// the chat-completion endpoint to send images to
    #[argh(option, default = "DEFAULT_ENDPOINT.to_string()")]
    endpoint: String,

    /// request timeout in seconds, the HTTP client default when unset
    #[argh(option)]
    timeout: Option<u64>,
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    Json(json!({ "status": "ok", "engine": engine.state().as_str() }))
}

async fn post_detect(
    State(engine): State<Arc<Engine>>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let refused = match engine.state() {
        EngineState::Idle => None,
        EngineState::Processing => Some(EngineError::Busy),
        EngineState::Ready => Some(EngineError::Unclaimed),
    };
    if let Some(e) = refused {
        log::debug!("Refusing detection: {e}");
        return (
            StatusCode::CONFLICT,
            Json(DetectionStatus::error(e.to_string())),
        );
    }

    let payload = match read_upload(&mut multipart).await {
        Ok(payload) => payload,
        Err(error_msg) => {
            log::debug!("Rejected upload: {error_msg}");
            return (StatusCode::BAD_REQUEST, Json(DetectionStatus::error(error_msg)));
        }
    };

    match engine.schedule_inference(payload) {
        Ok(id) => {
            log::info!("Scheduled detection #{id}");
            (StatusCode::OK, Json(DetectionStatus::Scheduled { id }))
        }
        Err(e @ (EngineError::Busy | EngineError::Unclaimed)) => (
            StatusCode::CONFLICT,
            Json(DetectionStatus::error(e.to_string())),
        ),
        Err(e @ EngineError::Stopped) => {
            log::error!("Could not schedule detection: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(DetectionStatus::error(e.to_string())),
            )
        }
    }
}

async fn get_result(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    match engine.try_poll_response() {
        EngineResult::Success(result) => {
            log::info!("Detection #{} answered: {}", result.id, result.response);
            (
                StatusCode::OK,
                Json(DetectionStatus::Success {
                    id: result.id,
                    brand: result.response,
                    file_name: result.request_metadata.file_name,
                    duration_ms: u64::try_from(result.duration.as_millis()).unwrap_or(u64::MAX),
                }),
            )
        }
        EngineResult::Failed(result) => {
            log::warn!("Detection #{} failed: {}", result.id, result.response);
            (
                StatusCode::OK,
                Json(DetectionStatus::Error {
                    id: Some(result.id),
                    message: result.response.to_string(),
                }),
            )
        }
        EngineResult::Empty(EngineState::Idle) => (StatusCode::OK, Json(DetectionStatus::Idle)),
        EngineResult::Empty(EngineState::Processing | EngineState::Ready) => {
            (StatusCode::OK, Json(DetectionStatus::Processing))
        }
        EngineResult::Error(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(DetectionStatus::error(e)),
        ),
    }
}

// Takes the first multipart field named `image`.
async fn read_upload(multipart: &mut Multipart) -> Result<ImagePayload, String> {
    while let Some(field) = multipart.next_field().await.map_err(|e| e.to_string())? {
        if field.name() != Some("image") {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(|e| e.to_string())?;

        return ImagePayload::from_upload(file_name, bytes.to_vec()).map_err(|e| e.to_string());
    }

    Err("Missing image upload".to_string())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
    log::info!("Shutting down");
}

async fn serve(addr: String, engine: Arc<Engine>) -> Result<(), Box<dyn std::error::Error>> {
    let app = Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/detect", post(post_detect))
        .route("/results", get(get_result))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(engine);

    log::info!("Starting the server");
    log::info!("Listening on: {}", addr);
    log::info!("Press Ctrl+C to stop the server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: DetectorArgs = argh::from_env();

    let mut config = ClientConfig::default().with_endpoint(args.endpoint);
    if let Some(secs) = args.timeout {
        config = config.with_timeout(Duration::from_secs(secs));
    }

    // Nothing is served without a key. The blocking client is built outside
    // the async runtime and only ever used from the engine's worker thread.
    let secrets = args.secrets;
    let client = match GroqClient::from_credentials(|| resolve_api_key(&secrets), config) {
        Ok(client) => client,
        Err(e) => {
            log::error!("{e}");
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    let engine = Arc::new(DetectionEngine::new(client));

    let addr = format!("{}:{}", args.host, args.port);
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(serve(addr, engine))
}
