// HTTP server with API routes for the live loop and single-image detection

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use argus_core::DetectionSummary;
use argus_eye::annotate::{draw_detections, encode_jpeg, JPEG_QUALITY};
use argus_eye::detector::resolve_class_filter;
use argus_eye::{Detector, InferenceParams, LiveConfig, LiveController, RunState, StubDetector};
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::page::INDEX_HTML;

/// Maximum accepted upload size for single-image detection.
const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Delay before re-checking for a published frame in the stream loop.
const STREAM_POLL_DELAY: Duration = Duration::from_millis(50);

/// Lazily-initialized detector shared by the live loop and the
/// single-image path. `OnceCell` guarantees the model is constructed at
/// most once no matter how many requests race on first use, without
/// touching the run-control lock.
#[derive(Clone)]
pub struct DetectorCell {
    cell: Arc<OnceCell<Arc<dyn Detector>>>,
}

impl DetectorCell {
    pub fn new() -> Self {
        Self {
            cell: Arc::new(OnceCell::new()),
        }
    }

    /// Pre-populated cell, for wiring a specific detector at startup or
    /// in tests.
    pub fn with_detector(detector: Arc<dyn Detector>) -> Self {
        Self {
            cell: Arc::new(OnceCell::from(detector)),
        }
    }

    pub async fn get(&self) -> Arc<dyn Detector> {
        self.cell
            .get_or_init(|| async {
                info!("Initializing detector on first use");
                Arc::new(StubDetector::new()) as Arc<dyn Detector>
            })
            .await
            .clone()
    }
}

impl Default for DetectorCell {
    fn default() -> Self {
        Self::new()
    }
}

// API state
#[derive(Clone)]
pub struct ApiState {
    pub live: LiveController,
    pub detector: DetectorCell,
    pub images_dir: PathBuf,
    pub outputs_dir: PathBuf,
}

// Request/response types
#[derive(Debug, Default, Deserialize)]
pub struct LiveStartRequest {
    pub cam: Option<u32>,
    pub conf: Option<f32>,
    pub imgsz: Option<u32>,
    pub classes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LiveStartResponse {
    pub ok: bool,
    pub state: RunState,
    pub cfg: LiveConfig,
}

#[derive(Debug, Serialize)]
pub struct LiveStopResponse {
    pub ok: bool,
    pub state: RunState,
}

#[derive(Debug, Serialize)]
pub struct SingleDetectResponse {
    pub ok: bool,
    pub out_url: String,
    pub total: usize,
    pub per_class: std::collections::HashMap<String, usize>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
            code: code.to_string(),
        }),
    )
        .into_response()
}

/// Create HTTP router with all API routes
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/live/start", post(live_start_handler))
        .route("/live/stop", post(live_stop_handler))
        .route("/live/stats", get(live_stats_handler))
        .route("/live/stream", get(live_stream_handler))
        .route("/single/detect", post(single_detect_handler))
        .route("/outputs/:filename", get(output_file_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Start the live loop. Idempotent: a second start while running keeps
/// the original configuration, and the response echoes whichever
/// configuration is actually in force.
async fn live_start_handler(
    State(state): State<ApiState>,
    payload: Option<Json<LiveStartRequest>>,
) -> Response {
    let Json(req) = payload.unwrap_or_default();
    let config = LiveConfig {
        camera_id: req.cam.unwrap_or(0),
        confidence: req.conf.unwrap_or(argus_eye::config::DEFAULT_CONFIDENCE),
        input_size: req.imgsz.unwrap_or(argus_eye::config::DEFAULT_INPUT_SIZE),
        classes: req.classes.unwrap_or_default(),
    };
    if let Err(msg) = config.validate() {
        warn!("Rejected live start: {}", msg);
        return error_response(StatusCode::BAD_REQUEST, "INVALID_CONFIG", msg);
    }

    let detector = state.detector.get().await;
    let effective = state.live.start(config, detector);
    Json(LiveStartResponse {
        ok: true,
        state: state.live.run_state(),
        cfg: effective,
    })
    .into_response()
}

async fn live_stop_handler(State(state): State<ApiState>) -> Json<LiveStopResponse> {
    state.live.stop();
    Json(LiveStopResponse {
        ok: true,
        state: state.live.run_state(),
    })
}

async fn live_stats_handler(State(state): State<ApiState>) -> Json<DetectionSummary> {
    Json(state.live.current_stats())
}

/// Assemble one part of the multipart/x-mixed-replace stream.
fn mjpeg_part(jpeg: &Bytes) -> Bytes {
    let header = format!(
        "--frame\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        jpeg.len()
    );
    let mut part = BytesMut::with_capacity(header.len() + jpeg.len() + 2);
    part.extend_from_slice(header.as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    part.freeze()
}

/// MJPEG stream of the latest published frame. Each connection gets its
/// own delivery loop over the shared frame slot; the stream ends as soon
/// as the run state leaves Running. Frames are not deduplicated; client
/// backpressure paces delivery.
async fn live_stream_handler(State(state): State<ApiState>) -> Response {
    let live = state.live.clone();
    let stream = async_stream::stream! {
        loop {
            if live.run_state() != RunState::Running {
                break;
            }
            match live.latest_frame() {
                Some(jpeg) => {
                    yield Ok::<Bytes, Infallible>(mjpeg_part(&jpeg));
                }
                None => {
                    tokio::time::sleep(STREAM_POLL_DELAY).await;
                }
            }
        }
    };

    (
        [(
            header::CONTENT_TYPE,
            "multipart/x-mixed-replace; boundary=frame",
        )],
        Body::from_stream(stream),
    )
        .into_response()
}

/// Strip any path components from a client-supplied filename.
fn sanitize_filename(name: &str) -> Option<String> {
    let base = std::path::Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())?;
    if base.is_empty() || base == "." || base == ".." {
        return None;
    }
    Some(base.to_string())
}

/// One-shot detection on an uploaded image: save the upload, run the
/// detector, write the annotated JPEG, report counts and the output URL.
async fn single_detect_handler(
    State(state): State<ApiState>,
    mut multipart: Multipart,
) -> Response {
    let mut filename = String::from("upload.jpg");
    let mut file_bytes: Option<Bytes> = None;
    let mut confidence = argus_eye::config::DEFAULT_CONFIDENCE;
    let mut input_size = argus_eye::config::DEFAULT_INPUT_SIZE;
    let mut classes = String::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    "MALFORMED_MULTIPART",
                    format!("Failed to read multipart body: {}", err),
                );
            }
        };
        match field.name().unwrap_or("") {
            "file" => {
                if let Some(name) = field.file_name().and_then(sanitize_filename) {
                    filename = name;
                }
                match field.bytes().await {
                    Ok(bytes) => file_bytes = Some(bytes),
                    Err(err) => {
                        return error_response(
                            StatusCode::BAD_REQUEST,
                            "UPLOAD_READ_ERROR",
                            format!("Failed to read upload: {}", err),
                        );
                    }
                }
            }
            "conf" => {
                if let Ok(text) = field.text().await {
                    if let Ok(value) = text.trim().parse::<f32>() {
                        confidence = value;
                    }
                }
            }
            "imgsz" => {
                if let Ok(text) = field.text().await {
                    if let Ok(value) = text.trim().parse::<u32>() {
                        input_size = value;
                    }
                }
            }
            "classes" => {
                if let Ok(text) = field.text().await {
                    classes = text;
                }
            }
            _ => {}
        }
    }

    let Some(raw) = file_bytes else {
        return error_response(StatusCode::BAD_REQUEST, "MISSING_FILE", "No file uploaded");
    };

    // Keep the raw upload alongside the annotated output.
    let in_path = state.images_dir.join(&filename);
    if let Err(err) = tokio::fs::write(&in_path, &raw).await {
        error!("Failed to save upload {:?}: {}", in_path, err);
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "IO_ERROR",
            "Failed to save upload",
        );
    }

    let frame = match image::load_from_memory(&raw) {
        Ok(img) => img.to_rgb8(),
        Err(err) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "INVALID_IMAGE",
                format!("Could not decode image: {}", err),
            );
        }
    };

    let detector = state.detector.get().await;
    let params = InferenceParams {
        confidence,
        input_size,
        class_filter: resolve_class_filter(&classes, detector.class_names()),
    };
    let detections = match detector.detect(&frame, &params) {
        Ok(detections) => detections,
        Err(err) => {
            error!("Single-image detection failed: {}", err);
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "DETECTOR_ERROR",
                "Detection failed",
            );
        }
    };
    let summary = DetectionSummary::count(&detections);

    let mut annotated = frame;
    draw_detections(&mut annotated, &detections);
    let jpeg = match encode_jpeg(&annotated, JPEG_QUALITY) {
        Ok(jpeg) => jpeg,
        Err(err) => {
            error!("Failed to encode annotated image: {}", err);
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "ENCODE_ERROR",
                "Failed to encode annotated image",
            );
        }
    };

    let out_name = format!("annotated_{}", filename);
    let out_path = state.outputs_dir.join(&out_name);
    if let Err(err) = tokio::fs::write(&out_path, &jpeg).await {
        error!("Failed to write output {:?}: {}", out_path, err);
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "IO_ERROR",
            "Failed to write annotated output",
        );
    }

    info!(
        "Single-image detection: {} -> {} ({} objects)",
        filename, out_name, summary.total
    );
    Json(SingleDetectResponse {
        ok: true,
        out_url: format!("/outputs/{}", out_name),
        total: summary.total,
        per_class: summary.per_class,
    })
    .into_response()
}

async fn output_file_handler(
    State(state): State<ApiState>,
    Path(filename): Path<String>,
) -> Response {
    // Traversal guard: the route only ever serves direct children of the
    // outputs directory.
    let Some(safe) = sanitize_filename(&filename) else {
        return error_response(StatusCode::BAD_REQUEST, "INVALID_FILENAME", "Invalid filename");
    };
    if safe != filename {
        return error_response(StatusCode::BAD_REQUEST, "INVALID_FILENAME", "Invalid filename");
    }

    let path = state.outputs_dir.join(&safe);
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let content_type = match path.extension().and_then(|e| e.to_str()) {
                Some("jpg") | Some("jpeg") => "image/jpeg",
                Some("png") => "image/png",
                _ => "application/octet-stream",
            };
            ([(header::CONTENT_TYPE, content_type)], bytes).into_response()
        }
        Err(_) => error_response(StatusCode::NOT_FOUND, "NOT_FOUND", "Output not found"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename_strips_paths() {
        assert_eq!(
            sanitize_filename("../../etc/passwd"),
            Some("passwd".to_string())
        );
        assert_eq!(sanitize_filename("photo.jpg"), Some("photo.jpg".to_string()));
        assert_eq!(sanitize_filename("dir/photo.jpg"), Some("photo.jpg".to_string()));
        assert_eq!(sanitize_filename(".."), None);
        assert_eq!(sanitize_filename(""), None);
    }

    #[test]
    fn test_mjpeg_part_framing() {
        let jpeg = Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xD9]);
        let part = mjpeg_part(&jpeg);
        let text = String::from_utf8_lossy(&part);
        assert!(text.starts_with("--frame\r\nContent-Type: image/jpeg\r\nContent-Length: 4\r\n\r\n"));
        assert!(part.ends_with(b"\r\n"));
    }
}
