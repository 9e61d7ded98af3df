//! HTTP API
//!
//! Endpoints (JSON field names follow the browser client):
//!   GET    /                                   — welcome string
//!   POST   /upload-chunk                       — stage one encrypted chunk
//!   POST   /complete-upload                    — finalize and notify
//!   GET    /count-chunks/{file_id}             — chunk count of a stored file
//!   GET    /download/{file_id}                 — every encrypted chunk
//!   GET    /download-chunk/{file_id}/{n}       — one encrypted chunk
//!   GET    /download/{file_id}/{password}      — decrypted file
//!   DELETE /download/{file_id}/{file_hash}     — delete a stored file

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, MatchedPath, Path, State},
    http::{header, HeaderValue, Method, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bitdrop_core::{BitdropError, BitdropResult, ErrorClass, FinalizeReceipt, UploadId};
use bitdrop_storage::POISON_INDEX;
use bitdrop_transfer::{CompleteRequest, DecryptionOutcome, Services};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, info_span, Span};

use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AppState {
    pub services: Arc<Services>,
    pub metrics: Metrics,
}

pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/upload-chunk", post(upload_chunk))
        .route("/complete-upload", post(complete_upload))
        .route("/count-chunks/{file_id}", get(count_chunks))
        .route("/download/{file_id}", get(download_chunks))
        .route("/download-chunk/{file_id}/{chunk_num}", get(download_chunk))
        .route(
            "/download/{file_id}/{secret}",
            get(download_file).delete(delete_file),
        )
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(cors)
        .with_state(state)
}

/// Request span keyed by the route template. The raw URI is never recorded:
/// `/download/{file_id}/{secret}` carries the password.
fn request_span(request: &Request<Body>) -> Span {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(MatchedPath::as_str)
        .unwrap_or("<unmatched>");
    info_span!("request", method = %request.method(), route = %route)
}

// ── Errors ───────────────────────────────────────────────────────────────

pub enum ApiError {
    Bitdrop(BitdropError),
    /// A path segment that cannot name any stored file
    NoSuchPath(String),
}

impl From<BitdropError> for ApiError {
    fn from(err: BitdropError) -> Self {
        Self::Bitdrop(err)
    }
}

/// Ids arrive as raw path segments so that a malformed one gets the same
/// JSON 404 as an unknown one.
fn parse_id(raw: &str) -> Result<UploadId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::NoSuchPath(format!("No file found with ID {raw}")))
}

pub fn status_for(class: ErrorClass) -> StatusCode {
    match class {
        ErrorClass::Validation | ErrorClass::Duplicate => StatusCode::BAD_REQUEST,
        ErrorClass::NotFound => StatusCode::NOT_FOUND,
        ErrorClass::Ambiguity | ErrorClass::Incomplete | ErrorClass::AlreadyFinalized => {
            StatusCode::CONFLICT
        }
        ErrorClass::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorClass::Delivery => StatusCode::BAD_GATEWAY,
        ErrorClass::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = match self {
            Self::Bitdrop(err) => err,
            Self::NoSuchPath(message) => {
                return (StatusCode::NOT_FOUND, Json(json!({ "message": message })))
                    .into_response();
            }
        };
        let status = status_for(err.class());
        let body = match &err {
            BitdropError::IncompleteUpload {
                total,
                present,
                poisoned,
            } => incomplete_body(&err, *total, present, *poisoned),
            BitdropError::Delivery { receipt, .. } => {
                serde_json::to_value(ReceiptBody::new(receipt, Some(err.to_string())))
                    .unwrap_or_else(|_| json!({ "message": err.to_string() }))
            }
            _ if status == StatusCode::INTERNAL_SERVER_ERROR => {
                error!("request failed: {err:#}");
                json!({ "message": "Unexpected server error" })
            }
            _ => json!({ "message": err.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

/// `available` lists what is on disk, so a poisoned upload shows its marker.
fn incomplete_body(err: &BitdropError, total: u64, present: &[u64], poisoned: bool) -> Value {
    let mut available = Vec::with_capacity(present.len() + 1);
    let mut message = err.to_string();
    if poisoned {
        available.push(POISON_INDEX);
        message.push_str(": duplicate chunkIndex values were submitted");
    }
    available.extend_from_slice(present);
    json!({
        "message": message,
        "totalChunks": total,
        "available": available,
        "poisoned": poisoned,
    })
}

fn result_label<T>(result: &BitdropResult<T>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(e) => e.class().as_str(),
    }
}

// ── Bodies ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkBody {
    pub file_id: UploadId,
    pub chunk_index: i64,
    pub total_chunks: i64,
    pub encrypted_data: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteBody {
    pub file_id: UploadId,
    pub file_hash: String,
    pub email: String,
    pub filename: String,
    #[serde(default)]
    pub email_auth_token: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, rename = "unit_test")]
    pub unit_test: bool,
}

#[derive(Serialize)]
struct ReceiptBody<'a> {
    #[serde(rename = "fileId")]
    file_id: &'a UploadId,
    filename: &'a str,
    timestamp: &'a str,
    #[serde(rename = "MessageId")]
    message_id: Option<&'a str>,
    link: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl<'a> ReceiptBody<'a> {
    fn new(receipt: &'a FinalizeReceipt, message: Option<String>) -> Self {
        Self {
            file_id: &receipt.upload_id,
            filename: &receipt.filename,
            timestamp: &receipt.timestamp,
            message_id: receipt.delivery_id.as_deref(),
            link: &receipt.link,
            message,
        }
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────

async fn root() -> Json<&'static str> {
    Json("Welcome to BitDrop!")
}

async fn upload_chunk(
    State(state): State<AppState>,
    Json(body): Json<ChunkBody>,
) -> Result<impl IntoResponse, ApiError> {
    info!(
        upload_id = %body.file_id,
        index = body.chunk_index,
        total = body.total_chunks,
        "POST upload-chunk"
    );
    let result = state
        .services
        .receiver
        .receive(
            &body.file_id,
            body.chunk_index,
            body.total_chunks,
            &body.encrypted_data,
        )
        .await;
    state.metrics.chunk(result_label(&result));
    let staged = result?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Chunk uploaded successfully",
            "chunk_file": staged.path.display().to_string(),
        })),
    ))
}

async fn complete_upload(
    State(state): State<AppState>,
    Json(body): Json<CompleteBody>,
) -> Result<Response, ApiError> {
    let request = CompleteRequest {
        upload_id: body.file_id,
        content_hash: body.file_hash,
        recipient: body.email,
        filename: body.filename,
        auth_token: body.email_auth_token.map(SecretString::from),
        message: body.message,
        test_mode: body.unit_test,
    };

    let result = state.services.finalizer.complete(request).await;
    state.metrics.finalize(result_label(&result));
    let receipt = result?;

    Ok(Json(ReceiptBody::new(&receipt, None)).into_response())
}

async fn count_chunks(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Json<usize>, ApiError> {
    let file_id = parse_id(&file_id)?;
    Ok(Json(state.services.retriever.chunk_count(&file_id).await?))
}

async fn download_chunks(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let file_id = parse_id(&file_id)?;
    let set = state.services.retriever.fetch_all(&file_id).await?;
    Ok(Json(json!({
        "filename": set.filename,
        "fileHash": set.content_hash,
        "totalChunks": set.chunks.len(),
        "chunks": set.chunks,
    })))
}

async fn download_chunk(
    State(state): State<AppState>,
    Path((file_id, chunk_num)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let file_id = parse_id(&file_id)?;
    let chunk_num: u64 = chunk_num.parse().map_err(|_| {
        ApiError::NoSuchPath(format!("Chunk {chunk_num} unavailable or ambiguous"))
    })?;
    let chunk = state
        .services
        .retriever
        .fetch_chunk(&file_id, chunk_num)
        .await?;
    Ok(Json(json!({
        "filename": chunk.filename,
        "fileHash": chunk.content_hash,
        "totalChunks": chunk.total_chunks,
        "chunk": chunk.chunk,
    })))
}

async fn download_file(
    State(state): State<AppState>,
    Path((file_id, password)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let file_id = parse_id(&file_id)?;
    info!(upload_id = %file_id, "GET download/<password>");
    let outcome = state
        .services
        .decrypter
        .decrypt(&file_id, SecretString::from(password))
        .await?;
    let status = outcome.status();
    state.metrics.decrypt(status.as_str());

    let response = match outcome {
        DecryptionOutcome::Missing => (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": format!("No file matching {file_id} was found") })),
        )
            .into_response(),
        DecryptionOutcome::Duplicate { .. } => (
            StatusCode::CONFLICT,
            Json(json!({ "message": format!("The server has ambiguous {file_id} contents") })),
        )
            .into_response(),
        DecryptionOutcome::Assembled(file) if file.is_intact() => (
            StatusCode::OK,
            [
                (
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/octet-stream"),
                ),
                (
                    header::CONTENT_DISPOSITION,
                    content_disposition(&file.filename),
                ),
            ],
            file.plaintext,
        )
            .into_response(),
        DecryptionOutcome::Assembled(_) => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Decryption failed! (probably the wrong password)" })),
        )
            .into_response(),
    };
    Ok(response)
}

async fn delete_file(
    State(state): State<AppState>,
    Path((file_id, file_hash)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let file_id = parse_id(&file_id)?;
    info!(upload_id = %file_id, hash = %file_hash, "DELETE download");
    let result = state.services.deleter.delete(&file_id, &file_hash).await;
    state.metrics.deletion(result_label(&result));
    result?;

    Ok(Json(json!({
        "message": format!("File with ID {file_id} and hash {file_hash} deleted")
    })))
}

/// `attachment` disposition; non-ASCII names use the RFC 5987 form.
fn content_disposition(filename: &str) -> HeaderValue {
    let plain = filename
        .chars()
        .all(|c| c == ' ' || (c.is_ascii_graphic() && c != '"' && c != '\\'));
    let value = if plain {
        format!("attachment; filename=\"{filename}\"")
    } else {
        let mut encoded = String::new();
        for byte in filename.bytes() {
            if byte.is_ascii_alphanumeric() || b"-._~".contains(&byte) {
                encoded.push(byte as char);
            } else {
                encoded.push_str(&format!("%{byte:02X}"));
            }
        }
        format!("attachment; filename*=UTF-8''{encoded}")
    };
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}
