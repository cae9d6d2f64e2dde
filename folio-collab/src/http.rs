//! Request/response surface: document records, full syncs and single blocks.
//!
//! ```text
//!   POST   /super-objects                      create (idempotent per fileId)
//!   GET    /super-objects/{id}
//!   GET    /super-objects/by-file/{fileId}
//!   PATCH  /super-objects/{id}                 metadata only, never head/tail
//!   PUT    /super-objects/{id}/sync-blocks     full sync, latest wins
//!   GET    /super-objects/{id}/blocks          chain order
//!   POST   /content-blocks                     standalone block, not linked
//!   GET    /content-blocks/{id}
//!   PATCH  /content-blocks/{id}
//!   DELETE /content-blocks/{id}
//! ```
//!
//! Every error, a bad request body included, is `{"error": "..."}`.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use folio_core::{
    BlockInput, BlockPatch, ContentBlock, DocumentPatch, ErrorKind, NewDocument, SuperObject,
    SyncError, Synchronizer,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::gate::{GateOutcome, SyncGate};

#[derive(Clone)]
pub struct HttpState {
    pub synchronizer: Synchronizer,
    pub gate: Arc<SyncGate>,
}

impl HttpState {
    pub fn new(gate: Arc<SyncGate>) -> Self {
        Self {
            synchronizer: gate.synchronizer().clone(),
            gate,
        }
    }
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/super-objects", post(create_document))
        .route("/super-objects/by-file/{file_id}", get(document_by_file))
        .route(
            "/super-objects/{id}",
            get(get_document).patch(update_document),
        )
        .route("/super-objects/{id}/sync-blocks", put(sync_blocks))
        .route("/super-objects/{id}/blocks", get(document_blocks))
        .route("/content-blocks", post(create_block))
        .route(
            "/content-blocks/{id}",
            get(get_block).patch(update_block).delete(delete_block),
        )
        .with_state(state)
}

/// Error body `{"error": "..."}` with a status derived from the error kind.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    fn superseded(document_id: &str) -> Self {
        Self::new(
            StatusCode::CONFLICT,
            format!("sync for document {document_id} was superseded by a newer request"),
        )
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        let status = match err.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Malformed => StatusCode::BAD_REQUEST,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::ChainCycleDetected
            | ErrorKind::ChainBroken
            | ErrorKind::PersistenceFailure => {
                log::error!("Request failed: {err}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Body of `POST /content-blocks`: a block plus the document it is made for.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBlockRequest {
    #[serde(alias = "noteId")]
    pub document_id: String,
    #[serde(flatten)]
    pub block: BlockInput,
}

/// Decode a JSON body into an `ApiError`-shaped 400 rather than axum's
/// plain-text extractor rejection.
fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, format!("invalid request body: {e}")))
}

/// Run a store operation on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> folio_core::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(SyncError::persistence)?
        .map_err(ApiError::from)
}

pub async fn create_document(
    State(state): State<HttpState>,
    body: Bytes,
) -> ApiResult<SuperObject> {
    let request: NewDocument = parse_json(&body)?;
    let synchronizer = state.synchronizer;
    blocking(move || synchronizer.create_document(request)).await.map(Json)
}

pub async fn get_document(
    State(state): State<HttpState>,
    Path(id): Path<String>,
) -> ApiResult<SuperObject> {
    let synchronizer = state.synchronizer;
    blocking(move || synchronizer.get_document(&id)).await.map(Json)
}

pub async fn document_by_file(
    State(state): State<HttpState>,
    Path(file_id): Path<i64>,
) -> ApiResult<SuperObject> {
    let synchronizer = state.synchronizer;
    let found = blocking(move || synchronizer.document_by_file_id(file_id)).await?;
    found
        .map(Json)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, format!("No document for file {file_id}")))
}

pub async fn update_document(
    State(state): State<HttpState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<SuperObject> {
    let patch: DocumentPatch = parse_json(&body)?;
    let synchronizer = state.synchronizer;
    blocking(move || synchronizer.update_metadata(&id, patch)).await.map(Json)
}

/// Body is parsed here rather than by `Json` so a bad entry is a plain 400.
pub async fn sync_blocks(
    State(state): State<HttpState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<SuperObject> {
    let incoming = BlockInput::parse_list(&body)?;
    match state.gate.submit(&id, incoming).await? {
        GateOutcome::Applied(doc) => Ok(Json(doc)),
        GateOutcome::Superseded => Err(ApiError::superseded(&id)),
    }
}

pub async fn document_blocks(
    State(state): State<HttpState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<ContentBlock>> {
    let synchronizer = state.synchronizer;
    blocking(move || synchronizer.blocks_for_document(&id)).await.map(Json)
}

pub async fn create_block(
    State(state): State<HttpState>,
    body: Bytes,
) -> ApiResult<ContentBlock> {
    let request: NewBlockRequest = parse_json(&body)?;
    let synchronizer = state.synchronizer;
    blocking(move || synchronizer.create_block(&request.document_id, request.block))
        .await
        .map(Json)
}

pub async fn get_block(
    State(state): State<HttpState>,
    Path(id): Path<String>,
) -> ApiResult<ContentBlock> {
    let synchronizer = state.synchronizer;
    blocking(move || synchronizer.get_block(&id)).await.map(Json)
}

pub async fn update_block(
    State(state): State<HttpState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<ContentBlock> {
    let patch: BlockPatch = parse_json(&body)?;
    let synchronizer = state.synchronizer;
    blocking(move || synchronizer.update_block(&id, patch)).await.map(Json)
}

pub async fn delete_block(
    State(state): State<HttpState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let synchronizer = state.synchronizer;
    blocking(move || synchronizer.delete_block(&id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
