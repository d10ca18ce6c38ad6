//! Request handlers. Every branch route resolves its branch through
//! [`AppState::branch`], so unknown or uninitialized branches answer 404.

use std::convert::Infallible;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio_stream::StreamExt;
use tracing::{info, warn};

use arbor_branch::{FilePatch, MergeResult, NewBranch, TransactionResult};
use arbor_directory::{validate_branch_name, BranchRecord, CatalogError};
use arbor_tree::{DiffEntry, MergeStrategy};
use arbor_types::{BlobHash, BlobInfo, FileMetadata, Tree, UserMetadata};
use arbor_watch::{WatchOptions, LAGGED_SSE_FRAME};

use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

/// Tree paths are absolute; the wildcard capture drops the leading `/`.
fn file_path(captured: &str) -> String {
    format!("/{}", captured.trim_start_matches('/'))
}

fn octet_stream(content: Bytes) -> Response {
    ([(header::CONTENT_TYPE, "application/octet-stream")], content).into_response()
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "name": "arbor",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ---- Branch directory ----

#[derive(Debug, Default, Deserialize)]
pub struct PrefixQuery {
    pub prefix: Option<String>,
}

pub async fn list_branches(
    State(state): State<AppState>,
    Query(query): Query<PrefixQuery>,
) -> ServerResult<Json<Vec<BranchRecord>>> {
    Ok(Json(state.catalog.list_branches(query.prefix.as_deref())?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBranchRequest {
    pub project_id: String,
    pub branch_name: Option<String>,
    pub origin: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

pub async fn create_branch(
    State(state): State<AppState>,
    Json(request): Json<CreateBranchRequest>,
) -> ServerResult<(StatusCode, Json<BranchRecord>)> {
    let name = request
        .branch_name
        .unwrap_or_else(|| state.namespace.config().default_branch.clone());
    validate_branch_name(&name)?;
    if let Some(origin) = &request.origin {
        validate_branch_name(origin)?;
    }
    if state.catalog.contains(&name)? {
        return Err(CatalogError::AlreadyExists { name }.into());
    }

    let mut open = NewBranch::new(request.project_id).named(&name);
    if let Some(origin) = &request.origin {
        open = open.with_origin(origin);
    }
    state.namespace.open(open).await?;

    let mut record = BranchRecord::new(&name).with_metadata(request.metadata);
    record.origin_branch = request.origin;
    let record = state.catalog.create_branch(record)?;
    info!(branch = %name, "branch created");
    Ok((StatusCode::CREATED, Json(record)))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchSummary {
    pub name: String,
    pub project_id: String,
    pub origin: Option<String>,
    pub seq: u64,
    pub timestamp: u64,
    pub file_count: usize,
    pub watchers: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<BranchRecord>,
}

pub async fn get_branch(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ServerResult<Json<BranchSummary>> {
    let branch = state.branch(&name).await?;
    let current = branch
        .state()
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("branch {name}")))?;
    Ok(Json(BranchSummary {
        file_count: current.tree.len(),
        watchers: branch.watcher_count(),
        record: state.catalog.get_branch(&name)?,
        name: current.name,
        project_id: current.project_id,
        origin: current.origin,
        seq: current.seq,
        timestamp: current.timestamp,
    }))
}

/// Soft delete: the tree is emptied and the directory record removed, but
/// the branch keeps its history and lineage.
pub async fn delete_branch(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ServerResult<Json<Value>> {
    let branch = state.branch(&name).await?;
    let removed = branch.soft_delete().await?;
    let unlisted = state.catalog.delete_branch(&name)?;
    Ok(Json(json!({ "removed": removed, "unlisted": unlisted })))
}

// ---- Files ----

pub async fn list_files(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<PrefixQuery>,
) -> ServerResult<Json<Tree>> {
    let branch = state.branch(&name).await?;
    Ok(Json(branch.list_files(query.prefix.as_deref()).await?))
}

pub async fn read_file(
    State(state): State<AppState>,
    Path((name, path)): Path<(String, String)>,
) -> ServerResult<Response> {
    let path = file_path(&path);
    let branch = state.branch(&name).await?;
    match branch.get_file(&path).await? {
        Some(content) => Ok(octet_stream(content)),
        None => Err(ServerError::NotFound(format!("file {path}"))),
    }
}

pub async fn file_metadata(
    State(state): State<AppState>,
    Path((name, path)): Path<(String, String)>,
) -> ServerResult<Json<FileMetadata>> {
    let path = file_path(&path);
    let branch = state.branch(&name).await?;
    branch
        .get_file_metadata(&path)
        .await?
        .map(Json)
        .ok_or_else(|| ServerError::NotFound(format!("file {path}")))
}

pub async fn write_file(
    State(state): State<AppState>,
    Path((name, path)): Path<(String, String)>,
    body: Bytes,
) -> ServerResult<Json<FileMetadata>> {
    let path = file_path(&path);
    let branch = state.branch(&name).await?;
    Ok(Json(branch.write_file(&path, body, None).await?))
}

pub async fn delete_file(
    State(state): State<AppState>,
    Path((name, path)): Path<(String, String)>,
) -> ServerResult<Json<Value>> {
    let path = file_path(&path);
    let branch = state.branch(&name).await?;
    let deleted = branch.delete_file(&path).await?;
    Ok(Json(json!({ "deleted": deleted })))
}

// ---- Transactions ----

/// One write (`content` set) or delete (`content: null`) on the wire.
/// Content travels as UTF-8 text.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchRequest {
    pub path: String,
    pub content: Option<String>,
    pub metadata: Option<UserMetadata>,
    pub expected_ctime: Option<u64>,
    pub mtime: Option<u64>,
}

impl From<PatchRequest> for FilePatch {
    fn from(patch: PatchRequest) -> Self {
        FilePatch {
            path: patch.path,
            content: patch.content.map(Bytes::from),
            metadata: patch.metadata,
            expected_ctime: patch.expected_ctime,
            mtime: patch.mtime,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TransactionRequest {
    pub patches: Vec<PatchRequest>,
    #[serde(default)]
    pub force: bool,
}

pub async fn transaction(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<TransactionRequest>,
) -> ServerResult<Json<TransactionResult>> {
    let branch = state.branch(&name).await?;
    let patches = request.patches.into_iter().map(FilePatch::from).collect();
    Ok(Json(branch.transactional_write(patches, request.force).await?))
}

// ---- Lineage, diff and merge ----

#[derive(Debug, Deserialize)]
pub struct DiffQuery {
    pub other: String,
}

pub async fn diff(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<DiffQuery>,
) -> ServerResult<Json<Vec<DiffEntry>>> {
    validate_branch_name(&query.other)?;
    let branch = state.branch(&name).await?;
    Ok(Json(branch.diff(&query.other).await?))
}

#[derive(Debug, Deserialize)]
pub struct MergeRequest {
    pub source: String,
    #[serde(default)]
    pub strategy: MergeStrategy,
}

pub async fn merge(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<MergeRequest>,
) -> ServerResult<Json<MergeResult>> {
    validate_branch_name(&request.source)?;
    let branch = state.branch(&name).await?;
    Ok(Json(branch.merge(&request.source, request.strategy).await?))
}

#[derive(Debug, Deserialize)]
pub struct ForkRequest {
    pub name: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

pub async fn fork(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<ForkRequest>,
) -> ServerResult<(StatusCode, Json<BranchRecord>)> {
    validate_branch_name(&request.name)?;
    let branch = state.branch(&name).await?;
    if state.catalog.contains(&request.name)? || state.namespace.exists(&request.name).await? {
        return Err(CatalogError::AlreadyExists { name: request.name }.into());
    }

    branch.branch(&request.name).await?;
    let record = state.catalog.create_branch(
        BranchRecord::new(&request.name)
            .with_origin(&name)
            .with_metadata(request.metadata),
    )?;
    Ok((StatusCode::CREATED, Json(record)))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OriginBody {
    pub origin: Option<String>,
}

pub async fn get_origin(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ServerResult<Json<OriginBody>> {
    let branch = state.branch(&name).await?;
    Ok(Json(OriginBody {
        origin: branch.get_origin().await?,
    }))
}

pub async fn set_origin(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<OriginBody>,
) -> ServerResult<Json<OriginBody>> {
    if let Some(origin) = &body.origin {
        validate_branch_name(origin)?;
    }
    let branch = state.branch(&name).await?;
    branch.set_origin(body.origin.clone()).await?;
    Ok(Json(body))
}

// ---- Watch ----

/// Stream change events as `text/event-stream`. The stream ends when the
/// client disconnects, which drops the subscription.
pub async fn watch(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(options): Query<WatchOptions>,
) -> ServerResult<Response> {
    let branch = state.branch(&name).await?;
    let subscription = branch.watch(options).await?;
    let lag = subscription.lag_signal();

    let frames = subscription
        .filter_map(|event| match event.to_sse_frame() {
            Ok(frame) => Some(Ok::<_, Infallible>(frame)),
            Err(e) => {
                warn!(path = %event.path, error = %e, "unencodable change event");
                None
            }
        })
        // Checked once the event stream has ended.
        .chain(tokio_stream::iter([()]).filter_map(move |()| {
            lag.is_lagged().then(|| Ok(LAGGED_SSE_FRAME.to_string()))
        }));

    Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(frames))
        .map_err(|e| ServerError::Internal(e.to_string()))
}

// ---- Blobs ----

pub async fn put_blob(
    State(state): State<AppState>,
    Path(project): Path<String>,
    body: Bytes,
) -> ServerResult<(StatusCode, Json<BlobInfo>)> {
    let store = state.namespace.blobs().for_project(&project);
    Ok((StatusCode::CREATED, Json(store.put(body).await?)))
}

#[derive(Debug, Deserialize)]
pub struct BlobBatch {
    pub contents: Vec<String>,
}

pub async fn put_blob_batch(
    State(state): State<AppState>,
    Path(project): Path<String>,
    Json(batch): Json<BlobBatch>,
) -> ServerResult<Json<Vec<BlobInfo>>> {
    let store = state.namespace.blobs().for_project(&project);
    let items = batch.contents.into_iter().map(Bytes::from).collect();
    Ok(Json(store.put_batch(items).await?))
}

fn parse_hash(hash: &str) -> ServerResult<BlobHash> {
    BlobHash::from_hex(hash).map_err(|e| ServerError::BadRequest(e.to_string()))
}

pub async fn get_blob(
    State(state): State<AppState>,
    Path((project, hash)): Path<(String, String)>,
) -> ServerResult<Response> {
    let hash = parse_hash(&hash)?;
    let content = match state.namespace.blobs().existing(&project) {
        Some(store) => store.get(&hash).await?,
        None => None,
    };
    match content {
        Some(content) => Ok(octet_stream(content)),
        None => Err(ServerError::NotFound(format!("blob {hash}"))),
    }
}

pub async fn blob_info(
    State(state): State<AppState>,
    Path((project, hash)): Path<(String, String)>,
) -> ServerResult<Json<Value>> {
    let hash = parse_hash(&hash)?;
    let info = match state.namespace.blobs().existing(&project) {
        Some(store) => store.get_info(&hash).await?,
        None => None,
    };
    Ok(Json(json!({ "exists": info.is_some(), "info": info })))
}
