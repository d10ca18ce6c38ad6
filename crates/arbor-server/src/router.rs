use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handler;
use crate::state::AppState;

/// Build the axum router with every Arbor endpoint.
///
/// Branch names travel as a single path segment; names containing `/` must
/// be percent-encoded (`feature%2Fauth`).
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/health", get(handler::health))
        .route(
            "/v1/branches",
            get(handler::list_branches).post(handler::create_branch),
        )
        .route(
            "/v1/branches/:branch",
            get(handler::get_branch).delete(handler::delete_branch),
        )
        .route("/v1/branches/:branch/files", get(handler::list_files))
        .route(
            "/v1/branches/:branch/files/*path",
            get(handler::read_file)
                .put(handler::write_file)
                .delete(handler::delete_file),
        )
        .route("/v1/branches/:branch/metadata/*path", get(handler::file_metadata))
        .route("/v1/branches/:branch/transaction", post(handler::transaction))
        .route("/v1/branches/:branch/diff", get(handler::diff))
        .route("/v1/branches/:branch/merge", post(handler::merge))
        .route("/v1/branches/:branch/fork", post(handler::fork))
        .route(
            "/v1/branches/:branch/origin",
            get(handler::get_origin).put(handler::set_origin),
        )
        .route("/v1/branches/:branch/watch", get(handler::watch))
        .route("/v1/projects/:project/blobs", post(handler::put_blob))
        .route("/v1/projects/:project/blobs/batch", post(handler::put_blob_batch))
        .route("/v1/projects/:project/blobs/:hash", get(handler::get_blob))
        .route("/v1/projects/:project/blobs/:hash/info", get(handler::blob_info))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
