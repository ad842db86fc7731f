use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handler;
use crate::state::SharedState;

pub const V0_SERVICE: &str = "/ocfl.v0.IndexService";
pub const V1_SERVICE: &str = "/ocfl.v1.IndexService";

/// Build the axum router with every endpoint of both API versions.
pub fn build_router(state: SharedState) -> Router {
    let v0 = Router::new()
        .route("/GetSummary", post(handler::get_summary))
        .route("/ListObjects", post(handler::list_objects))
        .route("/GetObject", post(handler::get_object))
        .route("/GetObjectState", post(handler::get_object_state))
        .route("/GetContent", post(handler::get_content));

    let v1 = Router::new()
        .route("/GetStatus", post(handler::get_status))
        .route("/IndexAll", post(handler::index_all))
        .route("/IndexIDs", post(handler::index_ids))
        .route("/ListObjects", post(handler::list_objects))
        .route("/GetObject", post(handler::get_object))
        .route("/GetObjectState", post(handler::get_object_state))
        .route("/FollowLogs", post(handler::follow_logs))
        .route("/GetContent", post(handler::get_content));

    Router::new()
        .route("/health", get(handler::health))
        .route("/info", get(handler::info))
        .route("/download/:digest", get(handler::download))
        .route("/download/:digest/:name", get(handler::download_named))
        .nest(V0_SERVICE, v0)
        .nest(V1_SERVICE, v1)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
