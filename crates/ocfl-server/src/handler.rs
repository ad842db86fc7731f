//! Request handlers. Both API versions share the engine; the methods they
//! have in common share a handler.

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::stream;
use serde_json::json;
use tracing::{debug, info};

use crate::error::{ServerError, ServerResult};
use crate::messages::{
    decode, Empty, GetContentRequest, GetObjectRequest, GetObjectResponse, GetObjectStateRequest,
    GetObjectStateResponse, GetStatusResponse, GetSummaryResponse, IdResultItem, IndexAllResponse,
    IndexIdsRequest, IndexIdsResponse, ListObjectsRequest, ListObjectsResponse, LogEntryItem,
};
use crate::state::SharedState;

/// Health check handler.
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Info handler.
pub async fn info(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({
        "name": "ocfl-index",
        "version": env!("CARGO_PKG_VERSION"),
        "rootPath": state.root_path,
        "apiVersions": ["ocfl.v0", "ocfl.v1"],
    }))
}

pub async fn get_summary(State(state): State<SharedState>, body: Bytes) -> ServerResult<Json<GetSummaryResponse>> {
    let _: Empty = decode(&body)?;
    Ok(Json(state.query.summary()?.into()))
}

pub async fn get_status(State(state): State<SharedState>, body: Bytes) -> ServerResult<Json<GetStatusResponse>> {
    let _: Empty = decode(&body)?;
    Ok(Json(state.query.status(state.jobs.status())?.into()))
}

pub async fn list_objects(
    State(state): State<SharedState>,
    body: Bytes,
) -> ServerResult<Json<ListObjectsResponse>> {
    let rq: ListObjectsRequest = decode(&body)?;
    let sort = rq.order_by.unwrap_or_default().to_sort()?;
    let page = state.query.list_objects(sort, &rq.page_token, rq.page_size)?;
    Ok(Json(ListObjectsResponse {
        objects: page.items.into_iter().map(Into::into).collect(),
        next_page_token: page.next_cursor.unwrap_or_default(),
    }))
}

pub async fn get_object(
    State(state): State<SharedState>,
    body: Bytes,
) -> ServerResult<Json<GetObjectResponse>> {
    let rq: GetObjectRequest = decode(&body)?;
    let object = state.query.get_object(&rq.object_id)?;
    Ok(Json(GetObjectResponse::from(object.as_ref())))
}

pub async fn get_object_state(
    State(state): State<SharedState>,
    body: Bytes,
) -> ServerResult<Json<GetObjectStateResponse>> {
    let rq: GetObjectStateRequest = decode(&body)?;
    let page = state.query.get_object_state(&rq.into())?;
    Ok(Json(page.into()))
}

/// Stream content bytes for a digest as the raw response body.
pub async fn get_content(State(state): State<SharedState>, body: Bytes) -> ServerResult<Response> {
    let rq: GetContentRequest = decode(&body)?;
    let content = state.content.open(&rq.digest).await?;
    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        Body::from_stream(content.chunks),
    )
        .into_response())
}

pub async fn index_all(State(state): State<SharedState>, body: Bytes) -> ServerResult<Json<IndexAllResponse>> {
    let _: Empty = decode(&body)?;
    let trigger = state.jobs.start_index_all()?;
    info!(job_id = %trigger.job.id, started = trigger.started, "index all requested");
    Ok(Json(IndexAllResponse {
        started: trigger.started,
        job: trigger.job.into(),
    }))
}

pub async fn index_ids(State(state): State<SharedState>, body: Bytes) -> ServerResult<Json<IndexIdsResponse>> {
    let rq: IndexIdsRequest = decode(&body)?;
    let results = state.jobs.index_ids(rq.object_ids).await?;
    Ok(Json(IndexIdsResponse {
        results: results.into_iter().map(IdResultItem::from).collect(),
    }))
}

/// Stream job log entries as newline-delimited JSON until the client goes
/// away or the server shuts down.
pub async fn follow_logs(State(state): State<SharedState>, body: Bytes) -> ServerResult<Response> {
    let _: Empty = decode(&body)?;
    let subscription = state.jobs.subscribe_logs()?;
    let shutdown = state.shutdown.clone();
    debug!("log follower connected");

    let lines = stream::unfold((subscription, shutdown), |(mut sub, shutdown)| async move {
        let entry = tokio::select! {
            _ = shutdown.cancelled() => None,
            entry = sub.next() => entry,
        }?;
        let mut line = match serde_json::to_vec(&LogEntryItem::from(entry)) {
            Ok(line) => line,
            Err(e) => return Some((Err(std::io::Error::other(e)), (sub, shutdown))),
        };
        line.push(b'\n');
        Some((Ok(Bytes::from(line)), (sub, shutdown)))
    });
    Ok((
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(lines),
    )
        .into_response())
}

pub async fn download(
    State(state): State<SharedState>,
    Path(digest): Path<String>,
) -> ServerResult<Response> {
    let name = digest.clone();
    send_attachment(state, digest, name).await
}

pub async fn download_named(
    State(state): State<SharedState>,
    Path((digest, name)): Path<(String, String)>,
) -> ServerResult<Response> {
    send_attachment(state, digest, name).await
}

async fn send_attachment(state: SharedState, digest: String, name: String) -> ServerResult<Response> {
    let content = state.content.open(&digest).await?;
    let name: String = name
        .chars()
        .filter(|c| !c.is_control() && *c != '"' && *c != '\\')
        .collect();
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{name}\""))
        .map_err(|e| ServerError::InvalidArgument(format!("invalid file name: {e}")))?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(content.chunks),
    )
        .into_response())
}
