//!
//! HTTP handlers for the file API
//! ------------------------------
//! Maps `/api/v1/files` onto the file service: the bare collection endpoint
//! lists configured roots (or, for a single `/` root, that root's contents
//! directly), and the wildcard endpoint resolves one resource, listing it
//! when it is a folder and streaming it when it is a file.

use std::collections::HashMap;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use tokio_util::io::ReaderStream;

use crate::server::{ApiError, AppState, JSON_API_CONTENT_TYPE};

use super::query::{self, ListParams};
use super::{Descriptor, Root, TargetKind, API_BASE};

/// `GET /api/v1/files`: the collection endpoint. With a single `/` root the
/// synthetic root list is bypassed and the root's own contents are listed.
pub async fn list_collection(
    State(state): State<AppState>,
    Query(raw_params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let params = query::parse_list_params(&raw_params)?;

    if state.files.has_single_root_slash() {
        let entries = state.files.list_directory("/", "", &state.shutdown)?;
        return Ok(collection_json(API_BASE, entries, &params));
    }

    let roots = state.files.list_roots()?;
    Ok(collection_json(API_BASE, roots, &params))
}

/// `GET /api/v1/files/{*path}`: resolve one resource beneath a root.
pub async fn get_resource(
    State(state): State<AppState>,
    uri: Uri,
    Query(raw_params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let (root, rel, base_path) = parse_virtual_path(uri.path(), state.files.roots())?;

    let desc = state.files.describe(&root.virtual_name, &rel)?;

    if desc.target_kind == TargetKind::Folder {
        let params = query::parse_list_params(&raw_params)?;
        let entries = state
            .files
            .list_directory(&root.virtual_name, &rel, &state.shutdown)?;
        return Ok(collection_json(&base_path, entries, &params));
    }

    let download = raw_params.get("download").map(String::as_str) == Some("1");
    serve_file(&desc, download).await
}

fn collection_json(base_path: &str, mut entries: Vec<Descriptor>, params: &ListParams) -> Response {
    query::sort_descriptors(&mut entries, params.sort, params.descending);
    let resp = query::collection_response(base_path, &entries, params);
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, JSON_API_CONTENT_TYPE)],
        axum::Json(resp),
    )
        .into_response()
}

/// Stream the resolved target from disk without buffering the whole file.
/// `download` switches the disposition to attachment.
async fn serve_file(desc: &Descriptor, download: bool) -> Result<Response, ApiError> {
    let file = tokio::fs::File::open(&desc.absolute_path)
        .await
        .map_err(|e| io_api_error(&e))?;
    let length = file.metadata().await.ok().map(|m| m.len());

    let ctype = if desc.metadata.mime_type.is_empty() {
        "application/octet-stream"
    } else {
        desc.metadata.mime_type.as_str()
    };

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, ctype);
    if let Some(length) = length {
        builder = builder.header(header::CONTENT_LENGTH, length);
    }
    if download {
        builder = builder.header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", desc.metadata.name),
        );
    }

    builder
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| {
            tracing::error!("build file response: {e}");
            ApiError::internal()
        })
}

fn io_api_error(err: &std::io::Error) -> ApiError {
    match err.kind() {
        std::io::ErrorKind::NotFound => ApiError::not_found("file not found"),
        std::io::ErrorKind::PermissionDenied => {
            ApiError::new(StatusCode::FORBIDDEN, "permission denied")
        }
        _ => {
            tracing::error!("open file: {err}");
            ApiError::internal()
        }
    }
}

/// Split the raw (still percent-encoded) request path into the matched root,
/// the root-relative remainder and the decoded base path used for links.
fn parse_virtual_path(
    raw_path: &str,
    roots: &[Root],
) -> Result<(Root, String, String), ApiError> {
    let rest = raw_path
        .strip_prefix(API_BASE)
        .ok_or_else(|| ApiError::bad_request("invalid path"))?;

    if rest.is_empty() {
        return Err(ApiError::not_found("file path required"));
    }
    if rest.ends_with('/') {
        return Err(ApiError::not_found("trailing slash is not allowed"));
    }

    let rest = rest.strip_prefix('/').unwrap_or(rest);
    let decoded = urlencoding::decode(rest)
        .map_err(|e| ApiError::bad_request(format!("invalid path: {e}")))?;

    let path_with_slash = format!("/{decoded}");
    let (root, rel) = match_root(&path_with_slash, roots)
        .ok_or_else(|| ApiError::not_found("file root not found"))?;

    let base_path = format!("{API_BASE}{path_with_slash}");
    Ok((root, rel, base_path))
}

/// Longest virtual name wins; a `/` root matches every path.
fn match_root(request_path: &str, roots: &[Root]) -> Option<(Root, String)> {
    let mut sorted: Vec<&Root> = roots.iter().collect();
    sorted.sort_by(|a, b| b.virtual_name.len().cmp(&a.virtual_name.len()));

    for root in sorted {
        if root.virtual_name == "/" {
            let rel = request_path.strip_prefix('/').unwrap_or(request_path);
            return Some((root.clone(), rel.to_string()));
        }
        if request_path == root.virtual_name {
            return Some((root.clone(), String::new()));
        }
        let prefix = format!("{}/", root.virtual_name);
        if let Some(rel) = request_path.strip_prefix(prefix.as_str()) {
            return Some((root.clone(), rel.to_string()));
        }
    }

    None
}
