//!
//! Ping endpoint
//! -------------
//! Fixed JSON:API health document; useful as a liveness probe and as the
//! smallest example of the envelope conventions the file API follows.

use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use serde::Serialize;

use crate::server::JSON_API_CONTENT_TYPE;

const PING_PATH: &str = "/api/v1/ping";

#[derive(Debug, Serialize)]
pub struct Response {
    pub meta: PaginationMeta,
    pub links: PaginationLinks,
    pub data: Resource,
}

#[derive(Debug, Serialize)]
pub struct PaginationMeta {
    pub page: PageInfo,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub current_page: u32,
    pub from: u32,
    pub last_page: u32,
    pub per_page: u32,
    pub to: u32,
    pub total: u32,
}

#[derive(Debug, Serialize)]
pub struct PaginationLinks {
    #[serde(rename = "self")]
    pub self_link: String,
    pub first: String,
    pub last: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Resource {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub id: String,
    pub attributes: Attributes,
}

#[derive(Debug, Serialize)]
pub struct Attributes {
    pub message: String,
}

fn payload() -> Response {
    Response {
        meta: PaginationMeta {
            page: PageInfo {
                current_page: 1,
                from: 1,
                last_page: 1,
                per_page: 1,
                to: 1,
                total: 1,
            },
        },
        links: PaginationLinks {
            self_link: PING_PATH.to_string(),
            first: PING_PATH.to_string(),
            last: PING_PATH.to_string(),
            next: None,
            prev: None,
        },
        data: Resource {
            resource_type: "ping".to_string(),
            id: "ping".to_string(),
            attributes: Attributes {
                message: "pong".to_string(),
            },
        },
    }
}

pub async fn handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, JSON_API_CONTENT_TYPE)],
        axum::Json(payload()),
    )
}
