use std::time::Duration;

use axum::{
    body::Bytes,
    extract::Path,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::IntoResponse,
    routing::{any, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

/// What `/echo` saw of a request.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Echo {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub content_type: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub id: i64,
    pub name: String,
}

/// Summary returned by `/upload`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UploadReceipt {
    pub size: usize,
    pub content_type: Option<String>,
    pub body: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StatusMessage {
    pub code: u16,
    pub message: String,
}

pub fn app() -> Router {
    Router::new()
        .route("/echo", any(echo))
        .route("/items", get(items))
        .route("/status/{code}", any(status))
        .route("/text-error", any(text_error))
        .route("/upload", post(upload).put(upload).patch(upload))
        .route("/download/{size}", get(download))
        .route("/slow/{millis}", get(slow))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Json<Echo> {
    Json(Echo {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        content_type: content_type(&headers),
        headers: headers
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect(),
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

/// Two well-formed items and one that does not match `Item`.
async fn items() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "items": [
            {"id": 1, "name": "one"},
            {"id": 2, "name": "two"},
            {"bad": true}
        ],
        "total": 3
    }))
}

async fn status(Path(code): Path<u16>) -> Result<(StatusCode, Json<StatusMessage>), StatusCode> {
    let status = StatusCode::from_u16(code).map_err(|_| StatusCode::BAD_REQUEST)?;
    let message = status.canonical_reason().unwrap_or("unknown").to_string();
    Ok((status, Json(StatusMessage { code, message })))
}

async fn text_error() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "internal failure")
}

async fn upload(headers: HeaderMap, body: Bytes) -> (StatusCode, Json<UploadReceipt>) {
    let receipt = UploadReceipt {
        size: body.len(),
        content_type: content_type(&headers),
        body: String::from_utf8_lossy(&body).into_owned(),
    };
    (StatusCode::CREATED, Json(receipt))
}

/// `size` bytes cycling through `0..=255`.
async fn download(Path(size): Path<usize>) -> impl IntoResponse {
    let body: Vec<u8> = (0..size).map(|i| (i % 256) as u8).collect();
    ([(header::CONTENT_TYPE, "application/octet-stream")], body)
}

async fn slow(Path(millis): Path<u64>) -> &'static str {
    tokio::time::sleep(Duration::from_millis(millis)).await;
    "done"
}
