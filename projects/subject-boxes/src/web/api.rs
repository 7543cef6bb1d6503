use crate::jobs::Job;
use crate::pipeline::types::Thresholds;
use crate::storage::{sanitize_filename, StoredFile};
use crate::video::processor::DetectionMode;
use crate::video::MediaKind;
use crate::web::form::result_page;
use crate::web::server::AppState;
use axum::{
    body::{Body, Bytes},
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{Html, Response},
    Json,
};
use std::fmt::Display;
use std::io::ErrorKind;
use std::sync::Arc;

type HandlerError = (StatusCode, String);

fn bad_request(e: impl Display) -> HandlerError {
    (StatusCode::BAD_REQUEST, e.to_string())
}

fn internal(e: impl Display) -> HandlerError {
    tracing::error!("Request failed: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Processing failed".to_string(),
    )
}

fn parse_threshold(text: &str, default: f32) -> Result<f32, HandlerError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(default);
    }
    text.parse()
        .map_err(|_| bad_request(format!("Invalid threshold: {}", text)))
}

fn parse_kind(text: &str) -> Result<MediaKind, HandlerError> {
    match text.trim().to_lowercase().as_str() {
        "image" => Ok(MediaKind::Image),
        "video" => Ok(MediaKind::Video),
        other => Err(bad_request(format!("Unknown file type: {}", other))),
    }
}

/// Store the uploaded file, annotate it and answer with a page linking the
/// result.
pub async fn upload_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Html<String>, HandlerError> {
    let mut upload: Option<(String, Bytes)> = None;
    let mut kind: Option<MediaKind> = None;
    let mut subject = state.defaults.subject;
    let mut region = state.defaults.region;

    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await.map_err(bad_request)?;
                upload = Some((file_name, data));
            }
            "file_type" => kind = Some(parse_kind(&field.text().await.map_err(bad_request)?)?),
            "threshold_subject" => {
                subject = parse_threshold(&field.text().await.map_err(bad_request)?, subject)?
            }
            "threshold_region" => {
                region = parse_threshold(&field.text().await.map_err(bad_request)?, region)?
            }
            other => tracing::debug!("Ignoring form field {}", other),
        }
    }

    let (raw_name, data) = upload
        .filter(|(name, data)| !name.is_empty() && !data.is_empty())
        .ok_or_else(|| bad_request("No file uploaded"))?;
    let name = sanitize_filename(&raw_name)
        .ok_or_else(|| bad_request(format!("Unusable file name: {}", raw_name)))?;
    let thresholds = Thresholds::new(subject, region).map_err(bad_request)?;
    let kind = kind.unwrap_or_else(|| MediaKind::from_path(std::path::Path::new(&name)));

    for dir in [state.layout.input_dir(), state.layout.output_dir()] {
        tokio::fs::create_dir_all(&dir).await.map_err(internal)?;
    }
    let input = state.layout.input_path(&name);
    tokio::fs::write(&input, &data).await.map_err(internal)?;
    tracing::info!(
        "Stored upload {} ({} bytes) as {:?}",
        input.display(),
        data.len(),
        kind
    );

    let stats = state
        .jobs
        .submit(Job {
            input,
            output: state.layout.output_path(&name),
            kind,
            thresholds,
            mode: DetectionMode::Full,
        })
        .await
        .map_err(internal)?;

    Ok(Html(result_page(&name, kind, &stats)))
}

/// Serve an annotated result. Files may vanish at any time through the
/// reaper; a missing file is a plain 404.
pub async fn download_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Response, StatusCode> {
    let name = sanitize_filename(&name).ok_or(StatusCode::NOT_FOUND)?;
    let path = state.layout.output_path(&name);

    let bytes = match tokio::fs::read(&path).await {
        Ok(b) => b,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!("Requested file {} does not exist", path.display());
            return Err(StatusCode::NOT_FOUND);
        }
        Err(e) => {
            tracing::warn!("Failed to read {}: {}", path.display(), e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let mime = mime_guess::from_path(&path).first_or_octet_stream();
    Response::builder()
        .header(header::CONTENT_TYPE, mime.as_ref())
        .body(Body::from(bytes))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

pub async fn list_processed_handler(State(state): State<Arc<AppState>>) -> Json<Vec<StoredFile>> {
    Json(state.layout.list_processed())
}
