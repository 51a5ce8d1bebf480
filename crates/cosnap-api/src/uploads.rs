use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{error, info};

use cosnap_types::api::UploadResponse;

use crate::error::ApiError;
use crate::state::AppState;

/// 5 MB limit for images
pub const MAX_IMAGE_SIZE: usize = 5 * 1024 * 1024;

/// Body limit for the upload route. Slightly above [`MAX_IMAGE_SIZE`] so
/// oversized images reach the handler and get a JSON 413.
pub const UPLOAD_BODY_LIMIT: usize = MAX_IMAGE_SIZE + 64 * 1024;

const IMAGE_TYPES: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
];

fn extension_for(content_type: &str) -> Option<&'static str> {
    let essence = content_type.split(';').next().unwrap_or("").trim();
    IMAGE_TYPES
        .iter()
        .find(|(mime, _)| mime.eq_ignore_ascii_case(essence))
        .map(|(_, ext)| *ext)
}

fn content_type_for(name: &str) -> Option<&'static str> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.len() != 64 || !stem.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    IMAGE_TYPES
        .iter()
        .find(|(_, e)| *e == ext)
        .map(|(mime, _)| *mime)
}

/// POST /uploads — raw image bytes with an image Content-Type. Files are
/// named by their SHA-256, so identical uploads share one file.
pub async fn upload_image(
    State(state): State<AppState>,
    headers: HeaderMap,
    bytes: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let ext = extension_for(content_type)
        .ok_or_else(|| ApiError::UnsupportedMediaType(content_type.to_string()))?;

    if bytes.is_empty() {
        return Err(ApiError::BadRequest("empty upload".into()));
    }
    if bytes.len() > MAX_IMAGE_SIZE {
        return Err(ApiError::PayloadTooLarge(MAX_IMAGE_SIZE));
    }

    let name = format!("{}.{}", hex::encode(Sha256::digest(&bytes)), ext);

    tokio::fs::create_dir_all(&state.upload_dir).await.map_err(|e| {
        error!("Failed to create upload directory: {}", e);
        ApiError::Internal(e.into())
    })?;

    let path = state.upload_dir.join(&name);
    let mut file = tokio::fs::File::create(&path).await.map_err(|e| {
        error!("Failed to create file {}: {}", path.display(), e);
        ApiError::Internal(e.into())
    })?;
    file.write_all(&bytes).await.map_err(|e| {
        error!("Failed to write file {}: {}", path.display(), e);
        ApiError::Internal(e.into())
    })?;

    info!("Stored upload {} ({} bytes)", name, bytes.len());

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            url: format!("{}/uploads/{}", state.public_url, name),
            size: bytes.len() as u64,
        }),
    ))
}

/// GET /uploads/{name}
pub async fn serve_image(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    // Only names we generated; rules out path traversal.
    let content_type = content_type_for(&name).ok_or_else(|| ApiError::NotFound(format!("upload {name}")))?;

    let bytes = tokio::fs::read(state.upload_dir.join(&name))
        .await
        .map_err(|_| ApiError::NotFound(format!("upload {name}")))?;

    Ok(([(header::CONTENT_TYPE, content_type)], bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_images_are_accepted() {
        assert_eq!(extension_for("image/png"), Some("png"));
        assert_eq!(extension_for("image/JPEG; charset=binary"), Some("jpg"));
        assert_eq!(extension_for("application/pdf"), None);
        assert_eq!(extension_for(""), None);
    }

    #[test]
    fn served_names_must_look_generated() {
        let good = format!("{}.webp", "a".repeat(64));
        assert_eq!(content_type_for(&good), Some("image/webp"));
        assert_eq!(content_type_for("../secret.png"), None);
        assert_eq!(content_type_for(&format!("{}.exe", "a".repeat(64))), None);
        assert_eq!(content_type_for("abc.png"), None);
    }
}
