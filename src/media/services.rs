use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, warn};
use uuid::Uuid;

use super::storage::ObjectStorage;
use crate::error::{AppError, AppResult};

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

/// Upload an image owned by a cause or product and return its object key.
/// The caller records the key and discards whatever it replaced.
pub async fn upload_image(
    storage: &dyn ObjectStorage,
    owner_kind: &str,
    owner_id: &str,
    body: Bytes,
    content_type: &str,
) -> AppResult<String> {
    if body.is_empty() {
        return Err(AppError::validation("image body is empty"));
    }
    if body.len() > MAX_IMAGE_BYTES {
        return Err(AppError::validation(format!(
            "image exceeds {MAX_IMAGE_BYTES} bytes"
        )));
    }
    let ext = ext_from_mime(content_type)
        .ok_or_else(|| AppError::validation(format!("unsupported image type {content_type:?}")))?;

    let key = format!("{owner_kind}/{owner_id}/{}.{ext}", Uuid::new_v4());
    storage
        .put_object(&key, body, content_type)
        .await
        .map_err(AppError::remote)?;
    debug!(%key, "image stored");
    Ok(key)
}

/// Best-effort removal of an object no record points at any more.
pub async fn discard_image(storage: &dyn ObjectStorage, key: &str) {
    if let Err(e) = storage.delete_object(key).await {
        warn!(error = %e, key, "failed to delete image");
    }
}

pub async fn image_url(storage: &dyn ObjectStorage, key: &str, ttl: Duration) -> AppResult<String> {
    storage.presign_get(key, ttl).await.map_err(AppError::remote)
}
