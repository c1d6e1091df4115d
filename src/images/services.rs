use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use super::multipart::UploadedFile;
use crate::error::AppError;
use crate::state::AppState;

/// Where an uploaded image ended up. `public_id` is the storage key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredImage {
    pub url: String,
    pub public_id: String,
}

/// Stores an image under `<folder>/<uuid>.<ext>`. Non-image uploads are
/// rejected with 400.
pub async fn upload_image(
    st: &AppState,
    folder: &str,
    file: &UploadedFile,
) -> Result<StoredImage, AppError> {
    let ext = ext_from_mime(&file.content_type).ok_or_else(|| {
        AppError::bad_request(format!("Unsupported image type: {}", file.content_type))
    })?;
    let key = format!("{}/{}.{}", folder, Uuid::new_v4(), ext);
    st.storage
        .put_object(&key, file.body.clone(), &file.content_type)
        .await
        .with_context(|| format!("put_object {}", key))
        .map_err(|e| AppError::Upstream(format!("{e:#}")))?;

    Ok(StoredImage {
        url: st.storage.public_url(&key),
        public_id: key,
    })
}

/// Removes a stored image. Failures are logged, never surfaced: a dangling
/// object is preferable to failing the request that replaced it.
pub async fn delete_image(st: &AppState, public_id: &str) {
    if public_id.is_empty() {
        return;
    }
    if let Err(e) = st.storage.delete_object(public_id).await {
        warn!(error = %e, public_id, "failed to delete stored image");
    }
}

/// Resolves a row write that points at a fresh upload. When the write failed
/// or matched no row, the upload is deleted again and `missing` becomes 404.
pub async fn settle_upload<T>(
    st: &AppState,
    uploaded: Option<&StoredImage>,
    written: anyhow::Result<Option<T>>,
    missing: &str,
) -> Result<T, AppError> {
    let err = match written {
        Ok(Some(row)) => return Ok(row),
        Ok(None) => AppError::not_found(missing),
        Err(e) => e.into(),
    };
    if let Some(image) = uploaded {
        delete_image(st, &image.public_id).await;
    }
    Err(err)
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/avif" => Some("avif"),
        _ => None,
    }
}
