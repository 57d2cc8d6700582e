use crate::config::Config;
use crate::error::AppError;
use axum::extract::multipart::Field;
use bytes::Bytes;

pub struct UploadedImage {
    pub data: Bytes,
    pub content_type: String,
}

impl UploadedImage {
    /// Object key for this image under `prefix`, with an extension matching its type.
    pub fn storage_key(&self, prefix: &str, name: &str) -> String {
        format!("{}/{}.{}", prefix, name, extension_for(&self.content_type))
    }
}

/// Reads an image part, checking its declared type against the allow-list and its size against
/// the configured maximum.
pub async fn read_image(field: Field<'_>, config: &Config) -> Result<UploadedImage, AppError> {
    let content_type = field
        .content_type()
        .map(|ct| ct.trim().to_ascii_lowercase())
        .ok_or_else(|| AppError::BadRequest("Image is missing a content type".to_string()))?;

    if !config.is_allowed_image_type(&content_type) {
        return Err(AppError::BadRequest(format!(
            "Unsupported image type: {}",
            content_type
        )));
    }

    let data = field
        .bytes()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read image data: {}", e)))?;

    if data.is_empty() {
        return Err(AppError::BadRequest("Image is empty".to_string()));
    }

    if data.len() > config.max_image_size_bytes {
        return Err(AppError::BadRequest(format!(
            "Image size exceeds maximum of {} bytes",
            config.max_image_size_bytes
        )));
    }

    Ok(UploadedImage { data, content_type })
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/avif" => "avif",
        _ => "bin",
    }
}
