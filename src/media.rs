//! Recipe images arrive as base64 data URIs and are stored under the media root.

use std::path::Path;

use base64::{Engine, engine::general_purpose::STANDARD};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub const MEDIA_URL_PREFIX: &str = "/media/";
const RECIPE_IMAGE_DIR: &str = "recipes";

#[derive(Debug, PartialEq, Eq)]
pub struct DecodedImage {
    pub extension: &'static str,
    pub bytes: Vec<u8>,
}

/// Decodes `data:image/<type>;base64,<payload>`.
pub fn decode_data_uri(uri: &str) -> AppResult<DecodedImage> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| AppError::validation("image must be a base64 data URI"))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| AppError::validation("image data URI has no payload"))?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| AppError::validation("image data URI must be base64 encoded"))?;

    let extension = match mime.to_ascii_lowercase().as_str() {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        other => {
            return Err(AppError::validation(format!(
                "unsupported image type \"{other}\""
            )));
        }
    };

    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|_| AppError::validation("image payload is not valid base64"))?;
    if bytes.is_empty() {
        return Err(AppError::validation("image payload is empty"));
    }

    Ok(DecodedImage { extension, bytes })
}

/// Writes a decoded image and returns its path relative to the media root.
pub async fn store_image(media_root: &Path, image: DecodedImage) -> AppResult<String> {
    let dir = media_root.join(RECIPE_IMAGE_DIR);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;

    let file_name = format!("{}.{}", Uuid::new_v4(), image.extension);
    tokio::fs::write(dir.join(&file_name), &image.bytes)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;

    let relative = format!("{RECIPE_IMAGE_DIR}/{file_name}");
    tracing::debug!(path = %relative, size = image.bytes.len(), "stored recipe image");
    Ok(relative)
}

/// Removes a stored image; missing files are ignored.
pub async fn remove_image(media_root: &Path, relative: &str) {
    if let Err(err) = tokio::fs::remove_file(media_root.join(relative)).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(error = %err, path = relative, "failed to remove image");
        }
    }
}

pub fn public_url(relative: &str) -> String {
    format!("{MEDIA_URL_PREFIX}{relative}")
}

#[cfg(test)]
mod tests {
    use super::*;

    // 1x1 transparent PNG
    const PIXEL: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

    #[test]
    fn decodes_png_data_uri() {
        let image = decode_data_uri(&format!("data:image/png;base64,{PIXEL}")).unwrap();
        assert_eq!(image.extension, "png");
        assert_eq!(&image.bytes[1..4], b"PNG");
    }

    #[test]
    fn rejects_plain_urls_and_bad_payloads() {
        assert!(decode_data_uri("https://example.com/cake.png").is_err());
        assert!(decode_data_uri("data:image/png,abc").is_err());
        assert!(decode_data_uri("data:text/plain;base64,aGk=").is_err());
        assert!(decode_data_uri("data:image/png;base64,***").is_err());
    }

    #[tokio::test]
    async fn stores_image_under_recipe_dir() {
        let root = tempfile::tempdir().unwrap();
        let image = decode_data_uri(&format!("data:image/png;base64,{PIXEL}")).unwrap();
        let path = store_image(root.path(), image)
            .await
            .unwrap();
        assert!(path.starts_with("recipes/"));
        assert!(path.ends_with(".png"));
        assert!(root.path().join(&path).exists());
        assert_eq!(public_url(&path), format!("/media/{path}"));

        remove_image(root.path(), &path).await;
        assert!(!root.path().join(&path).exists());
    }
}
