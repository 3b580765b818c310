//! Image inputs accepted by the detector.

use crate::error::{DetectorError, Result};
use base64::Engine;
use image::DynamicImage;
use std::path::PathBuf;
use url::Url;

/// An image to run detection on
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// Encoded image bytes (JPEG, PNG, ...)
    Blob(Vec<u8>),
    /// Already decoded raster
    Bitmap(DynamicImage),
    /// `data:`, `http(s)://` or `file://` URL, or a filesystem path
    Url(String),
}

impl ImageSource {
    pub fn kind(&self) -> &'static str {
        match self {
            ImageSource::Blob(_) => "blob",
            ImageSource::Bitmap(_) => "bitmap",
            ImageSource::Url(_) => "url",
        }
    }

    /// Resolve to a decoded raster, fetching remote URLs with `http`.
    pub async fn resolve(self, http: &reqwest::Client) -> Result<DynamicImage> {
        match self {
            ImageSource::Bitmap(image) => Ok(image),
            ImageSource::Blob(bytes) => decode_blob(&bytes),
            ImageSource::Url(raw) => resolve_url(raw.trim(), http).await,
        }
    }
}

impl From<Vec<u8>> for ImageSource {
    fn from(bytes: Vec<u8>) -> Self {
        ImageSource::Blob(bytes)
    }
}

impl From<&[u8]> for ImageSource {
    fn from(bytes: &[u8]) -> Self {
        ImageSource::Blob(bytes.to_vec())
    }
}

impl From<DynamicImage> for ImageSource {
    fn from(image: DynamicImage) -> Self {
        ImageSource::Bitmap(image)
    }
}

impl From<String> for ImageSource {
    fn from(url: String) -> Self {
        ImageSource::Url(url)
    }
}

impl From<&str> for ImageSource {
    fn from(url: &str) -> Self {
        ImageSource::Url(url.to_string())
    }
}

impl From<Url> for ImageSource {
    fn from(url: Url) -> Self {
        ImageSource::Url(url.into())
    }
}

fn decode_blob(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(DetectorError::UnsupportedSource("empty image blob".to_string()));
    }
    Ok(image::load_from_memory(bytes)?)
}

async fn resolve_url(raw: &str, http: &reqwest::Client) -> Result<DynamicImage> {
    if raw.is_empty() {
        return Err(DetectorError::UnsupportedSource("empty image URL".to_string()));
    }

    let url = match Url::parse(raw) {
        Ok(url) => url,
        // Not absolute, so a relative filesystem path
        Err(_) => return read_file(PathBuf::from(raw)).await,
    };

    match url.scheme() {
        "data" => decode_blob(&decode_data_url(raw)?),
        "http" | "https" => {
            let bytes = http
                .get(url)
                .send()
                .await?
                .error_for_status()?
                .bytes()
                .await?;
            decode_blob(&bytes)
        }
        "file" => {
            let path = url.to_file_path().map_err(|_| {
                DetectorError::UnsupportedSource(format!("file URL without a local path: {}", raw))
            })?;
            read_file(path).await
        }
        scheme => Err(DetectorError::UnsupportedSource(format!(
            "URL scheme '{}' is not supported",
            scheme
        ))),
    }
}

async fn read_file(path: PathBuf) -> Result<DynamicImage> {
    let bytes = tokio::fs::read(&path).await?;
    decode_blob(&bytes)
}

/// Payload of a base64 `data:` URL
fn decode_data_url(raw: &str) -> Result<Vec<u8>> {
    let rest = raw
        .strip_prefix("data:")
        .ok_or_else(|| DetectorError::UnsupportedSource("not a data URL".to_string()))?;
    let (meta, payload) = rest.split_once(',').ok_or_else(|| {
        DetectorError::UnsupportedSource("data URL without a payload".to_string())
    })?;
    if !meta.split(';').any(|part| part.eq_ignore_ascii_case("base64")) {
        return Err(DetectorError::UnsupportedSource(
            "only base64 data URLs are supported".to_string(),
        ));
    }

    base64::prelude::BASE64_STANDARD
        .decode(payload.trim())
        .map_err(|e| DetectorError::UnsupportedSource(format!("invalid base64 payload: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::new(width, height));
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    #[tokio::test]
    async fn test_blob_resolves() {
        let image = ImageSource::from(png_bytes(8, 4))
            .resolve(&reqwest::Client::new())
            .await
            .unwrap();
        assert_eq!((image.width(), image.height()), (8, 4));
    }

    #[tokio::test]
    async fn test_empty_blob_is_unsupported() {
        let err = ImageSource::Blob(Vec::new())
            .resolve(&reqwest::Client::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DetectorError::UnsupportedSource(_)));
    }

    #[tokio::test]
    async fn test_garbage_blob_is_decode_error() {
        let err = ImageSource::Blob(b"definitely not an image".to_vec())
            .resolve(&reqwest::Client::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DetectorError::ImageDecode(_)));
    }

    #[tokio::test]
    async fn test_data_url_resolves() {
        let encoded = base64::prelude::BASE64_STANDARD.encode(png_bytes(3, 5));
        let url = format!("data:image/png;base64,{}", encoded);
        let image = ImageSource::from(url)
            .resolve(&reqwest::Client::new())
            .await
            .unwrap();
        assert_eq!((image.width(), image.height()), (3, 5));
    }

    #[tokio::test]
    async fn test_file_path_and_url_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plate.png");
        std::fs::write(&path, png_bytes(6, 6)).unwrap();

        let http = reqwest::Client::new();
        let by_path = ImageSource::from(path.to_string_lossy().to_string())
            .resolve(&http)
            .await
            .unwrap();
        assert_eq!(by_path.width(), 6);

        let file_url = Url::from_file_path(&path).unwrap();
        let by_url = ImageSource::from(file_url).resolve(&http).await.unwrap();
        assert_eq!(by_url.height(), 6);
    }

    #[tokio::test]
    async fn test_unknown_scheme_is_unsupported() {
        let err = ImageSource::from("ftp://example.com/plate.png")
            .resolve(&reqwest::Client::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DetectorError::UnsupportedSource(_)));
    }

    #[test]
    fn test_data_url_requires_base64() {
        assert!(decode_data_url("data:text/plain,hello").is_err());
        assert!(decode_data_url("data:image/png;base64").is_err());
        assert_eq!(
            decode_data_url("data:application/octet-stream;base64,AQID").unwrap(),
            vec![1, 2, 3]
        );
    }
}
