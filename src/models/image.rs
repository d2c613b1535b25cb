use std::path::Path;
use std::str::FromStr;

use strum::{Display, EnumString};

/// Image encodings the colorization service accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(ascii_case_insensitive)]
pub enum ImageFormat {
    #[strum(to_string = "png")]
    Png,
    #[strum(to_string = "jpg", serialize = "jpeg")]
    Jpeg,
    #[strum(to_string = "gif")]
    Gif,
    #[strum(to_string = "webp")]
    WebP,
    #[strum(to_string = "bmp")]
    Bmp,
    #[strum(to_string = "tiff", serialize = "tif")]
    Tiff,
    #[strum(to_string = "svg")]
    Svg,
}

impl ImageFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Gif => "image/gif",
            ImageFormat::WebP => "image/webp",
            ImageFormat::Bmp => "image/bmp",
            ImageFormat::Tiff => "image/tiff",
            ImageFormat::Svg => "image/svg+xml",
        }
    }

    /// Resolve the format from a file name's extension.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let ext = Path::new(name).extension()?.to_str()?;
        ImageFormat::from_str(ext).ok()
    }

    /// Identify the format from the leading magic bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        match image::guess_format(bytes).ok()? {
            image::ImageFormat::Png => Some(ImageFormat::Png),
            image::ImageFormat::Jpeg => Some(ImageFormat::Jpeg),
            image::ImageFormat::Gif => Some(ImageFormat::Gif),
            image::ImageFormat::WebP => Some(ImageFormat::WebP),
            image::ImageFormat::Bmp => Some(ImageFormat::Bmp),
            image::ImageFormat::Tiff => Some(ImageFormat::Tiff),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("Image is empty")]
    Empty,

    #[error("Failed to read image: {0}")]
    Read(#[from] std::io::Error),
}

/// A locally selected image ready to be sent to the colorization service.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    /// File name sent in the multipart `file` part.
    pub file_name: String,
    pub content_type: &'static str,
    /// Local reference to the image, used as the original locator when the
    /// service does not echo one back.
    pub source_ref: String,
}

impl ImageUpload {
    /// Build an upload from raw bytes. `source_ref` is the local name or path
    /// the bytes came from; its extension picks the content type, falling back
    /// to the magic bytes and finally to JPEG.
    pub fn from_bytes(bytes: Vec<u8>, source_ref: impl Into<String>) -> Result<Self, ImageError> {
        if bytes.is_empty() {
            return Err(ImageError::Empty);
        }

        let source_ref = source_ref.into();
        let format = ImageFormat::from_file_name(&source_ref)
            .or_else(|| ImageFormat::sniff(&bytes))
            .unwrap_or(ImageFormat::Jpeg);

        Ok(Self {
            file_name: format!("photo_{}.{}", chrono::Utc::now().timestamp_millis(), format),
            content_type: format.mime_type(),
            bytes,
            source_ref,
        })
    }

    pub async fn from_path(path: &Path) -> Result<Self, ImageError> {
        let bytes = tokio::fs::read(path).await?;
        Self::from_bytes(bytes, path.display().to_string())
    }
}
