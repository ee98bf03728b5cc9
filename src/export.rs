//! Saving still frames from a canvas.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use image::{DynamicImage, ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::render::Canvas;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Jpeg,
    Png,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Jpeg => "jpg",
            ExportFormat::Png => "png",
        }
    }

    pub fn image_format(self) -> ImageFormat {
        match self {
            ExportFormat::Jpeg => ImageFormat::Jpeg,
            ExportFormat::Png => ImageFormat::Png,
        }
    }

    /// Format implied by a file extension, if supported.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some(ExportFormat::Jpeg),
            "png" => Some(ExportFormat::Png),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExportFormat::Jpeg => "JPEG",
            ExportFormat::Png => "PNG",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Failed to save {path}: {source}")]
    Encode {
        path: PathBuf,
        source: image::ImageError,
    },
}

/// `<prefix>-<local time>.<ext>`, safe on every file system.
pub fn timestamped_file_name(prefix: &str, format: ExportFormat, now: DateTime<Local>) -> String {
    format!(
        "{}-{}.{}",
        prefix,
        now.format("%Y-%m-%dT%H-%M-%S%.3f"),
        format.extension()
    )
}

/// Encodes `pixels` to `path`. JPEG drops the alpha channel.
pub fn save_image(pixels: &RgbaImage, path: &Path, format: ExportFormat) -> Result<(), ExportError> {
    let result = match format {
        ExportFormat::Png => pixels.save_with_format(path, ImageFormat::Png),
        ExportFormat::Jpeg => DynamicImage::ImageRgba8(pixels.clone())
            .to_rgb8()
            .save_with_format(path, ImageFormat::Jpeg),
    };
    result.map_err(|source| ExportError::Encode {
        path: path.to_path_buf(),
        source,
    })
}

/// Saves the canvas to `path`, picking the encoder from the extension and
/// falling back to `format`.
///
/// A missing or still empty canvas is not an error: nothing is written and
/// `Ok(None)` comes back.
pub fn export_canvas(
    canvas: Option<&Canvas>,
    path: &Path,
    format: ExportFormat,
) -> Result<Option<PathBuf>, ExportError> {
    let Some(canvas) = canvas.filter(|c| !c.is_empty()) else {
        return Ok(None);
    };
    let format = ExportFormat::from_path(path).unwrap_or(format);
    save_image(canvas.pixels(), path, format)?;
    log::info!(
        "Saved {} {} frame to {}",
        canvas.size(),
        format,
        path.display()
    );
    Ok(Some(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn canvas_with(width: u32, height: u32) -> Canvas {
        let mut canvas = Canvas::new("test");
        canvas.replace(RgbaImage::from_pixel(width, height, image::Rgba([200, 10, 10, 255])));
        canvas
    }

    #[test]
    fn file_name_carries_timestamp_and_extension() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            timestamped_file_name("webcam", ExportFormat::Jpeg, now),
            "webcam-2024-03-09T14-05-07.000.jpg"
        );
        assert!(timestamped_file_name("x", ExportFormat::Png, now).ends_with(".png"));
    }

    #[test]
    fn extension_overrides_configured_format() {
        assert_eq!(
            ExportFormat::from_path(Path::new("a/b.PNG")),
            Some(ExportFormat::Png)
        );
        assert_eq!(
            ExportFormat::from_path(Path::new("frame.jpeg")),
            Some(ExportFormat::Jpeg)
        );
        assert_eq!(ExportFormat::from_path(Path::new("frame")), None);
    }

    #[test]
    fn missing_or_empty_canvas_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.jpg");
        assert!(export_canvas(None, &path, ExportFormat::Jpeg).unwrap().is_none());
        let empty = Canvas::new("empty");
        assert!(export_canvas(Some(&empty), &path, ExportFormat::Jpeg).unwrap().is_none());
        assert!(!path.exists());
    }

    #[test]
    fn jpeg_and_png_exports_decode_back() {
        let dir = tempfile::tempdir().unwrap();
        let canvas = canvas_with(40, 24);

        let jpg = dir.path().join("frame.jpg");
        export_canvas(Some(&canvas), &jpg, ExportFormat::Png).unwrap();
        let decoded = image::open(&jpg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (40, 24));
        assert_eq!(image::ImageFormat::from_path(&jpg).unwrap(), ImageFormat::Jpeg);

        let png = dir.path().join("frame.png");
        let saved = export_canvas(Some(&canvas), &png, ExportFormat::Jpeg).unwrap();
        assert_eq!(saved.as_deref(), Some(png.as_path()));
        let decoded = image::open(&png).unwrap().to_rgba8();
        assert_eq!(decoded.get_pixel(3, 3).0, [200, 10, 10, 255]);
    }

    #[test]
    fn format_round_trips_through_config_names() {
        assert_eq!(serde_json::to_string(&ExportFormat::Jpeg).unwrap(), "\"jpeg\"");
        let format: ExportFormat = serde_json::from_str("\"png\"").unwrap();
        assert_eq!(format, ExportFormat::Png);
    }
}
