//! Shared types used across the converter, the batch runner and the HTTP service.

use image::ImageFormat;
use std::fmt;
use std::path::Path;

/// An input image format the converter knows how to decode.
///
/// The same value is derived three ways depending on the surface:
/// - **CLI**: sniffed from the file content, falling back to the extension
/// - **HTTP**: from the declared MIME type of the uploaded part
/// - **Library**: chosen by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceFormat {
    Jpeg,
    Png,
    Gif,
    Bmp,
    Tiff,
    Avif,
    WebP,
}

/// File extensions accepted as image inputs, lowercase, without the dot.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tif", "tiff", "avif", "webp",
];

impl SourceFormat {
    pub const ALL: [SourceFormat; 7] = [
        SourceFormat::Jpeg,
        SourceFormat::Png,
        SourceFormat::Gif,
        SourceFormat::Bmp,
        SourceFormat::Tiff,
        SourceFormat::Avif,
        SourceFormat::WebP,
    ];

    /// Map a file extension (case-insensitive, no leading dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "bmp" => Some(Self::Bmp),
            "tif" | "tiff" => Some(Self::Tiff),
            "avif" => Some(Self::Avif),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Map a MIME type such as `image/png`. Parameters after `;` are ignored.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim();
        Self::ALL
            .into_iter()
            .find(|f| f.mime_type().eq_ignore_ascii_case(essence))
            .or_else(|| essence.eq_ignore_ascii_case("image/jpg").then_some(Self::Jpeg))
    }

    /// Detect the format from magic bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        image::guess_format(bytes).ok().and_then(Self::from_image_format)
    }

    pub fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(Self::Jpeg),
            ImageFormat::Png => Some(Self::Png),
            ImageFormat::Gif => Some(Self::Gif),
            ImageFormat::Bmp => Some(Self::Bmp),
            ImageFormat::Tiff => Some(Self::Tiff),
            ImageFormat::Avif => Some(Self::Avif),
            ImageFormat::WebP => Some(Self::WebP),
            _ => None,
        }
    }

    /// The `image` crate format used to decode this input.
    ///
    /// AVIF returns `None`: it is decoded by the rav1d path, not the `image` crate.
    pub fn image_format(self) -> Option<ImageFormat> {
        match self {
            Self::Jpeg => Some(ImageFormat::Jpeg),
            Self::Png => Some(ImageFormat::Png),
            Self::Gif => Some(ImageFormat::Gif),
            Self::Bmp => Some(ImageFormat::Bmp),
            Self::Tiff => Some(ImageFormat::Tiff),
            Self::WebP => Some(ImageFormat::WebP),
            Self::Avif => None,
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Bmp => "image/bmp",
            Self::Tiff => "image/tiff",
            Self::Avif => "image/avif",
            Self::WebP => "image/webp",
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
            Self::Avif => "avif",
            Self::WebP => "webp",
        };
        f.write_str(name)
    }
}

/// True if the path has one of the [`SUPPORTED_EXTENSIONS`].
pub fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_mapping_is_case_insensitive() {
        assert_eq!(SourceFormat::from_extension("JPG"), Some(SourceFormat::Jpeg));
        assert_eq!(SourceFormat::from_extension("tif"), Some(SourceFormat::Tiff));
        assert_eq!(SourceFormat::from_extension("Avif"), Some(SourceFormat::Avif));
        assert_eq!(SourceFormat::from_extension("svg"), None);
    }

    #[test]
    fn every_supported_extension_maps_to_a_format() {
        for ext in SUPPORTED_EXTENSIONS {
            assert!(SourceFormat::from_extension(ext).is_some(), "{ext}");
        }
    }

    #[test]
    fn mime_mapping_ignores_parameters() {
        assert_eq!(SourceFormat::from_mime("image/png"), Some(SourceFormat::Png));
        assert_eq!(
            SourceFormat::from_mime("image/jpeg; charset=binary"),
            Some(SourceFormat::Jpeg)
        );
        assert_eq!(SourceFormat::from_mime("image/jpg"), Some(SourceFormat::Jpeg));
        assert_eq!(SourceFormat::from_mime("text/plain"), None);
    }

    #[test]
    fn sniff_detects_png_magic() {
        let png_magic = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
        assert_eq!(SourceFormat::sniff(&png_magic), Some(SourceFormat::Png));
        assert_eq!(SourceFormat::sniff(b"definitely not an image"), None);
    }

    #[test]
    fn supported_extension_check() {
        assert!(has_supported_extension(Path::new("/a/b.JPEG")));
        assert!(has_supported_extension(Path::new("photo.webp")));
        assert!(!has_supported_extension(Path::new("notes.txt")));
        assert!(!has_supported_extension(Path::new("no_extension")));
    }
}
