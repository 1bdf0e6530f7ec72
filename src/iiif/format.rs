//! Target formats and their MIME types.

use std::fmt;

use crate::error::IiifError;

/// Output encoding requested by the format extension.
///
/// `jpg` and `jpeg` are the same format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
    Gif,
    Jp2,
    Pdf,
}

impl OutputFormat {
    /// Parse a raw extension that already matched the grammar.
    pub fn parse(raw: &str) -> Result<Self, IiifError> {
        match raw {
            "jpg" | "jpeg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            "gif" => Ok(OutputFormat::Gif),
            "jp2" => Ok(OutputFormat::Jp2),
            "pdf" => Ok(OutputFormat::Pdf),
            other => Err(IiifError::malformed("format", other)),
        }
    }

    /// MIME type sent as `Content-Type`.
    pub fn mime(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::Gif => "image/gif",
            OutputFormat::Jp2 => "image/jp2",
            OutputFormat::Pdf => "application/pdf",
        }
    }

    /// Canonical extension.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::Gif => "gif",
            OutputFormat::Jp2 => "jp2",
            OutputFormat::Pdf => "pdf",
        }
    }

    /// Encoder backing this format, if one is compiled in.
    pub fn encoder(&self) -> Option<image::ImageFormat> {
        match self {
            OutputFormat::Jpeg => Some(image::ImageFormat::Jpeg),
            OutputFormat::Png => Some(image::ImageFormat::Png),
            OutputFormat::Gif => Some(image::ImageFormat::Gif),
            OutputFormat::Jp2 | OutputFormat::Pdf => None,
        }
    }

    /// Extensions accepted by the service, for `info.json`.
    pub fn supported_extensions() -> &'static [&'static str] {
        &["jpg", "png", "gif"]
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}
