//! Quality parameter and the source-mode capability table.
//!
//! Every source color mode supports a fixed set of qualities. Asking for a
//! quality outside that set is an error, never an approximation.

use std::fmt;

use bitflags::bitflags;

use crate::error::IiifError;

use super::grammar::ApiVersion;

/// Requested color rendering.
///
/// `native` (v1) and `default` (v2) both normalize to [`Quality::Default`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quality {
    Default,
    Color,
    Gray,
    Bitonal,
}

impl Quality {
    /// Parse a raw quality token that already matched the version grammar.
    pub fn parse(raw: &str, version: ApiVersion) -> Result<Self, IiifError> {
        match (raw, version) {
            ("default", _) => Ok(Quality::Default),
            ("native", ApiVersion::V1) => Ok(Quality::Default),
            ("color", _) => Ok(Quality::Color),
            ("grey", _) => Ok(Quality::Gray),
            ("gray", ApiVersion::V2) => Ok(Quality::Gray),
            ("bitonal", _) => Ok(Quality::Bitonal),
            _ => Err(IiifError::malformed("quality", raw)),
        }
    }

    /// Canonical token for this quality in the given version.
    pub fn token(&self, version: ApiVersion) -> &'static str {
        match (self, version) {
            (Quality::Default, ApiVersion::V1) => "native",
            (Quality::Default, ApiVersion::V2) => "default",
            (Quality::Color, _) => "color",
            (Quality::Gray, ApiVersion::V1) => "grey",
            (Quality::Gray, ApiVersion::V2) => "gray",
            (Quality::Bitonal, _) => "bitonal",
        }
    }

    fn flag(&self) -> QualitySet {
        match self {
            Quality::Default => QualitySet::DEFAULT,
            Quality::Color => QualitySet::COLOR,
            Quality::Gray => QualitySet::GRAY,
            Quality::Bitonal => QualitySet::BITONAL,
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token(ApiVersion::V2))
    }
}

bitflags! {
    /// Set of qualities a source mode can produce.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct QualitySet: u8 {
        const DEFAULT = 1 << 0;
        const COLOR = 1 << 1;
        const GRAY = 1 << 2;
        const BITONAL = 1 << 3;
    }
}

impl QualitySet {
    /// Whether the set contains a quality.
    pub fn supports(&self, quality: Quality) -> bool {
        self.contains(quality.flag())
    }
}

/// Native color mode of a source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorMode {
    /// 1-bit black and white
    Bilevel,
    /// 8-bit luminance
    Grayscale,
    /// Indexed color
    Palette,
    /// RGB
    TrueColor,
    /// RGB with alpha
    TrueColorAlpha,
    /// Four-channel print color
    Cmyk,
    /// Luminance-chrominance
    YCbCr,
    /// High bit-depth integer samples
    Integer,
    /// Floating point samples
    Float,
}

impl ColorMode {
    /// Qualities this mode can be rendered as.
    pub fn qualities(&self) -> QualitySet {
        match self {
            ColorMode::Bilevel => QualitySet::DEFAULT | QualitySet::BITONAL,
            ColorMode::Grayscale | ColorMode::Palette => {
                QualitySet::DEFAULT | QualitySet::GRAY | QualitySet::BITONAL
            }
            ColorMode::TrueColor
            | ColorMode::TrueColorAlpha
            | ColorMode::Cmyk
            | ColorMode::YCbCr
            | ColorMode::Integer
            | ColorMode::Float => QualitySet::all(),
        }
    }

    /// Short mode name used in errors and metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            ColorMode::Bilevel => "1",
            ColorMode::Grayscale => "L",
            ColorMode::Palette => "P",
            ColorMode::TrueColor => "RGB",
            ColorMode::TrueColorAlpha => "RGBA",
            ColorMode::Cmyk => "CMYK",
            ColorMode::YCbCr => "YCbCr",
            ColorMode::Integer => "I",
            ColorMode::Float => "F",
        }
    }
}

impl fmt::Display for ColorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Concrete color conversion applied by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorAction {
    /// Leave the pixels in the source mode
    Keep,
    /// Full color (RGB, alpha preserved)
    Color,
    /// Luminance only
    Grayscale,
    /// 1-bit threshold at mid-gray
    Threshold,
}

/// Map a quality and source mode to a color conversion.
pub fn resolve(quality: Quality, mode: ColorMode) -> Result<ColorAction, IiifError> {
    if !mode.qualities().supports(quality) {
        return Err(IiifError::UnsupportedQuality {
            quality: quality.to_string(),
            mode: mode.to_string(),
        });
    }

    Ok(match quality {
        Quality::Default => ColorAction::Keep,
        Quality::Color => ColorAction::Color,
        Quality::Gray => ColorAction::Grayscale,
        Quality::Bitonal => ColorAction::Threshold,
    })
}
