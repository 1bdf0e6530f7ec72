//! Raw image requests and the parameter validator.

use super::format::OutputFormat;
use super::grammar::{check, ApiVersion, Field, RuleMatch};
use super::quality::Quality;
use super::region::RegionSpec;
use super::rotation::Rotation;
use super::size::SizeSpec;
use crate::error::IiifError;

// =============================================================================
// Image Request
// =============================================================================

/// An inbound request, exactly as it arrived in the path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    /// Opaque image identifier
    pub identifier: String,

    /// Protocol version
    pub version: ApiVersion,

    /// Raw region segment
    pub region: String,

    /// Raw size segment
    pub size: String,

    /// Raw rotation segment
    pub rotation: String,

    /// Raw quality token (before the dot)
    pub quality: String,

    /// Raw format extension (after the dot, empty if absent)
    pub format: String,
}

impl ImageRequest {
    /// Create a request for the whole image with every parameter at its
    /// ignore value.
    pub fn new(version: ApiVersion, identifier: impl Into<String>) -> Self {
        let grammar = version.grammar();
        Self {
            identifier: identifier.into(),
            version,
            region: grammar.region.ignore.to_string(),
            size: grammar.size.ignore.to_string(),
            rotation: grammar.rotation.ignore.to_string(),
            quality: grammar.quality.ignore.to_string(),
            format: grammar.format.ignore.to_string(),
        }
    }

    /// Build a request from the URL path segments.
    ///
    /// `quality_format` is the final segment, e.g. `default.png`. A missing
    /// extension leaves the format empty.
    pub fn from_segments(
        version: &str,
        identifier: &str,
        region: &str,
        size: &str,
        rotation: &str,
        quality_format: &str,
    ) -> Result<Self, IiifError> {
        let version: ApiVersion = version.parse()?;
        let (quality, format) = quality_format
            .rsplit_once('.')
            .unwrap_or((quality_format, ""));

        Ok(Self::new(version, identifier)
            .with_region(region)
            .with_size(size)
            .with_rotation(rotation)
            .with_quality(quality)
            .with_format(format))
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = size.into();
        self
    }

    pub fn with_rotation(mut self, rotation: impl Into<String>) -> Self {
        self.rotation = rotation.into();
        self
    }

    pub fn with_quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = quality.into();
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    fn raw(&self, field: Field) -> &str {
        match field {
            Field::Region => &self.region,
            Field::Size => &self.size,
            Field::Rotation => &self.rotation,
            Field::Quality => &self.quality,
            Field::Format => &self.format,
        }
    }

    /// Check one field against the grammar. `Ok(false)` means the raw value
    /// is the field's ignore value and the default applies.
    fn matches(&self, field: Field) -> Result<bool, IiifError> {
        let raw = self.raw(field);
        match check(self.version, field, raw) {
            RuleMatch::Matched => Ok(true),
            RuleMatch::Ignored => Ok(false),
            RuleMatch::Rejected => Err(IiifError::malformed(field.name(), raw)),
        }
    }

    /// Validate every parameter against the version grammar.
    ///
    /// Fields are checked and parsed one at a time in a fixed order (region,
    /// size, rotation, quality, format), and the first failure is returned.
    pub fn validate(&self) -> Result<NormalizedRequest, IiifError> {
        let region = if self.matches(Field::Region)? {
            RegionSpec::parse(&self.region)?
        } else {
            RegionSpec::Full
        };
        let size = if self.matches(Field::Size)? {
            SizeSpec::parse(&self.size)?
        } else {
            SizeSpec::Full
        };
        let rotation = if self.matches(Field::Rotation)? {
            Rotation::parse(&self.rotation)?
        } else {
            Rotation::NONE
        };
        let quality = if self.matches(Field::Quality)? {
            Quality::parse(&self.quality, self.version)?
        } else {
            Quality::Default
        };
        let format = if self.matches(Field::Format)? {
            OutputFormat::parse(&self.format)?
        } else {
            OutputFormat::default()
        };

        Ok(NormalizedRequest {
            identifier: self.identifier.clone(),
            version: self.version,
            region,
            size,
            rotation,
            quality,
            format,
        })
    }
}

// =============================================================================
// Normalized Request
// =============================================================================

/// A request after validation. No raw strings survive except the identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRequest {
    pub identifier: String,
    pub version: ApiVersion,
    pub region: RegionSpec,
    pub size: SizeSpec,
    pub rotation: Rotation,
    pub quality: Quality,
    pub format: OutputFormat,
}
