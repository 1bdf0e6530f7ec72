//! IIIF Image API request grammar and parameter resolution.
//!
//! A raw [`ImageRequest`] is validated field by field against the grammar of
//! its protocol version, producing a [`NormalizedRequest`]. The individual
//! resolvers then turn the normalized parameters into concrete geometry and
//! color operations once the source dimensions and mode are known.

pub mod format;
pub mod grammar;
pub mod quality;
pub mod region;
pub mod request;
pub mod rotation;
pub mod size;

pub use format::OutputFormat;
pub use grammar::{ApiVersion, Field};
pub use quality::{ColorAction, ColorMode, Quality, QualitySet};
pub use region::{CropRect, RegionSpec};
pub use request::{ImageRequest, NormalizedRequest};
pub use rotation::Rotation;
pub use size::SizeSpec;
