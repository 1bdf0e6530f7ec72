//! Transform executor.
//!
//! A derivative is produced by five stages applied in a fixed order:
//!
//! ```text
//! crop ──► resize ──► mirror + rotate ──► recolor ──► encode
//! ```
//!
//! Each stage is a function from one image value to the next. Every stage
//! runs for every request; stages whose parameters are no-ops return their
//! input unchanged.

use std::fmt;
use std::io::Cursor;

use bytes::Bytes;
use image::codecs::gif::GifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, Frame, ImageFormat, Rgba, RgbaImage};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use tracing::debug;

use crate::error::IiifError;
use crate::iiif::{ColorAction, CropRect, OutputFormat, Rotation};

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

/// Luma value at or above which a pixel becomes white in bitonal output.
///
/// Bitonal output is an 8-bit luma image holding only 0 and 255. The
/// encoders used here have no 1-bit path, so PNG output is 8-bit grayscale.
const BITONAL_THRESHOLD: u8 = 128;

/// Transparent fill for canvas exposed by arbitrary rotations.
const ROTATION_FILL: Rgba<u8> = Rgba([0, 0, 0, 0]);

// =============================================================================
// Plan
// =============================================================================

/// Pipeline stage, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Crop,
    Resize,
    Rotate,
    Recolor,
    Encode,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PipelineStage::Crop => "crop",
            PipelineStage::Resize => "resize",
            PipelineStage::Rotate => "rotate",
            PipelineStage::Recolor => "recolor",
            PipelineStage::Encode => "encode",
        })
    }
}

/// Fully resolved parameters for one run of the executor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformPlan {
    pub crop: CropRect,
    pub size: (u32, u32),
    pub rotation: Rotation,
    pub color: ColorAction,
    pub format: OutputFormat,
}

// =============================================================================
// Executor
// =============================================================================

/// Applies a [`TransformPlan`] to decoded pixels.
///
/// CPU-bound; callers on an async runtime should run it on the blocking pool.
#[derive(Debug, Clone, Copy)]
pub struct TransformExecutor {
    jpeg_quality: u8,
    filter: FilterType,
}

impl Default for TransformExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl TransformExecutor {
    /// Create an executor encoding JPEG at `jpeg_quality` (clamped to 1-100).
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            jpeg_quality: jpeg_quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY),
            filter: FilterType::Lanczos3,
        }
    }

    /// Use a different resampling filter.
    pub fn with_filter(mut self, filter: FilterType) -> Self {
        self.filter = filter;
        self
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
    }

    /// Run every stage and return the encoded bytes.
    pub fn execute(&self, image: DynamicImage, plan: &TransformPlan) -> Result<Bytes, IiifError> {
        debug!(stage = %PipelineStage::Crop, x = plan.crop.x, y = plan.crop.y, width = plan.crop.width, height = plan.crop.height);
        let image = crop(image, plan.crop)?;

        debug!(stage = %PipelineStage::Resize, width = plan.size.0, height = plan.size.1);
        let image = resize(image, plan.size, self.filter);

        debug!(stage = %PipelineStage::Rotate, angle = plan.rotation.angle, mirrored = plan.rotation.mirrored);
        let image = rotate(image, plan.rotation);

        debug!(stage = %PipelineStage::Recolor, action = ?plan.color);
        let image = recolor(image, plan.color);

        debug!(stage = %PipelineStage::Encode, format = %plan.format);
        encode(&image, plan.format, self.jpeg_quality)
    }
}

// =============================================================================
// Stages
// =============================================================================

/// Cut `rect` out of the image.
pub fn crop(image: DynamicImage, rect: CropRect) -> Result<DynamicImage, IiifError> {
    let (width, height) = (image.width(), image.height());
    if rect.is_full(width, height) {
        return Ok(image);
    }

    let fits = u64::from(rect.x) + u64::from(rect.width) <= u64::from(width)
        && u64::from(rect.y) + u64::from(rect.height) <= u64::from(height);
    if !fits || rect.width == 0 || rect.height == 0 {
        return Err(IiifError::geometry(format!(
            "crop {}x{}+{}+{} does not fit the {}x{} source",
            rect.width, rect.height, rect.x, rect.y, width, height
        )));
    }

    Ok(image.crop_imm(rect.x, rect.y, rect.width, rect.height))
}

/// Scale to exactly `size`; aspect ratio was already decided by the resolver.
pub fn resize(image: DynamicImage, size: (u32, u32), filter: FilterType) -> DynamicImage {
    if (image.width(), image.height()) == size {
        return image;
    }
    image.resize_exact(size.0, size.1, filter)
}

/// Mirror horizontally if requested, then rotate clockwise.
///
/// Quarter turns are lossless. Other angles rotate on a canvas enlarged to
/// hold the whole rotated image, with transparent corners.
pub fn rotate(image: DynamicImage, rotation: Rotation) -> DynamicImage {
    let image = if rotation.mirrored { image.fliph() } else { image };

    match rotation.quarter_turns() {
        Some(0) => image,
        Some(1) => image.rotate90(),
        Some(2) => image.rotate180(),
        Some(3) => image.rotate270(),
        _ => rotate_arbitrary(&image, rotation.angle),
    }
}

fn rotate_arbitrary(image: &DynamicImage, degrees: f64) -> DynamicImage {
    let (width, height) = (f64::from(image.width()), f64::from(image.height()));
    let radians = degrees.to_radians();
    let (sin, cos) = (radians.sin().abs(), radians.cos().abs());

    // Bounding box of the rotated rectangle; the epsilon absorbs float noise
    let canvas_w = ((width * cos + height * sin) - 1e-9).ceil().max(1.0) as u32;
    let canvas_h = ((width * sin + height * cos) - 1e-9).ceil().max(1.0) as u32;

    let mut canvas = RgbaImage::from_pixel(canvas_w, canvas_h, ROTATION_FILL);
    let offset_x = (i64::from(canvas_w) - i64::from(image.width())) / 2;
    let offset_y = (i64::from(canvas_h) - i64::from(image.height())) / 2;
    image::imageops::overlay(&mut canvas, &image.to_rgba8(), offset_x, offset_y);

    let rotated = rotate_about_center(
        &canvas,
        radians as f32,
        Interpolation::Bilinear,
        ROTATION_FILL,
    );
    let rotated = DynamicImage::ImageRgba8(rotated);

    // Gray sources without alpha keep their color type; exposed corners
    // become the fill's black instead of transparent
    match image.color() {
        ColorType::L8 => DynamicImage::ImageLuma8(rotated.to_luma8()),
        ColorType::L16 => DynamicImage::ImageLuma16(rotated.to_luma16()),
        _ => rotated,
    }
}

/// Apply the color conversion chosen by the quality resolver.
pub fn recolor(image: DynamicImage, action: ColorAction) -> DynamicImage {
    match action {
        ColorAction::Keep => image,
        ColorAction::Color => {
            if image.color().has_alpha() {
                DynamicImage::ImageRgba8(image.to_rgba8())
            } else {
                DynamicImage::ImageRgb8(image.to_rgb8())
            }
        }
        ColorAction::Grayscale => image.grayscale(),
        ColorAction::Threshold => {
            let mut luma = image.to_luma8();
            for pixel in luma.pixels_mut() {
                pixel.0[0] = if pixel.0[0] >= BITONAL_THRESHOLD { 255 } else { 0 };
            }
            DynamicImage::ImageLuma8(luma)
        }
    }
}

/// Encode the final image.
pub fn encode(image: &DynamicImage, format: OutputFormat, jpeg_quality: u8) -> Result<Bytes, IiifError> {
    let encoding_error = |e: image::ImageError| IiifError::Encoding {
        message: format!("{} encoding failed: {}", format, e),
    };

    let mut output = Vec::new();
    match format {
        OutputFormat::Jpeg => {
            // JPEG carries neither alpha nor more than 8 bits per sample
            let flat = match image {
                DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => image.clone(),
                _ if !image.color().has_color() => DynamicImage::ImageLuma8(image.to_luma8()),
                _ => DynamicImage::ImageRgb8(image.to_rgb8()),
            };
            let encoder = JpegEncoder::new_with_quality(&mut output, jpeg_quality);
            flat.write_with_encoder(encoder).map_err(encoding_error)?;
        }
        OutputFormat::Png => {
            let image = match image {
                DynamicImage::ImageRgb32F(_) => DynamicImage::ImageRgb16(image.to_rgb16()),
                DynamicImage::ImageRgba32F(_) => DynamicImage::ImageRgba16(image.to_rgba16()),
                _ => image.clone(),
            };
            image
                .write_to(&mut Cursor::new(&mut output), ImageFormat::Png)
                .map_err(encoding_error)?;
        }
        OutputFormat::Gif => {
            let mut encoder = GifEncoder::new(&mut output);
            encoder
                .encode_frame(Frame::new(image.to_rgba8()))
                .map_err(encoding_error)?;
        }
        OutputFormat::Jp2 | OutputFormat::Pdf => {
            return Err(IiifError::Encoding {
                message: format!("no encoder available for {}", format.mime()),
            });
        }
    }

    Ok(Bytes::from(output))
}
