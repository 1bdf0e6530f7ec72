//! Header probing and full decodes shared by the storage backends.

use std::io::{BufRead, Cursor, Seek};

use image::{DynamicImage, ExtendedColorType, ImageDecoder, ImageReader};

use super::{ColorMode, SourceImage};
use crate::error::SourceError;

/// Map a decoder's native color type to a source mode.
pub fn color_mode_of(color: ExtendedColorType) -> ColorMode {
    use ExtendedColorType as C;

    match color {
        C::L1 | C::La1 => ColorMode::Bilevel,
        C::A8 | C::L2 | C::La2 | C::L4 | C::La4 | C::L8 | C::La8 => ColorMode::Grayscale,
        C::Rgb1 | C::Rgba1 | C::Rgb2 | C::Rgba2 | C::Rgb4 | C::Rgba4 => ColorMode::Palette,
        C::L16 | C::La16 => ColorMode::Integer,
        C::Rgb8 | C::Rgb16 | C::Bgr8 => ColorMode::TrueColor,
        C::Rgba8 | C::Rgba16 | C::Bgra8 => ColorMode::TrueColorAlpha,
        C::Rgb32F | C::Rgba32F => ColorMode::Float,
        C::Cmyk8 => ColorMode::Cmyk,
        // Unknown sub-byte layouts are indexed formats in practice
        _ => ColorMode::Palette,
    }
}

fn decode_error(e: image::ImageError) -> SourceError {
    SourceError::Decode(e.to_string())
}

fn probe_reader<R: BufRead + Seek>(reader: ImageReader<R>) -> Result<(u32, u32, ColorMode), SourceError> {
    let reader = reader
        .with_guessed_format()
        .map_err(|e| SourceError::Io(e.to_string()))?;
    let decoder = reader.into_decoder().map_err(decode_error)?;
    let (width, height) = decoder.dimensions();
    Ok((width, height, color_mode_of(decoder.original_color_type())))
}

fn decode_reader<R: BufRead + Seek>(reader: ImageReader<R>) -> Result<SourceImage, SourceError> {
    let reader = reader
        .with_guessed_format()
        .map_err(|e| SourceError::Io(e.to_string()))?;
    let decoder = reader.into_decoder().map_err(decode_error)?;
    let mode = color_mode_of(decoder.original_color_type());
    let image = DynamicImage::from_decoder(decoder).map_err(decode_error)?;
    Ok(SourceImage::new(image, mode))
}

/// Read dimensions and mode from an in-memory encoded image.
pub fn probe_bytes(data: &[u8]) -> Result<(u32, u32, ColorMode), SourceError> {
    probe_reader(ImageReader::new(Cursor::new(data)))
}

/// Decode an in-memory encoded image.
pub fn decode_bytes(data: &[u8]) -> Result<SourceImage, SourceError> {
    decode_reader(ImageReader::new(Cursor::new(data)))
}

/// Read dimensions and mode from a file. Blocking.
pub(super) fn probe_file(path: &std::path::Path) -> Result<(u32, u32, ColorMode), SourceError> {
    let reader = ImageReader::open(path).map_err(|e| io_error(path, e))?;
    probe_reader(reader)
}

/// Decode a file. Blocking.
pub(super) fn decode_file(path: &std::path::Path) -> Result<SourceImage, SourceError> {
    let reader = ImageReader::open(path).map_err(|e| io_error(path, e))?;
    decode_reader(reader)
}

fn io_error(path: &std::path::Path, e: std::io::Error) -> SourceError {
    if e.kind() == std::io::ErrorKind::NotFound {
        SourceError::NotFound(path.display().to_string())
    } else {
        SourceError::Io(format!("{}: {}", path.display(), e))
    }
}
