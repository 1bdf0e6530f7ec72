//! Size parameter: output dimensions after cropping.

use crate::error::IiifError;

/// Validated size descriptor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizeSpec {
    /// Keep the cropped size
    Full,

    /// `w,` - width fixed, height follows the aspect ratio
    Width(f64),

    /// `,h` - height fixed, width follows the aspect ratio
    Height(f64),

    /// `w,h` - exact dimensions, may distort
    Exact { w: f64, h: f64 },

    /// `pct:n` - both dimensions scaled by n/100
    Percent(f64),

    /// `!w,h` - largest aspect-preserving size that fits the box
    BestFit { w: f64, h: f64 },
}

impl SizeSpec {
    /// Parse a raw size that already matched the grammar.
    pub fn parse(raw: &str) -> Result<Self, IiifError> {
        let number = |s: &str| -> Result<f64, IiifError> {
            s.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| IiifError::malformed("size", raw))
        };

        if raw == "full" {
            return Ok(SizeSpec::Full);
        }
        if let Some(pct) = raw.strip_prefix("pct:") {
            return Ok(SizeSpec::Percent(number(pct)?));
        }

        let (best_fit, body) = match raw.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let (w, h) = body
            .split_once(',')
            .ok_or_else(|| IiifError::malformed("size", raw))?;

        match (w.is_empty(), h.is_empty()) {
            (false, true) if !best_fit => Ok(SizeSpec::Width(number(w)?)),
            (true, false) if !best_fit => Ok(SizeSpec::Height(number(h)?)),
            (false, false) => {
                let (w, h) = (number(w)?, number(h)?);
                Ok(if best_fit {
                    SizeSpec::BestFit { w, h }
                } else {
                    SizeSpec::Exact { w, h }
                })
            }
            _ => Err(IiifError::malformed("size", raw)),
        }
    }

    /// Compute target dimensions for a `width` x `height` input.
    ///
    /// Scaled dimensions round to the nearest pixel with a 1px floor. An
    /// explicitly requested zero dimension is a geometry error.
    pub fn resolve(&self, width: u32, height: u32) -> Result<(u32, u32), IiifError> {
        let (cw, ch) = (f64::from(width), f64::from(height));
        if width == 0 || height == 0 {
            return Err(IiifError::geometry(format!(
                "cannot size an empty {}x{} image",
                width, height
            )));
        }

        match *self {
            SizeSpec::Full => Ok((width, height)),
            SizeSpec::Width(w) => {
                let w = requested(w, "width")?;
                Ok((w, scaled(ch * f64::from(w) / cw)))
            }
            SizeSpec::Height(h) => {
                let h = requested(h, "height")?;
                Ok((scaled(cw * f64::from(h) / ch), h))
            }
            SizeSpec::Exact { w, h } => Ok((requested(w, "width")?, requested(h, "height")?)),
            SizeSpec::Percent(pct) => {
                if pct <= 0.0 {
                    return Err(IiifError::geometry("size percentage must be positive"));
                }
                let factor = pct / 100.0;
                Ok((scaled(cw * factor), scaled(ch * factor)))
            }
            SizeSpec::BestFit { w, h } => {
                let (bw, bh) = (requested(w, "width")?, requested(h, "height")?);
                let scale = (f64::from(bw) / cw).min(f64::from(bh) / ch);
                Ok((
                    scaled(cw * scale).min(bw),
                    scaled(ch * scale).min(bh),
                ))
            }
        }
    }
}

/// Round an explicitly requested dimension; zero is rejected.
fn requested(value: f64, axis: &str) -> Result<u32, IiifError> {
    let px = value.round();
    if px < 1.0 {
        return Err(IiifError::geometry(format!("requested {} is zero", axis)));
    }
    Ok(clamp_u32(px))
}

/// Round a derived dimension with a 1px floor.
fn scaled(value: f64) -> u32 {
    clamp_u32(value.round()).max(1)
}

fn clamp_u32(value: f64) -> u32 {
    value.clamp(0.0, f64::from(u32::MAX)) as u32
}
