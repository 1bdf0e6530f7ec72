//! Region parameter: which part of the source image to crop.

use crate::error::IiifError;

/// Validated region descriptor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RegionSpec {
    /// The entire image
    Full,

    /// Absolute pixel rectangle `x,y,w,h`
    Pixels { x: f64, y: f64, w: f64, h: f64 },

    /// Percentage rectangle `pct:x,y,w,h`
    Percent { x: f64, y: f64, w: f64, h: f64 },
}

/// Absolute crop rectangle, clipped to the source bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    /// Rectangle covering a whole image.
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    /// Whether this rectangle covers an entire `width` x `height` image.
    pub fn is_full(&self, width: u32, height: u32) -> bool {
        *self == Self::full(width, height)
    }
}

impl RegionSpec {
    /// Parse a raw region that already matched the grammar.
    pub fn parse(raw: &str) -> Result<Self, IiifError> {
        if raw == "full" {
            return Ok(RegionSpec::Full);
        }

        let (is_percent, body) = match raw.strip_prefix("pct:") {
            Some(rest) => (true, rest),
            None => (false, raw),
        };

        let mut values = [0f64; 4];
        let mut parts = body.split(',');
        for slot in values.iter_mut() {
            *slot = parts
                .next()
                .and_then(|p| p.parse::<f64>().ok())
                .filter(|v| v.is_finite())
                .ok_or_else(|| IiifError::malformed("region", raw))?;
        }
        if parts.next().is_some() {
            return Err(IiifError::malformed("region", raw));
        }

        let [x, y, w, h] = values;
        Ok(if is_percent {
            RegionSpec::Percent { x, y, w, h }
        } else {
            RegionSpec::Pixels { x, y, w, h }
        })
    }

    /// Resolve against the source dimensions.
    ///
    /// Rectangles that partially exceed the image are clipped. A rectangle
    /// entirely outside the image, or one that is empty after clipping, is a
    /// geometry error.
    pub fn resolve(&self, width: u32, height: u32) -> Result<CropRect, IiifError> {
        let (x, y, w, h) = match *self {
            RegionSpec::Full => (0, 0, u64::from(width), u64::from(height)),
            RegionSpec::Pixels { x, y, w, h } => {
                (round_px(x), round_px(y), round_px(w), round_px(h))
            }
            RegionSpec::Percent { x, y, w, h } => {
                let sx = f64::from(width) / 100.0;
                let sy = f64::from(height) / 100.0;
                (
                    round_px(x * sx),
                    round_px(y * sy),
                    round_px(w * sx),
                    round_px(h * sy),
                )
            }
        };

        if x >= u64::from(width) || y >= u64::from(height) {
            return Err(IiifError::geometry(format!(
                "region ({}, {}) lies outside the {}x{} image",
                x, y, width, height
            )));
        }

        let right = x.saturating_add(w).min(u64::from(width));
        let bottom = y.saturating_add(h).min(u64::from(height));
        let clipped_w = right - x;
        let clipped_h = bottom - y;

        if clipped_w == 0 || clipped_h == 0 {
            return Err(IiifError::geometry(format!(
                "region is empty after clipping ({}x{})",
                clipped_w, clipped_h
            )));
        }

        // All values are bounded by the u32 source dimensions at this point.
        Ok(CropRect {
            x: x as u32,
            y: y as u32,
            width: clipped_w as u32,
            height: clipped_h as u32,
        })
    }
}

/// Round to the nearest whole pixel. Float-to-int casts saturate.
fn round_px(value: f64) -> u64 {
    value.round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_variants() {
        assert_eq!(RegionSpec::parse("full").unwrap(), RegionSpec::Full);
        assert_eq!(
            RegionSpec::parse("10,20,30,40").unwrap(),
            RegionSpec::Pixels {
                x: 10.0,
                y: 20.0,
                w: 30.0,
                h: 40.0
            }
        );
        assert_eq!(
            RegionSpec::parse("pct:0,0,50,50").unwrap(),
            RegionSpec::Percent {
                x: 0.0,
                y: 0.0,
                w: 50.0,
                h: 50.0
            }
        );
    }

    #[test]
    fn test_parse_rejects_bad_numbers() {
        assert!(matches!(
            RegionSpec::parse("1.2.3,0,10,10"),
            Err(IiifError::MalformedParameter { field: "region", .. })
        ));
        assert!(RegionSpec::parse("0,0,.,10").is_err());
    }

    #[test]
    fn test_full_is_whole_image() {
        let rect = RegionSpec::Full.resolve(640, 480).unwrap();
        assert_eq!(rect, CropRect::full(640, 480));
        assert!(rect.is_full(640, 480));
    }

    #[test]
    fn test_explicit_full_rect_equals_full() {
        let explicit = RegionSpec::parse("0,0,100,200").unwrap();
        assert_eq!(
            explicit.resolve(100, 200).unwrap(),
            RegionSpec::Full.resolve(100, 200).unwrap()
        );
    }

    #[test]
    fn test_percent_rounding() {
        let spec = RegionSpec::parse("pct:0,0,50,50").unwrap();
        assert_eq!(spec.resolve(200, 200).unwrap(), CropRect::full(100, 100));

        // 33.3% of 50 = 16.65 -> 17; 33.3% of 100 = 33.3 -> 33
        let spec = RegionSpec::parse("pct:10,10,33.3,33.3").unwrap();
        let rect = spec.resolve(50, 100).unwrap();
        assert_eq!(rect.x, 5);
        assert_eq!(rect.y, 10);
        assert_eq!(rect.width, 17);
        assert_eq!(rect.height, 33);
    }

    #[test]
    fn test_partial_overlap_is_clipped() {
        let spec = RegionSpec::parse("50,50,100,100").unwrap();
        let rect = spec.resolve(80, 60).unwrap();
        assert_eq!(
            rect,
            CropRect {
                x: 50,
                y: 50,
                width: 30,
                height: 10
            }
        );
    }

    #[test]
    fn test_outside_image_fails() {
        let spec = RegionSpec::parse("100,0,10,10").unwrap();
        assert!(matches!(
            spec.resolve(100, 100),
            Err(IiifError::Geometry { .. })
        ));

        let spec = RegionSpec::parse("pct:100,0,10,10").unwrap();
        assert!(spec.resolve(100, 100).is_err());
    }

    #[test]
    fn test_zero_size_fails() {
        let spec = RegionSpec::parse("0,0,0,10").unwrap();
        assert!(matches!(
            spec.resolve(100, 100),
            Err(IiifError::Geometry { .. })
        ));

        // 0.4% of 100 rounds to 0
        let spec = RegionSpec::parse("pct:0,0,0.4,50").unwrap();
        assert!(spec.resolve(100, 100).is_err());
    }

    #[test]
    fn test_huge_values_saturate() {
        let spec = RegionSpec::parse("0,0,99999999999999999999,10").unwrap();
        let rect = spec.resolve(100, 100).unwrap();
        assert_eq!(rect.width, 100);
        assert_eq!(rect.height, 10);
    }
}
