//! Rotation parameter: clockwise angle with optional horizontal mirror.

use crate::error::IiifError;

/// Validated rotation: angle in `[0, 360)` and a mirror flag.
///
/// When mirrored, the image is flipped horizontally before it is rotated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotation {
    pub angle: f64,
    pub mirrored: bool,
}

impl Rotation {
    /// No rotation, no mirror.
    pub const NONE: Rotation = Rotation {
        angle: 0.0,
        mirrored: false,
    };

    /// Parse a raw rotation that already matched the grammar.
    pub fn parse(raw: &str) -> Result<Self, IiifError> {
        let (mirrored, digits) = match raw.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let angle = digits
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| IiifError::malformed("rotation", raw))?;

        Ok(Self::new(angle, mirrored))
    }

    /// Build a rotation, normalizing the angle into `[0, 360)`.
    pub fn new(angle: f64, mirrored: bool) -> Self {
        let mut angle = angle.rem_euclid(360.0);
        // rem_euclid can round up to exactly 360.0 for tiny negative inputs
        if angle >= 360.0 {
            angle = 0.0;
        }
        Self {
            angle: angle + 0.0,
            mirrored,
        }
    }

    /// Number of clockwise quarter turns if the angle is a multiple of 90.
    pub fn quarter_turns(&self) -> Option<u8> {
        let turns = self.angle / 90.0;
        if turns.fract() == 0.0 {
            Some(turns as u8)
        } else {
            None
        }
    }

    /// Whether applying this rotation changes nothing.
    pub fn is_identity(&self) -> bool {
        !self.mirrored && self.angle == 0.0
    }

    /// Bit pattern of the normalized angle, for hashing.
    pub fn angle_bits(&self) -> u64 {
        self.angle.to_bits()
    }
}

impl Default for Rotation {
    fn default() -> Self {
        Self::NONE
    }
}
