//! Normalized bounding regions produced by detectors and trackers.

use std::fmt;

/// An axis-aligned bounding box in normalized frame coordinates.
///
/// `x` and `y` locate the bottom left corner, `w` and `h` the extent, all nominally in `[0, 1]`.
/// Backends occasionally hand back garbage; a NaN `x` marks an invalid region that must still be
/// presentable (see [`Overlay`][crate::present::Overlay]).
#[derive(Clone, Copy, PartialEq)]
pub struct Region {
    x: f32,
    y: f32,
    w: f32,
    h: f32,
    confidence: Option<f32>,
}

impl Region {
    /// Creates a region from its bottom left corner and size.
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self {
            x,
            y,
            w,
            h,
            confidence: None,
        }
    }

    /// Attaches a detector confidence to this region.
    pub fn with_confidence(self, confidence: f32) -> Self {
        Self {
            confidence: Some(confidence),
            ..self
        }
    }

    #[inline]
    pub fn x(&self) -> f32 {
        self.x
    }

    #[inline]
    pub fn y(&self) -> f32 {
        self.y
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.w
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.h
    }

    #[inline]
    pub fn confidence(&self) -> Option<f32> {
        self.confidence
    }

    /// Returns `false` if this region carries the NaN sentinel.
    pub fn is_valid(&self) -> bool {
        !self.x.is_nan()
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Region({:.3},{:.3} {:.3}x{:.3}",
            self.x, self.y, self.w, self.h
        )?;
        if let Some(conf) = self.confidence {
            write!(f, " @{conf:.2}")?;
        }
        f.write_str(")")
    }
}

/// Formats the region the way the prediction label shows it: `x,y,w,h` with two decimals.
impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.2},{:.2},{:.2},{:.2}",
            self.x, self.y, self.w, self.h
        )
    }
}
