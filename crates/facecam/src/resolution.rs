//! Frame and canvas resolutions, and pixel rectangles placed on them.

use std::fmt;

/// Resolution (`width x height`) of a camera frame or presentation canvas.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    width: u32,
    height: u32,
}

impl Resolution {
    /// 720p resolution: `1280x720`
    pub const RES_720P: Self = Self {
        width: 1280,
        height: 720,
    };

    /// Creates a new [`Resolution`] of `width x height`.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Computes the [`AspectRatio`] of this [`Resolution`].
    ///
    /// If `self` has a width or height of 0, `None` is returned.
    pub fn aspect_ratio(&self) -> Option<AspectRatio> {
        AspectRatio::new(self.width(), self.height())
    }

    /// Returns the rectangle covering all of `self`.
    pub fn rect(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width as f32, self.height as f32)
    }

    /// Computes a centered, maximally sized [`Rect`] that lies inside of `self` and has the given
    /// aspect ratio.
    ///
    /// This is where a frame of aspect ratio `ratio` ends up when it is scaled to fit a canvas of
    /// size `self` without cropping.
    pub fn fit_aspect_ratio(&self, ratio: AspectRatio) -> Rect {
        let to_ratio = match self.aspect_ratio() {
            Some(ratio) => ratio,
            None => return self.rect(),
        };

        let from_ratio = ratio.as_f32();
        let to_ratio = to_ratio.as_f32();
        let (width, height) = (self.width as f32, self.height as f32);

        let rect = if from_ratio > to_ratio {
            // Frame is wider than the canvas: letterboxing.
            let h = width / from_ratio;
            Rect::new(0.0, (height - h) / 2.0, width, h)
        } else {
            // Canvas is wider (or equal): pillarboxing.
            let w = height * from_ratio;
            Rect::new((width - w) / 2.0, 0.0, w, height)
        };

        log::trace!(
            "fit aspect ratio {} in resolution {} -> {:?}",
            ratio,
            self,
            rect
        );
        rect
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Ratio of a width to a height.
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct AspectRatio {
    // Invariant: `width` and `height` are nonzero and their GCD is 1.
    width: u32,
    height: u32,
}

impl AspectRatio {
    /// Creates the aspect ratio representing `width:height`.
    ///
    /// If either `width` or `height` is `0`, returns `None`.
    pub fn new(width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }

        let gcd = gcd(width, height);
        Some(Self {
            width: width / gcd,
            height: height / gcd,
        })
    }

    #[inline]
    pub fn as_f32(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

impl fmt::Debug for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

const fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b > 0 {
        let t = b;
        b = a % b;
        a = t;
    }

    a
}

/// A rectangle in canvas pixels. The origin is the top left corner, Y points down.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    x: f32,
    y: f32,
    w: f32,
    h: f32,
}

impl Rect {
    /// The rectangle invalid regions are drawn as. It lies just outside the canvas.
    pub const OFF_CANVAS: Self = Self {
        x: -1.0,
        y: -1.0,
        w: 1.0,
        h: 1.0,
    };

    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
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

    /// Y coordinate of the bottom edge.
    #[inline]
    pub fn bottom(&self) -> f32 {
        self.y + self.h
    }
}
