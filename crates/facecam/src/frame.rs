//! Captured camera frames and the sources producing them.

use std::{sync::Arc, time::Duration};

use image::RgbaImage;

use crate::resolution::Resolution;

/// An immutable, timestamped camera image.
///
/// Cloning a [`Frame`] is cheap, the pixel data is shared.
#[derive(Clone)]
pub struct Frame {
    image: Arc<RgbaImage>,
    timestamp: Duration,
}

impl Frame {
    /// Creates a frame captured at `timestamp`.
    ///
    /// `timestamp` is measured on the camera's monotonic clock. Its origin is arbitrary, only the
    /// difference between two frames of the same source is meaningful.
    pub fn new(image: impl Into<Arc<RgbaImage>>, timestamp: Duration) -> Self {
        Self {
            image: image.into(),
            timestamp,
        }
    }

    #[inline]
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    #[inline]
    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.image.width(), self.image.height())
    }
}

/// A camera or other producer of an endless stream of [`Frame`]s.
///
/// Sources cannot be restarted. Frames must be returned in capture order.
pub trait FrameSource {
    /// Reads the next frame, blocking until one is available.
    fn read(&mut self) -> anyhow::Result<Frame>;
}
