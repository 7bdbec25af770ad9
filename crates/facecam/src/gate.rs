//! Frame rate throttling.
//!
//! Cameras look bad in the preview when their capture rate is lowered, so they keep capturing at
//! full speed and [`FrameRateGate`] drops the frames the rest of the pipeline does not want.

use std::time::Duration;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Drops frames that arrive faster than a target rate.
///
/// Dropped frames are not queued anywhere. Admitting frames does not guarantee that the target
/// rate is actually reached, that depends on the camera.
#[derive(Debug, Clone)]
pub struct FrameRateGate {
    fps: u32,
    last: Option<Duration>,
}

impl FrameRateGate {
    /// Creates a gate admitting at most `fps` frames per second.
    ///
    /// # Panics
    ///
    /// This method will panic if `fps` is 0.
    pub fn new(fps: u32) -> Self {
        assert!(fps > 0, "frame rate gate needs a nonzero rate");
        Self { fps, last: None }
    }

    #[inline]
    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Decides whether the frame captured at `timestamp` is passed on.
    ///
    /// The first frame is always admitted. After that, a frame is admitted if at least `1/fps`
    /// seconds have passed since the last *admitted* frame. Timestamps going backwards are not an
    /// error, such frames are simply dropped.
    pub fn admit(&mut self, timestamp: Duration) -> bool {
        let admit = match self.last {
            None => true,
            Some(last) => match timestamp.checked_sub(last) {
                // `delta >= 1/fps`, without rounding `1/fps` to whole nanoseconds.
                Some(delta) => delta.as_nanos() * u128::from(self.fps) >= NANOS_PER_SEC,
                None => false,
            },
        };

        if admit {
            self.last = Some(timestamp);
        }
        admit
    }
}
