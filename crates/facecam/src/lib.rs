//! Live camera face detection and tracking scheduler.
//!
//! Frames coming out of a [`FrameSource`] are throttled to a target rate, admitted into a bounded
//! number of concurrent detection or tracking operations, and the results are presented together
//! with per-result latency and the delivered frame rate.
//!
//! Full-frame detection is expensive, so it only runs when there is nothing to track. Once a face
//! has been found, subsequent frames run a cheaper incremental tracker seeded with the last known
//! region until tracking is lost or the tracking age limit is hit.
//!
//! # Coordinates
//!
//! [`Region`]s are normalized to the frame: `(0,0)` is the *bottom left* corner, and `1.0` spans
//! the whole width or height. [`present::Overlay`] converts them to top-down canvas pixels.
//!
//! # Environment Variables
//!
//! [`PipelineOptions::from_env`] reads the following overrides:
//!
//! * `FACECAM_FPS`: target admission rate in frames per second (default 50).
//! * `FACECAM_MAX_IN_FLIGHT`: maximum number of concurrently running detect/track operations
//!   (default 2).
//! * `FACECAM_MAX_TRACKING_AGE`: number of consecutive tracking updates before the tracking age
//!   wraps (default 15).
//!
//! [`FrameSource`]: frame::FrameSource
//! [`Region`]: region::Region
//! [`PipelineOptions::from_env`]: pipeline::PipelineOptions::from_env

use log::LevelFilter;

pub mod backend;
pub mod frame;
pub mod gate;
pub mod limiter;
pub mod pipeline;
pub mod present;
pub mod region;
pub mod resolution;
pub mod scheduler;
pub mod timer;
pub mod timing;
pub mod worker;

pub use pipeline::{Pipeline, PipelineOptions};

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = LevelFilter::Debug;
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_PKG_NAME")), log_level)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// The calling crate and facecam will log at *debug* level. `RUST_LOG` can override either.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
