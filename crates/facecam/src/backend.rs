//! Face detection and object tracking backends.
//!
//! The actual computer vision happens elsewhere. The pipeline only needs to know that detection
//! finds any number of faces in a whole frame, and that tracking follows one known face from the
//! previous frame into the next one.
//!
//! Both are called from worker threads, possibly from several at once, so implementations need to
//! be [`Sync`]. Any closure with the right signature can serve as a backend.

use std::fmt;

use crate::{frame::Frame, region::Region};

/// Full-frame face detection.
pub trait Detector: Send + Sync {
    /// Finds faces in `frame`.
    ///
    /// The returned regions must be ordered by decreasing confidence: the first one becomes the
    /// tracking anchor. An empty list means that no face was found.
    fn detect(&self, frame: &Frame) -> anyhow::Result<Vec<Region>>;
}

/// Incremental single-object tracking.
pub trait Tracker: Send + Sync {
    /// Follows `request.anchor()` into `frame`.
    ///
    /// Returns `None` when the object was lost.
    fn track(&self, frame: &Frame, request: &TrackRequest) -> anyhow::Result<Option<Region>>;
}

impl<F> Detector for F
where
    F: Fn(&Frame) -> anyhow::Result<Vec<Region>> + Send + Sync,
{
    fn detect(&self, frame: &Frame) -> anyhow::Result<Vec<Region>> {
        self(frame)
    }
}

impl<F> Tracker for F
where
    F: Fn(&Frame, &TrackRequest) -> anyhow::Result<Option<Region>> + Send + Sync,
{
    fn track(&self, frame: &Frame, request: &TrackRequest) -> anyhow::Result<Option<Region>> {
        self(frame, request)
    }
}

/// Identifies a run of tracking requests that continue from the same detection.
///
/// A new sequence starts with the first tracking request after every full detection. Trackers
/// that keep state between frames should reset it when the sequence changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SequenceId(pub(crate) u64);

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Parameters of a single [`Tracker::track`] call.
#[derive(Debug, Clone, Copy)]
pub struct TrackRequest {
    pub(crate) anchor: Region,
    pub(crate) sequence: SequenceId,
}

impl TrackRequest {
    /// The last known location of the tracked object.
    #[inline]
    pub fn anchor(&self) -> Region {
        self.anchor
    }

    #[inline]
    pub fn sequence(&self) -> SequenceId {
        self.sequence
    }
}
