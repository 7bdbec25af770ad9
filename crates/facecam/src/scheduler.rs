//! The detect-or-track decision.
//!
//! Every admitted frame runs exactly one of two operations: full-frame face detection when there
//! is no face to follow, or incremental tracking of the last known face otherwise. The
//! [`Scheduler`] picks the operation and folds the results back into its [`TrackingState`].
//!
//! Since several operations may be in flight at once, results are applied in the order they
//! *complete*, not the order their frames were captured in. A late result simply overwrites
//! whatever the previous one established.

use crate::{
    backend::{SequenceId, TrackRequest},
    region::Region,
};

/// The operation to run on an admitted frame.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Run the [`Detector`][crate::backend::Detector] on the whole frame.
    Detect,
    /// Run the [`Tracker`][crate::backend::Tracker], seeded with the current anchor.
    Track(TrackRequest),
}

/// The result of an [`Operation`], as reported by the backend.
///
/// Backend errors are kept so they can be logged, but are otherwise treated like an empty result.
#[derive(Debug)]
pub enum Outcome {
    Detected(anyhow::Result<Vec<Region>>),
    Tracked(anyhow::Result<Option<Region>>),
}

/// Which kind of operation the next frame will run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NeedsDetection,
    Tracking,
}

/// What happens when the tracking age exceeds the configured maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AgeLimit {
    /// Discard the anchor, so that the next frame runs a full detection.
    #[default]
    Redetect,
    /// Reset the age counter, but keep tracking the current anchor.
    KeepTracking,
}

/// The face currently being tracked, if any.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrackingState {
    anchor: Option<Region>,
    age: u32,
}

impl TrackingState {
    /// The last region observed by a detection or tracking update.
    pub fn anchor(&self) -> Option<Region> {
        self.anchor
    }

    /// The number of consecutive successful observations since tracking was last lost.
    pub fn age(&self) -> u32 {
        self.age
    }

    pub fn phase(&self) -> Phase {
        match self.anchor {
            Some(_) => Phase::Tracking,
            None => Phase::NeedsDetection,
        }
    }

    fn lose(&mut self) {
        self.anchor = None;
        self.age = 0;
    }
}

/// Decides between detection and tracking for every admitted frame.
///
/// Must only be accessed from one thread; the pipeline keeps it on its coordinator thread.
#[derive(Debug)]
pub struct Scheduler {
    state: TrackingState,
    max_age: u32,
    age_limit: AgeLimit,
    /// Created on the first tracking request after a detection.
    sequence: Option<SequenceId>,
    next_sequence: u64,
}

impl Scheduler {
    pub const DEFAULT_MAX_TRACKING_AGE: u32 = 15;

    /// Creates a scheduler that starts out needing a detection.
    ///
    /// `max_age` is the highest tracking age that is kept. The observation that would push the age
    /// above it wraps the age back to 0 instead.
    pub fn new(max_age: u32) -> Self {
        Self {
            state: TrackingState::default(),
            max_age,
            age_limit: AgeLimit::default(),
            sequence: None,
            next_sequence: 0,
        }
    }

    /// Sets what happens when the tracking age wraps.
    ///
    /// By default, [`AgeLimit::Redetect`] is used.
    pub fn set_age_limit(&mut self, age_limit: AgeLimit) {
        self.age_limit = age_limit;
    }

    pub fn state(&self) -> &TrackingState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    /// Picks the operation to run on the next admitted frame.
    ///
    /// Choosing [`Operation::Detect`] ends the current tracking sequence. The next
    /// [`Operation::Track`] afterwards starts a new one.
    pub fn next_operation(&mut self) -> Operation {
        match self.state.anchor {
            Some(anchor) => {
                let next_sequence = &mut self.next_sequence;
                let sequence = *self.sequence.get_or_insert_with(|| {
                    let id = SequenceId(*next_sequence);
                    *next_sequence += 1;
                    log::trace!("starting tracking sequence {id}");
                    id
                });
                Operation::Track(TrackRequest { anchor, sequence })
            }
            None => {
                self.sequence = None;
                Operation::Detect
            }
        }
    }

    /// Applies the result of a finished operation, returning the regions to present.
    pub fn apply(&mut self, outcome: Outcome) -> Vec<Region> {
        match outcome {
            Outcome::Detected(result) => {
                let regions = match result {
                    Ok(regions) => regions,
                    Err(e) => {
                        log::warn!("face detection failed: {e:#}");
                        Vec::new()
                    }
                };
                match regions.first() {
                    Some(&best) => {
                        log::trace!("detected {} face(s), tracking {:?}", regions.len(), best);
                        self.state.anchor = Some(best);
                        self.state.age = 1;
                    }
                    None => self.state.lose(),
                }
                regions
            }
            Outcome::Tracked(result) => {
                let region = match result {
                    Ok(region) => region,
                    Err(e) => {
                        log::warn!("face tracking failed: {e:#}");
                        None
                    }
                };
                match region {
                    Some(region) => {
                        self.state.anchor = Some(region);
                        self.state.age += 1;
                        if self.state.age > self.max_age {
                            self.state.age = 0;
                            if self.age_limit == AgeLimit::Redetect {
                                log::debug!("tracking age limit reached, redetecting");
                                self.state.anchor = None;
                            }
                        }
                        vec![region]
                    }
                    None => {
                        log::trace!("lost track after {} update(s)", self.state.age);
                        self.state.lose();
                        Vec::new()
                    }
                }
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_TRACKING_AGE)
    }
}
