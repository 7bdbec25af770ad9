//! Latency and delivered frame rate of the detect/track pipeline.

use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use crate::timer::FpsCounter;

/// Timing information for one presented result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Time between the admission of the oldest outstanding frame and this result.
    ///
    /// `None` if no admission was outstanding, which indicates a result without a frame.
    pub latency: Option<Duration>,
    /// Rate at which results are currently being delivered.
    pub fps: f64,
}

/// Collects per-result latency and the delivered frame rate.
///
/// Operations may finish out of order, so latencies are not matched to the frame that produced a
/// result. Every result is instead attributed to the oldest admitted frame still outstanding. This
/// is exact when results arrive in admission order and a close approximation otherwise.
pub struct TimingCollector {
    pending: VecDeque<Instant>,
    fps: FpsCounter,
}

impl TimingCollector {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Creates a collector whose first frame rate window opens at `start`.
    pub fn starting_at(start: Instant) -> Self {
        Self {
            pending: VecDeque::new(),
            fps: FpsCounter::starting_at("delivered", start),
        }
    }

    /// Returns the number of admitted frames whose result has not been recorded yet.
    pub fn outstanding(&self) -> usize {
        self.pending.len()
    }

    /// Records that a frame was admitted at `now`.
    pub fn admit(&mut self, now: Instant) {
        self.pending.push_back(now);
    }

    /// Records that a result became available at `now`.
    ///
    /// `extra` is logged alongside the frame rate whenever a rate window closes.
    pub fn complete<D, I>(&mut self, now: Instant, extra: I) -> Sample
    where
        D: std::fmt::Display,
        I: IntoIterator<Item = D>,
    {
        let latency = match self.pending.pop_front() {
            Some(start) => Some(now.saturating_duration_since(start)),
            None => {
                log::warn!("result completed without an outstanding frame");
                None
            }
        };
        let fps = self.fps.tick_with_at(now, extra);
        Sample { latency, fps }
    }
}

impl Default for TimingCollector {
    fn default() -> Self {
        Self::new()
    }
}
