//! The threaded detect/track pipeline.
//!
//! Frames flow through the pipeline as follows:
//!
//! 1. The camera thread calls [`Pipeline::on_frame`]. The [`FrameRateGate`] drops the frame if it
//!    arrives too early, then the [`ConcurrencyLimiter`] blocks until an operation slot is free.
//! 2. The coordinator thread records the admission time and asks the [`Scheduler`] whether to
//!    detect or track. All mutable pipeline state lives on this thread.
//! 3. A pool thread runs the [`Detector`] or [`Tracker`] on the frame.
//! 4. The result travels back to the coordinator, which applies it to the [`Scheduler`], records
//!    timing, hands everything to the [`Presenter`] and finally releases the permit.

use std::{
    any::Any,
    env, fmt, io,
    panic::{catch_unwind, AssertUnwindSafe},
    str::FromStr,
    sync::Arc,
    time::Instant,
};

use anyhow::anyhow;

use crate::{
    backend::{Detector, Tracker},
    frame::Frame,
    gate::FrameRateGate,
    limiter::{ConcurrencyLimiter, Permit},
    present::{Presentation, Presenter},
    resolution::Resolution,
    scheduler::{AgeLimit, Operation, Outcome, Scheduler},
    timer::Timer,
    timing::TimingCollector,
    worker::{promise, Mailbox, Promise, Worker},
};

/// Configuration of a [`Pipeline`].
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    fps: u32,
    max_in_flight: usize,
    max_tracking_age: u32,
    age_limit: AgeLimit,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            fps: 50,
            max_in_flight: ConcurrencyLimiter::DEFAULT_CAPACITY,
            max_tracking_age: Scheduler::DEFAULT_MAX_TRACKING_AGE,
            age_limit: AgeLimit::default(),
        }
    }
}

impl PipelineOptions {
    /// Returns the default options, overridden by any `FACECAM_*` environment variables.
    ///
    /// Invalid values are logged and ignored.
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Some(fps) = env_var("FACECAM_FPS") {
            options.fps = fps;
        }
        if let Some(max_in_flight) = env_var("FACECAM_MAX_IN_FLIGHT") {
            options.max_in_flight = max_in_flight;
        }
        if let Some(max_tracking_age) = env_var("FACECAM_MAX_TRACKING_AGE") {
            options.max_tracking_age = max_tracking_age;
        }
        options
    }

    /// Sets the maximum rate at which frames are admitted.
    #[inline]
    pub fn fps(self, fps: u32) -> Self {
        Self { fps, ..self }
    }

    /// Sets the maximum number of detect/track operations running at the same time.
    #[inline]
    pub fn max_in_flight(self, max_in_flight: usize) -> Self {
        Self {
            max_in_flight,
            ..self
        }
    }

    /// Sets the tracking age at which the age counter wraps.
    #[inline]
    pub fn max_tracking_age(self, max_tracking_age: u32) -> Self {
        Self {
            max_tracking_age,
            ..self
        }
    }

    /// Selects what happens when the tracking age wraps.
    #[inline]
    pub fn age_limit(self, age_limit: AgeLimit) -> Self {
        Self { age_limit, ..self }
    }
}

fn env_var<T>(name: &str) -> Option<T>
where
    T: FromStr + PartialOrd + Default,
    T::Err: fmt::Display,
{
    let value = env::var(name).ok()?;
    match value.trim().parse::<T>() {
        Ok(parsed) if parsed > T::default() => Some(parsed),
        Ok(_) => {
            log::warn!("ignoring {name}={value:?}: must be greater than zero");
            None
        }
        Err(e) => {
            log::warn!("ignoring {name}={value:?}: {e}");
            None
        }
    }
}

enum Event {
    Admitted {
        resolution: Resolution,
        decision: Promise<Operation>,
    },
    Completed {
        outcome: Outcome,
        permit: Permit,
    },
}

struct Job {
    frame: Frame,
    operation: Operation,
    permit: Permit,
}

/// A running face detection and tracking pipeline.
///
/// Dropping the pipeline waits for all in-flight operations to be presented, then shuts down its
/// threads.
pub struct Pipeline {
    gate: FrameRateGate,
    limiter: ConcurrencyLimiter,
    // Drop order matters: pool threads hold mailboxes to the coordinator, so the pool has to be
    // joined first.
    pool: Worker<Job>,
    coordinator: Worker<Event>,
}

impl Pipeline {
    /// Starts the coordinator and backend threads.
    ///
    /// # Panics
    ///
    /// This method will panic if the configured frame rate or operation limit is 0.
    pub fn spawn<D, T, P>(
        options: PipelineOptions,
        detector: D,
        tracker: T,
        presenter: P,
    ) -> io::Result<Self>
    where
        D: Detector + 'static,
        T: Tracker + 'static,
        P: Presenter + 'static,
    {
        log::debug!("starting pipeline with {:?}", options);

        let gate = FrameRateGate::new(options.fps);
        let limiter = ConcurrencyLimiter::new(options.max_in_flight);

        let t_detect = Arc::new(Timer::new("detect"));
        let t_track = Arc::new(Timer::new("track"));

        let mut scheduler = Scheduler::new(options.max_tracking_age);
        scheduler.set_age_limit(options.age_limit);
        let mut coordinator = Coordinator {
            scheduler,
            timing: TimingCollector::new(),
            resolution: None,
            presenter: Box::new(presenter),
            timers: [t_detect.clone(), t_track.clone()],
        };
        let coordinator = Worker::builder()
            .name("coordinator")
            // One admission at a time, plus one completion per permit.
            .capacity(options.max_in_flight + 1)
            .spawn(move |event| coordinator.handle(event))?;

        let detector = Arc::new(detector);
        let tracker = Arc::new(tracker);
        let pool = Worker::builder()
            .name("detect/track")
            .capacity(options.max_in_flight)
            .spawn_pool(options.max_in_flight, |_| {
                let detector = detector.clone();
                let tracker = tracker.clone();
                let t_detect = t_detect.clone();
                let t_track = t_track.clone();
                let mailbox = coordinator.mailbox();
                move |job: Job| {
                    run_job(job, &*detector, &*tracker, &t_detect, &t_track, &mailbox)
                }
            })?;

        Ok(Self {
            gate,
            limiter,
            pool,
            coordinator,
        })
    }

    /// Returns the pipeline's operation limiter.
    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    /// Offers a camera frame to the pipeline.
    ///
    /// Returns `false` if the frame was dropped by the rate gate. Otherwise, this blocks until an
    /// operation slot is free, starts detection or tracking on the frame, and returns `true`.
    ///
    /// Must not be called from more than one thread at a time, which `&mut self` enforces.
    pub fn on_frame(&mut self, frame: Frame) -> bool {
        if !self.gate.admit(frame.timestamp()) {
            return false;
        }

        let permit = self.limiter.acquire();
        let (decision, operation) = promise();
        self.coordinator.send(Event::Admitted {
            resolution: frame.resolution(),
            decision,
        });
        let Ok(operation) = operation.block() else {
            log::error!("coordinator exited, dropping frame");
            return false;
        };

        self.pool.send(Job {
            frame,
            operation,
            permit,
        });
        true
    }

    /// Waits for all in-flight operations to be presented, then joins all threads.
    pub fn finish(self) {
        drop(self);
    }
}

/// Runs the backend for one job on a pool thread and reports back to the coordinator.
fn run_job<D: Detector + ?Sized, T: Tracker + ?Sized>(
    job: Job,
    detector: &D,
    tracker: &T,
    t_detect: &Timer,
    t_track: &Timer,
    coordinator: &Mailbox<Event>,
) {
    let Job {
        frame,
        operation,
        permit,
    } = job;

    let outcome = match operation {
        Operation::Detect => {
            Outcome::Detected(t_detect.time(|| contain_panic(|| detector.detect(&frame))))
        }
        Operation::Track(request) => Outcome::Tracked(
            t_track.time(|| contain_panic(|| tracker.track(&frame, &request))),
        ),
    };
    drop(frame);

    if coordinator
        .send(Event::Completed { outcome, permit })
        .is_err()
    {
        log::error!("coordinator exited, discarding result");
    }
}

/// Turns a backend panic into an error, so that it is handled like any other backend failure.
fn contain_panic<T>(op: impl FnOnce() -> anyhow::Result<T>) -> anyhow::Result<T> {
    catch_unwind(AssertUnwindSafe(op))
        .unwrap_or_else(|payload| Err(anyhow!("backend panicked: {}", panic_message(&*payload))))
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "<non-string payload>"
    }
}

/// State owned by the coordinator thread.
struct Coordinator {
    scheduler: Scheduler,
    timing: TimingCollector,
    /// Taken from the first admitted frame.
    resolution: Option<Resolution>,
    presenter: Box<dyn Presenter>,
    timers: [Arc<Timer>; 2],
}

impl Coordinator {
    fn handle(&mut self, event: Event) {
        match event {
            Event::Admitted {
                resolution,
                decision,
            } => {
                if self.resolution.is_none() {
                    log::debug!("frame resolution: {resolution}");
                    self.resolution = Some(resolution);
                }
                self.timing.admit(Instant::now());
                decision.fulfill(self.scheduler.next_operation());
            }
            Event::Completed { outcome, permit } => {
                let regions = self.scheduler.apply(outcome);
                let sample = self
                    .timing
                    .complete(Instant::now(), self.timers.iter().map(|t| &**t));
                self.presenter.present(&Presentation {
                    regions,
                    latency: sample.latency,
                    fps: sample.fps,
                    frame: self.resolution.unwrap_or(Resolution::new(0, 0)),
                    tracking: *self.scheduler.state(),
                });
                drop(permit);
            }
        }
    }
}
