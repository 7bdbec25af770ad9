//! Runs the pipeline against a synthetic camera and simulated backends, logging every result.

use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use facecam::{
    backend::{Detector, TrackRequest, Tracker},
    frame::{Frame, FrameSource},
    present::LogPresenter,
    region::Region,
    resolution::Resolution,
    timer::FpsCounter,
    Pipeline, PipelineOptions,
};
use image::RgbaImage;

const CAMERA_FPS: u32 = 60;

/// A camera delivering a blank portrait frame at a fixed rate.
struct SyntheticCamera {
    image: Arc<RgbaImage>,
    start: Instant,
    next: Instant,
    interval: Duration,
}

impl SyntheticCamera {
    fn new(resolution: Resolution, fps: u32) -> Self {
        let now = Instant::now();
        Self {
            image: Arc::new(RgbaImage::new(resolution.width(), resolution.height())),
            start: now,
            next: now,
            interval: Duration::from_secs(1) / fps,
        }
    }
}

impl FrameSource for SyntheticCamera {
    fn read(&mut self) -> anyhow::Result<Frame> {
        let now = Instant::now();
        if let Some(wait) = self.next.checked_duration_since(now) {
            thread::sleep(wait);
        }
        let captured = Instant::now();
        self.next = captured + self.interval;
        Ok(Frame::new(self.image.clone(), captured - self.start))
    }
}

/// Where the simulated face is at `t`: slowly circling the middle of the frame.
fn face_at(t: Duration) -> Region {
    let t = t.as_secs_f32() * 0.5;
    Region::new(0.4 + 0.2 * t.sin(), 0.4 + 0.2 * t.cos(), 0.2, 0.2)
}

struct SimulatedDetector {
    latency: Duration,
}

impl Detector for SimulatedDetector {
    fn detect(&self, frame: &Frame) -> anyhow::Result<Vec<Region>> {
        thread::sleep(self.latency);
        let t = frame.timestamp();
        // Look away from the camera for a bit every few seconds.
        if t.as_secs() % 5 == 4 {
            return Ok(Vec::new());
        }
        Ok(vec![face_at(t).with_confidence(0.98)])
    }
}

struct SimulatedTracker {
    latency: Duration,
    /// Largest per-update movement the tracker can follow.
    max_step: f32,
}

impl Tracker for SimulatedTracker {
    fn track(&self, frame: &Frame, request: &TrackRequest) -> anyhow::Result<Option<Region>> {
        thread::sleep(self.latency);
        let t = frame.timestamp();
        if t.as_secs() % 5 == 4 {
            return Ok(None);
        }
        let face = face_at(t);
        let anchor = request.anchor();
        let step = (face.x() - anchor.x()).hypot(face.y() - anchor.y());
        if step > self.max_step {
            log::trace!("sequence {}: moved {step:.3}, lost", request.sequence());
            return Ok(None);
        }
        Ok(Some(face))
    }
}

fn main() -> anyhow::Result<()> {
    facecam::init_logger!();

    let resolution = Resolution::new(720, 1280);
    let mut pipeline = Pipeline::spawn(
        PipelineOptions::from_env(),
        SimulatedDetector {
            latency: Duration::from_millis(45),
        },
        SimulatedTracker {
            latency: Duration::from_millis(8),
            max_step: 0.05,
        },
        LogPresenter::new(resolution),
    )?;

    let mut camera = SyntheticCamera::new(resolution, CAMERA_FPS);
    let mut fps = FpsCounter::new("camera");
    loop {
        let frame = camera.read()?;
        pipeline.on_frame(frame);
        fps.tick_with([format!("{} in flight", pipeline.limiter().in_flight())]);
    }
}
