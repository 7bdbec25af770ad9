//! Showing results to the user.
//!
//! Actual drawing is left to a [`Presenter`] implementation. [`Overlay`] does the platform
//! independent part: placing the frame on the canvas, converting regions to canvas pixels, and
//! formatting the status labels.

use std::time::Duration;

use crate::{
    region::Region,
    resolution::{Rect, Resolution},
    scheduler::TrackingState,
};

/// Everything known about one finished detect/track operation.
#[derive(Debug, Clone)]
pub struct Presentation {
    /// Faces to show. Empty if the operation found nothing or failed.
    pub regions: Vec<Region>,
    /// See [`Sample::latency`][crate::timing::Sample::latency].
    pub latency: Option<Duration>,
    /// Delivered results per second.
    pub fps: f64,
    /// Resolution of the camera frames.
    pub frame: Resolution,
    /// Tracking state after the result was applied.
    pub tracking: TrackingState,
}

/// Receives every result of the pipeline, in completion order.
///
/// Presenters run on the pipeline's coordinator thread. Blocking in
/// [`Presenter::present`] delays the release of the operation's permit, and thus the admission of
/// new frames.
pub trait Presenter: Send {
    fn present(&mut self, presentation: &Presentation);
}

impl<F: FnMut(&Presentation) + Send> Presenter for F {
    fn present(&mut self, presentation: &Presentation) {
        self(presentation)
    }
}

/// Canvas layout for one [`Presentation`].
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    image_rect: Rect,
    boxes: Vec<Rect>,
    prediction: String,
    timing: String,
}

impl Overlay {
    /// Lays out `presentation` on a canvas of size `canvas`.
    ///
    /// The frame is scaled to fit the canvas while keeping its aspect ratio.
    pub fn layout(presentation: &Presentation, canvas: Resolution) -> Self {
        let image_rect = match presentation.frame.aspect_ratio() {
            Some(ratio) => canvas.fit_aspect_ratio(ratio),
            None => canvas.rect(),
        };
        Self {
            image_rect,
            boxes: presentation
                .regions
                .iter()
                .map(|region| face_rect(region, image_rect))
                .collect(),
            prediction: prediction_label(&presentation.regions),
            timing: timing_label(presentation.latency, presentation.fps),
        }
    }

    /// The part of the canvas the camera frame is shown in.
    pub fn image_rect(&self) -> Rect {
        self.image_rect
    }

    /// Bounding boxes to draw, in canvas pixels.
    pub fn boxes(&self) -> &[Rect] {
        &self.boxes
    }

    pub fn prediction_label(&self) -> &str {
        &self.prediction
    }

    pub fn timing_label(&self) -> &str {
        &self.timing
    }
}

/// Maps a normalized, bottom-up `region` into `image_rect` on the canvas.
///
/// Invalid regions end up on [`Rect::OFF_CANVAS`].
pub fn face_rect(region: &Region, image_rect: Rect) -> Rect {
    if !region.is_valid() {
        return Rect::OFF_CANVAS;
    }

    let w = region.width() * image_rect.width();
    let h = region.height() * image_rect.height();
    let x = image_rect.x() + region.x() * image_rect.width();
    let y = image_rect.bottom() - region.y() * image_rect.height() - h;
    Rect::new(x, y, w, h)
}

/// Coordinates of the last region, or `No Face`.
pub fn prediction_label(regions: &[Region]) -> String {
    match regions.last() {
        Some(region) => region.to_string(),
        None => "No Face".into(),
    }
}

pub fn timing_label(latency: Option<Duration>, fps: f64) -> String {
    match latency {
        Some(latency) => format!(
            "Elapsed {:.5} seconds - {:.2} FPS",
            latency.as_secs_f64(),
            fps
        ),
        None => format!("Elapsed ? seconds - {fps:.2} FPS"),
    }
}

/// A [`Presenter`] that logs the overlay labels.
pub struct LogPresenter {
    canvas: Resolution,
}

impl LogPresenter {
    /// Creates a presenter laying out results on a canvas of size `canvas`.
    pub fn new(canvas: Resolution) -> Self {
        Self { canvas }
    }
}

impl Presenter for LogPresenter {
    fn present(&mut self, presentation: &Presentation) {
        let overlay = Overlay::layout(presentation, self.canvas);
        log::info!(
            "{} | {} | {} box(es), tracking age {}",
            overlay.prediction_label(),
            overlay.timing_label(),
            overlay.boxes().len(),
            presentation.tracking.age(),
        );
        for rect in overlay.boxes() {
            log::trace!("box {:?}", rect);
        }
    }
}
