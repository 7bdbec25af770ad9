use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread,
    time::Duration,
};

use anyhow::bail;
use facecam::{
    backend::TrackRequest,
    frame::Frame,
    present::{Overlay, Presentation},
    region::Region,
    resolution::Resolution,
    scheduler::{AgeLimit, Phase},
    Pipeline, PipelineOptions,
};
use image::RgbaImage;

fn frame(timestamp: Duration) -> Frame {
    Frame::new(RgbaImage::new(64, 48), timestamp)
}

fn face() -> Region {
    Region::new(0.4, 0.4, 0.2, 0.2).with_confidence(0.9)
}

/// Returns a presenter that records everything, and the shared record.
fn recorder() -> (
    impl FnMut(&Presentation) + Send + 'static,
    Arc<Mutex<Vec<Presentation>>>,
) {
    let record = Arc::new(Mutex::new(Vec::new()));
    let presenter = {
        let record = record.clone();
        move |p: &Presentation| record.lock().unwrap().push(p.clone())
    };
    (presenter, record)
}

#[test]
fn gate_drops_fast_frames() {
    let (presenter, record) = recorder();
    let mut pipeline = Pipeline::spawn(
        PipelineOptions::default().fps(50),
        |_: &Frame| -> anyhow::Result<Vec<Region>> { Ok(vec![face()]) },
        |_: &Frame, req: &TrackRequest| -> anyhow::Result<Option<Region>> {
            Ok(Some(req.anchor()))
        },
        presenter,
    )
    .unwrap();

    // A 100 Hz camera: every other frame is admitted.
    let mut admitted = 0;
    for i in 0..40 {
        if pipeline.on_frame(frame(Duration::from_millis(i * 10))) {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 20);
    pipeline.finish();

    let record = record.lock().unwrap();
    assert_eq!(record.len(), 20);
    assert!(record.iter().all(|p| p.frame == Resolution::new(64, 48)));
    assert!(record.iter().all(|p| p.latency.is_some()));
    assert!(record.iter().all(|p| p.regions == vec![face()]));
}

#[test]
fn detect_then_track_with_age_wrap() {
    let detections = Arc::new(AtomicUsize::new(0));
    let tracks = Arc::new(AtomicUsize::new(0));
    let (presenter, record) = recorder();

    let mut pipeline = Pipeline::spawn(
        PipelineOptions::default().max_in_flight(1).max_tracking_age(15),
        {
            let detections = detections.clone();
            move |_: &Frame| -> anyhow::Result<Vec<Region>> {
                detections.fetch_add(1, Ordering::SeqCst);
                Ok(vec![face(), Region::new(0.0, 0.0, 0.1, 0.1)])
            }
        },
        {
            let tracks = tracks.clone();
            move |_: &Frame, req: &TrackRequest| -> anyhow::Result<Option<Region>> {
                tracks.fetch_add(1, Ordering::SeqCst);
                Ok(Some(req.anchor()))
            }
        },
        presenter,
    )
    .unwrap();

    for i in 0..32 {
        assert!(pipeline.on_frame(frame(Duration::from_millis(i * 20))));
    }
    pipeline.finish();

    // With one operation at a time, every decision sees the previous result.
    assert_eq!(detections.load(Ordering::SeqCst), 2);
    assert_eq!(tracks.load(Ordering::SeqCst), 30);

    let record = record.lock().unwrap();
    let ages = record.iter().map(|p| p.tracking.age()).collect::<Vec<_>>();
    let mut expected = (1..=15).collect::<Vec<u32>>();
    expected.push(0);
    expected.extend_from_within(..);
    assert_eq!(ages, expected);

    // Detections present every face, tracking only the followed one.
    assert_eq!(record[0].regions.len(), 2);
    assert_eq!(record[1].regions, vec![face()]);
}

#[test]
fn keep_tracking_after_wrap() {
    let detections = Arc::new(AtomicUsize::new(0));
    let (presenter, record) = recorder();

    let mut pipeline = Pipeline::spawn(
        PipelineOptions::default()
            .max_in_flight(1)
            .max_tracking_age(4)
            .age_limit(AgeLimit::KeepTracking),
        {
            let detections = detections.clone();
            move |_: &Frame| -> anyhow::Result<Vec<Region>> {
                detections.fetch_add(1, Ordering::SeqCst);
                Ok(vec![face()])
            }
        },
        |_: &Frame, req: &TrackRequest| -> anyhow::Result<Option<Region>> {
            Ok(Some(req.anchor()))
        },
        presenter,
    )
    .unwrap();

    for i in 0..12 {
        pipeline.on_frame(frame(Duration::from_millis(i * 20)));
    }
    pipeline.finish();

    assert_eq!(detections.load(Ordering::SeqCst), 1);
    let record = record.lock().unwrap();
    let ages = record.iter().map(|p| p.tracking.age()).collect::<Vec<_>>();
    assert_eq!(ages, [1, 2, 3, 4, 0, 1, 2, 3, 4, 0, 1, 2]);
    assert!(record.iter().all(|p| p.tracking.phase() == Phase::Tracking));
}

#[test]
fn failures_never_stop_the_pipeline() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (presenter, record) = recorder();

    let mut pipeline = Pipeline::spawn(
        PipelineOptions::default().max_in_flight(1),
        {
            let calls = calls.clone();
            move |_: &Frame| -> anyhow::Result<Vec<Region>> {
                match calls.fetch_add(1, Ordering::SeqCst) % 3 {
                    0 => bail!("no model loaded"),
                    1 => panic!("model exploded"),
                    _ => Ok(Vec::new()),
                }
            }
        },
        |_: &Frame, _: &TrackRequest| -> anyhow::Result<Option<Region>> {
            unreachable!("nothing is ever detected")
        },
        presenter,
    )
    .unwrap();

    for i in 0..9 {
        assert!(pipeline.on_frame(frame(Duration::from_millis(i * 20))));
    }
    assert_eq!(pipeline.limiter().capacity(), 1);
    pipeline.finish();

    assert_eq!(calls.load(Ordering::SeqCst), 9);
    let record = record.lock().unwrap();
    assert_eq!(record.len(), 9);
    for presentation in record.iter() {
        assert!(presentation.regions.is_empty());
        assert_eq!(presentation.tracking.phase(), Phase::NeedsDetection);
        let overlay = Overlay::layout(presentation, Resolution::RES_720P);
        assert_eq!(overlay.prediction_label(), "No Face");
    }
}

#[test]
fn lost_track_triggers_detection() {
    let detections = Arc::new(AtomicUsize::new(0));
    let (presenter, record) = recorder();

    let mut pipeline = Pipeline::spawn(
        PipelineOptions::default().max_in_flight(1),
        {
            let detections = detections.clone();
            move |_: &Frame| -> anyhow::Result<Vec<Region>> {
                detections.fetch_add(1, Ordering::SeqCst);
                Ok(vec![face()])
            }
        },
        // Loses the face on every third tracking step of a sequence.
        |_: &Frame, req: &TrackRequest| -> anyhow::Result<Option<Region>> {
            let x = req.anchor().x() + 0.01;
            if x > 0.425 {
                Ok(None)
            } else {
                Ok(Some(Region::new(x, 0.4, 0.2, 0.2)))
            }
        },
        presenter,
    )
    .unwrap();

    for i in 0..8 {
        pipeline.on_frame(frame(Duration::from_millis(i * 20)));
    }
    pipeline.finish();

    // detect, track, track, lost, detect, track, track, lost
    assert_eq!(detections.load(Ordering::SeqCst), 2);
    let record = record.lock().unwrap();
    let ages = record.iter().map(|p| p.tracking.age()).collect::<Vec<_>>();
    assert_eq!(ages, [1, 2, 3, 0, 1, 2, 3, 0]);
    assert!(record[3].regions.is_empty());
}

#[test]
fn in_flight_operations_are_bounded() {
    const MAX_IN_FLIGHT: usize = 2;
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (presenter, record) = recorder();

    let enter = {
        let running = running.clone();
        let peak = peak.clone();
        move || {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(fastrand::u64(1..8)));
            running.fetch_sub(1, Ordering::SeqCst);
        }
    };
    let detect_enter = enter.clone();

    let mut pipeline = Pipeline::spawn(
        PipelineOptions::default()
            .fps(1000)
            .max_in_flight(MAX_IN_FLIGHT),
        move |_: &Frame| -> anyhow::Result<Vec<Region>> {
            detect_enter();
            Ok(vec![face()])
        },
        move |_: &Frame, req: &TrackRequest| -> anyhow::Result<Option<Region>> {
            enter();
            Ok(fastrand::bool().then_some(req.anchor()))
        },
        presenter,
    )
    .unwrap();

    for i in 0..100 {
        assert!(pipeline.on_frame(frame(Duration::from_millis(i))));
        assert!(pipeline.limiter().in_flight() <= MAX_IN_FLIGHT);
    }
    pipeline.finish();

    assert!(peak.load(Ordering::SeqCst) <= MAX_IN_FLIGHT);
    assert_eq!(record.lock().unwrap().len(), 100);
}
