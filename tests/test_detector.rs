// tests/test_detector.rs -- Integration tests for the sliding-window
// detector and its motion model.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tld::classifier::{Classifier, ClassifierConfig};
use tld::detector::{Detector, DetectorConfig};
use tld::frame::Frame;
use tld::image::Image;
use tld::kalman::KalmanFilter;
use tld::parallel::WorkerPool;
use tld::rect::Rect;

const W: usize = 200;
const H: usize = 160;

/// Block-noise scene translated by `(dx, dy)`, sampled from a field large
/// enough that shifted content never runs out.
fn scene(dx: i32, dy: i32) -> Image<u8> {
    const MARGIN: i32 = 64;
    let stride = (W as i32 + 2 * MARGIN) as usize / 4 + 1;
    let rows = (H as i32 + 2 * MARGIN) as usize / 4 + 1;
    let mut rng = StdRng::seed_from_u64(77);
    let blocks: Vec<u8> = (0..stride * rows).map(|_| rng.gen()).collect();

    let mut img = Image::new(W, H);
    for y in 0..H as i32 {
        for x in 0..W as i32 {
            let (sx, sy) = ((x - dx + MARGIN) as usize, (y - dy + MARGIN) as usize);
            img.set(x as usize, y as usize, blocks[(sy / 4) * stride + sx / 4]);
        }
    }
    img
}

fn setup(target: Rect) -> (Detector, Classifier, Frame) {
    let pool = Arc::new(WorkerPool::new(Some(4)).unwrap());
    let mut rng = StdRng::seed_from_u64(3);
    let classifier = Classifier::new(ClassifierConfig::default(), Arc::clone(&pool), &mut rng);
    let frame = Frame::new(scene(0, 0));
    classifier.init(&frame, target);
    let mut detector = Detector::new(DetectorConfig::default(), pool);
    detector.init(&frame, target);
    (detector, classifier, frame)
}

#[test]
fn zero_seed_candidates_stay_in_frame() {
    let target = Rect::new(150, 110, 44, 44);
    let (mut det, classifier, frame) = setup(target);
    for _ in 0..5 {
        for p in det.detect(&classifier, &frame, Rect::zero()) {
            assert!(p.rect.is_inside(&frame.bounds()), "{}", p.rect);
            assert!((0.0..=1.0).contains(&p.confidence));
        }
    }
}

#[test]
fn finds_moved_target() {
    let target = Rect::new(60, 40, 40, 40);
    let (mut det, classifier, _) = setup(target);

    let moved = Frame::new(scene(8, 4));
    let truth = target.translated(8, 4);
    let patches = det.detect(&classifier, &moved, target);
    let best = patches
        .iter()
        .max_by(|a, b| a.cmp_confidence(b))
        .expect("detector returned nothing");
    assert!(best.confidence > 0.6, "best confidence {}", best.confidence);
    assert!(best.rect.overlap(&truth) > 0.6, "best {} vs truth {truth}", best.rect);
}

#[test]
fn scores_overlap_against_the_seed() {
    let target = Rect::new(60, 40, 40, 40);
    let (mut det, classifier, frame) = setup(target);
    let patches = det.detect(&classifier, &frame, target);
    assert!(!patches.is_empty());
    for p in &patches {
        assert!((p.overlap - p.rect.overlap(&target)).abs() < 1e-12);
        assert_eq!(p.is_overlapping, p.overlap > 0.6);
    }
}

#[test]
fn search_region_widens_while_lost() {
    let target = Rect::new(80, 60, 40, 40);
    let (mut det, classifier, frame) = setup(target);
    let mut previous = 0;
    for _ in 0..45 {
        det.detect(&classifier, &frame, Rect::zero());
        let region = det.search_region();
        assert!(region.is_inside(&frame.bounds()), "{region}");
        assert!(region.area() >= previous);
        previous = region.area();
    }
    assert_eq!(det.failure_counter(), 45);
    // Past 40 failures the region covers the whole frame.
    assert_eq!(det.search_region(), frame.bounds());
}

#[test]
fn kalman_tracks_a_straight_line() {
    let t0 = Instant::now();
    let mut kf = KalmanFilter::new();
    let at = |k: i32| Rect::new(20 + 5 * k, 30 - 2 * k, 30, 20);
    let mut predicted = Rect::zero();
    for k in 0..12 {
        predicted = kf.predict_at(at(k), t0 + Duration::from_millis(40 * k as u64));
    }
    let truth = at(11);
    assert!((predicted.x - truth.x).abs() <= 1, "{predicted} vs {truth}");
    assert!((predicted.y - truth.y).abs() <= 1, "{predicted} vs {truth}");
}
