// tests/test_tld.rs -- End-to-end tests of the orchestrated tracker.
//
// Scenes are block noise; the target is simply a region of it, so every
// component (flow, detection, learning) has texture to work with.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tld::frame::Frame;
use tld::{FrameView, PixelFormat, Rect, TldConfig, TldState, TldTracker};

const W: usize = 240;
const H: usize = 200;
const R0: Rect = Rect::new(100, 100, 50, 50);

fn scene(dx: i32, dy: i32) -> Vec<u8> {
    const MARGIN: i32 = 64;
    let stride = (W as i32 + 2 * MARGIN) as usize / 4 + 1;
    let rows = (H as i32 + 2 * MARGIN) as usize / 4 + 1;
    let mut rng = StdRng::seed_from_u64(2024);
    let blocks: Vec<u8> = (0..stride * rows).map(|_| rng.gen()).collect();

    let mut out = Vec::with_capacity(W * H);
    for y in 0..H as i32 {
        for x in 0..W as i32 {
            let (sx, sy) = ((x - dx + MARGIN) as usize, (y - dy + MARGIN) as usize);
            out.push(blocks[(sy / 4) * stride + sx / 4]);
        }
    }
    out
}

fn tracker() -> TldTracker {
    TldTracker::new(TldConfig { worker_threads: Some(4), seed: Some(11), ..Default::default() }).unwrap()
}

fn gray(data: &[u8]) -> FrameView<'_> {
    FrameView::new(data, W, H, PixelFormat::Gray8).unwrap()
}

#[test]
fn first_call_returns_the_selection() {
    let mut tld = tracker();
    let data = scene(0, 0);
    assert_eq!(tld.get_target_rect(&gray(&data), R0), R0);
    assert_eq!(tld.confidence(), 1.0);
    assert_eq!(tld.state(), TldState::Tracking);
}

#[test]
fn static_scene_keeps_the_target() {
    let mut tld = tracker();
    let data = scene(0, 0);
    let view = gray(&data);
    tld.get_target_rect(&view, R0);

    let r = tld.get_target_rect(&view, R0);
    assert!((r.x - R0.x).abs() <= 3 && (r.y - R0.y).abs() <= 3, "{r}");
    assert!((r.width - R0.width).abs() <= 3 && (r.height - R0.height).abs() <= 3, "{r}");
    assert!(
        tld.confidence() >= tld.config().learning_confidence,
        "confidence {}",
        tld.confidence()
    );
}

#[test]
fn reset_discards_learned_posteriors() {
    let mut tld = tracker();
    let data = scene(0, 0);
    let view = gray(&data);
    tld.get_target_rect(&view, R0);
    tld.get_target_rect(&view, R0);

    let frame = Frame::preprocess(&view);
    let before = tld.classifier().classify(frame.integral(), &R0);
    assert!(before > 0.8, "before reset {before}");

    tld.reset_tracker();
    assert_eq!(tld.state(), TldState::Uninitialized);
    let other = Rect::new(20, 20, 40, 40);
    assert_eq!(tld.get_target_rect(&view, other), other);

    let after = tld.classifier().classify(frame.integral(), &R0);
    assert!(after < 0.5, "after reset {after}");
    assert!(tld.classifier().classify(frame.integral(), &other) > 0.8);
}

#[test]
fn search_widens_without_a_target_rect() {
    let mut tld = tracker();
    let data = scene(0, 0);
    let view = gray(&data);
    tld.get_target_rect(&view, R0);

    let bounds = Rect::new(0, 0, W as i32, H as i32);
    let mut previous = 0;
    for _ in 0..30 {
        tld.get_target_rect(&view, Rect::zero());
        let region = tld.detector().search_region();
        assert!(region.is_inside(&bounds), "{region}");
        assert!(region.area() >= previous, "{region} shrank");
        previous = region.area();
    }
    assert_eq!(tld.detector().failure_counter(), 30);
}

#[test]
fn follows_a_moving_target() {
    let mut tld = tracker();
    let data = scene(0, 0);
    let mut r = tld.get_target_rect(&gray(&data), R0);

    for k in 1..=6 {
        let data = scene(2 * k, k);
        r = tld.get_target_rect(&gray(&data), r);
    }
    let truth = R0.translated(12, 6);
    assert!(r.overlap(&truth) > 0.6, "{r} vs {truth}");
    assert_eq!(tld.state(), TldState::Tracking);
}

#[test]
fn reacquires_after_losing_the_rect() {
    let mut tld = tracker();
    let data = scene(0, 0);
    let view = gray(&data);
    tld.get_target_rect(&view, R0);
    tld.get_target_rect(&view, R0);

    // The caller lost track of the box for a while; detection alone
    // brings the target back.
    let mut r = Rect::zero();
    for _ in 0..3 {
        r = tld.get_target_rect(&view, Rect::zero());
    }
    assert!(r.overlap(&R0) > 0.6, "{r}");
}

#[test]
fn color_input_matches_gray_input() {
    let data = scene(0, 0);
    let bgr: Vec<u8> = data.iter().flat_map(|&v| [v, v, v]).collect();

    let mut a = tracker();
    let mut b = tracker();
    let bgr_view = FrameView::new(&bgr, W, H, PixelFormat::Bgr8).unwrap();
    a.get_target_rect(&gray(&data), R0);
    b.get_target_rect(&bgr_view, R0);
    assert_eq!(a.get_target_rect(&gray(&data), R0), b.get_target_rect(&bgr_view, R0));
}
