// tests/test_image.rs -- Integration tests for images, rectangles, frames
// and the integral image.
//
// These run with `cargo test --test test_image` and only see the public API.

use tld::convert::{self, PixelFormat};
use tld::frame::{Frame, FrameView};
use tld::image::{interpolate_bilinear, Flip, Image};
use tld::integral::IntegralImage;
use tld::rect::Rect;
use tld::TldError;

// ===== Image construction & basic access =====

#[test]
fn image_new_zero_initialized() {
    let img: Image<u8> = Image::new(100, 50);
    assert_eq!(img.width(), 100);
    assert_eq!(img.height(), 50);
    assert_eq!(img.get(0, 0), 0);
    assert_eq!(img.get(99, 49), 0);
}

#[test]
fn image_set_get_consistency() {
    let mut img: Image<u8> = Image::new(10, 10);
    for y in 0..10 {
        for x in 0..10 {
            img.set(x, y, if (x + y) % 2 == 0 { 255 } else { 0 });
        }
    }
    for y in 0..10 {
        for x in 0..10 {
            let expected = if (x + y) % 2 == 0 { 255u8 } else { 0u8 };
            assert_eq!(img.get(x, y), expected, "mismatch at ({x}, {y})");
        }
    }
}

#[test]
fn crop_clips_to_the_image() {
    let img = Image::from_vec(4, 4, (0..16u8).collect());
    let inner = img.crop(Rect::new(1, 1, 2, 2));
    assert_eq!((inner.width(), inner.height()), (2, 2));
    assert_eq!(inner.as_slice(), &[5, 6, 9, 10]);

    let edge = img.crop(Rect::new(3, 2, 5, 5));
    assert_eq!((edge.width(), edge.height()), (1, 2));
    assert_eq!(edge.as_slice(), &[11, 15]);

    assert!(img.crop(Rect::new(10, 10, 3, 3)).is_empty());
}

#[test]
fn flips_agree_with_rect_mapping() {
    // A bright 2x1 block, mirrored with the image and with its rectangle.
    let mut img: Image<u8> = Image::new(6, 4);
    img.set(1, 0, 200);
    img.set(2, 0, 200);
    let rect = Rect::new(1, 0, 2, 1);

    for flip in Flip::ALL {
        let flipped = img.flipped(flip);
        let mapped = flip.apply_to_rect(rect, 6, 4);
        for y in mapped.y..mapped.bottom() {
            for x in mapped.x..mapped.right() {
                assert_eq!(flipped.get(x as usize, y as usize), 200, "{flip:?} at ({x}, {y})");
            }
        }
        let total: u32 = flipped.pixels().map(|(_, _, v)| v as u32).sum();
        assert_eq!(total, 400);
    }
}

// ===== Rectangles =====

#[test]
fn overlap_properties() {
    let rects = [
        Rect::new(0, 0, 10, 10),
        Rect::new(5, 5, 10, 10),
        Rect::new(20, 20, 4, 4),
        Rect::new(0, 0, 10, 5),
        Rect::zero(),
    ];
    for a in &rects {
        for b in &rects {
            let ab = a.overlap(b);
            assert_eq!(ab, b.overlap(a), "{a} vs {b}");
            assert!((0.0..=1.0).contains(&ab));
        }
    }
    assert_eq!(rects[0].overlap(&rects[0]), 1.0);
    assert_eq!(rects[0].overlap(&rects[2]), 0.0);
    assert!((rects[0].overlap(&rects[1]) - 25.0 / 175.0).abs() < 1e-12);
    assert_eq!(rects[0].overlap(&rects[3]), 0.5);
}

#[test]
fn rect_center_and_bounds() {
    let r = Rect::new(10, 20, 30, 40);
    assert_eq!(r.center(), (25, 40));
    assert!(r.is_inside(&Rect::new(0, 0, 40, 60)));
    assert!(!r.is_inside(&Rect::new(0, 0, 39, 60)));
    assert_eq!(format!("{r}"), "Rect(10, 20, 30x40)");
}

// ===== Conversions =====

#[test]
fn rgb_and_bgr_agree() {
    let rgb = [255u8, 0, 0, 0, 255, 0, 0, 0, 255, 10, 20, 30];
    let bgr = [0u8, 0, 255, 0, 255, 0, 255, 0, 0, 30, 20, 10];
    let a = convert::to_grayscale(&rgb, 2, 2, PixelFormat::Rgb8);
    let b = convert::to_grayscale(&bgr, 2, 2, PixelFormat::Bgr8);
    assert_eq!(a.as_slice(), b.as_slice());
    // BT.601: pure red, green, blue.
    assert_eq!(a.get(0, 0), 76);
    assert_eq!(a.get(1, 0), 150);
    assert_eq!(a.get(0, 1), 29);
}

// ===== Bilinear interpolation =====

#[test]
fn bilinear_linear_gradient() {
    let mut img: Image<f32> = Image::new(10, 10);
    for y in 0..10 {
        for x in 0..10 {
            img.set(x, y, x as f32 * 3.0 + y as f32 * 7.0);
        }
    }
    for (px, py) in [(0.5, 0.5), (2.3, 4.7), (7.9, 1.1), (0.0, 8.0)] {
        let expected = px * 3.0 + py * 7.0;
        let actual = interpolate_bilinear(&img, px, py);
        assert!((actual - expected).abs() < 1e-4, "bilinear({px}, {py}): {expected} vs {actual}");
    }
}

// ===== Frames =====

#[test]
fn frame_view_rejects_bad_buffers() {
    let data = vec![0u8; 30];
    assert!(matches!(
        FrameView::new(&data, 4, 4, PixelFormat::Rgb8),
        Err(TldError::BufferSize { expected: 48, actual: 30 })
    ));
    assert!(matches!(
        FrameView::new(&data, 0, 10, PixelFormat::Gray8),
        Err(TldError::EmptyFrame { .. })
    ));
    assert!(FrameView::new(&data, 10, 1, PixelFormat::Rgb8).is_ok());
}

#[test]
fn preprocess_smooths_isolated_pixels() {
    let mut data = vec![0u8; 9 * 9];
    data[4 * 9 + 4] = 90;
    let view = FrameView::new(&data, 9, 9, PixelFormat::Gray8).unwrap();
    let frame = Frame::preprocess(&view);
    assert_eq!(frame.bounds(), Rect::new(0, 0, 9, 9));
    assert_eq!(frame.gray().get(4, 4), 10);
    assert_eq!(frame.gray().get(3, 3), 10);
    assert_eq!(frame.gray().get(1, 1), 0);
    assert_eq!(frame.integral().sum(&frame.bounds()), 90);
}

// ===== Integral image =====

#[test]
fn integral_matches_brute_force() {
    let img = Image::from_vec(7, 5, (0..35u32).map(|i| ((i * 53) % 256) as u8).collect());
    let ii = IntegralImage::new(&img);
    let r = Rect::new(2, 1, 4, 3);
    let (mut sum, mut sq) = (0u64, 0u64);
    for y in 1..4 {
        for x in 2..6 {
            let v = img.get(x, y) as u64;
            sum += v;
            sq += v * v;
        }
    }
    assert_eq!(ii.sum(&r), sum);
    assert_eq!(ii.squared_sum(&r), sq);
    let mean = sum as f64 / 12.0;
    assert!((ii.variance(&r) - (sq as f64 / 12.0 - mean * mean)).abs() < 1e-9);
}

#[test]
fn degenerate_windows_have_zero_variance() {
    let img = Image::from_vec(4, 4, (0..16u8).map(|v| v * 10).collect());
    let ii = IntegralImage::new(&img);
    for r in [Rect::new(1, 1, 0, 3), Rect::new(1, 1, 3, 0), Rect::new(-5, -5, 2, 2), Rect::zero()] {
        assert_eq!(ii.variance(&r), 0.0, "{r}");
        assert_eq!(ii.mean(&r), 0.0, "{r}");
    }
}
