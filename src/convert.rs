// convert.rs -- Pixel format conversions.
//
// The capture side hands over 8-bit interleaved buffers (RGB or BGR,
// depending on the decoder) or an already-gray plane. Everything
// downstream wants a single u8 luma plane.
//
// Luma uses ITU-R BT.601 coefficients: Y = 0.299*R + 0.587*G + 0.114*B

use crate::image::{Image, Pixel};

/// Memory layout of a caller-supplied pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// One byte per pixel, already grayscale.
    Gray8,
    /// Interleaved R, G, B.
    Rgb8,
    /// Interleaved B, G, R (the usual order out of video decoders).
    Bgr8,
}

impl PixelFormat {
    /// Bytes per pixel.
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
        }
    }
}

#[inline]
fn luma(r: u8, g: u8, b: u8) -> u8 {
    u8::from_f32(0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32)
}

/// Convert a tightly packed buffer to a grayscale image.
///
/// # Panics
/// Panics if `data.len() != width * height * format.channels()`. Callers at
/// the crate boundary go through `FrameView::new`, which checks this and
/// reports a `TldError` instead.
pub fn to_grayscale(data: &[u8], width: usize, height: usize, format: PixelFormat) -> Image<u8> {
    let channels = format.channels();
    assert_eq!(
        data.len(),
        width * height * channels,
        "buffer length does not match {width}x{height}x{channels}"
    );

    let gray: Vec<u8> = match format {
        PixelFormat::Gray8 => data.to_vec(),
        PixelFormat::Rgb8 => data.chunks_exact(3).map(|p| luma(p[0], p[1], p[2])).collect(),
        PixelFormat::Bgr8 => data.chunks_exact(3).map(|p| luma(p[2], p[1], p[0])).collect(),
    };
    Image::from_vec(width, height, gray)
}
