// frame.rs -- The capture boundary and the preprocessed frame.
//
// FrameView borrows whatever the decoder produced and validates its size
// once. Frame is what every component actually consumes: the blurred luma
// plane plus its integral tables, computed once per frame and shared
// read-only by the tracker, the detector and the classifier.

use crate::convert::{to_grayscale, PixelFormat};
use crate::convolution::box_blur_3x3;
use crate::error::{Result, TldError};
use crate::image::Image;
use crate::integral::IntegralImage;
use crate::rect::Rect;

/// A borrowed, size-checked pixel buffer from the capture side.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    data: &'a [u8],
    width: usize,
    height: usize,
    format: PixelFormat,
}

impl<'a> FrameView<'a> {
    /// Wrap a tightly packed buffer.
    ///
    /// Fails when the frame is empty or the buffer length does not match
    /// `width * height * channels`.
    pub fn new(data: &'a [u8], width: usize, height: usize, format: PixelFormat) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(TldError::EmptyFrame { width, height });
        }
        // No buffer can hold a frame whose size overflows usize.
        let expected = width
            .checked_mul(height)
            .and_then(|n| n.checked_mul(format.channels()))
            .unwrap_or(usize::MAX);
        if data.len() != expected {
            return Err(TldError::BufferSize { expected, actual: data.len() });
        }
        Ok(FrameView { data, width, height, format })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }
}

/// A grayscale frame with its integral tables.
#[derive(Clone, Debug)]
pub struct Frame {
    gray: Image<u8>,
    integral: IntegralImage,
}

impl Frame {
    /// Wrap an already-prepared grayscale image as-is (no blur).
    pub fn new(gray: Image<u8>) -> Self {
        let integral = IntegralImage::new(&gray);
        Frame { gray, integral }
    }

    /// Grayscale conversion followed by a 3x3 box blur.
    pub fn preprocess(view: &FrameView<'_>) -> Self {
        let gray = to_grayscale(view.data, view.width, view.height, view.format);
        Frame::new(box_blur_3x3(&gray))
    }

    #[inline]
    pub fn gray(&self) -> &Image<u8> {
        &self.gray
    }

    #[inline]
    pub fn integral(&self) -> &IntegralImage {
        &self.integral
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.gray.width()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.gray.height()
    }

    pub fn bounds(&self) -> Rect {
        self.gray.bounds()
    }
}
