// tld: Tracking-Learning-Detection on the CPU
// Long-term single-object tracking: median-flow tracking, a random-fern
// detector and online learning fused frame by frame.
//
// Reference: Kalal, Mikolajczyk, Matas -- "Tracking-Learning-Detection"
// (TPAMI 2012)

pub mod image;
pub mod rect;
pub mod convert;
pub mod convolution;
pub mod integral;
pub mod frame;
pub mod pyramid;
pub mod klt;
pub mod warp;
pub mod parallel;
pub mod error;

pub mod feature;
pub mod leaf;
pub mod fern;
pub mod classifier;
pub mod kalman;
pub mod detector;
pub mod tracker;
pub mod tld;

pub use convert::PixelFormat;
pub use error::{Result, TldError};
pub use frame::FrameView;
pub use rect::{Patch, Rect};
pub use tld::{TldConfig, TldState, TldTracker};
