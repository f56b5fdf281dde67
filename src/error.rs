// error.rs -- Error types for tracker construction and frame intake.
//
// The per-frame path never fails: degenerate geometry and lost targets are
// expressed as the zero rectangle. Errors only come from handing the
// tracker something it cannot use at all.

use thiserror::Error;

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, TldError>;

#[derive(Error, Debug)]
pub enum TldError {
    #[error("pixel buffer holds {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },

    #[error("frame has no pixels ({width}x{height})")]
    EmptyFrame { width: usize, height: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("worker pool could not be started: {0}")]
    WorkerPool(String),
}

impl TldError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
