use cinder_gfx::GraphicsError;
use thiserror::Error;

/// Failures while setting up a renderer.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Graphics(#[from] GraphicsError),
    #[error("atlas dimensions must be non-zero, got {width}x{height}")]
    EmptyAtlas { width: u32, height: u32 },
}

/// Misuse of [`FlamechartBuilder`](crate::FlamechartBuilder).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("close_frame at {value} without a matching open_frame")]
    UnbalancedClose { value: f64 },
    #[error("{count} frame(s) were opened but never closed")]
    UnclosedFrames { count: usize },
}
