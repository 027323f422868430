//! Error types for the renderer.
//!
//! None of these ever reach the caller of [`LiquidRenderer`]: they are
//! produced and logged on the worker thread, where the failing operation is
//! abandoned and the previous state is kept.
//!
//! [`LiquidRenderer`]: crate::LiquidRenderer

use thiserror::Error;

/// Errors produced by backends and the render pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RendererError {
    /// The platform could not provide a graphics context or surface.
    #[error("graphics context creation failed: {0}")]
    ContextCreation(String),

    /// A shader stage failed to compile or a program failed to link.
    #[error("shader compilation failed: {0}")]
    ShaderCompile(String),

    /// An offscreen target could not be created or is incomplete.
    #[error("framebuffer creation failed: {0}")]
    FramebufferCreation(String),

    /// The requested target size cannot be represented by the backend.
    #[error("unsupported target size {width}x{height}")]
    UnsupportedSize {
        /// Requested width in pixels.
        width: u32,
        /// Requested height in pixels.
        height: u32,
    },

    /// A pass was issued before targets were allocated.
    #[error("no render targets allocated")]
    NotAllocated,

    /// Reading the output surface back to the CPU failed.
    #[error("readback failed: {0}")]
    Readback(String),
}

/// Result type for renderer operations.
pub type Result<T> = std::result::Result<T, RendererError>;
