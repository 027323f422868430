//! Off-thread signed distance fields and "liquid" reveal compositing for
//! vector shapes, on OpenGL via [glow] or on the CPU.
//!
//! This crate provides [`LiquidRenderer`], which turns a [`Shape`] into a
//! signed distance field with the jump flood algorithm and composites a
//! circular drop that merges smoothly with the shape's edges. All graphics
//! work happens on a dedicated worker thread; finished frames are handed to
//! a callback as [`image::RgbaImage`]s on a separate delivery thread.
//!
//! # Features
//!
//! - **Jump flood** distance fields in ⌈log2 max(width, height)⌉ passes,
//!   recomputed only when the shape or size changes.
//! - **Smooth reveal**: the drop and the shape are joined with a polynomial
//!   smooth maximum, so the drop bulges along edges instead of clipping.
//! - **Superseding**: requests issued before a newer shape or size never
//!   reach the callback, and rapid resizes coalesce into one allocation.
//! - **Two backends**: [`GlBackend`] (feature `glow`, on by default) and
//!   [`SoftwareBackend`], which runs the same kernels on the CPU.
//!
//! # Threading
//!
//! Every [`LiquidRenderer`] method returns immediately. Failures are logged
//! through [tracing] and never surface to the caller; a request that fails
//! simply produces no callback.
//!
//! [glow]: https://docs.rs/glow
//! [tracing]: https://docs.rs/tracing

mod backend;
pub mod compositor;
mod config;
mod context;
mod delivery;
mod error;
#[cfg(feature = "glow")]
mod gl;
pub mod jfa;
mod rasterizer;
mod renderer;
#[cfg(feature = "glow")]
mod shaders;
mod shape;
mod software;
mod stats;
mod types;

pub use backend::{Backend, BackendFactory, MAX_CAPTURES_IN_FLIGHT};
pub use compositor::CompositeUniforms;
pub use config::{FieldPrecision, RendererConfig, HALF_PRECISION_MAX_DIMENSION};
pub use context::Lifecycle;
pub use delivery::ImageCallback;
pub use error::{RendererError, Result};
#[cfg(feature = "glow")]
pub use gl::GlBackend;
pub use rasterizer::rasterize;
pub use renderer::LiquidRenderer;
pub use shape::{Shape, ShapeBuilder};
pub use software::{padded_row_stride, SoftwareBackend, MAX_DIMENSION, ROW_ALIGNMENT};
pub use stats::RendererStats;
pub use types::{CapturedFrame, FieldTexel, Mask, RenderRequest, Slot, MASK_THRESHOLD};
