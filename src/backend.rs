//! The seam between the pipeline and a graphics API.
//!
//! A backend owns the mask texture, the ping/pong field targets and the
//! output surface. Every pass names its source and destination slots
//! explicitly; backends keep no notion of a "current" target between calls.
//!
//! Backends are created and used only on the renderer's worker thread, so
//! they need not be `Send` themselves; only their factory crosses threads.

use crate::compositor::CompositeUniforms;
use crate::config::FieldPrecision;
use crate::error::Result;
use crate::types::{CapturedFrame, Mask, Slot};

/// Captures a caller may have in flight before collecting one.
pub const MAX_CAPTURES_IN_FLIGHT: usize = 2;

/// A graphics API able to run the jump flood and composite passes.
pub trait Backend {
    /// Short name used in log output.
    fn name(&self) -> &'static str;

    /// (Re)create the field targets, mask texture and output surface at the
    /// given size.
    ///
    /// Must be transactional: on error the previously allocated targets,
    /// and therefore any field they hold, remain intact. On success,
    /// captures still in flight are discarded.
    ///
    /// # Errors
    ///
    /// Fails if the size is unsupported or the targets cannot be created.
    fn allocate(&mut self, width: u32, height: u32, precision: FieldPrecision) -> Result<()>;

    /// Upload a coverage mask matching the allocated size.
    ///
    /// # Errors
    ///
    /// Fails if no targets are allocated or the upload fails.
    fn upload_mask(&mut self, mask: &Mask) -> Result<()>;

    /// Seed `write` from the uploaded mask: boundary texels receive their
    /// own coordinate, all others are marked unseeded.
    ///
    /// # Errors
    ///
    /// Fails if no targets are allocated.
    fn seed_pass(&mut self, write: Slot) -> Result<()>;

    /// One flood pass at `step` pixels, reading `read` and writing `write`.
    ///
    /// # Errors
    ///
    /// Fails if no targets are allocated.
    fn flood_pass(&mut self, read: Slot, write: Slot, step: u32) -> Result<()>;

    /// Copy `read` into `write` unchanged.
    ///
    /// # Errors
    ///
    /// Fails if no targets are allocated.
    fn copy_pass(&mut self, read: Slot, write: Slot) -> Result<()>;

    /// Composite the field in `field` onto the output surface and present.
    ///
    /// # Errors
    ///
    /// Fails if no targets are allocated.
    fn composite(&mut self, field: Slot, uniforms: &CompositeUniforms) -> Result<()>;

    /// Start reading the presented output surface back to the CPU.
    ///
    /// Returns without waiting for the GPU. Callers keep at most
    /// [`MAX_CAPTURES_IN_FLIGHT`] captures uncollected. The frame is collected later
    /// with [`finish_capture`](Self::finish_capture); captures complete in
    /// the order they were started.
    ///
    /// # Errors
    ///
    /// Fails if no targets are allocated or the readback cannot be issued.
    fn begin_capture(&mut self) -> Result<()>;

    /// Collect the oldest capture in flight.
    ///
    /// Without `wait`, returns `Ok(None)` if its readback has not completed
    /// yet. With `wait`, blocks until it has. Always `Ok(None)` when nothing
    /// is in flight. A capture that fails is consumed by the error.
    ///
    /// # Errors
    ///
    /// Fails if the readback failed.
    fn finish_capture(&mut self, wait: bool) -> Result<Option<CapturedFrame>>;

    /// Captures started and not yet collected.
    fn captures_in_flight(&self) -> usize;

    /// Release every resource. The backend is unusable afterwards.
    fn release(&mut self);
}

/// Creates a backend on the worker thread.
///
/// Called by `initialize`; called again by a later `initialize` if an
/// earlier attempt failed. Context creation (making a GL context current,
/// for example) belongs inside the factory, since it must happen on the
/// thread that will use it.
pub type BackendFactory = Box<dyn FnMut() -> Result<Box<dyn Backend>> + Send>;
