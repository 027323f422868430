//! Counters observable from the caller's side.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of the renderer's counters.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RendererStats {
    /// Completed jump flood computations.
    pub field_recomputes: u64,
    /// Flood passes run by the most recent computation.
    pub last_flood_passes: u64,
    /// Successful ping/pong (and surface) allocations.
    pub framebuffer_allocations: u64,
    /// Frames composited and captured, or queued for capture.
    pub frames_rendered: u64,
    /// Images handed to the callback.
    pub frames_delivered: u64,
    /// Requests dropped because a newer shape or size replaced theirs.
    pub requests_superseded: u64,
    /// Frames replaced in the delivery slot before being taken, and
    /// waiting requests replaced by a newer one of the same epoch.
    pub frames_overwritten: u64,
}

/// Live counters shared between threads.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub field_recomputes: AtomicU64,
    pub last_flood_passes: AtomicU64,
    pub framebuffer_allocations: AtomicU64,
    pub frames_rendered: AtomicU64,
    pub frames_delivered: AtomicU64,
    pub requests_superseded: AtomicU64,
    pub frames_overwritten: AtomicU64,
}

impl Counters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RendererStats {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        RendererStats {
            field_recomputes: load(&self.field_recomputes),
            last_flood_passes: load(&self.last_flood_passes),
            framebuffer_allocations: load(&self.framebuffer_allocations),
            frames_rendered: load(&self.frames_rendered),
            frames_delivered: load(&self.frames_delivered),
            requests_superseded: load(&self.requests_superseded),
            frames_overwritten: load(&self.frames_overwritten),
        }
    }
}
