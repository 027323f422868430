//! The frame delivery queue.
//!
//! The worker thread publishes captured frames into a [`FrameSlot`] holding
//! at most one frame; a newer frame replaces one that has not been taken
//! yet. A dedicated delivery thread takes frames, packs their rows into an
//! [`RgbaImage`] and hands it to the caller's callback, so neither decoding
//! nor the callback ever runs on the worker thread.

use image::RgbaImage;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

use crate::context::Shared;
use crate::error::{RendererError, Result};
use crate::stats::Counters;
use crate::types::CapturedFrame;

/// Receives every delivered image. Runs on the delivery thread.
pub type ImageCallback = Box<dyn FnMut(RgbaImage) + Send>;

/// A captured frame tagged with the epoch of the request that produced it.
#[derive(Debug)]
pub struct PendingFrame {
    pub frame: CapturedFrame,
    pub epoch: u64,
}

#[derive(Default)]
struct SlotState {
    pending: Option<PendingFrame>,
    closed: bool,
}

/// A capacity-one, latest-wins handoff between two threads.
#[derive(Default)]
pub struct FrameSlot {
    state: Mutex<SlotState>,
    ready: Condvar,
}

impl FrameSlot {
    /// Create an empty, open slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `frame`, replacing any frame not yet taken.
    ///
    /// Returns `true` if a frame was replaced. Frames published after
    /// [`close`](Self::close) are discarded.
    pub fn publish(&self, frame: PendingFrame) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        let replaced = state.pending.replace(frame).is_some();
        self.ready.notify_one();
        replaced
    }

    /// Block until a frame is available and take it.
    ///
    /// Returns `None` once the slot is closed; a frame still buffered at
    /// that point is discarded.
    pub fn take(&self) -> Option<PendingFrame> {
        let mut state = self.lock();
        loop {
            if state.closed {
                state.pending = None;
                return None;
            }
            if let Some(frame) = state.pending.take() {
                return Some(frame);
            }
            state = self
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Close the slot and wake the consumer.
    pub fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }
}

/// Pack a frame's rows into a tightly packed RGBA image.
///
/// # Errors
///
/// Fails if the frame's buffer is too short for its stride and size.
pub fn decode(frame: &CapturedFrame) -> Result<RgbaImage> {
    let row_bytes = frame.width as usize * 4;
    let rows = frame.height as usize;
    if frame.row_stride < row_bytes
        || (rows > 0 && frame.pixels.len() < frame.row_stride * (rows - 1) + row_bytes)
    {
        return Err(RendererError::Readback(format!(
            "{} bytes cannot hold {}x{} rows at stride {}",
            frame.pixels.len(),
            frame.width,
            frame.height,
            frame.row_stride
        )));
    }

    let mut packed = Vec::with_capacity(row_bytes * rows);
    for row in 0..rows {
        let start = row * frame.row_stride;
        packed.extend_from_slice(&frame.pixels[start..start + row_bytes]);
    }

    RgbaImage::from_raw(frame.width, frame.height, packed)
        .ok_or_else(|| RendererError::Readback("packed buffer size mismatch".into()))
}

/// Spawn the delivery thread.
///
/// The thread exits when `slot` is closed. Before invoking `callback` it
/// re-checks that the renderer is still alive and that no newer shape or
/// size has superseded the frame. A frame rendered before a `set_shape` or
/// `set_size` but not yet delivered is therefore dropped too.
pub(crate) fn spawn(
    name: String,
    slot: Arc<FrameSlot>,
    shared: Arc<Shared>,
    mut callback: ImageCallback,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new().name(name).spawn(move || {
        while let Some(pending) = slot.take() {
            let image = match decode(&pending.frame) {
                Ok(image) => image,
                Err(err) => {
                    warn!(%err, "dropping undecodable frame");
                    continue;
                }
            };
            if !shared.is_live() {
                debug!(epoch = pending.epoch, "renderer torn down, dropping frame");
                continue;
            }
            if pending.epoch != shared.epoch() {
                debug!(epoch = pending.epoch, "frame superseded before delivery");
                Counters::bump(&shared.counters.requests_superseded);
                continue;
            }
            Counters::bump(&shared.counters.frames_delivered);
            callback(image);
        }
        debug!("delivery thread exiting");
    })
}
