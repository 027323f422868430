//! The graphics context manager: one worker thread that owns the backend
//! and executes every command strictly in submission order.
//!
//! The FIFO command queue is the only synchronization around GPU state.
//! State the caller needs to observe without a round trip (lifecycle,
//! liveness, the newest epoch, the newest requested size and the counters)
//! lives in [`Shared`] as atomics.
//!
//! # Epochs
//!
//! Every accepted `setShape`/`setSize` bumps the shared epoch on the
//! caller's thread before its command is queued, and every render request
//! carries the epoch current when it was issued. A request whose epoch is
//! older than the shared epoch when it reaches the worker (or the delivery
//! thread) has been superseded and is dropped without a callback.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::backend::{Backend, BackendFactory, MAX_CAPTURES_IN_FLIGHT};
use crate::compositor::CompositeUniforms;
use crate::config::RendererConfig;
use crate::delivery::{FrameSlot, PendingFrame};
use crate::error::{RendererError, Result};
use crate::jfa;
use crate::rasterizer::rasterize;
use crate::shape::Shape;
use crate::stats::Counters;
use crate::types::{CapturedFrame, RenderRequest, Slot};

/// Lifecycle of the graphics context as seen from any thread.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Lifecycle {
    /// `initialize` has not been called.
    Idle = 0,
    /// Context creation is queued or running.
    Initializing = 1,
    /// The backend is usable.
    Ready = 2,
    /// Context creation failed; `initialize` may be retried.
    Failed = 3,
    /// `shutdown` ran; terminal.
    ShutDown = 4,
}

impl Lifecycle {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Lifecycle::Initializing,
            2 => Lifecycle::Ready,
            3 => Lifecycle::Failed,
            4 => Lifecycle::ShutDown,
            _ => Lifecycle::Idle,
        }
    }
}

/// How often the worker polls captures in flight while no command arrives.
const CAPTURE_POLL: Duration = Duration::from_millis(1);

/// Cross-thread state of one renderer.
#[derive(Debug)]
pub(crate) struct Shared {
    lifecycle: AtomicU8,
    alive: AtomicBool,
    epoch: AtomicU64,
    /// Latest requested size, width in the high half.
    requested_size: AtomicU64,
    pub counters: Counters,
}

impl Shared {
    pub fn new() -> Self {
        Self {
            lifecycle: AtomicU8::new(Lifecycle::Idle as u8),
            alive: AtomicBool::new(true),
            epoch: AtomicU64::new(0),
            requested_size: AtomicU64::new(0),
            counters: Counters::default(),
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle::from_u8(self.lifecycle.load(Ordering::Acquire))
    }

    pub fn set_lifecycle(&self, lifecycle: Lifecycle) {
        self.lifecycle.store(lifecycle as u8, Ordering::Release);
    }

    /// Move from `from` to `to` if the lifecycle is still `from`.
    pub fn transition(&self, from: Lifecycle, to: Lifecycle) -> bool {
        self.lifecycle
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_live(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn kill(&self) {
        self.alive.store(false, Ordering::Release);
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Start a new epoch and return it.
    pub fn bump_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn requested_size(&self) -> [u32; 2] {
        let packed = self.requested_size.load(Ordering::Acquire);
        // Each half was stored from a u32.
        #[expect(clippy::cast_possible_truncation)]
        let size = [(packed >> 32) as u32, packed as u32];
        size
    }

    pub fn request_size(&self, [width, height]: [u32; 2]) {
        let packed = (u64::from(width) << 32) | u64::from(height);
        self.requested_size.store(packed, Ordering::Release);
    }
}

/// Work posted to the worker thread.
pub(crate) enum Command {
    /// Create the backend if there is none.
    Initialize,
    /// Replace the shape and recompute the field.
    SetShape { shape: Shape, epoch: u64 },
    /// Apply the latest requested size. Several queued resizes coalesce:
    /// the first applies the newest size and the rest find nothing to do.
    Resize { epoch: u64 },
    /// Composite and capture one frame.
    Render { request: RenderRequest, epoch: u64 },
    /// Acknowledge once every earlier command has run and its frames have
    /// been published.
    Barrier(Sender<()>),
    /// Release everything and exit.
    Shutdown,
}

/// What the canonical field slot currently holds.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Field {
    /// Nothing usable.
    Absent,
    /// A converged field for the current shape and size.
    Converged,
    /// Zero-area target: renders produce empty frames.
    Degenerate,
}

/// State owned by the worker thread.
pub(crate) struct Worker {
    factory: BackendFactory,
    backend: Option<Box<dyn Backend>>,
    config: RendererConfig,
    shared: Arc<Shared>,
    slot: Arc<FrameSlot>,
    shape: Option<Shape>,
    /// Size the targets should have.
    size: [u32; 2],
    /// Size the targets actually have.
    allocated: Option<[u32; 2]>,
    field: Field,
    /// Epoch the field is consistent with; `None` while it is stale.
    field_epoch: Option<u64>,
    /// The newest request waiting for its field to converge.
    pending: Option<(RenderRequest, u64)>,
    /// Epochs of the captures in flight, oldest first.
    in_flight: VecDeque<u64>,
}

impl Worker {
    pub fn new(
        factory: BackendFactory,
        config: RendererConfig,
        shared: Arc<Shared>,
        slot: Arc<FrameSlot>,
        shape: Option<Shape>,
    ) -> Self {
        Self {
            factory,
            backend: None,
            config,
            shared,
            slot,
            shape,
            size: [0, 0],
            allocated: None,
            field: Field::Absent,
            field_epoch: None,
            pending: None,
            in_flight: VecDeque::new(),
        }
    }

    /// Run commands until `Shutdown` or until every sender is gone.
    ///
    /// While captures are in flight the queue is polled, and completed
    /// captures are published between commands.
    pub fn run(mut self, commands: &Receiver<Command>) {
        loop {
            let command = if self.in_flight.is_empty() {
                match commands.recv() {
                    Ok(command) => command,
                    Err(_) => break,
                }
            } else {
                match commands.recv_timeout(CAPTURE_POLL) {
                    Ok(command) => command,
                    Err(RecvTimeoutError::Timeout) => {
                        self.collect_captures(false);
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            };
            match command {
                Command::Initialize => self.initialize(),
                Command::SetShape { shape, epoch } => self.set_shape(shape, epoch),
                Command::Resize { epoch } => self.resize(epoch),
                Command::Render { request, epoch } => self.render(request, epoch),
                Command::Barrier(ack) => {
                    self.collect_captures(true);
                    // The waiter may have given up; nothing to do then.
                    let _ = ack.send(());
                }
                Command::Shutdown => break,
            }
            self.collect_captures(false);
        }
        self.shutdown();
    }

    fn initialize(&mut self) {
        if self.backend.is_some() {
            debug!("context already initialized");
            return;
        }
        match (self.factory)() {
            Ok(backend) => {
                info!(backend = backend.name(), "graphics context initialized");
                self.backend = Some(backend);
                self.shared.set_lifecycle(Lifecycle::Ready);
                self.size = self.shared.requested_size();
                self.invalidate();
                // Any shape newer than ours has its SetShape queued ahead of
                // every request carrying the newer epoch.
                self.refresh(self.shared.epoch());
            }
            Err(err) => {
                error!(%err, "graphics context initialization failed, renderer is inert");
                self.shared.set_lifecycle(Lifecycle::Failed);
            }
        }
    }

    fn set_shape(&mut self, shape: Shape, epoch: u64) {
        self.shape = Some(shape);
        self.invalidate();
        self.refresh(epoch);
    }

    fn resize(&mut self, epoch: u64) {
        let size = self.shared.requested_size();
        if size == self.size {
            match self.field_epoch {
                // Already applied by an earlier coalesced resize.
                Some(current) => {
                    self.field_epoch = Some(current.max(epoch));
                    self.flush_pending();
                }
                None => self.refresh(epoch),
            }
            return;
        }
        debug!(width = size[0], height = size[1], "resizing");
        self.size = size;
        self.invalidate();
        self.refresh(epoch);
    }

    /// Mark the field stale after a shape or size change.
    fn invalidate(&mut self) {
        self.field_epoch = None;
    }

    /// Bring targets and field up to date with the current shape and size,
    /// tagging the result with `epoch`.
    fn refresh(&mut self, epoch: u64) {
        if self.pending.is_some_and(|(_, pending_epoch)| pending_epoch < epoch) {
            self.pending = None;
        }

        let Some(backend) = self.backend.as_mut() else {
            return;
        };

        let [width, height] = self.size;
        if width == 0 || height == 0 {
            debug!(width, height, "zero-area target, field is degenerate");
            self.field = Field::Degenerate;
            self.field_epoch = Some(epoch);
            self.flush_pending();
            return;
        }

        if self.allocated != Some(self.size) {
            let precision = self.config.field_precision.resolve(width, height);
            if let Err(err) = backend.allocate(width, height, precision) {
                error!(%err, width, height, "framebuffer allocation failed, keeping previous targets");
                return;
            }
            self.allocated = Some(self.size);
            self.field = Field::Absent;
            Counters::bump(&self.shared.counters.framebuffer_allocations);
            if !self.in_flight.is_empty() {
                debug!(count = self.in_flight.len(), "captures discarded by reallocation");
                for _ in self.in_flight.drain(..) {
                    Counters::bump(&self.shared.counters.requests_superseded);
                }
            }
        }

        let Some(shape) = &self.shape else {
            return;
        };

        let mask = rasterize(shape, width, height);
        match jfa::run(backend.as_mut(), &mask) {
            Ok(report) => {
                self.field = Field::Converged;
                self.field_epoch = Some(epoch);
                let counters = &self.shared.counters;
                Counters::bump(&counters.field_recomputes);
                counters
                    .last_flood_passes
                    .store(u64::from(report.passes), Ordering::Relaxed);
                self.flush_pending();
            }
            Err(err) => {
                error!(%err, "jump flood failed, field discarded");
                self.field = Field::Absent;
            }
        }
    }

    fn render(&mut self, request: RenderRequest, epoch: u64) {
        if self.backend.is_none() {
            debug!(epoch, "renderer inert, dropping request");
            return;
        }
        if epoch < self.shared.epoch() {
            debug!(epoch, "request superseded before execution");
            Counters::bump(&self.shared.counters.requests_superseded);
            return;
        }
        if self.field_epoch == Some(epoch) {
            self.composite(&request, epoch);
        } else {
            self.defer(request, epoch);
        }
    }

    /// Keep `request` until its field converges, replacing any older one.
    fn defer(&mut self, request: RenderRequest, epoch: u64) {
        if let Some((_, replaced)) = self.pending.replace((request, epoch)) {
            let counters = &self.shared.counters;
            if replaced < epoch {
                Counters::bump(&counters.requests_superseded);
            } else {
                Counters::bump(&counters.frames_overwritten);
            }
        }
    }

    /// Composite every queued request the field now satisfies.
    fn flush_pending(&mut self) {
        let Some(field_epoch) = self.field_epoch else {
            return;
        };
        let Some((request, epoch)) = self.pending else {
            return;
        };
        if epoch < self.shared.epoch() {
            self.pending = None;
            Counters::bump(&self.shared.counters.requests_superseded);
        } else if epoch == field_epoch {
            self.pending = None;
            self.composite(&request, epoch);
        }
    }

    fn composite(&mut self, request: &RenderRequest, epoch: u64) {
        match self.field {
            Field::Degenerate => {
                let [width, height] = self.size;
                let frame = CapturedFrame {
                    width,
                    height,
                    row_stride: width as usize * 4,
                    pixels: Vec::new(),
                };
                Counters::bump(&self.shared.counters.frames_rendered);
                self.publish(frame, epoch);
            }
            Field::Converged => match self.composite_field(request) {
                Ok(()) => {
                    Counters::bump(&self.shared.counters.frames_rendered);
                    self.in_flight.push_back(epoch);
                }
                Err(err) => error!(%err, "composite failed, dropping frame"),
            },
            Field::Absent => {}
        }
    }

    /// Composite into the output surface and start capturing it.
    fn composite_field(&mut self, request: &RenderRequest) -> Result<()> {
        if self.in_flight.len() >= MAX_CAPTURES_IN_FLIGHT {
            self.collect_oldest(true);
        }
        let uniforms = CompositeUniforms::new(request, self.size, &self.config);
        let Some(backend) = self.backend.as_mut() else {
            return Err(RendererError::NotAllocated);
        };
        backend.composite(Slot::Ping, &uniforms)?;
        backend.begin_capture()
    }

    /// Publish every completed capture, or every capture at all if `wait`.
    fn collect_captures(&mut self, wait: bool) {
        while !self.in_flight.is_empty() && self.collect_oldest(wait) {}
    }

    /// Publish the oldest capture if it has completed, blocking for it if
    /// `wait`. Returns whether it was consumed.
    fn collect_oldest(&mut self, wait: bool) -> bool {
        let Some(backend) = self.backend.as_mut() else {
            self.in_flight.clear();
            return false;
        };
        let Some(&epoch) = self.in_flight.front() else {
            return false;
        };
        let outcome = backend.finish_capture(wait);
        let backend_idle = backend.captures_in_flight() == 0;
        match outcome {
            Ok(Some(frame)) => {
                self.in_flight.pop_front();
                self.publish(frame, epoch);
                true
            }
            Ok(None) if backend_idle => {
                warn!(epoch, "capture lost by the backend");
                self.in_flight.pop_front();
                true
            }
            Ok(None) => false,
            Err(err) => {
                error!(%err, epoch, "capture failed, dropping frame");
                self.in_flight.pop_front();
                true
            }
        }
    }

    fn publish(&mut self, frame: CapturedFrame, epoch: u64) {
        if self.slot.publish(PendingFrame { frame, epoch }) {
            Counters::bump(&self.shared.counters.frames_overwritten);
        }
    }

    fn shutdown(&mut self) {
        if !self.in_flight.is_empty() {
            debug!(count = self.in_flight.len(), "dropping captures in flight");
            self.in_flight.clear();
        }
        if let Some(mut backend) = self.backend.take() {
            backend.release();
        }
        if let Some((_, epoch)) = self.pending.take() {
            warn!(epoch, "dropping a request still waiting for a field");
        }
        self.slot.close();
        self.shared.set_lifecycle(Lifecycle::ShutDown);
        info!("render thread shut down");
    }
}
