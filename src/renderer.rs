//! The public handle: fire-and-forget entry points for the owning UI layer.

use image::RgbaImage;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::backend::{Backend, BackendFactory};
use crate::config::RendererConfig;
use crate::context::{Command, Lifecycle, Shared, Worker};
use crate::delivery::{self, FrameSlot, ImageCallback};
use crate::shape::Shape;
use crate::software::SoftwareBackend;
use crate::stats::RendererStats;
use crate::types::RenderRequest;

/// Off-thread liquid reveal renderer for one shape.
///
/// Every method returns immediately: work is posted to a dedicated worker
/// thread that owns the graphics context, and finished frames reach the
/// callback on a separate delivery thread. Failures are logged and never
/// surface here; a request that fails, or is superseded by a newer shape or
/// size, simply never produces a callback.
///
/// # Example
///
/// ```no_run
/// # use liquid_field::{LiquidRenderer, RendererConfig, Shape};
/// let mut renderer = LiquidRenderer::software(RendererConfig::default(), |image| {
///     println!("frame {}x{}", image.width(), image.height());
/// });
/// renderer.set_size(200, 200);
/// renderer.set_shape(Shape::circle(0.5, 0.5, 0.4));
/// renderer.initialize();
/// renderer.request_render(100.0, 100.0, 20.0);
/// // ...
/// renderer.shutdown();
/// ```
pub struct LiquidRenderer {
    config: RendererConfig,
    shared: Arc<Shared>,
    slot: Arc<FrameSlot>,

    /// Moved into the worker on the first `initialize`.
    factory: Option<BackendFactory>,
    /// Moved into the delivery thread on the first `initialize`.
    callback: Option<ImageCallback>,

    commands: Option<Sender<Command>>,
    worker: Option<JoinHandle<()>>,
    delivery: Option<JoinHandle<()>>,

    /// Last shape accepted, for no-op detection.
    shape: Option<Shape>,
    /// Last size accepted, for no-op detection and request normalization.
    size: [u32; 2],
}

impl LiquidRenderer {
    /// Create a renderer. Nothing runs until [`initialize`](Self::initialize).
    ///
    /// `factory` runs on the worker thread to create the backend;
    /// `on_image_ready` runs on the delivery thread once per delivered frame.
    pub fn new<F>(factory: BackendFactory, config: RendererConfig, on_image_ready: F) -> Self
    where
        F: FnMut(RgbaImage) + Send + 'static,
    {
        Self {
            config,
            shared: Arc::new(Shared::new()),
            slot: Arc::new(FrameSlot::new()),
            factory: Some(factory),
            callback: Some(Box::new(on_image_ready)),
            commands: None,
            worker: None,
            delivery: None,
            shape: None,
            size: [0, 0],
        }
    }

    /// Create a renderer on the [`SoftwareBackend`].
    pub fn software<F>(config: RendererConfig, on_image_ready: F) -> Self
    where
        F: FnMut(RgbaImage) + Send + 'static,
    {
        let factory: BackendFactory =
            Box::new(|| Ok(Box::new(SoftwareBackend::new()) as Box<dyn Backend>));
        Self::new(factory, config, on_image_ready)
    }

    /// Create the graphics context on the worker thread.
    ///
    /// No-op while initialization is queued or done. After a failed attempt
    /// it retries with the same factory. Ignored after
    /// [`shutdown`](Self::shutdown).
    pub fn initialize(&mut self) {
        match self.shared.lifecycle() {
            Lifecycle::Idle => {
                if self.shared.transition(Lifecycle::Idle, Lifecycle::Initializing) {
                    self.spawn();
                }
            }
            Lifecycle::Failed => {
                if self.shared.transition(Lifecycle::Failed, Lifecycle::Initializing) {
                    self.post(Command::Initialize);
                }
            }
            Lifecycle::Initializing | Lifecycle::Ready => debug!("initialize ignored, already running"),
            Lifecycle::ShutDown => warn!("initialize after shutdown ignored"),
        }
    }

    fn spawn(&mut self) {
        let (Some(factory), Some(callback)) = (self.factory.take(), self.callback.take()) else {
            error!("renderer threads already spawned once");
            self.shared.set_lifecycle(Lifecycle::Failed);
            return;
        };

        let delivery = delivery::spawn(
            format!("{}-delivery", self.config.thread_name),
            Arc::clone(&self.slot),
            Arc::clone(&self.shared),
            callback,
        );
        let delivery = match delivery {
            Ok(handle) => handle,
            Err(err) => {
                error!(%err, "failed to spawn delivery thread, renderer is inert");
                self.shared.set_lifecycle(Lifecycle::ShutDown);
                return;
            }
        };

        let (sender, receiver) = mpsc::channel();
        let config = self.config.clone();
        let shared = Arc::clone(&self.shared);
        let slot = Arc::clone(&self.slot);
        let shape = self.shape.clone();
        // The backend is not `Send`: the worker that owns it is built on
        // the render thread itself.
        let spawned = thread::Builder::new()
            .name(format!("{}-render", self.config.thread_name))
            .spawn(move || Worker::new(factory, config, shared, slot, shape).run(&receiver));

        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                self.delivery = Some(delivery);
                self.commands = Some(sender);
                self.post(Command::Initialize);
            }
            Err(err) => {
                error!(%err, "failed to spawn render thread, renderer is inert");
                self.slot.close();
                let _ = delivery.join();
                self.shared.set_lifecycle(Lifecycle::ShutDown);
            }
        }
    }

    /// Release every GPU resource and stop both threads.
    ///
    /// Frames not yet delivered are dropped. Safe to call without a prior
    /// [`initialize`](Self::initialize), and more than once.
    pub fn shutdown(&mut self) {
        self.shared.kill();
        if let Some(commands) = self.commands.take() {
            // A send error means the worker already exited.
            let _ = commands.send(Command::Shutdown);
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("render thread panicked");
                self.slot.close();
            }
        }
        if let Some(delivery) = self.delivery.take() {
            // Called from the callback itself: the thread exits on its own
            // once the closed slot is observed.
            if delivery.thread().id() != thread::current().id() && delivery.join().is_err() {
                error!("delivery thread panicked");
            }
        }
        if self.shared.lifecycle() != Lifecycle::ShutDown {
            self.shared.set_lifecycle(Lifecycle::ShutDown);
            info!("renderer shut down");
        }
    }

    /// Replace the shape. No-op if `shape` equals the current one.
    pub fn set_shape(&mut self, shape: Shape) {
        if self.shape.as_ref() == Some(&shape) {
            return;
        }
        self.shape = Some(shape.clone());
        let epoch = self.shared.bump_epoch();
        self.post(Command::SetShape { shape, epoch });
    }

    /// Set the target resolution in pixels. No-op if unchanged.
    pub fn set_size(&mut self, width: u32, height: u32) {
        if self.size == [width, height] {
            return;
        }
        self.size = [width, height];
        self.shared.request_size(self.size);
        let epoch = self.shared.bump_epoch();
        self.post(Command::Resize { epoch });
    }

    /// Request one frame with the drop at pixel `(x, y)`.
    ///
    /// Coordinates are normalized against the current size; the blend
    /// coefficient comes from [`RendererConfig::blend`].
    pub fn request_render(&mut self, x: f32, y: f32, radius: f32) {
        let request = RenderRequest::from_pixels(x, y, radius, self.config.blend, self.size);
        self.submit(request);
    }

    /// Request one frame from a normalized request.
    pub fn submit(&mut self, request: RenderRequest) {
        let epoch = self.shared.epoch();
        self.post(Command::Render { request, epoch });
    }

    /// Whether the graphics context is up.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.shared.lifecycle() == Lifecycle::Ready
    }

    /// Where the graphics context is in its lifecycle.
    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.shared.lifecycle()
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> RendererStats {
        self.shared.counters.snapshot()
    }

    /// Block until the worker has run every command posted so far.
    ///
    /// Intended for diagnostics and tests. Returns at once if the worker is
    /// not running. Delivery of the resulting frames may still be underway.
    pub fn wait_idle(&self) {
        let Some(commands) = &self.commands else {
            return;
        };
        let (ack, done) = mpsc::channel();
        if commands.send(Command::Barrier(ack)).is_ok() {
            // A receive error means the worker exited; nothing to wait for.
            let _ = done.recv();
        }
    }

    fn post(&self, command: Command) {
        match &self.commands {
            Some(commands) => {
                if commands.send(command).is_err() {
                    debug!("render thread gone, command dropped");
                }
            }
            None => debug!("renderer not initialized, command deferred to initialize"),
        }
    }
}

impl Drop for LiquidRenderer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::compositor::CompositeUniforms;
    use crate::config::FieldPrecision;
    use crate::error::{RendererError, Result};
    use crate::types::{CapturedFrame, Mask, Slot};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc::Receiver;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(20);
    const QUIET: Duration = Duration::from_millis(300);

    fn channel_renderer(config: RendererConfig) -> (LiquidRenderer, Receiver<RgbaImage>) {
        let (tx, rx) = mpsc::channel();
        let renderer = LiquidRenderer::software(config, move |image| {
            let _ = tx.send(image);
        });
        (renderer, rx)
    }

    /// A software factory that blocks until the returned sender fires, so
    /// tests can queue commands behind initialization.
    fn gated_factory() -> (BackendFactory, Sender<()>) {
        let (open, gate) = mpsc::channel::<()>();
        let factory: BackendFactory = Box::new(move || {
            let _ = gate.recv();
            Ok(Box::new(SoftwareBackend::new()) as Box<dyn Backend>)
        });
        (factory, open)
    }

    fn gated_renderer() -> (LiquidRenderer, Receiver<RgbaImage>, Sender<()>) {
        let (factory, open) = gated_factory();
        let (tx, rx) = mpsc::channel();
        let renderer = LiquidRenderer::new(factory, RendererConfig::default(), move |image| {
            let _ = tx.send(image);
        });
        (renderer, rx, open)
    }

    fn alpha(image: &RgbaImage, x: u32, y: u32) -> u8 {
        image.get_pixel(x, y).0[3]
    }

    #[test]
    fn round_trip_delivers_full_size_image() {
        let (mut renderer, rx) = channel_renderer(RendererConfig::default());
        renderer.set_size(200, 200);
        renderer.set_shape(Shape::circle(0.5, 0.5, 0.4));
        renderer.initialize();
        renderer.submit(RenderRequest::new(0.5, 0.5, 0.1));

        let image = rx.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(image.dimensions(), (200, 200));
        assert!(alpha(&image, 100, 100) > 0);
        assert!(alpha(&image, 110, 95) > 0);
        assert_eq!(alpha(&image, 2, 2), 0);
        assert_eq!(alpha(&image, 197, 197), 0);
        renderer.shutdown();
    }

    #[test]
    fn pixel_requests_are_normalized_by_size() {
        let (mut renderer, rx) = channel_renderer(RendererConfig::default());
        renderer.set_size(120, 60);
        renderer.set_shape(Shape::rectangle(0.0, 0.0, 1.0, 1.0));
        renderer.initialize();
        renderer.request_render(30.0, 30.0, 10.0);

        let image = rx.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(image.dimensions(), (120, 60));
        assert!(alpha(&image, 30, 30) > 0);
        assert_eq!(alpha(&image, 90, 30), 0);
    }

    #[test]
    fn flood_pass_counts_follow_target_size() {
        for (size, passes) in [(64, 6), (100, 7), (256, 8)] {
            let (mut renderer, _rx) = channel_renderer(RendererConfig::default());
            renderer.set_size(size, size);
            renderer.set_shape(Shape::circle(0.5, 0.5, 0.3));
            renderer.initialize();
            renderer.wait_idle();
            let stats = renderer.stats();
            assert_eq!(stats.field_recomputes, 1, "size {size}");
            assert_eq!(stats.last_flood_passes, passes, "size {size}");
        }
    }

    #[test]
    fn unchanged_shape_and_size_do_not_recompute() {
        let (mut renderer, _rx) = channel_renderer(RendererConfig::default());
        let shape = Shape::circle(0.5, 0.5, 0.3);
        renderer.set_size(64, 64);
        renderer.set_shape(shape.clone());
        renderer.initialize();
        renderer.wait_idle();
        assert_eq!(renderer.stats().field_recomputes, 1);

        renderer.set_shape(shape);
        renderer.set_shape(Shape::circle(0.5, 0.5, 0.3));
        renderer.set_size(64, 64);
        renderer.wait_idle();
        let stats = renderer.stats();
        assert_eq!(stats.field_recomputes, 1);
        assert_eq!(stats.framebuffer_allocations, 1);

        renderer.set_shape(Shape::circle(0.5, 0.5, 0.2));
        renderer.wait_idle();
        assert_eq!(renderer.stats().field_recomputes, 2);
    }

    #[test]
    fn renders_reuse_the_cached_field() {
        let (mut renderer, rx) = channel_renderer(RendererConfig::default());
        renderer.set_size(64, 64);
        renderer.set_shape(Shape::circle(0.5, 0.5, 0.3));
        renderer.initialize();
        for _ in 0..3 {
            renderer.submit(RenderRequest::new(0.5, 0.5, 0.2));
            rx.recv_timeout(TIMEOUT).unwrap();
        }
        assert_eq!(renderer.stats().field_recomputes, 1);
        assert_eq!(renderer.stats().frames_delivered, 3);
    }

    #[test]
    fn superseded_request_never_reaches_the_callback() {
        let (mut renderer, rx, open) = gated_renderer();
        renderer.set_size(64, 64);
        renderer.initialize();
        renderer.set_shape(Shape::circle(0.5, 0.5, 0.3));
        renderer.submit(RenderRequest::new(0.5, 0.5, 0.2));
        renderer.set_shape(Shape::rectangle(0.1, 0.1, 0.8, 0.8));
        open.send(()).unwrap();
        renderer.wait_idle();

        assert!(rx.recv_timeout(QUIET).is_err());
        assert_eq!(renderer.stats().requests_superseded, 1);
        assert_eq!(renderer.stats().frames_rendered, 0);

        renderer.submit(RenderRequest::new(0.5, 0.5, 1.0));
        let image = rx.recv_timeout(TIMEOUT).unwrap();
        // The rectangle covers the corner region the circle does not.
        assert!(alpha(&image, 10, 10) > 0);
    }

    #[test]
    fn rapid_resizes_coalesce_into_one_allocation() {
        let (mut renderer, rx, open) = gated_renderer();
        renderer.initialize();
        renderer.set_size(100, 100);
        renderer.set_size(150, 150);
        renderer.set_size(200, 200);
        renderer.set_shape(Shape::circle(0.5, 0.5, 0.3));
        open.send(()).unwrap();
        renderer.wait_idle();

        let stats = renderer.stats();
        assert_eq!(stats.framebuffer_allocations, 1);
        assert_eq!(stats.field_recomputes, 1);

        renderer.submit(RenderRequest::new(0.5, 0.5, 0.2));
        assert_eq!(rx.recv_timeout(TIMEOUT).unwrap().dimensions(), (200, 200));
    }

    #[test]
    fn request_before_shape_waits_for_the_field() {
        let (mut renderer, rx) = channel_renderer(RendererConfig::default());
        renderer.set_size(64, 64);
        renderer.initialize();
        renderer.submit(RenderRequest::new(0.5, 0.5, 0.2));
        renderer.wait_idle();
        assert!(rx.recv_timeout(QUIET).is_err());

        // The shape supersedes the queued request; a fresh one renders.
        renderer.set_shape(Shape::circle(0.5, 0.5, 0.3));
        renderer.submit(RenderRequest::new(0.5, 0.5, 0.2));
        assert!(rx.recv_timeout(TIMEOUT).is_ok());
        assert!(rx.recv_timeout(QUIET).is_err());
    }

    #[test]
    fn empty_shape_renders_transparent_frame() {
        let (mut renderer, rx) = channel_renderer(RendererConfig::default());
        renderer.set_size(128, 128);
        renderer.set_shape(Shape::empty());
        renderer.initialize();
        renderer.submit(RenderRequest::new(0.5, 0.5, 0.3).with_blend(0.0));

        let image = rx.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(image.dimensions(), (128, 128));
        assert!(image.pixels().all(|p| p.0 == [0, 0, 0, 0]));
    }

    #[test]
    fn zero_size_delivers_empty_image() {
        let (mut renderer, rx) = channel_renderer(RendererConfig::default());
        renderer.set_shape(Shape::circle(0.5, 0.5, 0.3));
        renderer.set_size(0, 10);
        renderer.initialize();
        renderer.submit(RenderRequest::new(0.5, 0.5, 0.3));
        let image = rx.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(image.dimensions(), (0, 10));
    }

    #[test]
    fn zero_height_delivers_empty_image() {
        let (mut renderer, rx) = channel_renderer(RendererConfig::default());
        renderer.set_shape(Shape::circle(0.5, 0.5, 0.3));
        renderer.set_size(10, 0);
        renderer.initialize();
        renderer.submit(RenderRequest::new(0.5, 0.5, 0.3));
        let image = rx.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(image.dimensions(), (10, 0));
        assert_eq!(renderer.stats().frames_delivered, 1);
    }

    /// A software backend whose allocations fail after the first.
    struct FailingReallocation {
        inner: SoftwareBackend,
        allocations: usize,
    }

    impl Backend for FailingReallocation {
        fn name(&self) -> &'static str {
            "failing-reallocation"
        }
        fn allocate(&mut self, width: u32, height: u32, precision: FieldPrecision) -> Result<()> {
            self.allocations += 1;
            if self.allocations > 1 {
                return Err(RendererError::FramebufferCreation("out of memory".into()));
            }
            self.inner.allocate(width, height, precision)
        }
        fn upload_mask(&mut self, mask: &Mask) -> Result<()> {
            self.inner.upload_mask(mask)
        }
        fn seed_pass(&mut self, write: Slot) -> Result<()> {
            self.inner.seed_pass(write)
        }
        fn flood_pass(&mut self, read: Slot, write: Slot, step: u32) -> Result<()> {
            self.inner.flood_pass(read, write, step)
        }
        fn copy_pass(&mut self, read: Slot, write: Slot) -> Result<()> {
            self.inner.copy_pass(read, write)
        }
        fn composite(&mut self, field: Slot, uniforms: &CompositeUniforms) -> Result<()> {
            self.inner.composite(field, uniforms)
        }
        fn begin_capture(&mut self) -> Result<()> {
            self.inner.begin_capture()
        }
        fn finish_capture(&mut self, wait: bool) -> Result<Option<CapturedFrame>> {
            self.inner.finish_capture(wait)
        }
        fn captures_in_flight(&self) -> usize {
            self.inner.captures_in_flight()
        }
        fn release(&mut self) {
            self.inner.release();
        }
    }

    #[test]
    fn failed_reallocation_keeps_previous_targets_and_stays_silent() {
        let factory: BackendFactory = Box::new(|| {
            Ok(Box::new(FailingReallocation {
                inner: SoftwareBackend::new(),
                allocations: 0,
            }) as Box<dyn Backend>)
        });
        let (tx, rx) = mpsc::channel();
        let mut renderer = LiquidRenderer::new(factory, RendererConfig::default(), move |image| {
            let _ = tx.send(image);
        });
        renderer.set_size(32, 32);
        renderer.set_shape(Shape::circle(0.5, 0.5, 0.3));
        renderer.initialize();
        renderer.submit(RenderRequest::new(0.5, 0.5, 0.2));
        assert_eq!(rx.recv_timeout(TIMEOUT).unwrap().dimensions(), (32, 32));
        let before = renderer.stats();

        renderer.set_size(64, 64);
        renderer.submit(RenderRequest::new(0.5, 0.5, 0.2));
        renderer.wait_idle();
        assert!(rx.recv_timeout(QUIET).is_err());
        let after = renderer.stats();
        assert_eq!(after.framebuffer_allocations, before.framebuffer_allocations);
        assert_eq!(after.field_recomputes, before.field_recomputes);
        assert_eq!(after.frames_rendered, before.frames_rendered);
        assert!(renderer.is_ready());

        // Back at the allocated size, the surviving targets render again.
        renderer.set_size(32, 32);
        renderer.submit(RenderRequest::new(0.5, 0.5, 0.2));
        assert_eq!(rx.recv_timeout(TIMEOUT).unwrap().dimensions(), (32, 32));
        assert_eq!(renderer.stats().framebuffer_allocations, 1);
    }

    #[test]
    fn renderer_handle_can_move_between_threads() {
        fn assert_send<T: Send>() {}
        assert_send::<LiquidRenderer>();

        let (mut renderer, rx) = channel_renderer(RendererConfig::default());
        renderer.set_size(16, 16);
        renderer.set_shape(Shape::circle(0.5, 0.5, 0.3));
        let mut renderer = thread::spawn(move || {
            renderer.initialize();
            renderer
        })
        .join()
        .unwrap();
        renderer.submit(RenderRequest::new(0.5, 0.5, 0.2));
        assert!(rx.recv_timeout(TIMEOUT).is_ok());
    }

    #[test]
    fn flip_mirrors_delivered_rows() {
        let shape = Shape::rectangle(0.0, 0.0, 1.0, 0.25);
        let request = RenderRequest::new(0.5, 0.5, 2.0);
        let mut images = Vec::new();
        for flip_y in [false, true] {
            let (mut renderer, rx) = channel_renderer(RendererConfig::default().with_flip_y(flip_y));
            renderer.set_size(32, 32);
            renderer.set_shape(shape.clone());
            renderer.initialize();
            renderer.submit(request);
            images.push(rx.recv_timeout(TIMEOUT).unwrap());
        }
        assert!(alpha(&images[0], 16, 2) > 0);
        assert_eq!(alpha(&images[0], 16, 29), 0);
        assert_eq!(image::imageops::flip_vertical(&images[0]), images[1]);
    }

    #[test]
    fn callback_runs_off_the_render_thread() {
        let (tx, rx) = mpsc::channel();
        let config = RendererConfig::default().with_thread_name("reveal");
        let mut renderer = LiquidRenderer::software(config, move |_| {
            let _ = tx.send(thread::current().name().map(str::to_owned));
        });
        renderer.set_size(16, 16);
        renderer.set_shape(Shape::circle(0.5, 0.5, 0.3));
        renderer.initialize();
        renderer.submit(RenderRequest::new(0.5, 0.5, 0.2));
        let name = rx.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(name.as_deref(), Some("reveal-delivery"));
    }

    #[test]
    fn failed_initialization_is_inert_and_retryable() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let factory: BackendFactory = {
            let attempts = Arc::clone(&attempts);
            Box::new(move || {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(RendererError::ContextCreation("no display".into()))
                } else {
                    Ok(Box::new(SoftwareBackend::new()) as Box<dyn Backend>)
                }
            })
        };
        let (tx, rx) = mpsc::channel();
        let mut renderer = LiquidRenderer::new(factory, RendererConfig::default(), move |image| {
            let _ = tx.send(image);
        });
        renderer.set_size(32, 32);
        renderer.set_shape(Shape::circle(0.5, 0.5, 0.3));
        renderer.initialize();
        renderer.submit(RenderRequest::new(0.5, 0.5, 0.2));
        renderer.wait_idle();
        assert!(!renderer.is_ready());
        assert!(rx.recv_timeout(QUIET).is_err());

        renderer.initialize();
        renderer.submit(RenderRequest::new(0.5, 0.5, 0.2));
        assert!(rx.recv_timeout(TIMEOUT).is_ok());
        assert!(renderer.is_ready());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn duplicate_initialize_creates_one_context() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let factory: BackendFactory = {
            let attempts = Arc::clone(&attempts);
            Box::new(move || {
                attempts.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(SoftwareBackend::new()) as Box<dyn Backend>)
            })
        };
        let mut renderer = LiquidRenderer::new(factory, RendererConfig::default(), |_| {});
        renderer.initialize();
        renderer.initialize();
        renderer.wait_idle();
        renderer.initialize();
        renderer.wait_idle();
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(renderer.is_ready());
    }

    #[test]
    fn shutdown_without_initialize_is_safe() {
        let (mut renderer, _rx) = channel_renderer(RendererConfig::default());
        renderer.shutdown();
        renderer.shutdown();
        renderer.initialize();
        assert!(!renderer.is_ready());
        assert_eq!(renderer.lifecycle(), Lifecycle::ShutDown);
    }

    #[test]
    fn no_callbacks_after_shutdown() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut renderer = {
            let count = Arc::clone(&count);
            LiquidRenderer::software(RendererConfig::default(), move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };
        renderer.set_size(64, 64);
        renderer.set_shape(Shape::circle(0.5, 0.5, 0.3));
        renderer.initialize();
        for _ in 0..5 {
            renderer.submit(RenderRequest::new(0.5, 0.5, 0.2));
        }
        renderer.shutdown();
        let after = count.load(Ordering::SeqCst);
        thread::sleep(QUIET);
        assert_eq!(count.load(Ordering::SeqCst), after);
        renderer.submit(RenderRequest::new(0.5, 0.5, 0.2));
        thread::sleep(QUIET);
        assert_eq!(count.load(Ordering::SeqCst), after);
    }
}
