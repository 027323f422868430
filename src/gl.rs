//! The OpenGL backend: owns GL state and runs the flood and composite
//! passes as fullscreen-quad draws.

use glow::{HasContext, PixelPackData, PixelUnpackData};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info};

use crate::backend::{Backend, BackendFactory, MAX_CAPTURES_IN_FLIGHT};
use crate::compositor::CompositeUniforms;
use crate::config::FieldPrecision;
use crate::error::{RendererError, Result};
use crate::shaders;
use crate::types::{CapturedFrame, Mask, Slot, Vertex, FULLSCREEN_QUAD};

/// Row alignment requested for readback. Odd widths get one padding texel
/// per row.
const PACK_ALIGNMENT: usize = 8;

/// Nanoseconds per `glClientWaitSync` call while blocking on a readback.
const FENCE_WAIT_NS: i32 = 1_000_000;

/// Convert a `u32` to `i32` for GL API calls.
fn gl_size(value: u32) -> Result<i32> {
    i32::try_from(value).map_err(|_| RendererError::UnsupportedSize {
        width: value,
        height: value,
    })
}

/// GL internal format, pixel format and type of a target texture.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct TextureFormat {
    internal: u32,
    format: u32,
    ty: u32,
}

impl TextureFormat {
    const MASK: Self = Self {
        internal: glow::R8,
        format: glow::RED,
        ty: glow::UNSIGNED_BYTE,
    };

    const OUTPUT: Self = Self {
        internal: glow::RGBA8,
        format: glow::RGBA,
        ty: glow::UNSIGNED_BYTE,
    };

    fn field(precision: FieldPrecision) -> Self {
        match precision {
            FieldPrecision::Full => Self {
                internal: glow::RGBA32F,
                format: glow::RGBA,
                ty: glow::FLOAT,
            },
            FieldPrecision::Half | FieldPrecision::Auto => Self {
                internal: glow::RGBA16F,
                format: glow::RGBA,
                ty: glow::HALF_FLOAT,
            },
        }
    }
}

/// Bytes per readback row at [`PACK_ALIGNMENT`].
fn packed_row_stride(width: u32) -> usize {
    (width as usize * 4).div_ceil(PACK_ALIGNMENT) * PACK_ALIGNMENT
}

/// A texture with a framebuffer rendering into it.
struct RenderTarget {
    fbo: glow::Framebuffer,
    texture: glow::Texture,
}

/// Every size-dependent resource of one allocation.
struct Targets {
    width: u32,
    height: u32,
    mask: glow::Texture,
    fields: [RenderTarget; 2],
    output: RenderTarget,
    /// Pixel pack buffers the output is read into, used round-robin.
    readbacks: [glow::Buffer; MAX_CAPTURES_IN_FLIGHT],
}

/// A readback issued into a pack buffer and not yet collected.
#[derive(Copy, Clone, Debug)]
struct Readback {
    buffer: glow::Buffer,
    fence: glow::Fence,
    width: u32,
    height: u32,
}

/// Cached uniform locations for the seed program.
struct SeedUniforms {
    /// `u_mask`: texture unit of the coverage mask.
    mask: glow::UniformLocation,
    /// `u_size`: target size in pixels.
    size: glow::UniformLocation,
}

/// Cached uniform locations for the flood program.
struct FloodUniforms {
    /// `u_field`: texture unit of the field being read.
    field: glow::UniformLocation,
    /// `u_size`: target size in pixels.
    size: glow::UniformLocation,
    /// `u_step`: jump distance of this pass.
    step: glow::UniformLocation,
}

/// Cached uniform locations for the composite program.
struct CompositeLocations {
    field: glow::UniformLocation,
    resolution: glow::UniformLocation,
    drop: glow::UniformLocation,
    radius: glow::UniformLocation,
    blend: glow::UniformLocation,
    tint: glow::UniformLocation,
    flip_y: glow::UniformLocation,
}

/// [`Backend`] implementation on OpenGL 3.2 via glow.
///
/// Field targets are RGBA16F (or RGBA32F for
/// [`FieldPrecision::Full`]) textures attached to framebuffers; the output
/// surface is an RGBA8 framebuffer. Captures read it into pixel pack
/// buffers behind a fence, so the render thread only copies the pixels out
/// once the GPU has finished the transfer.
pub struct GlBackend {
    /// The OpenGL context, current on the worker thread.
    gl: Arc<glow::Context>,

    seed_program: glow::Program,
    seed_uniforms: SeedUniforms,
    flood_program: glow::Program,
    flood_uniforms: FloodUniforms,
    copy_program: glow::Program,
    copy_field: glow::UniformLocation,
    composite_program: glow::Program,
    composite_uniforms: CompositeLocations,

    /// Vertex array object with a single `vec2` position attribute.
    vao: glow::VertexArray,
    /// Vertex buffer holding [`FULLSCREEN_QUAD`].
    vbo: glow::Buffer,

    /// `GL_MAX_TEXTURE_SIZE` of the context.
    max_texture_size: u32,

    targets: Option<Targets>,
    /// Readbacks in issue order.
    in_flight: VecDeque<Readback>,
    /// Index into `Targets::readbacks` of the next readback.
    next_readback: usize,
    released: bool,
}

impl GlBackend {
    /// Create a backend, compiling every program and uploading the quad.
    ///
    /// # Safety
    ///
    /// The `gl` context must be current on the calling thread and stay
    /// current on it for the backend's lifetime.
    ///
    /// # Errors
    ///
    /// Returns an error if shader compilation, program linking, uniform
    /// lookup or buffer creation fails.
    pub unsafe fn new(gl: Arc<glow::Context>) -> Result<Self> {
        let seed_program = unsafe {
            shaders::compile_program(&gl, shaders::QUAD_VERTEX_SRC, shaders::SEED_FRAGMENT_SRC)?
        };
        let flood_program = unsafe {
            shaders::compile_program(&gl, shaders::QUAD_VERTEX_SRC, shaders::FLOOD_FRAGMENT_SRC)?
        };
        let copy_program = unsafe {
            shaders::compile_program(&gl, shaders::QUAD_VERTEX_SRC, shaders::COPY_FRAGMENT_SRC)?
        };
        let composite_program = unsafe {
            shaders::compile_program(
                &gl,
                shaders::QUAD_VERTEX_SRC,
                shaders::COMPOSITE_FRAGMENT_SRC,
            )?
        };

        let (seed_uniforms, flood_uniforms, copy_field, composite_uniforms) = unsafe {
            (
                SeedUniforms {
                    mask: shaders::uniform(&gl, seed_program, "u_mask")?,
                    size: shaders::uniform(&gl, seed_program, "u_size")?,
                },
                FloodUniforms {
                    field: shaders::uniform(&gl, flood_program, "u_field")?,
                    size: shaders::uniform(&gl, flood_program, "u_size")?,
                    step: shaders::uniform(&gl, flood_program, "u_step")?,
                },
                shaders::uniform(&gl, copy_program, "u_field")?,
                CompositeLocations {
                    field: shaders::uniform(&gl, composite_program, "u_field")?,
                    resolution: shaders::uniform(&gl, composite_program, "u_resolution")?,
                    drop: shaders::uniform(&gl, composite_program, "u_drop")?,
                    radius: shaders::uniform(&gl, composite_program, "u_radius")?,
                    blend: shaders::uniform(&gl, composite_program, "u_blend")?,
                    tint: shaders::uniform(&gl, composite_program, "u_tint")?,
                    flip_y: shaders::uniform(&gl, composite_program, "u_flip_y")?,
                },
            )
        };

        let (vao, vbo) = unsafe {
            let vao = gl
                .create_vertex_array()
                .map_err(RendererError::ContextCreation)?;
            let vbo = gl.create_buffer().map_err(RendererError::ContextCreation)?;

            gl.bind_vertex_array(Some(vao));
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo));
            gl.buffer_data_u8_slice(
                glow::ARRAY_BUFFER,
                bytemuck::cast_slice(&FULLSCREEN_QUAD),
                glow::STATIC_DRAW,
            );
            gl.enable_vertex_attrib_array(0);
            gl.vertex_attrib_pointer_f32(
                0,
                2,
                glow::FLOAT,
                false,
                // Vertex is 8 bytes.
                #[expect(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
                {
                    std::mem::size_of::<Vertex>() as i32
                },
                0,
            );
            gl.bind_vertex_array(None);
            gl.bind_buffer(glow::ARRAY_BUFFER, None);

            (vao, vbo)
        };

        let max_texture_size =
            u32::try_from(unsafe { gl.get_parameter_i32(glow::MAX_TEXTURE_SIZE) }).unwrap_or(0);

        info!(max_texture_size, "GL backend ready");

        Ok(Self {
            gl,
            seed_program,
            seed_uniforms,
            flood_program,
            flood_uniforms,
            copy_program,
            copy_field,
            composite_program,
            composite_uniforms,
            vao,
            vbo,
            max_texture_size,
            targets: None,
            in_flight: VecDeque::new(),
            next_readback: 0,
            released: false,
        })
    }

    /// Wrap a context constructor into a [`BackendFactory`].
    ///
    /// `make_context` runs on the renderer's worker thread and must return
    /// a context that is current on that thread, e.g. a headless EGL or
    /// CGL context made current right before returning.
    pub fn factory<F>(mut make_context: F) -> BackendFactory
    where
        F: FnMut() -> std::result::Result<glow::Context, String> + Send + 'static,
    {
        Box::new(move || {
            let gl = make_context().map_err(RendererError::ContextCreation)?;
            // The contract on `make_context` is that the context is current
            // on this thread, which is the only thread that will use it.
            let backend = unsafe { GlBackend::new(Arc::new(gl)) }?;
            Ok(Box::new(backend) as Box<dyn Backend>)
        })
    }

    fn targets(&self) -> Result<&Targets> {
        self.targets.as_ref().ok_or(RendererError::NotAllocated)
    }

    /// Create one texture of the given format with nearest filtering and
    /// clamped edges.
    unsafe fn create_texture(
        &self,
        width: i32,
        height: i32,
        format: TextureFormat,
        data: Option<&[u8]>,
    ) -> Result<glow::Texture> {
        let gl = &self.gl;
        unsafe {
            let texture = gl
                .create_texture()
                .map_err(RendererError::FramebufferCreation)?;
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            // Row length of R8 uploads is not a multiple of 4 in general.
            gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            // GL constant values are small enough that the cast is always safe.
            #[expect(clippy::cast_possible_wrap)]
            {
                gl.tex_image_2d(
                    glow::TEXTURE_2D,
                    0,
                    format.internal as i32,
                    width,
                    height,
                    0,
                    format.format,
                    format.ty,
                    PixelUnpackData::Slice(data),
                );
                for (param, value) in [
                    (glow::TEXTURE_MIN_FILTER, glow::NEAREST),
                    (glow::TEXTURE_MAG_FILTER, glow::NEAREST),
                    (glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE),
                    (glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE),
                ] {
                    gl.tex_parameter_i32(glow::TEXTURE_2D, param, value as i32);
                }
            }
            gl.bind_texture(glow::TEXTURE_2D, None);
            Ok(texture)
        }
    }

    /// Create a texture-backed framebuffer and verify it is complete.
    unsafe fn create_target(
        &self,
        width: i32,
        height: i32,
        format: TextureFormat,
    ) -> Result<RenderTarget> {
        let gl = &self.gl;
        unsafe {
            let texture = self.create_texture(width, height, format, None)?;
            let fbo = match gl.create_framebuffer() {
                Ok(fbo) => fbo,
                Err(err) => {
                    gl.delete_texture(texture);
                    return Err(RendererError::FramebufferCreation(err));
                }
            };
            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(fbo));
            gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                Some(texture),
                0,
            );
            let status = gl.check_framebuffer_status(glow::FRAMEBUFFER);
            gl.bind_framebuffer(glow::FRAMEBUFFER, None);

            let target = RenderTarget { fbo, texture };
            if status != glow::FRAMEBUFFER_COMPLETE {
                self.delete_target(&target);
                return Err(RendererError::FramebufferCreation(format!(
                    "incomplete framebuffer (status {status:#x}) for format {:#x}",
                    format.internal
                )));
            }
            Ok(target)
        }
    }

    unsafe fn delete_target(&self, target: &RenderTarget) {
        unsafe {
            self.gl.delete_framebuffer(target.fbo);
            self.gl.delete_texture(target.texture);
        }
    }

    unsafe fn delete_targets(&self, targets: &Targets) {
        unsafe {
            self.gl.delete_texture(targets.mask);
            for target in &targets.fields {
                self.delete_target(target);
            }
            self.delete_target(&targets.output);
            for buffer in targets.readbacks {
                self.gl.delete_buffer(buffer);
            }
        }
    }

    /// Create the pack buffers one readback each of `width` x `height`
    /// needs, deleting any already created if one fails.
    unsafe fn create_readbacks(&self, width: u32, height: u32) -> Result<[glow::Buffer; MAX_CAPTURES_IN_FLIGHT]> {
        let size = i32::try_from(packed_row_stride(width) * height as usize)
            .map_err(|_| RendererError::UnsupportedSize { width, height })?;
        let gl = &self.gl;
        let mut buffers = Vec::with_capacity(MAX_CAPTURES_IN_FLIGHT);
        unsafe {
            for _ in 0..MAX_CAPTURES_IN_FLIGHT {
                match gl.create_buffer() {
                    Ok(buffer) => {
                        gl.bind_buffer(glow::PIXEL_PACK_BUFFER, Some(buffer));
                        gl.buffer_data_size(glow::PIXEL_PACK_BUFFER, size, glow::STREAM_READ);
                        buffers.push(buffer);
                    }
                    Err(err) => {
                        for buffer in buffers {
                            gl.delete_buffer(buffer);
                        }
                        gl.bind_buffer(glow::PIXEL_PACK_BUFFER, None);
                        return Err(RendererError::FramebufferCreation(err));
                    }
                }
            }
            gl.bind_buffer(glow::PIXEL_PACK_BUFFER, None);
        }
        buffers
            .try_into()
            .map_err(|_| RendererError::FramebufferCreation("readback buffer list incomplete".into()))
    }

    /// Drop every readback in flight without collecting it.
    unsafe fn discard_readbacks(&mut self) {
        for readback in self.in_flight.drain(..) {
            unsafe { self.gl.delete_sync(readback.fence) };
        }
        self.next_readback = 0;
    }

    /// Whether `fence` has signaled, blocking until it does if `wait`.
    unsafe fn fence_signaled(&self, fence: glow::Fence, wait: bool) -> Result<bool> {
        let gl = &self.gl;
        if !wait {
            // Enum values fit in i32.
            #[expect(clippy::cast_possible_wrap)]
            let signaled = unsafe { gl.get_sync_parameter_i32(fence, glow::SYNC_STATUS) } == glow::SIGNALED as i32;
            return Ok(signaled);
        }
        loop {
            match unsafe { gl.client_wait_sync(fence, glow::SYNC_FLUSH_COMMANDS_BIT, FENCE_WAIT_NS) } {
                glow::ALREADY_SIGNALED | glow::CONDITION_SATISFIED => return Ok(true),
                glow::TIMEOUT_EXPIRED => {}
                status => {
                    return Err(RendererError::Readback(format!(
                        "glClientWaitSync failed with {status:#x}"
                    )))
                }
            }
        }
    }

    /// Build a full set of targets, deleting whatever was created if any
    /// step fails.
    unsafe fn build_targets(&self, width: u32, height: u32, precision: FieldPrecision) -> Result<Targets> {
        let (w, h) = (gl_size(width)?, gl_size(height)?);
        let field_format = TextureFormat::field(precision);
        let mut created: Vec<RenderTarget> = Vec::with_capacity(3);

        let mut outcome = Ok(());
        for format in [field_format, field_format, TextureFormat::OUTPUT] {
            match unsafe { self.create_target(w, h, format) } {
                Ok(target) => created.push(target),
                Err(err) => {
                    outcome = Err(err);
                    break;
                }
            }
        }
        let mask = outcome.and_then(|()| unsafe { self.create_texture(w, h, TextureFormat::MASK, None) });
        let resources = mask.and_then(|mask| match unsafe { self.create_readbacks(width, height) } {
            Ok(readbacks) => Ok((mask, readbacks)),
            Err(err) => {
                unsafe { self.gl.delete_texture(mask) };
                Err(err)
            }
        });

        match resources {
            Ok((mask, readbacks)) => {
                let [ping, pong, output]: [RenderTarget; 3] = created
                    .try_into()
                    .map_err(|_| RendererError::FramebufferCreation("target list incomplete".into()))?;
                Ok(Targets {
                    width,
                    height,
                    mask,
                    fields: [ping, pong],
                    output,
                    readbacks,
                })
            }
            Err(err) => {
                for target in &created {
                    unsafe { self.delete_target(target) };
                }
                Err(err)
            }
        }
    }

    /// Draw the fullscreen quad into `target` with the currently bound
    /// program, sampling `source` on texture unit 0.
    unsafe fn draw_pass(&self, target: &RenderTarget, source: glow::Texture, width: u32, height: u32) -> Result<()> {
        let gl = &self.gl;
        let (w, h) = (gl_size(width)?, gl_size(height)?);
        unsafe {
            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(target.fbo));
            gl.viewport(0, 0, w, h);
            gl.disable(glow::BLEND);

            gl.active_texture(glow::TEXTURE0);
            gl.bind_texture(glow::TEXTURE_2D, Some(source));

            gl.bind_vertex_array(Some(self.vao));
            gl.draw_arrays(glow::TRIANGLES, 0, 6);
            gl.bind_vertex_array(None);

            gl.bind_texture(glow::TEXTURE_2D, None);
            gl.bind_framebuffer(glow::FRAMEBUFFER, None);
        }
        Ok(())
    }
}

impl Backend for GlBackend {
    fn name(&self) -> &'static str {
        "gl"
    }

    fn allocate(&mut self, width: u32, height: u32, precision: FieldPrecision) -> Result<()> {
        if width == 0 || height == 0 || width > self.max_texture_size || height > self.max_texture_size {
            return Err(RendererError::UnsupportedSize { width, height });
        }
        let fresh = unsafe { self.build_targets(width, height, precision)? };
        unsafe { self.discard_readbacks() };
        if let Some(old) = self.targets.replace(fresh) {
            unsafe { self.delete_targets(&old) };
        }
        debug!(width, height, ?precision, "GL targets allocated");
        Ok(())
    }

    fn upload_mask(&mut self, mask: &Mask) -> Result<()> {
        let targets = self.targets()?;
        if (mask.width, mask.height) != (targets.width, targets.height) {
            return Err(RendererError::UnsupportedSize {
                width: mask.width,
                height: mask.height,
            });
        }
        let (w, h) = (gl_size(mask.width)?, gl_size(mask.height)?);
        let gl = &self.gl;
        unsafe {
            gl.bind_texture(glow::TEXTURE_2D, Some(targets.mask));
            gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            gl.tex_sub_image_2d(
                glow::TEXTURE_2D,
                0,
                0,
                0,
                w,
                h,
                TextureFormat::MASK.format,
                TextureFormat::MASK.ty,
                PixelUnpackData::Slice(Some(&mask.coverage)),
            );
            gl.bind_texture(glow::TEXTURE_2D, None);
        }
        Ok(())
    }

    fn seed_pass(&mut self, write: Slot) -> Result<()> {
        let targets = self.targets()?;
        let gl = &self.gl;
        let (w, h) = (gl_size(targets.width)?, gl_size(targets.height)?);
        unsafe {
            gl.use_program(Some(self.seed_program));
            gl.uniform_1_i32(Some(&self.seed_uniforms.mask), 0);
            gl.uniform_2_i32(Some(&self.seed_uniforms.size), w, h);
            self.draw_pass(&targets.fields[write.index()], targets.mask, targets.width, targets.height)
        }
    }

    fn flood_pass(&mut self, read: Slot, write: Slot, step: u32) -> Result<()> {
        let targets = self.targets()?;
        let gl = &self.gl;
        let (w, h) = (gl_size(targets.width)?, gl_size(targets.height)?);
        let step = gl_size(step)?;
        unsafe {
            gl.use_program(Some(self.flood_program));
            gl.uniform_1_i32(Some(&self.flood_uniforms.field), 0);
            gl.uniform_2_i32(Some(&self.flood_uniforms.size), w, h);
            gl.uniform_1_i32(Some(&self.flood_uniforms.step), step);
            self.draw_pass(
                &targets.fields[write.index()],
                targets.fields[read.index()].texture,
                targets.width,
                targets.height,
            )
        }
    }

    fn copy_pass(&mut self, read: Slot, write: Slot) -> Result<()> {
        let targets = self.targets()?;
        let gl = &self.gl;
        unsafe {
            gl.use_program(Some(self.copy_program));
            gl.uniform_1_i32(Some(&self.copy_field), 0);
            self.draw_pass(
                &targets.fields[write.index()],
                targets.fields[read.index()].texture,
                targets.width,
                targets.height,
            )
        }
    }

    fn composite(&mut self, field: Slot, uniforms: &CompositeUniforms) -> Result<()> {
        let targets = self.targets()?;
        let gl = &self.gl;
        let u = &self.composite_uniforms;
        // Target dimensions are small relative to f32 mantissa range.
        #[expect(clippy::cast_precision_loss)]
        let resolution = [uniforms.resolution[0] as f32, uniforms.resolution[1] as f32];
        let [r, g, b, a] = uniforms.tint;
        unsafe {
            gl.use_program(Some(self.composite_program));
            gl.uniform_1_i32(Some(&u.field), 0);
            gl.uniform_2_f32(Some(&u.resolution), resolution[0], resolution[1]);
            gl.uniform_2_f32(Some(&u.drop), uniforms.drop[0], uniforms.drop[1]);
            gl.uniform_1_f32(Some(&u.radius), uniforms.radius);
            gl.uniform_1_f32(Some(&u.blend), uniforms.blend);
            gl.uniform_4_f32(Some(&u.tint), r, g, b, a);
            gl.uniform_1_i32(Some(&u.flip_y), i32::from(uniforms.flip_y));
            self.draw_pass(
                &targets.output,
                targets.fields[field.index()].texture,
                targets.width,
                targets.height,
            )?;
            // Offscreen surface: presenting means submitting the work.
            gl.flush();
        }
        Ok(())
    }

    fn begin_capture(&mut self) -> Result<()> {
        if self.in_flight.len() >= MAX_CAPTURES_IN_FLIGHT {
            return Err(RendererError::Readback("every readback buffer is in flight".into()));
        }
        let targets = self.targets()?;
        let (w, h) = (gl_size(targets.width)?, gl_size(targets.height)?);
        let (width, height) = (targets.width, targets.height);
        let buffer = targets.readbacks[self.next_readback];
        let gl = &self.gl;
        let fence = unsafe {
            gl.bind_framebuffer(glow::READ_FRAMEBUFFER, Some(targets.output.fbo));
            gl.bind_buffer(glow::PIXEL_PACK_BUFFER, Some(buffer));
            // PACK_ALIGNMENT is a small power of two.
            #[expect(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            gl.pixel_store_i32(glow::PACK_ALIGNMENT, PACK_ALIGNMENT as i32);
            // With a pack buffer bound this only queues the copy.
            gl.read_pixels(
                0,
                0,
                w,
                h,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                PixelPackData::BufferOffset(0),
            );
            gl.bind_buffer(glow::PIXEL_PACK_BUFFER, None);
            gl.bind_framebuffer(glow::READ_FRAMEBUFFER, None);
            let fence = gl
                .fence_sync(glow::SYNC_GPU_COMMANDS_COMPLETE, 0)
                .map_err(RendererError::Readback)?;
            gl.flush();
            fence
        };
        self.in_flight.push_back(Readback {
            buffer,
            fence,
            width,
            height,
        });
        self.next_readback = (self.next_readback + 1) % MAX_CAPTURES_IN_FLIGHT;
        Ok(())
    }

    fn finish_capture(&mut self, wait: bool) -> Result<Option<CapturedFrame>> {
        let Some(&readback) = self.in_flight.front() else {
            return Ok(None);
        };
        match unsafe { self.fence_signaled(readback.fence, wait) } {
            Ok(false) => return Ok(None),
            Ok(true) => {}
            Err(err) => {
                self.in_flight.pop_front();
                unsafe { self.gl.delete_sync(readback.fence) };
                return Err(err);
            }
        }
        self.in_flight.pop_front();

        let row_stride = packed_row_stride(readback.width);
        let mut pixels = vec![0u8; row_stride * readback.height as usize];
        let gl = &self.gl;
        unsafe {
            gl.delete_sync(readback.fence);
            gl.bind_buffer(glow::PIXEL_PACK_BUFFER, Some(readback.buffer));
            gl.get_buffer_sub_data(glow::PIXEL_PACK_BUFFER, 0, &mut pixels);
            gl.bind_buffer(glow::PIXEL_PACK_BUFFER, None);
            let error = gl.get_error();
            if error != glow::NO_ERROR {
                return Err(RendererError::Readback(format!("pack buffer read error {error:#x}")));
            }
        }
        Ok(Some(CapturedFrame {
            width: readback.width,
            height: readback.height,
            row_stride,
            pixels,
        }))
    }

    fn captures_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        unsafe {
            self.discard_readbacks();
            if let Some(targets) = self.targets.take() {
                self.delete_targets(&targets);
            }
            let gl = &self.gl;
            gl.delete_program(self.seed_program);
            gl.delete_program(self.flood_program);
            gl.delete_program(self.copy_program);
            gl.delete_program(self.composite_program);
            gl.delete_vertex_array(self.vao);
            gl.delete_buffer(self.vbo);
        }
        self.released = true;
        debug!("GL backend released");
    }
}
