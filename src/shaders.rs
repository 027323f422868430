//! GLSL shader sources and compilation helpers.
//!
//! All shaders target GLSL 1.40 (OpenGL 3.1) and address texels with
//! `texelFetch`, so sampler filtering never blends neighbouring seeds.
//! Every program shares [`QUAD_VERTEX_SRC`] and is drawn as a fullscreen
//! quad into the target of the pass.

use glow::HasContext;

use crate::error::{RendererError, Result};

/// Vertex shader shared by every pass: clip-space positions pass through.
pub const QUAD_VERTEX_SRC: &str = r"#version 140

in vec2 a_position;

void main() {
    gl_Position = vec4(a_position, 0.0, 1.0);
}
";

/// Seed pass: boundary texels store their own coordinate.
///
/// Output texel layout is `(seed.x, seed.y, inside, has_seed)`. The mask is
/// sampled with clamped coordinates, so the image edge is never a boundary.
///
/// # Uniforms
///
/// | Name     | Type        | Description             |
/// |----------|-------------|-------------------------|
/// | `u_mask` | `sampler2D` | R8 coverage mask        |
/// | `u_size` | `ivec2`     | Target size in pixels   |
pub const SEED_FRAGMENT_SRC: &str = r"#version 140

uniform sampler2D u_mask;
uniform ivec2 u_size;

out vec4 frag_color;

bool inside_at(ivec2 p) {
    return texelFetch(u_mask, clamp(p, ivec2(0), u_size - 1), 0).r >= 0.5;
}

void main() {
    ivec2 p = ivec2(gl_FragCoord.xy);
    bool inside = inside_at(p);
    bool boundary = inside_at(p + ivec2(0, -1)) != inside
        || inside_at(p + ivec2(-1, 0)) != inside
        || inside_at(p + ivec2(1, 0)) != inside
        || inside_at(p + ivec2(0, 1)) != inside;

    float inside_flag = inside ? 1.0 : 0.0;
    if (boundary) {
        frag_color = vec4(vec2(p), inside_flag, 1.0);
    } else {
        frag_color = vec4(0.0, 0.0, inside_flag, 0.0);
    }
}
";

/// Flood pass: keep the closest seed among self and 8 neighbours at
/// `u_step`.
///
/// Candidates are scanned in a fixed order and must be strictly closer to
/// win, so equidistant seeds resolve to the lowest index.
///
/// # Uniforms
///
/// | Name      | Type        | Description                 |
/// |-----------|-------------|-----------------------------|
/// | `u_field` | `sampler2D` | Field written by last pass  |
/// | `u_size`  | `ivec2`     | Target size in pixels       |
/// | `u_step`  | `int`       | Jump distance in pixels     |
pub const FLOOD_FRAGMENT_SRC: &str = r"#version 140

uniform sampler2D u_field;
uniform ivec2 u_size;
uniform int u_step;

out vec4 frag_color;

const ivec2 OFFSETS[9] = ivec2[9](
    ivec2(0, 0),
    ivec2(-1, -1), ivec2(0, -1), ivec2(1, -1),
    ivec2(-1, 0), ivec2(1, 0),
    ivec2(-1, 1), ivec2(0, 1), ivec2(1, 1)
);

void main() {
    ivec2 p = ivec2(gl_FragCoord.xy);
    vec4 own = texelFetch(u_field, p, 0);
    vec4 best = own;
    float best_distance = -1.0;

    for (int i = 0; i < 9; i++) {
        ivec2 s = p + OFFSETS[i] * u_step;
        if (any(lessThan(s, ivec2(0))) || any(greaterThanEqual(s, u_size))) {
            continue;
        }
        vec4 candidate = texelFetch(u_field, s, 0);
        if (candidate.a < 0.5) {
            continue;
        }
        vec2 d = vec2(p) - candidate.xy;
        float dist = dot(d, d);
        if (best_distance < 0.0 || dist < best_distance) {
            best_distance = dist;
            best = vec4(candidate.xy, own.z, 1.0);
        }
    }

    frag_color = best;
}
";

/// Copy pass: texel-exact copy of `u_field`.
pub const COPY_FRAGMENT_SRC: &str = r"#version 140

uniform sampler2D u_field;

out vec4 frag_color;

void main() {
    frag_color = texelFetch(u_field, ivec2(gl_FragCoord.xy), 0);
}
";

/// Composite pass: smooth intersection of the shape and the drop.
///
/// See [`CompositeUniforms`](crate::compositor::CompositeUniforms) for the
/// uniform table. The constants match
/// [`FAR_DISTANCE`](crate::compositor::FAR_DISTANCE) and
/// [`MIN_BLEND`](crate::compositor::MIN_BLEND). Output is premultiplied.
pub const COMPOSITE_FRAGMENT_SRC: &str = r"#version 140

uniform sampler2D u_field;
uniform vec2 u_resolution;
uniform vec2 u_drop;
uniform float u_radius;
uniform float u_blend;
uniform vec4 u_tint;
uniform bool u_flip_y;

out vec4 frag_color;

const float FAR_DISTANCE = 10000.0;
const float MIN_BLEND = 0.001;

void main() {
    ivec2 size = ivec2(u_resolution);
    ivec2 o = ivec2(gl_FragCoord.xy);
    ivec2 p = ivec2(o.x, u_flip_y ? size.y - 1 - o.y : o.y);
    vec4 texel = texelFetch(u_field, p, 0);

    float dist = texel.a > 0.5
        ? min(length(vec2(p) - texel.xy) + 0.5, FAR_DISTANCE)
        : FAR_DISTANCE;
    float shape = texel.z > 0.5 ? -dist : dist;
    float drop = length(vec2(p) + 0.5 - u_drop) - u_radius;

    // Smooth maximum: intersection with a liquid seam.
    float k = max(u_blend, MIN_BLEND);
    float h = clamp(0.5 - 0.5 * (drop - shape) / k, 0.0, 1.0);
    float reveal = drop + (shape - drop) * h + k * h * (1.0 - h);

    frag_color = u_tint * clamp(0.5 - reveal, 0.0, 1.0);
}
";

/// Compile a shader program from vertex and fragment source strings.
///
/// The compiled shader objects are detached and deleted once linking has
/// run, and nothing is leaked when a stage fails to compile, so only the
/// returned program handle needs to be cleaned up by the caller.
/// Attribute 0 is bound to `a_position` before linking.
///
/// # Safety
///
/// Requires a valid, current OpenGL context.
///
/// # Errors
///
/// Returns [`RendererError::ShaderCompile`] with the driver's log if
/// compilation or linking fails.
pub unsafe fn compile_program(
    gl: &glow::Context,
    vertex_src: &str,
    fragment_src: &str,
) -> Result<glow::Program> {
    let program = unsafe { gl.create_program() }.map_err(RendererError::ShaderCompile)?;

    let mut stages = Vec::with_capacity(2);
    for (stage, source) in [(glow::VERTEX_SHADER, vertex_src), (glow::FRAGMENT_SHADER, fragment_src)] {
        match unsafe { compile_shader(gl, stage, source) } {
            Ok(shader) => stages.push(shader),
            Err(err) => {
                unsafe {
                    for shader in stages {
                        gl.delete_shader(shader);
                    }
                    gl.delete_program(program);
                }
                return Err(err);
            }
        }
    }

    unsafe {
        for &shader in &stages {
            gl.attach_shader(program, shader);
        }
        // The quad's only attribute is fed from vertex array slot 0.
        gl.bind_attrib_location(program, 0, "a_position");
        gl.link_program(program);
        let linked = gl.get_program_link_status(program);

        // Linking or not, the stage objects are no longer needed.
        for shader in stages {
            gl.detach_shader(program, shader);
            gl.delete_shader(shader);
        }

        if !linked {
            let log = gl.get_program_info_log(program);
            gl.delete_program(program);
            return Err(RendererError::ShaderCompile(format!("program link error: {log}")));
        }
    }

    Ok(program)
}

/// Compile a single shader stage (vertex or fragment) from source.
///
/// # Safety
///
/// Requires a valid, current OpenGL context.
unsafe fn compile_shader(gl: &glow::Context, shader_type: u32, source: &str) -> Result<glow::Shader> {
    unsafe {
        let shader = gl
            .create_shader(shader_type)
            .map_err(RendererError::ShaderCompile)?;
        gl.shader_source(shader, source);
        gl.compile_shader(shader);

        if !gl.get_shader_compile_status(shader) {
            let log = gl.get_shader_info_log(shader);
            gl.delete_shader(shader);
            return Err(RendererError::ShaderCompile(format!("shader compile error: {log}")));
        }

        Ok(shader)
    }
}

/// Look up a uniform, failing if the linker dropped or never saw it.
///
/// # Safety
///
/// Requires a valid, current OpenGL context.
pub unsafe fn uniform(
    gl: &glow::Context,
    program: glow::Program,
    name: &str,
) -> Result<glow::UniformLocation> {
    unsafe { gl.get_uniform_location(program, name) }
        .ok_or_else(|| RendererError::ShaderCompile(format!("uniform {name} missing")))
}
