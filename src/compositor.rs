//! The final composite: field + drop parameters → premultiplied RGBA.
//!
//! The reveal is the smooth intersection of the shape and a circular drop.
//! Where the drop approaches the shape's boundary, the blend radius lets it
//! bulge along the edge instead of meeting it at a hard corner, which gives
//! the "liquid" look.
//!
//! The functions here are the reference for `COMPOSITE_FRAGMENT_SRC`; the
//! software backend calls them directly.

use crate::config::RendererConfig;
use crate::types::{FieldTexel, RenderRequest};

/// Distance reported for texels no seed has reached.
///
/// Well inside half-precision range so GPU targets can store it.
pub const FAR_DISTANCE: f32 = 1.0e4;

/// Smallest blend radius in pixels; keeps the smooth max finite.
pub const MIN_BLEND: f32 = 1.0e-3;

/// Per-frame parameters of the composite pass, in pixels.
///
/// # Uniforms
///
/// | Name           | Type    | Description                               |
/// |----------------|---------|-------------------------------------------|
/// | `u_resolution` | `vec2`  | Target size in pixels                     |
/// | `u_drop`       | `vec2`  | Drop centre, row 0 at the top             |
/// | `u_radius`     | `float` | Drop radius                               |
/// | `u_blend`      | `float` | Smooth-max radius, at least [`MIN_BLEND`] |
/// | `u_tint`       | `vec4`  | Premultiplied liquid colour               |
/// | `u_flip_y`     | `bool`  | Mirror output rows                        |
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CompositeUniforms {
    /// Target size in pixels.
    pub resolution: [u32; 2],
    /// Drop centre in pixels.
    pub drop: [f32; 2],
    /// Drop radius in pixels.
    pub radius: f32,
    /// Smooth-max radius in pixels.
    pub blend: f32,
    /// Premultiplied liquid colour.
    pub tint: [f32; 4],
    /// Mirror output rows.
    pub flip_y: bool,
}

impl CompositeUniforms {
    /// Denormalize a request against the target size.
    #[must_use]
    pub fn new(request: &RenderRequest, [width, height]: [u32; 2], config: &RendererConfig) -> Self {
        // Target dimensions are small relative to f32 mantissa range.
        #[expect(clippy::cast_precision_loss)]
        let (w, h) = (width as f32, height as f32);
        let [r, g, b, a] = config.tint;
        Self {
            resolution: [width, height],
            drop: [request.drop_x * w, request.drop_y * h],
            radius: (request.drop_radius * w.max(h)).max(0.0),
            blend: (request.blend * w.min(h)).max(MIN_BLEND),
            tint: [r * a, g * a, b * a, a],
            flip_y: config.flip_y,
        }
    }

    /// Field row sampled for output row `row`.
    #[must_use]
    pub fn source_row(&self, row: u32) -> u32 {
        if self.flip_y {
            self.resolution[1].saturating_sub(1).saturating_sub(row)
        } else {
            row
        }
    }
}

/// Signed distance in pixels from texel `(x, y)` to the shape boundary,
/// negative inside.
///
/// Seeds sit on both sides of the boundary, so the boundary itself lies
/// half a pixel beyond the nearest seed.
#[must_use]
pub fn signed_distance(texel: &FieldTexel, x: u32, y: u32) -> f32 {
    let inside = texel.inside > 0.5;
    let distance = if texel.is_seeded() {
        // Pixel indices stay far below f32's exact-integer range.
        #[expect(clippy::cast_precision_loss)]
        let (dx, dy) = (x as f32 - texel.seed[0], y as f32 - texel.seed[1]);
        ((dx * dx + dy * dy).sqrt() + 0.5).min(FAR_DISTANCE)
    } else {
        FAR_DISTANCE
    };
    if inside {
        -distance
    } else {
        distance
    }
}

/// Polynomial smooth maximum of `a` and `b` over radius `k`.
#[must_use]
pub fn smooth_max(a: f32, b: f32, k: f32) -> f32 {
    let k = k.max(MIN_BLEND);
    let h = (0.5 - 0.5 * (b - a) / k).clamp(0.0, 1.0);
    b + (a - b) * h + k * h * (1.0 - h)
}

/// Coverage of the reveal at texel `(x, y)` given its field value.
#[must_use]
pub fn reveal_alpha(texel: &FieldTexel, x: u32, y: u32, uniforms: &CompositeUniforms) -> f32 {
    let shape = signed_distance(texel, x, y);
    // Pixel indices stay far below f32's exact-integer range.
    #[expect(clippy::cast_precision_loss)]
    let (px, py) = (x as f32 + 0.5, y as f32 + 0.5);
    let (dx, dy) = (px - uniforms.drop[0], py - uniforms.drop[1]);
    let drop = (dx * dx + dy * dy).sqrt() - uniforms.radius;
    let reveal = smooth_max(shape, drop, uniforms.blend);
    (0.5 - reveal).clamp(0.0, 1.0)
}

/// Premultiplied RGBA8 output for a coverage value.
#[must_use]
pub fn shade(alpha: f32, tint: [f32; 4]) -> [u8; 4] {
    // Values are clamped to 0..=255 before the cast.
    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    tint.map(|channel| ((channel * alpha).clamp(0.0, 1.0) * 255.0).round() as u8)
}
