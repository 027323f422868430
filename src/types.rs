//! Value types shared by the pipeline stages and backends.

use bytemuck::{Pod, Zeroable};

/// A vertex of the fullscreen quad, ready for the GPU.
#[cfg(feature = "glow")]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
#[repr(C)]
pub struct Vertex {
    pub position: [f32; 2],
}

/// Two triangles covering clip space.
#[cfg(feature = "glow")]
pub const FULLSCREEN_QUAD: [Vertex; 6] = [
    Vertex { position: [-1.0, -1.0] },
    Vertex { position: [1.0, -1.0] },
    Vertex { position: [1.0, 1.0] },
    Vertex { position: [-1.0, -1.0] },
    Vertex { position: [1.0, 1.0] },
    Vertex { position: [-1.0, 1.0] },
];

/// One of the two field targets of the ping/pong pair.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Slot {
    /// The canonical slot; holds the converged field after a flood.
    Ping,
    /// The scratch slot.
    Pong,
}

impl Slot {
    /// The other slot of the pair.
    #[must_use]
    pub fn other(self) -> Self {
        match self {
            Slot::Ping => Slot::Pong,
            Slot::Pong => Slot::Ping,
        }
    }

    /// Index into a two-element array of targets.
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Slot::Ping => 0,
            Slot::Pong => 1,
        }
    }
}

/// One texel of a field target.
///
/// Mirrors the RGBA channels of the GPU targets: the nearest seed's pixel
/// coordinate, whether the texel itself lies inside the shape, and whether
/// any seed has reached it yet.
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct FieldTexel {
    /// Nearest seed found so far, in pixels.
    pub seed: [f32; 2],
    /// `1.0` if the texel is inside the shape.
    pub inside: f32,
    /// `1.0` once a seed has reached the texel.
    pub has_seed: f32,
}

impl FieldTexel {
    /// A texel that no seed has reached.
    #[must_use]
    pub fn unseeded(inside: bool) -> Self {
        Self {
            seed: [0.0, 0.0],
            inside: if inside { 1.0 } else { 0.0 },
            has_seed: 0.0,
        }
    }

    /// A boundary texel seeded with its own coordinate.
    #[must_use]
    pub fn seeded(x: u32, y: u32, inside: bool) -> Self {
        // Pixel indices stay far below f32's exact-integer range.
        #[expect(clippy::cast_precision_loss)]
        let seed = [x as f32, y as f32];
        Self {
            seed,
            inside: if inside { 1.0 } else { 0.0 },
            has_seed: 1.0,
        }
    }

    /// Whether a seed has been propagated to this texel.
    #[must_use]
    pub fn is_seeded(&self) -> bool {
        self.has_seed > 0.5
    }
}

/// A single-channel coverage image of a shape.
///
/// Row 0 is the top row. Values are `0` (outside) to `255` (inside), with
/// intermediate values on anti-aliased edges.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mask {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Row-major coverage, `0..=255`.
    pub coverage: Vec<u8>,
}

impl Mask {
    /// An all-background mask.
    #[must_use]
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            coverage: vec![0; width as usize * height as usize],
        }
    }

    /// Coverage at `(x, y)`, or `None` outside the mask.
    #[must_use]
    pub fn get(&self, x: i64, y: i64) -> Option<u8> {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return None;
        }
        // Bounds were checked against u32 dimensions above.
        #[expect(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let index = y as usize * self.width as usize + x as usize;
        self.coverage.get(index).copied()
    }

    /// Whether `(x, y)` counts as inside the shape (coverage ≥ 50%).
    #[must_use]
    pub fn is_inside(&self, x: i64, y: i64) -> bool {
        self.get(x, y).is_some_and(|c| c >= MASK_THRESHOLD)
    }
}

/// Coverage at or above which a mask pixel is inside the shape.
pub const MASK_THRESHOLD: u8 = 128;

/// A composite request in normalized coordinates.
///
/// Ephemeral: one per requested frame, consumed by the compositor.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RenderRequest {
    /// Drop centre, `0.0..=1.0` across the width.
    pub drop_x: f32,
    /// Drop centre, `0.0..=1.0` down the height.
    pub drop_y: f32,
    /// Drop radius as a fraction of the larger target dimension.
    pub drop_radius: f32,
    /// Blend coefficient as a fraction of the smaller target dimension.
    pub blend: f32,
}

impl RenderRequest {
    /// A request with no smoothing between the drop and the shape.
    #[must_use]
    pub fn new(drop_x: f32, drop_y: f32, drop_radius: f32) -> Self {
        Self {
            drop_x,
            drop_y,
            drop_radius,
            blend: 0.0,
        }
    }

    /// Set the blend coefficient.
    #[must_use]
    pub fn with_blend(mut self, blend: f32) -> Self {
        self.blend = blend;
        self
    }

    /// Build a request from pixel coordinates against a target size.
    ///
    /// A zero dimension normalizes against one pixel instead of dividing by
    /// zero.
    #[must_use]
    pub fn from_pixels(x: f32, y: f32, radius: f32, blend: f32, [width, height]: [u32; 2]) -> Self {
        // Target dimensions are small relative to f32 mantissa range.
        #[expect(clippy::cast_precision_loss)]
        let (w, h) = (width.max(1) as f32, height.max(1) as f32);
        Self {
            drop_x: x / w,
            drop_y: y / h,
            drop_radius: radius / w.max(h),
            blend,
        }
    }
}

/// Raw RGBA8 pixels read back from the output surface.
///
/// Rows are `row_stride` bytes apart, which may exceed `width * 4`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapturedFrame {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Bytes between the starts of consecutive rows.
    pub row_stride: usize,
    /// Premultiplied RGBA8 rows, top row first.
    pub pixels: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_other_round_trips() {
        assert_eq!(Slot::Ping.other(), Slot::Pong);
        assert_eq!(Slot::Pong.other().other(), Slot::Pong);
        assert_ne!(Slot::Ping.index(), Slot::Pong.index());
    }

    #[test]
    fn mask_lookup_outside_bounds_is_none() {
        let mask = Mask::empty(4, 3);
        assert_eq!(mask.get(-1, 0), None);
        assert_eq!(mask.get(4, 0), None);
        assert_eq!(mask.get(0, 3), None);
        assert_eq!(mask.get(3, 2), Some(0));
        assert!(!mask.is_inside(3, 2));
    }

    #[test]
    fn from_pixels_normalizes_by_size() {
        let request = RenderRequest::from_pixels(50.0, 25.0, 20.0, 0.1, [100, 50]);
        assert!((request.drop_x - 0.5).abs() < f32::EPSILON);
        assert!((request.drop_y - 0.5).abs() < f32::EPSILON);
        assert!((request.drop_radius - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn from_pixels_with_zero_size_is_finite() {
        let request = RenderRequest::from_pixels(3.0, 3.0, 3.0, 0.0, [0, 0]);
        assert!(request.drop_x.is_finite());
        assert!(request.drop_radius.is_finite());
    }

    #[test]
    fn field_texel_casts_to_four_floats() {
        let texels = [FieldTexel::seeded(3, 4, true)];
        let floats: &[f32] = bytemuck::cast_slice(&texels);
        assert_eq!(floats, &[3.0, 4.0, 1.0, 1.0]);
    }
}
