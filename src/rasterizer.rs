//! Shape rasterization into coverage masks using [tiny-skia].
//!
//! Runs entirely on the CPU. The resulting [`Mask`] is uploaded by the
//! backend with nearest filtering and clamped edges.
//!
//! [tiny-skia]: https://docs.rs/tiny-skia

use lyon::path::PathEvent;
use tiny_skia::{FillRule, Paint, PathBuilder, Pixmap, Transform};
use tracing::debug;

use crate::shape::Shape;
use crate::types::Mask;

/// Rasterize `shape` into a `width` x `height` coverage mask.
///
/// Foreground is `255`, background `0`, with anti-aliased edges. The shape's
/// local extent is stretched over the full target. Empty shapes and zero
/// sizes produce an all-background mask of the requested size.
#[must_use]
pub fn rasterize(shape: &Shape, width: u32, height: u32) -> Mask {
    let Some(mut pixmap) = Pixmap::new(width, height) else {
        return Mask::empty(width, height);
    };
    let Some(path) = build_path(shape) else {
        debug!(width, height, "empty shape, producing background mask");
        return Mask::empty(width, height);
    };

    let [extent_x, extent_y] = shape.extent();
    // Target dimensions are small relative to f32 mantissa range.
    #[expect(clippy::cast_precision_loss)]
    let transform = Transform::from_scale(
        width as f32 / extent_x.max(f32::EPSILON),
        height as f32 / extent_y.max(f32::EPSILON),
    );

    let mut paint = Paint::default();
    paint.set_color_rgba8(255, 255, 255, 255);
    paint.anti_alias = true;
    pixmap.fill_path(&path, &paint, FillRule::Winding, transform, None);

    // The pixmap is premultiplied, so alpha is exactly the coverage.
    let coverage = pixmap.pixels().iter().map(|p| p.alpha()).collect();
    debug!(width, height, subpaths = shape.subpath_count(), "shape rasterized");
    Mask {
        width,
        height,
        coverage,
    }
}

/// Convert a lyon path into a tiny-skia path.
///
/// Returns `None` when the shape has no fillable geometry.
fn build_path(shape: &Shape) -> Option<tiny_skia::Path> {
    let mut builder = PathBuilder::new();

    for event in shape.path().iter() {
        match event {
            PathEvent::Begin { at } => builder.move_to(at.x, at.y),
            PathEvent::Line { to, .. } => builder.line_to(to.x, to.y),
            PathEvent::Quadratic { ctrl, to, .. } => builder.quad_to(ctrl.x, ctrl.y, to.x, to.y),
            PathEvent::Cubic {
                ctrl1, ctrl2, to, ..
            } => builder.cubic_to(ctrl1.x, ctrl1.y, ctrl2.x, ctrl2.y, to.x, to.y),
            PathEvent::End { .. } => builder.close(),
        }
    }

    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coverage_at(mask: &Mask, x: u32, y: u32) -> u8 {
        mask.coverage[(y * mask.width + x) as usize]
    }

    #[test]
    fn circle_is_inside_at_centre_and_outside_at_corner() {
        let mask = rasterize(&Shape::circle(0.5, 0.5, 0.3), 64, 64);
        assert_eq!(mask.coverage.len(), 64 * 64);
        assert_eq!(coverage_at(&mask, 32, 32), 255);
        assert_eq!(coverage_at(&mask, 0, 0), 0);
    }

    #[test]
    fn edges_are_anti_aliased() {
        let mask = rasterize(&Shape::circle(0.5, 0.5, 0.3), 64, 64);
        assert!(mask.coverage.iter().any(|&c| c > 0 && c < 255));
    }

    #[test]
    fn empty_shape_is_all_background() {
        let mask = rasterize(&Shape::empty(), 32, 16);
        assert_eq!(mask.coverage.len(), 32 * 16);
        assert!(mask.coverage.iter().all(|&c| c == 0));
    }

    #[test]
    fn zero_size_yields_empty_mask() {
        let mask = rasterize(&Shape::circle(0.5, 0.5, 0.3), 0, 10);
        assert!(mask.coverage.is_empty());
    }

    #[test]
    fn rasterization_is_deterministic() {
        let shape = Shape::circle(0.4, 0.6, 0.25);
        assert_eq!(rasterize(&shape, 50, 70), rasterize(&shape, 50, 70));
    }

    #[test]
    fn row_zero_is_top() {
        let shape = Shape::rectangle(0.0, 0.0, 1.0, 0.25);
        let mask = rasterize(&shape, 8, 8);
        assert_eq!(coverage_at(&mask, 4, 0), 255);
        assert_eq!(coverage_at(&mask, 4, 7), 0);
    }
}
