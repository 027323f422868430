//! Vector shapes backed by [lyon] paths.
//!
//! A [`Shape`] is immutable once built and cheap to clone. Its path lives in
//! a local coordinate space spanning `[0, extent.x] x [0, extent.y]`, which
//! the rasterizer stretches over the whole render target.
//!
//! [lyon]: https://docs.rs/lyon

use lyon::math::{point, Point};
use lyon::path::{Path as LyonPath, PathEvent};
use std::sync::Arc;

/// Cubic Bézier control distance approximating a quarter circle.
const KAPPA: f32 = 0.552_284_8;

/// An immutable filled vector shape.
#[derive(Clone, Debug)]
pub struct Shape {
    path: Arc<LyonPath>,
    extent: [f32; 2],
}

impl Shape {
    /// Start building a shape whose local space is the unit square.
    #[must_use]
    pub fn builder() -> ShapeBuilder {
        ShapeBuilder::with_extent(1.0, 1.0)
    }

    /// A shape with no geometry. Rasterizes to an all-background mask.
    #[must_use]
    pub fn empty() -> Self {
        Self::builder().finish()
    }

    /// A circle in unit-square coordinates.
    #[must_use]
    pub fn circle(cx: f32, cy: f32, radius: f32) -> Self {
        let mut builder = Self::builder();
        builder.add_ellipse(cx, cy, radius, radius);
        builder.finish()
    }

    /// An axis-aligned rectangle in unit-square coordinates.
    #[must_use]
    pub fn rectangle(x: f32, y: f32, width: f32, height: f32) -> Self {
        let mut builder = Self::builder();
        builder.move_to(x, y);
        builder.line_to(x + width, y);
        builder.line_to(x + width, y + height);
        builder.line_to(x, y + height);
        builder.close();
        builder.finish()
    }

    /// The underlying lyon path.
    #[must_use]
    pub fn path(&self) -> &LyonPath {
        &self.path
    }

    /// Size of the local coordinate space.
    #[must_use]
    pub fn extent(&self) -> [f32; 2] {
        self.extent
    }

    /// Whether the path has no drawing commands.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.path.iter().next().is_none()
    }

    /// Number of sub-paths.
    #[must_use]
    pub fn subpath_count(&self) -> usize {
        self.path
            .iter()
            .filter(|event| matches!(event, PathEvent::Begin { .. }))
            .count()
    }
}

impl PartialEq for Shape {
    /// Shapes are equal if they share a path or their commands match.
    fn eq(&self, other: &Self) -> bool {
        if self.extent != other.extent {
            return false;
        }
        Arc::ptr_eq(&self.path, &other.path) || self.path.iter().eq(other.path.iter())
    }
}

/// Builder producing a [`Shape`] on [`finish`](Self::finish).
///
/// Sub-paths are opened and closed implicitly, so `move_to` may follow an
/// unclosed sub-path and drawing commands may be issued without a leading
/// `move_to`.
pub struct ShapeBuilder {
    builder: lyon::path::path::Builder,
    extent: [f32; 2],
    cursor: Point,
    open: bool,
}

impl ShapeBuilder {
    /// Start building a shape with a custom local coordinate space.
    #[must_use]
    pub fn with_extent(width: f32, height: f32) -> Self {
        Self {
            builder: LyonPath::builder(),
            extent: [width, height],
            cursor: point(0.0, 0.0),
            open: false,
        }
    }

    /// Begin a new sub-path at `(x, y)`.
    pub fn move_to(&mut self, x: f32, y: f32) {
        if self.open {
            self.builder.end(false);
        }
        self.builder.begin(point(x, y));
        self.cursor = point(x, y);
        self.open = true;
    }

    /// Straight segment to `(x, y)`.
    pub fn line_to(&mut self, x: f32, y: f32) {
        self.ensure_open();
        self.builder.line_to(point(x, y));
        self.cursor = point(x, y);
    }

    /// Quadratic Bézier segment to `(x, y)`.
    pub fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        self.ensure_open();
        self.builder
            .quadratic_bezier_to(point(x1, y1), point(x, y));
        self.cursor = point(x, y);
    }

    /// Cubic Bézier segment to `(x, y)`.
    pub fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        self.ensure_open();
        self.builder
            .cubic_bezier_to(point(x1, y1), point(x2, y2), point(x, y));
        self.cursor = point(x, y);
    }

    /// Close the current sub-path.
    pub fn close(&mut self) {
        if self.open {
            self.builder.close();
            self.open = false;
        }
    }

    /// Append a closed ellipse as its own sub-path.
    pub fn add_ellipse(&mut self, cx: f32, cy: f32, rx: f32, ry: f32) {
        let (kx, ky) = (rx * KAPPA, ry * KAPPA);
        self.move_to(cx + rx, cy);
        self.curve_to(cx + rx, cy + ky, cx + kx, cy + ry, cx, cy + ry);
        self.curve_to(cx - kx, cy + ry, cx - rx, cy + ky, cx - rx, cy);
        self.curve_to(cx - rx, cy - ky, cx - kx, cy - ry, cx, cy - ry);
        self.curve_to(cx + kx, cy - ry, cx + rx, cy - ky, cx + rx, cy);
        self.close();
    }

    /// Finish building. An unclosed trailing sub-path is closed, since the
    /// shape is always filled.
    #[must_use]
    pub fn finish(mut self) -> Shape {
        self.close();
        Shape {
            path: Arc::new(self.builder.build()),
            extent: self.extent,
        }
    }

    fn ensure_open(&mut self) {
        if !self.open {
            let cursor = self.cursor;
            self.builder.begin(cursor);
            self.open = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_shape_has_no_commands() {
        assert!(Shape::empty().is_empty());
        assert!(!Shape::circle(0.5, 0.5, 0.25).is_empty());
    }

    #[test]
    fn clones_compare_equal_by_reference() {
        let a = Shape::circle(0.5, 0.5, 0.25);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn separately_built_identical_shapes_compare_equal() {
        assert_eq!(
            Shape::rectangle(0.1, 0.1, 0.5, 0.5),
            Shape::rectangle(0.1, 0.1, 0.5, 0.5)
        );
        assert_ne!(
            Shape::rectangle(0.1, 0.1, 0.5, 0.5),
            Shape::rectangle(0.1, 0.1, 0.5, 0.6)
        );
    }

    #[test]
    fn extent_participates_in_equality() {
        let mut a = ShapeBuilder::with_extent(2.0, 2.0);
        a.move_to(0.0, 0.0);
        a.line_to(1.0, 0.0);
        a.line_to(1.0, 1.0);
        let mut b = Shape::builder();
        b.move_to(0.0, 0.0);
        b.line_to(1.0, 0.0);
        b.line_to(1.0, 1.0);
        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn implicit_subpaths_are_balanced() {
        let mut builder = Shape::builder();
        builder.line_to(0.5, 0.0);
        builder.line_to(0.5, 0.5);
        builder.move_to(0.6, 0.6);
        builder.line_to(0.9, 0.6);
        builder.line_to(0.9, 0.9);
        let shape = builder.finish();
        assert_eq!(shape.subpath_count(), 2);
    }
}
