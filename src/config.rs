//! Renderer configuration.

/// Largest dimension for which half-precision targets hold every integer
/// pixel coordinate exactly (binary16 has an 11-bit significand).
pub const HALF_PRECISION_MAX_DIMENSION: u32 = 2048;

/// Storage precision of the ping/pong field targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldPrecision {
    /// Half precision while it is exact for the target size, full otherwise.
    #[default]
    Auto,
    /// Always 16-bit floats.
    Half,
    /// Always 32-bit floats.
    Full,
}

impl FieldPrecision {
    /// Resolve [`Auto`](Self::Auto) against a concrete target size.
    ///
    /// Never returns `Auto`.
    #[must_use]
    pub fn resolve(self, width: u32, height: u32) -> Self {
        match self {
            FieldPrecision::Auto if width.max(height) <= HALF_PRECISION_MAX_DIMENSION => {
                FieldPrecision::Half
            }
            FieldPrecision::Auto => FieldPrecision::Full,
            other => other,
        }
    }
}

/// Tunables for a [`LiquidRenderer`](crate::LiquidRenderer).
#[derive(Debug, Clone, PartialEq)]
pub struct RendererConfig {
    /// Mirror the composited output vertically, for surfaces whose row
    /// order is bottom-to-top relative to the image consumer.
    pub flip_y: bool,
    /// Blend coefficient used by
    /// [`request_render`](crate::LiquidRenderer::request_render), as a
    /// fraction of the smaller target dimension.
    pub blend: f32,
    /// Straight-alpha RGBA colour of the liquid.
    pub tint: [f32; 4],
    /// Storage format of the field targets.
    pub field_precision: FieldPrecision,
    /// Prefix for the names of the worker and delivery threads.
    pub thread_name: String,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            flip_y: false,
            blend: 0.08,
            tint: [1.0, 1.0, 1.0, 1.0],
            field_precision: FieldPrecision::Auto,
            thread_name: String::from("liquid-field"),
        }
    }
}

impl RendererConfig {
    /// Set [`flip_y`](Self::flip_y).
    #[must_use]
    pub fn with_flip_y(mut self, flip_y: bool) -> Self {
        self.flip_y = flip_y;
        self
    }

    /// Set [`blend`](Self::blend). Negative values are clamped to zero.
    #[must_use]
    pub fn with_blend(mut self, blend: f32) -> Self {
        self.blend = blend.max(0.0);
        self
    }

    /// Set [`tint`](Self::tint).
    #[must_use]
    pub fn with_tint(mut self, tint: [f32; 4]) -> Self {
        self.tint = tint;
        self
    }

    /// Set [`field_precision`](Self::field_precision).
    #[must_use]
    pub fn with_field_precision(mut self, precision: FieldPrecision) -> Self {
        self.field_precision = precision;
        self
    }

    /// Set [`thread_name`](Self::thread_name).
    #[must_use]
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_precision_switches_at_exact_limit() {
        assert_eq!(FieldPrecision::Auto.resolve(2048, 16), FieldPrecision::Half);
        assert_eq!(FieldPrecision::Auto.resolve(16, 2049), FieldPrecision::Full);
    }

    #[test]
    fn explicit_precision_is_kept() {
        assert_eq!(FieldPrecision::Half.resolve(4096, 4096), FieldPrecision::Half);
        assert_eq!(FieldPrecision::Full.resolve(1, 1), FieldPrecision::Full);
    }

    #[test]
    fn negative_blend_is_clamped() {
        let config = RendererConfig::default().with_blend(-1.0);
        assert!(config.blend.abs() < f32::EPSILON);
    }
}
