//! The Jump Flood pass engine.
//!
//! Computes, for every texel, the nearest boundary seed of a mask in
//! ⌈log2(max(width, height))⌉ flood passes over a ping/pong pair:
//!
//! 1. **Seed**: boundary texels (inside texels with an outside 4-neighbour
//!    and vice versa) store their own coordinate; all others are unseeded.
//! 2. **Flood**: for steps `next_power_of_two(max) / 2, ..., 2, 1`, each
//!    texel inspects itself and its 8 neighbours at the step distance and
//!    keeps the closest seed.
//! 3. **Canonicalize**: if the last pass wrote [`Slot::Pong`], it is copied
//!    into [`Slot::Ping`], so consumers always read the field from `Ping`.
//!
//! Ties are broken by candidate order: [`NEIGHBOURHOOD`] is scanned in order
//! and a candidate must be strictly closer to replace the current best, so
//! the lowest index wins. The GLSL flood shader scans the same order.
//!
//! The kernels in this module are the CPU reference for the shaders.

use tracing::debug;

use crate::backend::Backend;
use crate::error::Result;
use crate::types::{FieldTexel, Mask, Slot};

/// Candidate offsets of a flood pass, in units of the step. Self first,
/// then the 8 neighbours in row-major order.
pub const NEIGHBOURHOOD: [(i64, i64); 9] = [
    (0, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Step sizes of the flood passes for a target, largest first.
///
/// Empty for targets whose larger side is at most one pixel.
#[must_use]
pub fn flood_steps(width: u32, height: u32) -> Vec<u32> {
    let largest = width.max(height);
    let mut step = largest.checked_next_power_of_two().unwrap_or(1 << 31) / 2;
    let mut steps = Vec::new();
    while step >= 1 {
        steps.push(step);
        step /= 2;
    }
    steps
}

/// Explicit read/write roles of the ping/pong pair for the next pass.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PingPong {
    /// Slot sampled by the pass.
    pub read: Slot,
    /// Slot rendered by the pass.
    pub write: Slot,
}

impl PingPong {
    /// Roles after a pass that wrote `written`.
    #[must_use]
    pub fn after(written: Slot) -> Self {
        Self {
            read: written,
            write: written.other(),
        }
    }

    /// Roles for the pass after this one.
    #[must_use]
    pub fn swapped(self) -> Self {
        Self {
            read: self.write,
            write: self.read,
        }
    }
}

/// Outcome of a completed flood.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FloodReport {
    /// Number of flood passes run, excluding the seed and copy passes.
    pub passes: u32,
    /// Whether a copy into the canonical slot was needed.
    pub copied: bool,
}

/// Run the whole flood for `mask` on `backend`.
///
/// Targets must already be allocated at the mask's size. On error the
/// field slots hold partial results and must not be composited.
///
/// # Errors
///
/// Propagates the first failing backend pass.
pub fn run(backend: &mut dyn Backend, mask: &Mask) -> Result<FloodReport> {
    backend.upload_mask(mask)?;
    backend.seed_pass(Slot::Ping)?;

    let mut roles = PingPong::after(Slot::Ping);
    let mut written = Slot::Ping;
    let mut passes = 0;
    for step in flood_steps(mask.width, mask.height) {
        backend.flood_pass(roles.read, roles.write, step)?;
        written = roles.write;
        roles = roles.swapped();
        passes += 1;
    }

    let copied = written != Slot::Ping;
    if copied {
        backend.copy_pass(written, Slot::Ping)?;
    }

    debug!(
        backend = backend.name(),
        width = mask.width,
        height = mask.height,
        passes,
        "jump flood converged"
    );
    Ok(FloodReport { passes, copied })
}

/// Seed kernel: the initial texel at `(x, y)`.
#[must_use]
pub fn seed_texel(mask: &Mask, x: u32, y: u32) -> FieldTexel {
    let (xi, yi) = (i64::from(x), i64::from(y));
    let inside = mask.is_inside(xi, yi);
    let boundary = [(0, -1), (-1, 0), (1, 0), (0, 1)].iter().any(|&(dx, dy)| {
        mask.get(xi + dx, yi + dy)
            .is_some_and(|_| mask.is_inside(xi + dx, yi + dy) != inside)
    });
    if boundary {
        FieldTexel::seeded(x, y, inside)
    } else {
        FieldTexel::unseeded(inside)
    }
}

/// Flood kernel: the texel at `(x, y)` after one pass at `step` over
/// `read`, a row-major `width` x `height` field.
#[must_use]
pub fn flood_texel(read: &[FieldTexel], width: u32, height: u32, x: u32, y: u32, step: u32) -> FieldTexel {
    let (xi, yi, step) = (i64::from(x), i64::from(y), i64::from(step));
    let (w, h) = (i64::from(width), i64::from(height));
    let own = read[texel_index(xi, yi, w)];

    let mut best: Option<([f32; 2], i64)> = None;
    for (ox, oy) in NEIGHBOURHOOD {
        let (sx, sy) = (xi + ox * step, yi + oy * step);
        if sx < 0 || sy < 0 || sx >= w || sy >= h {
            continue;
        }
        let candidate = read[texel_index(sx, sy, w)];
        if !candidate.is_seeded() {
            continue;
        }
        // Seeds are integer pixel indices stored exactly in f32.
        #[expect(clippy::cast_possible_truncation)]
        let (cx, cy) = (candidate.seed[0] as i64, candidate.seed[1] as i64);
        let distance = (xi - cx).pow(2) + (yi - cy).pow(2);
        if best.map_or(true, |(_, d)| distance < d) {
            best = Some((candidate.seed, distance));
        }
    }

    match best {
        Some((seed, _)) => FieldTexel {
            seed,
            inside: own.inside,
            has_seed: 1.0,
        },
        None => own,
    }
}

/// Row-major index of an in-bounds texel.
fn texel_index(x: i64, y: i64, width: i64) -> usize {
    // Callers bounds-check against u32 dimensions first.
    #[expect(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    let index = (y * width + x) as usize;
    index
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::compositor::CompositeUniforms;
    use crate::config::FieldPrecision;
    use crate::error::RendererError;
    use crate::types::CapturedFrame;

    fn ceil_log2(n: u32) -> u32 {
        32 - (n - 1).leading_zeros()
    }

    #[test]
    fn pass_counts_match_ceil_log2() {
        assert_eq!(flood_steps(64, 64).len(), 6);
        assert_eq!(flood_steps(100, 100).len(), 7);
        assert_eq!(flood_steps(256, 256).len(), 8);
        for n in [2, 3, 5, 17, 129, 1000, 2048, 4097] {
            assert_eq!(flood_steps(n, 1).len() as u32, ceil_log2(n), "n = {n}");
        }
    }

    #[test]
    fn steps_halve_down_to_one() {
        assert_eq!(flood_steps(100, 40), vec![64, 32, 16, 8, 4, 2, 1]);
        assert_eq!(flood_steps(3, 2), vec![2, 1]);
    }

    #[test]
    fn single_pixel_needs_no_flood() {
        assert!(flood_steps(1, 1).is_empty());
        assert!(flood_steps(0, 0).is_empty());
    }

    #[test]
    fn ping_pong_roles_alternate() {
        let roles = PingPong::after(Slot::Ping);
        assert_eq!(roles, PingPong { read: Slot::Ping, write: Slot::Pong });
        assert_eq!(roles.swapped(), PingPong { read: Slot::Pong, write: Slot::Ping });
    }

    fn square_mask() -> Mask {
        // 6x6 with a 2x2 inside block at (2..4, 2..4).
        let mut mask = Mask::empty(6, 6);
        for y in 2..4 {
            for x in 2..4 {
                mask.coverage[y * 6 + x] = 255;
            }
        }
        mask
    }

    #[test]
    fn seeds_lie_on_both_sides_of_the_boundary() {
        let mask = square_mask();
        assert!(seed_texel(&mask, 2, 2).is_seeded());
        assert!(seed_texel(&mask, 1, 2).is_seeded());
        assert!(!seed_texel(&mask, 0, 0).is_seeded());
        assert!(!seed_texel(&mask, 1, 1).is_seeded());
    }

    #[test]
    fn image_edges_are_not_boundaries() {
        let mut mask = Mask::empty(3, 3);
        mask.coverage.fill(255);
        assert!((0..3).all(|y| (0..3).all(|x| !seed_texel(&mask, x, y).is_seeded())));
    }

    #[test]
    fn ties_prefer_lowest_candidate_index() {
        // Two seeds equidistant from (2, 2) at step 2: (0, 0) is candidate 1
        // and (4, 0) is candidate 3.
        let (w, h) = (5, 5);
        let mut field = vec![FieldTexel::unseeded(false); 25];
        field[0] = FieldTexel::seeded(0, 0, false);
        field[4] = FieldTexel::seeded(4, 0, false);
        let out = flood_texel(&field, w, h, 2, 2, 2);
        assert_eq!(out.seed, [0.0, 0.0]);
    }

    #[test]
    fn flood_keeps_own_inside_flag() {
        let mut field = vec![FieldTexel::unseeded(true); 4];
        field[1] = FieldTexel::seeded(1, 0, false);
        let out = flood_texel(&field, 2, 2, 0, 0, 1);
        assert!(out.is_seeded());
        assert!(out.inside > 0.5);
    }

    /// Records the pass sequence instead of drawing.
    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
    }

    impl Backend for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }
        fn allocate(&mut self, _: u32, _: u32, _: FieldPrecision) -> Result<()> {
            Ok(())
        }
        fn upload_mask(&mut self, _: &Mask) -> Result<()> {
            self.calls.push("upload".into());
            Ok(())
        }
        fn seed_pass(&mut self, write: Slot) -> Result<()> {
            self.calls.push(format!("seed->{write:?}"));
            Ok(())
        }
        fn flood_pass(&mut self, read: Slot, write: Slot, step: u32) -> Result<()> {
            self.calls.push(format!("{read:?}->{write:?}@{step}"));
            Ok(())
        }
        fn copy_pass(&mut self, read: Slot, write: Slot) -> Result<()> {
            self.calls.push(format!("copy {read:?}->{write:?}"));
            Ok(())
        }
        fn composite(&mut self, _: Slot, _: &CompositeUniforms) -> Result<()> {
            Ok(())
        }
        fn begin_capture(&mut self) -> Result<()> {
            Err(RendererError::NotAllocated)
        }
        fn finish_capture(&mut self, _: bool) -> Result<Option<CapturedFrame>> {
            Ok(None)
        }
        fn captures_in_flight(&self) -> usize {
            0
        }
        fn release(&mut self) {}
    }

    #[test]
    fn odd_pass_count_copies_back_into_ping() {
        let mut backend = Recorder::default();
        let report = run(&mut backend, &Mask::empty(8, 8)).unwrap();
        assert_eq!(report, FloodReport { passes: 3, copied: true });
        assert_eq!(
            backend.calls,
            vec![
                "upload",
                "seed->Ping",
                "Ping->Pong@4",
                "Pong->Ping@2",
                "Ping->Pong@1",
                "copy Pong->Ping",
            ]
        );
    }

    #[test]
    fn even_pass_count_ends_in_ping() {
        let mut backend = Recorder::default();
        let report = run(&mut backend, &Mask::empty(4, 3)).unwrap();
        assert_eq!(report, FloodReport { passes: 2, copied: false });
        assert_eq!(backend.calls.last().unwrap(), "Pong->Ping@1");
    }
}
