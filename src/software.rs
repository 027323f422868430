//! A CPU backend running the same kernels as the GL shaders.
//!
//! Used when no GPU context is available and as the deterministic
//! reference in tests. Readback rows are padded to [`ROW_ALIGNMENT`] bytes,
//! as GPU readback buffers commonly are, so consumers must honour
//! [`CapturedFrame::row_stride`].

use std::collections::VecDeque;
use tracing::debug;

use crate::backend::Backend;
use crate::compositor::{self, CompositeUniforms};
use crate::config::FieldPrecision;
use crate::error::{RendererError, Result};
use crate::jfa;
use crate::types::{CapturedFrame, FieldTexel, Mask, Slot};

/// Byte alignment of each readback row.
pub const ROW_ALIGNMENT: usize = 256;

/// Largest supported dimension.
pub const MAX_DIMENSION: u32 = 16_384;

/// Targets of one allocation.
struct Targets {
    width: u32,
    height: u32,
    mask: Mask,
    fields: [Vec<FieldTexel>; 2],
    output: Vec<u8>,
}

/// CPU implementation of [`Backend`].
///
/// Captures complete as soon as they are started.
#[derive(Default)]
pub struct SoftwareBackend {
    targets: Option<Targets>,
    captures: VecDeque<CapturedFrame>,
}

impl SoftwareBackend {
    /// Create a backend with nothing allocated.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The texels of one field slot, row-major.
    #[must_use]
    pub fn field(&self, slot: Slot) -> Option<&[FieldTexel]> {
        self.targets
            .as_ref()
            .map(|targets| targets.fields[slot.index()].as_slice())
    }

    fn targets(&mut self) -> Result<&mut Targets> {
        self.targets.as_mut().ok_or(RendererError::NotAllocated)
    }
}

/// Bytes per readback row for a given width.
#[must_use]
pub fn padded_row_stride(width: u32) -> usize {
    (width as usize * 4).div_ceil(ROW_ALIGNMENT) * ROW_ALIGNMENT
}

impl Backend for SoftwareBackend {
    fn name(&self) -> &'static str {
        "software"
    }

    fn allocate(&mut self, width: u32, height: u32, precision: FieldPrecision) -> Result<()> {
        if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(RendererError::UnsupportedSize { width, height });
        }
        let texels = width as usize * height as usize;
        self.targets = Some(Targets {
            width,
            height,
            mask: Mask::empty(width, height),
            fields: [
                vec![FieldTexel::unseeded(false); texels],
                vec![FieldTexel::unseeded(false); texels],
            ],
            output: vec![0; padded_row_stride(width) * height as usize],
        });
        self.captures.clear();
        // Seeds are stored in f32 here; half precision only matters to GPUs.
        debug!(width, height, ?precision, "software targets allocated");
        Ok(())
    }

    fn upload_mask(&mut self, mask: &Mask) -> Result<()> {
        let targets = self.targets()?;
        if mask.width != targets.width || mask.height != targets.height {
            return Err(RendererError::UnsupportedSize {
                width: mask.width,
                height: mask.height,
            });
        }
        targets.mask = mask.clone();
        Ok(())
    }

    fn seed_pass(&mut self, write: Slot) -> Result<()> {
        let targets = self.targets()?;
        let (w, h) = (targets.width, targets.height);
        let seeded: Vec<FieldTexel> = (0..h)
            .flat_map(|y| (0..w).map(move |x| (x, y)))
            .map(|(x, y)| jfa::seed_texel(&targets.mask, x, y))
            .collect();
        targets.fields[write.index()] = seeded;
        Ok(())
    }

    fn flood_pass(&mut self, read: Slot, write: Slot, step: u32) -> Result<()> {
        let targets = self.targets()?;
        let (w, h) = (targets.width, targets.height);
        let source = &targets.fields[read.index()];
        let flooded: Vec<FieldTexel> = (0..h)
            .flat_map(|y| (0..w).map(move |x| (x, y)))
            .map(|(x, y)| jfa::flood_texel(source, w, h, x, y, step))
            .collect();
        targets.fields[write.index()] = flooded;
        Ok(())
    }

    fn copy_pass(&mut self, read: Slot, write: Slot) -> Result<()> {
        let targets = self.targets()?;
        let source = targets.fields[read.index()].clone();
        targets.fields[write.index()] = source;
        Ok(())
    }

    fn composite(&mut self, field: Slot, uniforms: &CompositeUniforms) -> Result<()> {
        let targets = self.targets()?;
        let (w, h) = (targets.width, targets.height);
        let stride = padded_row_stride(w);
        let texels = &targets.fields[field.index()];
        for row in 0..h {
            let y = uniforms.source_row(row);
            let line = &mut targets.output[row as usize * stride..][..w as usize * 4];
            for (x, pixel) in (0..w).zip(line.chunks_exact_mut(4)) {
                let texel = &texels[y as usize * w as usize + x as usize];
                let alpha = compositor::reveal_alpha(texel, x, y, uniforms);
                pixel.copy_from_slice(&compositor::shade(alpha, uniforms.tint));
            }
        }
        Ok(())
    }

    fn begin_capture(&mut self) -> Result<()> {
        let targets = self.targets()?;
        let frame = CapturedFrame {
            width: targets.width,
            height: targets.height,
            row_stride: padded_row_stride(targets.width),
            pixels: targets.output.clone(),
        };
        self.captures.push_back(frame);
        Ok(())
    }

    fn finish_capture(&mut self, _wait: bool) -> Result<Option<CapturedFrame>> {
        Ok(self.captures.pop_front())
    }

    fn captures_in_flight(&self) -> usize {
        self.captures.len()
    }

    fn release(&mut self) {
        self.targets = None;
        self.captures.clear();
    }
}
