use rayon::prelude::*;

use crate::foundation::core::Canvas;
use crate::foundation::error::{ScrubError, ScrubResult};
use crate::foundation::math::{to_unorm8, unorm8};
use crate::render::backend::{
    BackendKind, BlendProgram, CompositeBackend, FrameRGBA, Texels, TextureSlot,
};
use crate::render::shader;

/// Software rendering context evaluating the blend program per pixel.
///
/// Every texture is viewport-sized, so each fragment samples its texels at their centers and
/// linear filtering reduces to a direct lookup.
pub struct CpuBackend {
    viewport: Canvas,
    program: BlendProgram,
    textures: [Option<Texels>; 3],
    target: Vec<u8>,
    released: bool,
}

impl CpuBackend {
    pub fn new(viewport: Canvas, program: BlendProgram) -> Self {
        Self {
            viewport,
            program,
            textures: [None, None, None],
            target: vec![0u8; viewport.pixel_count().saturating_mul(4)],
            released: false,
        }
    }

    fn ensure_live(&self, op: &str) -> ScrubResult<()> {
        if self.released {
            return Err(ScrubError::evaluation(format!(
                "{op} on a released cpu backend"
            )));
        }
        Ok(())
    }
}

impl CompositeBackend for CpuBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Cpu
    }

    fn viewport(&self) -> Canvas {
        self.viewport
    }

    fn upload(&mut self, slot: TextureSlot, texels: &Texels) -> ScrubResult<()> {
        self.ensure_live("upload")?;
        texels.check(self.viewport)?;
        match &mut self.textures[slot.unit()] {
            Some(existing) => existing.rgba8.copy_from_slice(&texels.rgba8),
            empty => *empty = Some(texels.clone()),
        }
        Ok(())
    }

    fn draw(&mut self) -> ScrubResult<()> {
        self.ensure_live("draw")?;
        let params = self.program.params();
        let row_len = self.viewport.width as usize * 4;
        if row_len == 0 {
            return Ok(());
        }
        let [video, mask, overlay] = &self.textures;
        let sample = |tex: &Option<Texels>, at: usize| -> [f32; 4] {
            match tex {
                Some(t) => std::array::from_fn(|c| unorm8(t.rgba8[at + c])),
                None => [0.0; 4],
            }
        };

        self.target
            .par_chunks_mut(row_len)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, px) in row.chunks_exact_mut(4).enumerate() {
                    let at = y * row_len + x * 4;
                    let out = shader::shade(
                        sample(video, at),
                        sample(mask, at),
                        sample(overlay, at),
                        &params,
                    );
                    // Straight-alpha fragment blended over the cleared (transparent) target.
                    let a = out[3];
                    px[0] = to_unorm8(out[0] * a);
                    px[1] = to_unorm8(out[1] * a);
                    px[2] = to_unorm8(out[2] * a);
                    px[3] = to_unorm8(a);
                }
            });
        Ok(())
    }

    fn readback_rgba8(&mut self) -> ScrubResult<FrameRGBA> {
        self.ensure_live("readback")?;
        Ok(FrameRGBA {
            width: self.viewport.width,
            height: self.viewport.height,
            data: self.target.clone(),
            premultiplied: true,
        })
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.textures = [None, None, None];
        self.target = Vec::new();
        tracing::debug!("cpu backend released");
    }
}
