use crate::config::BlendParams;
use crate::foundation::core::Canvas;
use crate::foundation::error::{ScrubError, ScrubResult};

/// A rendered frame as RGBA8 pixels.
#[derive(Clone, Debug)]
pub struct FrameRGBA {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// RGBA8 bytes, tightly packed, row-major.
    pub data: Vec<u8>,
    /// Whether the `data` is premultiplied alpha.
    pub premultiplied: bool,
}

impl FrameRGBA {
    /// Convert to straight alpha, as image encoders expect.
    pub fn into_straight(mut self) -> Self {
        if self.premultiplied {
            crate::foundation::core::unpremultiply_rgba8_in_place(&mut self.data);
            self.premultiplied = false;
        }
        self
    }
}

/// The three texture units sampled by the fragment stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureSlot {
    Video = 0,
    Mask = 1,
    Overlay = 2,
}

impl TextureSlot {
    pub const ALL: [TextureSlot; 3] = [TextureSlot::Video, TextureSlot::Mask, TextureSlot::Overlay];

    pub fn unit(self) -> usize {
        self as usize
    }
}

/// Straight-alpha RGBA8 texel data ready for upload.
#[derive(Clone, Debug)]
pub struct Texels {
    pub width: u32,
    pub height: u32,
    pub rgba8: Vec<u8>,
}

impl Texels {
    pub fn transparent(canvas: Canvas) -> Self {
        Self {
            width: canvas.width,
            height: canvas.height,
            rgba8: vec![0u8; canvas.pixel_count().saturating_mul(4)],
        }
    }

    pub(crate) fn check(&self, expect: Canvas) -> ScrubResult<()> {
        if self.width != expect.width || self.height != expect.height {
            return Err(ScrubError::evaluation(format!(
                "texture upload is {}x{}, viewport is {}x{}",
                self.width, self.height, expect.width, expect.height
            )));
        }
        if self.rgba8.len() != expect.rgba8_len()? {
            return Err(ScrubError::evaluation("texel buffer length mismatch"));
        }
        Ok(())
    }
}

/// Validated blend parameters; the CPU analogue of a linked shader program.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlendProgram {
    params: BlendParams,
}

impl BlendProgram {
    /// Validate `params`. Invalid parameters fail the way a program link would.
    pub fn compile(params: BlendParams) -> ScrubResult<Self> {
        for (name, v) in [
            ("lighten opacity", params.lighten_opacity),
            ("overlay opacity", params.overlay_opacity),
        ] {
            if !v.is_finite() || !(0.0..=1.0).contains(&v) {
                return Err(ScrubError::shader(format!(
                    "{name} must be within [0, 1], got {v}"
                )));
            }
        }
        if !(params.alpha_edge0.is_finite()
            && params.alpha_edge1.is_finite()
            && params.alpha_edge0 < params.alpha_edge1)
        {
            return Err(ScrubError::shader(
                "alpha smoothstep edges must be finite and strictly increasing",
            ));
        }
        Ok(Self { params })
    }

    pub fn params(&self) -> BlendParams {
        self.params
    }
}

/// A rendering context able to run the three-texture blend over a full-viewport quad.
///
/// Uploads replace the slot's entire content. [`CompositeBackend::draw`] clears the target to
/// transparent and issues exactly one draw of the quad with all three units bound.
pub trait CompositeBackend {
    fn kind(&self) -> BackendKind;
    fn viewport(&self) -> Canvas;
    fn upload(&mut self, slot: TextureSlot, texels: &Texels) -> ScrubResult<()>;
    fn draw(&mut self) -> ScrubResult<()>;
    /// Read back the last drawn frame as premultiplied RGBA8.
    fn readback_rgba8(&mut self) -> ScrubResult<FrameRGBA>;
    /// Release every GPU-side resource. Later calls are no-ops; uploads and draws then fail.
    fn release(&mut self);
}

/// Available backend kinds.
///
/// - `Cpu` is always available.
/// - `Gpu` requires the `gpu` feature.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    /// Software evaluation of the blend program.
    Cpu,
    /// `wgpu` render pipeline.
    #[cfg(feature = "gpu")]
    Gpu,
}

/// Create a backend and compile its blend program for `viewport`.
///
/// Program failures are [`ScrubError::Shader`]; a missing adapter or device is
/// [`ScrubError::Environment`].
pub fn create_backend(
    kind: BackendKind,
    viewport: Canvas,
    params: BlendParams,
) -> ScrubResult<Box<dyn CompositeBackend>> {
    let program = BlendProgram::compile(params)?;
    match kind {
        BackendKind::Cpu => Ok(Box::new(crate::render::cpu::CpuBackend::new(
            viewport, program,
        ))),
        #[cfg(feature = "gpu")]
        BackendKind::Gpu => Ok(Box::new(crate::render::gpu::GpuBackend::new(
            viewport,
            program,
            crate::render::shader::BLEND_WGSL,
        )?)),
    }
}
