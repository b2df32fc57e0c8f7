use std::rc::Rc;

use crate::animate::LayerAnimation;
use crate::assets::masks::MaskFrameSet;
use crate::foundation::core::{Canvas, RasterImage};
use crate::foundation::error::ScrubResult;
use crate::host::{MediaElement, RenderSurface};
use crate::render::backend::{CompositeBackend, FrameRGBA, TextureSlot};
use crate::render::staging::StagingRasterizer;

/// Where the scale-driven video blur is applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlurMode {
    /// Blur the video staging raster directly.
    Raster,
    /// The surface cannot filter; approximate with a CSS blur on the media elements.
    CssFallback,
}

impl BlurMode {
    pub fn detect(surface: &dyn RenderSurface) -> Self {
        if surface.supports_canvas_filter() {
            BlurMode::Raster
        } else {
            BlurMode::CssFallback
        }
    }
}

/// Live sources sampled by one draw tick.
pub struct FrameInputs<'a> {
    pub video: &'a dyn MediaElement,
    pub masks: &'a MaskFrameSet,
    pub frame_index: usize,
    pub overlay: Option<&'a RasterImage>,
}

/// Result of one compose call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComposeOutcome {
    Drawn,
    /// No mask frame at all was available; nothing was drawn.
    MaskUnavailable,
}

/// Rasterizes the three layers, uploads them in order (video, mask, overlay) and draws once.
pub struct FrameCompositor {
    backend: Box<dyn CompositeBackend>,
    staging: StagingRasterizer,
    blur_mode: BlurMode,
    blur_targets: Vec<Rc<dyn MediaElement>>,
    css_blur: Option<u32>,
    draws: u64,
}

impl FrameCompositor {
    /// `blur_targets` are the media elements styled by the CSS blur fallback.
    pub fn new(
        backend: Box<dyn CompositeBackend>,
        blur_mode: BlurMode,
        blur_targets: Vec<Rc<dyn MediaElement>>,
    ) -> ScrubResult<Self> {
        let staging = StagingRasterizer::new(backend.viewport())?;
        Ok(Self {
            backend,
            staging,
            blur_mode,
            blur_targets,
            css_blur: None,
            draws: 0,
        })
    }

    pub fn viewport(&self) -> Canvas {
        self.backend.viewport()
    }

    pub fn blur_mode(&self) -> BlurMode {
        self.blur_mode
    }

    /// Number of completed draw calls.
    pub fn draws(&self) -> u64 {
        self.draws
    }

    pub fn compose(
        &mut self,
        anim: &mut LayerAnimation,
        inputs: FrameInputs<'_>,
    ) -> ScrubResult<ComposeOutcome> {
        let tick = anim.tick_video();
        let raster_blur = match self.blur_mode {
            BlurMode::Raster => tick.blur_px,
            BlurMode::CssFallback => {
                self.apply_css_blur(tick.blur_px);
                0.0
            }
        };
        let frame = inputs.video.current_frame();
        let video = self.staging.video_layer(
            frame.as_ref(),
            inputs.video.intrinsic_size(),
            tick.scale,
            raster_blur,
        )?;
        self.backend.upload(TextureSlot::Video, &video)?;

        let Some(mask) = inputs.masks.select(inputs.frame_index) else {
            tracing::trace!(frame = inputs.frame_index, "no mask frame available yet");
            return Ok(ComposeOutcome::MaskUnavailable);
        };
        let mask = self.staging.mask_layer(mask)?;
        self.backend.upload(TextureSlot::Mask, &mask)?;

        let overlay_scale = inputs.overlay.map(|_| anim.tick_overlay()).unwrap_or(1.0);
        let overlay = self.staging.overlay_layer(inputs.overlay, overlay_scale)?;
        self.backend.upload(TextureSlot::Overlay, &overlay)?;

        self.backend.draw()?;
        self.draws += 1;
        Ok(ComposeOutcome::Drawn)
    }

    pub fn read_frame(&mut self) -> ScrubResult<FrameRGBA> {
        self.backend.readback_rgba8()
    }

    fn apply_css_blur(&mut self, blur_px: f64) {
        let rounded = blur_px.round();
        let next = (rounded > 0.0).then_some(rounded as u32);
        if next == self.css_blur {
            return;
        }
        self.css_blur = next;
        for media in &self.blur_targets {
            media.set_css_blur(next);
        }
    }

    /// Clear any CSS blur and release the backend.
    pub fn release(&mut self) {
        for media in &self.blur_targets {
            media.set_css_blur(None);
        }
        self.css_blur = None;
        self.backend.release();
    }
}
