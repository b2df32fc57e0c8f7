use crate::config::{BlurConfig, CompositorConfig, ScaleConfig};
use crate::foundation::math::{exp_smooth, ramp};

/// Exponentially smoothed, clamped layer scale.
#[derive(Clone, Copy, Debug)]
pub struct SmoothedScale {
    value: f64,
    target: f64,
    cfg: ScaleConfig,
}

impl SmoothedScale {
    pub fn new(cfg: ScaleConfig) -> Self {
        Self {
            value: cfg.initial,
            target: cfg.initial,
            cfg,
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn set_target(&mut self, target: f64) {
        self.target = target;
    }

    /// Advance one render tick and return the new scale.
    ///
    /// A non-finite result is replaced by the configured reset value before clamping, so the
    /// returned scale is always finite and inside `[min, max]`.
    pub fn tick(&mut self) -> f64 {
        let mut v = exp_smooth(self.value, self.target, self.cfg.smoothing);
        if !v.is_finite() {
            tracing::warn!(target_scale = self.target, "non-finite scale, resetting");
            v = self.cfg.reset;
        }
        self.value = v.clamp(self.cfg.min, self.cfg.max);
        self.value
    }
}

/// Blur magnitude that trails the video scale with its own, slower smoothing.
#[derive(Clone, Copy, Debug)]
pub struct BlurFollower {
    value: Option<f64>,
    cfg: BlurConfig,
}

impl BlurFollower {
    pub fn new(cfg: BlurConfig) -> Self {
        Self { value: None, cfg }
    }

    /// Blur in pixels the given scale asks for, before smoothing.
    pub fn target_for(&self, scale: f64) -> f64 {
        ramp(scale, self.cfg.scale_lo, self.cfg.scale_hi, self.cfg.max_px)
    }

    pub fn value(&self) -> f64 {
        self.value.unwrap_or(0.0)
    }

    /// Advance one tick toward the blur implied by `scale`.
    ///
    /// The first tick (and any tick after a non-finite value) snaps to the target.
    pub fn tick(&mut self, scale: f64) -> f64 {
        let mut target = self.target_for(scale);
        if !target.is_finite() {
            target = 0.0;
        }
        let current = match self.value {
            Some(v) if v.is_finite() => v,
            _ => target,
        };
        let next = exp_smooth(current, target, self.cfg.smoothing);
        let next = if next.is_finite() { next.max(0.0) } else { 0.0 };
        self.value = Some(next);
        next
    }
}

/// Per-instance animation of the video and overlay layers.
#[derive(Clone, Copy, Debug)]
pub struct LayerAnimation {
    pub video: SmoothedScale,
    pub overlay: SmoothedScale,
    pub blur: BlurFollower,
}

/// Values used for one video-layer draw.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VideoTick {
    pub scale: f64,
    pub blur_px: f64,
}

impl LayerAnimation {
    pub fn new(cfg: &CompositorConfig) -> Self {
        Self {
            video: SmoothedScale::new(cfg.video_scale),
            overlay: SmoothedScale::new(cfg.overlay_scale),
            blur: BlurFollower::new(cfg.blur),
        }
    }

    /// Advance the video layer. The blur follows the scale held *before* this tick's update.
    pub fn tick_video(&mut self) -> VideoTick {
        let blur_px = self.blur.tick(self.video.value());
        let scale = self.video.tick();
        VideoTick { scale, blur_px }
    }

    /// Advance the overlay layer; only called on ticks that draw an overlay.
    pub fn tick_overlay(&mut self) -> f64 {
        self.overlay.tick()
    }
}
