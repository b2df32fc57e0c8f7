use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;

use crate::foundation::core::{Canvas, WORKING_CANVAS};
use crate::foundation::error::{ScrubError, ScrubResult};

/// Tunables for one compositor instance.
///
/// Every field has a default, so a partial JSON document only needs the values it overrides.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompositorConfig {
    /// Number of mask frames addressed by the pointer.
    pub frame_count: usize,
    /// Working raster size.
    pub canvas: Canvas,
    /// Path template of the primary mask encoding. `{index}` expands to a 5-digit index.
    pub mask_primary_template: String,
    /// Path template of the fallback mask encoding.
    pub mask_fallback_template: String,
    pub video_scale: ScaleConfig,
    pub overlay_scale: ScaleConfig,
    pub blur: BlurConfig,
    pub blend: BlendParams,
    pub sync: SyncConfig,
}

/// Smoothed scale animation of one layer.
///
/// The video and overlay layers differ only in `max`, so an override block must name `max`; the
/// other fields fall back to the shared defaults.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScaleConfig {
    /// Starting value of both current and target scale.
    #[serde(default = "default_scale_initial")]
    pub initial: f64,
    /// Exponential smoothing factor applied per tick.
    #[serde(default = "default_scale_smoothing")]
    pub smoothing: f64,
    #[serde(default = "default_scale_min")]
    pub min: f64,
    pub max: f64,
    /// Value substituted when the smoothed scale turns non-finite.
    #[serde(default = "default_scale_reset")]
    pub reset: f64,
}

fn default_scale_initial() -> f64 {
    0.75
}

fn default_scale_smoothing() -> f64 {
    0.15
}

fn default_scale_min() -> f64 {
    0.3
}

fn default_scale_reset() -> f64 {
    1.0
}

/// Scale-driven blur of the video layer.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlurConfig {
    /// Scale at which blur starts.
    pub scale_lo: f64,
    /// Scale at which blur reaches `max_px`.
    pub scale_hi: f64,
    pub max_px: f64,
    pub smoothing: f64,
}

/// Fixed parameters of the fragment blend.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlendParams {
    /// Opacity of the lighten stage (video vs. mask).
    pub lighten_opacity: f32,
    /// Opacity of the overlay stage (running color vs. overlay layer).
    pub overlay_opacity: f32,
    /// Lower smoothstep edge applied to the mask alpha.
    pub alpha_edge0: f32,
    /// Upper smoothstep edge applied to the mask alpha.
    pub alpha_edge1: f32,
}

/// Background/logo video alignment.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    pub interval_ms: u64,
    /// Drift in seconds above which both clips are re-aligned.
    pub drift_threshold_s: f64,
    /// Distance from the clip end treated as end-of-stream.
    pub end_epsilon_s: f64,
    /// One-shot best-effort playback attempt after startup.
    pub autoplay_nudge_ms: u64,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            frame_count: 21,
            canvas: WORKING_CANVAS,
            mask_primary_template: "SOURCE/ELEMENT_3D/ELEMENT 3D_{index}.webp".to_string(),
            mask_fallback_template: "SOURCE/ELEMENT 3D/ELEMENT 3D_{index}.png".to_string(),
            video_scale: ScaleConfig::with_max(4.55),
            overlay_scale: ScaleConfig::with_max(600.0),
            blur: BlurConfig::default(),
            blend: BlendParams::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl Default for BlurConfig {
    fn default() -> Self {
        Self {
            scale_lo: 1.0,
            scale_hi: 10.0,
            max_px: 50.0,
            smoothing: 0.08,
        }
    }
}

impl Default for BlendParams {
    fn default() -> Self {
        Self {
            lighten_opacity: 0.25,
            overlay_opacity: 0.10,
            alpha_edge0: 0.0,
            alpha_edge1: 0.9,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            drift_threshold_s: 0.1,
            end_epsilon_s: 0.05,
            autoplay_nudge_ms: 100,
        }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn autoplay_nudge(&self) -> Duration {
        Duration::from_millis(self.autoplay_nudge_ms)
    }
}

impl CompositorConfig {
    /// Read a JSON config file; missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> ScrubResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config '{}'", path.display()))?;
        let cfg: Self = serde_json::from_str(&text)
            .map_err(|e| ScrubError::validation(format!("config json: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values the compositor cannot run with.
    pub fn validate(&self) -> ScrubResult<()> {
        if self.frame_count == 0 {
            return Err(ScrubError::validation("frame_count must be > 0"));
        }
        if self.canvas.width == 0 || self.canvas.height == 0 {
            return Err(ScrubError::validation("canvas must be non-empty"));
        }
        if self.canvas.width > u32::from(u16::MAX) || self.canvas.height > u32::from(u16::MAX) {
            return Err(ScrubError::validation("canvas exceeds u16 raster limits"));
        }
        for (name, t) in [
            ("mask_primary_template", &self.mask_primary_template),
            ("mask_fallback_template", &self.mask_fallback_template),
        ] {
            if !t.contains("{index}") {
                return Err(ScrubError::validation(format!(
                    "{name} must contain an {{index}} placeholder"
                )));
            }
        }
        self.video_scale.validate("video_scale")?;
        self.overlay_scale.validate("overlay_scale")?;

        let b = &self.blur;
        if !(b.scale_lo.is_finite() && b.scale_hi.is_finite() && b.scale_lo < b.scale_hi) {
            return Err(ScrubError::validation("blur scale range must be increasing"));
        }
        if !b.max_px.is_finite() || b.max_px < 0.0 {
            return Err(ScrubError::validation("blur max_px must be finite and >= 0"));
        }
        check_factor("blur.smoothing", b.smoothing)?;

        if self.sync.interval_ms == 0 {
            return Err(ScrubError::validation("sync interval must be > 0"));
        }
        if !(self.sync.drift_threshold_s.is_finite() && self.sync.drift_threshold_s >= 0.0) {
            return Err(ScrubError::validation("sync drift threshold must be >= 0"));
        }
        Ok(())
    }
}

impl ScaleConfig {
    fn with_max(max: f64) -> Self {
        Self {
            initial: default_scale_initial(),
            smoothing: default_scale_smoothing(),
            min: default_scale_min(),
            max,
            reset: default_scale_reset(),
        }
    }

    fn validate(&self, name: &str) -> ScrubResult<()> {
        if !(self.min.is_finite() && self.max.is_finite() && self.min <= self.max) {
            return Err(ScrubError::validation(format!(
                "{name}: clamp range must satisfy min <= max"
            )));
        }
        if !self.initial.is_finite() || !self.reset.is_finite() {
            return Err(ScrubError::validation(format!(
                "{name}: initial and reset must be finite"
            )));
        }
        check_factor(&format!("{name}.smoothing"), self.smoothing)
    }
}

/// Substitute the 5-digit zero-padded `index` into a mask path template.
pub(crate) fn expand_index(template: &str, index: usize) -> String {
    template.replace("{index}", &format!("{index:05}"))
}

fn check_factor(name: &str, k: f64) -> ScrubResult<()> {
    if !(k.is_finite() && k > 0.0 && k <= 1.0) {
        return Err(ScrubError::validation(format!("{name} must be in (0, 1]")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        CompositorConfig::default().validate().unwrap();
    }

    #[test]
    fn mask_paths_are_zero_padded() {
        let cfg = CompositorConfig::default();
        assert_eq!(
            expand_index(&cfg.mask_primary_template, 7),
            "SOURCE/ELEMENT_3D/ELEMENT 3D_00007.webp"
        );
        assert_eq!(
            expand_index(&cfg.mask_fallback_template, 7),
            "SOURCE/ELEMENT 3D/ELEMENT 3D_00007.png"
        );
        assert!(expand_index(&cfg.mask_primary_template, 20).ends_with("_00020.webp"));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: CompositorConfig =
            serde_json::from_str(r#"{ "frame_count": 5, "sync": { "interval_ms": 250 } }"#).unwrap();
        assert_eq!(cfg.frame_count, 5);
        assert_eq!(cfg.sync.interval_ms, 250);
        assert_eq!(cfg.sync.drift_threshold_s, SyncConfig::default().drift_threshold_s);
        assert_eq!(cfg.sync.autoplay_nudge_ms, 100);
        assert_eq!(cfg.canvas, WORKING_CANVAS);
        assert_eq!(cfg.video_scale.max, 4.55);
    }

    #[test]
    fn partial_nested_blocks_fill_from_defaults() {
        let cfg: CompositorConfig = serde_json::from_str(
            r#"{ "blend": { "overlay_opacity": 0.2 }, "blur": { "max_px": 20.0 }, "overlay_scale": { "max": 80.0 } }"#,
        )
        .unwrap();
        assert_eq!(cfg.blend.overlay_opacity, 0.2);
        assert_eq!(cfg.blend.lighten_opacity, BlendParams::default().lighten_opacity);
        assert_eq!(cfg.blur.max_px, 20.0);
        assert_eq!(cfg.blur.smoothing, 0.08);
        assert_eq!(cfg.overlay_scale.max, 80.0);
        assert_eq!(cfg.overlay_scale.smoothing, 0.15);
        assert_eq!(cfg.overlay_scale.min, 0.3);
        cfg.validate().unwrap();

        let unknown = serde_json::from_str::<CompositorConfig>(r#"{ "sync": { "interval": 1 } }"#);
        assert!(unknown.is_err());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg = CompositorConfig::default();
        cfg.frame_count = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = CompositorConfig::default();
        cfg.video_scale.min = 5.0;
        assert!(cfg.validate().is_err());

        let mut cfg = CompositorConfig::default();
        cfg.mask_fallback_template = "masks/fixed.png".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = CompositorConfig::default();
        cfg.blur.smoothing = 0.0;
        assert!(cfg.validate().is_err());
    }
}
