use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use crate::animate::LayerAnimation;
use crate::assets::masks::MaskFrameSet;
use crate::config::CompositorConfig;
use crate::foundation::core::RasterImage;
use crate::schedule::RenderScheduler;

/// Shared teardown flag, checked first by every scheduled callback and listener.
#[derive(Clone, Debug, Default)]
pub struct DestroyFlag(Rc<Cell<bool>>);

impl DestroyFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag. Returns `true` only for the call that set it.
    pub fn raise(&self) -> bool {
        !self.0.replace(true)
    }

    pub fn is_raised(&self) -> bool {
        self.0.get()
    }
}

/// Mutable per-instance render state.
pub struct RenderState {
    pub frame_index: usize,
    pub anim: LayerAnimation,
    /// Set once the shared mask load has resolved.
    pub masks: Option<Arc<MaskFrameSet>>,
    pub overlay: Option<RasterImage>,
    pub scheduler: RenderScheduler,
    pub destroyed: DestroyFlag,
}

impl RenderState {
    pub fn new(cfg: &CompositorConfig, overlay: Option<RasterImage>, destroyed: DestroyFlag) -> Self {
        Self {
            frame_index: 0,
            anim: LayerAnimation::new(cfg),
            masks: None,
            overlay,
            scheduler: RenderScheduler::new(),
            destroyed,
        }
    }

    pub fn masks_ready(&self) -> bool {
        self.masks.is_some()
    }

    /// Drop every resource the state references.
    pub fn invalidate(&mut self) {
        self.masks = None;
        self.overlay = None;
        self.frame_index = 0;
    }
}
