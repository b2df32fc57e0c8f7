//! Compositor instances: wiring host elements, the render loop, input and playback sync together,
//! and tearing all of it down again.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use crate::assets::fetch::FsFetcher;
use crate::assets::masks::{MaskCacheService, MaskLoad};
use crate::config::CompositorConfig;
use crate::foundation::core::RasterImage;
use crate::foundation::error::{ScrubError, ScrubResult};
use crate::host::{
    CallbackHandle, Event, EventKind, EventTarget, FrameScheduler, Host, MediaElement,
    RenderSurface,
};
use crate::input::InputMapper;
use crate::playback::PlaybackSynchronizer;
use crate::render::backend::{FrameRGBA, create_backend};
use crate::render::compositor::{BlurMode, ComposeOutcome, FrameCompositor, FrameInputs};
use crate::schedule::{Arm, DrawDecision, SchedulerState};

pub mod listeners;
pub mod state;

use listeners::ListenerRegistry;
use state::{DestroyFlag, RenderState};

pub const DEFAULT_SURFACE_ID: &str = "logo3d";
pub const DEFAULT_VIDEO_ID: &str = "logoVideo";

const NO_CONTEXT_ALERT: &str =
    "Hardware-accelerated rendering is not available here. Try updating or switching browsers.";

/// Everything [`initialize`] needs besides the host.
pub struct CompositorOptions {
    pub surface_id: String,
    pub video_id: String,
    pub config: CompositorConfig,
    pub overlay: Option<RasterImage>,
    /// Shared mask cache. When absent a private cache reading from `mask_root` is created.
    pub masks: Option<MaskCacheService>,
    pub mask_root: PathBuf,
}

impl Default for CompositorOptions {
    fn default() -> Self {
        Self {
            surface_id: DEFAULT_SURFACE_ID.to_string(),
            video_id: DEFAULT_VIDEO_ID.to_string(),
            config: CompositorConfig::default(),
            overlay: None,
            masks: None,
            mask_root: PathBuf::from("."),
        }
    }
}

struct RenderLoop {
    frames: Rc<dyn FrameScheduler>,
    surface: Rc<dyn RenderSurface>,
    video: Rc<dyn MediaElement>,
    mask_load: MaskLoad,
    mapper: InputMapper,
    compositor: FrameCompositor,
    state: RenderState,
    failing: bool,
}

impl RenderLoop {
    fn ready(&mut self) -> bool {
        if self.state.masks.is_none()
            && let Some(set) = self.mask_load.try_get()
        {
            tracing::debug!(frames = set.len(), "masks ready");
            self.state.masks = Some(set);
        }
        self.state.masks_ready() && self.video.ready_state().can_present()
    }

    fn draw(&mut self) {
        let Some(masks) = self.state.masks.clone() else {
            return;
        };
        let outcome = self.compositor.compose(
            &mut self.state.anim,
            FrameInputs {
                video: self.video.as_ref(),
                masks: &masks,
                frame_index: self.state.frame_index,
                overlay: self.state.overlay.as_ref(),
            },
        );
        match outcome {
            Ok(ComposeOutcome::Drawn) => {
                if std::mem::take(&mut self.failing) {
                    tracing::info!("drawing recovered");
                }
            }
            Ok(ComposeOutcome::MaskUnavailable) => {}
            Err(e) => {
                if !std::mem::replace(&mut self.failing, true) {
                    tracing::error!(error = %e, "frame draw failed");
                }
            }
        }
    }
}

type SharedLoop = Rc<RefCell<RenderLoop>>;

fn request_render(rl: &SharedLoop) {
    let (arm, frames) = {
        let mut r = rl.borrow_mut();
        if r.state.destroyed.is_raised() {
            return;
        }
        let ready = r.ready();
        (r.state.scheduler.request(ready), Rc::clone(&r.frames))
    };
    if let Some(arm) = arm {
        schedule_tick(rl, frames.as_ref(), arm);
    }
}

fn schedule_tick(rl: &SharedLoop, frames: &dyn FrameScheduler, arm: Arm) {
    let weak = Rc::downgrade(rl);
    let cb: Box<dyn FnOnce()> = match arm {
        Arm::Wait => Box::new(move || {
            if let Some(rl) = weak.upgrade() {
                on_wait_tick(&rl);
            }
        }),
        Arm::Draw => Box::new(move || {
            if let Some(rl) = weak.upgrade() {
                on_draw_tick(&rl);
            }
        }),
    };
    let handle = frames.request_frame(cb);
    rl.borrow_mut().state.scheduler.armed(arm, handle);
}

fn on_wait_tick(rl: &SharedLoop) {
    let (next, frames) = {
        let mut r = rl.borrow_mut();
        if r.state.destroyed.is_raised() {
            return;
        }
        let ready = r.ready();
        (r.state.scheduler.on_wait_fired(ready), Rc::clone(&r.frames))
    };
    if let Some(arm) = next {
        schedule_tick(rl, frames.as_ref(), arm);
    }
}

fn on_draw_tick(rl: &SharedLoop) {
    let frames = {
        let mut r = rl.borrow_mut();
        if r.state.destroyed.is_raised() {
            return;
        }
        let ready = r.ready();
        match r.state.scheduler.on_draw_fired(ready) {
            DrawDecision::Skip => return,
            DrawDecision::Rearm => {}
            DrawDecision::Draw => r.draw(),
        }
        Rc::clone(&r.frames)
    };
    schedule_tick(rl, frames.as_ref(), Arm::Draw);
}

struct Live {
    render: SharedLoop,
    frames: Rc<dyn FrameScheduler>,
    listeners: RefCell<ListenerRegistry>,
    timers: RefCell<Vec<CallbackHandle>>,
    masks: MaskCacheService,
}

/// Handle to a running (or inert) compositor. Dropping it tears the compositor down.
pub struct Compositor {
    destroyed: DestroyFlag,
    live: Option<Live>,
}

impl std::fmt::Debug for Compositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compositor")
            .field("active", &self.is_active())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

impl Compositor {
    fn inert() -> Self {
        Self {
            destroyed: DestroyFlag::new(),
            live: None,
        }
    }

    /// Whether this instance drives a render loop (false when setup degraded to a no-op).
    pub fn is_active(&self) -> bool {
        self.live.is_some()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.is_raised()
    }

    /// Stop everything: cancel pending ticks and timers, remove every listener, reset CSS blur and
    /// release the rendering context. Safe to call any number of times.
    pub fn teardown(&self) {
        if !self.destroyed.raise() {
            return;
        }
        let Some(live) = &self.live else {
            tracing::debug!("inert compositor torn down");
            return;
        };

        let pending = live.render.borrow_mut().state.scheduler.destroy();
        for handle in pending {
            live.frames.cancel_frame(handle);
        }
        for handle in live.timers.borrow_mut().drain(..) {
            live.frames.clear_timer(handle);
        }
        let removed = live.listeners.borrow_mut().remove_all();
        {
            let mut r = live.render.borrow_mut();
            r.compositor.release();
            r.state.invalidate();
        }
        tracing::info!(listeners = removed, "compositor torn down");
    }

    fn with_loop<T>(&self, f: impl FnOnce(&mut RenderLoop) -> T) -> Option<T> {
        if self.is_destroyed() {
            return None;
        }
        let live = self.live.as_ref()?;
        let mut r = live.render.borrow_mut();
        Some(f(&mut r))
    }

    pub fn set_target_video_scale(&self, scale: f64) {
        self.with_loop(|r| r.state.anim.video.set_target(scale));
    }

    pub fn set_target_overlay_scale(&self, scale: f64) {
        self.with_loop(|r| r.state.anim.overlay.set_target(scale));
    }

    /// Attach or detach the overlay layer.
    pub fn set_overlay(&self, overlay: Option<RasterImage>) {
        self.with_loop(|r| r.state.overlay = overlay);
    }

    pub fn current_frame(&self) -> usize {
        self.with_loop(|r| r.state.frame_index).unwrap_or(0)
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        if self.is_destroyed() {
            return SchedulerState::Destroyed;
        }
        self.with_loop(|r| r.state.scheduler.state())
            .unwrap_or(SchedulerState::Idle)
    }

    /// Number of frames drawn so far.
    pub fn draws(&self) -> u64 {
        self.with_loop(|r| r.compositor.draws()).unwrap_or(0)
    }

    pub fn blur_mode(&self) -> Option<BlurMode> {
        self.with_loop(|r| r.compositor.blur_mode())
    }

    /// Number of event listeners currently registered with the host.
    pub fn listener_count(&self) -> usize {
        self.live
            .as_ref()
            .map(|l| l.listeners.borrow().len())
            .unwrap_or(0)
    }

    pub fn mask_cache(&self) -> Option<&MaskCacheService> {
        self.live.as_ref().map(|l| &l.masks)
    }

    /// Read back the most recent draw.
    pub fn read_frame(&self) -> ScrubResult<FrameRGBA> {
        self.with_loop(|r| r.compositor.read_frame())
            .unwrap_or_else(|| Err(ScrubError::environment("compositor is not running")))
    }
}

impl Drop for Compositor {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Set up a compositor on the host's surface and video elements.
///
/// Missing elements and an unavailable rendering context degrade to an inert compositor (the
/// latter also hides the surface and alerts the user). An invalid configuration is returned as
/// [`ScrubError::Validation`] and a blend program that fails to build as [`ScrubError::Shader`].
pub fn initialize(host: &dyn Host, opts: CompositorOptions) -> ScrubResult<Compositor> {
    let CompositorOptions {
        surface_id,
        video_id,
        config,
        overlay,
        masks,
        mask_root,
    } = opts;
    config.validate()?;

    let Some(surface) = host.surface(&surface_id) else {
        tracing::error!(id = %surface_id, "rendering surface not found");
        return Ok(Compositor::inert());
    };
    let Some(video) = host.media(&video_id) else {
        tracing::error!(id = %video_id, "video element not found");
        return Ok(Compositor::inert());
    };

    let Some(kind) = surface.acquire_context() else {
        return Ok(degrade_without_context(surface.as_ref(), "no rendering context"));
    };
    let backend = match create_backend(kind, config.canvas, config.blend) {
        Ok(b) => b,
        Err(e @ ScrubError::Environment(_)) => {
            return Ok(degrade_without_context(surface.as_ref(), &e.to_string()));
        }
        Err(e) => {
            tracing::error!(error = %e, "blend program setup failed");
            return Err(e);
        }
    };

    let background = host.background_media();
    let blur_mode = BlurMode::detect(surface.as_ref());
    let blur_targets: Vec<Rc<dyn MediaElement>> = std::iter::once(Rc::clone(&video))
        .chain(background.iter().cloned())
        .collect();
    let compositor = FrameCompositor::new(backend, blur_mode, blur_targets)?;

    let masks = masks.unwrap_or_else(|| {
        MaskCacheService::new(Arc::new(FsFetcher::new(mask_root)), &config)
    });
    let mask_load = masks.ensure_masks_loaded();

    let destroyed = DestroyFlag::new();
    let frames = host.scheduler();
    let render: SharedLoop = Rc::new(RefCell::new(RenderLoop {
        frames: Rc::clone(&frames),
        surface,
        video: Rc::clone(&video),
        mask_load,
        mapper: InputMapper::new(config.frame_count),
        compositor,
        state: RenderState::new(&config, overlay, destroyed.clone()),
        failing: false,
    }));
    let sync = Rc::new(PlaybackSynchronizer::new(
        Rc::clone(&video),
        background.clone(),
        config.sync,
    ));

    let mut listeners = ListenerRegistry::new();
    let window = host.window();
    let video_target: Rc<dyn EventTarget> = video.clone();

    for kind in [EventKind::PointerMove, EventKind::TouchMove] {
        let weak = Rc::downgrade(&render);
        listeners.add(
            &window,
            kind,
            Rc::new(move |ev: &Event| {
                let Some(rl) = weak.upgrade() else { return };
                let mut r = rl.borrow_mut();
                if r.state.destroyed.is_raised() {
                    return;
                }
                let rect = r.surface.bounding_rect();
                if let Some(index) = r.mapper.frame_for_event(ev, rect) {
                    r.state.frame_index = index;
                }
            }),
        );
    }

    for kind in [EventKind::Play, EventKind::LoadedData] {
        let weak = Rc::downgrade(&render);
        listeners.add(
            &video_target,
            kind,
            Rc::new(move |_: &Event| {
                if let Some(rl) = weak.upgrade() {
                    request_render(&rl);
                }
            }),
        );
    }

    let mut timers = Vec::new();
    if let Some(bg) = &background {
        let bg_target: Rc<dyn EventTarget> = bg.clone();
        let clips = [
            (Rc::clone(&video_target), Rc::clone(&video)),
            (bg_target, Rc::clone(bg)),
        ];
        for (target, media) in clips {
            let (s, d) = (Rc::clone(&sync), destroyed.clone());
            listeners.add(
                &target,
                EventKind::Ended,
                Rc::new(move |_: &Event| {
                    if !d.is_raised() {
                        s.restart_both();
                    }
                }),
            );
            let (s, d) = (Rc::clone(&sync), destroyed.clone());
            let weak_media = Rc::downgrade(&media);
            listeners.add(
                &target,
                EventKind::TimeUpdate,
                Rc::new(move |_: &Event| {
                    if d.is_raised() {
                        return;
                    }
                    if let Some(m) = weak_media.upgrade() {
                        s.on_time_update(m.as_ref());
                    }
                }),
            );
            let (s, d) = (Rc::clone(&sync), destroyed.clone());
            listeners.add(
                &target,
                EventKind::LoadedData,
                Rc::new(move |_: &Event| {
                    if !d.is_raised() {
                        s.on_loaded_data();
                    }
                }),
            );
        }

        let (s, d) = (Rc::clone(&sync), destroyed.clone());
        timers.push(frames.set_interval(
            config.sync.interval(),
            Box::new(move || {
                if !d.is_raised() {
                    s.check_drift();
                }
            }),
        ));
    }

    for kind in [EventKind::TouchStart, EventKind::Click] {
        let (s, d) = (Rc::clone(&sync), destroyed.clone());
        listeners.add(
            &window,
            kind,
            Rc::new(move |_: &Event| {
                if !d.is_raised() {
                    s.resume_if_paused();
                }
            }),
        );
    }

    {
        let (s, d) = (Rc::clone(&sync), destroyed.clone());
        timers.push(frames.set_timeout(
            config.sync.autoplay_nudge(),
            Box::new(move || {
                if !d.is_raised() {
                    s.nudge();
                }
            }),
        ));
    }

    tracing::info!(
        backend = ?kind,
        blur = ?blur_mode,
        background = background.is_some(),
        listeners = listeners.len(),
        "compositor initialized"
    );

    request_render(&render);

    Ok(Compositor {
        destroyed,
        live: Some(Live {
            render,
            frames,
            listeners: RefCell::new(listeners),
            timers: RefCell::new(timers),
            masks,
        }),
    })
}

fn degrade_without_context(surface: &dyn RenderSurface, reason: &str) -> Compositor {
    tracing::error!(reason, "rendering context unavailable; hiding surface");
    surface.hide();
    surface.alert(NO_CONTEXT_ALERT);
    Compositor::inert()
}
