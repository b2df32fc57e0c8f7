//! Deterministic in-process host: virtual clock, frame queue, timers and simulated elements.
//!
//! Used by the CLI to drive the full compositor offscreen and by tests to step time precisely.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;
use std::time::Duration;

use crate::foundation::core::{Canvas, RasterImage, Rect};
use crate::foundation::error::{ScrubError, ScrubResult};
use crate::host::{
    CallbackHandle, Event, EventKind, EventTarget, FrameScheduler, Handler, Host, ListenerId,
    MediaElement, ReadyState, RenderSurface,
};
use crate::render::backend::BackendKind;

/// Nominal refresh interval used by [`SimHost::step_frame`].
pub const SIM_FRAME: Duration = Duration::from_micros(16_667);

#[derive(Default)]
pub struct SimEventTarget {
    next_id: Cell<u64>,
    listeners: RefCell<Vec<(ListenerId, EventKind, Handler)>>,
}

impl SimEventTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invoke every listener registered for `event.kind`.
    ///
    /// Handlers are collected before any runs, so handlers may add or remove listeners.
    pub fn dispatch(&self, event: &Event) {
        let handlers: Vec<Handler> = self
            .listeners
            .borrow()
            .iter()
            .filter(|(_, k, _)| *k == event.kind)
            .map(|(_, _, h)| Rc::clone(h))
            .collect();
        for h in handlers {
            h(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }
}

impl EventTarget for SimEventTarget {
    fn add_listener(&self, kind: EventKind, handler: Handler) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.listeners.borrow_mut().push((id, kind, handler));
        id
    }

    fn remove_listener(&self, kind: EventKind, id: ListenerId) {
        self.listeners
            .borrow_mut()
            .retain(|(lid, k, _)| !(*lid == id && *k == kind));
    }
}

struct MediaState {
    time: f64,
    duration: Option<f64>,
    paused: bool,
    ready: ReadyState,
    frame: Option<RasterImage>,
    size: Option<Canvas>,
    css_blur: Option<u32>,
    reject_play: bool,
    play_calls: u32,
}

/// Simulated video element with a playback clock and a fixed presented frame.
pub struct SimMedia {
    events: SimEventTarget,
    state: RefCell<MediaState>,
}

impl Default for SimMedia {
    fn default() -> Self {
        Self::new()
    }
}

impl SimMedia {
    pub fn new() -> Self {
        Self {
            events: SimEventTarget::new(),
            state: RefCell::new(MediaState {
                time: 0.0,
                duration: None,
                paused: true,
                ready: ReadyState::HaveNothing,
                frame: None,
                size: None,
                css_blur: None,
                reject_play: false,
                play_calls: 0,
            }),
        }
    }

    /// Present `frame` and report enough data to draw.
    pub fn with_frame(self, frame: RasterImage) -> Self {
        {
            let mut st = self.state.borrow_mut();
            st.size = Some(frame.canvas());
            st.frame = Some(frame);
            st.ready = ReadyState::HaveEnoughData;
        }
        self
    }

    pub fn with_duration(self, secs: f64) -> Self {
        self.state.borrow_mut().duration = Some(secs);
        self
    }

    pub fn set_ready_state(&self, ready: ReadyState) {
        self.state.borrow_mut().ready = ready;
    }

    pub fn set_frame(&self, frame: RasterImage) {
        let mut st = self.state.borrow_mut();
        st.size = Some(frame.canvas());
        st.frame = Some(frame);
    }

    /// Make subsequent `play()` calls fail the way an autoplay policy would.
    pub fn set_reject_play(&self, reject: bool) {
        self.state.borrow_mut().reject_play = reject;
    }

    pub fn css_blur(&self) -> Option<u32> {
        self.state.borrow().css_blur
    }

    pub fn play_calls(&self) -> u32 {
        self.state.borrow().play_calls
    }

    pub fn pause(&self) {
        self.state.borrow_mut().paused = true;
    }

    pub fn events(&self) -> &SimEventTarget {
        &self.events
    }

    pub fn dispatch(&self, event: &Event) {
        self.events.dispatch(event);
    }

    /// Advance the playback clock, emitting `timeupdate` and, at the clip end, `ended`.
    pub fn advance(&self, dt: Duration) {
        let ended = {
            let mut st = self.state.borrow_mut();
            if st.paused {
                return;
            }
            let mut t = st.time + dt.as_secs_f64();
            let mut ended = false;
            if let Some(d) = st.duration
                && t >= d
            {
                t = d;
                st.paused = true;
                ended = true;
            }
            st.time = t;
            ended
        };
        self.events.dispatch(&Event::new(EventKind::TimeUpdate));
        if ended {
            self.events.dispatch(&Event::new(EventKind::Ended));
        }
    }
}

impl EventTarget for SimMedia {
    fn add_listener(&self, kind: EventKind, handler: Handler) -> ListenerId {
        self.events.add_listener(kind, handler)
    }

    fn remove_listener(&self, kind: EventKind, id: ListenerId) {
        self.events.remove_listener(kind, id);
    }
}

impl MediaElement for SimMedia {
    fn ready_state(&self) -> ReadyState {
        self.state.borrow().ready
    }

    fn intrinsic_size(&self) -> Option<Canvas> {
        self.state.borrow().size
    }

    fn current_frame(&self) -> Option<RasterImage> {
        self.state.borrow().frame.clone()
    }

    fn current_time(&self) -> f64 {
        self.state.borrow().time
    }

    fn set_current_time(&self, t: f64) {
        let mut st = self.state.borrow_mut();
        let upper = st.duration.unwrap_or(f64::MAX);
        st.time = t.clamp(0.0, upper);
    }

    fn duration(&self) -> Option<f64> {
        self.state.borrow().duration
    }

    fn is_paused(&self) -> bool {
        self.state.borrow().paused
    }

    fn play(&self) -> ScrubResult<()> {
        let started = {
            let mut st = self.state.borrow_mut();
            st.play_calls += 1;
            if st.reject_play {
                return Err(ScrubError::playback("play() rejected by autoplay policy"));
            }
            std::mem::replace(&mut st.paused, false)
        };
        if started {
            self.events.dispatch(&Event::new(EventKind::Play));
        }
        Ok(())
    }

    fn set_css_blur(&self, px: Option<u32>) {
        self.state.borrow_mut().css_blur = px;
    }
}

/// Simulated rendering surface.
pub struct SimSurface {
    rect: Cell<Rect>,
    context: Option<BackendKind>,
    canvas_filter: bool,
    hidden: Cell<bool>,
    alerts: RefCell<Vec<String>>,
}

impl SimSurface {
    pub fn new(rect: Rect, context: Option<BackendKind>) -> Self {
        Self {
            rect: Cell::new(rect),
            context,
            canvas_filter: true,
            hidden: Cell::new(false),
            alerts: RefCell::new(Vec::new()),
        }
    }

    pub fn with_canvas_filter(mut self, supported: bool) -> Self {
        self.canvas_filter = supported;
        self
    }

    pub fn set_rect(&self, rect: Rect) {
        self.rect.set(rect);
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden.get()
    }

    pub fn alerts(&self) -> Vec<String> {
        self.alerts.borrow().clone()
    }
}

impl RenderSurface for SimSurface {
    fn bounding_rect(&self) -> Rect {
        self.rect.get()
    }

    fn acquire_context(&self) -> Option<BackendKind> {
        self.context
    }

    fn supports_canvas_filter(&self) -> bool {
        self.canvas_filter
    }

    fn hide(&self) {
        self.hidden.set(true);
    }

    fn alert(&self, message: &str) {
        self.alerts.borrow_mut().push(message.to_string());
    }
}

enum TimerCallback {
    Once(Box<dyn FnOnce()>),
    Repeat(Box<dyn FnMut()>),
}

struct SimTimer {
    due: Duration,
    period: Option<Duration>,
    cb: TimerCallback,
}

/// Virtual-clock scheduler. Nothing runs until the owner steps it.
#[derive(Default)]
pub struct SimScheduler {
    now: Cell<Duration>,
    next_id: Cell<u64>,
    frames: RefCell<Vec<(CallbackHandle, Box<dyn FnOnce()>)>>,
    timers: RefCell<BTreeMap<u64, SimTimer>>,
    cancelled: RefCell<HashSet<u64>>,
    frames_run: Cell<u64>,
}

impl SimScheduler {
    fn alloc(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    pub fn now(&self) -> Duration {
        self.now.get()
    }

    pub fn pending_frames(&self) -> usize {
        self.frames.borrow().len()
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.borrow().len()
    }

    /// Total refresh-tick callbacks executed so far.
    pub fn frames_run(&self) -> u64 {
        self.frames_run.get()
    }

    /// Run every callback queued before this call. Callbacks queued while running wait for the
    /// next tick, like `requestAnimationFrame`.
    pub fn run_frame(&self) -> usize {
        let due = std::mem::take(&mut *self.frames.borrow_mut());
        let n = due.len();
        for (_, cb) in due {
            self.frames_run.set(self.frames_run.get() + 1);
            cb();
        }
        n
    }

    /// Move the clock forward, firing timers in due order.
    pub fn advance(&self, dt: Duration) {
        let end = self.now.get() + dt;
        loop {
            let next = self
                .timers
                .borrow()
                .iter()
                .filter(|(_, t)| t.due <= end)
                .min_by_key(|(id, t)| (t.due, **id))
                .map(|(id, _)| *id);
            let Some(id) = next else { break };
            let Some(timer) = self.timers.borrow_mut().remove(&id) else {
                break;
            };
            self.now.set(timer.due.max(self.now.get()));
            match timer.cb {
                TimerCallback::Once(cb) => cb(),
                TimerCallback::Repeat(mut cb) => {
                    cb();
                    let period = timer.period.unwrap_or(Duration::from_millis(1));
                    if !self.cancelled.borrow().contains(&id) {
                        self.timers.borrow_mut().insert(
                            id,
                            SimTimer {
                                due: timer.due + period.max(Duration::from_nanos(1)),
                                period: timer.period,
                                cb: TimerCallback::Repeat(cb),
                            },
                        );
                    }
                }
            }
        }
        self.now.set(end);
    }
}

impl FrameScheduler for SimScheduler {
    fn request_frame(&self, cb: Box<dyn FnOnce()>) -> CallbackHandle {
        let h = CallbackHandle(self.alloc());
        self.frames.borrow_mut().push((h, cb));
        h
    }

    fn cancel_frame(&self, handle: CallbackHandle) {
        self.frames.borrow_mut().retain(|(h, _)| *h != handle);
    }

    fn set_interval(&self, period: Duration, cb: Box<dyn FnMut()>) -> CallbackHandle {
        let id = self.alloc();
        self.timers.borrow_mut().insert(
            id,
            SimTimer {
                due: self.now.get() + period,
                period: Some(period),
                cb: TimerCallback::Repeat(cb),
            },
        );
        CallbackHandle(id)
    }

    fn set_timeout(&self, delay: Duration, cb: Box<dyn FnOnce()>) -> CallbackHandle {
        let id = self.alloc();
        self.timers.borrow_mut().insert(
            id,
            SimTimer {
                due: self.now.get() + delay,
                period: None,
                cb: TimerCallback::Once(cb),
            },
        );
        CallbackHandle(id)
    }

    fn clear_timer(&self, handle: CallbackHandle) {
        self.timers.borrow_mut().remove(&handle.0);
        self.cancelled.borrow_mut().insert(handle.0);
    }
}

/// A complete simulated environment.
pub struct SimHost {
    scheduler: Rc<SimScheduler>,
    window: Rc<SimEventTarget>,
    surfaces: RefCell<BTreeMap<String, Rc<SimSurface>>>,
    media: RefCell<BTreeMap<String, Rc<SimMedia>>>,
    background: RefCell<Option<Rc<SimMedia>>>,
}

impl Default for SimHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SimHost {
    pub fn new() -> Self {
        Self {
            scheduler: Rc::new(SimScheduler::default()),
            window: Rc::new(SimEventTarget::new()),
            surfaces: RefCell::new(BTreeMap::new()),
            media: RefCell::new(BTreeMap::new()),
            background: RefCell::new(None),
        }
    }

    pub fn add_surface(&self, id: &str, surface: SimSurface) -> Rc<SimSurface> {
        let rc = Rc::new(surface);
        self.surfaces
            .borrow_mut()
            .insert(id.to_string(), Rc::clone(&rc));
        rc
    }

    pub fn add_media(&self, id: &str, media: SimMedia) -> Rc<SimMedia> {
        let rc = Rc::new(media);
        self.media.borrow_mut().insert(id.to_string(), Rc::clone(&rc));
        rc
    }

    pub fn set_background(&self, media: SimMedia) -> Rc<SimMedia> {
        let rc = Rc::new(media);
        *self.background.borrow_mut() = Some(Rc::clone(&rc));
        rc
    }

    pub fn sim_window(&self) -> Rc<SimEventTarget> {
        Rc::clone(&self.window)
    }

    pub fn sim_scheduler(&self) -> Rc<SimScheduler> {
        Rc::clone(&self.scheduler)
    }

    /// Advance media clocks and timers by `dt`, then run one refresh tick.
    pub fn step(&self, dt: Duration) {
        let media: Vec<Rc<SimMedia>> = self
            .media
            .borrow()
            .values()
            .cloned()
            .chain(self.background.borrow().iter().cloned())
            .collect();
        for m in media {
            m.advance(dt);
        }
        self.scheduler.advance(dt);
        self.scheduler.run_frame();
    }

    pub fn step_frame(&self) {
        self.step(SIM_FRAME);
    }

    pub fn step_frames(&self, n: usize) {
        for _ in 0..n {
            self.step_frame();
        }
    }
}

impl Host for SimHost {
    fn surface(&self, id: &str) -> Option<Rc<dyn RenderSurface>> {
        let s = self.surfaces.borrow().get(id).cloned()?;
        Some(s)
    }

    fn media(&self, id: &str) -> Option<Rc<dyn MediaElement>> {
        let m = self.media.borrow().get(id).cloned()?;
        Some(m)
    }

    fn background_media(&self) -> Option<Rc<dyn MediaElement>> {
        let m = self.background.borrow().clone()?;
        Some(m)
    }

    fn window(&self) -> Rc<dyn EventTarget> {
        self.window.clone()
    }

    fn scheduler(&self) -> Rc<dyn FrameScheduler> {
        self.scheduler.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_queued_during_a_tick_run_next_tick() {
        let sched = Rc::new(SimScheduler::default());
        let hits = Rc::new(Cell::new(0));

        let s2 = Rc::clone(&sched);
        let h2 = Rc::clone(&hits);
        sched.request_frame(Box::new(move || {
            h2.set(h2.get() + 1);
            let h3 = Rc::clone(&h2);
            s2.request_frame(Box::new(move || h3.set(h3.get() + 10)));
        }));

        assert_eq!(sched.run_frame(), 1);
        assert_eq!(hits.get(), 1);
        assert_eq!(sched.pending_frames(), 1);
        sched.run_frame();
        assert_eq!(hits.get(), 11);
    }

    #[test]
    fn cancelled_frame_never_runs() {
        let sched = SimScheduler::default();
        let hit = Rc::new(Cell::new(false));
        let h = Rc::clone(&hit);
        let handle = sched.request_frame(Box::new(move || h.set(true)));
        sched.cancel_frame(handle);
        sched.run_frame();
        assert!(!hit.get());
    }

    #[test]
    fn intervals_repeat_until_cleared() {
        let sched = Rc::new(SimScheduler::default());
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        let h = sched.set_interval(
            Duration::from_millis(500),
            Box::new(move || c.set(c.get() + 1)),
        );
        sched.advance(Duration::from_millis(1499));
        assert_eq!(count.get(), 2);
        sched.advance(Duration::from_millis(1));
        assert_eq!(count.get(), 3);
        sched.clear_timer(h);
        sched.advance(Duration::from_secs(5));
        assert_eq!(count.get(), 3);
    }

    #[test]
    fn interval_cleared_from_inside_its_callback_stops() {
        let sched = Rc::new(SimScheduler::default());
        let count = Rc::new(Cell::new(0));
        let handle = Rc::new(Cell::new(None::<CallbackHandle>));
        let (c, s, hh) = (Rc::clone(&count), Rc::clone(&sched), Rc::clone(&handle));
        let h = sched.set_interval(
            Duration::from_millis(10),
            Box::new(move || {
                c.set(c.get() + 1);
                if let Some(h) = hh.get() {
                    s.clear_timer(h);
                }
            }),
        );
        handle.set(Some(h));
        sched.advance(Duration::from_millis(100));
        assert_eq!(count.get(), 1);
        assert_eq!(sched.pending_timers(), 0);
    }

    #[test]
    fn media_reaching_its_end_pauses_and_emits_ended() {
        let m = SimMedia::new().with_duration(1.0);
        let ended = Rc::new(Cell::new(0));
        let e = Rc::clone(&ended);
        m.add_listener(EventKind::Ended, Rc::new(move |_: &Event| e.set(e.get() + 1)));
        m.play().unwrap();
        m.advance(Duration::from_millis(600));
        assert_eq!(ended.get(), 0);
        m.advance(Duration::from_millis(600));
        assert_eq!(ended.get(), 1);
        assert!(m.is_paused());
        assert_eq!(m.current_time(), 1.0);
    }

    #[test]
    fn rejected_play_keeps_media_paused() {
        let m = SimMedia::new();
        m.set_reject_play(true);
        assert!(m.play().is_err());
        assert!(m.is_paused());
        assert_eq!(m.play_calls(), 1);
    }
}
