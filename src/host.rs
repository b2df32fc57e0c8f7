//! Boundary between the compositor and whatever hosts it.
//!
//! The compositor never talks to a windowing system directly. It sees a rendering surface, media
//! elements that supply frames and playback state, a window-level event target and a cooperative
//! scheduler for refresh ticks and timers. Everything runs on one thread: callbacks are plain
//! `Rc`/`Box` closures invoked by the host between frames.

use std::rc::Rc;
use std::time::Duration;

use crate::foundation::core::{Canvas, RasterImage, Rect};
use crate::foundation::error::ScrubResult;
use crate::render::backend::BackendKind;

pub mod sim;

/// Handle of a scheduled refresh-tick callback or timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CallbackHandle(pub u64);

/// Handle of a registered event listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    PointerMove,
    TouchMove,
    TouchStart,
    Click,
    Play,
    LoadedData,
    Ended,
    TimeUpdate,
}

/// An input or media event as delivered by the host.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    /// Pointer x in client coordinates, when the event has one.
    pub client_x: Option<f64>,
    /// Client x of each active touch point, in order.
    pub touches: Vec<f64>,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            client_x: None,
            touches: Vec::new(),
        }
    }

    pub fn pointer(kind: EventKind, x: f64) -> Self {
        Self {
            kind,
            client_x: Some(x),
            touches: Vec::new(),
        }
    }

    pub fn touch(kind: EventKind, xs: Vec<f64>) -> Self {
        Self {
            kind,
            client_x: None,
            touches: xs,
        }
    }
}

pub type Handler = Rc<dyn Fn(&Event)>;

pub trait EventTarget {
    fn add_listener(&self, kind: EventKind, handler: Handler) -> ListenerId;
    fn remove_listener(&self, kind: EventKind, id: ListenerId);
}

/// How much media data is buffered, ordered like the HTML media ready states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    HaveNothing,
    HaveMetadata,
    HaveCurrentData,
    HaveFutureData,
    HaveEnoughData,
}

impl ReadyState {
    /// Whether a frame can be presented right now.
    pub fn can_present(self) -> bool {
        self >= ReadyState::HaveCurrentData
    }
}

/// A playing video (or any frame source with a playback clock).
pub trait MediaElement: EventTarget {
    fn ready_state(&self) -> ReadyState;
    /// Intrinsic frame size, `None` while unknown.
    fn intrinsic_size(&self) -> Option<Canvas>;
    /// The frame at the current playback position.
    fn current_frame(&self) -> Option<RasterImage>;
    fn current_time(&self) -> f64;
    fn set_current_time(&self, t: f64);
    fn duration(&self) -> Option<f64>;
    fn is_paused(&self) -> bool;
    /// Request playback. Hosts may reject this (autoplay policy).
    fn play(&self) -> ScrubResult<()>;
    /// Presentation-level blur applied by the host, used when the raster blur is unsupported.
    fn set_css_blur(&self, px: Option<u32>);
}

/// The on-screen element the compositor presents into.
pub trait RenderSurface {
    /// On-screen bounding rectangle in client coordinates.
    fn bounding_rect(&self) -> Rect;
    /// Acquire a rendering context; `None` when the host has no usable backend.
    fn acquire_context(&self) -> Option<BackendKind>;
    /// Whether staging rasters may be blurred directly.
    fn supports_canvas_filter(&self) -> bool;
    fn hide(&self);
    /// Blocking user-facing notice.
    fn alert(&self, message: &str);
}

/// Cooperative refresh-tick and timer scheduling.
pub trait FrameScheduler {
    fn request_frame(&self, cb: Box<dyn FnOnce()>) -> CallbackHandle;
    fn cancel_frame(&self, handle: CallbackHandle);
    fn set_interval(&self, period: Duration, cb: Box<dyn FnMut()>) -> CallbackHandle;
    fn set_timeout(&self, delay: Duration, cb: Box<dyn FnOnce()>) -> CallbackHandle;
    fn clear_timer(&self, handle: CallbackHandle);
}

/// Element lookup and global services of the hosting environment.
pub trait Host {
    fn surface(&self, id: &str) -> Option<Rc<dyn RenderSurface>>;
    fn media(&self, id: &str) -> Option<Rc<dyn MediaElement>>;
    /// The optional background clip kept in sync with the logo video.
    fn background_media(&self) -> Option<Rc<dyn MediaElement>>;
    fn window(&self) -> Rc<dyn EventTarget>;
    fn scheduler(&self) -> Rc<dyn FrameScheduler>;
}
