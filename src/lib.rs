//! Logoscrub composites an animated logo: a looping video is blended against one of a set of
//! pre-rendered alpha masks, and the mask is chosen by the horizontal pointer position over the
//! rendering surface.
//!
//! The public API is instance-oriented:
//!
//! - Provide a [`Host`] exposing the surface, the video and a scheduler
//! - Call [`initialize`] to wire up a [`Compositor`]
//! - Drop or [`Compositor::teardown`] it to stop everything
//!
//! [`host::sim::SimHost`] is an in-process host used by the CLI and the tests.
#![forbid(unsafe_code)]

mod foundation;

pub mod animate;
pub mod assets;
pub mod config;
pub mod host;
pub mod input;
pub mod playback;
pub mod render;
pub mod schedule;
pub mod session;

pub use crate::foundation::core::{Affine, Canvas, RasterImage, Rect, Vec2, WORKING_CANVAS};
pub use crate::foundation::error::{ScrubError, ScrubResult};
pub use crate::foundation::math::{exp_smooth, mix, smoothstep};

pub use crate::assets::fetch::{AssetFetcher, FsFetcher, normalize_rel_path};
pub use crate::assets::masks::{MaskCacheService, MaskFrameSet, MaskLoad, MaskOrigin};
pub use crate::config::{BlendParams, BlurConfig, CompositorConfig, ScaleConfig, SyncConfig};
pub use crate::host::{Host, MediaElement, ReadyState};
pub use crate::render::backend::{BackendKind, CompositeBackend, FrameRGBA, create_backend};
pub use crate::render::compositor::BlurMode;
pub use crate::schedule::SchedulerState;
pub use crate::session::{Compositor, CompositorOptions, initialize};
