use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use rayon::prelude::*;

use crate::assets::decode::decode_image;
use crate::assets::fetch::AssetFetcher;
use crate::config::{CompositorConfig, expand_index};
use crate::foundation::core::{Canvas, RasterImage};
use crate::foundation::error::ScrubResult;

/// Which resource ended up backing a mask slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaskOrigin {
    Primary,
    Fallback,
    /// Both encodings failed; the slot holds a blank surface of the working size.
    Placeholder,
}

/// The full, ordered set of mask frames. Immutable once built.
#[derive(Debug)]
pub struct MaskFrameSet {
    frames: Vec<RasterImage>,
    origins: Vec<MaskOrigin>,
}

impl MaskFrameSet {
    /// Build a set from parallel frame/origin lists.
    pub fn new(frames: Vec<RasterImage>, origins: Vec<MaskOrigin>) -> Self {
        debug_assert_eq!(frames.len(), origins.len());
        Self { frames, origins }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&RasterImage> {
        self.frames.get(index)
    }

    pub fn origin(&self, index: usize) -> Option<MaskOrigin> {
        self.origins.get(index).copied()
    }

    /// Mask for `index`, or the first available mask when the index has none.
    pub fn select(&self, index: usize) -> Option<&RasterImage> {
        self.frames.get(index).or_else(|| self.frames.first())
    }

    pub fn placeholder_count(&self) -> usize {
        self.origins
            .iter()
            .filter(|o| **o == MaskOrigin::Placeholder)
            .count()
    }
}

#[derive(Clone, Debug)]
struct MaskSource {
    frame_count: usize,
    canvas: Canvas,
    primary_template: String,
    fallback_template: String,
}

impl MaskSource {
    fn paths(&self, index: usize) -> (String, String) {
        (
            expand_index(&self.primary_template, index),
            expand_index(&self.fallback_template, index),
        )
    }
}

enum LoadState {
    Idle,
    Loading { wakers: Vec<Waker> },
    Ready(Arc<MaskFrameSet>),
}

struct Inner {
    fetcher: Arc<dyn AssetFetcher>,
    source: MaskSource,
    state: Mutex<LoadState>,
    ready: Condvar,
    batches: AtomicUsize,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, LoadState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish(&self, set: MaskFrameSet) {
        let wakers = {
            let mut st = self.lock();
            let prev = std::mem::replace(&mut *st, LoadState::Ready(Arc::new(set)));
            match prev {
                LoadState::Loading { wakers } => wakers,
                _ => Vec::new(),
            }
        };
        self.ready.notify_all();
        for w in wakers {
            w.wake();
        }
    }
}

/// Shared, load-once cache of mask frames.
///
/// Cloning yields another handle to the same cache. The first [`ensure_masks_loaded`] call
/// starts exactly one background batch; every later call (from any clone, any compositor
/// instance) observes that same batch and its result. The cache outlives individual
/// compositors, so a torn-down and re-initialized compositor reuses the loaded frames.
///
/// [`ensure_masks_loaded`]: MaskCacheService::ensure_masks_loaded
#[derive(Clone)]
pub struct MaskCacheService {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for MaskCacheService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaskCacheService")
            .field("frame_count", &self.inner.source.frame_count)
            .field("batches", &self.batches_started())
            .finish()
    }
}

impl MaskCacheService {
    pub fn new(fetcher: Arc<dyn AssetFetcher>, cfg: &CompositorConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                fetcher,
                source: MaskSource {
                    frame_count: cfg.frame_count,
                    canvas: cfg.canvas,
                    primary_template: cfg.mask_primary_template.clone(),
                    fallback_template: cfg.mask_fallback_template.clone(),
                },
                state: Mutex::new(LoadState::Idle),
                ready: Condvar::new(),
                batches: AtomicUsize::new(0),
            }),
        }
    }

    /// Start loading on first call; return a handle to the (shared) pending or finished load.
    pub fn ensure_masks_loaded(&self) -> MaskLoad {
        let start = {
            let mut st = self.inner.lock();
            if matches!(*st, LoadState::Idle) {
                *st = LoadState::Loading { wakers: Vec::new() };
                true
            } else {
                false
            }
        };

        if start {
            self.inner.batches.fetch_add(1, Ordering::SeqCst);
            tracing::debug!(
                frames = self.inner.source.frame_count,
                "starting mask load batch"
            );
            let inner = Arc::clone(&self.inner);
            let spawned = std::thread::Builder::new()
                .name("mask-loader".to_string())
                .spawn(move || {
                    let set = load_all(inner.fetcher.as_ref(), &inner.source);
                    inner.finish(set);
                });
            if let Err(e) = spawned {
                tracing::warn!(error = %e, "mask loader thread unavailable; loading inline");
                let set = load_all(self.inner.fetcher.as_ref(), &self.inner.source);
                self.inner.finish(set);
            }
        }

        MaskLoad {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Number of load batches ever started. Never exceeds one.
    pub fn batches_started(&self) -> usize {
        self.inner.batches.load(Ordering::SeqCst)
    }

    /// The loaded set, if loading has finished.
    pub fn loaded(&self) -> Option<Arc<MaskFrameSet>> {
        match &*self.inner.lock() {
            LoadState::Ready(set) => Some(Arc::clone(set)),
            _ => None,
        }
    }
}

/// Handle to the in-flight or completed mask load.
///
/// Resolves exactly once per cache and never fails: unavailable masks become placeholders.
pub struct MaskLoad {
    inner: Arc<Inner>,
}

impl MaskLoad {
    /// Non-blocking readiness probe.
    pub fn try_get(&self) -> Option<Arc<MaskFrameSet>> {
        match &*self.inner.lock() {
            LoadState::Ready(set) => Some(Arc::clone(set)),
            _ => None,
        }
    }

    /// Block the calling thread until the set is available.
    pub fn wait(&self) -> Arc<MaskFrameSet> {
        let mut st = self.inner.lock();
        loop {
            if let LoadState::Ready(set) = &*st {
                return Arc::clone(set);
            }
            st = self
                .inner
                .ready
                .wait(st)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl Future for MaskLoad {
    type Output = Arc<MaskFrameSet>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut st = self.inner.lock();
        match &mut *st {
            LoadState::Ready(set) => Poll::Ready(Arc::clone(set)),
            LoadState::Loading { wakers } => {
                if !wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
            // A `MaskLoad` only exists after loading started.
            LoadState::Idle => Poll::Pending,
        }
    }
}

fn load_all(fetcher: &dyn AssetFetcher, source: &MaskSource) -> MaskFrameSet {
    let loaded: Vec<(RasterImage, MaskOrigin)> = (0..source.frame_count)
        .into_par_iter()
        .map(|i| {
            std::panic::catch_unwind(AssertUnwindSafe(|| load_mask(fetcher, source, i)))
                .unwrap_or_else(|panic| {
                    tracing::error!(
                        index = i,
                        reason = panic_message(panic.as_ref()),
                        "mask load panicked, substituting blank surface"
                    );
                    (RasterImage::blank(source.canvas), MaskOrigin::Placeholder)
                })
        })
        .collect();

    let (frames, origins): (Vec<_>, Vec<_>) = loaded.into_iter().unzip();
    let set = MaskFrameSet { frames, origins };
    tracing::info!(
        frames = set.len(),
        placeholders = set.placeholder_count(),
        "mask frames loaded"
    );
    set
}

#[tracing::instrument(level = "trace", skip(fetcher, source))]
fn load_mask(
    fetcher: &dyn AssetFetcher,
    source: &MaskSource,
    index: usize,
) -> (RasterImage, MaskOrigin) {
    let (primary, fallback) = source.paths(index);

    let primary_err = match fetch_decode(fetcher, &primary) {
        Ok(img) => return (img, MaskOrigin::Primary),
        Err(e) => e,
    };
    match fetch_decode(fetcher, &fallback) {
        Ok(img) => {
            tracing::warn!(index, path = %primary, error = %primary_err, "primary mask failed, using fallback");
            (img, MaskOrigin::Fallback)
        }
        Err(fallback_err) => {
            tracing::error!(
                index,
                primary = %primary,
                fallback = %fallback,
                primary_error = %primary_err,
                fallback_error = %fallback_err,
                "mask unavailable, substituting blank surface"
            );
            (RasterImage::blank(source.canvas), MaskOrigin::Placeholder)
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

fn fetch_decode(fetcher: &dyn AssetFetcher, path: &str) -> ScrubResult<RasterImage> {
    let bytes = fetcher.fetch(path)?;
    decode_image(&bytes)
}
