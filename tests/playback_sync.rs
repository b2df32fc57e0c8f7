use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use logoscrub::host::sim::{SimHost, SimMedia, SimSurface};
use logoscrub::host::{Event, EventKind, MediaElement};
use logoscrub::{
    AssetFetcher, BackendKind, Canvas, CompositorConfig, CompositorOptions, MaskCacheService,
    RasterImage, ReadyState, ScrubResult, initialize,
};

const CANVAS: Canvas = Canvas {
    width: 16,
    height: 9,
};

/// Every fetch fails, so every mask becomes a blank placeholder.
struct NoMasks;

impl AssetFetcher for NoMasks {
    fn fetch(&self, path: &str) -> ScrubResult<Vec<u8>> {
        Err(logoscrub::ScrubError::asset(format!("missing {path}")))
    }
}

fn config() -> CompositorConfig {
    CompositorConfig {
        frame_count: 2,
        canvas: CANVAS,
        ..CompositorConfig::default()
    }
}

fn frame() -> RasterImage {
    RasterImage::from_straight(CANVAS.width, CANVAS.height, [10, 20, 30, 255].repeat(16 * 9))
        .unwrap()
}

struct Page {
    host: SimHost,
    video: Rc<SimMedia>,
    background: Rc<SimMedia>,
    compositor: logoscrub::Compositor,
}

fn page(video: SimMedia, background: SimMedia) -> Page {
    let host = SimHost::new();
    host.add_surface(
        "logo3d",
        SimSurface::new(CANVAS.rect(), Some(BackendKind::Cpu)),
    );
    let video = host.add_media("logoVideo", video);
    let background = host.set_background(background);
    let masks = MaskCacheService::new(Arc::new(NoMasks), &config());
    masks.ensure_masks_loaded().wait();
    let compositor = initialize(
        &host,
        CompositorOptions {
            config: config(),
            masks: Some(masks),
            ..Default::default()
        },
    )
    .unwrap();
    Page {
        host,
        video,
        background,
        compositor,
    }
}

fn clip(duration: f64) -> SimMedia {
    SimMedia::new().with_frame(frame()).with_duration(duration)
}

#[test]
fn autoplay_nudge_starts_both_videos_once() {
    let p = page(clip(10.0), clip(10.0));
    assert!(p.video.is_paused());
    p.host.step(Duration::from_millis(99));
    assert!(p.video.is_paused());
    p.host.step(Duration::from_millis(2));
    assert!(!p.video.is_paused());
    assert!(!p.background.is_paused());
    p.host.step(Duration::from_secs(1));
    assert_eq!(p.video.play_calls(), 1);
    assert_eq!(p.background.play_calls(), 1);
}

#[test]
fn drift_check_realigns_on_the_interval() {
    let p = page(clip(10.0), clip(10.0));
    p.video.set_current_time(2.0);
    p.background.set_current_time(2.5);
    // Timers fire before media clocks move on the next step.
    p.host.step(Duration::from_millis(500));
    let a = p.video.current_time();
    let b = p.background.current_time();
    assert!((a - b).abs() < 1e-6, "{a} vs {b}");
}

#[test]
fn small_drift_is_not_corrected() {
    let p = page(clip(10.0), clip(10.0));
    p.video.set_current_time(2.0);
    p.background.set_current_time(2.05);
    p.host.step(Duration::from_millis(500));
    assert!((p.background.current_time() - p.video.current_time()).abs() > 0.04);
}

#[test]
fn clip_end_restarts_both_from_zero() {
    let p = page(clip(5.0), clip(1.0));
    p.host.step(Duration::from_millis(150));
    assert!(!p.background.is_paused());
    p.host.step(Duration::from_millis(970));
    // The background clip came within the end epsilon and rewound both.
    assert!(p.video.current_time() < 0.2, "{}", p.video.current_time());
    assert!(p.background.current_time() < 0.2);
    assert!(!p.video.is_paused());
    assert!(!p.background.is_paused());
}

#[test]
fn user_gesture_resumes_paused_videos() {
    let p = page(clip(10.0), clip(10.0));
    p.host.step(Duration::from_millis(200));
    p.background.pause();
    p.host
        .sim_window()
        .dispatch(&Event::new(EventKind::Click));
    assert!(!p.background.is_paused());
    assert_eq!(p.video.play_calls(), 1);

    p.video.pause();
    p.host
        .sim_window()
        .dispatch(&Event::touch(EventKind::TouchStart, vec![3.0]));
    assert!(!p.video.is_paused());
}

#[test]
fn rejected_autoplay_waits_for_a_gesture() {
    let p = page(clip(10.0), clip(10.0));
    p.video.set_reject_play(true);
    p.background.set_reject_play(true);
    p.host.step(Duration::from_millis(200));
    assert!(p.video.is_paused());

    p.video.set_reject_play(false);
    p.background.set_reject_play(false);
    p.host
        .sim_window()
        .dispatch(&Event::new(EventKind::Click));
    assert!(!p.video.is_paused());
    assert!(!p.background.is_paused());
    assert!(p.compositor.is_active());
}

#[test]
fn loaded_data_on_both_starts_them_aligned() {
    let v = SimMedia::new().with_duration(10.0);
    let bg = SimMedia::new().with_duration(10.0);
    let p = page(v, bg);

    p.video.set_frame(frame());
    p.video.set_ready_state(ReadyState::HaveEnoughData);
    p.video.set_current_time(3.0);
    p.video.dispatch(&Event::new(EventKind::LoadedData));
    assert!(p.video.is_paused());

    p.background.set_frame(frame());
    p.background.set_ready_state(ReadyState::HaveCurrentData);
    p.background.set_current_time(1.0);
    p.background.dispatch(&Event::new(EventKind::LoadedData));
    assert_eq!(p.video.current_time(), 0.0);
    assert_eq!(p.background.current_time(), 0.0);
    assert!(!p.video.is_paused());
    assert!(!p.background.is_paused());
}

#[test]
fn teardown_clears_sync_timers_and_listeners() {
    let p = page(clip(10.0), clip(10.0));
    p.compositor.teardown();
    assert_eq!(p.host.sim_scheduler().pending_timers(), 0);
    assert_eq!(p.background.events().listener_count(), 0);

    p.video.set_current_time(1.0);
    p.background.set_current_time(3.0);
    p.host.step(Duration::from_secs(2));
    assert!(p.video.is_paused());
    assert_eq!(p.background.current_time(), 3.0);
}
