use std::cell::Cell;
use std::rc::Rc;

use crate::config::SyncConfig;
use crate::host::MediaElement;

/// Keeps the logo video and an optional background video playing in step.
///
/// Every `play()` failure is logged and swallowed: a rejected play only means nothing moves until
/// a later user gesture retries through [`PlaybackSynchronizer::resume_if_paused`].
pub struct PlaybackSynchronizer {
    primary: Rc<dyn MediaElement>,
    background: Option<Rc<dyn MediaElement>>,
    cfg: SyncConfig,
    aligned_start: Cell<bool>,
    nudged: Cell<bool>,
}

impl PlaybackSynchronizer {
    pub fn new(
        primary: Rc<dyn MediaElement>,
        background: Option<Rc<dyn MediaElement>>,
        cfg: SyncConfig,
    ) -> Self {
        Self {
            primary,
            background,
            cfg,
            aligned_start: Cell::new(false),
            nudged: Cell::new(false),
        }
    }

    fn managed(&self) -> impl Iterator<Item = &Rc<dyn MediaElement>> {
        std::iter::once(&self.primary).chain(self.background.iter())
    }

    /// Periodic drift check: when the clips are more than the threshold apart, move both to the
    /// mean of their positions. Returns whether a correction was made.
    pub fn check_drift(&self) -> bool {
        let Some(bg) = &self.background else {
            return false;
        };
        let (a, b) = (self.primary.current_time(), bg.current_time());
        if !(a.is_finite() && b.is_finite()) || (a - b).abs() <= self.cfg.drift_threshold_s {
            return false;
        }
        let mean = (a + b) / 2.0;
        tracing::debug!(primary = a, background = b, mean, "realigning drifted videos");
        bg.set_current_time(mean);
        self.primary.set_current_time(mean);
        true
    }

    /// Rewind both clips to the start and request playback on both.
    pub fn restart_both(&self) {
        tracing::debug!("restarting videos from the top");
        for media in self.managed() {
            media.set_current_time(0.0);
        }
        for media in self.managed() {
            play_quietly(media.as_ref());
        }
    }

    /// `timeupdate` from `media`: restart both when it is within the end epsilon of its duration.
    pub fn on_time_update(&self, media: &dyn MediaElement) -> bool {
        let Some(duration) = media.duration().filter(|d| d.is_finite() && *d > 0.0) else {
            return false;
        };
        if media.current_time() > duration - self.cfg.end_epsilon_s {
            self.restart_both();
            return true;
        }
        false
    }

    /// `loadeddata` from either clip: once every managed clip can present a frame, rewind and
    /// start them together. Happens once.
    pub fn on_loaded_data(&self) -> bool {
        if self.aligned_start.get() || !self.managed().all(|m| m.ready_state().can_present()) {
            return false;
        }
        self.aligned_start.set(true);
        self.restart_both();
        true
    }

    /// User gesture: resume any clip that is paused.
    pub fn resume_if_paused(&self) {
        for media in self.managed() {
            if media.is_paused() {
                play_quietly(media.as_ref());
            }
        }
    }

    /// One-shot best-effort playback attempt, regardless of readiness.
    pub fn nudge(&self) {
        if self.nudged.replace(true) {
            return;
        }
        for media in self.managed() {
            play_quietly(media.as_ref());
        }
    }
}

fn play_quietly(media: &dyn MediaElement) {
    if let Err(e) = media.play() {
        tracing::debug!(error = %e, "play request rejected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompositorConfig;
    use crate::foundation::core::RasterImage;
    use crate::host::ReadyState;
    use crate::host::sim::SimMedia;

    fn pair() -> (Rc<SimMedia>, Rc<SimMedia>, PlaybackSynchronizer) {
        let a = Rc::new(SimMedia::new().with_duration(10.0));
        let b = Rc::new(SimMedia::new().with_duration(10.0));
        let bg: Rc<dyn MediaElement> = b.clone();
        let sync = PlaybackSynchronizer::new(a.clone(), Some(bg), CompositorConfig::default().sync);
        (a, b, sync)
    }

    #[test]
    fn drift_beyond_threshold_moves_both_to_mean() {
        let (a, b, sync) = pair();
        a.set_current_time(2.0);
        b.set_current_time(2.3);
        assert!(sync.check_drift());
        assert!((a.current_time() - 2.15).abs() < 1e-9);
        assert!((b.current_time() - 2.15).abs() < 1e-9);
    }

    #[test]
    fn small_drift_is_left_alone() {
        let (a, b, sync) = pair();
        a.set_current_time(2.0);
        b.set_current_time(2.05);
        assert!(!sync.check_drift());
        assert_eq!(b.current_time(), 2.05);
    }

    #[test]
    fn near_end_restarts_both() {
        let (a, b, sync) = pair();
        a.set_current_time(9.97);
        b.set_current_time(9.5);
        assert!(sync.on_time_update(a.as_ref()));
        assert_eq!(a.current_time(), 0.0);
        assert_eq!(b.current_time(), 0.0);
        assert!(!a.is_paused());
        assert!(!b.is_paused());
    }

    #[test]
    fn unknown_duration_never_restarts() {
        let m = Rc::new(SimMedia::new());
        let sync = PlaybackSynchronizer::new(m.clone(), None, CompositorConfig::default().sync);
        m.set_current_time(1.0e6);
        assert!(!sync.on_time_update(m.as_ref()));
    }

    #[test]
    fn rejected_play_is_swallowed() {
        let (a, b, sync) = pair();
        a.set_reject_play(true);
        b.set_reject_play(true);
        sync.restart_both();
        sync.resume_if_paused();
        assert!(a.is_paused());
        assert_eq!(a.play_calls(), 2);
    }

    #[test]
    fn aligned_start_waits_for_both_and_runs_once() {
        let (a, b, sync) = pair();
        let frame = RasterImage::from_premul(1, 1, vec![0; 4]).unwrap();
        a.set_frame(frame.clone());
        a.set_ready_state(ReadyState::HaveEnoughData);
        assert!(!sync.on_loaded_data());
        b.set_frame(frame);
        b.set_ready_state(ReadyState::HaveCurrentData);
        assert!(sync.on_loaded_data());
        assert!(!sync.on_loaded_data());
        assert_eq!(a.play_calls(), 1);
    }

    #[test]
    fn nudge_happens_once() {
        let (a, _b, sync) = pair();
        sync.nudge();
        sync.nudge();
        assert_eq!(a.play_calls(), 1);
    }
}
