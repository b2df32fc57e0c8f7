use crate::foundation::core::Rect;
use crate::host::Event;

/// Maps horizontal pointer position over the rendering surface onto a mask frame index.
#[derive(Clone, Copy, Debug)]
pub struct InputMapper {
    frame_count: usize,
}

impl InputMapper {
    pub fn new(frame_count: usize) -> Self {
        Self {
            frame_count: frame_count.max(1),
        }
    }

    /// Horizontal coordinate of an event: the first active touch point, else the pointer.
    pub fn event_x(event: &Event) -> Option<f64> {
        event.touches.first().copied().or(event.client_x)
    }

    /// Fraction of the surface width covered by `x`, clamped to `[0, 1]`.
    ///
    /// Degenerate (zero or negative width) rectangles and NaN input map to `0`.
    pub fn percent(x: f64, rect: Rect) -> f64 {
        let width = rect.width();
        if width.is_nan() || width <= 0.0 || x.is_nan() {
            return 0.0;
        }
        let p = (x - rect.x0) / width;
        if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) }
    }

    /// Frame index for `x`, always in `[0, frame_count - 1]`.
    pub fn frame_for(&self, x: f64, rect: Rect) -> usize {
        let last = self.frame_count - 1;
        let idx = (Self::percent(x, rect) * last as f64).floor() as usize;
        idx.min(last)
    }

    pub fn frame_for_event(&self, event: &Event, rect: Rect) -> Option<usize> {
        Self::event_x(event).map(|x| self.frame_for(x, rect))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::EventKind;

    fn rect() -> Rect {
        Rect::new(100.0, 0.0, 900.0, 450.0)
    }

    #[test]
    fn clamps_outside_the_surface() {
        let m = InputMapper::new(21);
        assert_eq!(m.frame_for(-5000.0, rect()), 0);
        assert_eq!(m.frame_for(99.9, rect()), 0);
        assert_eq!(m.frame_for(900.1, rect()), 20);
        assert_eq!(m.frame_for(1.0e9, rect()), 20);
    }

    #[test]
    fn maps_interior_positions_with_floor() {
        let m = InputMapper::new(21);
        assert_eq!(m.frame_for(100.0, rect()), 0);
        assert_eq!(m.frame_for(500.0, rect()), 10);
        assert_eq!(m.frame_for(899.0, rect()), 19);
        assert_eq!(m.frame_for(900.0, rect()), 20);
    }

    #[test]
    fn degenerate_rect_and_nan_map_to_zero() {
        let m = InputMapper::new(21);
        let zero = Rect::new(50.0, 0.0, 50.0, 10.0);
        assert_eq!(m.frame_for(50.0, zero), 0);
        assert_eq!(m.frame_for(1000.0, zero), 0);
        assert_eq!(m.frame_for(f64::NAN, rect()), 0);
        assert_eq!(m.frame_for(f64::INFINITY, rect()), 20);
        assert_eq!(m.frame_for(f64::NEG_INFINITY, rect()), 0);
    }

    #[test]
    fn first_touch_wins_over_pointer() {
        let m = InputMapper::new(21);
        let ev = Event {
            kind: EventKind::TouchMove,
            client_x: Some(100.0),
            touches: vec![900.0, 100.0],
        };
        assert_eq!(m.frame_for_event(&ev, rect()), Some(20));

        let bare = Event::new(EventKind::TouchMove);
        assert_eq!(m.frame_for_event(&bare, rect()), None);
    }
}
