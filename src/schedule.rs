use crate::host::CallbackHandle;

/// Lifecycle of the render loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    /// Created, nothing scheduled yet.
    Idle,
    /// Polling readiness once per refresh tick.
    Waiting,
    /// Drawing once per refresh tick.
    Active,
    /// Torn down; nothing runs again.
    Destroyed,
}

/// Kind of refresh-tick callback the owner must schedule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arm {
    /// Re-check readiness on the next tick.
    Wait,
    /// Draw on the next tick.
    Draw,
}

/// What a draw tick should do once it fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawDecision {
    /// The loop was torn down; do nothing and schedule nothing.
    Skip,
    /// Inputs are not ready; schedule the next draw tick without drawing.
    Rearm,
    /// Compose and draw, then schedule the next draw tick.
    Draw,
}

/// Suspend/resume state machine of the render loop.
///
/// Pure bookkeeping: the owner performs the actual scheduling and reports the handles back. At
/// most one wait tick and one draw tick are ever outstanding.
#[derive(Debug)]
pub struct RenderScheduler {
    state: SchedulerState,
    wait: Option<CallbackHandle>,
    draw: Option<CallbackHandle>,
}

impl Default for RenderScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderScheduler {
    pub fn new() -> Self {
        Self {
            state: SchedulerState::Idle,
            wait: None,
            draw: None,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_destroyed(&self) -> bool {
        self.state == SchedulerState::Destroyed
    }

    /// A render was requested. Returns the tick to schedule, if one is needed.
    pub fn request(&mut self, ready: bool) -> Option<Arm> {
        match self.state {
            SchedulerState::Destroyed => None,
            SchedulerState::Active => None,
            SchedulerState::Idle | SchedulerState::Waiting if ready => {
                self.state = SchedulerState::Active;
                Some(Arm::Draw)
            }
            SchedulerState::Idle | SchedulerState::Waiting => {
                self.state = SchedulerState::Waiting;
                self.wait.is_none().then_some(Arm::Wait)
            }
        }
    }

    /// Record the handle of the tick scheduled for `arm`.
    pub fn armed(&mut self, arm: Arm, handle: CallbackHandle) {
        if self.is_destroyed() {
            return;
        }
        match arm {
            Arm::Wait => self.wait = Some(handle),
            Arm::Draw => {
                debug_assert!(self.draw.is_none(), "draw tick scheduled twice");
                self.draw = Some(handle);
            }
        }
    }

    /// A wait tick fired. Returns the next tick to schedule.
    pub fn on_wait_fired(&mut self, ready: bool) -> Option<Arm> {
        self.wait = None;
        self.request(ready)
    }

    /// A draw tick fired. The caller must call [`RenderScheduler::armed`] with a new draw handle
    /// for anything other than [`DrawDecision::Skip`].
    pub fn on_draw_fired(&mut self, ready: bool) -> DrawDecision {
        self.draw = None;
        match self.state {
            SchedulerState::Destroyed => DrawDecision::Skip,
            _ if !ready => DrawDecision::Rearm,
            _ => DrawDecision::Draw,
        }
    }

    /// Enter `Destroyed` and hand back every outstanding tick so the owner can cancel it.
    pub fn destroy(&mut self) -> Vec<CallbackHandle> {
        self.state = SchedulerState::Destroyed;
        self.wait.take().into_iter().chain(self.draw.take()).collect()
    }

    pub fn pending(&self) -> (Option<CallbackHandle>, Option<CallbackHandle>) {
        (self.wait, self.draw)
    }
}
