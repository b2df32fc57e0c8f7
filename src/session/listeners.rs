use std::rc::Rc;

use crate::host::{EventKind, EventTarget, Handler, ListenerId};

struct Registration {
    target: Rc<dyn EventTarget>,
    kind: EventKind,
    id: ListenerId,
}

/// Every listener a compositor registered, so teardown can remove each exactly once.
#[derive(Default)]
pub struct ListenerRegistry {
    entries: Vec<Registration>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, target: &Rc<dyn EventTarget>, kind: EventKind, handler: Handler) {
        let id = target.add_listener(kind, handler);
        self.entries.push(Registration {
            target: Rc::clone(target),
            kind,
            id,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove and forget every registration. Returns how many were removed.
    pub fn remove_all(&mut self) -> usize {
        let n = self.entries.len();
        for r in self.entries.drain(..) {
            r.target.remove_listener(r.kind, r.id);
        }
        n
    }
}
