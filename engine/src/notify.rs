//! State-change notification fan-out.
//!
//! An explicit observer list rather than an ambient event: listeners are
//! registered on the scheduler and invoked synchronously after every phase
//! transition. A faulting listener is isolated and logged so it can never
//! break mode switching for everyone else.

use std::panic::{AssertUnwindSafe, catch_unwind};

use stageflow_types::{Phase, StateTag};

use crate::entry::panic_message;

/// Notification broadcast on every phase transition.
#[derive(Debug)]
pub struct StateChange<'a, P> {
    pub state: StateTag,
    pub phase: Phase,
    pub payload: &'a P,
}

type Listener<P> = Box<dyn FnMut(&StateChange<'_, P>)>;

pub(crate) struct Listeners<P: 'static> {
    listeners: Vec<Listener<P>>,
}

impl<P> Listeners<P> {
    pub(crate) fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    pub(crate) fn subscribe(&mut self, listener: impl FnMut(&StateChange<'_, P>) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub(crate) fn broadcast(&mut self, change: &StateChange<'_, P>) {
        for listener in &mut self.listeners {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| listener(change))) {
                tracing::warn!(
                    state = %change.state,
                    phase = %change.phase,
                    fault = %panic_message(payload.as_ref()),
                    "state-change listener panicked"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn broadcast_reaches_every_listener() {
        let seen: Rc<RefCell<Vec<Phase>>> = Rc::new(RefCell::new(Vec::new()));
        let mut listeners: Listeners<u32> = Listeners::new();
        for _ in 0..2 {
            let seen = Rc::clone(&seen);
            listeners.subscribe(move |change| seen.borrow_mut().push(change.phase));
        }
        listeners.broadcast(&StateChange {
            state: StateTag::new("gameplay"),
            phase: Phase::Begin,
            payload: &7,
        });
        assert_eq!(seen.borrow().len(), 2);
    }

    #[test]
    fn panicking_listener_does_not_starve_later_ones() {
        let seen = Rc::new(RefCell::new(0u32));
        let mut listeners: Listeners<()> = Listeners::new();
        listeners.subscribe(|_| panic!("listener bug"));
        {
            let seen = Rc::clone(&seen);
            listeners.subscribe(move |_| *seen.borrow_mut() += 1);
        }
        listeners.broadcast(&StateChange {
            state: StateTag::new("menu"),
            phase: Phase::End,
            payload: &(),
        });
        assert_eq!(*seen.borrow(), 1);
    }
}
