use std::collections::HashSet;

use parking_lot::Mutex;

/// What a single "all bets sent" notification did to the barrier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notified {
    /// The agency was registered, others are still missing
    Waiting { remaining: usize },
    /// The agency completed the set, the caller owns the release
    Released,
    /// The agency had already been registered
    Duplicate,
    /// The barrier had already been released
    AlreadyReleased,
}

#[derive(Debug, Default)]
struct State {
    agencies: HashSet<u32>,
    released: bool,
}

/// Waits for every agency to report it is done,
/// and lets exactly one caller through once they all have
#[derive(Debug)]
pub struct CompletionBarrier {
    total: usize,
    state: Mutex<State>,
}

impl CompletionBarrier {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            state: Mutex::default(),
        }
    }

    /// Registers the agency as done
    ///
    /// the registration and the release check happen under the same lock,
    /// so at most one call over the lifetime of the barrier returns `Released`
    pub fn notify(&self, agency: u32) -> Notified {
        let mut state = self.state.lock();
        if state.released {
            return Notified::AlreadyReleased;
        }

        if !state.agencies.insert(agency) {
            return Notified::Duplicate;
        }

        if state.agencies.len() >= self.total {
            state.released = true;
            return Notified::Released;
        }

        Notified::Waiting {
            remaining: self.total - state.agencies.len(),
        }
    }

    #[cfg(test)]
    pub fn is_released(&self) -> bool {
        self.state.lock().released
    }
}
