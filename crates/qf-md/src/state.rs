//! Connection state cell with transition observers.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use qf_core::ConnectionState;
use tracing::info;

/// Observer invoked with `(from, to)` on every state change. Must not block.
pub type StateObserver = Arc<dyn Fn(ConnectionState, ConnectionState) + Send + Sync>;

pub struct StateCell {
    label: String,
    state: AtomicU8,
    observers: Mutex<Vec<StateObserver>>,
}

impl StateCell {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            state: AtomicU8::new(ConnectionState::Disconnected.as_u8()),
            observers: Mutex::new(Vec::new()),
        }
    }

    #[inline]
    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move to `to`. Observers only hear about actual changes.
    pub fn set(&self, to: ConnectionState) {
        let from = ConnectionState::from_u8(self.state.swap(to.as_u8(), Ordering::AcqRel));
        if from == to {
            return;
        }
        info!("[{}] state {from} -> {to}", self.label);
        let observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner).clone();
        for obs in observers {
            obs(from, to);
        }
    }

    pub fn observe(&self, observer: StateObserver) {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner).push(observer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observers_see_changes_only() {
        let cell = StateCell::new("test");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        cell.observe(Arc::new(move |from, to| sink.lock().unwrap().push((from, to))));

        cell.set(ConnectionState::Connecting);
        cell.set(ConnectionState::Connecting);
        cell.set(ConnectionState::Connected);

        assert_eq!(cell.get(), ConnectionState::Connected);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (ConnectionState::Disconnected, ConnectionState::Connecting),
                (ConnectionState::Connecting, ConnectionState::Connected),
            ]
        );
    }
}
