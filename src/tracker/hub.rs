use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::accounting::{ActivityCallback, Subscription};

#[derive(Default)]
struct Listeners {
    next_id: u64,
    callbacks: BTreeMap<u64, ActivityCallback>,
}

/// Fan-out point between input sources and registered activity callbacks.
#[derive(Clone, Default)]
pub struct SignalHub {
    listeners: Arc<Mutex<Listeners>>,
}

impl SignalHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(listeners: &Mutex<Listeners>) -> MutexGuard<'_, Listeners> {
        listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self, callback: ActivityCallback) -> Subscription {
        let id = {
            let mut listeners = Self::lock(&self.listeners);
            let id = listeners.next_id;
            listeners.next_id += 1;
            listeners.callbacks.insert(id, callback);
            id
        };
        let listeners = Arc::clone(&self.listeners);
        Subscription::new(move || {
            Self::lock(&listeners).callbacks.remove(&id);
        })
    }

    pub fn emit(&self) {
        // Callbacks run outside the lock so they may subscribe or unsubscribe.
        let callbacks: Vec<ActivityCallback> = Self::lock(&self.listeners).callbacks.values().cloned().collect();
        for callback in callbacks {
            callback();
        }
    }

    pub fn listener_count(&self) -> usize {
        Self::lock(&self.listeners).callbacks.len()
    }
}
