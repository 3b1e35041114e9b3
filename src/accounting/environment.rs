use std::sync::Arc;

/// Invoked on every recognized input signal. May run on any thread.
pub type ActivityCallback = Arc<dyn Fn() + Send + Sync>;

/// Platform hooks the accounting loop depends on.
pub trait ActivityEnvironment: Send + Sync + 'static {
    /// Whether the tracked view is currently visible to the user.
    fn is_foreground(&self) -> bool;

    /// Registers `callback` for input signals until the returned
    /// [`Subscription`] is dropped or unsubscribed.
    fn on_activity_signal(&self, callback: ActivityCallback) -> Subscription;
}

/// Unsubscribe handle returned by [`ActivityEnvironment::on_activity_signal`].
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}
