//! Explicit observer registry.
//!
//! Listeners are registered with [`Observers::subscribe`] and stay active until
//! the returned [`Subscription`] is cancelled or dropped.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registry<T> {
    next_id: u64,
    listeners: Vec<(u64, Listener<T>)>,
}

/// A set of listeners for values of type `T`.
///
/// Cloning yields another handle to the same registry.
pub struct Observers<T> {
    inner: Arc<Mutex<Registry<T>>>,
}

impl<T> Clone for Observers<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Observers<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry {
                next_id: 0,
                listeners: Vec::new(),
            })),
        }
    }
}

impl<T: 'static> Observers<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. It is removed when the returned handle is
    /// cancelled or dropped.
    #[must_use = "dropping the subscription unsubscribes the listener"]
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = {
            let mut registry = lock(&self.inner);
            let id = registry.next_id;
            registry.next_id += 1;
            let listener: Listener<T> = Arc::new(listener);
            registry.listeners.push((id, listener));
            id
        };

        let weak: Weak<Mutex<Registry<T>>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                lock(&inner).listeners.retain(|(lid, _)| *lid != id);
            }
        })
    }

    /// Deliver `value` to every registered listener.
    ///
    /// Listeners run outside the registry lock, so they may subscribe or
    /// unsubscribe while being notified.
    pub fn notify(&self, value: &T) {
        let snapshot: Vec<Listener<T>> = lock(&self.inner)
            .listeners
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in snapshot {
            listener(value);
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner).listeners.is_empty()
    }
}

fn lock<T>(inner: &Mutex<Registry<T>>) -> MutexGuard<'_, Registry<T>> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Cancellation handle returned by `subscribe`.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new<F>(cancel: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Unsubscribe now.
    pub fn cancel(mut self) {
        self.run_cancel();
    }

    /// Keep the listener registered for the lifetime of the registry.
    pub fn detach(mut self) {
        self.cancel = None;
    }

    fn run_cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
