//! Per-instance publish/subscribe registry
//!
//! Transports and health monitors each own one [`Listeners`] value. Handlers
//! are registered with [`Listeners::subscribe`], which returns a
//! [`Subscription`] token; calling [`Subscription::unsubscribe`] removes the
//! handler. There is no global bus.
//!
//! Handlers run synchronously on the emitting task, outside the registry
//! lock, so a handler may subscribe or unsubscribe without deadlocking.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Registry<E> {
    next_id: u64,
    handlers: Vec<(u64, Handler<E>)>,
}

/// A set of event handlers owned by one component instance.
pub struct Listeners<E> {
    inner: Arc<Mutex<Registry<E>>>,
}

impl<E> Default for Listeners<E> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry {
                next_id: 0,
                handlers: Vec::new(),
            })),
        }
    }
}

impl<E: 'static> fmt::Debug for Listeners<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.len())
            .finish()
    }
}

fn lock<E>(registry: &Mutex<Registry<E>>) -> MutexGuard<'_, Registry<E>> {
    // A panicking handler never runs under the lock, so poisoning carries no
    // torn state.
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<E: 'static> Listeners<E> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` and return the token that removes it.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::atomic::{AtomicUsize, Ordering};
    /// use std::sync::Arc;
    /// use mcp_probe::events::Listeners;
    ///
    /// let listeners = Listeners::<u32>::new();
    /// let seen = Arc::new(AtomicUsize::new(0));
    /// let counter = Arc::clone(&seen);
    /// let sub = listeners.subscribe(move |_| {
    ///     counter.fetch_add(1, Ordering::SeqCst);
    /// });
    ///
    /// listeners.emit(&1);
    /// sub.unsubscribe();
    /// listeners.emit(&2);
    /// assert_eq!(seen.load(Ordering::SeqCst), 1);
    /// ```
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = {
            let mut registry = lock(&self.inner);
            let id = registry.next_id;
            registry.next_id += 1;
            registry.handlers.push((id, Arc::new(handler)));
            id
        };

        let weak: Weak<Mutex<Registry<E>>> = Arc::downgrade(&self.inner);
        Subscription {
            id,
            remove: Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    lock(&inner).handlers.retain(|(hid, _)| *hid != id);
                }
            }),
        }
    }

    /// Deliver `event` to every registered handler in registration order.
    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Handler<E>> = lock(&self.inner)
            .handlers
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for handler in snapshot {
            handler(event);
        }
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        lock(&self.inner).handlers.len()
    }

    /// True when no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Token returned by [`Listeners::subscribe`].
///
/// Dropping the token leaves the handler registered; call
/// [`Subscription::unsubscribe`] to remove it. Unsubscribing after the owning
/// registry is gone is a no-op.
pub struct Subscription {
    id: u64,
    remove: Box<dyn FnOnce() + Send + Sync>,
}

impl Subscription {
    /// Remove the handler this token was issued for.
    pub fn unsubscribe(self) {
        (self.remove)();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
