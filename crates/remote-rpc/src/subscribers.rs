//! Multi-subscriber callback lists with explicit disposers

use std::sync::{Arc, Weak};

use parking_lot::RwLock;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct SubscriberList<T> {
    next_id: u64,
    entries: Vec<(u64, Callback<T>)>,
}

/// Callbacks registered for one kind of event.
///
/// Cloning shares the same list.
pub struct Subscribers<T> {
    inner: Arc<RwLock<SubscriberList<T>>>,
}

impl<T: 'static> Subscribers<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(SubscriberList {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Register a callback; it stays registered while the returned
    /// [`Subscription`] is alive.
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = {
            let mut list = self.inner.write();
            let id = list.next_id;
            list.next_id += 1;
            list.entries.push((id, Arc::new(callback)));
            id
        };

        let list: Weak<RwLock<SubscriberList<T>>> = Arc::downgrade(&self.inner);
        Subscription {
            dispose: Some(Box::new(move || {
                if let Some(list) = list.upgrade() {
                    list.write().entries.retain(|(entry, _)| *entry != id);
                }
            })),
        }
    }

    /// Invoke every current callback once, in registration order.
    ///
    /// Callbacks run without the lock held, so they may subscribe or
    /// unsubscribe.
    pub fn emit(&self, value: &T) {
        let callbacks: Vec<Callback<T>> = self
            .inner
            .read()
            .entries
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();

        for callback in callbacks {
            callback(value);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: 'static> Default for Subscribers<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Subscribers<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Disposer returned by [`Subscribers::subscribe`]; dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    dispose: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.run();
    }

    /// Keep the callback registered for as long as its list lives.
    pub fn detach(mut self) {
        self.dispose = None;
    }

    fn run(&mut self) {
        if let Some(dispose) = self.dispose.take() {
            dispose();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.dispose.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_emit_reaches_every_subscriber_once() {
        let subs = Subscribers::<u32>::new();
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));

        let a2 = a.clone();
        let _sa = subs.subscribe(move |v| {
            a2.fetch_add(*v as usize, Ordering::SeqCst);
        });
        let b2 = b.clone();
        let _sb = subs.subscribe(move |v| {
            b2.fetch_add(*v as usize, Ordering::SeqCst);
        });

        subs.emit(&1);
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let subs = Subscribers::<()>::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let h = hits.clone();
        let sub = subs.subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(subs.len(), 1);

        drop(sub);
        subs.emit(&());
        assert!(subs.is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unsubscribe_only_removes_own_callback() {
        let subs = Subscribers::<()>::new();
        let first = subs.subscribe(|_| {});
        let _second = subs.subscribe(|_| {});

        first.unsubscribe();
        assert_eq!(subs.len(), 1);
    }

    #[test]
    fn test_detach_keeps_callback() {
        let subs = Subscribers::<()>::new();
        subs.subscribe(|_| {}).detach();
        assert_eq!(subs.len(), 1);
    }

    #[test]
    fn test_callback_may_subscribe_during_emit() {
        let subs = Subscribers::<()>::new();
        let inner = subs.clone();
        subs.subscribe(move |_| inner.subscribe(|_| {}).detach())
            .detach();

        subs.emit(&());
        assert_eq!(subs.len(), 2);
    }

    #[test]
    fn test_subscription_outliving_list_is_harmless() {
        let subs = Subscribers::<()>::new();
        let sub = subs.subscribe(|_| {});
        drop(subs);
        drop(sub);
    }
}
