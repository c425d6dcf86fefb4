//! Request id allocation

use std::sync::atomic::{AtomicU64, Ordering};

/// Session-scoped request ids: "1", "2", "3", ...
#[derive(Debug)]
pub struct IdSequence {
    next: AtomicU64,
}

impl IdSequence {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next(&self) -> String {
        self.next.fetch_add(1, Ordering::Relaxed).to_string()
    }
}

impl Default for IdSequence {
    fn default() -> Self {
        Self::new()
    }
}
