//! Endpoint Selection
//!
//! Decides which endpoints a dispatch touches and in which order.
//! The round-robin cursor is the only mutable state and is updated
//! atomically, so concurrent callers never observe a torn value.

use crate::domain::value_objects::EndpointStrategy;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Round-robin cursor shared by concurrent dispatches.
#[derive(Debug, Default)]
pub struct RoundRobinSelector {
    next: AtomicUsize,
}

impl RoundRobinSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the next index in `0..len`, or None when there is nothing to pick.
    pub fn select(&self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        Some(self.next.fetch_add(1, Ordering::Relaxed) % len)
    }
}

/// Endpoint indices to attempt for a strategy.
///
/// `All` and `Fallback` use declaration order (`Fallback` stops at the
/// first success, which is the caller's concern). `One` yields a single
/// index from the round-robin cursor.
pub fn attempt_order(strategy: EndpointStrategy, len: usize, selector: &RoundRobinSelector) -> Vec<usize> {
    match strategy {
        EndpointStrategy::All | EndpointStrategy::Fallback => (0..len).collect(),
        EndpointStrategy::One => selector.select(len).into_iter().collect(),
    }
}
