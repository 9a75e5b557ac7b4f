//! Type aliases for shared state.
//!
//! The engine task owns everything it mutates; the only state visible to
//! other tasks sits behind one of these wrappers. Both use `parking_lot`
//! locks, which never poison and are cheaper than their `std` counterparts.
//!
//! ```rust,ignore
//! use penstream_core::types::*;
//!
//! let shared: ThreadSafeRw<EngineState> = thread_safe_rw(EngineState::default());
//! let position = shared.read().position;
//! ```

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// A thread-safe, mutex-protected wrapper for cross-thread sharing.
pub type ThreadSafe<T> = Arc<Mutex<T>>;

/// A thread-safe reader-writer lock wrapper for read-heavy workloads.
///
/// Used for the engine state: one writer (the engine task), many readers
/// (snapshot requests from UI or CLI tasks).
pub type ThreadSafeRw<T> = Arc<RwLock<T>>;

/// Create a new `ThreadSafe<T>` from a value.
pub fn thread_safe<T>(value: T) -> ThreadSafe<T> {
    Arc::new(Mutex::new(value))
}

/// Create a new `ThreadSafeRw<T>` from a value.
pub fn thread_safe_rw<T>(value: T) -> ThreadSafeRw<T> {
    Arc::new(RwLock::new(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_safe_rw_shared_across_threads() {
        let counter = thread_safe_rw(0_u32);
        let writer = counter.clone();
        std::thread::spawn(move || {
            *writer.write() += 1;
        })
        .join()
        .unwrap();
        assert_eq!(*counter.read(), 1);
    }
}
