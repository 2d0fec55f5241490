//! Synchronized state abstraction for state shared between execution contexts.
//!
//! The real-time scheduler tick, inbound message handling and the background
//! maintenance worker all touch the parameter and FTP queues. Every such
//! structure sits behind `SharedState<T>` so the lock is held only for the
//! duration of a closure and never across a storage operation.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};

/// Platform-agnostic synchronized state access.
///
/// Implemented by `EmbassyState<T>`, Embassy's critical-section Mutex around
/// a RefCell, which is shared across threads.
///
/// # Example
///
/// ```
/// use pico_trail_gcs::core::traits::{EmbassyState, SharedState};
///
/// struct Counter {
///     value: u32,
/// }
///
/// fn increment<S: SharedState<Counter>>(state: &S) -> u32 {
///     state.with_mut(|counter| {
///         counter.value += 1;
///         counter.value
///     })
/// }
///
/// let state = EmbassyState::new(Counter { value: 0 });
/// assert_eq!(increment(&state), 1);
/// ```
pub trait SharedState<T> {
    /// Access state immutably.
    fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R;

    /// Access state mutably.
    fn with_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut T) -> R;
}

/// Synchronized state using Embassy's critical-section Mutex.
///
/// On host builds the `critical-section` `std` implementation backs the
/// critical section with a global lock, so this type is `Sync` and may be
/// shared through an `Arc` between the tick thread and the worker thread.
///
/// Closures must not re-enter the same `EmbassyState`; nested access to a
/// different state is fine.
pub struct EmbassyState<T> {
    inner: Mutex<CriticalSectionRawMutex, RefCell<T>>,
}

impl<T> EmbassyState<T> {
    /// Creates a new `EmbassyState` wrapping the given value.
    ///
    /// This is a const fn, allowing static initialization.
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(value)),
        }
    }
}

impl<T: Default> Default for EmbassyState<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> SharedState<T> for EmbassyState<T> {
    fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        self.inner.lock(|cell| f(&cell.borrow()))
    }

    fn with_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()))
    }
}
