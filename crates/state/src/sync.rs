//! Internal lock helper.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Acquire a mutex, recovering the guard if a test panic poisoned it.
///
/// Store state stays structurally valid across panics (mutations are
/// applied as single assignments), so the poison flag carries no signal.
pub(crate) fn acquire<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
