//! Process-wide "current session" convenience.
//!
//! Explicit session passing is the primary mechanism everywhere in this
//! workspace; this registry is a thin opt-in convenience for code that
//! genuinely cannot thread a parameter. Nothing ever sets it implicitly:
//! it holds exactly what [`set_current`] was given, until [`clear_current`]
//! removes it.

use std::any::Any;
use std::sync::{Arc, LazyLock, Mutex};

static CURRENT: LazyLock<Mutex<Option<Arc<dyn Any + Send + Sync>>>> =
    LazyLock::new(|| Mutex::new(None));

/// Publish a shared session (or any shared state) as the process-wide
/// current one, replacing whatever was set before.
pub fn set_current<S: Send + Sync + 'static>(session: Arc<S>) {
    let mut slot = CURRENT.lock().expect("lock poisoned");
    *slot = Some(session);
}

/// Fetch the published current session.
///
/// Returns `None` when nothing is set or the stored value is of a
/// different type - never an error.
#[must_use]
pub fn current<S: Send + Sync + 'static>() -> Option<Arc<S>> {
    let slot = CURRENT.lock().expect("lock poisoned");
    slot.clone().and_then(|any| any.downcast::<S>().ok())
}

/// Clear the published current session, if any.
pub fn clear_current() {
    let mut slot = CURRENT.lock().expect("lock poisoned");
    *slot = None;
}
