//! Lock helpers that recover from poisoning, and panic payload text.
//!
//! A panic while holding one of the scheduler's locks never leaves the
//! guarded data half-written (task functions and callbacks run outside every
//! lock), so the inner value is still consistent and is taken over.

use std::any::Any;
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::error;

pub(crate) fn lock<'a, T>(m: &'a Mutex<T>, what: &'static str) -> MutexGuard<'a, T> {
    m.lock().unwrap_or_else(|poisoned| {
        error!(lock = what, "lock poisoned; recovering");
        poisoned.into_inner()
    })
}

pub(crate) fn read<'a, T>(l: &'a RwLock<T>, what: &'static str) -> RwLockReadGuard<'a, T> {
    l.read().unwrap_or_else(|poisoned| {
        error!(lock = what, "lock poisoned; recovering");
        poisoned.into_inner()
    })
}

pub(crate) fn write<'a, T>(l: &'a RwLock<T>, what: &'static str) -> RwLockWriteGuard<'a, T> {
    l.write().unwrap_or_else(|poisoned| {
        error!(lock = what, "lock poisoned; recovering");
        poisoned.into_inner()
    })
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
