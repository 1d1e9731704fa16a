// Copyright 2026 The Incapy Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Synchronization helpers for code that notifies observers while holding
//! state: observers may call straight back into the routine that notified
//! them, and that must not deadlock.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

/// Locks `mutex`, ignoring poisoning. A panicking observer must not wedge
/// the engine for every other caller.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Single in-flight marker for a mutate-and-notify sequence.
///
/// Entering while the marker is already set fails instead of blocking, which
/// turns re-entrant calls (an observer calling back into the routine that
/// notified it, or a second thread racing the first) into no-ops.
#[derive(Debug, Default)]
pub(crate) struct InFlight {
    busy: AtomicBool,
}

/// Clears the marker when dropped.
#[derive(Debug)]
pub(crate) struct InFlightToken<'a> {
    busy: &'a AtomicBool,
}

impl InFlight {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn try_enter(&self) -> Option<InFlightToken<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightToken { busy: &self.busy })
    }
}

impl Drop for InFlightToken<'_> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// A mutex that remembers which thread holds it.
///
/// [`OwnedMutex::lock`] returns `None` instead of deadlocking when the
/// calling thread already holds the lock, e.g. an observer invoked during a
/// step calling back into the controller.
pub(crate) struct OwnedMutex<T> {
    value: Mutex<T>,
    owner: Mutex<Option<ThreadId>>,
}

pub(crate) struct OwnedGuard<'a, T> {
    guard: MutexGuard<'a, T>,
    owner: &'a Mutex<Option<ThreadId>>,
}

impl<T> OwnedMutex<T> {
    pub(crate) fn new(value: T) -> Self {
        OwnedMutex {
            value: Mutex::new(value),
            owner: Mutex::new(None),
        }
    }

    pub(crate) fn held_by_current(&self) -> bool {
        *lock(&self.owner) == Some(thread::current().id())
    }

    pub(crate) fn lock(&self) -> Option<OwnedGuard<'_, T>> {
        if self.held_by_current() {
            return None;
        }
        let guard = lock(&self.value);
        *lock(&self.owner) = Some(thread::current().id());
        Some(OwnedGuard {
            guard,
            owner: &self.owner,
        })
    }
}

impl<T> Deref for OwnedGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for OwnedGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for OwnedGuard<'_, T> {
    // runs before `guard` is released, so the owner is cleared while the
    // value is still locked
    fn drop(&mut self) {
        *lock(self.owner) = None;
    }
}
