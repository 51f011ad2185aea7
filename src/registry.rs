// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Thread registration and the quiescence barrier used to roll the global clock back
//! to zero before it runs into [`crate::Config::version_max`].
//!
//! Built on the same `no_deadlocks`-gated primitives as [`crate::sync`], over a flat
//! `Vec` of per-thread flags: the registry's hot path (`enter`/`exit`) only ever
//! touches one `AtomicBool`, and the cold path (`rollover`) is the only one that walks
//! the whole list.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::sync::Mutex;

/// A handle a worker thread holds for the lifetime of its participation in one
/// [`crate::Stm`] instance. Dropping it deregisters the thread.
pub struct ThreadHandle {
    flag: Arc<AtomicBool>,
    registry: Arc<ThreadRegistryInner>,
}

impl ThreadHandle {
    /// Marks this thread as mid-transaction; the quiescence barrier will wait for it.
    pub fn enter(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Marks this thread as quiescent.
    pub fn exit(&self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl Drop for ThreadHandle {
    fn drop(&mut self) {
        self.registry.deregister(&self.flag);
    }
}

struct ThreadRegistryInner {
    flags: Mutex<Vec<Arc<AtomicBool>>>,
}

impl ThreadRegistryInner {
    fn deregister(&self, flag: &Arc<AtomicBool>) {
        let mut flags = self.flags.lock().expect("thread registry mutex poisoned");
        if let Some(pos) = flags.iter().position(|f| Arc::ptr_eq(f, flag)) {
            flags.swap_remove(pos);
        }
    }
}

/// Tracks every thread currently participating in one [`crate::Stm`] instance, so a
/// clock rollover can wait until all of them are between transactions.
pub struct ThreadRegistry {
    inner: Arc<ThreadRegistryInner>,
}

impl Default for ThreadRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadRegistry {
    pub fn new() -> Self {
        Self { inner: Arc::new(ThreadRegistryInner { flags: Mutex::new(Vec::new()) }) }
    }

    pub fn register(&self) -> ThreadHandle {
        let flag = Arc::new(AtomicBool::new(false));
        self.inner.flags.lock().expect("thread registry mutex poisoned").push(flag.clone());
        ThreadHandle { flag, registry: self.inner.clone() }
    }

    /// Spins (yielding between polls) until every registered thread reports
    /// quiescent, then runs `reset`. Callers hold no lock across this call other
    /// than the registry's own, so a thread calling `enter`/`exit` is never blocked
    /// behind the barrier.
    pub fn rollover(&self, reset: impl FnOnce()) {
        loop {
            let flags = self.inner.flags.lock().expect("thread registry mutex poisoned");
            if flags.iter().all(|f| !f.load(Ordering::Acquire)) {
                break;
            }
            drop(flags);
            std::thread::yield_now();
        }
        reset();
    }
}
