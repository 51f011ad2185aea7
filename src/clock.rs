// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The global version clock: a single monotonically increasing counter shared by every
//! transaction.

use std::sync::atomic::{AtomicUsize, Ordering};

/// The global version clock `C`. Supplies snapshot timestamps (read at `begin`) and
/// commit timestamps (fetched-and-incremented by a committing writer).
#[derive(Default)]
pub struct GlobalClock {
    value: AtomicUsize,
}

impl GlobalClock {
    pub fn new() -> Self {
        Self { value: AtomicUsize::new(0) }
    }

    #[inline(always)]
    pub fn load(&self) -> usize {
        self.value.load(Ordering::Acquire)
    }

    /// Atomically increments the clock and returns its *previous* value, so the caller
    /// derives the fresh commit timestamp as `fetch_increment() + 1`.
    #[inline(always)]
    pub fn fetch_increment(&self) -> usize {
        self.value.fetch_add(1, Ordering::AcqRel)
    }

    /// Resets the clock to zero. Only safe under the quiescence barrier.
    pub fn reset(&self) {
        self.value.store(0, Ordering::SeqCst);
    }
}
