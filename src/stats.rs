// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Runtime counters exposed through [`crate::Stm::get_stats`].

use std::sync::atomic::{AtomicU64, Ordering};

use crate::abort::AbortReason;

/// A snapshot of [`Stats`], safe to hand out to callers.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsSnapshot {
    pub commits: u64,
    pub aborts_val_read: u64,
    pub aborts_val_write: u64,
    pub aborts_ww_conflict: u64,
    pub aborts_validate: u64,
    pub aborts_ro_write: u64,
    pub aborts_explicit: u64,
    pub aborts_killed: u64,
    pub max_read_set_len: u64,
    pub max_write_set_len: u64,
}

impl StatsSnapshot {
    pub fn total_aborts(&self) -> u64 {
        self.aborts_val_read
            + self.aborts_val_write
            + self.aborts_ww_conflict
            + self.aborts_validate
            + self.aborts_ro_write
            + self.aborts_explicit
            + self.aborts_killed
    }
}

/// Atomic counters accumulated across every transaction run against one
/// [`crate::Stm`] instance.
#[derive(Default)]
pub struct Stats {
    commits: AtomicU64,
    aborts_val_read: AtomicU64,
    aborts_val_write: AtomicU64,
    aborts_ww_conflict: AtomicU64,
    aborts_validate: AtomicU64,
    aborts_ro_write: AtomicU64,
    aborts_explicit: AtomicU64,
    aborts_killed: AtomicU64,
    max_read_set_len: AtomicU64,
    max_write_set_len: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_commit(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_abort(&self, reason: AbortReason) {
        let counter = match reason {
            AbortReason::ValRead => &self.aborts_val_read,
            AbortReason::ValWrite => &self.aborts_val_write,
            AbortReason::WwConflict => &self.aborts_ww_conflict,
            AbortReason::Validate => &self.aborts_validate,
            AbortReason::RoWrite => &self.aborts_ro_write,
            AbortReason::Explicit => &self.aborts_explicit,
            AbortReason::Killed => &self.aborts_killed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_set_sizes(&self, read_len: usize, write_len: usize) {
        self.max_read_set_len.fetch_max(read_len as u64, Ordering::Relaxed);
        self.max_write_set_len.fetch_max(write_len as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            commits: self.commits.load(Ordering::Relaxed),
            aborts_val_read: self.aborts_val_read.load(Ordering::Relaxed),
            aborts_val_write: self.aborts_val_write.load(Ordering::Relaxed),
            aborts_ww_conflict: self.aborts_ww_conflict.load(Ordering::Relaxed),
            aborts_validate: self.aborts_validate.load(Ordering::Relaxed),
            aborts_ro_write: self.aborts_ro_write.load(Ordering::Relaxed),
            aborts_explicit: self.aborts_explicit.load(Ordering::Relaxed),
            aborts_killed: self.aborts_killed.load(Ordering::Relaxed),
            max_read_set_len: self.max_read_set_len.load(Ordering::Relaxed),
            max_write_set_len: self.max_write_set_len.load(Ordering::Relaxed),
        }
    }
}
