// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Tunable constants for a [`crate::Stm`] instance.
//!
//! Every default mirrors the configuration table from the core algorithm this crate
//! implements: a 2^20-slot lock table, 4096-entry initial read/write set capacity, and a
//! bounded number of callbacks per lifecycle hook.

/// Maximum number of callbacks that may be registered per lifecycle hook.
pub const MAX_CALLBACKS: usize = 16;

/// Upper bound on the number of threads that may hold a live
/// [`crate::registry::ThreadHandle`] concurrently. Used only to compute
/// [`Config::version_max`].
pub const DEFAULT_MAX_THREADS: usize = 8192;

/// Runtime configuration for an [`crate::Stm`] instance.
///
/// Construct with [`Config::default`] and override individual fields, or use the
/// `with_*` builder methods.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of slots in the lock table. Must be a power of two.
    pub lock_array_size: usize,

    /// Right-shift applied to an address before indexing the lock table.
    pub lock_shift: u32,

    /// Initial capacity reserved for a transaction's read and write sets.
    pub read_write_set_capacity: usize,

    /// Upper bound on concurrently registered thread contexts; used to leave headroom
    /// below the all-ones sentinel when computing the clock rollover threshold.
    pub max_threads: usize,

    /// Number of spin iterations tolerated on an owned lock before the read/write path
    /// gives up and aborts with [`crate::AbortReason::Killed`].
    ///
    /// The reference algorithm spins unboundedly under its suicide contention manager;
    /// this cap exists so an adversarial workload cannot livelock a thread forever.
    pub spin_cap: u32,

    /// Whether snapshot extension (see [`crate::Transaction`] docs) is enabled by
    /// default for new transactions. Can be toggled at runtime with
    /// [`crate::Stm::set_extension`].
    pub extension_enabled: bool,

    /// Overrides [`Config::version_max`]'s computed ceiling when set. Exists so a
    /// test can force a clock rollover without running `usize::MAX >> 1` real
    /// commits first; production configs should leave this `None`.
    pub version_max_override: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lock_array_size: 1 << 20,
            lock_shift: word_size_bytes().trailing_zeros() + 2,
            read_write_set_capacity: 4096,
            max_threads: DEFAULT_MAX_THREADS,
            spin_cap: 10_000,
            extension_enabled: true,
            version_max_override: None,
        }
    }
}

impl Config {
    /// The clock value at which a rollover barrier must run before any new transaction
    /// may start: `(usize::MAX >> 1) - max_threads`, unless
    /// [`Config::version_max_override`] is set.
    pub fn version_max(&self) -> usize {
        self.version_max_override.unwrap_or((usize::MAX >> 1) - self.max_threads)
    }

    pub(crate) fn assert_valid(&self) {
        assert!(
            self.lock_array_size.is_power_of_two(),
            "lock_array_size must be a power of two, got {}",
            self.lock_array_size
        );
        assert!(self.lock_array_size > 0, "lock_array_size must be non-zero");
    }
}

const fn word_size_bytes() -> usize {
    std::mem::size_of::<usize>()
}
