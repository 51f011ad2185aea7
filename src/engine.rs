// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The public entry point: [`Stm`], the shared runtime state every transaction runs
//! against, and the retry loop that drives a transactional closure to completion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, trace};

use crate::abort::AbortReason;
use crate::callbacks::CallbackRegistry;
use crate::clock::GlobalClock;
use crate::config::Config;
use crate::contention::{ContentionManager, SuicideCm};
use crate::lock_table::LockTable;
use crate::registry::ThreadRegistry;
use crate::stats::{Stats, StatsSnapshot};
use crate::tvar::TVar;
use crate::txn::Transaction;

/// State shared by every transaction running against one [`Stm`] instance.
pub(crate) struct Shared {
    pub(crate) clock: GlobalClock,
    pub(crate) lock_table: LockTable,
    pub(crate) registry: ThreadRegistry,
    pub(crate) callbacks: CallbackRegistry,
    pub(crate) contention: Box<dyn ContentionManager>,
    pub(crate) config: Config,
    pub(crate) stats: Stats,
    extension_enabled: AtomicBool,
}

impl Shared {
    pub(crate) fn new(config: Config, contention: Box<dyn ContentionManager>) -> Self {
        config.assert_valid();
        let lock_table = LockTable::new(config.lock_array_size, config.lock_shift);
        let extension_enabled = AtomicBool::new(config.extension_enabled);
        Self {
            clock: GlobalClock::new(),
            lock_table,
            registry: ThreadRegistry::new(),
            callbacks: CallbackRegistry::new(),
            contention,
            config,
            stats: Stats::new(),
            extension_enabled,
        }
    }

    fn extension_enabled(&self) -> bool {
        self.extension_enabled.load(Ordering::Relaxed)
    }

    /// Runs a rollover if the clock has reached the configured ceiling, per §4.10.
    /// Safe to call on every `begin`: it is a cheap load in the common case.
    fn maybe_rollover(&self) {
        if self.clock.load() < self.config.version_max() {
            return;
        }
        debug!("global clock reached version_max, running quiescence barrier");
        self.registry.rollover(|| {
            self.clock.reset();
            self.lock_table.reset_all();
        });
    }
}

/// Attributes controlling how a transaction is run, set via
/// [`Stm::read_write_with`].
#[derive(Debug, Clone, Copy)]
pub struct TxAttrs {
    /// Read-only transactions skip read-set insertion is *not* implied; rather they
    /// are simply disallowed from writing (`RO_WRITE`) and so never build a write
    /// set, short-circuiting the acquire phase entirely at commit.
    pub read_only: bool,

    /// If `true`, a retryable abort is surfaced to the caller as `Err` instead of
    /// being retried transparently.
    pub no_retry: bool,
}

impl Default for TxAttrs {
    fn default() -> Self {
        Self { read_only: false, no_retry: false }
    }
}

/// An STM runtime: a global clock, a shared lock table, and the thread/callback
/// bookkeeping a transaction needs. Clone is cheap (an `Arc` bump) and every clone
/// shares the same underlying state, the way multiple worker threads are expected to
/// hold one `Stm` each.
#[derive(Clone)]
pub struct Stm {
    shared: Arc<Shared>,
}

impl Default for Stm {
    fn default() -> Self {
        Self::new()
    }
}

impl Stm {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self { shared: Arc::new(Shared::new(config, Box::new(SuicideCm))) }
    }

    /// Creates a new transactional variable. Variables are independent of any
    /// particular `Stm` instance; the instance only supplies the lock table and
    /// clock a transaction over it runs against.
    pub fn create<T: Copy>(&self, initial: T) -> TVar<T> {
        TVar::new(initial)
    }

    pub fn set_extension(&self, enabled: bool) {
        self.shared.extension_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.shared.callbacks
    }

    /// Runs `f` as a read-write transaction, retrying transparently on any
    /// retryable abort.
    pub fn read_write<T>(&self, f: impl Fn(&mut Transaction) -> Result<T, AbortReason>) -> Result<T, AbortReason> {
        self.read_write_with(TxAttrs::default(), f)
    }

    pub fn read_write_with<T>(
        &self,
        attrs: TxAttrs,
        f: impl Fn(&mut Transaction) -> Result<T, AbortReason>,
    ) -> Result<T, AbortReason> {
        self.run(attrs, f)
    }

    /// Runs `f` as a read-only transaction: any `Transaction::store` call inside it
    /// aborts with `RO_WRITE`.
    pub fn read_only<T>(&self, f: impl Fn(&mut Transaction) -> Result<T, AbortReason>) -> Result<T, AbortReason> {
        self.run(TxAttrs { read_only: true, ..TxAttrs::default() }, f)
    }

    fn run<T>(&self, attrs: TxAttrs, f: impl Fn(&mut Transaction) -> Result<T, AbortReason>) -> Result<T, AbortReason> {
        let handle = self.shared.registry.register();
        self.shared.callbacks.fire_thread_init();

        let can_extend = self.shared.extension_enabled() && !attrs.read_only;
        self.shared.maybe_rollover();
        handle.enter();
        let mut tx = Transaction::begin(&self.shared, attrs.read_only, can_extend);
        self.shared.callbacks.fire_begin();

        let outcome = loop {
            let result = f(&mut tx).and_then(|value| tx.commit().map(|_| value));
            self.shared.stats.record_set_sizes(tx.read_set_len(), tx.write_set_len());
            match result {
                Ok(value) => {
                    self.shared.stats.record_commit();
                    self.shared.callbacks.fire_commit();
                    trace!("transaction committed at clock {}", self.shared.clock.load());
                    break Ok(value);
                }
                Err(reason) => {
                    self.shared.stats.record_abort(reason);
                    self.shared.callbacks.fire_abort(reason);
                    if !reason.is_retryable() || attrs.no_retry {
                        break Err(reason);
                    }
                    handle.exit();
                    self.shared.maybe_rollover();
                    handle.enter();
                    tx.reset_for_retry();
                    self.shared.callbacks.fire_begin();
                }
            }
        };

        handle.exit();
        self.shared.callbacks.fire_thread_exit();
        outcome
    }
}
