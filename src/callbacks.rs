// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Lifecycle callback registration.
//!
//! Each hook below may carry up to [`crate::config::MAX_CALLBACKS`] registered
//! closures, matching the reference algorithm's fixed-size callback tables.

use crate::config::MAX_CALLBACKS;
use crate::sync::Mutex;

type Callback = Box<dyn Fn() + Send + Sync>;
type AbortCallback = Box<dyn Fn(crate::AbortReason) + Send + Sync>;

struct Hook<F> {
    slots: Mutex<Vec<F>>,
}

impl<F> Default for Hook<F> {
    fn default() -> Self {
        Self { slots: Mutex::new(Vec::new()) }
    }
}

impl<F> Hook<F> {
    fn register(&self, f: F) {
        let mut slots = self.slots.lock().expect("callback registry mutex poisoned");
        assert!(
            slots.len() < MAX_CALLBACKS,
            "at most {MAX_CALLBACKS} callbacks may be registered per hook"
        );
        slots.push(f);
    }
}

impl Hook<Callback> {
    fn fire(&self) {
        let slots = self.slots.lock().expect("callback registry mutex poisoned");
        for f in slots.iter() {
            f();
        }
    }
}

impl Hook<AbortCallback> {
    fn fire(&self, reason: crate::AbortReason) {
        let slots = self.slots.lock().expect("callback registry mutex poisoned");
        for f in slots.iter() {
            f(reason);
        }
    }
}

/// Registry of lifecycle callbacks for one [`crate::Stm`] instance: thread
/// init/exit, and per-transaction begin/precommit/commit/abort.
///
/// `on_thread_init`/`on_thread_exit` bracket one call to [`crate::Stm::read_write`]
/// or [`crate::Stm::read_only`] (i.e. one top-level transaction registration), not
/// necessarily one OS thread's full lifetime — a thread that calls `read_write` in a
/// loop fires them on every call.
#[derive(Default)]
pub struct CallbackRegistry {
    on_thread_init: Hook<Callback>,
    on_thread_exit: Hook<Callback>,
    on_begin: Hook<Callback>,
    on_precommit: Hook<Callback>,
    on_commit: Hook<Callback>,
    on_abort: Hook<AbortCallback>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_thread_init(&self, f: impl Fn() + Send + Sync + 'static) {
        self.on_thread_init.register(Box::new(f));
    }

    pub fn register_thread_exit(&self, f: impl Fn() + Send + Sync + 'static) {
        self.on_thread_exit.register(Box::new(f));
    }

    pub fn register_begin(&self, f: impl Fn() + Send + Sync + 'static) {
        self.on_begin.register(Box::new(f));
    }

    pub fn register_precommit(&self, f: impl Fn() + Send + Sync + 'static) {
        self.on_precommit.register(Box::new(f));
    }

    pub fn register_commit(&self, f: impl Fn() + Send + Sync + 'static) {
        self.on_commit.register(Box::new(f));
    }

    pub fn register_abort(&self, f: impl Fn(crate::AbortReason) + Send + Sync + 'static) {
        self.on_abort.register(Box::new(f));
    }

    pub(crate) fn fire_thread_init(&self) {
        self.on_thread_init.fire();
    }

    pub(crate) fn fire_thread_exit(&self) {
        self.on_thread_exit.fire();
    }

    pub(crate) fn fire_begin(&self) {
        self.on_begin.fire();
    }

    pub(crate) fn fire_precommit(&self) {
        self.on_precommit.fire();
    }

    pub(crate) fn fire_commit(&self) {
        self.on_commit.fire();
    }

    pub(crate) fn fire_abort(&self, reason: crate::AbortReason) {
        self.on_abort.fire(reason);
    }
}
