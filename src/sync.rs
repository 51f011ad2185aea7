// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Indirection over the `Mutex`/`MutexGuard` types actually in use, so the rest of the
//! crate can stay agnostic to whether deadlock detection is compiled in.

#[cfg(feature = "no_deadlocks")]
pub use no_deadlocks::{Mutex, MutexGuard};

#[cfg(not(feature = "no_deadlocks"))]
pub use std::sync::{Mutex, MutexGuard};

pub use std::sync::Arc;
