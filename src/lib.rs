// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! # Word-granularity software transactional memory
//!
//! A commit-time-locking (CTL), write-back STM: speculative reads and writes are
//! buffered against a private snapshot of the global version clock, validated with a
//! TL2-style lock-value-lock read path, and published only once a transaction commits.
//! Conflicting transactions abort themselves (the suicide contention policy) and are
//! transparently retried.
//!
//! ```
//! use stronghold_tl2::Stm;
//!
//! let stm = Stm::new();
//! let balance = stm.create(100u64);
//!
//! let b = balance.clone();
//! stm.read_write(move |tx| {
//!     let v = tx.load(b.cell())?;
//!     tx.store(b.cell(), v - 10)?;
//!     Ok(())
//! })
//! .unwrap();
//!
//! let b = balance.clone();
//! let seen = stm.read_only(move |tx| tx.load(b.cell())).unwrap();
//! assert_eq!(seen, 90);
//! ```

pub mod abort;
pub mod bloom;
pub mod callbacks;
pub mod clock;
pub mod config;
pub mod contention;
pub mod engine;
pub mod lock;
pub mod lock_table;
pub mod read_set;
pub mod registry;
pub mod stats;
mod sync;
pub mod tvar;
pub mod txn;
pub mod write_set;

pub use abort::AbortReason;
pub use config::Config;
pub use contention::{ConflictAction, ContentionManager, SuicideCm};
pub use engine::{Stm, TxAttrs};
pub use stats::StatsSnapshot;
pub use tvar::{TCell, TVar};
pub use txn::Transaction;
