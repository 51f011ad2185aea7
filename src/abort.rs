// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Why a transaction aborted.

use thiserror::Error as DeriveError;

/// The reason a transaction did not commit. Every variant but [`AbortReason::Explicit`]
/// is recoverable: [`crate::Stm::read_write`] retries the closure from scratch on any
/// of them, same as the reference algorithm's `sigjmp`-based restart.
#[derive(DeriveError, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// A read-set revalidation found a slot whose version had moved, or found the
    /// slot owned by another transaction's write set.
    #[error("read-set validation failed")]
    ValRead,

    /// The acquire phase found a write-set slot already owned by a stranger.
    #[error("write-set acquisition failed")]
    ValWrite,

    /// A write-write conflict was detected and the contention manager chose to abort
    /// this transaction rather than wait for the owner.
    #[error("write-write conflict")]
    WwConflict,

    /// Post-acquisition validation of the read set failed after locks were taken.
    #[error("post-acquisition validation failed")]
    Validate,

    /// A read-only transaction observed a write to a location it had already read.
    #[error("read-only transaction observed a concurrent write")]
    RoWrite,

    /// The transaction body itself asked to abort (see `Transaction::abort`). Not
    /// retried automatically; the caller's `Result::Err` carries this variant back
    /// out of [`crate::Stm::read_write`].
    #[error("transaction aborted explicitly")]
    Explicit,

    /// The bounded spin on an owned lock (see [`crate::Config::spin_cap`]) ran out
    /// before the owner released it.
    #[error("aborted after exceeding the spin cap on a contended lock")]
    Killed,
}

impl AbortReason {
    /// Whether [`crate::Stm::read_write`] should transparently retry the closure.
    pub fn is_retryable(self) -> bool {
        !matches!(self, AbortReason::Explicit)
    }
}
