// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Contention management: the policy that decides what happens when a transaction
//! finds a lock table slot it wants already owned by another transaction.

/// What a [`ContentionManager`] decides to do about a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictAction {
    /// Abort the transaction asking for the decision.
    AbortSelf,
    /// Spin and retry the same acquisition attempt.
    Retry,
}

/// A pluggable conflict resolution policy, consulted whenever a transaction's
/// acquire or validation path meets a stripe owned by someone else.
///
/// The only implementation shipped is [`SuicideCm`], matching the reference
/// algorithm's default: a transaction that meets contention always aborts itself,
/// never the lock's current owner. The trait exists so a caller could plug in a
/// different policy without touching [`crate::Transaction`].
pub trait ContentionManager: Send + Sync {
    fn on_conflict(&self, own_priority: u64, owner_priority: u64) -> ConflictAction;
}

/// The suicide contention manager: always aborts the asking transaction. Priorities
/// are accepted for interface symmetry with other policies but otherwise ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct SuicideCm;

impl ContentionManager for SuicideCm {
    fn on_conflict(&self, _own_priority: u64, _owner_priority: u64) -> ConflictAction {
        ConflictAction::AbortSelf
    }
}
