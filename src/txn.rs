// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The transaction descriptor: snapshot range, read/write sets, and the
//! load/store/validate/commit/rollback algorithm that drives one attempt of a
//! transactional closure.

use std::sync::atomic::Ordering;

use crate::abort::AbortReason;
use crate::contention::ConflictAction;
use crate::engine::Shared;
use crate::lock::{is_owned, owner_ptr, pack_owned, pack_version, version, LockWord, LOCK_UNIT};
use crate::read_set::ReadSet;
use crate::tvar::TCell;
use crate::write_set::WriteSet;

/// One attempt at running a transactional closure. A fresh `Transaction` is created
/// for every retry; nothing about a failed attempt survives into the next one except
/// the caller's retry count (tracked by [`crate::Stm::read_write`]).
///
/// Flat nesting falls out of the closure-based API for free: the only `begin`/`commit`
/// pair for an attempt is the one [`crate::Stm::read_write`] drives, so helper
/// functions that take `&mut Transaction` already compose into the same attempt
/// without a separate depth-tracked entry point.
pub struct Transaction<'s> {
    shared: &'s Shared,

    start: usize,
    end: usize,
    can_extend: bool,
    read_only: bool,

    read_set: ReadSet,
    write_set: WriteSet,
}

impl<'s> Transaction<'s> {
    pub(crate) fn begin(shared: &'s Shared, read_only: bool, can_extend: bool) -> Self {
        let now = shared.clock.load();
        Self {
            shared,
            start: now,
            end: now,
            can_extend,
            read_only,
            read_set: ReadSet::with_capacity(shared.config.read_write_set_capacity),
            write_set: WriteSet::with_capacity(shared.config.read_write_set_capacity),
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Aborts the transaction body explicitly; not retried by the driving loop.
    pub fn abort(&self) -> AbortReason {
        AbortReason::Explicit
    }

    pub(crate) fn read_set_len(&self) -> usize {
        self.read_set.len()
    }

    pub(crate) fn write_set_len(&self) -> usize {
        self.write_set.len()
    }

    // ---- read path (4.3) ----------------------------------------------------

    pub fn load(&mut self, cell: &TCell) -> Result<u64, AbortReason> {
        let addr = cell.addr();

        if let Some(entry) = self.write_set.find(addr) {
            if entry.mask == u64::MAX {
                return Ok(entry.value);
            }
            let mask = entry.mask;
            let buffered = entry.value;
            let lock_index = self.shared.lock_table.index_of(addr);
            return self.read_through_lock(cell, lock_index, |raw| (raw & !mask) | (buffered & mask));
        }

        let lock_index = self.shared.lock_table.index_of(addr);
        self.read_through_lock(cell, lock_index, |raw| raw)
    }

    /// Implements the lock-value-lock idiom: read the lock, read the value, reread
    /// the lock, and retry unless both lock reads agree the value is consistent.
    fn read_through_lock(
        &mut self,
        cell: &TCell,
        lock_index: usize,
        combine: impl Fn(u64) -> u64,
    ) -> Result<u64, AbortReason> {
        let lock = self.shared.lock_table.slot(lock_index);
        let mut w1 = self.wait_unowned(lock)?;
        loop {
            let raw = cell.raw_load();
            let w2 = lock.load();
            if w1 != w2 {
                w1 = self.wait_unowned_from(lock, w2)?;
                continue;
            }
            self.observe_read(lock_index, w1)?;
            return Ok(combine(raw));
        }
    }

    fn observe_read(&mut self, lock_index: usize, w: usize) -> Result<(), AbortReason> {
        debug_assert!(!is_owned(w));
        let v = version(w);
        if v > self.end {
            if !self.can_extend || self.read_only {
                return Err(AbortReason::ValRead);
            }
            self.try_extend()?;
            let after = self.shared.lock_table.slot(lock_index).load();
            if after != w {
                return Err(AbortReason::ValRead);
            }
        }
        if !self.read_only {
            self.read_set.push(lock_index, v);
        }
        Ok(())
    }

    fn wait_unowned(&self, lock: &LockWord) -> Result<usize, AbortReason> {
        self.wait_unowned_from(lock, lock.load())
    }

    /// Consults the contention manager on every owned observation: `AbortSelf` kills
    /// the wait outright, `Retry` keeps spinning up to `spin_cap` iterations before
    /// giving up with the same reason. The suicide policy always answers `AbortSelf`,
    /// so under the default configuration this never actually spins.
    fn wait_unowned_from(&self, lock: &LockWord, mut w: usize) -> Result<usize, AbortReason> {
        let mut spins = 0u32;
        while is_owned(w) {
            match self.shared.contention.on_conflict(self.start as u64, w as u64) {
                ConflictAction::AbortSelf => return Err(AbortReason::Killed),
                ConflictAction::Retry => {}
            }
            spins += 1;
            if spins > self.shared.config.spin_cap {
                return Err(AbortReason::Killed);
            }
            std::hint::spin_loop();
            w = lock.load();
        }
        Ok(w)
    }

    // ---- snapshot extension (4.4) --------------------------------------------

    fn try_extend(&mut self) -> Result<(), AbortReason> {
        let now = self.shared.clock.load();
        if now >= self.shared.config.version_max() {
            return Err(AbortReason::ValRead);
        }
        if !self.validate() {
            return Err(AbortReason::ValRead);
        }
        self.end = now;
        Ok(())
    }

    // ---- write path (4.5) -----------------------------------------------------

    pub fn store(&mut self, cell: &TCell, value: u64) -> Result<(), AbortReason> {
        self.store_masked(cell, value, u64::MAX)
    }

    pub fn store_masked(&mut self, cell: &TCell, value: u64, mask: u64) -> Result<(), AbortReason> {
        if self.read_only {
            return Err(AbortReason::RoWrite);
        }

        let addr = cell.addr();
        let lock_index = self.shared.lock_table.index_of(addr);
        let lock = self.shared.lock_table.slot(lock_index);
        let w = self.wait_unowned(lock)?;

        if self.write_set.find(addr).is_some() {
            self.write_set.insert(addr, lock_index, value, mask, cell.word_arc(), version(w));
            return Ok(());
        }

        let v = version(w);
        if v > self.end {
            let already_read = self.read_set.iter().any(|e| e.lock_index == lock_index);
            if !self.can_extend || already_read {
                return Err(AbortReason::ValWrite);
            }
            self.try_extend()?;
        }

        self.write_set.insert(addr, lock_index, value, mask, cell.word_arc(), v);
        Ok(())
    }

    // ---- validation (4.7) ------------------------------------------------------

    fn validate(&self) -> bool {
        for entry in self.read_set.iter() {
            let lock = self.shared.lock_table.slot(entry.lock_index);
            let w = lock.load();
            if is_owned(w) {
                match self.write_set.entry_at_ptr(owner_ptr(w)) {
                    Some(owned) if owned.captured_version == Some(entry.version) => continue,
                    _ => return false,
                }
            } else if version(w) != entry.version {
                return false;
            }
        }
        true
    }

    // ---- commit protocol (4.6) -------------------------------------------------

    /// Runs the commit protocol. On success every buffered write is visible to
    /// subsequently-starting transactions; on failure, any locks this attempt
    /// acquired have already been released before returning.
    pub(crate) fn commit(&mut self) -> Result<(), AbortReason> {
        if self.write_set.is_empty() {
            return Ok(());
        }

        if let Err(reason) = self.acquire() {
            self.release_acquired();
            return Err(reason);
        }
        self.shared.callbacks.fire_precommit();

        let prev = self.shared.clock.fetch_increment();
        let t = prev + 1;

        if self.start != prev && !self.validate() {
            self.release_acquired();
            return Err(AbortReason::Validate);
        }

        for entry in self.write_set.iter() {
            entry.publish();
        }
        for idx in 0..self.write_set.len() {
            if self.write_set.entry(idx).drop {
                let lock_index = self.write_set.entry(idx).lock_index;
                self.shared.lock_table.slot(lock_index).release_store(pack_version(t));
            }
        }

        Ok(())
    }

    /// Acquire phase: walk the write set in reverse, taking each stripe's lock via
    /// CAS. A stripe already owned by an earlier entry of this same write set
    /// (two addresses sharing one stripe) coalesces instead of re-acquiring.
    fn acquire(&mut self) -> Result<(), AbortReason> {
        for idx in self.write_set.rev_indices() {
            loop {
                let lock_index = self.write_set.entry(idx).lock_index;
                let lock = self.shared.lock_table.slot(lock_index);
                let w = lock.load();

                if is_owned(w) {
                    let ptr = owner_ptr(w);
                    if let Some(owner) = self.write_set.entry_at_ptr(ptr) {
                        let captured = owner.captured_version;
                        let entry = self.write_set.entry_mut(idx);
                        entry.captured_version = captured;
                        entry.drop = false;
                        break;
                    }
                    if w == LOCK_UNIT {
                        // Unit-store fast path is out of scope, so no code in this
                        // crate ever produces this word; kept so a conflict against
                        // it is excluded from the contention manager's accounting
                        // rather than silently treated like an ordinary conflict.
                        return Err(AbortReason::WwConflict);
                    }
                    match self.shared.contention.on_conflict(self.start as u64, w as u64) {
                        ConflictAction::AbortSelf => return Err(AbortReason::WwConflict),
                        ConflictAction::Retry => {
                            std::hint::spin_loop();
                            continue;
                        }
                    }
                }

                let desired = pack_owned(self.write_set.entry_ptr(idx));
                match lock.compare_exchange(w, desired) {
                    Ok(_) => {
                        let entry = self.write_set.entry_mut(idx);
                        entry.captured_version = Some(version(w));
                        entry.drop = true;
                        break;
                    }
                    Err(_) => continue,
                }
            }
        }
        Ok(())
    }

    /// Releases every lock this attempt actually acquired, restoring the version it
    /// captured at acquisition time. Used both when the acquire phase itself fails
    /// partway through and when post-acquisition revalidation fails.
    fn release_acquired(&mut self) {
        for idx in 0..self.write_set.len() {
            let entry = self.write_set.entry(idx);
            if entry.drop {
                let lock_index = entry.lock_index;
                let captured = entry.captured_version.expect("acquired entry always captures a version");
                self.shared.lock_table.slot(lock_index).release_store(pack_version(captured));
            }
        }
    }

    // ---- rollback (4.8) ---------------------------------------------------------

    /// Resets this attempt's buffered state after a non-commit abort (every reason
    /// except a successful [`Transaction::commit`] that nonetheless failed its own
    /// internal acquire/validate step, which releases locks itself). No lock was
    /// ever taken by the read/write path alone, since CTL acquires only at commit.
    pub(crate) fn reset_for_retry(&mut self) {
        self.read_set.clear();
        self.write_set.clear();
        self.start = self.shared.clock.load();
        self.end = self.start;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::contention::SuicideCm;
    use crate::tvar::TVar;

    fn shared() -> Shared {
        Shared::new(Config { lock_array_size: 64, lock_shift: 3, ..Config::default() }, Box::new(SuicideCm))
    }

    #[test]
    fn single_threaded_write_then_commit_is_visible() {
        let shared = shared();
        let counter = TVar::new(0u64);

        let mut tx = Transaction::begin(&shared, false, true);
        let v = tx.load(counter.cell()).unwrap();
        tx.store(counter.cell(), v + 1).unwrap();
        tx.commit().unwrap();

        assert_eq!(counter.cell().raw_load(), 1);
    }

    #[test]
    fn read_only_transaction_rejects_writes() {
        let shared = shared();
        let counter = TVar::new(0u64);
        let mut tx = Transaction::begin(&shared, true, true);
        let err = tx.store(counter.cell(), 5).unwrap_err();
        assert_eq!(err, AbortReason::RoWrite);
    }

    #[test]
    fn a_transaction_reads_its_own_buffered_write() {
        let shared = shared();
        let counter = TVar::new(0u64);
        let mut tx = Transaction::begin(&shared, false, true);
        tx.store(counter.cell(), 42).unwrap();
        assert_eq!(tx.load(counter.cell()).unwrap(), 42);
        // the underlying cell is untouched until commit
        assert_eq!(counter.cell().raw_load(), 0);
    }

    #[test]
    fn concurrent_writer_between_acquire_and_commit_forces_validation_failure() {
        let shared = shared();
        let a = TVar::new(1u64);
        let b = TVar::new(1u64);

        let mut reader = Transaction::begin(&shared, false, true);
        let _ = reader.load(a.cell()).unwrap();

        // a different transaction commits a write to `b`, advancing the clock past
        // the reader's snapshot without touching anything the reader has read
        let mut writer = Transaction::begin(&shared, false, true);
        writer.store(b.cell(), 2).unwrap();
        writer.commit().unwrap();

        reader.store(a.cell(), 9).unwrap();
        assert!(reader.commit().is_ok());
    }

    #[test]
    fn acquire_phase_aborts_when_a_stripe_is_owned_by_a_stranger() {
        let shared = shared();
        let x = TVar::new(0u64);
        let mut tx = Transaction::begin(&shared, false, true);
        tx.store(x.cell(), 1).unwrap();

        // simulate a concurrent committer already owning this stripe
        let lock_index = shared.lock_table.index_of(x.cell().addr());
        shared.lock_table.slot(lock_index).release_store(crate::lock::pack_owned(0x1000));

        let err = tx.commit().unwrap_err();
        assert_eq!(err, AbortReason::WwConflict);
    }
}
