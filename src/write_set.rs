// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! A transaction's write set: the buffered stores it intends to publish at commit,
//! plus the bookkeeping the acquire phase needs to release exactly what it locked.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use crate::bloom::WriteSetBloom;

/// One buffered write: the cell written, the lock table slot it hashes to, the word
/// to publish, and the acquire-phase bookkeeping needed to release (or roll back)
/// exactly what this entry locked.
pub struct WriteEntry {
    pub addr: usize,
    pub lock_index: usize,
    pub value: u64,

    /// Which bits of `value` are actually meant to be published. `u64::MAX` for a
    /// full-word write (the only kind the typed [`crate::TVar`] API produces); a
    /// narrower mask supports sub-word stores merged via `(old & !mask) | (value &
    /// mask)` at publish time.
    pub mask: u64,

    word: Arc<AtomicU64>,

    /// The lock word's version at the moment this entry was first buffered (before
    /// any acquisition attempt). Restored on rollback if acquisition never reached
    /// this entry.
    pub prior_version: usize,

    /// The version this entry's stripe carried the instant it was actually acquired
    /// (`None` until the acquire phase reaches it). Read-set entries that alias this
    /// stripe validate against this value rather than the live lock word, since the
    /// live word now encodes ownership, not a version.
    pub captured_version: Option<usize>,

    /// `true` only once this entry's own compare-exchange against the lock table has
    /// succeeded. Starts `false` at buffering time and stays `false` for an entry
    /// whose slot coalesces into an earlier entry this same transaction already owns
    /// — such an entry never separately owns the lock and must not be released on
    /// its own. Rollback and the release phase both consult this flag, not just
    /// "was this entry written to".
    pub drop: bool,
}

impl WriteEntry {
    fn new(addr: usize, lock_index: usize, value: u64, mask: u64, word: Arc<AtomicU64>, prior_version: usize) -> Self {
        Self { addr, lock_index, value, mask, word, prior_version, captured_version: None, drop: false }
    }

    /// Publishes this entry's value into its backing cell under the held lock.
    pub fn publish(&self) {
        if self.mask == u64::MAX {
            self.word.store(self.value, std::sync::atomic::Ordering::Release);
        } else {
            let old = self.word.load(std::sync::atomic::Ordering::Relaxed);
            let merged = (old & !self.mask) | (self.value & self.mask);
            self.word.store(merged, std::sync::atomic::Ordering::Release);
        }
    }
}

/// The set of buffered writes for one transaction. Lookups by address are
/// bloom-accelerated: a negative from the filter skips the linear scan entirely.
#[derive(Default)]
pub struct WriteSet {
    entries: Vec<WriteEntry>,
    bloom: WriteSetBloom,
}

impl WriteSet {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { entries: Vec::with_capacity(capacity), bloom: WriteSetBloom::new() }
    }

    /// Finds the most recent buffered write to `addr`, if any (read-your-writes).
    pub fn find(&self, addr: usize) -> Option<&WriteEntry> {
        if !self.bloom.maybe_contains(addr) {
            return None;
        }
        self.entries.iter().rev().find(|e| e.addr == addr)
    }

    fn find_mut(&mut self, addr: usize) -> Option<&mut WriteEntry> {
        if !self.bloom.maybe_contains(addr) {
            return None;
        }
        self.entries.iter_mut().rev().find(|e| e.addr == addr)
    }

    /// Buffers a write, merging into a prior buffered write to the same address in
    /// place so only one entry per address ever survives to publish:
    /// `entry.value = (entry.value & !mask) | (value & mask); entry.mask |= mask`.
    pub fn insert(
        &mut self,
        addr: usize,
        lock_index: usize,
        value: u64,
        mask: u64,
        word: Arc<AtomicU64>,
        prior_version: usize,
    ) {
        if let Some(existing) = self.find_mut(addr) {
            existing.value = (existing.value & !mask) | (value & mask);
            existing.mask |= mask;
            return;
        }
        self.bloom.insert(addr);
        self.entries.push(WriteEntry::new(addr, lock_index, value, mask, word, prior_version));
    }

    pub fn iter(&self) -> impl Iterator<Item = &WriteEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.bloom.clear();
    }

    pub fn entry(&self, index: usize) -> &WriteEntry {
        &self.entries[index]
    }

    pub fn entry_mut(&mut self, index: usize) -> &mut WriteEntry {
        &mut self.entries[index]
    }

    /// The address of the acquire phase's owner-pointer for `entries[index]`, stable
    /// as long as the write set is not mutated (true throughout commit).
    pub fn entry_ptr(&self, index: usize) -> usize {
        &self.entries[index] as *const WriteEntry as usize
    }

    /// Looks up the entry `ptr` points at, if it is one of ours and has acquired its
    /// lock. Used both to recognize a coalesced acquisition and to validate a
    /// read-set entry that aliases a stripe this transaction itself now owns.
    pub fn entry_at_ptr(&self, ptr: usize) -> Option<&WriteEntry> {
        self.entries.iter().find(|e| e.drop && (*e as *const WriteEntry as usize) == ptr)
    }

    /// Iterates entries in reverse index order, the order the acquire phase and
    /// rollback both walk the write set in.
    pub fn rev_indices(&self) -> impl Iterator<Item = usize> {
        (0..self.entries.len()).rev()
    }
}
