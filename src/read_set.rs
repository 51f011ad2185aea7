// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! A transaction's read set: the lock-table slots it has observed, paired with the
//! version each slot carried at the time of the read.

/// One read-set entry: a lock table index and the version observed there.
#[derive(Debug, Clone, Copy)]
pub struct ReadEntry {
    pub lock_index: usize,
    pub version: usize,
}

/// The ordered sequence of locations read by a transaction since its last
/// begin/extend point. Revalidated wholesale on every extension attempt.
#[derive(Default)]
pub struct ReadSet {
    entries: Vec<ReadEntry>,
}

impl ReadSet {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { entries: Vec::with_capacity(capacity) }
    }

    pub fn push(&mut self, lock_index: usize, version: usize) {
        self.entries.push(ReadEntry { lock_index, version });
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReadEntry> {
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
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_preserve_insertion_order() {
        let mut set = ReadSet::with_capacity(4);
        set.push(1, 10);
        set.push(2, 20);
        let collected: Vec<_> = set.iter().map(|e| (e.lock_index, e.version)).collect();
        assert_eq!(collected, vec![(1, 10), (2, 20)]);
    }

    #[test]
    fn clear_empties_the_set() {
        let mut set = ReadSet::with_capacity(1);
        set.push(1, 1);
        set.clear();
        assert!(set.is_empty());
    }
}
