//! In-memory ledger.
//!
//! Thread-safe ordered map behind an `RwLock`. Intended for embedded usage,
//! tests, and as a reference implementation of the [`Ledger`] contract.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;

use super::{CursorTracker, KeyValue, Ledger, LedgerCursor, LedgerError, SnapshotCursor};

/// Thread-safe in-memory ledger.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    cursors: CursorTracker,
}

impl MemoryLedger {
    /// Create a new empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a ledger pre-populated with `entries`.
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = (Vec<u8>, Vec<u8>)>) -> Self {
        Self {
            entries: RwLock::new(entries.into_iter().collect()),
            cursors: CursorTracker::default(),
        }
    }

    /// Number of stored entries.
    ///
    /// # Errors
    /// Returns [`LedgerError::PoisonedLock`] if a writer panicked.
    pub fn len(&self) -> Result<usize, LedgerError> {
        Ok(self
            .entries
            .read()
            .map_err(|_| LedgerError::PoisonedLock("memory.len"))?
            .len())
    }

    /// Returns true if nothing is stored.
    ///
    /// # Errors
    /// Returns [`LedgerError::PoisonedLock`] if a writer panicked.
    pub fn is_empty(&self) -> Result<bool, LedgerError> {
        Ok(self.len()? == 0)
    }

    /// Number of scan cursors that have not been closed or dropped yet.
    #[must_use]
    pub fn open_cursors(&self) -> usize {
        self.cursors.count()
    }
}

/// Entries whose key starts with `prefix`, in key order.
pub(crate) fn collect_prefix(map: &BTreeMap<Vec<u8>, Vec<u8>>, prefix: &[u8]) -> Vec<KeyValue> {
    map.range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
        .take_while(|(k, _)| k.starts_with(prefix))
        .map(|(k, v)| KeyValue {
            key: k.clone(),
            value: v.clone(),
        })
        .collect()
}

impl Ledger for MemoryLedger {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, LedgerError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| LedgerError::PoisonedLock("memory.get"))?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), LedgerError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| LedgerError::PoisonedLock("memory.put"))?;
        entries.insert(key.to_vec(), value);
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), LedgerError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| LedgerError::PoisonedLock("memory.delete"))?;
        entries.remove(key);
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Box<dyn LedgerCursor + '_>, LedgerError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| LedgerError::PoisonedLock("memory.scan"))?;
        let matched = collect_prefix(&entries, prefix);
        Ok(Box::new(SnapshotCursor::new(matched, self.cursors.open())))
    }

    fn compare_and_swap(
        &self,
        key: &[u8],
        expected: Option<&[u8]>,
        value: Vec<u8>,
    ) -> Result<bool, LedgerError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| LedgerError::PoisonedLock("memory.compare_and_swap"))?;
        if entries.get(key).map(Vec::as_slice) != expected {
            return Ok(false);
        }
        entries.insert(key.to_vec(), value);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_put_delete() {
        let ledger = MemoryLedger::new();
        assert_eq!(ledger.get(b"a").unwrap(), None);

        ledger.put(b"a", b"1".to_vec()).unwrap();
        assert_eq!(ledger.get(b"a").unwrap(), Some(b"1".to_vec()));

        ledger.put(b"a", b"2".to_vec()).unwrap();
        assert_eq!(ledger.get(b"a").unwrap(), Some(b"2".to_vec()));

        ledger.delete(b"a").unwrap();
        assert_eq!(ledger.get(b"a").unwrap(), None);

        // Deleting a missing key is fine.
        ledger.delete(b"a").unwrap();
        assert!(ledger.is_empty().unwrap());
    }

    #[test]
    fn test_scan_prefix_is_ordered_and_bounded() {
        let ledger = MemoryLedger::new();
        ledger.put(b"ab2", b"x".to_vec()).unwrap();
        ledger.put(b"ab1", b"y".to_vec()).unwrap();
        ledger.put(b"ac", b"z".to_vec()).unwrap();
        ledger.put(b"a", b"w".to_vec()).unwrap();

        let keys: Vec<Vec<u8>> = ledger
            .scan_prefix(b"ab")
            .unwrap()
            .map(|kv| kv.unwrap().key)
            .collect();
        assert_eq!(keys, vec![b"ab1".to_vec(), b"ab2".to_vec()]);
        assert_eq!(ledger.open_cursors(), 0);
    }

    #[test]
    fn test_scan_is_a_snapshot() {
        let ledger = MemoryLedger::new();
        ledger.put(b"p1", b"x".to_vec()).unwrap();

        let mut cursor = ledger.scan_prefix(b"p").unwrap();
        ledger.put(b"p2", b"y".to_vec()).unwrap();

        assert!(cursor.next().is_some());
        assert!(cursor.next().is_none());
        assert_eq!(ledger.open_cursors(), 1);
        drop(cursor);
        assert_eq!(ledger.open_cursors(), 0);
    }

    #[test]
    fn test_compare_and_swap() {
        let ledger = MemoryLedger::new();
        assert!(ledger.compare_and_swap(b"k", None, b"1".to_vec()).unwrap());
        assert!(!ledger.compare_and_swap(b"k", None, b"2".to_vec()).unwrap());
        assert!(!ledger
            .compare_and_swap(b"k", Some(b"0"), b"2".to_vec())
            .unwrap());
        assert!(ledger
            .compare_and_swap(b"k", Some(b"1"), b"2".to_vec())
            .unwrap());
        assert_eq!(ledger.get(b"k").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn test_from_entries() {
        let ledger = MemoryLedger::from_entries(vec![(b"k".to_vec(), b"v".to_vec())]);
        assert_eq!(ledger.len().unwrap(), 1);
    }
}
