//! Key-value ledger abstraction.
//!
//! The record store only needs four primitives from its host: point get,
//! point put, point delete and a prefix range scan. A ledger may additionally
//! offer an atomic [`Ledger::compare_and_swap`]; the default implementation is
//! a plain read followed by a write and is only as atomic as the host makes a
//! single invocation.
//!
//! Two ledgers ship with the crate:
//! - [`MemoryLedger`] for embedded use and tests
//! - `FileLedger` (feature `persistent`) for a durable single-process ledger

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;

mod memory;
#[cfg(feature = "persistent")]
pub mod persistent;

pub use memory::MemoryLedger;
#[cfg(feature = "persistent")]
pub use persistent::{FileLedger, LedgerConfig};

/// Errors raised by a ledger backend.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// I/O failure in the backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend-specific failure (including host commit conflicts).
    #[error("backend error: {0}")]
    Backend(String),

    /// An internal lock was poisoned by a panicking writer.
    #[error("poisoned lock: {0}")]
    PoisonedLock(&'static str),
}

/// A single ledger entry yielded by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    /// Raw key bytes.
    pub key: Vec<u8>,
    /// Raw value bytes.
    pub value: Vec<u8>,
}

/// Cursor over the result of a prefix scan.
///
/// A cursor may pin ledger-side resources. [`LedgerCursor::close`] releases
/// them and must be idempotent; implementations also release on drop.
pub trait LedgerCursor: Iterator<Item = Result<KeyValue, LedgerError>> {
    /// Releases the cursor. Subsequent calls to `next` return `None`.
    fn close(&mut self);
}

/// The host ledger primitives.
pub trait Ledger: Send + Sync {
    /// Reads the value stored under `key`.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, LedgerError>;

    /// Writes `value` under `key`, overwriting any previous value.
    fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), LedgerError>;

    /// Removes `key`. Deleting a missing key is not an error.
    fn delete(&self, key: &[u8]) -> Result<(), LedgerError>;

    /// Opens a cursor over every entry whose key starts with `prefix`, in
    /// ascending key order.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Box<dyn LedgerCursor + '_>, LedgerError>;

    /// Writes `value` under `key` only if the current value equals
    /// `expected` (`None` meaning absent). Returns whether the write happened.
    fn compare_and_swap(
        &self,
        key: &[u8],
        expected: Option<&[u8]>,
        value: Vec<u8>,
    ) -> Result<bool, LedgerError> {
        let current = self.get(key)?;
        if current.as_deref() != expected {
            return Ok(false);
        }
        self.put(key, value)?;
        Ok(true)
    }
}

/// Tracks how many cursors a ledger currently has open.
#[derive(Debug, Default, Clone)]
pub(crate) struct CursorTracker(Arc<AtomicUsize>);

impl CursorTracker {
    pub(crate) fn open(&self) -> CursorGuard {
        self.0.fetch_add(1, Ordering::SeqCst);
        CursorGuard(Arc::clone(&self.0))
    }

    pub(crate) fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Decrements the open-cursor count when dropped.
#[derive(Debug)]
pub(crate) struct CursorGuard(Arc<AtomicUsize>);

impl Drop for CursorGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Cursor over a materialized snapshot of matching entries.
///
/// Used by the bundled ledgers: the scan copies the matching range while
/// holding the read lock, so writers are never blocked by a slow consumer.
#[derive(Debug)]
pub(crate) struct SnapshotCursor {
    entries: std::vec::IntoIter<KeyValue>,
    guard: Option<CursorGuard>,
}

impl SnapshotCursor {
    pub(crate) fn new(entries: Vec<KeyValue>, guard: CursorGuard) -> Self {
        Self {
            entries: entries.into_iter(),
            guard: Some(guard),
        }
    }
}

impl Iterator for SnapshotCursor {
    type Item = Result<KeyValue, LedgerError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.guard.as_ref()?;
        self.entries.next().map(Ok)
    }
}

impl LedgerCursor for SnapshotCursor {
    fn close(&mut self) {
        self.guard = None;
        self.entries = Vec::new().into_iter();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time test: ensure traits are object-safe
    fn _assert_ledger_object_safe(_: &dyn Ledger) {}
    fn _assert_cursor_object_safe(_: &dyn LedgerCursor) {}

    #[test]
    fn test_snapshot_cursor_close_releases_guard() {
        let tracker = CursorTracker::default();
        let mut cursor = SnapshotCursor::new(
            vec![KeyValue {
                key: b"k".to_vec(),
                value: b"v".to_vec(),
            }],
            tracker.open(),
        );
        assert_eq!(tracker.count(), 1);

        cursor.close();
        assert_eq!(tracker.count(), 0);
        assert!(cursor.next().is_none());

        // Idempotent.
        cursor.close();
        assert_eq!(tracker.count(), 0);
    }

    #[test]
    fn test_snapshot_cursor_drop_releases_guard() {
        let tracker = CursorTracker::default();
        {
            let _cursor = SnapshotCursor::new(Vec::new(), tracker.open());
            assert_eq!(tracker.count(), 1);
        }
        assert_eq!(tracker.count(), 0);
    }

    #[test]
    fn test_ledger_error_display() {
        let err = LedgerError::Backend("connection refused".to_string());
        assert!(err.to_string().contains("connection refused"));
        let err = LedgerError::PoisonedLock("memory.put");
        assert!(err.to_string().contains("memory.put"));
    }
}
