//! Durable single-process ledger.
//!
//! Layout of a ledger directory:
//!
//! ```text
//! <dir>/
//! ├── LOCK          exclusive process lock
//! └── ledger.wal    append-only log of put/delete frames
//! ```
//!
//! This is a host for tests and the `rma-invoke` tool. Deployments supply
//! their own [`Ledger`] backed by the shared ledger.
//!
//! The whole key space is held in memory and rebuilt from the log on open.
//! Once the log outgrows both `compact_threshold_bytes` and twice its size
//! after the last compaction, it is rewritten as a snapshot holding one frame
//! per live key.

mod codec;
mod file_lock;
mod wal;

use file_lock::DirLock;
use wal::{LogOp, WriteAheadLog};

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use serde::Deserialize;

use super::memory::collect_prefix;
use super::{CursorTracker, Ledger, LedgerCursor, LedgerError, SnapshotCursor};

const WAL_FILE: &str = "ledger.wal";

/// Configuration for [`FileLedger`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Whether to fsync after every append (slower but safer).
    pub sync_on_write: bool,
    /// Minimum log size that triggers a compaction after a write.
    pub compact_threshold_bytes: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            sync_on_write: true,
            compact_threshold_bytes: 64 * 1024 * 1024, // 64 MB
        }
    }
}

impl LedgerConfig {
    const MIN_COMPACT_THRESHOLD: u64 = 4 * 1024; // avoids compacting on every write

    /// Checks the configured bounds.
    ///
    /// # Errors
    /// Returns [`LedgerError::Backend`] if the compaction threshold is below 4 KiB.
    pub fn validate(self) -> Result<Self, LedgerError> {
        if self.compact_threshold_bytes < Self::MIN_COMPACT_THRESHOLD {
            return Err(LedgerError::Backend(format!(
                "compact_threshold_bytes must be at least {} bytes (got {})",
                Self::MIN_COMPACT_THRESHOLD,
                self.compact_threshold_bytes
            )));
        }
        Ok(self)
    }
}

/// Directory-backed ledger.
#[derive(Debug)]
pub struct FileLedger {
    dir: PathBuf,
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    wal: Mutex<WriteAheadLog>,
    cursors: CursorTracker,
    config: LedgerConfig,
    _lock: DirLock,
}

impl FileLedger {
    /// Opens or creates a ledger in `dir`.
    ///
    /// # Errors
    /// - the directory cannot be created
    /// - another process holds the lock
    /// - the log header is invalid
    pub fn open(dir: impl AsRef<Path>, config: Option<LedgerConfig>) -> Result<Self, LedgerError> {
        let config = config.unwrap_or_default().validate()?;
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let lock = DirLock::acquire(dir)?;

        let (wal, replay) = WriteAheadLog::open(&dir.join(WAL_FILE), config.sync_on_write)?;
        let mut entries = BTreeMap::new();
        for record in &replay.records {
            match &record.op {
                LogOp::Put { key, value } => {
                    entries.insert(key.clone(), value.clone());
                }
                LogOp::Delete { key } => {
                    entries.remove(key);
                }
            }
        }

        tracing::info!(
            dir = %dir.display(),
            replayed = replay.records.len(),
            discarded_bytes = replay.discarded_bytes,
            keys = entries.len(),
            "opened file ledger"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            entries: RwLock::new(entries),
            wal: Mutex::new(wal),
            cursors: CursorTracker::default(),
            config,
            _lock: lock,
        })
    }

    /// Directory this ledger lives in.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of scan cursors still open.
    #[must_use]
    pub fn open_cursors(&self) -> usize {
        self.cursors.count()
    }

    /// Rewrites the log as a snapshot of the live keys.
    ///
    /// # Errors
    /// Returns an I/O error if the snapshot cannot be written; the previous
    /// log stays in place.
    pub fn compact(&self) -> Result<(), LedgerError> {
        let entries = self
            .entries
            .write()
            .map_err(|_| LedgerError::PoisonedLock("file.compact"))?;
        let mut wal = self
            .wal
            .lock()
            .map_err(|_| LedgerError::PoisonedLock("file.wal"))?;
        let before = wal.size_bytes()?;
        wal.rewrite(entries.iter())?;
        tracing::info!(
            before_bytes = before,
            after_bytes = wal.size_bytes()?,
            keys = entries.len(),
            generation = wal.generation(),
            "compacted ledger log"
        );
        Ok(())
    }

    /// Appends `op` and applies it to `entries`. Caller holds the entries
    /// write lock so log order matches apply order.
    ///
    /// Once the append succeeded the write is committed; a failed compaction
    /// afterwards is logged and left for the next write.
    fn log_and_apply(
        &self,
        entries: &mut BTreeMap<Vec<u8>, Vec<u8>>,
        op: LogOp,
    ) -> Result<(), LedgerError> {
        let mut wal = self
            .wal
            .lock()
            .map_err(|_| LedgerError::PoisonedLock("file.wal"))?;
        wal.append(op.clone())?;
        match op {
            LogOp::Put { key, value } => {
                entries.insert(key, value);
            }
            LogOp::Delete { key } => {
                entries.remove(&key);
            }
        }

        let compacted = wal
            .needs_compaction(self.config.compact_threshold_bytes)
            .and_then(|due| {
                if due {
                    wal.rewrite(entries.iter())?;
                }
                Ok(due)
            });
        match compacted {
            Ok(true) => tracing::debug!(keys = entries.len(), "log exceeded threshold, compacted"),
            Ok(false) => {}
            Err(e) => tracing::warn!(error = %e, "log compaction failed, keeping current log"),
        }
        Ok(())
    }
}

impl Ledger for FileLedger {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, LedgerError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| LedgerError::PoisonedLock("file.get"))?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), LedgerError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| LedgerError::PoisonedLock("file.put"))?;
        self.log_and_apply(
            &mut entries,
            LogOp::Put {
                key: key.to_vec(),
                value,
            },
        )
    }

    fn delete(&self, key: &[u8]) -> Result<(), LedgerError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| LedgerError::PoisonedLock("file.delete"))?;
        if !entries.contains_key(key) {
            return Ok(());
        }
        self.log_and_apply(&mut entries, LogOp::Delete { key: key.to_vec() })
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Box<dyn LedgerCursor + '_>, LedgerError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| LedgerError::PoisonedLock("file.scan"))?;
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
            .map_err(|_| LedgerError::PoisonedLock("file.compare_and_swap"))?;
        if entries.get(key).map(Vec::as_slice) != expected {
            return Ok(false);
        }
        self.log_and_apply(
            &mut entries,
            LogOp::Put {
                key: key.to_vec(),
                value,
            },
        )?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fast() -> Option<LedgerConfig> {
        Some(LedgerConfig {
            sync_on_write: false,
            ..LedgerConfig::default()
        })
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let ledger = FileLedger::open(dir.path(), fast()).unwrap();
            ledger.put(b"a", b"1".to_vec()).unwrap();
            ledger.put(b"b", b"2".to_vec()).unwrap();
            ledger.delete(b"a").unwrap();
        }

        let ledger = FileLedger::open(dir.path(), fast()).unwrap();
        assert_eq!(ledger.get(b"a").unwrap(), None);
        assert_eq!(ledger.get(b"b").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn test_second_open_is_refused() {
        let dir = tempdir().unwrap();
        let _first = FileLedger::open(dir.path(), fast()).unwrap();
        let err = FileLedger::open(dir.path(), fast()).unwrap_err();
        assert!(matches!(err, LedgerError::Io(_)));
    }

    #[test]
    fn test_compact_keeps_live_keys() {
        let dir = tempdir().unwrap();
        {
            let ledger = FileLedger::open(dir.path(), fast()).unwrap();
            for i in 0..50u8 {
                ledger.put(b"hot", vec![i]).unwrap();
            }
            ledger.put(b"cold", b"x".to_vec()).unwrap();
            ledger.compact().unwrap();
        }

        let ledger = FileLedger::open(dir.path(), fast()).unwrap();
        assert_eq!(ledger.get(b"hot").unwrap(), Some(vec![49]));
        assert_eq!(ledger.get(b"cold").unwrap(), Some(b"x".to_vec()));
    }

    #[test]
    fn test_threshold_triggers_compaction() {
        let dir = tempdir().unwrap();
        let config = LedgerConfig {
            sync_on_write: false,
            compact_threshold_bytes: 4 * 1024,
        };
        let ledger = FileLedger::open(dir.path(), Some(config)).unwrap();
        for i in 0..500u32 {
            ledger.put(b"k", i.to_le_bytes().to_vec()).unwrap();
        }
        let size = fs::metadata(dir.path().join(WAL_FILE)).unwrap().len();
        assert!(size <= 8 * 1024, "log was not compacted: {size} bytes");
        assert_eq!(ledger.get(b"k").unwrap(), Some(499u32.to_le_bytes().to_vec()));
    }

    fn generation(ledger: &FileLedger) -> u64 {
        ledger.wal.lock().unwrap().generation()
    }

    #[test]
    fn test_large_live_set_is_not_rewritten_per_write() {
        let dir = tempdir().unwrap();
        let config = LedgerConfig {
            sync_on_write: false,
            compact_threshold_bytes: 4 * 1024,
        };
        let ledger = FileLedger::open(dir.path(), Some(config)).unwrap();
        for i in 0..100u8 {
            ledger.put(&[i], vec![i; 100]).unwrap();
        }
        ledger.compact().unwrap();
        let live = fs::metadata(dir.path().join(WAL_FILE)).unwrap().len();
        assert!(live > 4 * 1024);

        let before = generation(&ledger);
        for i in 0..50u8 {
            ledger.put(&[0], vec![i; 100]).unwrap();
        }
        assert_eq!(generation(&ledger), before);
        assert_eq!(ledger.get(&[0]).unwrap(), Some(vec![49; 100]));
    }

    #[test]
    fn test_failed_compaction_keeps_write_committed() {
        let dir = tempdir().unwrap();
        let config = LedgerConfig {
            sync_on_write: false,
            compact_threshold_bytes: 4 * 1024,
        };
        {
            let ledger = FileLedger::open(dir.path(), Some(config.clone())).unwrap();
            // a directory in the way makes every snapshot attempt fail
            fs::create_dir(dir.path().join("ledger.wal.tmp")).unwrap();
            for i in 0..200u32 {
                ledger.put(b"k", i.to_le_bytes().to_vec()).unwrap();
            }
            assert!(ledger
                .compare_and_swap(b"k", Some(&199u32.to_le_bytes()), b"last".to_vec())
                .unwrap());
            assert_eq!(generation(&ledger), 0);
        }

        let ledger = FileLedger::open(dir.path(), Some(config)).unwrap();
        assert_eq!(ledger.get(b"k").unwrap(), Some(b"last".to_vec()));
    }

    #[test]
    fn test_compare_and_swap_is_logged() {
        let dir = tempdir().unwrap();
        {
            let ledger = FileLedger::open(dir.path(), fast()).unwrap();
            assert!(ledger.compare_and_swap(b"k", None, b"1".to_vec()).unwrap());
            assert!(!ledger.compare_and_swap(b"k", None, b"2".to_vec()).unwrap());
        }
        let ledger = FileLedger::open(dir.path(), fast()).unwrap();
        assert_eq!(ledger.get(b"k").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn test_rejects_tiny_threshold() {
        let config = LedgerConfig {
            sync_on_write: false,
            compact_threshold_bytes: 10,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_scan_cursor_is_released() {
        let dir = tempdir().unwrap();
        let ledger = FileLedger::open(dir.path(), fast()).unwrap();
        ledger.put(b"p1", b"x".to_vec()).unwrap();
        {
            let mut cursor = ledger.scan_prefix(b"p").unwrap();
            assert!(cursor.next().is_some());
            assert_eq!(ledger.open_cursors(), 1);
        }
        assert_eq!(ledger.open_cursors(), 0);
    }
}
