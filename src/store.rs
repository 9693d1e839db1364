//! Record store.
//!
//! Maps record numbers to composite keys, and records to and from their
//! stored bytes, on top of any [`Ledger`]. The store holds no state besides
//! its configuration: every call goes to the ledger.

use std::sync::Arc;

use crate::codec;
use crate::config::{ConcurrencyMode, EngineConfig};
use crate::error::{RmaError, RmaResult};
use crate::key::{self, CompositeKey};
use crate::ledger::{KeyValue, Ledger, LedgerCursor};
use crate::rma::{Rma, RmaNo};

/// Composite-key record store over a ledger.
#[derive(Clone)]
pub struct RecordStore {
    ledger: Arc<dyn Ledger>,
    config: EngineConfig,
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RecordStore {
    /// Store with the default configuration.
    #[must_use]
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self {
            ledger,
            config: EngineConfig::default(),
        }
    }

    /// Store with an explicit configuration.
    ///
    /// # Errors
    /// Returns [`RmaError::InvalidConfig`] if `config` fails validation.
    pub fn with_config(ledger: Arc<dyn Ledger>, config: EngineConfig) -> RmaResult<Self> {
        Ok(Self {
            ledger,
            config: config.validate()?,
        })
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The underlying ledger.
    #[must_use]
    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    /// Key under which `rmano` is stored.
    ///
    /// # Errors
    /// Returns [`RmaError::Key`] if the configured index name is unusable.
    pub fn key_for(&self, rmano: &RmaNo) -> RmaResult<CompositeKey> {
        Ok(key::derive_key(&self.config.index_name, rmano.as_str())?)
    }

    /// Loads a record, or `None` if it was never created.
    ///
    /// # Errors
    /// `Corrupt` if the stored bytes do not decode, `StoreUnavailable` if the
    /// ledger read fails.
    pub fn try_load(&self, rmano: &RmaNo) -> RmaResult<Option<Rma>> {
        let key = self.key_for(rmano)?;
        tracing::debug!(%key, "ledger get");
        let Some(bytes) = self.ledger.get(key.as_bytes())? else {
            return Ok(None);
        };
        let rma = self.decode_at(rmano.as_str(), &bytes)?;
        Ok(Some(rma))
    }

    /// Loads a record.
    ///
    /// # Errors
    /// `NotFound` if no record exists, otherwise as [`RecordStore::try_load`].
    pub fn load(&self, rmano: &RmaNo) -> RmaResult<Rma> {
        self.try_load(rmano)?
            .ok_or_else(|| RmaError::not_found(rmano.as_str()))
    }

    /// Writes `rma` as given, overwriting whatever is stored.
    ///
    /// # Errors
    /// `Corrupt` if the record cannot be encoded, `StoreUnavailable` if the
    /// ledger write fails.
    pub fn save(&self, rma: &Rma) -> RmaResult<()> {
        let key = self.key_for(&rma.rmano)?;
        let bytes = codec::encode(rma, self.config.max_record_bytes)?;
        tracing::debug!(%key, bytes = bytes.len(), "ledger put");
        self.ledger.put(key.as_bytes(), bytes)?;
        Ok(())
    }

    /// Writes back a record previously returned by [`RecordStore::load`],
    /// bumping its version.
    ///
    /// With [`ConcurrencyMode::Versioned`] the write only happens if the
    /// stored version still equals `rma.version`; the swap itself goes through
    /// [`Ledger::compare_and_swap`]. With [`ConcurrencyMode::LastWriteWins`]
    /// the record is overwritten unconditionally.
    ///
    /// Returns the record as written.
    ///
    /// # Errors
    /// `NotFound` if the record disappeared, `Conflict` if another writer got
    /// there first, plus the errors of [`RecordStore::save`].
    pub fn save_checked(&self, rma: &Rma) -> RmaResult<Rma> {
        let mut next = rma.clone();
        next.version = rma.version.wrapping_add(1);

        if self.config.concurrency == ConcurrencyMode::LastWriteWins {
            self.save(&next)?;
            return Ok(next);
        }

        let key = self.key_for(&rma.rmano)?;
        let Some(current) = self.ledger.get(key.as_bytes())? else {
            return Err(RmaError::not_found(rma.rmano.as_str()));
        };
        let stored_version = self.decode_at(rma.rmano.as_str(), &current)?.version;
        if stored_version != rma.version {
            return Err(self.conflict(rma, stored_version));
        }

        let bytes = codec::encode(&next, self.config.max_record_bytes)?;
        tracing::debug!(%key, version = next.version, "ledger compare_and_swap");
        if !self
            .ledger
            .compare_and_swap(key.as_bytes(), Some(&current), bytes)?
        {
            let found = self
                .try_load(&rma.rmano)?
                .map_or(stored_version, |r| r.version);
            return Err(self.conflict(rma, found));
        }
        Ok(next)
    }

    /// Removes a record. Removing a missing record is not an error.
    ///
    /// # Errors
    /// `StoreUnavailable` if the ledger delete fails.
    pub fn delete(&self, rmano: &RmaNo) -> RmaResult<()> {
        let key = self.key_for(rmano)?;
        tracing::debug!(%key, "ledger delete");
        self.ledger.delete(key.as_bytes())?;
        Ok(())
    }

    /// Lazily scans every record under the configured index, in ledger key
    /// order.
    ///
    /// The ledger cursor is closed when the scan is exhausted, when it yields
    /// an error, or when the returned value is dropped.
    ///
    /// # Errors
    /// `StoreUnavailable` if the scan cannot be opened.
    pub fn query_all(&self) -> RmaResult<RecordScan<'_>> {
        let prefix = key::partial_key::<&str>(&self.config.index_name, &[])?;
        tracing::debug!(%prefix, "ledger scan");
        let cursor = self.ledger.scan_prefix(prefix.as_bytes())?;
        Ok(RecordScan {
            cursor: Some(cursor),
            index_name: &self.config.index_name,
        })
    }

    /// Collects [`RecordStore::query_all`] into a vector, stopping at the
    /// first error.
    ///
    /// # Errors
    /// As [`RecordStore::query_all`], plus `Corrupt` for any undecodable entry.
    pub fn query_collect(&self) -> RmaResult<Vec<Rma>> {
        self.query_all()?.collect()
    }

    fn decode_at(&self, location: &str, bytes: &[u8]) -> RmaResult<Rma> {
        codec::decode(location, bytes).inspect_err(|e| {
            tracing::warn!(record = location, error = %e, "stored record failed to decode");
        })
    }

    fn conflict(&self, rma: &Rma, found: u64) -> RmaError {
        tracing::warn!(
            rmano = %rma.rmano,
            expected = rma.version,
            found,
            "versioned write lost a race"
        );
        RmaError::Conflict {
            rmano: rma.rmano.to_string(),
            expected: rma.version,
            found,
        }
    }
}

/// Lazy scan over the records of one index.
///
/// Finite and not restartable. Once it yields an error it is exhausted.
pub struct RecordScan<'a> {
    cursor: Option<Box<dyn LedgerCursor + 'a>>,
    index_name: &'a str,
}

impl RecordScan<'_> {
    fn close(&mut self) {
        if let Some(mut cursor) = self.cursor.take() {
            cursor.close();
        }
    }

    /// Decodes one scanned entry. `Ok(None)` means the key belongs to a
    /// deeper composite key under the same index and is not a record.
    fn decode_entry(&self, entry: &KeyValue) -> RmaResult<Option<Rma>> {
        let key = CompositeKey::from_bytes(entry.key.clone());
        let (index, attrs) = key
            .split()
            .map_err(|e| RmaError::corrupt(key.to_string(), e.to_string()))?;
        let [rmano] = attrs.as_slice() else {
            tracing::debug!(%key, "skipping non-record key under index");
            return Ok(None);
        };
        debug_assert_eq!(index, self.index_name);

        let rma = codec::decode(rmano, &entry.value)?;
        if rma.rmano.as_str() != rmano.as_str() {
            return Err(RmaError::corrupt(
                key.to_string(),
                format!("body carries rmano {:?}", rma.rmano.as_str()),
            ));
        }
        Ok(Some(rma))
    }
}

impl Iterator for RecordScan<'_> {
    type Item = RmaResult<Rma>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let step = self.cursor.as_mut()?.next();
            let result = match step {
                None => {
                    self.close();
                    return None;
                }
                Some(Err(e)) => Err(RmaError::from(e)),
                Some(Ok(entry)) => match self.decode_entry(&entry) {
                    Ok(Some(rma)) => return Some(Ok(rma)),
                    Ok(None) => continue,
                    Err(e) => Err(e),
                },
            };
            self.close();
            return Some(result);
        }
    }
}

impl Drop for RecordScan<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for RecordScan<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordScan")
            .field("index_name", &self.index_name)
            .field("open", &self.cursor.is_some())
            .finish()
    }
}
