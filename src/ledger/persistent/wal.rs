//! Append-only mutation log.
//!
//! Every put and delete is appended as a framed [`LogRecord`] before it is
//! applied in memory. On open the log is replayed from the start; a torn or
//! corrupt tail is cut off at the last intact frame so later appends are
//! never hidden behind garbage.
//!
//! # File Format
//! ```text
//! [MAGIC: 4 bytes][VERSION: 1 byte]
//! [FRAME 1: LogRecord]
//! [FRAME 2: LogRecord]
//! ...
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Result as IoResult, Seek, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::codec;

/// One logged mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// Monotonically increasing within one log generation.
    pub sequence: u64,
    /// Wall-clock time of the append.
    pub timestamp: DateTime<Utc>,
    /// The mutation.
    pub op: LogOp,
}

/// Mutation kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LogOp {
    /// Key written.
    Put {
        /// Raw key.
        key: Vec<u8>,
        /// Raw value.
        value: Vec<u8>,
    },
    /// Key removed.
    Delete {
        /// Raw key.
        key: Vec<u8>,
    },
}

/// Outcome of replaying a log on open.
#[derive(Debug, Default)]
pub struct Replay {
    /// Intact records in append order.
    pub records: Vec<LogRecord>,
    /// Bytes cut from a torn or corrupt tail.
    pub discarded_bytes: u64,
}

/// The write side of the log.
#[derive(Debug)]
pub struct WriteAheadLog {
    path: PathBuf,
    writer: BufWriter<File>,
    sequence: u64,
    sync_on_write: bool,
    /// Log size right after the last rewrite.
    compacted_bytes: u64,
    /// Rewrites since open.
    generation: u64,
}

impl WriteAheadLog {
    /// Opens or creates the log at `path`, replaying what is already there.
    pub fn open(path: &Path, sync_on_write: bool) -> IoResult<(Self, Replay)> {
        let fresh = !path.exists() || fs::metadata(path)?.len() < codec::HEADER_LEN;
        if fresh {
            let mut file = File::create(path)?;
            codec::write_header(&mut file)?;
            file.sync_all()?;
        }

        let replay = Self::replay(path)?;
        let sequence = replay.records.last().map_or(0, |r| r.sequence);

        let file = OpenOptions::new().append(true).open(path)?;
        Ok((
            Self {
                path: path.to_path_buf(),
                writer: BufWriter::new(file),
                sequence,
                sync_on_write,
                compacted_bytes: codec::HEADER_LEN,
                generation: 0,
            },
            replay,
        ))
    }

    fn replay(path: &Path) -> IoResult<Replay> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        codec::read_header(&mut reader)?;

        let mut replay = Replay::default();
        let mut valid_end = reader.stream_position()?;
        while valid_end < file_len {
            match codec::decode_frame::<LogRecord>(&mut reader) {
                Ok(record) => {
                    replay.records.push(record);
                    valid_end = reader.stream_position()?;
                }
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) if e.kind() == ErrorKind::InvalidData => {
                    tracing::warn!(
                        path = %path.display(),
                        offset = valid_end,
                        error = %e,
                        "corrupt log frame, discarding tail"
                    );
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        if valid_end < file_len {
            replay.discarded_bytes = file_len - valid_end;
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(valid_end)?;
            file.sync_all()?;
        }
        Ok(replay)
    }

    /// Appends `op`, returning its sequence number.
    pub fn append(&mut self, op: LogOp) -> IoResult<u64> {
        let record = LogRecord {
            sequence: self.sequence + 1,
            timestamp: Utc::now(),
            op,
        };
        let frame = codec::encode_frame(&record)?;

        self.writer.write_all(&frame)?;
        self.writer.flush()?;
        if self.sync_on_write {
            self.writer.get_ref().sync_data()?;
        }

        self.sequence = record.sequence;
        Ok(record.sequence)
    }

    /// Replaces the log with one `Put` per entry of `snapshot`.
    ///
    /// The new log is written and reopened beside the old one, then renamed
    /// over it. The rename is the last fallible step, so on any error the
    /// writer still points at the live log.
    pub fn rewrite<'a>(
        &mut self,
        snapshot: impl IntoIterator<Item = (&'a Vec<u8>, &'a Vec<u8>)>,
    ) -> IoResult<()> {
        self.writer.flush()?;

        let tmp = self.path.with_extension("wal.tmp");
        let result = Self::write_snapshot(&tmp, snapshot).and_then(|sequence| {
            let file = OpenOptions::new().append(true).open(&tmp)?;
            let size = file.metadata()?.len();
            fs::rename(&tmp, &self.path)?;
            Ok((file, sequence, size))
        });
        let (file, sequence, size) = match result {
            Ok(ok) => ok,
            Err(e) => {
                let _ = fs::remove_file(&tmp);
                return Err(e);
            }
        };

        self.writer = BufWriter::new(file);
        self.sequence = sequence;
        self.compacted_bytes = size;
        self.generation += 1;
        Ok(())
    }

    fn write_snapshot<'a>(
        tmp: &Path,
        snapshot: impl IntoIterator<Item = (&'a Vec<u8>, &'a Vec<u8>)>,
    ) -> IoResult<u64> {
        let mut sequence = 0;
        let mut out = BufWriter::new(File::create(tmp)?);
        codec::write_header(&mut out)?;
        for (key, value) in snapshot {
            sequence += 1;
            let record = LogRecord {
                sequence,
                timestamp: Utc::now(),
                op: LogOp::Put {
                    key: key.clone(),
                    value: value.clone(),
                },
            };
            out.write_all(&codec::encode_frame(&record)?)?;
        }
        out.flush()?;
        out.get_ref().sync_all()?;
        Ok(sequence)
    }

    /// Returns true once the log has outgrown both `threshold` and twice its
    /// size after the last rewrite.
    pub fn needs_compaction(&self, threshold: u64) -> IoResult<bool> {
        let limit = threshold.max(self.compacted_bytes.saturating_mul(2));
        Ok(self.size_bytes()? > limit)
    }

    /// Number of rewrites since the log was opened.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Sequence number of the last appended record.
    #[cfg(test)]
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Current size of the log file.
    pub fn size_bytes(&self) -> IoResult<u64> {
        Ok(fs::metadata(&self.path)?.len())
    }
}
