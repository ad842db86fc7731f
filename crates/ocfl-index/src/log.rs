use std::borrow::Cow;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use ocfl_types::{IndexedObject, StorageRootInfo};

use crate::error::{IndexError, IndexResult};

/// One durable change to the index.
///
/// On-disk framing:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized LogRecord)]
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum LogRecord<'a> {
    Upsert(Cow<'a, IndexedObject>),
    Delete(Cow<'a, str>),
    Root(Cow<'a, StorageRootInfo>),
}

/// Flush strategy for appended records.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncMode {
    /// `fsync` after every record.
    EveryWrite,
    /// Flush to the OS and let it schedule the write-back.
    #[default]
    OsDefault,
}

/// Configuration for the [`IndexLog`].
#[derive(Clone, Debug, Default)]
pub struct LogConfig {
    pub sync_mode: SyncMode,
}

const HEADER_SIZE: usize = 8;

struct LogWriter {
    writer: BufWriter<File>,
    offset: u64,
}

/// Append-only record log backing a persistent index.
///
/// Records are replayed front to back on open. A record whose CRC does not
/// match is skipped; a record cut short by a crash ends replay.
pub struct IndexLog {
    path: PathBuf,
    writer: Mutex<LogWriter>,
    config: LogConfig,
}

impl IndexLog {
    /// Open (or create) the log at `path`.
    pub fn open(path: &Path, config: LogConfig) -> IndexResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let offset = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(LogWriter {
                writer: BufWriter::new(file),
                offset,
            }),
            config,
        })
    }

    fn lock(&self) -> IndexResult<MutexGuard<'_, LogWriter>> {
        self.writer
            .lock()
            .map_err(|e| IndexError::Poisoned(e.to_string()))
    }

    fn frame(record: &LogRecord<'_>) -> IndexResult<Vec<u8>> {
        let payload =
            bincode::serialize(record).map_err(|e| IndexError::Serialization(e.to_string()))?;
        let length = u32::try_from(payload.len())
            .map_err(|_| IndexError::Serialization("record exceeds 4 GiB".into()))?;
        let mut framed = Vec::with_capacity(HEADER_SIZE + payload.len());
        framed.extend_from_slice(&length.to_le_bytes());
        framed.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        framed.extend_from_slice(&payload);
        Ok(framed)
    }

    /// Append a record. Returns the byte offset it was written at.
    pub fn append(&self, record: &LogRecord<'_>) -> IndexResult<u64> {
        let framed = Self::frame(record)?;
        let mut w = self.lock()?;
        let at = w.offset;
        w.writer.write_all(&framed)?;
        w.writer.flush()?;
        if self.config.sync_mode == SyncMode::EveryWrite {
            w.writer.get_ref().sync_data()?;
        }
        w.offset += framed.len() as u64;
        Ok(at)
    }

    /// Read every intact record in the log.
    pub fn replay(&self) -> IndexResult<Vec<LogRecord<'static>>> {
        let mut file = BufReader::new(File::open(&self.path)?);
        let file_len = file.get_ref().metadata()?.len();
        let mut records = Vec::new();
        let mut offset: u64 = 0;
        let mut header = [0u8; HEADER_SIZE];

        while offset + HEADER_SIZE as u64 <= file_len {
            match file.read_exact(&mut header) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
            let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

            if length == 0 || offset + HEADER_SIZE as u64 + u64::from(length) > file_len {
                warn!(offset, length, file_len, "truncated index log record; stopping replay");
                break;
            }

            let mut payload = vec![0u8; length as usize];
            file.read_exact(&mut payload)?;
            offset += HEADER_SIZE as u64 + u64::from(length);

            let actual_crc = crc32fast::hash(&payload);
            if actual_crc != expected_crc {
                warn!(offset, expected = expected_crc, actual = actual_crc, "CRC mismatch; skipping index log record");
                continue;
            }
            match bincode::deserialize::<LogRecord<'static>>(&payload) {
                Ok(record) => records.push(record),
                Err(e) => warn!(offset, error = %e, "undecodable index log record; skipping"),
            }
        }

        debug!(records = records.len(), path = %self.path.display(), "index log replayed");
        Ok(records)
    }

    /// Atomically replace the log contents with `records`.
    ///
    /// The new log is written beside the old one and renamed over it, so a
    /// crash leaves either the old or the new log intact.
    pub fn rewrite<'a>(&self, records: impl IntoIterator<Item = LogRecord<'a>>) -> IndexResult<()> {
        let tmp = self.path.with_extension("compact");
        let mut out = BufWriter::new(File::create(&tmp)?);
        let mut written: u64 = 0;
        for record in records {
            let framed = Self::frame(&record)?;
            out.write_all(&framed)?;
            written += framed.len() as u64;
        }
        out.flush()?;
        out.get_ref().sync_all()?;
        drop(out);

        let mut w = self.lock()?;
        fs::rename(&tmp, &self.path)?;
        let file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        w.writer = BufWriter::new(file);
        w.offset = written;
        debug!(bytes = written, path = %self.path.display(), "index log rewritten");
        Ok(())
    }

    /// Current size of the log in bytes.
    pub fn offset(&self) -> u64 {
        self.lock().map(|w| w.offset).unwrap_or(0)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
