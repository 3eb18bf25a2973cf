use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use keyscope_types::Value;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::SyncMode;
use crate::error::{StoreError, StoreResult};
use crate::traits::KvStore;

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

/// One mutation in the store log.
///
/// On-disk frame:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized Record)]
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
enum Record {
    Set { key: String, value: Value },
    Remove { keys: Vec<String> },
}

struct LogWriter {
    file: File,
    /// End of the last fully written frame.
    offset: u64,
}

/// Destination of log frames.
trait LogSink: Write {
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
    fn sync(&mut self) -> io::Result<()>;
}

impl LogSink for File {
    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

/// Build the on-disk frame for a record.
fn encode_frame(record: &Record) -> StoreResult<Vec<u8>> {
    let payload =
        bincode::serialize(record).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Write one frame at `offset`. On failure the sink is cut back to `offset`
/// so a rejected write never reaches the log.
fn append_frame<S: LogSink>(
    sink: &mut S,
    offset: u64,
    frame: &[u8],
    sync: bool,
) -> io::Result<()> {
    let written: io::Result<()> = (|| {
        sink.write_all(frame)?;
        sink.flush()?;
        if sync {
            sink.sync()?;
        }
        Ok(())
    })();
    if let Err(e) = written {
        if let Err(rollback) = sink.truncate_to(offset) {
            warn!(offset, error = %rollback, "failed to roll back partial log frame");
        }
        return Err(e);
    }
    Ok(())
}

/// Durable store: an in-memory table backed by an append-only log.
///
/// Every mutation is framed with a length prefix and a CRC32 checksum and
/// appended to the log before the table is updated. Opening the store
/// replays the log front-to-back. A frame that fails its CRC check is
/// skipped; a truncated frame at the tail (a torn write) ends the replay and
/// is cut off so new frames start on a clean boundary.
pub struct FileStore {
    path: PathBuf,
    table: RwLock<HashMap<String, Value>>,
    log: Mutex<LogWriter>,
    sync_mode: SyncMode,
}

impl FileStore {
    /// Open (or create) a store log at the given path.
    pub fn open(path: &Path, sync_mode: SyncMode) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let (table, valid_len) = replay(path)?;
        let file_len = file.metadata()?.len();
        if valid_len < file_len {
            warn!(
                valid_len,
                file_len,
                path = %path.display(),
                "discarding torn tail of store log"
            );
            file.set_len(valid_len)?;
        }

        info!(path = %path.display(), keys = table.len(), "file store opened");
        Ok(Self {
            path: path.to_path_buf(),
            table: RwLock::new(table),
            log: Mutex::new(LogWriter {
                file,
                offset: valid_len,
            }),
            sync_mode,
        })
    }

    /// Path to the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current size of the log in bytes.
    pub fn log_len(&self) -> u64 {
        self.log.lock().expect("log mutex poisoned").offset
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.table.read().expect("lock poisoned").len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.table.read().expect("lock poisoned").is_empty()
    }

    /// Sorted list of every stored key. Diagnostics only.
    pub fn keys(&self) -> Vec<String> {
        let table = self.table.read().expect("lock poisoned");
        let mut keys: Vec<String> = table.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Append a record and apply it to the table while holding the log lock,
    /// so table order always matches log order.
    fn commit(&self, record: Record) -> StoreResult<()> {
        let frame = encode_frame(&record)?;
        let sync = matches!(self.sync_mode, SyncMode::EveryWrite);

        let mut log = self.log.lock().expect("log mutex poisoned");
        let entry_offset = log.offset;
        append_frame(&mut log.file, entry_offset, &frame, sync)?;
        log.offset += frame.len() as u64;

        let mut table = self.table.write().expect("lock poisoned");
        match record {
            Record::Set { key, value } => {
                table.insert(key, value);
            }
            Record::Remove { keys } => {
                for key in &keys {
                    table.remove(key);
                }
            }
        }
        debug!(offset = entry_offset, len = frame.len(), "store log append");
        Ok(())
    }
}

/// Replay the log at `path`, returning the table and the length of the
/// valid prefix of the file.
fn replay(path: &Path) -> StoreResult<(HashMap<String, Value>, u64)> {
    let data = fs::read(path)?;
    let mut table = HashMap::new();
    let mut offset = 0usize;
    let mut applied = 0usize;

    while offset + HEADER_SIZE <= data.len() {
        let header = &data[offset..offset + HEADER_SIZE];
        let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        let end = offset + HEADER_SIZE + length;
        if length == 0 || end > data.len() {
            warn!(offset, length, file_len = data.len(), "invalid log frame; stopping replay");
            break;
        }

        let payload = &data[offset + HEADER_SIZE..end];
        let actual_crc = crc32fast::hash(payload);
        if actual_crc != expected_crc {
            warn!(
                offset,
                expected = expected_crc,
                actual = actual_crc,
                "CRC mismatch; skipping log frame"
            );
            offset = end;
            continue;
        }

        match bincode::deserialize::<Record>(payload) {
            Ok(Record::Set { key, value }) => {
                table.insert(key, value);
                applied += 1;
            }
            Ok(Record::Remove { keys }) => {
                for key in &keys {
                    table.remove(key);
                }
                applied += 1;
            }
            Err(e) => {
                warn!(offset, error = %e, "failed to deserialize log frame; skipping");
            }
        }
        offset = end;
    }

    debug!(applied, keys = table.len(), "store log replay complete");
    Ok((table, offset as u64))
}

impl KvStore for FileStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.table.read().expect("lock poisoned").get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        self.commit(Record::Set {
            key: key.to_string(),
            value,
        })
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        if !self.contains(key) {
            return Ok(());
        }
        self.commit(Record::Remove {
            keys: vec![key.to_string()],
        })
    }

    fn remove_many(&self, keys: &[String]) -> StoreResult<()> {
        let present: Vec<String> = {
            let table = self.table.read().expect("lock poisoned");
            keys.iter()
                .filter(|key| table.contains_key(key.as_str()))
                .cloned()
                .collect()
        };
        if present.is_empty() {
            return Ok(());
        }
        self.commit(Record::Remove { keys: present })
    }

    fn contains(&self, key: &str) -> bool {
        self.table.read().expect("lock poisoned").contains_key(key)
    }

    fn clear_all(&self) -> StoreResult<()> {
        let mut log = self.log.lock().expect("log mutex poisoned");
        let file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        file.sync_all()?;
        // Reopen for appending so writes follow the file end.
        log.file = OpenOptions::new().append(true).open(&self.path)?;
        log.offset = 0;
        self.table.write().expect("lock poisoned").clear();
        info!(path = %self.path.display(), "file store cleared");
        Ok(())
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("path", &self.path)
            .field("key_count", &self.len())
            .finish()
    }
}
