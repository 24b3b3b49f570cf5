//! Durable store backed by an append-only log file.
//!
//! The log is a sequence of frames, each a 12-byte header (big-endian body
//! length, then big-endian crc32 of the body) followed by a
//! MessagePack-encoded `DbRecord`. Opening the store replays every frame into
//! an ordered in-memory table, so reads never touch disk; every put appends
//! one frame and syncs it before returning.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use crate::utils::LocksmithError;
use crate::lockdb::{LockDb, LockDbKind, LeaseRecord, validate_lock_key};
use crate::lockdb::table::{DbValue, KeyTable};

use async_trait::async_trait;

use serde::{Serialize, Deserialize};

use rmp_serde::encode::to_vec as encode_to_vec;
use rmp_serde::decode::from_slice as decode_from_slice;

use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt, AsyncSeekExt};

/// Name of the log file inside the store directory.
const WAL_FILE_NAME: &str = "lock.wal";

/// Name of the scratch file used while compacting.
const COMPACT_FILE_NAME: &str = "lock.wal.compact";

/// Size of a frame's header: body length then body checksum.
const HEADER_LEN: usize = 12;

/// Default number of stale frames tolerated before compacting on open.
pub const DEFAULT_COMPACT_THRESHOLD: usize = 1024;

/// One durable log frame.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
enum DbRecord {
    /// Upsert of a key. Leases are stored without their deadline.
    Put { key: String, value: DbValue },
}

/// Durable `LockDb` rooted at a directory.
#[derive(Debug)]
pub struct FileDb {
    /// Store directory.
    dir: PathBuf,

    /// Backing log file, cursor kept at EOF; `None` after `dispose()`.
    backer: Option<File>,

    /// Current size of the log file in bytes.
    file_size: usize,

    /// Number of frames in the log, stale ones included.
    nr_frames: usize,

    /// Replayed contents.
    table: KeyTable,
}

impl FileDb {
    /// Opens (creating if needed) the store in directory `dir`, compacting
    /// the log with the default threshold.
    pub async fn open(dir: &Path) -> Result<Self, LocksmithError> {
        Self::open_with(dir, DEFAULT_COMPACT_THRESHOLD).await
    }

    /// Opens (creating if needed) the store in directory `dir`. If replay
    /// finds more than `compact_threshold` stale frames, the log is
    /// rewritten to hold one frame per live key.
    pub async fn open_with(
        dir: &Path,
        compact_threshold: usize,
    ) -> Result<Self, LocksmithError> {
        fs::create_dir_all(dir).await?;
        let path = dir.join(WAL_FILE_NAME);
        if !fs::try_exists(&path).await? {
            File::create(&path).await?;
            pf_debug!("created log file '{}'", path.display());
        }
        let mut backer =
            OpenOptions::new().read(true).write(true).open(&path).await?;
        let file_size = backer.metadata().await?.len() as usize;

        // replay all intact frames
        let mut table = KeyTable::new();
        let mut nr_frames = 0;
        let mut offset = 0;
        while let Some((record, end_offset)) =
            Self::read_frame(&mut backer, file_size, offset).await?
        {
            pf_trace!(
                "replayed frame at {} of '{}'",
                offset,
                path.display()
            );
            match record {
                DbRecord::Put { key, value } => table.insert(key, value),
            }
            nr_frames += 1;
            offset = end_offset;
        }

        // whatever stopped replay must be the last append, torn by a crash;
        // an intact frame behind it means the log is damaged mid-way
        let file_size = if offset < file_size {
            backer.seek(SeekFrom::Start(offset as u64)).await?;
            let mut rest = Vec::with_capacity(file_size - offset);
            backer.read_to_end(&mut rest).await?;
            let damage = if Self::holds_complete_body(&rest) {
                Some("header damaged over a complete body".to_string())
            } else {
                Self::find_intact_frame(&rest).map(|pos| {
                    format!("intact frame follows at {}", offset + pos)
                })
            };
            if let Some(damage) = damage {
                return logged_err!(
                    "log '{}' corrupt at offset {}: {}",
                    path.display(),
                    offset,
                    damage
                );
            }

            pf_warn!(
                "log '{}' has torn tail, truncating {} -> {}",
                path.display(),
                file_size,
                offset
            );
            backer.set_len(offset as u64).await?;
            backer.sync_all().await?;
            offset
        } else {
            file_size
        };
        backer.seek(SeekFrom::End(0)).await?;

        let mut db = FileDb {
            dir: dir.to_path_buf(),
            backer: Some(backer),
            file_size,
            nr_frames,
            table,
        };

        if db.nr_frames - db.table.len() > compact_threshold {
            db.compact().await?;
        }

        pf_debug!(
            "opened store '{}' with {} keys in {} frames",
            db.dir.display(),
            db.table.len(),
            db.nr_frames
        );
        Ok(db)
    }

    /// Reads the frame at `offset`. Returns `None` if no intact frame
    /// starts there: header or body past EOF, empty body, or checksum
    /// mismatch.
    async fn read_frame(
        backer: &mut File,
        file_size: usize,
        offset: usize,
    ) -> Result<Option<(DbRecord, usize)>, LocksmithError> {
        if offset + HEADER_LEN > file_size {
            return Ok(None);
        }

        // read frame header
        backer.seek(SeekFrom::Start(offset as u64)).await?;
        let frame_len = backer.read_u64().await?;
        let checksum = backer.read_u32().await?;
        let offset_e = usize::try_from(frame_len)
            .ok()
            .and_then(|len| (offset + HEADER_LEN).checked_add(len));
        let offset_e = match offset_e {
            Some(offset_e) => offset_e,
            None => {
                return logged_err!(
                    "frame at {} has impossible length {}",
                    offset,
                    frame_len
                );
            }
        };
        if frame_len == 0 || offset_e > file_size {
            pf_warn!("frame at {} has invalid length {}", offset, frame_len);
            return Ok(None);
        }

        // read frame body and verify it
        let mut frame_buf: Vec<u8> = vec![0; offset_e - offset - HEADER_LEN];
        backer.read_exact(&mut frame_buf[..]).await?;
        if crc32fast::hash(&frame_buf) != checksum {
            pf_warn!("frame at {} fails checksum", offset);
            return Ok(None);
        }

        // a checksummed frame that fails to decode is corruption, not a
        // torn write
        let record = decode_from_slice(&frame_buf).map_err(|e| {
            LocksmithError::msg(format!(
                "corrupt frame at offset {}: {}",
                offset, e
            ))
        })?;
        Ok(Some((record, offset_e)))
    }

    /// Checks whether `bytes` begins with a complete frame whose checksum
    /// matches and whose body decodes.
    fn is_intact_frame(bytes: &[u8]) -> bool {
        if bytes.len() < HEADER_LEN {
            return false;
        }
        let mut len_buf = [0u8; 8];
        len_buf.copy_from_slice(&bytes[..8]);
        let mut sum_buf = [0u8; 4];
        sum_buf.copy_from_slice(&bytes[8..HEADER_LEN]);

        let frame_len = u64::from_be_bytes(len_buf);
        if frame_len == 0 || frame_len > (bytes.len() - HEADER_LEN) as u64 {
            return false;
        }
        let body = &bytes[HEADER_LEN..HEADER_LEN + frame_len as usize];
        crc32fast::hash(body) == u32::from_be_bytes(sum_buf)
            && decode_from_slice::<DbRecord>(body).is_ok()
    }

    /// Checks whether the frame at the start of `rest`, whose length header
    /// points past EOF, nonetheless has its whole body on disk: some prefix
    /// of what follows the header matches the checksum and decodes.
    fn holds_complete_body(rest: &[u8]) -> bool {
        if rest.len() <= HEADER_LEN {
            return false;
        }
        let mut sum_buf = [0u8; 4];
        sum_buf.copy_from_slice(&rest[8..HEADER_LEN]);
        let checksum = u32::from_be_bytes(sum_buf);

        let body = &rest[HEADER_LEN..];
        let mut hasher = crc32fast::Hasher::new();
        for (idx, byte) in body.iter().enumerate() {
            hasher.update(std::slice::from_ref(byte));
            if hasher.clone().finalize() == checksum
                && decode_from_slice::<DbRecord>(&body[..=idx]).is_ok()
            {
                return true;
            }
        }
        false
    }

    /// Scans the bytes past a frame that stopped replay for any intact
    /// frame. Returns its position relative to the start of `rest`.
    fn find_intact_frame(rest: &[u8]) -> Option<usize> {
        (1..rest.len()).find(|&pos| Self::is_intact_frame(&rest[pos..]))
    }

    /// Writes one frame at the cursor and syncs it. Returns bytes written.
    async fn write_frame(
        backer: &mut File,
        record: &DbRecord,
        sync: bool,
    ) -> Result<usize, LocksmithError> {
        let frame_bytes = encode_to_vec(record)?;
        let frame_len = frame_bytes.len();

        // header first, then body
        backer.write_u64(frame_len as u64).await?;
        backer.write_u32(crc32fast::hash(&frame_bytes)).await?;
        backer.write_all(&frame_bytes[..]).await?;

        if sync {
            backer.sync_data().await?;
        }

        Ok(HEADER_LEN + frame_len)
    }

    /// Cuts the log back to `size` bytes and moves the cursor to its end.
    async fn rollback(
        backer: &mut File,
        size: usize,
    ) -> Result<(), LocksmithError> {
        backer.set_len(size as u64).await?;
        backer.seek(SeekFrom::End(0)).await?;
        Ok(())
    }

    /// Appends an upsert of `key` to the log, then applies it to the table.
    async fn append_put(
        &mut self,
        key: &str,
        value: DbValue,
    ) -> Result<(), LocksmithError> {
        let backer = match self.backer {
            Some(ref mut backer) => backer,
            None => {
                return logged_err!("store '{}' is closed", self.dir.display())
            }
        };

        let record = DbRecord::Put {
            key: key.into(),
            value,
        };
        match Self::write_frame(backer, &record, true).await {
            Ok(written) => {
                self.file_size += written;
                self.nr_frames += 1;
            }
            Err(e) => {
                // a partial frame must not stay in front of later appends
                pf_error!(
                    "append to '{}' failed: {}, rolling back to {}",
                    self.dir.display(),
                    e,
                    self.file_size
                );
                let rolled_back = Self::rollback(backer, self.file_size).await;
                if let Err(re) = rolled_back {
                    pf_error!(
                        "rollback of '{}' failed: {}, closing store",
                        self.dir.display(),
                        re
                    );
                    self.backer = None;
                    self.table.clear();
                }
                return Err(e);
            }
        }

        let DbRecord::Put { key, value } = record;
        self.table.insert(key, value);
        Ok(())
    }

    /// Rewrites the log to hold exactly one frame per live key.
    async fn compact(&mut self) -> Result<(), LocksmithError> {
        let path = self.dir.join(WAL_FILE_NAME);
        let tmp_path = self.dir.join(COMPACT_FILE_NAME);

        let mut tmp = File::create(&tmp_path).await?;
        let mut tmp_size = 0;
        for (key, value) in self.table.iter() {
            let record = DbRecord::Put {
                key: key.clone(),
                value: value.clone(),
            };
            tmp_size += Self::write_frame(&mut tmp, &record, false).await?;
        }
        tmp.sync_all().await?;
        drop(tmp);

        // swap in the compacted log
        self.backer = None;
        fs::rename(&tmp_path, &path).await?;
        let mut backer =
            OpenOptions::new().read(true).write(true).open(&path).await?;
        backer.seek(SeekFrom::End(0)).await?;

        pf_info!(
            "compacted log '{}': {} frames -> {}, {} bytes -> {}",
            path.display(),
            self.nr_frames,
            self.table.len(),
            self.file_size,
            tmp_size
        );
        self.backer = Some(backer);
        self.nr_frames = self.table.len();
        self.file_size = tmp_size;
        Ok(())
    }

    fn check_open(&self) -> Result<(), LocksmithError> {
        if self.backer.is_some() {
            Ok(())
        } else {
            Err(LocksmithError::msg(format!(
                "store '{}' is closed",
                self.dir.display()
            )))
        }
    }

    /// Store directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl LockDb for FileDb {
    fn kind(&self) -> LockDbKind {
        LockDbKind::Durable
    }

    async fn dispose(&mut self) -> Result<(), LocksmithError> {
        match self.backer.take() {
            Some(backer) => {
                self.table.clear();
                backer.sync_all().await?;
                Ok(())
            }
            None => logged_err!("store '{}' is closed", self.dir.display()),
        }
    }

    fn get(&self, key: &str) -> Result<String, LocksmithError> {
        self.check_open()?;
        self.table.get_text(key)
    }

    async fn put(
        &mut self,
        key: &str,
        value: String,
        overwrite: bool,
    ) -> Result<(), LocksmithError> {
        self.check_open()?;
        self.table.check_overwrite(key, overwrite)?;
        self.append_put(key, DbValue::Text(value)).await
    }

    fn get_lease(&self, key: &str) -> Result<LeaseRecord, LocksmithError> {
        self.check_open()?;
        // deadlines are never persisted, hence never returned from here
        self.table.get_lease(key).map(|mut lease| {
            lease.expire_time_ms = 0;
            lease
        })
    }

    async fn put_lease(
        &mut self,
        key: &str,
        mut lease: LeaseRecord,
        overwrite: bool,
    ) -> Result<(), LocksmithError> {
        self.check_open()?;
        validate_lock_key(key)?;
        self.table.check_overwrite(key, overwrite)?;
        lease.expire_time_ms = 0;
        self.append_put(key, DbValue::Lease(lease)).await
    }

    fn seek_to_first(&mut self) {
        self.table.seek_to_first();
    }

    fn valid(&self) -> bool {
        self.backer.is_some() && self.table.valid()
    }

    fn next(&mut self) {
        self.table.next();
    }

    fn get_current(&self) -> Result<(String, LeaseRecord), LocksmithError> {
        self.check_open()?;
        self.table.get_current()
    }

    fn len(&self) -> usize {
        self.table.len()
    }
}
