//! Single-file record store.
//!
//! Records are framed with a fixed-width length prefix and packed
//! back-to-back with no padding:
//!
//! ```text
//! +-----------------+------------------+-----------------+------
//! | length          | payload          | length          | ...
//! | 8 bytes (BE)    | length bytes     | 8 bytes (BE)    |
//! +-----------------+------------------+-----------------+------
//! ```
//!
//! The byte offset of a frame's length prefix is its position; the first
//! frame sits at position 0. Appends are buffered in memory and drain to
//! the file lazily, so every read-path operation flushes first to keep
//! read-after-write visibility.

use crate::error::StoreError;
use crate::{LEN_WIDTH, WRITE_BUFFER_SIZE};
use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// A durable append-only record store over a single file.
///
/// All operations are serialized behind one lock: no two operations on the
/// same store execute concurrently, so a position returned by [`append`]
/// is immediately valid for [`read`] from any thread.
///
/// [`append`]: Store::append
/// [`read`]: Store::read
pub struct Store {
    inner: Mutex<Inner>,
}

struct Inner {
    file: File,
    buf: BytesMut,
    size: u64,
    closed: bool,
}

impl Inner {
    fn check_open(&self) -> Result<(), StoreError> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    /// Drains buffered appends to the file.
    fn flush(&mut self) -> Result<(), StoreError> {
        if self.buf.is_empty() {
            return Ok(());
        }
        // All durable bytes were written through this path, so physical EOF
        // is where the buffered region starts.
        self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(&self.buf)?;
        self.buf.clear();
        Ok(())
    }
}

impl Store {
    /// Creates a store over an already-open file handle.
    ///
    /// The file's current length becomes the initial size, so reopening an
    /// existing log resumes appends at the correct position.
    pub fn new(file: File) -> Result<Self, StoreError> {
        let size = file.metadata()?.len();

        Ok(Self {
            inner: Mutex::new(Inner {
                file,
                buf: BytesMut::with_capacity(WRITE_BUFFER_SIZE),
                size,
                closed: false,
            }),
        })
    }

    /// Opens or creates a store file at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;

        let store = Self::new(file)?;
        tracing::debug!(
            "store opened: path={} size={}",
            path.display(),
            store.size()
        );
        Ok(store)
    }

    /// Appends a record, returning `(bytes_written, position)`.
    ///
    /// The position is the byte offset of the record's length prefix and is
    /// stable once this call returns. Data is not guaranteed durable until a
    /// flush occurs (a read, a close, or the write buffer filling up).
    pub fn append(&self, p: &[u8]) -> Result<(u64, u64), StoreError> {
        let mut inner = self.inner.lock();
        inner.check_open()?;

        let pos = inner.size;
        inner.buf.put_u64(p.len() as u64);
        inner.buf.put_slice(p);

        let written = (LEN_WIDTH + p.len()) as u64;
        inner.size += written;

        // On error the staged frame stays buffered; the caller must treat
        // the append as indeterminate.
        if inner.buf.len() >= WRITE_BUFFER_SIZE {
            inner.flush()?;
        }

        Ok((written, pos))
    }

    /// Reads the record whose frame starts at `pos`.
    ///
    /// The position must be one previously returned by [`append`]; reading
    /// at an arbitrary offset decodes whatever bytes are there as a length
    /// prefix. Reading past the end of the file, or a frame whose payload
    /// was truncated, fails with an I/O error.
    ///
    /// [`append`]: Store::append
    pub fn read(&self, pos: u64) -> Result<Bytes, StoreError> {
        let mut inner = self.inner.lock();
        inner.check_open()?;
        inner.flush()?;

        let mut len_buf = [0u8; LEN_WIDTH];
        inner.file.seek(SeekFrom::Start(pos))?;
        inner.file.read_exact(&mut len_buf)?;
        let len = u64::from_be_bytes(len_buf);

        let mut payload = vec![0u8; len as usize];
        inner.file.read_exact(&mut payload)?;

        Ok(Bytes::from(payload))
    }

    /// Fills `buf` with raw bytes starting at `offset`, returning how many
    /// were read.
    ///
    /// Returns fewer bytes than requested only when the end of the file is
    /// reached; any other failure surfaces as an error. Useful for bulk
    /// copies that span frame boundaries.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock();
        inner.check_open()?;
        inner.flush()?;

        inner.file.seek(SeekFrom::Start(offset))?;

        let mut read = 0;
        while read < buf.len() {
            match inner.file.read(&mut buf[read..]) {
                Ok(0) => break, // EOF
                Ok(n) => read += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(read)
    }

    /// Flushes buffered appends and syncs the file.
    ///
    /// Every operation after a close, including a second close, fails with
    /// [`StoreError::Closed`].
    pub fn close(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.check_open()?;
        inner.flush()?;
        inner.file.sync_all()?;
        inner.closed = true;
        tracing::debug!("store closed: size={}", inner.size);
        Ok(())
    }

    /// Returns the store's logical size: the position of the next append.
    pub fn size(&self) -> u64 {
        self.inner.lock().size
    }

    /// Returns whether the store has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn temp_store(dir: &TempDir) -> Store {
        Store::open(dir.path().join("store.log")).unwrap()
    }

    #[test]
    fn test_append_read() {
        let dir = TempDir::new().unwrap();
        let store = temp_store(&dir);

        let (n, pos) = store.append(b"hello").unwrap();
        assert_eq!(n, 13);
        assert_eq!(pos, 0);

        let (n, pos) = store.append(b"world!").unwrap();
        assert_eq!(n, 14);
        assert_eq!(pos, 13);

        assert_eq!(store.read(0).unwrap().as_ref(), b"hello");
        assert_eq!(store.read(13).unwrap().as_ref(), b"world!");
        assert_eq!(store.size(), 27);
    }

    #[test]
    fn test_read_sees_unflushed_appends() {
        let dir = TempDir::new().unwrap();
        let store = temp_store(&dir);

        // Well below the buffer capacity, so nothing has hit the file yet.
        let (_, pos) = store.append(b"buffered").unwrap();
        assert_eq!(store.read(pos).unwrap().as_ref(), b"buffered");
    }

    #[test]
    fn test_empty_record() {
        let dir = TempDir::new().unwrap();
        let store = temp_store(&dir);

        let (n, pos) = store.append(b"").unwrap();
        assert_eq!(n, LEN_WIDTH as u64);
        assert!(store.read(pos).unwrap().is_empty());
    }

    #[test]
    fn test_reopen_resumes_at_prior_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.log");

        let store = Store::open(&path).unwrap();
        store.append(b"first").unwrap();
        let (_, second_pos) = store.append(b"second").unwrap();
        let final_size = store.size();
        store.close().unwrap();
        drop(store);

        let store = Store::open(&path).unwrap();
        assert_eq!(store.size(), final_size);

        let (_, pos) = store.append(b"third").unwrap();
        assert_eq!(pos, final_size);

        // Frames written before the reopen stay readable.
        assert_eq!(store.read(0).unwrap().as_ref(), b"first");
        assert_eq!(store.read(second_pos).unwrap().as_ref(), b"second");
        assert_eq!(store.read(pos).unwrap().as_ref(), b"third");
    }

    #[test]
    fn test_new_from_handle() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.log");

        let store = Store::open(&path).unwrap();
        store.append(b"existing").unwrap();
        store.close().unwrap();
        drop(store);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .unwrap();
        let store = Store::new(file).unwrap();
        assert_eq!(store.size(), (LEN_WIDTH + 8) as u64);
        assert_eq!(store.read(0).unwrap().as_ref(), b"existing");
    }

    #[test]
    fn test_read_past_end() {
        let dir = TempDir::new().unwrap();
        let store = temp_store(&dir);

        store.append(b"only").unwrap();
        let result = store.read(store.size());
        assert!(matches!(result, Err(StoreError::Io(_))));
    }

    #[test]
    fn test_read_truncated_frame() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.log");

        let store = Store::open(&path).unwrap();
        store.append(b"about to be truncated").unwrap();
        let size = store.size();
        store.close().unwrap();
        drop(store);

        // Chop payload bytes off the tail, leaving the length prefix intact.
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(size - 5).unwrap();
        drop(file);

        let store = Store::open(&path).unwrap();
        let result = store.read(0);
        assert!(matches!(result, Err(StoreError::Io(_))));
    }

    #[test]
    fn test_read_at() {
        let dir = TempDir::new().unwrap();
        let store = temp_store(&dir);

        store.append(b"hello").unwrap();
        store.append(b"world!").unwrap();

        // Raw read of the first frame's payload.
        let mut buf = [0u8; 5];
        let n = store.read_at(&mut buf, LEN_WIDTH as u64).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buf, b"hello");

        // A cross-frame read is just bytes.
        let mut buf = vec![0u8; 27];
        let n = store.read_at(&mut buf, 0).unwrap();
        assert_eq!(n, 27);
        assert_eq!(u64::from_be_bytes(buf[0..8].try_into().unwrap()), 5);

        // Short read at end of file, without error.
        let mut buf = vec![0u8; 64];
        let n = store.read_at(&mut buf, 13).unwrap();
        assert_eq!(n, 14);
    }

    #[test]
    fn test_operations_after_close() {
        let dir = TempDir::new().unwrap();
        let store = temp_store(&dir);

        store.append(b"last").unwrap();
        store.close().unwrap();
        assert!(store.is_closed());

        assert!(matches!(store.append(b"x"), Err(StoreError::Closed)));
        assert!(matches!(store.read(0), Err(StoreError::Closed)));
        assert!(matches!(
            store.read_at(&mut [0u8; 4], 0),
            Err(StoreError::Closed)
        ));
        assert!(matches!(store.close(), Err(StoreError::Closed)));
    }

    #[test]
    fn test_close_flushes_to_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.log");

        let store = Store::open(&path).unwrap();
        store.append(b"durable").unwrap();
        store.close().unwrap();
        drop(store);

        // The physical file carries the full frame after close.
        let len = std::fs::metadata(&path).unwrap().len();
        assert_eq!(len, (LEN_WIDTH + 7) as u64);
    }

    #[test]
    fn test_buffer_drains_when_full() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.log");
        let store = Store::open(&path).unwrap();

        let payload = vec![7u8; WRITE_BUFFER_SIZE];
        let (_, pos) = store.append(&payload).unwrap();

        // The oversized append drained straight through to the file.
        let len = std::fs::metadata(&path).unwrap().len();
        assert_eq!(len, (LEN_WIDTH + payload.len()) as u64);
        assert_eq!(store.read(pos).unwrap().as_ref(), &payload[..]);
    }

    #[test]
    fn test_concurrent_appends_serialize() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 50;
        const PAYLOAD_LEN: usize = 16;

        let dir = TempDir::new().unwrap();
        let store = Arc::new(temp_store(&dir));

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let mut positions = Vec::with_capacity(PER_THREAD);
                    for i in 0..PER_THREAD {
                        let payload = [(t * PER_THREAD + i) as u8; PAYLOAD_LEN];
                        let (n, pos) = store.append(&payload).unwrap();
                        assert_eq!(n, (LEN_WIDTH + PAYLOAD_LEN) as u64);
                        positions.push(pos);
                    }
                    positions
                })
            })
            .collect();

        let mut positions: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        positions.sort_unstable();

        // Distinct, gapless positions covering exactly the appended range.
        let frame = (LEN_WIDTH + PAYLOAD_LEN) as u64;
        for (i, pos) in positions.iter().enumerate() {
            assert_eq!(*pos, i as u64 * frame);
        }
        assert_eq!(store.size(), (THREADS * PER_THREAD) as u64 * frame);
    }

    proptest! {
        #[test]
        fn prop_roundtrip_and_monotonic_positions(
            payloads in proptest::collection::vec(
                proptest::collection::vec(any::<u8>(), 0..256),
                1..32,
            )
        ) {
            let dir = TempDir::new().unwrap();
            let store = temp_store(&dir);

            let mut expected_pos = 0u64;
            let mut positions = Vec::with_capacity(payloads.len());
            for p in &payloads {
                let (n, pos) = store.append(p).unwrap();
                prop_assert_eq!(n, (LEN_WIDTH + p.len()) as u64);
                prop_assert_eq!(pos, expected_pos);
                expected_pos += n;
                positions.push(pos);
            }
            prop_assert_eq!(store.size(), expected_pos);

            for (p, pos) in payloads.iter().zip(&positions) {
                let read = store.read(*pos).unwrap();
                prop_assert_eq!(&read[..], &p[..]);
            }
        }
    }
}
