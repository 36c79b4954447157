pub mod migrations;
pub mod models;
pub mod queries;

use anyhow::Result;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_READERS: usize = 4;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite access through a bounded pool: one writer plus a fixed set of
/// read-only connections. Callers beyond the pool size queue on the
/// connection mutexes; the queue depth is observable through [`PoolStats`].
pub struct Database {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    reader_idx: AtomicUsize,
    queued: AtomicUsize,
    in_flight: AtomicUsize,
    round_trips: AtomicU64,
}

/// Point-in-time snapshot of pool usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub readers: usize,
    pub queued: usize,
    pub in_flight: usize,
    pub round_trips: u64,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_readers(path, DEFAULT_READERS)
    }

    pub fn open_with_readers(path: &Path, readers: usize) -> Result<Self> {
        let writer = Connection::open(path)?;

        // WAL mode so readers never block the writer
        writer.pragma_update(None, "journal_mode", "WAL")?;
        writer.pragma_update(None, "foreign_keys", "ON")?;
        writer.busy_timeout(BUSY_TIMEOUT)?;

        migrations::run(&writer)?;

        let reader_count = readers.max(1);
        let mut pool = Vec::with_capacity(reader_count);
        for _ in 0..reader_count {
            let conn = Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            conn.busy_timeout(BUSY_TIMEOUT)?;
            pool.push(Mutex::new(conn));
        }

        info!(
            "Database opened at {} (1 writer + {} readers)",
            path.display(),
            reader_count
        );
        Ok(Self {
            writer: Mutex::new(writer),
            readers: pool,
            reader_idx: AtomicUsize::new(0),
            queued: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            round_trips: AtomicU64::new(0),
        })
    }

    /// Run a read-only operation on a pooled reader connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let start = self.reader_idx.fetch_add(1, Ordering::Relaxed) % self.readers.len();

        // Take the first idle reader, otherwise queue on the round-robin pick.
        for offset in 0..self.readers.len() {
            let idx = (start + offset) % self.readers.len();
            match self.readers[idx].try_lock() {
                Ok(conn) => return self.run(conn, f),
                Err(TryLockError::WouldBlock) => continue,
                Err(TryLockError::Poisoned(e)) => {
                    return Err(anyhow::anyhow!("Reader lock poisoned: {}", e));
                }
            }
        }

        let conn = self.queue_for(&self.readers[start], "Reader")?;
        self.run(conn, f)
    }

    /// Run a write operation on the single writer connection.
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = match self.writer.try_lock() {
            Ok(conn) => conn,
            Err(TryLockError::WouldBlock) => self.queue_for(&self.writer, "Writer")?,
            Err(TryLockError::Poisoned(e)) => {
                return Err(anyhow::anyhow!("Writer lock poisoned: {}", e));
            }
        };
        self.run(conn, f)
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            readers: self.readers.len(),
            queued: self.queued.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            round_trips: self.round_trips.load(Ordering::Relaxed),
        }
    }

    fn queue_for<'a>(
        &self,
        slot: &'a Mutex<Connection>,
        role: &str,
    ) -> Result<MutexGuard<'a, Connection>> {
        let depth = self.queued.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("{} pool saturated, queue depth {}", role, depth);
        let guard = slot.lock();
        self.queued.fetch_sub(1, Ordering::Relaxed);
        guard.map_err(|e| anyhow::anyhow!("{} lock poisoned: {}", role, e))
    }

    fn run<F, T>(&self, conn: MutexGuard<'_, Connection>, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        self.round_trips.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        let result = f(&conn);
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
        result
    }
}

/// Current wall-clock time in unix milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
