//! Mock construction helpers

use imu_recorder::storage::{FsLogOpener, LogFile, LogOpener};
use imu_recorder::WakeLockBackend;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Wake lock that counts platform calls
#[derive(Debug, Clone, Default)]
pub struct CountingWakeLock {
    pub acquired: Arc<AtomicUsize>,
    pub released: Arc<AtomicUsize>,
    /// Refuse platform acquires while set
    pub fail_acquire: Arc<AtomicBool>,
}

impl CountingWakeLock {
    pub fn acquires(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn refuse_acquires(&self, refuse: bool) {
        self.fail_acquire.store(refuse, Ordering::SeqCst);
    }
}

impl WakeLockBackend for CountingWakeLock {
    fn acquire(&mut self, _tag: &str) -> imu_recorder::Result<()> {
        if self.fail_acquire.load(Ordering::SeqCst) {
            return Err(imu_recorder::RecorderError::Initialization(
                "wake lock unavailable".into(),
            ));
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release(&mut self, _tag: &str) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Faults to inject into session files
#[derive(Debug, Default)]
pub struct FaultPlan {
    /// Appends that fail before one succeeds again
    pub failing_appends: AtomicUsize,
    /// Failing appends write half the bytes first
    pub torn_writes: AtomicBool,
    /// Delay added to every sync (milliseconds)
    pub sync_delay_ms: AtomicU64,
    /// Appends that reached the file
    pub appends: AtomicUsize,
}

impl FaultPlan {
    pub fn fail_next_appends(&self, n: usize) {
        self.failing_appends.store(n, Ordering::SeqCst);
    }

    pub fn tear_writes(&self, torn: bool) {
        self.torn_writes.store(torn, Ordering::SeqCst);
    }

    pub fn delay_syncs(&self, delay: Duration) {
        self.sync_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

/// Filesystem opener whose files follow a [`FaultPlan`]
#[derive(Debug, Clone, Default)]
pub struct FlakyOpener {
    pub plan: Arc<FaultPlan>,
}

struct FlakyFile {
    inner: Box<dyn LogFile>,
    plan: Arc<FaultPlan>,
}

impl LogFile for FlakyFile {
    fn size(&self) -> io::Result<u64> {
        self.inner.size()
    }

    fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        let fail = self
            .plan
            .failing_appends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            if self.plan.torn_writes.load(Ordering::SeqCst) {
                self.inner.append(&bytes[..bytes.len() / 2])?;
            }
            return Err(io::Error::new(io::ErrorKind::Other, "injected write failure"));
        }
        self.plan.appends.fetch_add(1, Ordering::SeqCst);
        self.inner.append(bytes)
    }

    fn sync(&mut self) -> io::Result<()> {
        let delay = self.plan.sync_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        self.inner.sync()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.inner.truncate(len)
    }

    fn read_at(&mut self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        self.inner.read_at(offset, len)
    }
}

impl LogOpener for FlakyOpener {
    fn open(&self, path: &Path) -> io::Result<Box<dyn LogFile>> {
        Ok(Box::new(FlakyFile {
            inner: FsLogOpener.open(path)?,
            plan: Arc::clone(&self.plan),
        }))
    }
}
