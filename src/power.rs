//! Keep-awake power lease
//!
//! [`PowerLease`] is an exclusive, non-reference-counted hold that keeps the
//! host processor awake while a session records. The platform mechanism
//! sits behind [`WakeLockBackend`]; the default backend only logs.
//!
//! Acquiring a held lease is a no-op and releasing a released lease is a
//! no-op. While an external collaborator asserts keep-awake (for instance a
//! pending upload), a release is recorded as pending and carried out once
//! the keep-awake condition clears.
//!
//! [`LeaseGuard`] ties the hold to a scope: dropping the guard releases the
//! lease on every exit path.

use crate::error::Result;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Tag reported to the platform wake-lock facility
pub const WAKE_LOCK_TAG: &str = "imu-recorder::SensorWakeLock";

/// Platform hook that actually keeps the processor awake
#[cfg_attr(test, mockall::automock)]
pub trait WakeLockBackend: Send {
    fn acquire(&mut self, tag: &str) -> Result<()>;
    fn release(&mut self, tag: &str);
}

/// Backend for hosts without a wake-lock facility
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingWakeLock;

impl WakeLockBackend for LoggingWakeLock {
    fn acquire(&mut self, tag: &str) -> Result<()> {
        tracing::debug!(tag, "Wake lock acquired");
        Ok(())
    }

    fn release(&mut self, tag: &str) {
        tracing::debug!(tag, "Wake lock released");
    }
}

/// Observable lease state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseState {
    Released,
    Held,
    /// Release requested while keep-awake is asserted
    ReleasePending,
}

struct LeaseInner {
    backend: Box<dyn WakeLockBackend>,
    held: bool,
    keep_awake: bool,
    release_pending: bool,
}

impl LeaseInner {
    fn release_now(&mut self) {
        self.backend.release(WAKE_LOCK_TAG);
        self.held = false;
        self.release_pending = false;
        tracing::info!("Power lease released");
    }
}

/// Shared handle to the process-wide power lease
#[derive(Clone)]
pub struct PowerLease {
    inner: Arc<Mutex<LeaseInner>>,
}

impl std::fmt::Debug for PowerLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PowerLease")
            .field("state", &self.state())
            .field("keep_awake", &self.keep_awake())
            .finish()
    }
}

impl Default for PowerLease {
    fn default() -> Self {
        Self::new(Box::new(LoggingWakeLock))
    }
}

impl PowerLease {
    pub fn new(backend: Box<dyn WakeLockBackend>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LeaseInner {
                backend,
                held: false,
                keep_awake: false,
                release_pending: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LeaseInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the hold; a no-op if it is already held
    ///
    /// Cancels a pending deferred release.
    pub fn acquire(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.held {
            if inner.release_pending {
                tracing::debug!("Pending power lease release cancelled");
                inner.release_pending = false;
            }
            return Ok(());
        }
        inner.backend.acquire(WAKE_LOCK_TAG)?;
        inner.held = true;
        tracing::info!("Power lease acquired");
        Ok(())
    }

    /// Take the hold and return a guard that releases it on drop
    pub fn acquire_guard(&self) -> Result<LeaseGuard> {
        self.acquire()?;
        Ok(LeaseGuard {
            lease: Some(self.clone()),
        })
    }

    /// Drop the hold, or defer it while keep-awake is asserted
    pub fn release(&self) {
        let mut inner = self.lock();
        if !inner.held {
            return;
        }
        if inner.keep_awake {
            if !inner.release_pending {
                tracing::info!("Power lease maintained while keep-awake is asserted");
            }
            inner.release_pending = true;
            return;
        }
        inner.release_now();
    }

    /// Assert or clear the external keep-awake condition
    ///
    /// Clearing it performs any release that was deferred.
    pub fn set_keep_awake(&self, active: bool) {
        let mut inner = self.lock();
        inner.keep_awake = active;
        tracing::debug!(active, "Keep-awake condition updated");
        if !active && inner.held && inner.release_pending {
            inner.release_now();
        }
    }

    pub fn keep_awake(&self) -> bool {
        self.lock().keep_awake
    }

    pub fn is_held(&self) -> bool {
        self.lock().held
    }

    pub fn state(&self) -> LeaseState {
        let inner = self.lock();
        match (inner.held, inner.release_pending) {
            (false, _) => LeaseState::Released,
            (true, false) => LeaseState::Held,
            (true, true) => LeaseState::ReleasePending,
        }
    }
}

/// Scoped hold on a [`PowerLease`]
#[derive(Debug)]
pub struct LeaseGuard {
    lease: Option<PowerLease>,
}

impl LeaseGuard {
    /// Re-take the hold, cancelling any pending release
    pub fn reassert(&self) -> Result<()> {
        match &self.lease {
            Some(lease) => lease.acquire(),
            None => Ok(()),
        }
    }

    /// Release now instead of at drop
    pub fn release(mut self) {
        if let Some(lease) = self.lease.take() {
            lease.release();
        }
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if let Some(lease) = self.lease.take() {
            lease.release();
        }
    }
}
