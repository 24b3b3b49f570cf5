//! Test-only `LockDb` wrapper that fails on demand.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::utils::LocksmithError;
use crate::lockdb::{LockDb, LockDbKind, LeaseRecord, MemDb};

use async_trait::async_trait;

/// Wraps a `MemDb`, optionally failing every write or the dispose.
pub(crate) struct FlakyDb {
    inner: MemDb,
    fail_puts: bool,
    dispose_err: Option<String>,

    /// Set once `dispose()` has been called, whatever its outcome.
    disposed: Arc<AtomicBool>,
}

impl FlakyDb {
    pub(crate) fn new(inner: MemDb) -> Self {
        FlakyDb {
            inner,
            fail_puts: false,
            dispose_err: None,
            disposed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn failing_puts(mut self) -> Self {
        self.fail_puts = true;
        self
    }

    pub(crate) fn failing_dispose(mut self, err: &str) -> Self {
        self.dispose_err = Some(err.into());
        self
    }

    pub(crate) fn disposed_flag(&self) -> Arc<AtomicBool> {
        self.disposed.clone()
    }

    fn check_put(&self, key: &str) -> Result<(), LocksmithError> {
        if self.fail_puts {
            Err(LocksmithError::msg(format!("injected put failure on '{}'", key)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl LockDb for FlakyDb {
    fn kind(&self) -> LockDbKind {
        self.inner.kind()
    }

    async fn dispose(&mut self) -> Result<(), LocksmithError> {
        self.disposed.store(true, Ordering::SeqCst);
        match self.dispose_err {
            Some(ref err) => Err(LocksmithError::msg(err.clone())),
            None => self.inner.dispose().await,
        }
    }

    fn get(&self, key: &str) -> Result<String, LocksmithError> {
        self.inner.get(key)
    }

    async fn put(
        &mut self,
        key: &str,
        value: String,
        overwrite: bool,
    ) -> Result<(), LocksmithError> {
        self.check_put(key)?;
        self.inner.put(key, value, overwrite).await
    }

    fn get_lease(&self, key: &str) -> Result<LeaseRecord, LocksmithError> {
        self.inner.get_lease(key)
    }

    async fn put_lease(
        &mut self,
        key: &str,
        lease: LeaseRecord,
        overwrite: bool,
    ) -> Result<(), LocksmithError> {
        self.check_put(key)?;
        self.inner.put_lease(key, lease, overwrite).await
    }

    fn seek_to_first(&mut self) {
        self.inner.seek_to_first();
    }

    fn valid(&self) -> bool {
        self.inner.valid()
    }

    fn next(&mut self) {
        self.inner.next();
    }

    fn get_current(&self) -> Result<(String, LeaseRecord), LocksmithError> {
        self.inner.get_current()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}
