use super::{RemoteObject, RemoteStore, RemoteStream};
use crate::error::{Error, Result};
use backon::{BlockingRetryable, ConstantBuilder};
use std::time::Duration;

/// Retries the stateless store calls (list, stat, open) on transient failures. Reads on an
/// open stream are not retried here, a failed read drops the stream and the handle reopens.
pub struct Retrying<S> {
    inner: S,
    retries: usize,
    delay: Duration,
}

impl<S: RemoteStore> Retrying<S> {
    pub fn new(inner: S, retries: usize, delay: Duration) -> Self {
        Self { inner, retries, delay }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn retry<T, F>(&self, what: &str, op: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let backoff = ConstantBuilder::default()
            .with_delay(self.delay)
            .with_max_times(self.retries);
        op.retry(backoff)
            .sleep(std::thread::sleep)
            .when(Error::is_transient)
            .notify(|e: &Error, d: Duration| log::warn!("{} failed, retry in {:?}: {}", what, d, e))
            .call()
    }
}

impl<S: RemoteStore> RemoteStore for Retrying<S> {
    fn list(&self) -> Result<Vec<RemoteObject>> {
        self.retry("list", || self.inner.list())
    }

    fn stat(&self, path: &str) -> Result<RemoteObject> {
        self.retry("stat", || self.inner.stat(path))
    }

    fn open_at(&self, obj: &RemoteObject, offset: u64) -> Result<Box<dyn RemoteStream>> {
        self.retry("open", || self.inner.open_at(obj, offset))
    }
}
