//! The lock serializing flash programming against bus traffic.
//!
//! Programming flash stalls the execution-memory bus for both cores. The
//! save path holds this lock around erase and program; the lighting context
//! holds it around anything that would race an in-flight flash operation.
//! Nobody waits for it unboundedly: acquisition races a [`Deadline`] and the
//! caller defers on timeout.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::{Mutex, MutexGuard};

use crate::deadline::{bounded, Deadline, Elapsed};

/// Proof of holding the [`IoLock`]. Released on drop.
pub type IoGuard<'a, M> = MutexGuard<'a, M, ()>;

/// Cross-context lock around the shared bus/flash resource.
pub struct IoLock<M: RawMutex> {
    inner: Mutex<M, ()>,
}

impl<M: RawMutex> IoLock<M> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(()),
        }
    }

    /// Acquire the lock, giving up after `micros`.
    pub async fn acquire<D: Deadline>(
        &self,
        deadline: &D,
        micros: u32,
    ) -> Result<IoGuard<'_, M>, Elapsed> {
        bounded(deadline, micros, self.inner.lock()).await
    }

    /// Acquire the lock only if it is free right now.
    pub fn try_acquire(&self) -> Option<IoGuard<'_, M>> {
        self.inner.try_lock().ok()
    }
}

impl<M: RawMutex> Default for IoLock<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{block_on, ImmediateDeadline};
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    #[test]
    fn test_acquire_free_lock() {
        let lock = IoLock::<NoopRawMutex>::new();
        let guard = block_on(lock.acquire(&ImmediateDeadline, 100));
        assert!(guard.is_ok());
    }

    #[test]
    fn test_acquire_times_out_while_held() {
        let lock = IoLock::<NoopRawMutex>::new();
        let _held = lock.try_acquire().unwrap();
        assert!(lock.try_acquire().is_none());
        assert_eq!(block_on(lock.acquire(&ImmediateDeadline, 100)).err(), Some(Elapsed));
    }

    #[test]
    fn test_released_on_drop() {
        let lock = IoLock::<NoopRawMutex>::new();
        drop(lock.try_acquire().unwrap());
        assert!(lock.try_acquire().is_some());
    }
}
