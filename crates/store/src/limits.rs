use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchConcurrencySnapshot {
    pub limit: usize,
    pub in_flight: usize,
    pub waiters: usize,
}

/// Bounds how many ledger-heavy tasks run at once. Cloning shares the same budget.
#[derive(Clone, Debug)]
pub struct FetchLimiter {
    inner: Arc<LimiterInner>,
}

#[derive(Debug)]
struct LimiterInner {
    limit: usize,
    semaphore: Arc<Semaphore>,
    in_flight: AtomicUsize,
    waiters: AtomicUsize,
}

pub struct FetchPermit {
    inner: Arc<LimiterInner>,
    _permit: OwnedSemaphorePermit,
}

impl Drop for FetchPermit {
    fn drop(&mut self) {
        self.inner.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

struct WaiterGuard<'a>(&'a AtomicUsize);

impl<'a> WaiterGuard<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

impl FetchLimiter {
    #[must_use]
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            inner: Arc::new(LimiterInner {
                limit,
                semaphore: Arc::new(Semaphore::new(limit)),
                in_flight: AtomicUsize::new(0),
                waiters: AtomicUsize::new(0),
            }),
        }
    }

    pub async fn acquire(&self) -> FetchPermit {
        // The semaphore is never closed; acquire failures are not expected.
        let waiter = WaiterGuard::new(&self.inner.waiters);
        let permit = self
            .inner
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .unwrap_or_else(|_| unreachable!("fetch semaphore closed"));
        drop(waiter);
        self.inner.in_flight.fetch_add(1, Ordering::Relaxed);
        FetchPermit {
            inner: self.inner.clone(),
            _permit: permit,
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> FetchConcurrencySnapshot {
        FetchConcurrencySnapshot {
            limit: self.inner.limit,
            in_flight: self.inner.in_flight.load(Ordering::Relaxed),
            waiters: self.inner.waiters.load(Ordering::Relaxed),
        }
    }
}
