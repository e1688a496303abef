//! Execution slot pool shared by every connection
//!
//! Handler invocations run only while holding a slot. When all slots are
//! busy an invocation waits for one (admission is deferred, the request is
//! not dropped). An optional queue limit turns waiting into rejection once
//! too many invocations are already queued.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::HandlerError;
use crate::server::probe::Probe;

/// Bounded pool of handler execution slots
#[derive(Debug)]
pub struct ExecutionSlots {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    waiting: Arc<AtomicUsize>,
    queue_limit: Option<usize>,
}

impl ExecutionSlots {
    pub fn new(capacity: usize, queue_limit: Option<usize>) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            waiting: Arc::new(AtomicUsize::new(0)),
            queue_limit,
        }
    }

    /// Take a slot, waiting if none is free.
    ///
    /// Reports a deferral to `probe` before waiting. Fails with
    /// [`HandlerError::ResourceExhausted`] when the wait queue is full.
    pub async fn acquire(&self, probe: &dyn Probe) -> Result<SlotPermit, HandlerError> {
        if let Ok(permit) = self.semaphore.clone().try_acquire_owned() {
            return Ok(SlotPermit {
                _permit: permit,
                deferred: false,
            });
        }

        let limit = self.queue_limit;
        self.waiting
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |waiting| {
                match limit {
                    Some(limit) if waiting >= limit => None,
                    _ => Some(waiting + 1),
                }
            })
            .map_err(|waiting| {
                HandlerError::exhausted(format!(
                    "all {} execution slots busy and {} invocations queued",
                    self.capacity, waiting
                ))
            })?;
        let _queued = QueuedGuard(self.waiting.clone());

        probe.admission_deferred();
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| HandlerError::exhausted("execution slots closed"))?;
        Ok(SlotPermit {
            _permit: permit,
            deferred: true,
        })
    }

}

/// Decrements the wait count even when the waiting future is cancelled
struct QueuedGuard(Arc<AtomicUsize>);

impl Drop for QueuedGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A held execution slot. Released on drop.
#[derive(Debug)]
pub struct SlotPermit {
    _permit: OwnedSemaphorePermit,
    deferred: bool,
}

impl SlotPermit {
    /// Whether this invocation had to wait for its slot
    pub fn was_deferred(&self) -> bool {
        self.deferred
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::probe::ServerProbe;
    use futures_util::FutureExt;
    use std::time::Duration;

    #[tokio::test]
    async fn test_immediate_admission() {
        let slots = ExecutionSlots::new(2, None);
        let probe = ServerProbe::new();
        let a = slots.acquire(&probe).await.unwrap();
        let b = slots.acquire(&probe).await.unwrap();
        assert!(!a.was_deferred());
        assert!(!b.was_deferred());
        assert_eq!(probe.snapshot().admission_deferred, 0);

        // Pool is full
        assert!(slots.acquire(&probe).now_or_never().is_none());
    }

    #[tokio::test]
    async fn test_busy_pool_defers_instead_of_failing() {
        let slots = Arc::new(ExecutionSlots::new(1, None));
        let probe = Arc::new(ServerProbe::new());
        let held = slots.acquire(&*probe).await.unwrap();

        let waiter = {
            let slots = slots.clone();
            let probe = probe.clone();
            tokio::spawn(async move { slots.acquire(&*probe).await.map(|p| p.was_deferred()) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        assert_eq!(probe.snapshot().admission_deferred, 1);

        drop(held);
        assert!(waiter.await.unwrap().unwrap());
    }

    #[tokio::test]
    async fn test_queue_limit_rejects() {
        let slots = ExecutionSlots::new(1, Some(0));
        let probe = ServerProbe::new();
        let _held = slots.acquire(&probe).await.unwrap();

        let err = slots.acquire(&probe).await.unwrap_err();
        assert!(matches!(err, HandlerError::ResourceExhausted(_)));
        assert_eq!(probe.snapshot().admission_deferred, 0);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_leaves_queue() {
        let slots = ExecutionSlots::new(1, Some(1));
        let probe = ServerProbe::new();
        let _held = slots.acquire(&probe).await.unwrap();

        let timed_out =
            tokio::time::timeout(Duration::from_millis(10), slots.acquire(&probe)).await;
        assert!(timed_out.is_err());

        // The queue has room again, so the next caller waits rather than failing
        let timed_out =
            tokio::time::timeout(Duration::from_millis(10), slots.acquire(&probe)).await;
        assert!(timed_out.is_err());
        assert_eq!(probe.snapshot().admission_deferred, 2);
    }
}
