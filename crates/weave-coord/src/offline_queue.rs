//! Queue of work deferred while offline.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use weave_core::Result;

use crate::network::NetworkMonitor;

/// Processes one queued item.
#[async_trait]
pub trait QueueProcessor<T: Send>: Send + Sync {
    async fn process(&self, item: T) -> Result<()>;
}

/// FIFO of items collected while offline and flushed once online.
pub struct OfflineQueue<T> {
    items: Mutex<VecDeque<T>>,
    network: NetworkMonitor,
}

impl<T> OfflineQueue<T>
where
    T: Clone + Send,
{
    pub fn new(network: NetworkMonitor) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            network,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, item: T) {
        let mut items = self.lock();
        items.push_back(item);
        debug!(subsystem = "offline_queue", entry_count = items.len(), "Item queued");
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Items in queue order.
    pub fn snapshot(&self) -> Vec<T> {
        self.lock().iter().cloned().collect()
    }

    /// Process queued items in order while online.
    ///
    /// Returns the number processed. Does nothing while offline. On the
    /// first failure the failed item and every item after it go back to the
    /// front of the queue, ahead of anything queued meanwhile, and the error
    /// is returned.
    pub async fn process(&self, processor: &dyn QueueProcessor<T>) -> Result<usize> {
        if !self.network.is_online() {
            debug!(subsystem = "offline_queue", "Offline; queue processing skipped");
            return Ok(0);
        }

        let mut batch: VecDeque<T> = std::mem::take(&mut *self.lock());
        let mut processed = 0;

        while let Some(item) = batch.pop_front() {
            if let Err(err) = processor.process(item.clone()).await {
                batch.push_front(item);
                let remaining = batch.len();
                {
                    let mut items = self.lock();
                    while let Some(back) = batch.pop_back() {
                        items.push_front(back);
                    }
                }
                warn!(
                    subsystem = "offline_queue",
                    entry_count = remaining,
                    error = %err,
                    "Queue processing stopped; items requeued"
                );
                return Err(err);
            }
            processed += 1;
        }

        if processed > 0 {
            info!(subsystem = "offline_queue", entry_count = processed, "Offline queue flushed");
        }
        Ok(processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use weave_core::{ConnectionHints, Error, EventBus};

    struct Recorder {
        seen: Mutex<Vec<u32>>,
        fail_on: Option<u32>,
    }

    #[async_trait]
    impl QueueProcessor<u32> for Recorder {
        async fn process(&self, item: u32) -> Result<()> {
            if Some(item) == self.fail_on {
                return Err(Error::operation(format!("item {item} failed")));
            }
            self.seen.lock().unwrap().push(item);
            Ok(())
        }
    }

    fn queue(online: bool) -> (OfflineQueue<u32>, NetworkMonitor) {
        let bus = Arc::new(EventBus::default());
        let hints = if online {
            ConnectionHints::online()
        } else {
            ConnectionHints::offline()
        };
        let network = NetworkMonitor::new(hints, bus);
        (OfflineQueue::new(network.clone()), network)
    }

    #[tokio::test]
    async fn test_offline_processing_is_noop() {
        let (queue, _network) = queue(false);
        queue.push(1);
        let recorder = Recorder {
            seen: Mutex::new(Vec::new()),
            fail_on: None,
        };
        assert_eq!(queue.process(&recorder).await.unwrap(), 0);
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_processes_in_order_once_online() {
        let (queue, network) = queue(false);
        for i in 1..=3 {
            queue.push(i);
        }
        network.set_online(true);

        let recorder = Recorder {
            seen: Mutex::new(Vec::new()),
            fail_on: None,
        };
        assert_eq!(queue.process(&recorder).await.unwrap(), 3);
        assert_eq!(*recorder.seen.lock().unwrap(), vec![1, 2, 3]);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_failure_requeues_failed_and_remaining() {
        let (queue, _network) = queue(true);
        for i in 1..=4 {
            queue.push(i);
        }
        let recorder = Recorder {
            seen: Mutex::new(Vec::new()),
            fail_on: Some(2),
        };

        let err = queue.process(&recorder).await.unwrap_err();
        assert_eq!(err.to_string(), "item 2 failed");
        assert_eq!(*recorder.seen.lock().unwrap(), vec![1]);
        assert_eq!(queue.snapshot(), vec![2, 3, 4]);
    }
}
