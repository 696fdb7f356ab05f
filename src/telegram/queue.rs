use std::sync::{Mutex, MutexGuard};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{error, warn};

use super::InboundMessage;

/// Bounded FIFO between the fetch step and the dispatch step.
///
/// A full queue rejects the newest message instead of blocking the producer.
/// The capacity must be non-zero.
pub struct MessageQueue {
    tx: mpsc::Sender<InboundMessage>,
    rx: Mutex<mpsc::Receiver<InboundMessage>>,
}

impl MessageQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    fn receiver(&self) -> MutexGuard<'_, mpsc::Receiver<InboundMessage>> {
        self.rx.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns `false` and drops `msg` when the queue is full.
    pub fn push(&self, msg: InboundMessage) -> bool {
        match self.tx.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(msg)) => {
                warn!(
                    "Message queue is full ({}), dropping update {}",
                    self.capacity(),
                    msg.update_id
                );
                false
            }
            Err(TrySendError::Closed(msg)) => {
                error!("Message queue is closed, dropping update {}", msg.update_id);
                false
            }
        }
    }

    pub fn pop_nonblocking(&self) -> Option<InboundMessage> {
        self.receiver().try_recv().ok()
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}
