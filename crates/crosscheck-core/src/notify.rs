//! In-process fan-out of run completion notices.

use tokio::sync::broadcast;
use tracing::debug;

use crate::models::CompletionNotice;

pub const DEFAULT_BUS_CAPACITY: usize = 64;

/// Something that wants to hear about finished runs.
pub trait NoticeSink: Send + Sync {
    fn publish(&self, notice: CompletionNotice);
}

/// Broadcast bus. Publishing never blocks and never fails; with no
/// subscribers the notice is dropped, and slow subscribers lag.
pub struct NotificationBus {
    tx: broadcast::Sender<CompletionNotice>,
}

impl NotificationBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CompletionNotice> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

impl NoticeSink for NotificationBus {
    fn publish(&self, notice: CompletionNotice) {
        let run_id = notice.run_id.clone();
        match self.tx.send(notice) {
            Ok(n) => debug!("Run {} notice delivered to {} subscribers", run_id, n),
            Err(_) => debug!("Run {} notice dropped: no subscribers", run_id),
        }
    }
}
