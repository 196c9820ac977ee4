use std::sync::Arc;

use tokio::sync::watch;

/// Monotonic counter bumped by every local mutation and completed sync pass.
///
/// Consumers hold a receiver from [`Revision::subscribe`] and re-query the
/// local store whenever it changes.
#[derive(Debug, Clone)]
pub struct Revision {
    sender: Arc<watch::Sender<u64>>,
}

impl Revision {
    pub fn new() -> Self {
        let (sender, _receiver) = watch::channel(0);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Increment the counter and return the new value.
    pub fn bump(&self) -> u64 {
        let mut next = 0;
        self.sender.send_modify(|value| {
            *value += 1;
            next = *value;
        });
        tracing::trace!("Revision bumped to {next}");
        next
    }

    pub fn current(&self) -> u64 {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.sender.subscribe()
    }
}

impl Default for Revision {
    fn default() -> Self {
        Self::new()
    }
}
