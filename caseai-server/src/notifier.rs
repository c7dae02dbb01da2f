//! Change Notifier
//!
//! In-process pub/sub keyed by [`ChannelName`]. A hint only says "session X
//! has something new"; subscribers always re-query the store for content.
//!
//! The hub never touches the database pool. Each listener is an RAII handle:
//! dropping the last listener of a channel unregisters the channel.

use caseai_common::ChannelName;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::broadcast;
use tracing::debug;

/// Change signal published after a message is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeHint {
    pub message_id: i64,
}

/// Why a listener stopped receiving hints
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ListenError {
    /// Listener fell behind and missed `n` hints; re-query to catch up
    #[error("listener lagged by {0} hints")]
    Lagged(u64),
    /// Channel was closed; listen again
    #[error("channel closed")]
    Closed,
}

struct Channel {
    generation: u64,
    tx: broadcast::Sender<ChangeHint>,
}

#[derive(Default)]
struct Registry {
    channels: HashMap<ChannelName, Channel>,
    next_generation: u64,
}

/// Pub/sub hub for per-session change hints
pub struct ChangeNotifier {
    registry: Mutex<Registry>,
    capacity: usize,
}

impl ChangeNotifier {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            registry: Mutex::new(Registry::default()),
            capacity: capacity.max(1),
        })
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        // Registry updates are single map operations; a poisoned lock still holds a consistent map
        self.registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Subscribe to a channel, creating it if needed
    pub fn listen(self: &Arc<Self>, channel: &ChannelName) -> ChannelListener {
        let mut registry = self.registry();
        let generation = registry.next_generation;
        let entry = registry.channels.entry(channel.clone()).or_insert_with(|| {
            debug!("Notifier: LISTEN {}", channel);
            Channel {
                generation,
                tx: broadcast::channel(self.capacity).0,
            }
        });
        let rx = entry.tx.subscribe();
        let generation = entry.generation;
        registry.next_generation += 1;

        ChannelListener {
            channel: channel.clone(),
            generation,
            rx,
            hub: Arc::downgrade(self),
        }
    }

    /// Publish a hint; returns the number of listeners reached
    pub fn notify(&self, channel: &ChannelName, hint: ChangeHint) -> usize {
        let registry = self.registry();
        match registry.channels.get(channel) {
            Some(entry) => entry.tx.send(hint).unwrap_or(0),
            None => 0,
        }
    }

    /// Drop a channel; its listeners observe [`ListenError::Closed`]
    pub fn close(&self, channel: &ChannelName) -> bool {
        let removed = self.registry().channels.remove(channel).is_some();
        if removed {
            debug!("Notifier: closed {}", channel);
        }
        removed
    }

    /// Number of channels with at least one registered listener
    pub fn active_channels(&self) -> usize {
        self.registry().channels.len()
    }

    pub fn listener_count(&self, channel: &ChannelName) -> usize {
        self.registry()
            .channels
            .get(channel)
            .map(|entry| entry.tx.receiver_count())
            .unwrap_or(0)
    }

    fn release(&self, channel: &ChannelName, generation: u64) {
        let mut registry = self.registry();
        let last = matches!(
            registry.channels.get(channel),
            Some(entry) if entry.generation == generation && entry.tx.receiver_count() <= 1
        );
        if last {
            registry.channels.remove(channel);
            debug!("Notifier: UNLISTEN {}", channel);
        }
    }
}

/// Subscription handle; dropping it unregisters from the hub
pub struct ChannelListener {
    channel: ChannelName,
    generation: u64,
    rx: broadcast::Receiver<ChangeHint>,
    hub: Weak<ChangeNotifier>,
}

impl ChannelListener {
    pub fn channel(&self) -> &ChannelName {
        &self.channel
    }

    /// Wait for the next hint
    pub async fn recv(&mut self) -> Result<ChangeHint, ListenError> {
        match self.rx.recv().await {
            Ok(hint) => Ok(hint),
            Err(broadcast::error::RecvError::Lagged(n)) => Err(ListenError::Lagged(n)),
            Err(broadcast::error::RecvError::Closed) => Err(ListenError::Closed),
        }
    }
}

impl Drop for ChannelListener {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.release(&self.channel, self.generation);
        }
    }
}
