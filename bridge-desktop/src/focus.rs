//! Process-wide audio focus broker.
//!
//! Focus is held as a stack. A long-lived (`Media`) request evicts the current
//! holder with `Loss`; a transient request suspends it with `TransientLoss`
//! or `TransientLossDuck` and hands focus back with `Gain` once the transient
//! holder abandons.

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    focus::{AudioFocusArbitrator, FocusChange, FocusChangeSender, FocusGrant, FocusUsage},
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

struct Holder {
    client: u64,
    usage: FocusUsage,
    on_change: FocusChangeSender,
}

#[derive(Default)]
struct BrokerState {
    /// Top of stack is the current holder.
    stack: Vec<Holder>,
    /// Refuse all requests (e.g. during a call).
    locked: bool,
}

/// Arbitrates focus between the [`FocusClient`]s it hands out.
#[derive(Clone, Default)]
pub struct FocusBroker {
    state: Arc<Mutex<BrokerState>>,
    next_client: Arc<AtomicU64>,
}

impl FocusBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new focus client bound to this broker.
    pub fn client(&self) -> FocusClient {
        FocusClient {
            id: self.next_client.fetch_add(1, Ordering::Relaxed),
            broker: self.clone(),
        }
    }

    /// While locked every request is denied. Current holders keep focus.
    pub fn set_locked(&self, locked: bool) {
        self.state.lock().locked = locked;
    }

    /// Client id of the current holder.
    pub fn holder(&self) -> Option<u64> {
        self.state.lock().stack.last().map(|holder| holder.client)
    }

    fn request(&self, client: u64, usage: FocusUsage, on_change: FocusChangeSender) -> FocusGrant {
        let mut state = self.state.lock();
        if state.locked {
            debug!(client, ?usage, "Focus denied: broker locked");
            return FocusGrant::Denied;
        }

        if let Some(position) = state.stack.iter().position(|h| h.client == client) {
            if position + 1 == state.stack.len() {
                // Already on top: refresh the listener only.
                let top = &mut state.stack[position];
                top.usage = usage;
                top.on_change = on_change;
                return FocusGrant::Granted;
            }
            state.stack.remove(position);
        }

        let displaced = match usage {
            FocusUsage::Media => FocusChange::Loss,
            FocusUsage::Transient => FocusChange::TransientLoss,
            FocusUsage::TransientMayDuck => FocusChange::TransientLossDuck,
        };
        if let Some(top) = state.stack.last() {
            info!(from = top.client, to = client, change = ?displaced, "Focus moved");
            let _ = top.on_change.send(displaced);
        }
        if displaced == FocusChange::Loss {
            state.stack.clear();
        }

        state.stack.push(Holder {
            client,
            usage,
            on_change,
        });
        FocusGrant::Granted
    }

    fn abandon(&self, client: u64) {
        let mut state = self.state.lock();
        let Some(position) = state.stack.iter().position(|h| h.client == client) else {
            return;
        };
        let was_top = position + 1 == state.stack.len();
        let removed = state.stack.remove(position);
        debug!(client, usage = ?removed.usage, "Focus abandoned");

        if was_top {
            if let Some(next) = state.stack.last() {
                info!(client = next.client, "Focus regained");
                let _ = next.on_change.send(FocusChange::Gain);
            }
        }
    }
}

/// One participant in focus arbitration.
pub struct FocusClient {
    id: u64,
    broker: FocusBroker,
}

impl FocusClient {
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[async_trait]
impl AudioFocusArbitrator for FocusClient {
    async fn request(
        &self,
        usage: FocusUsage,
        on_change: FocusChangeSender,
    ) -> Result<FocusGrant> {
        Ok(self.broker.request(self.id, usage, on_change))
    }

    async fn abandon(&self) -> Result<()> {
        self.broker.abandon(self.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_async::sync::mpsc;

    #[tokio::test]
    async fn transient_request_suspends_and_restores_holder() {
        let broker = FocusBroker::new();
        let music = broker.client();
        let nav = broker.client();
        let (music_tx, mut music_rx) = mpsc::unbounded_channel();
        let (nav_tx, _nav_rx) = mpsc::unbounded_channel();

        assert!(music.request(FocusUsage::Media, music_tx).await.unwrap().is_granted());
        assert!(nav.request(FocusUsage::Transient, nav_tx).await.unwrap().is_granted());
        assert_eq!(music_rx.recv().await, Some(FocusChange::TransientLoss));
        assert_eq!(broker.holder(), Some(nav.id()));

        nav.abandon().await.unwrap();
        assert_eq!(music_rx.recv().await, Some(FocusChange::Gain));
        assert_eq!(broker.holder(), Some(music.id()));
    }

    #[tokio::test]
    async fn media_request_evicts_holder() {
        let broker = FocusBroker::new();
        let first = broker.client();
        let second = broker.client();
        let (first_tx, mut first_rx) = mpsc::unbounded_channel();
        let (second_tx, _second_rx) = mpsc::unbounded_channel();

        first.request(FocusUsage::Media, first_tx).await.unwrap();
        second.request(FocusUsage::Media, second_tx).await.unwrap();
        assert_eq!(first_rx.recv().await, Some(FocusChange::Loss));

        second.abandon().await.unwrap();
        assert_eq!(broker.holder(), None);
        assert!(first_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn duck_request_sends_duck() {
        let broker = FocusBroker::new();
        let music = broker.client();
        let prompt = broker.client();
        let (music_tx, mut music_rx) = mpsc::unbounded_channel();
        let (prompt_tx, _prompt_rx) = mpsc::unbounded_channel();

        music.request(FocusUsage::Media, music_tx).await.unwrap();
        prompt
            .request(FocusUsage::TransientMayDuck, prompt_tx)
            .await
            .unwrap();
        assert_eq!(music_rx.recv().await, Some(FocusChange::TransientLossDuck));
    }

    #[tokio::test]
    async fn locked_broker_denies() {
        let broker = FocusBroker::new();
        broker.set_locked(true);
        let client = broker.client();
        let (tx, _rx) = mpsc::unbounded_channel();
        assert_eq!(
            client.request(FocusUsage::Media, tx).await.unwrap(),
            FocusGrant::Denied
        );
    }
}
