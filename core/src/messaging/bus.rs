// Message bus implementation
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::envelope::{AgentId, Envelope};
use crate::{AgoraError, Result};

/// Per-destination delivery statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageBusStats {
    pub total_sent: u64,
    pub total_delivered: u64,
    pub failed_deliveries: u64,
}

/// Point-to-point bus keyed by agent identity.
///
/// Each registered identity owns one unbounded mailbox, so `send` never blocks
/// the sender. Ordering between different senders is not guaranteed and a
/// consumed envelope is never redelivered.
#[derive(Default)]
pub struct MessageBus {
    // Identity -> mailbox sender
    mailboxes: Arc<DashMap<AgentId, mpsc::UnboundedSender<Envelope>>>,

    // Statistics keyed by destination; only identities that have registered
    // get an entry, and it outlives deregistration
    stats: Arc<DashMap<AgentId, MessageBusStats>>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `identity` and returns the receiving end of its mailbox.
    ///
    /// Fails if a live mailbox is already registered under the same identity.
    /// A stale registration (mailbox dropped without deregistering) is replaced.
    pub fn register(&self, identity: &AgentId) -> Result<Mailbox> {
        let (tx, rx) = mpsc::unbounded_channel();
        match self.mailboxes.entry(identity.clone()) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_closed() {
                    return Err(AgoraError::Agent(format!(
                        "identity {} is already registered",
                        identity
                    )));
                }
                occupied.insert(tx);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(tx);
            }
        }

        self.stats.entry(identity.clone()).or_default();

        info!(target: "bus", agent = %identity, "Registered mailbox");
        Ok(Mailbox {
            owner: identity.clone(),
            rx,
        })
    }

    /// Removes `identity` from the bus. Returns whether it was registered;
    /// deregistering an unknown identity is a no-op.
    pub fn deregister(&self, identity: &AgentId) -> bool {
        let removed = self.mailboxes.remove(identity).is_some();
        if removed {
            info!(target: "bus", agent = %identity, "Deregistered mailbox");
        }
        removed
    }

    pub fn is_registered(&self, identity: &AgentId) -> bool {
        self.mailboxes
            .get(identity)
            .map(|tx| !tx.is_closed())
            .unwrap_or(false)
    }

    /// Identities currently holding a mailbox
    pub fn identities(&self) -> Vec<AgentId> {
        self.mailboxes.iter().map(|e| e.key().clone()).collect()
    }

    /// Enqueue `envelope` into the destination mailbox.
    ///
    /// Fire-and-forget: returns as soon as the envelope is queued. Fails with
    /// [`AgoraError::Delivery`] when the destination is unknown or its mailbox
    /// has been dropped. The bus never retries.
    pub fn send(&self, envelope: Envelope) -> Result<()> {
        let to = envelope.to.clone();
        debug!(
            target: "bus",
            id = %envelope.id, from = %envelope.from, to = %to,
            performative = %envelope.performative,
            "Sending envelope"
        );
        self.update_stats(&to, |stats| stats.total_sent += 1);

        let delivered = match self.mailboxes.get(&to) {
            Some(tx) => tx.send(envelope).is_ok(),
            None => false,
        };

        if delivered {
            self.update_stats(&to, |stats| stats.total_delivered += 1);
            Ok(())
        } else {
            warn!(target: "bus", to = %to, "Delivery failed: destination unknown");
            self.update_stats(&to, |stats| stats.failed_deliveries += 1);
            Err(AgoraError::Delivery { to: to.to_string() })
        }
    }

    /// Delivery counters for an identity that has registered at least once
    pub fn stats(&self, identity: &AgentId) -> Option<MessageBusStats> {
        self.stats.get(identity).map(|s| s.clone())
    }

    // Destinations that never registered are not tracked
    fn update_stats<F>(&self, identity: &AgentId, f: F)
    where
        F: FnOnce(&mut MessageBusStats),
    {
        if let Some(mut stats) = self.stats.get_mut(identity) {
            f(stats.value_mut());
        }
    }
}

/// Receiving end of an agent's mailbox, handed out by [`MessageBus::register`].
#[derive(Debug)]
pub struct Mailbox {
    owner: AgentId,
    rx: mpsc::UnboundedReceiver<Envelope>,
}

impl Mailbox {
    pub fn owner(&self) -> &AgentId {
        &self.owner
    }

    /// Waits up to `timeout` for the next envelope.
    ///
    /// Returns `None` on timeout; that is the normal idle outcome, not an error.
    /// Also returns `None` once the bus side of the mailbox is gone.
    pub async fn receive(&mut self, timeout: Duration) -> Option<Envelope> {
        tokio::time::timeout(timeout, self.rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Waits without a deadline; `None` once the mailbox is closed.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    /// Takes an already queued envelope, if any, without waiting.
    pub fn try_receive(&mut self) -> Option<Envelope> {
        self.rx.try_recv().ok()
    }
}
