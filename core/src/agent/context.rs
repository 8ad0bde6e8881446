use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::behaviour::Behaviour;
use crate::messaging::{AgentId, Envelope, MessageBus};
use crate::Result;

/// Lifecycle state shared by an agent, its scheduler and its behaviours.
pub(crate) struct AgentControl {
    pub(crate) identity: AgentId,
    pub(crate) bus: Arc<MessageBus>,
    pub(crate) cancel: CancellationToken,
    pub(crate) alive: AtomicBool,
    pub(crate) stopped: AtomicBool,
    pub(crate) spawn_tx: mpsc::UnboundedSender<Behaviour>,
}

impl AgentControl {
    /// Flags the agent alive unless a stop got in first; a concurrent
    /// [`shutdown`](Self::shutdown) always leaves it not alive.
    pub(crate) fn mark_alive(&self) -> bool {
        self.alive.store(true, Ordering::SeqCst);
        if self.stopped.load(Ordering::SeqCst) {
            self.alive.store(false, Ordering::SeqCst);
            return false;
        }
        true
    }

    /// Cancel every behaviour and drop the bus registration.
    /// Returns false when the agent was already stopped.
    pub(crate) fn shutdown(&self) -> bool {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.alive.store(false, Ordering::SeqCst);
        self.cancel.cancel();
        self.bus.deregister(&self.identity);
        info!(target: "agent", agent = %self.identity, "Agent stopped");
        true
    }
}

/// Cloneable handle onto a running agent.
///
/// Handed to [`AgentSetup::setup`](super::AgentSetup::setup) and reachable from
/// every behaviour through its context.
#[derive(Clone)]
pub struct AgentHandle {
    pub(crate) control: Arc<AgentControl>,
}

impl AgentHandle {
    pub fn identity(&self) -> &AgentId {
        &self.control.identity
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.control.bus
    }

    pub fn is_alive(&self) -> bool {
        self.control.alive.load(Ordering::SeqCst)
    }

    /// Queues `behaviour` for the scheduler; it starts before the next
    /// scheduling round. Ignored once the agent has stopped.
    pub fn add_behaviour(&self, behaviour: Behaviour) {
        if self.control.stopped.load(Ordering::SeqCst) {
            debug!(
                target: "agent", agent = %self.control.identity, behaviour = %behaviour.name,
                "Agent stopped; behaviour discarded"
            );
            return;
        }
        if self.control.spawn_tx.send(behaviour).is_err() {
            debug!(target: "agent", agent = %self.control.identity, "Scheduler gone; behaviour discarded");
        }
    }

    /// Stops the agent without waiting for its behaviours to unwind.
    /// Safe to call from inside a behaviour; idempotent.
    pub fn stop(&self) {
        self.control.shutdown();
    }

    pub(crate) fn cancellation_token(&self) -> CancellationToken {
        self.control.cancel.clone()
    }
}

/// Everything a running behaviour can touch: its identity, the bus, its own
/// inbox, and the owning agent.
pub struct BehaviourContext {
    agent: AgentHandle,
    behaviour: String,
    inbox: Option<mpsc::UnboundedReceiver<Envelope>>,
    cancel: CancellationToken,
}

impl BehaviourContext {
    pub(crate) fn new(
        agent: AgentHandle,
        behaviour: String,
        inbox: Option<mpsc::UnboundedReceiver<Envelope>>,
    ) -> Self {
        let cancel = agent.cancellation_token();
        Self {
            agent,
            behaviour,
            inbox,
            cancel,
        }
    }

    pub fn identity(&self) -> &AgentId {
        self.agent.identity()
    }

    pub fn behaviour_name(&self) -> &str {
        &self.behaviour
    }

    pub fn agent(&self) -> &AgentHandle {
        &self.agent
    }

    /// Sends through the bus. Fire-and-forget; errors only on unknown
    /// destinations.
    pub fn send(&self, envelope: Envelope) -> Result<()> {
        self.agent.bus().send(envelope)
    }

    /// Waits up to `timeout` for the next envelope routed to this behaviour.
    ///
    /// `None` on timeout, and immediately `None` once the agent is stopped.
    /// A behaviour without a template has no inbox and simply waits out the
    /// timeout.
    pub async fn receive(&mut self, timeout: Duration) -> Option<Envelope> {
        let Some(inbox) = self.inbox.as_mut() else {
            self.sleep(timeout).await;
            return None;
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            res = tokio::time::timeout(timeout, inbox.recv()) => res.ok().flatten(),
        }
    }

    /// Sleeps for `duration`. Returns false when cut short by agent stop.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    pub fn add_behaviour(&self, behaviour: Behaviour) {
        self.agent.add_behaviour(behaviour);
    }

    /// Stops the owning agent from inside one of its behaviours.
    pub fn stop_agent(&self) {
        self.agent.stop();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
