use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use super::instance::{Agent, AgentSetup};
use crate::messaging::{AgentId, MessageBus};
use crate::{AgoraError, Result};

/// Agent runtime manager
///
/// Starts agents on a shared bus and keeps them by identity until they are
/// stopped individually or the runtime shuts down.
pub struct AgentRuntime {
    agents: Arc<DashMap<AgentId, Arc<Agent>>>,
    bus: Arc<MessageBus>,
}

impl AgentRuntime {
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self {
            agents: Arc::new(DashMap::new()),
            bus,
        }
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    /// Create and start an Agent
    #[tracing::instrument(skip(self, setup), fields(agent = %identity))]
    pub async fn create_agent(
        &self,
        identity: AgentId,
        setup: impl AgentSetup + 'static,
    ) -> Result<Arc<Agent>> {
        let agent = Agent::new(identity, Arc::clone(&self.bus), setup);
        self.spawn(agent).await
    }

    /// Start an already constructed agent and track it
    pub async fn spawn(&self, agent: Agent) -> Result<Arc<Agent>> {
        let identity = agent.identity().clone();
        if self.agents.contains_key(&identity) {
            return Err(AgoraError::Agent(format!(
                "agent {} is already managed by this runtime",
                identity
            )));
        }

        agent.start().await?;
        let agent = Arc::new(agent);
        self.agents.insert(identity.clone(), Arc::clone(&agent));

        info!(target: "agent", agent = %identity, total = self.agents.len(), "Runtime spawned agent");
        Ok(agent)
    }

    /// Stop an agent and forget it
    #[tracing::instrument(skip(self), fields(agent = %identity))]
    pub async fn stop_agent(&self, identity: &AgentId) -> Result<()> {
        let (_, agent) = self
            .agents
            .remove(identity)
            .ok_or_else(|| AgoraError::Agent(format!("Agent {} not found", identity)))?;
        agent.stop().await;
        Ok(())
    }

    pub fn get(&self, identity: &AgentId) -> Option<Arc<Agent>> {
        self.agents.get(identity).map(|e| Arc::clone(e.value()))
    }

    pub fn agent_ids(&self) -> Vec<AgentId> {
        self.agents.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Stop every managed agent. Idempotent.
    pub async fn shutdown(&self) {
        info!(target: "agent", "Agent Runtime shutting down");

        let ids = self.agent_ids();
        for id in ids {
            if let Some((_, agent)) = self.agents.remove(&id) {
                agent.stop().await;
            }
        }
    }
}
