use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::behaviour::Behaviour;
use super::context::{AgentControl, AgentHandle};
use super::scheduler::Scheduler;
use crate::messaging::{AgentId, MessageBus};
use crate::{AgoraError, Result};

/// Agent-specific initialisation, run once by [`Agent::start`].
///
/// Implementations register their initial behaviours through the handle.
#[async_trait]
pub trait AgentSetup: Send {
    async fn setup(&mut self, agent: &AgentHandle) -> Result<()>;
}

/// Agent instance
///
/// Owns an identity on the bus and the behaviours registered for it. Agents are
/// single-use: once stopped they cannot be started again.
pub struct Agent {
    handle: AgentHandle,
    setup: Mutex<Option<Box<dyn AgentSetup>>>,
    pending: Mutex<Option<mpsc::UnboundedReceiver<Behaviour>>>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

impl Agent {
    pub fn new(
        identity: impl Into<AgentId>,
        bus: Arc<MessageBus>,
        setup: impl AgentSetup + 'static,
    ) -> Self {
        let (spawn_tx, spawn_rx) = mpsc::unbounded_channel();
        let control = AgentControl {
            identity: identity.into(),
            bus,
            cancel: CancellationToken::new(),
            alive: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            spawn_tx,
        };

        Self {
            handle: AgentHandle {
                control: Arc::new(control),
            },
            setup: Mutex::new(Some(Box::new(setup))),
            pending: Mutex::new(Some(spawn_rx)),
            scheduler: Mutex::new(None),
        }
    }

    pub fn identity(&self) -> &AgentId {
        self.handle.identity()
    }

    pub fn handle(&self) -> AgentHandle {
        self.handle.clone()
    }

    pub fn is_alive(&self) -> bool {
        self.handle.is_alive()
    }

    /// Queues a behaviour; see [`AgentHandle::add_behaviour`].
    pub fn add_behaviour(&self, behaviour: Behaviour) {
        self.handle.add_behaviour(behaviour);
    }

    /// Registers the identity with the bus, runs the setup hook, then launches
    /// the scheduler.
    #[tracing::instrument(skip(self), fields(agent = %self.identity()))]
    pub async fn start(&self) -> Result<()> {
        let control = &self.handle.control;
        if control.stopped.load(Ordering::SeqCst) {
            return Err(AgoraError::Agent(format!(
                "agent {} was stopped and cannot be restarted",
                control.identity
            )));
        }

        // Hook is only consumed once the identity is ours
        let mut slot = self.setup.lock().await;
        if slot.is_none() {
            return Err(self.already_started());
        }
        let mailbox = control.bus.register(&control.identity)?;
        let mut setup = slot.take().ok_or_else(|| self.already_started())?;
        drop(slot);

        if !control.mark_alive() {
            control.bus.deregister(&control.identity);
            return Err(self.stopped_during_start());
        }

        if let Err(e) = setup.setup(&self.handle).await {
            warn!(target: "agent", agent = %control.identity, "Setup failed: {}", e);
            control.shutdown();
            return Err(e);
        }
        if control.stopped.load(Ordering::SeqCst) {
            return Err(self.stopped_during_start());
        }

        let pending = self.pending.lock().await.take().ok_or_else(|| {
            AgoraError::Agent(format!("agent {} has no behaviour queue", control.identity))
        })?;
        let scheduler = Scheduler::new(self.handle.clone(), mailbox, pending);
        *self.scheduler.lock().await = Some(tokio::spawn(scheduler.run()));

        info!(target: "agent", agent = %control.identity, "Agent started");
        Ok(())
    }

    fn already_started(&self) -> AgoraError {
        AgoraError::Agent(format!("agent {} already started", self.identity()))
    }

    fn stopped_during_start(&self) -> AgoraError {
        AgoraError::Agent(format!("agent {} was stopped while starting", self.identity()))
    }

    /// Cancels every behaviour, deregisters the identity and waits for the
    /// scheduler to wind down. Calling it again has no further effect.
    pub async fn stop(&self) {
        self.handle.control.shutdown();
        let scheduler = self.scheduler.lock().await.take();
        if let Some(task) = scheduler {
            if let Err(e) = task.await {
                warn!(target: "agent", agent = %self.identity(), "Scheduler task ended abnormally: {}", e);
            }
        }
    }
}
