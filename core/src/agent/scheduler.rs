use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::behaviour::{Behaviour, Schedule, StepOutcome};
use super::context::{AgentHandle, BehaviourContext};
use crate::messaging::{Envelope, Mailbox, Template};

/// Inbox route for a behaviour that declared a template
struct Route {
    behaviour: String,
    template: Template,
    tx: mpsc::UnboundedSender<Envelope>,
}

/// Drives one agent: launches queued behaviours, pumps the mailbox into
/// behaviour inboxes, and tears everything down on stop.
pub(crate) struct Scheduler {
    agent: AgentHandle,
    mailbox: Mailbox,
    pending: mpsc::UnboundedReceiver<Behaviour>,
    routes: Arc<DashMap<u64, Route>>,
    tasks: JoinSet<()>,
    next_id: AtomicU64,
}

impl Scheduler {
    pub(crate) fn new(
        agent: AgentHandle,
        mailbox: Mailbox,
        pending: mpsc::UnboundedReceiver<Behaviour>,
    ) -> Self {
        Self {
            agent,
            mailbox,
            pending,
            routes: Arc::new(DashMap::new()),
            tasks: JoinSet::new(),
            next_id: AtomicU64::new(0),
        }
    }

    pub(crate) async fn run(mut self) {
        let cancel = self.agent.cancellation_token();
        let mut mailbox_open = true;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(behaviour) = self.pending.recv() => self.launch(behaviour),
                maybe = self.mailbox.recv(), if mailbox_open => match maybe {
                    Some(envelope) => self.dispatch(envelope),
                    None => mailbox_open = false,
                },
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            warn!(target: "agent", agent = %self.agent.identity(), "Behaviour panicked: {}", e);
                        }
                    }
                }
            }
        }

        // Behaviours observe the token at their suspension points; abort is the backstop.
        self.tasks.abort_all();
        while self.tasks.join_next().await.is_some() {}
        self.routes.clear();
        info!(target: "agent", agent = %self.agent.identity(), "Scheduler finished");
    }

    fn launch(&mut self, behaviour: Behaviour) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let inbox = behaviour.template.clone().map(|template| {
            let (tx, rx) = mpsc::unbounded_channel();
            self.routes.insert(
                id,
                Route {
                    behaviour: behaviour.name.clone(),
                    template,
                    tx,
                },
            );
            rx
        });

        debug!(
            target: "agent", agent = %self.agent.identity(), behaviour = %behaviour.name,
            schedule = ?behaviour.schedule, "Launching behaviour"
        );

        let ctx = BehaviourContext::new(self.agent.clone(), behaviour.name.clone(), inbox);
        let routes = Arc::clone(&self.routes);
        self.tasks.spawn(async move {
            run_behaviour(behaviour, ctx).await;
            routes.remove(&id);
        });
    }

    fn dispatch(&self, envelope: Envelope) {
        let mut matched = 0usize;
        for route in self.routes.iter() {
            if route.template.matches(&envelope) && route.tx.send(envelope.clone()).is_ok() {
                debug!(
                    target: "agent", agent = %self.agent.identity(), behaviour = %route.behaviour,
                    id = %envelope.id, "Routed envelope"
                );
                matched += 1;
            }
        }
        if matched == 0 {
            warn!(
                target: "agent", agent = %self.agent.identity(), id = %envelope.id,
                from = %envelope.from, performative = %envelope.performative,
                "No behaviour matched envelope; dropping"
            );
        }
    }
}

async fn run_behaviour(behaviour: Behaviour, mut ctx: BehaviourContext) {
    let Behaviour {
        name,
        schedule,
        mut step,
        ..
    } = behaviour;
    let cancel = ctx.agent().cancellation_token();

    match schedule {
        Schedule::OneShot => {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {}
                res = step.step(&mut ctx) => {
                    if let Err(e) = res {
                        warn!(target: "agent", agent = %ctx.identity(), behaviour = %name, "One-shot step failed: {}", e);
                    }
                }
            }
        }
        Schedule::Cyclic => loop {
            let res = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                res = step.step(&mut ctx) => res,
            };
            match res {
                Ok(StepOutcome::Continue) => {}
                Ok(StepOutcome::Done) => break,
                Err(e) => {
                    warn!(target: "agent", agent = %ctx.identity(), behaviour = %name, "Cyclic step failed: {}", e);
                }
            }
            tokio::task::yield_now().await;
        },
        Schedule::Periodic {
            period,
            start_delay,
        } => {
            if !start_delay.is_zero() && !ctx.sleep(start_delay).await {
                return;
            }
            let mut interval = tokio::time::interval(period.max(Duration::from_millis(1)));
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }
                let res = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    res = step.step(&mut ctx) => res,
                };
                match res {
                    Ok(StepOutcome::Continue) => {}
                    Ok(StepOutcome::Done) => break,
                    Err(e) => {
                        warn!(target: "agent", agent = %ctx.identity(), behaviour = %name, "Periodic step failed: {}", e);
                    }
                }
            }
        }
    }

    debug!(target: "agent", agent = %ctx.identity(), behaviour = %name, "Behaviour finished");
}
