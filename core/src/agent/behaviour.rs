use std::time::Duration;

use async_trait::async_trait;

use super::context::BehaviourContext;
use crate::messaging::Template;
use crate::Result;

/// How the scheduler drives a behaviour's step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Run the step exactly once, then remove the behaviour.
    OneShot,
    /// Run the step back to back until the agent stops or the step returns
    /// [`StepOutcome::Done`].
    Cyclic,
    /// Run the step once every `period`, the first time after `start_delay`.
    /// An overrunning step delays the next run; runs never overlap and missed
    /// periods are not caught up.
    Periodic {
        period: Duration,
        start_delay: Duration,
    },
}

impl Schedule {
    /// Periodic schedule whose first run is immediate.
    pub fn periodic(period: Duration) -> Self {
        Schedule::Periodic {
            period,
            start_delay: Duration::ZERO,
        }
    }

    /// Periodic schedule whose first run happens after `start_delay`.
    pub fn periodic_after(period: Duration, start_delay: Duration) -> Self {
        Schedule::Periodic { period, start_delay }
    }
}

/// Result of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Keep the behaviour scheduled.
    Continue,
    /// Remove the behaviour.
    Done,
}

/// A unit of work the scheduler runs under a [`Schedule`].
///
/// Suspension happens only at the awaits the context offers: timed receive,
/// explicit sleep, and the period wait performed by the scheduler between runs.
/// Everything else in a step runs to completion.
#[async_trait]
pub trait Step: Send {
    async fn step(&mut self, ctx: &mut BehaviourContext) -> Result<StepOutcome>;
}

/// Named step plus its scheduling policy and optional message template.
///
/// Only behaviours carrying a [`Template`] get an inbox; the agent's mailbox
/// pump copies each inbound envelope to every behaviour whose template matches.
pub struct Behaviour {
    pub(crate) name: String,
    pub(crate) schedule: Schedule,
    pub(crate) template: Option<Template>,
    pub(crate) step: Box<dyn Step>,
}

impl Behaviour {
    pub fn new(name: impl Into<String>, schedule: Schedule, step: impl Step + 'static) -> Self {
        Self {
            name: name.into(),
            schedule,
            template: None,
            step: Box::new(step),
        }
    }

    pub fn one_shot(name: impl Into<String>, step: impl Step + 'static) -> Self {
        Self::new(name, Schedule::OneShot, step)
    }

    pub fn cyclic(name: impl Into<String>, step: impl Step + 'static) -> Self {
        Self::new(name, Schedule::Cyclic, step)
    }

    pub fn periodic(name: impl Into<String>, period: Duration, step: impl Step + 'static) -> Self {
        Self::new(name, Schedule::periodic(period), step)
    }

    /// Subscribes the behaviour to inbound envelopes matching `template`.
    pub fn with_template(mut self, template: Template) -> Self {
        self.template = Some(template);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schedule(&self) -> Schedule {
        self.schedule
    }

    pub fn template(&self) -> Option<&Template> {
        self.template.as_ref()
    }
}

impl std::fmt::Debug for Behaviour {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Behaviour")
            .field("name", &self.name)
            .field("schedule", &self.schedule)
            .field("template", &self.template)
            .finish_non_exhaustive()
    }
}
