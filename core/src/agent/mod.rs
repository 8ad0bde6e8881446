//! Agent runtime module split into smaller files for readability.
//! - behaviour.rs: Behaviour, Schedule and the Step trait
//! - context.rs: AgentHandle and the per-behaviour context
//! - scheduler.rs: per-agent scheduler and mailbox pump
//! - instance.rs: Agent lifecycle (start / stop)
//! - runtime.rs: AgentRuntime manager

mod behaviour;
mod context;
mod instance;
mod runtime;
mod scheduler;

pub use behaviour::{Behaviour, Schedule, Step, StepOutcome};
pub use context::{AgentHandle, BehaviourContext};
pub use instance::{Agent, AgentSetup};
pub use runtime::AgentRuntime;
