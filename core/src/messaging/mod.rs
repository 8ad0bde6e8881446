//! Messaging layer: Envelope model and the identity-keyed Message Bus.
//!
//! - `Envelope`: addressed, typed message with correlation metadata
//! - `Template`: filter routing inbound envelopes to behaviours
//! - `MessageBus`: point-to-point delivery between registered agents

pub mod bus;
pub mod envelope;

// Re-export key types for ergonomic access
pub use bus::{Mailbox, MessageBus, MessageBusStats};
pub use envelope::{AgentId, Envelope, Performative, Template};
