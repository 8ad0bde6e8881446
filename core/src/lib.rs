// Agora Core Library
// Agent marketplace runtime

pub mod agent;
pub mod market;
pub mod messaging;
pub mod telemetry;

// Export core types
pub use agent::{
    Agent, AgentRuntime, AgentSetup, Behaviour, BehaviourContext, Schedule, Step, StepOutcome,
};
pub use market::{
    BuyerAgent, BuyerConfig, BuyerStats, Inventory, LedgerSnapshot, SellerAgent, SellerConfig,
};
pub use messaging::{
    AgentId, Envelope, Mailbox, MessageBus, MessageBusStats, Performative, Template,
};

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgoraError {
    #[error("Delivery error: no mailbox registered for {to}")]
    Delivery { to: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
pub type Result<T> = std::result::Result<T, AgoraError>;
