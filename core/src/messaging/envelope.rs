use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{AgoraError, Result};

/// Opaque address of an agent on the bus.
///
/// Stable for the lifetime of the agent that owns it. The bus keys mailboxes by
/// this value; the format itself carries no meaning (`seller@market` and
/// `buyer-1` are equally valid).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AgentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Message intent tag carried by every envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Performative {
    /// Ask the receiver to do something (a purchase).
    Request,
    /// Positive answer to a request.
    Confirm,
    /// Negative answer to a request.
    Refuse,
}

impl Performative {
    pub fn as_str(self) -> &'static str {
        match self {
            Performative::Request => "request",
            Performative::Confirm => "confirm",
            Performative::Refuse => "refuse",
        }
    }
}

impl fmt::Display for Performative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Addressed, typed unit of inter-agent communication.
///
/// An `Envelope` is immutable once handed to the bus. The body is the wire
/// payload as structured text (JSON); decoding it is the receiver's job, so a
/// malformed body reaches the receiver intact and can be answered with a
/// refusal instead of being lost in transit.
///
/// # Fields
///
/// * `id` - Unique message identifier
/// * `from` / `to` - Sender and destination identities
/// * `performative` - Intent tag (request / confirm / refuse)
/// * `body` - Serialized payload
/// * `correlation_id` - Conversation identifier shared by a request and its reply
/// * `in_reply_to` - Id of the envelope this one answers
/// * `timestamp_ms` - Creation time in milliseconds since epoch
///
/// # Examples
///
/// ```
/// use agora_core::{Envelope, Performative};
///
/// let req = Envelope::new("buyer-1", "seller", Performative::Request, r#"{"product":"Apple","quantity":2}"#);
/// let reply = req.reply(Performative::Refuse, r#"{"reason":"out_of_stock"}"#);
///
/// assert_eq!(reply.to, req.from);
/// assert_eq!(reply.from, req.to);
/// assert_eq!(reply.correlation_id.as_deref(), Some(req.id.as_str()));
/// assert_eq!(reply.in_reply_to.as_deref(), Some(req.id.as_str()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    pub from: AgentId,
    pub to: AgentId,
    pub performative: Performative,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<String>,
    pub timestamp_ms: i64,
}

impl Envelope {
    /// Creates a new envelope with a fresh id and no correlation.
    pub fn new(
        from: impl Into<AgentId>,
        to: impl Into<AgentId>,
        performative: Performative,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            from: from.into(),
            to: to.into(),
            performative,
            body: body.into(),
            correlation_id: None,
            in_reply_to: None,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Creates an envelope whose body is `payload` serialized as JSON.
    pub fn with_payload<T: Serialize>(
        from: impl Into<AgentId>,
        to: impl Into<AgentId>,
        performative: Performative,
        payload: &T,
    ) -> Result<Self> {
        let body = serde_json::to_string(payload)?;
        Ok(Self::new(from, to, performative, body))
    }

    /// Sets the correlation id and returns self for chaining.
    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Decodes the body into `T`.
    ///
    /// Any failure (invalid JSON, missing field, wrong type) is reported as
    /// [`AgoraError::Protocol`] so receivers can answer it rather than crash.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|e| AgoraError::Protocol(e.to_string()))
    }

    /// Builds the answer to this envelope.
    ///
    /// Swaps `from`/`to`, keeps the conversation's correlation id (falling back
    /// to this envelope's id when the request carried none) and records
    /// `in_reply_to`.
    pub fn reply(&self, performative: Performative, body: impl Into<String>) -> Self {
        let mut reply = Self::new(self.to.clone(), self.from.clone(), performative, body);
        reply.correlation_id = Some(
            self.correlation_id
                .clone()
                .unwrap_or_else(|| self.id.clone()),
        );
        reply.in_reply_to = Some(self.id.clone());
        reply
    }

    /// Builds the answer to this envelope with a JSON payload.
    pub fn reply_with<T: Serialize>(&self, performative: Performative, payload: &T) -> Result<Self> {
        let body = serde_json::to_string(payload)?;
        Ok(self.reply(performative, body))
    }
}

/// Filter deciding which behaviour receives an inbound envelope.
///
/// Empty criteria match everything. A template with performatives matches an
/// envelope carrying any of them; a sender restriction must match exactly.
///
/// ```
/// use agora_core::{Envelope, Performative, Template};
///
/// let t = Template::performative(Performative::Request);
/// let req = Envelope::new("b", "s", Performative::Request, "{}");
/// let ack = Envelope::new("s", "b", Performative::Confirm, "{}");
/// assert!(t.matches(&req));
/// assert!(!t.matches(&ack));
/// assert!(Template::any().matches(&ack));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Template {
    performatives: Vec<Performative>,
    sender: Option<AgentId>,
}

impl Template {
    /// Matches every envelope.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn performative(performative: Performative) -> Self {
        Self {
            performatives: vec![performative],
            sender: None,
        }
    }

    pub fn performatives(performatives: impl IntoIterator<Item = Performative>) -> Self {
        Self {
            performatives: performatives.into_iter().collect(),
            sender: None,
        }
    }

    /// Restricts the template to envelopes sent by `sender`.
    pub fn from_sender(mut self, sender: impl Into<AgentId>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn matches(&self, envelope: &Envelope) -> bool {
        if !self.performatives.is_empty() && !self.performatives.contains(&envelope.performative) {
            return false;
        }
        match &self.sender {
            Some(sender) => *sender == envelope.from,
            None => true,
        }
    }
}
