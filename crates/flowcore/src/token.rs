use crate::Value;
use serde::{Deserialize, Serialize};

/// Unit of data passed between actors.
///
/// Tokens are immutable once produced. Consumers receive their own copy, so
/// an actor can never observe changes another actor makes to a token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    payload: Value,
    provenance: Option<String>,
}

impl Token {
    pub fn new(payload: impl Into<Value>) -> Self {
        Self {
            payload: payload.into(),
            provenance: None,
        }
    }

    /// Token stamped with the full name of the actor that produced it
    pub fn from_actor(payload: impl Into<Value>, actor: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            provenance: Some(actor.into()),
        }
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn into_payload(self) -> Value {
        self.payload
    }

    pub fn provenance(&self) -> Option<&str> {
        self.provenance.as_deref()
    }

    /// Copy of this token attributed to another producer
    pub fn with_provenance(&self, actor: impl Into<String>) -> Self {
        Self {
            payload: self.payload.clone(),
            provenance: Some(actor.into()),
        }
    }
}

impl From<Value> for Token {
    fn from(payload: Value) -> Self {
        Token::new(payload)
    }
}
