//! Downstream addressing types.
//!
//! A host query names a model, a selection within it, a trait filter and a
//! minion, and travels as JSON to a remote endpoint. The envelope a bridge
//! produces ends up under the response's `data` field. Nothing here sends
//! anything; these are the shapes only.

use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

use crate::envelope::Envelope;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryPayload {
    pub model: String,
    pub query: String,
    pub traits: String,
    pub mid: String,
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl QueryPayload {
    pub fn new(model: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn traits(mut self, traits: impl Into<String>) -> Self {
        self.traits = traits.into();
        self
    }

    pub fn mid(mut self, mid: impl Into<String>) -> Self {
        self.mid = mid.into();
        self
    }

    pub fn context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Envelope>,
}

impl QueryResponse {
    /// Wraps an envelope the way a remote endpoint returns it.
    pub fn with_envelope(envelope: Envelope) -> Self {
        let status = if envelope.is_success() { "success" } else { "error" };
        Self {
            status: status.to_string(),
            message: envelope.message().to_string(),
            data: Some(envelope),
        }
    }
}
