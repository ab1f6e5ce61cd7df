//! # Result Envelope
//!
//! The structured value every invocation path produces. Serialized form always
//! carries `retcode` and `message`; `warning` and `data` appear only when they
//! hold something.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

/// Return code used for every failure the bridge reports itself.
pub const RETCODE_FAILURE: i32 = 1;

/// Structured result of one invocation.
///
/// Mutators consume and return the envelope so that construction chains:
///
/// ```ignore
/// let env = Envelope::new()
///     .set_retcode(0)
///     .add_warning("cache is stale")
///     .merge_data(data);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    retcode: i32,

    #[serde(default)]
    message: String,

    #[serde(rename = "warning", default, skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    data: Map<String, Value>,
}

impl Envelope {
    /// Creates an empty, successful envelope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a failed envelope carrying `message`.
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new().set_retcode(RETCODE_FAILURE).set_message(message)
    }

    pub fn set_retcode(mut self, retcode: i32) -> Self {
        self.retcode = retcode;
        self
    }

    pub fn set_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn add_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    /// Shallow merge: existing keys are overwritten, missing keys are added.
    pub fn merge_data(mut self, data: Map<String, Value>) -> Self {
        self.data.extend(data);
        self
    }

    pub fn retcode(&self) -> i32 {
        self.retcode
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn is_success(&self) -> bool {
        self.retcode == 0
    }

    /// Canonical structured form.
    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    /// Canonical text form, as handed back across the bridge boundary.
    pub fn serialize(&self) -> String {
        self.to_string()
    }

    /// Parses an envelope produced by a module or another bridge.
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

impl std::fmt::Display for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = serde_json::to_string(self).map_err(|_| std::fmt::Error)?;
        f.write_str(&text)
    }
}
