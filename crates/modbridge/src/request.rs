//! Invocation requests and the JSON call protocol they arrive in.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

/// Input to one bridge call: which module, and with what arguments.
#[derive(Clone, Debug, PartialEq)]
pub struct InvocationRequest {
    module: String,
    args: Map<String, Value>,
}

impl InvocationRequest {
    pub fn new(module: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            module: module.into(),
            args,
        }
    }

    /// Builds a request from positional option groups and named arguments.
    ///
    /// The first element of the first group names the module. Returns `None`
    /// when there is no such element or it is not a non-empty string.
    pub fn from_options(opts: &[Vec<Value>], args: Map<String, Value>) -> Option<Self> {
        let module = opts.first()?.first()?.as_str()?.trim();
        if module.is_empty() {
            return None;
        }
        Some(Self::new(module, args))
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn args(&self) -> &Map<String, Value> {
        &self.args
    }
}

/// Call as delivered over stdin by a host.
///
/// ```json
/// {"options": ["ping"], "arguments": {"data": "hello"}}
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    #[serde(default, alias = "opts")]
    pub options: Vec<Value>,

    #[serde(default, alias = "args")]
    pub arguments: Map<String, Value>,
}

impl CallRequest {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// The option list forms the single positional option group.
    pub fn into_parts(self) -> (Vec<Vec<Value>>, Map<String, Value>) {
        let groups = if self.options.is_empty() {
            Vec::new()
        } else {
            vec![self.options]
        };
        (groups, self.arguments)
    }
}
