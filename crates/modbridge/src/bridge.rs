//! # Invocation Bridge
//!
//! Runs one foreign module the way it would run as a standalone program and
//! translates whatever happens into an [`Envelope`].
//!
//! A call moves through these stages:
//!
//! ```text
//! Resolving -> ContextReady -> InputBound -> OutputCapturing
//!           -> EntryRunning -> OutputCaptured -> ResultTranslated
//! ```
//!
//! Any stage may exit early with an error. Errors never escape
//! [`Bridge::invoke`]; they come back as envelopes with a non-zero retcode.

use bytes::Bytes;
use serde_json::Map;
use serde_json::Value;
use wasmtime_wasi::p2::pipe::MemoryOutputPipe;

use crate::capture::OutputSlot;
use crate::config::BridgeConfig;
use crate::context;
use crate::context::ContextBuilder;
use crate::envelope::Envelope;
use crate::input::InputChannel;
use crate::loader;
use crate::loader::Loader;
use crate::loader::ModuleShape;
use crate::loader::Unsupported;
use crate::request::InvocationRequest;
use crate::runtime;
use crate::runtime::Outcome;
use crate::runtime::Runtime;

/// Message returned when no module identifier was given.
pub const NO_TARGET: &str = "Target module not specified";

/// Why an invocation failed.
#[derive(Debug)]
pub enum Error {
    /// The identifier did not map to a loadable unit.
    Resolve(loader::Error),
    /// The module does not expose the entry contract.
    Contract(Unsupported),
    /// The module requested termination with a non-zero status.
    Exit(i32),
    /// The module faulted.
    Fault(String),
    /// Captured output was not JSON.
    Decode(serde_json::Error),
    /// The module filled the capture buffer; its output is incomplete.
    Overflow(usize),
    /// The host could not set up the module's context.
    Context(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resolve(e) => write!(f, "{}", e),
            Self::Contract(u) => write!(f, "{}", u),
            Self::Exit(code) => write!(f, "Module exited with error code: {}", code),
            Self::Fault(detail) => write!(f, "Module exception: {}", detail),
            Self::Decode(e) => write!(f, "Module returned invalid JSON: {}", e),
            Self::Overflow(limit) => write!(f, "Module output exceeded capture limit of {} bytes", limit),
            Self::Context(detail) => write!(f, "Failed to prepare execution context: {}", detail),
        }
    }
}

impl std::error::Error for Error {}

impl From<loader::Error> for Error {
    fn from(e: loader::Error) -> Self {
        Self::Resolve(e)
    }
}

impl From<context::Error> for Error {
    fn from(e: context::Error) -> Self {
        Self::Context(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Progress markers for one call, used in trace output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Resolving,
    ContextReady,
    InputBound,
    OutputCapturing,
    EntryRunning,
    OutputCaptured,
    ResultTranslated,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Resolving => "resolving",
            Self::ContextReady => "context-ready",
            Self::InputBound => "input-bound",
            Self::OutputCapturing => "output-capturing",
            Self::EntryRunning => "entry-running",
            Self::OutputCaptured => "output-captured",
            Self::ResultTranslated => "result-translated",
        };
        write!(f, "{}", name)
    }
}

/// Decoded output plus the module's stderr lines.
struct Completed {
    output: Value,
    warnings: Vec<String>,
}

/// Hosts foreign modules in-process.
pub struct Bridge {
    runtime: Runtime,
    loader: Loader,
    slot: OutputSlot,
    config: BridgeConfig,
}

impl Bridge {
    /// Creates a bridge with its own output slot.
    pub fn new(config: BridgeConfig) -> runtime::Result<Self> {
        Self::with_slot(config, OutputSlot::new())
    }

    /// Creates a bridge that shares `slot` with other bridges.
    pub fn with_slot(config: BridgeConfig, slot: OutputSlot) -> runtime::Result<Self> {
        Ok(Self {
            runtime: Runtime::new(config.fuel)?,
            loader: Loader::new(config.modules_dir()),
            slot,
            config,
        })
    }

    pub fn loader(&self) -> &Loader {
        &self.loader
    }

    pub fn slot(&self) -> &OutputSlot {
        &self.slot
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Entry contract: positional option groups plus named arguments in,
    /// serialized envelope out.
    pub async fn dispatch(&self, opts: &[Vec<Value>], args: Map<String, Value>) -> String {
        match InvocationRequest::from_options(opts, args) {
            Some(request) => self.invoke(&request).await.serialize(),
            None => Envelope::failure(NO_TARGET).serialize(),
        }
    }

    /// Runs one module. Always returns an envelope.
    pub async fn invoke(&self, request: &InvocationRequest) -> Envelope {
        match self.execute(request).await {
            Ok(done) => {
                tracing::debug!(stage = %Stage::ResultTranslated, module = request.module(), "invocation succeeded");
                let mut data = Map::new();
                data.insert(self.config.namespace.clone(), done.output);
                done.warnings
                    .into_iter()
                    .fold(Envelope::new(), |env, warning| env.add_warning(warning))
                    .merge_data(data)
            }
            Err(e) => {
                tracing::warn!(module = request.module(), error = %e, "invocation failed");
                Envelope::failure(e.to_string())
            }
        }
    }

    async fn execute(&self, request: &InvocationRequest) -> Result<Completed> {
        tracing::debug!(stage = %Stage::Resolving, module = request.module());
        let path = self.loader.resolve(request.module())?;
        let loaded = self.loader.load(self.runtime.engine(), &path)?;
        let module = match loaded.shape {
            ModuleShape::Command(module) => module,
            ModuleShape::Unsupported(reason) => return Err(Error::Contract(reason)),
        };

        tracing::debug!(stage = %Stage::ContextReady, path = %path.display());
        let input = InputChannel::from_request(request, &self.config.args_key)
            .map_err(|e| Error::Context(e.to_string()))?;

        tracing::debug!(stage = %Stage::InputBound, bytes = input.buffer().len());
        let scope = self.slot.open(self.config.capture_limit).await;

        tracing::debug!(stage = %Stage::OutputCapturing);
        let diagnostics = MemoryOutputPipe::new(self.config.stderr_limit);
        let mut builder = ContextBuilder::new();
        builder
            .identity(&loaded.identity)
            .stdin(input)
            .stdout(&scope.destination())
            .stderr(diagnostics.clone())
            .envs(&self.config.env);
        for mount in &self.config.mounts {
            builder.mount(mount)?;
        }

        tracing::debug!(stage = %Stage::EntryRunning);
        let outcome = self.runtime.run(&module, builder.build()).await;
        let captured = scope.close();

        tracing::debug!(stage = %Stage::OutputCaptured, ?outcome, bytes = captured.len());
        let stderr = diagnostics.contents();

        // A full buffer means writes were refused, whatever the guest did next.
        if captured.len() >= self.config.capture_limit {
            return Err(Error::Overflow(self.config.capture_limit));
        }

        match outcome {
            Outcome::Returned | Outcome::Exited(0) => {}
            Outcome::Exited(code) => return Err(Error::Exit(code)),
            Outcome::Faulted(detail) => return Err(Error::Fault(describe_fault(&stderr, detail))),
        }

        Ok(Completed {
            output: serde_json::from_slice(&captured).map_err(Error::Decode)?,
            warnings: stderr_lines(&stderr),
        })
    }
}

/// Prefixes the trap description with whatever the module said on stderr.
fn describe_fault(stderr: &Bytes, detail: String) -> String {
    let said = String::from_utf8_lossy(stderr);
    let said = said.trim();
    if said.is_empty() {
        detail
    } else {
        format!("{}: {}", said, detail)
    }
}

fn stderr_lines(stderr: &Bytes) -> Vec<String> {
    String::from_utf8_lossy(stderr)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
