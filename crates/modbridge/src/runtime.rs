//! # Runtime
//!
//! Owns the wasmtime Engine and the WASI preview 1 linker template. The
//! linker is shared between runs; every run still gets its own Store and
//! context, so no guest state survives from one invocation to the next.

use wasmtime::Engine;
use wasmtime::Linker;
use wasmtime::Module;
use wasmtime::Store;
use wasmtime::Trap;

use crate::context::BridgeCtx;
use crate::loader::ENTRY_ROUTINE;

#[derive(Debug)]
pub enum Error {
    Engine(wasmtime::Error),
    Linker(wasmtime::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Engine(e) => write!(f, "Engine error: {}", e),
            Self::Linker(e) => write!(f, "Linker error: {}", e),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// How an entry routine run ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// `_start` returned normally.
    Returned,
    /// The guest called `proc_exit` with this status.
    Exited(i32),
    /// Any other trap or error, described.
    Faulted(String),
}

pub struct Runtime {
    engine: Engine,
    linker: Linker<BridgeCtx>,
    fuel: Option<u64>,
}

impl Runtime {
    /// Creates a runtime. With `fuel` set, each run is limited to that many
    /// units of wasm execution; otherwise runs are unbounded.
    pub fn new(fuel: Option<u64>) -> Result<Self> {
        let mut config = wasmtime::Config::new();
        config.async_support(true);
        config.wasm_backtrace(false);
        config.consume_fuel(fuel.is_some());

        let engine = Engine::new(&config).map_err(Error::Engine)?;

        let mut linker = Linker::new(&engine);
        wasmtime_wasi::p1::add_to_linker_async(&mut linker, |cx: &mut BridgeCtx| &mut cx.wasi)
            .map_err(Error::Linker)?;

        Ok(Self { engine, linker, fuel })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Instantiates `module` in a fresh Store and runs its entry routine.
    ///
    /// Never fails: every error the guest can cause is folded into the
    /// returned [`Outcome`]. The Store is dropped before returning, so all
    /// handles to the guest's stdio are released.
    pub async fn run(&self, module: &Module, ctx: BridgeCtx) -> Outcome {
        let mut store = Store::new(&self.engine, ctx);

        if let Some(fuel) = self.fuel {
            if let Err(e) = store.set_fuel(fuel) {
                return Outcome::Faulted(e.to_string());
            }
        }

        let result = async {
            let instance = self.linker.instantiate_async(&mut store, module).await?;
            let entry = instance.get_typed_func::<(), ()>(&mut store, ENTRY_ROUTINE)?;
            entry.call_async(&mut store, ()).await
        }
        .await;

        match result {
            Ok(()) => Outcome::Returned,
            Err(e) => classify(e),
        }
    }
}

/// WASI only reports `proc_exit` statuses below 126 as an exit. Larger
/// statuses arrive as a plain error and are classified as faults.
fn classify(e: wasmtime::Error) -> Outcome {
    if let Some(exit) = e.downcast_ref::<wasmtime_wasi::I32Exit>() {
        return Outcome::Exited(exit.0);
    }

    match e.downcast_ref::<Trap>() {
        Some(trap) => Outcome::Faulted(format!("wasm trap: {}", trap)),
        None => Outcome::Faulted(e.to_string()),
    }
}
