//! Store context for a single foreign module run.

use std::collections::BTreeMap;

use wasmtime_wasi::DirPerms;
use wasmtime_wasi::FilePerms;
use wasmtime_wasi::WasiCtxBuilder;
use wasmtime_wasi::p1::WasiP1Ctx;
use wasmtime_wasi::p2::pipe::MemoryOutputPipe;

use crate::capture::Sink;
use crate::config::Mount;
use crate::input::InputChannel;
use crate::loader::Identity;

/// Environment variable carrying the path of the module being run, the way
/// a standalone program knows its own file.
pub const MODULE_FILE_ENV: &str = "MODBRIDGE_MODULE_FILE";

#[derive(Debug)]
pub enum Error {
    Mount(String, wasmtime::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mount(guest, e) => write!(f, "Cannot mount {}: {}", guest, e),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// A staging area for everything baked into a [`BridgeCtx`].
///
/// Stdio, identity and preopens are collected here before the Store exists.
pub struct ContextBuilder {
    wasi: WasiCtxBuilder,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self {
            wasi: WasiCtxBuilder::new(),
        }
    }

    /// Makes the guest believe it was started directly as `identity`.
    pub fn identity(&mut self, identity: &Identity) -> &mut Self {
        self.wasi.args(&[identity.program()]);
        self.wasi.env(MODULE_FILE_ENV, identity.path().display().to_string());
        self
    }

    pub fn stdin(&mut self, input: InputChannel) -> &mut Self {
        self.wasi.stdin(input.into_pipe());
        self
    }

    pub fn stdout(&mut self, sink: &Sink) -> &mut Self {
        sink.attach(&mut self.wasi);
        self
    }

    pub fn stderr(&mut self, pipe: MemoryOutputPipe) -> &mut Self {
        self.wasi.stderr(pipe);
        self
    }

    pub fn envs(&mut self, env: &BTreeMap<String, String>) -> &mut Self {
        for (key, value) in env {
            self.wasi.env(key, value);
        }
        self
    }

    pub fn mount(&mut self, mount: &Mount) -> Result<&mut Self> {
        let (dir, file) = if mount.writable {
            (DirPerms::all(), FilePerms::all())
        } else {
            (DirPerms::READ, FilePerms::READ)
        };

        self.wasi
            .preopened_dir(&mount.host, &mount.guest, dir, file)
            .map_err(|e| Error::Mount(mount.guest.clone(), e))?;
        Ok(self)
    }

    pub fn build(mut self) -> BridgeCtx {
        BridgeCtx {
            wasi: self.wasi.build_p1(),
        }
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-invocation state stored in Wasmtime's Store.
///
/// Built fresh for every run and dropped with the Store afterwards; the
/// caller's own process state is never handed to the guest.
pub struct BridgeCtx {
    pub(crate) wasi: WasiP1Ctx,
}
