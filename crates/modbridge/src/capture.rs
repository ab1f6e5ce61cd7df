//! # Output capture scope
//!
//! Foreign modules write their result to an ambient output destination rather
//! than to a per-call channel. [`OutputSlot`] models that destination as a
//! single shared slot; [`CaptureScope`] redirects it into an in-memory buffer
//! for exactly one invocation and puts the previous destination back when it
//! is closed or dropped, whichever comes first.
//!
//! The slot is not reentrant. Holders are serialized through an async mutex,
//! so a second invocation waits until the first scope is released. Hosts that
//! need real parallelism should run separate bridges with separate slots.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Mutex;
use tokio::sync::OwnedMutexGuard;
use wasmtime_wasi::WasiCtxBuilder;
use wasmtime_wasi::p2::pipe::MemoryOutputPipe;

#[derive(Debug)]
pub enum Error {
    /// Another invocation currently holds the slot.
    Busy,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Busy => write!(f, "Output slot is held by another invocation"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Where guest output currently goes.
#[derive(Clone, Debug)]
pub enum Sink {
    /// Discarded. The slot rests here while nothing is capturing.
    Null,
    /// An in-memory buffer owned by a capture scope.
    Buffer(MemoryOutputPipe),
}

impl Sink {
    /// Points the guest's stdout at this destination.
    pub(crate) fn attach(&self, wasi: &mut WasiCtxBuilder) {
        match self {
            Sink::Null => {}
            Sink::Buffer(pipe) => {
                wasi.stdout(pipe.clone());
            }
        }
    }

    pub fn is_buffer(&self) -> bool {
        matches!(self, Sink::Buffer(_))
    }
}

struct SlotState {
    current: Sink,
}

/// The shared, single-holder output destination.
#[derive(Clone)]
pub struct OutputSlot {
    inner: Arc<Mutex<SlotState>>,
}

impl OutputSlot {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SlotState { current: Sink::Null })),
        }
    }

    /// Waits for the slot and redirects it into a fresh buffer holding at most
    /// `limit` bytes.
    pub async fn open(&self, limit: usize) -> CaptureScope {
        let guard = Arc::clone(&self.inner).lock_owned().await;
        CaptureScope::install(guard, limit)
    }

    /// Like [`OutputSlot::open`], but fails instead of waiting.
    pub fn try_open(&self, limit: usize) -> Result<CaptureScope> {
        let guard = Arc::clone(&self.inner)
            .try_lock_owned()
            .map_err(|_| Error::Busy)?;
        Ok(CaptureScope::install(guard, limit))
    }

    /// Current destination. Waits for any open scope to be released.
    pub async fn destination(&self) -> Sink {
        self.inner.lock().await.current.clone()
    }

    pub fn is_held(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}

impl Default for OutputSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive redirection of the output slot for one invocation.
pub struct CaptureScope {
    guard: OwnedMutexGuard<SlotState>,
    prior: Option<Sink>,
    buffer: MemoryOutputPipe,
}

impl CaptureScope {
    fn install(mut guard: OwnedMutexGuard<SlotState>, limit: usize) -> Self {
        let buffer = MemoryOutputPipe::new(limit);
        let prior = std::mem::replace(&mut guard.current, Sink::Buffer(buffer.clone()));
        tracing::trace!(capacity = limit, "output slot redirected");
        Self {
            guard,
            prior: Some(prior),
            buffer,
        }
    }

    /// Destination the guest should write to while this scope is open.
    pub fn destination(&self) -> Sink {
        self.guard.current.clone()
    }

    /// Restores the prior destination and returns everything captured.
    pub fn close(mut self) -> Bytes {
        self.restore();
        self.buffer.contents()
    }

    fn restore(&mut self) {
        if let Some(prior) = self.prior.take() {
            self.guard.current = prior;
            tracing::trace!("output slot restored");
        }
    }
}

impl Drop for CaptureScope {
    fn drop(&mut self) {
        self.restore();
    }
}
