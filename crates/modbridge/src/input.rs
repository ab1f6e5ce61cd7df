//! # Simulated input channel
//!
//! Presents one in-memory payload through the same surface a real stdin
//! offers: sequential reads, line reads, line iteration and a raw byte view.
//! The whole payload is resident up front, so nothing here ever blocks.

use std::io;
use std::io::BufRead;
use std::io::Read;

use bytes::Bytes;
use serde_json::Value;
use wasmtime_wasi::p2::pipe::MemoryInputPipe;

use crate::request::InvocationRequest;

/// Stdin stand-in for a single invocation.
#[derive(Clone, Debug)]
pub struct InputChannel {
    buffer: Bytes,
    pos: usize,
}

impl InputChannel {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            buffer: payload.into(),
            pos: 0,
        }
    }

    /// Serializes the request arguments once, wrapped under `args_key`, exactly
    /// as a standalone run would receive them.
    pub fn from_request(request: &InvocationRequest, args_key: &str) -> serde_json::Result<Self> {
        let mut wrapped = serde_json::Map::new();
        wrapped.insert(args_key.to_string(), Value::Object(request.args().clone()));
        let payload = serde_json::to_vec(&Value::Object(wrapped))?;
        Ok(Self::new(payload))
    }

    /// The underlying bytes, independent of how much has been read.
    pub fn buffer(&self) -> &Bytes {
        &self.buffer
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> &[u8] {
        &self.buffer[self.pos..]
    }

    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.buffer.len()
    }

    /// Iterates the unread payload line by line, newline included.
    pub fn iter_lines(&mut self) -> Lines<'_> {
        Lines { channel: self }
    }

    /// Hands the unread remainder to the guest as its stdin stream.
    pub fn into_pipe(self) -> MemoryInputPipe {
        MemoryInputPipe::new(self.buffer.slice(self.pos..))
    }
}

impl Read for InputChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.remaining().len().min(buf.len());
        buf[..n].copy_from_slice(&self.buffer[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

impl BufRead for InputChannel {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        Ok(self.remaining())
    }

    fn consume(&mut self, amt: usize) {
        self.pos = (self.pos + amt).min(self.buffer.len());
    }
}

/// Line iterator over an [`InputChannel`], yielding zero-copy slices.
pub struct Lines<'a> {
    channel: &'a mut InputChannel,
}

impl Iterator for Lines<'_> {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        if self.channel.is_exhausted() {
            return None;
        }

        let start = self.channel.pos;
        let end = match self.channel.remaining().iter().position(|b| *b == b'\n') {
            Some(idx) => start + idx + 1,
            None => self.channel.buffer.len(),
        };
        self.channel.pos = end;
        Some(self.channel.buffer.slice(start..end))
    }
}
