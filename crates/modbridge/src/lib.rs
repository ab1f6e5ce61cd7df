//! # modbridge
//!
//! Runs standalone WASI command modules in-process and reports what they did
//! as a structured [`Envelope`].
//!
//! ```ignore
//! let bridge = Bridge::new(BridgeConfig::default())?;
//! let request = InvocationRequest::new("sys/ping", args);
//! let envelope = bridge.invoke(&request).await;
//! println!("{}", envelope);
//! ```

pub mod bridge;
pub mod capture;
pub mod config;
pub mod context;
pub mod envelope;
pub mod input;
pub mod loader;
pub mod query;
pub mod request;
pub mod runtime;

pub use bridge::Bridge;
pub use capture::CaptureScope;
pub use capture::OutputSlot;
pub use capture::Sink;
pub use config::BridgeConfig;
pub use envelope::Envelope;
pub use input::InputChannel;
pub use loader::Loader;
pub use request::CallRequest;
pub use request::InvocationRequest;

#[cfg(test)]
mod tests;
