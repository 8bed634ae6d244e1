//! Per-operation progress tracking.
//!
//! [`ProgressStreamClient`] follows one server-side operation through a
//! Server-Sent Events stream and falls back to polling when the stream
//! fails. State is published as [`ProgressSnapshot`]s on a watch
//! channel, including a linear ETA once progress is stable enough.

pub mod client;
pub mod error;
pub mod eta;
pub mod source;
pub mod sse;
pub mod state;
pub mod strategy;

pub use client::ProgressStreamClient;
pub use error::ProgressError;
pub use source::{HttpProgressSource, ProgressSource, ProgressStream};
pub use state::{ConnectionStatus, ProgressOutcome, ProgressSnapshot};
pub use strategy::{TransportPolicy, TransportStrategy};
