//! Shared building blocks for the Coldreach realtime client.
//!
//! Holds the identifier types, wire payloads, event name constants,
//! configuration and endpoint construction used by the progress, event
//! bus, billing and importer crates.

pub mod config;
pub mod endpoints;
pub mod error;
pub mod event_names;
pub mod progress;
pub mod types;
