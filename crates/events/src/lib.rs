//! Session-wide event bus client.
//!
//! [`EventBusClient`] holds one authenticated WebSocket per session,
//! decodes every frame into a typed [`BusEvent`], and fans events out to
//! handlers registered per [`EventKind`]. Campaign topic subscriptions
//! are reference-counted locally and replayed to the server after every
//! reconnect.
//!
//! - [`messages`]: inbound event union and outbound client frames.
//! - [`handlers`]: observer lists with explicit [`HandlerId`] tokens.
//! - [`topics`]: reference-counted campaign subscriptions.
//! - [`reconnect`]: exponential backoff between connection attempts.
//! - [`transport`]: the connector seam and its WebSocket implementation.
//! - [`campaigns`]: last-write-wins campaign progress derived from events.

pub mod campaigns;
pub mod client;
pub mod error;
pub mod handlers;
pub mod messages;
pub mod metrics;
pub mod reconnect;
pub mod topics;
pub mod transport;

pub use campaigns::{CampaignProgress, CampaignTracker};
pub use client::EventBusClient;
pub use error::BusError;
pub use handlers::HandlerId;
pub use messages::{BusEvent, ClientMessage, EventKind, Severity};
pub use metrics::{BusMetrics, BusStatus};
pub use transport::{BusConnection, BusConnector, WsConnector};
