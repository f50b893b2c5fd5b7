//! Multi-vehicle coordination: a TCP relay that fans every frame out to all
//! connected mission processes, and a client that speaks the envelope
//! protocol over it (forced transitions and cross-runner field queries).

mod client;
mod messages;
mod relay;

pub use client::BusClient;
pub use messages::{BusEnvelope, EnvelopeKind};
pub use relay::BusRelay;
