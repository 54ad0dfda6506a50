//! Persistent event channel to the inference service
//!
//! This module provides:
//! - `SessionChannel`: connect/on/send/disconnect over one owned connection
//! - `Transport`: the wire underneath (`NatsTransport`, `MemoryTransport`)
//! - `messages`: the outbound envelope and inbound reply contract

mod channel;
pub mod messages;
mod nats;
mod transport;

pub use channel::{EventHandler, SessionChannel};
pub use messages::{
    InferenceReply, TransmissionEnvelope, EVENT_CONNECT, EVENT_DISCONNECT, EVENT_MESSAGE,
    EVENT_RESPONSE,
};
pub use nats::NatsTransport;
pub use transport::{InboundMessage, MemoryTransport, Transport};
