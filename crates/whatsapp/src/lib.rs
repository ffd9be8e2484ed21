//! WhatsApp session management for the gateway.
//!
//! The [`Coordinator`] owns the one protocol client, turns its lifecycle
//! events into a [`SessionSnapshot`], reconnects after transient closes and
//! serves send/logout commands. The protocol itself sits behind
//! [`ClientFactory`] / [`ProtocolClient`]; the `whatsapp-web` feature
//! provides the `whatsapp-rust` implementation.

pub mod address;
pub mod client;
pub mod coordinator;
pub mod error;
pub mod policy;
pub mod qr;
pub mod snapshot;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
#[cfg(feature = "whatsapp-web")]
pub mod web;

pub use {
    client::{ClientEvent, ClientFactory, CloseReason, EventSink, ProtocolClient, Registration},
    coordinator::{Coordinator, CoordinatorConfig, LifecycleState},
    error::{Error, Result},
    policy::{ReconnectDecision, ReconnectPolicy},
    snapshot::{SessionSnapshot, StatusView},
    store::{CredentialState, CredentialStore, FileCredentialStore},
};
