//! Gateway: HTTP front for the single WhatsApp session.
//!
//! Lifecycle:
//! 1. Build the credential store and session coordinator from config
//! 2. Start the protocol client (pairing or resuming)
//! 3. Resolve auth and bind the HTTP server
//! 4. Serve until Ctrl-C
//!
//! Session logic lives in `wagate-whatsapp`; this crate only maps HTTP onto
//! coordinator reads and commands.

pub mod api;
pub mod auth;
pub mod error;
pub mod server;
pub mod state;
