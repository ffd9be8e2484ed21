//! Seam between the coordinator and the messaging-protocol library.
//!
//! The library runs the actual WhatsApp Web session. The coordinator only
//! sees the small command set on [`ProtocolClient`] and the lifecycle events
//! pushed through an [`EventSink`].

use std::{fmt, sync::Arc};

use {
    async_trait::async_trait,
    tokio::sync::{mpsc, oneshot},
};

use crate::{error::Result, store::CredentialState};

/// Why the protocol client reported `closed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The linked device was removed or logged out. Stored credentials are
    /// no longer valid.
    LoggedOut,
    ConnectionClosed,
    ConnectionLost,
    /// Another client opened the same session.
    ConnectionReplaced,
    /// The server asked for a fresh connection (usually right after pairing).
    RestartRequired,
    BadSession,
    Other { code: Option<u16>, message: String },
}

impl CloseReason {
    /// Map a multi-device disconnect status code.
    pub fn from_status_code(code: u16) -> Self {
        match code {
            401 => Self::LoggedOut,
            408 => Self::ConnectionLost,
            428 => Self::ConnectionClosed,
            440 => Self::ConnectionReplaced,
            500 => Self::BadSession,
            515 => Self::RestartRequired,
            other => Self::Other {
                code: Some(other),
                message: format!("status {other}"),
            },
        }
    }

    /// Only an explicit logout invalidates the stored credentials.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::LoggedOut)
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoggedOut => f.write_str("logged out"),
            Self::ConnectionClosed => f.write_str("connection closed"),
            Self::ConnectionLost => f.write_str("connection lost"),
            Self::ConnectionReplaced => f.write_str("connection replaced"),
            Self::RestartRequired => f.write_str("restart required"),
            Self::BadSession => f.write_str("bad session"),
            Self::Other { code: Some(c), message } => write!(f, "{message} ({c})"),
            Self::Other { code: None, message } => f.write_str(message),
        }
    }
}

/// Lifecycle and credential events emitted by a protocol client.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Raw pairing payload to be rendered as a QR code.
    QrIssued(String),
    /// The session is open. `identity` is the account's phone number, when
    /// the client knows it.
    Opened { identity: Option<String> },
    Closed(CloseReason),
    CredentialsChanged(CredentialState),
}

/// Everything the coordinator's event loop consumes.
#[derive(Debug)]
pub(crate) enum Inbound {
    Event { generation: u64, event: ClientEvent },
    Retry { ticket: u64 },
    /// Answered once everything queued before it has been handled.
    Flush(oneshot::Sender<()>),
}

/// Event channel handed to one client instance.
///
/// Every event is tagged with the generation of the handle the sink was
/// created for, so events from a replaced client can be told apart.
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<Inbound>,
}

impl EventSink {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<Inbound>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Queue an event. Returns false once the coordinator has shut down.
    pub fn emit(&self, event: ClientEvent) -> bool {
        self.tx
            .send(Inbound::Event {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// Outcome of a registration lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub exists: bool,
    /// Canonical address to send to. Only meaningful when `exists`.
    pub jid: String,
}

/// Commands accepted by a live client. Dropping the last handle tears the
/// underlying connection down.
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    async fn check_registered(&self, jid: &str) -> Result<Registration>;

    async fn send_text(&self, jid: &str, body: &str) -> Result<()>;

    async fn logout(&self) -> Result<()>;
}

/// Builds a fresh client for each connection attempt.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn connect(
        &self,
        credentials: CredentialState,
        events: EventSink,
    ) -> Result<Arc<dyn ProtocolClient>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(CloseReason::from_status_code(401), CloseReason::LoggedOut);
        assert_eq!(
            CloseReason::from_status_code(515),
            CloseReason::RestartRequired
        );
        assert_eq!(
            CloseReason::from_status_code(440),
            CloseReason::ConnectionReplaced
        );
        assert!(matches!(
            CloseReason::from_status_code(411),
            CloseReason::Other { code: Some(411), .. }
        ));
    }

    #[test]
    fn only_logout_is_terminal() {
        assert!(CloseReason::LoggedOut.is_terminal());
        for code in [408, 428, 440, 500, 515, 503] {
            assert!(!CloseReason::from_status_code(code).is_terminal(), "{code}");
        }
    }

    #[test]
    fn sink_tags_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(7, tx);
        assert!(sink.emit(ClientEvent::QrIssued("ref".into())));
        match rx.try_recv() {
            Ok(Inbound::Event {
                generation: 7,
                event: ClientEvent::QrIssued(code),
            }) => assert_eq!(code, "ref"),
            other => panic!("unexpected {other:?}"),
        }
        drop(rx);
        assert!(!sink.emit(ClientEvent::Closed(CloseReason::ConnectionLost)));
    }
}
