use std::time::Duration;

use crate::client::CloseReason;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A command needing a live session was issued outside `Connected`.
    #[error("WhatsApp is not connected")]
    NotConnected,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0} is not registered on WhatsApp")]
    RecipientNotRegistered(String),

    #[error("send timed out after {0:?}")]
    SendTimeout(Duration),

    #[error("send failed: {0}")]
    SendFailure(String),

    #[error("credential store unavailable: {0}")]
    StoreUnavailable(String),

    /// Internal only. Close events never surface to API callers.
    #[error("protocol connection closed: {0}")]
    ProtocolClosed(CloseReason),

    #[error("session already started")]
    AlreadyStarted,

    #[error("QR rendering failed: {0}")]
    Qr(String),

    #[error("protocol client error: {0}")]
    Client(String),
}

impl Error {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn store(err: impl std::fmt::Display) -> Self {
        Self::StoreUnavailable(err.to_string())
    }

    pub fn client(err: impl std::fmt::Display) -> Self {
        Self::Client(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_reason_in_message() {
        let err = Error::ProtocolClosed(CloseReason::ConnectionLost);
        assert_eq!(err.to_string(), "protocol connection closed: connection lost");
    }
}
