use serde::Serialize;

/// Connection state as published to readers.
///
/// `connected` implies no pending QR; a close clears every field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub connected: bool,
    pub phone: Option<String>,
    /// `data:image/png;base64,...` while waiting to be paired.
    pub pending_qr: Option<String>,
}

impl SessionSnapshot {
    pub fn idle() -> Self {
        Self::default()
    }

    pub(crate) fn pairing(qr: String) -> Self {
        Self {
            connected: false,
            phone: None,
            pending_qr: Some(qr),
        }
    }

    pub(crate) fn connected(phone: Option<String>) -> Self {
        Self {
            connected: true,
            phone,
            pending_qr: None,
        }
    }

    pub fn status(&self) -> StatusView {
        StatusView {
            connected: self.connected,
            phone: self.phone.clone(),
            has_qr: self.pending_qr.is_some(),
        }
    }
}

/// Immutable status copy returned by `GET /api/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusView {
    pub connected: bool,
    pub phone: Option<String>,
    #[serde(rename = "hasQR")]
    pub has_qr: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn idle_status() {
        let status = SessionSnapshot::idle().status();
        assert_eq!(status, StatusView {
            connected: false,
            phone: None,
            has_qr: false,
        });
    }

    #[test]
    fn connected_drops_qr() {
        let snap = SessionSnapshot::connected(Some("5551234".into()));
        assert!(snap.pending_qr.is_none());
        assert_eq!(snap.status().phone.as_deref(), Some("5551234"));
    }

    #[test]
    fn status_json_shape() {
        let json = serde_json::to_value(SessionSnapshot::pairing("data:x".into()).status()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "connected": false, "phone": null, "hasQR": true })
        );
    }
}
