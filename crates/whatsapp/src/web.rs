//! WhatsApp Web client via `whatsapp-rust`.
//!
//! The library keeps its own SQLite session database inside the auth
//! directory and persists keys itself, so the credential bundle handed to
//! [`WebClientFactory::connect`] is not consulted and no
//! `CredentialsChanged` events are emitted. Erasing the auth directory
//! still removes the session.

use std::{path::PathBuf, sync::Arc};

use {
    async_trait::async_trait,
    tokio::task::JoinHandle,
    tracing::{debug, info, warn},
    wacore::types::events::Event,
    wacore_binary::jid::Jid,
    whatsapp_rust::{bot::Bot, client::Client, store::SqliteStore},
    whatsapp_rust_tokio_transport::TokioWebSocketTransportFactory,
    whatsapp_rust_ureq_http_client::UreqHttpClient,
};

use crate::{
    address,
    client::{ClientEvent, ClientFactory, CloseReason, EventSink, ProtocolClient, Registration},
    error::{Error, Result},
    store::CredentialState,
};

const SESSION_DB: &str = "whatsapp.db";

pub struct WebClientFactory {
    auth_dir: PathBuf,
    device_name: String,
}

impl WebClientFactory {
    pub fn new(auth_dir: impl Into<PathBuf>, device_name: impl Into<String>) -> Self {
        Self {
            auth_dir: auth_dir.into(),
            device_name: device_name.into(),
        }
    }
}

#[async_trait]
impl ClientFactory for WebClientFactory {
    async fn connect(
        &self,
        _credentials: CredentialState,
        events: EventSink,
    ) -> Result<Arc<dyn ProtocolClient>> {
        std::fs::create_dir_all(&self.auth_dir).map_err(Error::store)?;
        let db_path = self.auth_dir.join(SESSION_DB);
        let db_path = db_path.to_string_lossy();

        let backend = Arc::new(SqliteStore::new(&db_path).await.map_err(Error::store)?);

        let generation = events.generation();
        let mut bot = Bot::builder()
            .with_backend(backend)
            .with_transport_factory(TokioWebSocketTransportFactory::new())
            .with_http_client(UreqHttpClient::new())
            .with_device_props(
                Some(self.device_name.clone()),
                None,
                Some(waproto::whatsapp::device_props::PlatformType::Desktop),
            )
            .on_event(move |event, client| {
                let events = events.clone();
                async move { forward(event, &client, &events).await }
            })
            .build()
            .await
            .map_err(Error::client)?;

        let client = bot.client();
        let task = bot.run().await.map_err(Error::client)?;
        info!(generation, db = %db_path, "whatsapp web client running");

        Ok(Arc::new(WebClient { client, task }))
    }
}

/// Library events the coordinator cares about. `Opened` still needs the
/// account's phone number, which is looked up on the client.
#[derive(Debug)]
enum Mapped {
    Ready(ClientEvent),
    Opened,
}

fn map_event(event: &Event) -> Option<Mapped> {
    let mapped = match event {
        Event::PairingQrCode { code, .. } => Mapped::Ready(ClientEvent::QrIssued(code.clone())),
        Event::Connected(_) => Mapped::Opened,
        Event::LoggedOut(_) => Mapped::Ready(ClientEvent::Closed(CloseReason::LoggedOut)),
        Event::Disconnected(_) => Mapped::Ready(ClientEvent::Closed(CloseReason::ConnectionLost)),
        _ => return None,
    };
    Some(mapped)
}

async fn forward(event: Event, client: &Client, events: &EventSink) {
    let mapped = match map_event(&event) {
        Some(Mapped::Ready(event)) => event,
        Some(Mapped::Opened) => ClientEvent::Opened {
            identity: own_phone(client).await,
        },
        None => return,
    };
    if !events.emit(mapped) {
        debug!("coordinator gone, dropping client event");
    }
}

async fn own_phone(client: &Client) -> Option<String> {
    match client.get_pn().await {
        Some(jid) => Some(jid.user.clone()),
        None => {
            warn!("connected session has no phone number");
            None
        },
    }
}

struct WebClient {
    client: Arc<Client>,
    task: JoinHandle<()>,
}

#[async_trait]
impl ProtocolClient for WebClient {
    async fn check_registered(&self, jid: &str) -> Result<Registration> {
        let phone = address::user_part(jid);
        let results = self
            .client
            .contacts()
            .is_on_whatsapp(&[phone])
            .await
            .map_err(Error::client)?;
        Ok(match results.into_iter().find(|r| r.is_registered) {
            Some(hit) => Registration {
                exists: true,
                jid: hit.jid.to_string(),
            },
            None => Registration {
                exists: false,
                jid: jid.to_string(),
            },
        })
    }

    async fn send_text(&self, jid: &str, body: &str) -> Result<()> {
        let to: Jid = jid
            .parse()
            .map_err(|e| Error::invalid(format!("invalid JID {jid:?}: {e}")))?;
        let message = waproto::whatsapp::Message {
            conversation: Some(body.to_string()),
            ..Default::default()
        };
        let id = self
            .client
            .send_message(to, message)
            .await
            .map_err(|e| Error::SendFailure(e.to_string()))?;
        debug!(%id, "message accepted by server");
        Ok(())
    }

    async fn logout(&self) -> Result<()> {
        self.client.logout().await.map_err(Error::client)
    }
}

impl Drop for WebClient {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wacore::types::events::{
        ConnectFailureReason, Connected, Disconnected, LoggedOut,
    };

    use super::*;

    #[test]
    fn qr_code_is_forwarded() {
        let event = Event::PairingQrCode {
            code: "2@ref,noise,identity".into(),
            timeout: Duration::from_secs(60),
        };
        assert!(matches!(
            map_event(&event),
            Some(Mapped::Ready(ClientEvent::QrIssued(code))) if code == "2@ref,noise,identity"
        ));
    }

    #[test]
    fn connected_needs_identity_lookup() {
        assert!(matches!(
            map_event(&Event::Connected(Connected)),
            Some(Mapped::Opened)
        ));
    }

    #[test]
    fn disconnect_is_transient() {
        assert!(matches!(
            map_event(&Event::Disconnected(Disconnected)),
            Some(Mapped::Ready(ClientEvent::Closed(CloseReason::ConnectionLost)))
        ));
    }

    #[test]
    fn logout_is_terminal() {
        let event = Event::LoggedOut(LoggedOut {
            on_connect: false,
            reason: ConnectFailureReason::LoggedOut,
        });
        assert!(matches!(
            map_event(&event),
            Some(Mapped::Ready(ClientEvent::Closed(CloseReason::LoggedOut)))
        ));
    }
}
