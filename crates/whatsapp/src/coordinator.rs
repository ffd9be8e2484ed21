//! Connection lifecycle coordinator.
//!
//! Owns the single protocol client, applies its events one at a time, and
//! publishes the resulting [`SessionSnapshot`]. Commands from the HTTP layer
//! and events from the client both go through the same session mutex, so
//! no two transitions ever interleave.
//!
//! ```text
//! Idle ──start──▶ Pairing ──opened──▶ Connected
//!  ▲                 │                    │
//!  └──── retry ◀─────┴──── closed ────────┘
//!                    │ (logged out)
//!                    ▼
//!                LoggedOut ◀──── logout (any state)
//! ```

use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use {
    tokio::sync::{Mutex, RwLock, mpsc, oneshot},
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use wagate_config::WhatsAppConfig;

use crate::{
    address,
    client::{ClientEvent, ClientFactory, CloseReason, EventSink, Inbound, ProtocolClient},
    error::{Error, Result},
    policy::{ReconnectDecision, ReconnectPolicy},
    qr,
    snapshot::{SessionSnapshot, StatusView},
    store::{CredentialState, CredentialStore},
};

/// Lifecycle position of the session. `Closed` is transient and never
/// observable: a close routes straight to `Idle` (retry) or `LoggedOut`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Pairing,
    Connected,
    LoggedOut,
}

#[derive(Debug, Clone, Copy)]
pub struct CoordinatorConfig {
    pub policy: ReconnectPolicy,
    /// Bound on the registration check plus send, and on remote logout.
    pub send_timeout: Duration,
    /// Bound on a single connection attempt.
    pub connect_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::from_config(&WhatsAppConfig::default())
    }
}

impl CoordinatorConfig {
    pub fn from_config(config: &WhatsAppConfig) -> Self {
        Self {
            policy: ReconnectPolicy::fixed(config.reconnect_delay()),
            send_timeout: config.send_timeout(),
            connect_timeout: config.connect_timeout(),
        }
    }
}

struct ScheduledRetry {
    ticket: u64,
    cancel: CancellationToken,
}

struct Session {
    state: LifecycleState,
    /// Generation of the current (or most recent) client handle.
    generation: u64,
    client: Option<Arc<dyn ProtocolClient>>,
    retry: Option<ScheduledRetry>,
    next_ticket: u64,
}

impl Session {
    /// Events are accepted from the current generation while it is starting
    /// or open, including before its handle has been installed.
    fn is_live(&self, generation: u64) -> bool {
        generation == self.generation
            && matches!(
                self.state,
                LifecycleState::Pairing | LifecycleState::Connected
            )
    }
}

/// A connection attempt reserved under the session lock and completed
/// outside it.
struct PendingStart {
    generation: u64,
    credentials: CredentialState,
}

struct Inner {
    factory: Arc<dyn ClientFactory>,
    store: Arc<dyn CredentialStore>,
    config: CoordinatorConfig,
    session: Mutex<Session>,
    snapshot: RwLock<SessionSnapshot>,
    tx: mpsc::UnboundedSender<Inbound>,
}

/// Cheap to clone; all clones share the same session.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl Coordinator {
    /// Create an idle coordinator and spawn its event loop.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        factory: Arc<dyn ClientFactory>,
        store: Arc<dyn CredentialStore>,
        config: CoordinatorConfig,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            factory,
            store,
            config,
            session: Mutex::new(Session {
                state: LifecycleState::Idle,
                generation: 0,
                client: None,
                retry: None,
                next_ticket: 0,
            }),
            snapshot: RwLock::new(SessionSnapshot::idle()),
            tx,
        });
        tokio::spawn(run_event_loop(Arc::downgrade(&inner), rx));
        Self { inner }
    }

    /// Load credentials and start a new protocol client.
    ///
    /// Valid from `Idle` or `LoggedOut`. Fails with `StoreUnavailable` if
    /// the stored credentials cannot be read. A client that fails to start
    /// is treated like a transient close and retried, unless it failed
    /// because its own session storage is unusable.
    ///
    /// The connect itself runs without holding the session, so commands
    /// keep failing fast with `NotConnected` while a handshake is slow.
    pub async fn start(&self) -> Result<()> {
        let pending = {
            let mut session = self.inner.session.lock().await;
            self.inner.begin_start(&mut session).await?
        };
        self.inner.connect(pending).await
    }

    /// Log the session out and erase stored credentials.
    ///
    /// Idempotent: with no live client this only resets the snapshot and
    /// cancels any pending reconnect.
    pub async fn logout(&self) -> Result<()> {
        let mut session = self.inner.session.lock().await;
        let had_retry = self.inner.cancel_retry(&mut session);
        let connecting = session.client.is_none()
            && matches!(
                session.state,
                LifecycleState::Pairing | LifecycleState::Connected
            );
        let client = session.client.take();
        // Anything still queued from the old handle is now stale.
        session.generation += 1;
        session.state = LifecycleState::LoggedOut;
        self.inner.publish(SessionSnapshot::idle()).await;

        let Some(client) = client else {
            if had_retry || connecting {
                // A session existed and was waiting to resume; don't let its
                // credentials outlive the logout.
                self.inner.store.erase()?;
                info!("logged out before the client was up, credentials erased");
            } else {
                debug!("logout with no live session");
            }
            return Ok(());
        };

        let limit = self.inner.config.send_timeout;
        match tokio::time::timeout(limit, client.logout()).await {
            Ok(Ok(())) => debug!("remote logout acknowledged"),
            Ok(Err(e)) => warn!(error = %e, "remote logout failed, continuing locally"),
            Err(_) => warn!(?limit, "remote logout timed out, continuing locally"),
        }
        drop(client);

        self.inner.store.erase()?;
        info!("logged out, credentials erased");
        Ok(())
    }

    /// Send a text message to `target` (a phone number or JID).
    ///
    /// Fails with `NotConnected` before any remote call unless the session
    /// is `Connected`. The message goes to the address returned by the
    /// registration check, not to the raw target.
    pub async fn send_message(&self, target: &str, body: &str) -> Result<()> {
        let limit = self.inner.config.send_timeout;
        let exchange = async {
            let client = {
                let session = self.inner.session.lock().await;
                match (session.state, &session.client) {
                    (LifecycleState::Connected, Some(client)) => Arc::clone(client),
                    _ => return Err(Error::NotConnected),
                }
            };

            let target = target.trim();
            if target.is_empty() {
                return Err(Error::invalid("phone is required"));
            }
            if body.trim().is_empty() {
                return Err(Error::invalid("message is required"));
            }
            let jid = address::normalize_target(target)?;

            let registration = client
                .check_registered(&jid)
                .await
                .map_err(as_send_failure)?;
            if !registration.exists {
                return Err(Error::RecipientNotRegistered(target.to_string()));
            }
            client
                .send_text(&registration.jid, body)
                .await
                .map_err(as_send_failure)?;
            Ok(registration.jid)
        };

        let resolved = tokio::time::timeout(limit, exchange)
            .await
            .map_err(|_| Error::SendTimeout(limit))??;
        info!(to = %resolved, chars = body.chars().count(), "message sent");
        Ok(())
    }

    /// Current status. Reads the published snapshot only.
    pub async fn status(&self) -> StatusView {
        self.inner.snapshot.read().await.status()
    }

    /// Full copy of the published snapshot.
    pub async fn snapshot(&self) -> SessionSnapshot {
        self.inner.snapshot.read().await.clone()
    }

    #[cfg(any(test, feature = "test-support"))]
    pub async fn lifecycle(&self) -> LifecycleState {
        self.inner.session.lock().await.state
    }

    /// Wait until every event queued so far has been applied.
    #[cfg(any(test, feature = "test-support"))]
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.inner.tx.send(Inbound::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

fn as_send_failure(err: Error) -> Error {
    match err {
        Error::SendFailure(_) | Error::NotConnected | Error::SendTimeout(_) => err,
        other => Error::SendFailure(other.to_string()),
    }
}

async fn run_event_loop(inner: Weak<Inner>, mut rx: mpsc::UnboundedReceiver<Inbound>) {
    while let Some(msg) = rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.handle(msg).await;
    }
    debug!("coordinator event loop stopped");
}

impl Inner {
    async fn handle(&self, msg: Inbound) {
        match msg {
            Inbound::Flush(done) => {
                let _ = done.send(());
            },
            Inbound::Event { generation, event } => {
                let mut session = self.session.lock().await;
                if !session.is_live(generation) {
                    debug!(
                        generation,
                        current = session.generation,
                        ?event,
                        "ignoring event from stale client"
                    );
                    return;
                }
                self.apply_event(&mut session, event).await;
            },
            Inbound::Retry { ticket } => {
                let pending = {
                    let mut session = self.session.lock().await;
                    if !session.retry.as_ref().is_some_and(|r| r.ticket == ticket) {
                        debug!(ticket, "ignoring cancelled reconnect");
                        return;
                    }
                    session.retry = None;
                    if session.state != LifecycleState::Idle {
                        debug!(state = ?session.state, "reconnect no longer needed");
                        return;
                    }
                    info!("reconnecting");
                    self.begin_start(&mut session).await
                };
                let result = match pending {
                    Ok(pending) => self.connect(pending).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = result {
                    error!(error = %e, "reconnect failed, will retry");
                    let mut session = self.session.lock().await;
                    if session.state == LifecycleState::Idle && session.retry.is_none() {
                        self.schedule_retry(&mut session, self.config.policy.delay());
                    }
                }
            },
        }
    }

    async fn apply_event(&self, session: &mut Session, event: ClientEvent) {
        match event {
            ClientEvent::QrIssued(payload) => {
                if session.state != LifecycleState::Pairing {
                    debug!(state = ?session.state, "ignoring QR outside pairing");
                    return;
                }
                match qr::render_data_uri(&payload) {
                    Ok(uri) => {
                        self.publish(SessionSnapshot::pairing(uri)).await;
                        info!("pairing QR code issued, scan it from the linked devices screen");
                    },
                    Err(e) => warn!(error = %e, "could not render pairing QR code"),
                }
            },
            ClientEvent::Opened { identity } => {
                if session.state != LifecycleState::Pairing {
                    debug!(state = ?session.state, "ignoring duplicate open");
                    return;
                }
                session.state = LifecycleState::Connected;
                match &identity {
                    Some(phone) => info!(%phone, "WhatsApp connected"),
                    None => warn!("WhatsApp connected without a phone number"),
                }
                self.publish(SessionSnapshot::connected(identity)).await;
            },
            ClientEvent::Closed(reason) => self.on_closed(session, reason).await,
            ClientEvent::CredentialsChanged(credentials) => {
                if let Err(e) = self.store.save(&credentials) {
                    error!(error = %e, "failed to persist credentials");
                }
            },
        }
    }

    async fn on_closed(&self, session: &mut Session, reason: CloseReason) {
        session.client = None;
        self.publish(SessionSnapshot::idle()).await;

        let decision = self.config.policy.decide(&reason);
        let closed = Error::ProtocolClosed(reason);
        match decision {
            ReconnectDecision::RetryAfter(delay) => {
                session.state = LifecycleState::Idle;
                warn!(error = %closed, ?delay, "reconnecting");
                self.schedule_retry(session, delay);
            },
            ReconnectDecision::Stop => {
                session.state = LifecycleState::LoggedOut;
                warn!(error = %closed, "session ended, not reconnecting");
            },
        }
    }

    /// Reserve a new generation and enter `Pairing`. Valid from `Idle` or
    /// `LoggedOut` only.
    async fn begin_start(&self, session: &mut Session) -> Result<PendingStart> {
        if !matches!(
            session.state,
            LifecycleState::Idle | LifecycleState::LoggedOut
        ) {
            return Err(Error::AlreadyStarted);
        }
        self.cancel_retry(session);

        let credentials = self.store.load()?;

        session.generation += 1;
        session.state = LifecycleState::Pairing;
        self.publish(SessionSnapshot::idle()).await;
        Ok(PendingStart {
            generation: session.generation,
            credentials,
        })
    }

    /// Connect without holding the session, then install the handle if the
    /// attempt is still current.
    async fn connect(&self, pending: PendingStart) -> Result<()> {
        let PendingStart {
            generation,
            credentials,
        } = pending;
        let fresh = credentials.is_fresh();
        let sink = EventSink::new(generation, self.tx.clone());

        let limit = self.config.connect_timeout;
        let outcome = tokio::time::timeout(limit, self.factory.connect(credentials, sink))
            .await
            .unwrap_or_else(|_| Err(Error::client(format!("connect timed out after {limit:?}"))));

        let mut session = self.session.lock().await;
        if !session.is_live(generation) || session.client.is_some() {
            debug!(
                generation,
                current = session.generation,
                "connection attempt superseded, dropping it"
            );
            return Ok(());
        }

        match outcome {
            Ok(client) => {
                session.client = Some(client);
                info!(generation, fresh, "protocol client started");
                Ok(())
            },
            Err(Error::StoreUnavailable(msg)) => {
                error!(generation, error = %msg, "session storage unusable, not retrying");
                session.state = LifecycleState::Idle;
                self.publish(SessionSnapshot::idle()).await;
                Err(Error::StoreUnavailable(msg))
            },
            Err(e) => {
                error!(generation, error = %e, "protocol client failed to start");
                self.on_closed(&mut session, CloseReason::Other {
                    code: None,
                    message: e.to_string(),
                })
                .await;
                Ok(())
            },
        }
    }

    fn schedule_retry(&self, session: &mut Session, delay: Duration) {
        self.cancel_retry(session);
        session.next_ticket += 1;
        let ticket = session.next_ticket;
        let cancel = CancellationToken::new();
        session.retry = Some(ScheduledRetry {
            ticket,
            cancel: cancel.clone(),
        });

        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {},
                () = tokio::time::sleep(delay) => {
                    let _ = tx.send(Inbound::Retry { ticket });
                },
            }
        });
    }

    /// Returns true if a retry was pending.
    fn cancel_retry(&self, session: &mut Session) -> bool {
        match session.retry.take() {
            Some(retry) => {
                retry.cancel.cancel();
                debug!(ticket = retry.ticket, "cancelled pending reconnect");
                true
            },
            None => false,
        }
    }

    async fn publish(&self, snapshot: SessionSnapshot) {
        *self.snapshot.write().await = snapshot;
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(retry) = self.session.get_mut().retry.take() {
            retry.cancel.cancel();
        }
    }
}
