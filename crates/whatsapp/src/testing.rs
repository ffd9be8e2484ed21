//! In-memory protocol client and credential store for tests.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    client::{ClientFactory, EventSink, ProtocolClient, Registration},
    error::{Error, Result},
    store::{CredentialState, CredentialStore},
};

/// A command the coordinator issued against the scripted client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect { fresh: bool },
    CheckRegistered(String),
    SendText { jid: String, body: String },
    Logout,
}

#[derive(Default)]
struct Script {
    sinks: Vec<EventSink>,
    calls: Vec<Call>,
    connect_failures: usize,
    connect_delay: Option<Duration>,
    storage_broken: bool,
    unregistered: HashSet<String>,
    aliases: HashMap<String, String>,
    send_delay: Option<Duration>,
    fail_sends: bool,
    fail_logout: bool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Records every call and hands out clients whose event sinks the test
/// drives directly.
#[derive(Default)]
pub struct ScriptedFactory {
    script: Arc<Mutex<Script>>,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connection attempts so far, including failed ones.
    pub fn connects(&self) -> usize {
        lock(&self.script)
            .calls
            .iter()
            .filter(|c| matches!(c, Call::Connect { .. }))
            .count()
    }

    pub fn calls(&self) -> Vec<Call> {
        lock(&self.script).calls.clone()
    }

    /// Event sink of the most recently connected client.
    ///
    /// Panics if no client was ever connected.
    pub fn latest_sink(&self) -> EventSink {
        match lock(&self.script).sinks.last() {
            Some(sink) => sink.clone(),
            None => panic!("no client has been connected"),
        }
    }

    /// Make the next `n` connection attempts fail.
    pub fn fail_connects(&self, n: usize) {
        lock(&self.script).connect_failures = n;
    }

    /// Make every connection attempt take `delay` before it resolves.
    pub fn set_connect_delay(&self, delay: Option<Duration>) {
        lock(&self.script).connect_delay = delay;
    }

    /// Make connection attempts fail as if the client's own session
    /// storage were corrupt.
    pub fn break_storage(&self, broken: bool) {
        lock(&self.script).storage_broken = broken;
    }

    pub fn unregister(&self, jid: &str) {
        lock(&self.script).unregistered.insert(jid.to_string());
    }

    /// Have the registration check resolve `jid` to `resolved`.
    pub fn resolve_as(&self, jid: &str, resolved: &str) {
        lock(&self.script)
            .aliases
            .insert(jid.to_string(), resolved.to_string());
    }

    pub fn set_send_delay(&self, delay: Duration) {
        lock(&self.script).send_delay = Some(delay);
    }

    pub fn fail_sends(&self, fail: bool) {
        lock(&self.script).fail_sends = fail;
    }

    pub fn fail_logout(&self, fail: bool) {
        lock(&self.script).fail_logout = fail;
    }
}

#[async_trait]
impl ClientFactory for ScriptedFactory {
    async fn connect(
        &self,
        credentials: CredentialState,
        events: EventSink,
    ) -> Result<Arc<dyn ProtocolClient>> {
        let delay = {
            let mut script = lock(&self.script);
            script.calls.push(Call::Connect {
                fresh: credentials.is_fresh(),
            });
            script.connect_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut script = lock(&self.script);
        if script.storage_broken {
            return Err(Error::store("file is not a database"));
        }
        if script.connect_failures > 0 {
            script.connect_failures -= 1;
            return Err(Error::client("scripted connect failure"));
        }
        script.sinks.push(events);
        Ok(Arc::new(ScriptedClient {
            script: Arc::clone(&self.script),
        }))
    }
}

struct ScriptedClient {
    script: Arc<Mutex<Script>>,
}

#[async_trait]
impl ProtocolClient for ScriptedClient {
    async fn check_registered(&self, jid: &str) -> Result<Registration> {
        let mut script = lock(&self.script);
        script.calls.push(Call::CheckRegistered(jid.to_string()));
        Ok(Registration {
            exists: !script.unregistered.contains(jid),
            jid: script
                .aliases
                .get(jid)
                .cloned()
                .unwrap_or_else(|| jid.to_string()),
        })
    }

    async fn send_text(&self, jid: &str, body: &str) -> Result<()> {
        let (delay, fail) = {
            let mut script = lock(&self.script);
            script.calls.push(Call::SendText {
                jid: jid.to_string(),
                body: body.to_string(),
            });
            (script.send_delay, script.fail_sends)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(Error::client("scripted transport failure"));
        }
        Ok(())
    }

    async fn logout(&self) -> Result<()> {
        let mut script = lock(&self.script);
        script.calls.push(Call::Logout);
        if script.fail_logout {
            return Err(Error::client("scripted logout failure"));
        }
        Ok(())
    }
}

#[derive(Default)]
struct StoreState {
    current: Option<CredentialState>,
    saves: usize,
    erases: usize,
    fail_loads: bool,
    fail_erases: bool,
}

/// Credential store kept in memory, with failure switches.
#[derive(Default)]
pub struct MemoryCredentialStore {
    state: Mutex<StoreState>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn preload(&self, credentials: CredentialState) {
        lock(&self.state).current = Some(credentials);
    }

    pub fn current(&self) -> Option<CredentialState> {
        lock(&self.state).current.clone()
    }

    pub fn saves(&self) -> usize {
        lock(&self.state).saves
    }

    pub fn erases(&self) -> usize {
        lock(&self.state).erases
    }

    pub fn fail_loads(&self, fail: bool) {
        lock(&self.state).fail_loads = fail;
    }

    pub fn fail_erases(&self, fail: bool) {
        lock(&self.state).fail_erases = fail;
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<CredentialState> {
        let state = lock(&self.state);
        if state.fail_loads {
            return Err(Error::store("scripted corrupt bundle"));
        }
        Ok(state.current.clone().unwrap_or_default())
    }

    fn save(&self, credentials: &CredentialState) -> Result<()> {
        let mut state = lock(&self.state);
        state.saves += 1;
        state.current = Some(credentials.clone());
        Ok(())
    }

    fn erase(&self) -> Result<()> {
        let mut state = lock(&self.state);
        if state.fail_erases {
            return Err(Error::store("scripted erase failure"));
        }
        state.erases += 1;
        state.current = None;
        Ok(())
    }
}
