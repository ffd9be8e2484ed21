use std::{
    fmt,
    fs::File,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use {
    base64::{Engine, engine::general_purpose::STANDARD},
    serde::{Deserialize, Serialize},
    tracing::debug,
};

use crate::error::{Error, Result};

const BUNDLE_FILE: &str = "creds.json";
const BUNDLE_VERSION: u32 = 1;

/// Opaque credential bundle. The format is owned by the protocol library.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredentialState {
    bundle: Option<Vec<u8>>,
}

impl CredentialState {
    /// No stored credentials; the next connection will need pairing.
    pub fn fresh() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bundle: Some(bytes),
        }
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        self.bundle.as_deref()
    }

    pub fn is_fresh(&self) -> bool {
        self.bundle.is_none()
    }
}

impl fmt::Debug for CredentialState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.bundle {
            Some(b) => write!(f, "CredentialState({} bytes)", b.len()),
            None => f.write_str("CredentialState(fresh)"),
        }
    }
}

/// Persistence for the single session's credential bundle.
pub trait CredentialStore: Send + Sync {
    /// A missing bundle is a fresh state. Unreadable or corrupt data is
    /// `StoreUnavailable`, never an empty state.
    fn load(&self) -> Result<CredentialState>;

    /// Must be durable before returning.
    fn save(&self, state: &CredentialState) -> Result<()>;

    /// Remove all persisted material. Erasing nothing is not an error.
    fn erase(&self) -> Result<()>;
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    version: u32,
    bundle: String,
}

/// File-based store rooted at the configured auth directory.
///
/// The bundle lives in `<dir>/creds.json`. The protocol library may keep its
/// own session database in the same directory; `erase()` removes the whole
/// directory so that goes too.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    dir: PathBuf,
}

impl FileCredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn bundle_path(&self) -> PathBuf {
        self.dir.join(BUNDLE_FILE)
    }

    fn write_atomic(&self, data: &[u8]) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let tmp = self.dir.join(format!("{BUNDLE_FILE}.tmp"));
        {
            let mut file = File::create(&tmp)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
            }
            file.write_all(data)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, self.bundle_path())
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<CredentialState> {
        let path = self.bundle_path();
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no stored credentials");
                return Ok(CredentialState::fresh());
            },
            Err(e) => return Err(Error::store(format!("read {}: {e}", path.display()))),
        };

        let envelope: Envelope = serde_json::from_str(&raw)
            .map_err(|e| Error::store(format!("corrupt {}: {e}", path.display())))?;
        if envelope.version != BUNDLE_VERSION {
            return Err(Error::store(format!(
                "unsupported credential bundle version {}",
                envelope.version
            )));
        }
        let bytes = STANDARD
            .decode(envelope.bundle.as_bytes())
            .map_err(|e| Error::store(format!("corrupt {}: {e}", path.display())))?;
        Ok(CredentialState::from_bytes(bytes))
    }

    fn save(&self, state: &CredentialState) -> Result<()> {
        let Some(bytes) = state.bytes() else {
            return match std::fs::remove_file(self.bundle_path()) {
                Err(e) if e.kind() != ErrorKind::NotFound => Err(Error::store(e)),
                _ => Ok(()),
            };
        };
        let data = serde_json::to_vec(&Envelope {
            version: BUNDLE_VERSION,
            bundle: STANDARD.encode(bytes),
        })
        .map_err(Error::store)?;
        self.write_atomic(&data).map_err(Error::store)?;
        debug!(dir = %self.dir.display(), bytes = bytes.len(), "saved credentials");
        Ok(())
    }

    fn erase(&self) -> Result<()> {
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => {
                debug!(dir = %self.dir.display(), "erased credentials");
                Ok(())
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::store(e)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn missing_bundle_is_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("auth"));
        assert!(store.load().unwrap().is_fresh());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("auth"));
        let state = CredentialState::from_bytes(b"noise-keys".to_vec());
        store.save(&state).unwrap();
        assert_eq!(store.load().unwrap(), state);
        assert!(!dir.path().join("auth").join("creds.json.tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn bundle_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path());
        store
            .save(&CredentialState::from_bytes(vec![1, 2, 3]))
            .unwrap();
        let mode = std::fs::metadata(dir.path().join("creds.json"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn corrupt_bundle_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("creds.json"), "{not json").unwrap();
        let store = FileCredentialStore::new(dir.path());
        assert!(matches!(store.load(), Err(Error::StoreUnavailable(_))));
    }

    #[test]
    fn bad_base64_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("creds.json"),
            r#"{"version":1,"bundle":"%%%"}"#,
        )
        .unwrap();
        let store = FileCredentialStore::new(dir.path());
        assert!(matches!(store.load(), Err(Error::StoreUnavailable(_))));
    }

    #[test]
    fn unknown_version_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("creds.json"),
            r#"{"version":9,"bundle":""}"#,
        )
        .unwrap();
        let store = FileCredentialStore::new(dir.path());
        assert!(matches!(store.load(), Err(Error::StoreUnavailable(_))));
    }

    #[test]
    fn erase_removes_directory_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let auth = dir.path().join("auth");
        let store = FileCredentialStore::new(&auth);
        store.save(&CredentialState::from_bytes(vec![9])).unwrap();
        std::fs::write(auth.join("whatsapp.db"), b"library-owned").unwrap();

        store.erase().unwrap();
        assert!(!auth.exists());
        store.erase().unwrap();
        assert!(store.load().unwrap().is_fresh());
    }

    #[test]
    fn saving_fresh_state_clears_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path());
        store.save(&CredentialState::from_bytes(vec![1])).unwrap();
        store.save(&CredentialState::fresh()).unwrap();
        assert!(store.load().unwrap().is_fresh());
        store.save(&CredentialState::fresh()).unwrap();
    }
}
