use std::path::{Path, PathBuf};

use {
    anyhow::Result,
    clap::Subcommand,
    tracing::info,
    wagate_whatsapp::{CredentialStore, FileCredentialStore},
};

#[derive(Subcommand)]
pub enum CredentialsAction {
    /// Erase the stored session so the next start pairs from scratch.
    ///
    /// Run this while the gateway is stopped.
    Clear {
        /// Auth directory to erase instead of the configured one.
        #[arg(long)]
        auth_dir: Option<PathBuf>,
    },
}

pub fn handle_credentials(action: CredentialsAction) -> Result<()> {
    match action {
        CredentialsAction::Clear { auth_dir } => {
            let dir = auth_dir
                .unwrap_or_else(|| wagate_config::discover_and_load().whatsapp.auth_dir());
            clear(&dir)?;
            println!("Cleared stored WhatsApp credentials in {}", dir.display());
            Ok(())
        },
    }
}

fn clear(dir: &Path) -> Result<()> {
    FileCredentialStore::new(dir).erase()?;
    info!(dir = %dir.display(), "credentials erased");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use wagate_whatsapp::CredentialState;

    use super::*;

    #[test]
    fn clear_removes_saved_bundle() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("auth");
        let store = FileCredentialStore::new(&dir);
        store
            .save(&CredentialState::from_bytes(b"paired".to_vec()))
            .unwrap();
        assert!(dir.exists());

        clear(&dir).unwrap();
        assert!(!dir.exists());
        assert!(store.load().unwrap().is_fresh());
    }

    #[test]
    fn clear_missing_dir_is_ok() {
        let tmp = tempfile::tempdir().unwrap();
        clear(&tmp.path().join("never-created")).unwrap();
    }
}
