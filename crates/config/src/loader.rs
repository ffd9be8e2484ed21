use std::{
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{env_subst::substitute_env, schema::WagateConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["wagate.toml", "wagate.yaml", "wagate.yml", "wagate.json"];

/// Override for the config directory, set via `set_config_dir()`.
static CONFIG_DIR_OVERRIDE: Mutex<Option<PathBuf>> = Mutex::new(None);

/// Set a custom config directory. When set, config discovery only looks in
/// this directory (project-local and user-global paths are skipped).
pub fn set_config_dir(path: PathBuf) {
    *CONFIG_DIR_OVERRIDE
        .lock()
        .unwrap_or_else(PoisonError::into_inner) = Some(path);
}

/// Clear the config directory override, restoring default discovery.
pub fn clear_config_dir() {
    *CONFIG_DIR_OVERRIDE
        .lock()
        .unwrap_or_else(PoisonError::into_inner) = None;
}

fn config_dir_override() -> Option<PathBuf> {
    CONFIG_DIR_OVERRIDE
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<WagateConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations, then apply
/// `WAGATE_*` environment overrides.
///
/// Search order:
/// 1. `./wagate.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/wagate/wagate.{toml,yaml,yml,json}` (user-global)
///
/// Falls back to `WagateConfig::default()` when nothing is found or the file
/// fails to parse.
pub fn discover_and_load() -> WagateConfig {
    let mut config = match find_config_file() {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            load_config(&path).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                WagateConfig::default()
            })
        },
        None => {
            debug!("no config file found, writing default config");
            let config = WagateConfig::default();
            if let Err(e) = write_default_config(&config) {
                warn!(error = %e, "failed to write default config file");
            }
            config
        },
    };
    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    config
}

/// Overlay `WAGATE_BIND`, `WAGATE_PORT`, `WAGATE_API_KEY` and
/// `WAGATE_AUTH_DIR` onto a loaded config.
pub fn apply_env_overrides(config: &mut WagateConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(bind) = lookup("WAGATE_BIND").filter(|v| !v.is_empty()) {
        config.server.bind = bind;
    }
    if let Some(raw) = lookup("WAGATE_PORT") {
        match raw.parse::<u16>() {
            Ok(port) => config.server.port = port,
            Err(e) => warn!(value = %raw, error = %e, "ignoring invalid WAGATE_PORT"),
        }
    }
    if let Some(key) = lookup("WAGATE_API_KEY") {
        config.auth.api_key = Some(Secret::new(key));
    }
    if let Some(dir) = lookup("WAGATE_AUTH_DIR").filter(|v| !v.is_empty()) {
        config.whatsapp.auth_dir = Some(PathBuf::from(dir));
    }
}

/// Find the first config file in standard locations.
///
/// When a config dir override is set, only that directory is searched.
fn find_config_file() -> Option<PathBuf> {
    if let Some(dir) = config_dir_override() {
        return first_existing(&dir);
    }

    // Project-local
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    home_dir().and_then(|h| first_existing(&h.join(".config").join("wagate")))
}

fn first_existing(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the config directory: override, or `~/.config/wagate/`.
pub fn config_dir() -> Option<PathBuf> {
    if let Some(dir) = config_dir_override() {
        return Some(dir);
    }
    home_dir().map(|h| h.join(".config").join("wagate"))
}

/// Returns the data directory: `~/.wagate/` on all platforms.
pub fn data_dir() -> PathBuf {
    home_dir()
        .map(|h| h.join(".wagate"))
        .unwrap_or_else(|| PathBuf::from(".wagate"))
}

fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}

/// Returns the path of an existing config file, or the default TOML path.
pub fn find_or_default_config_path() -> PathBuf {
    if let Some(path) = find_config_file() {
        return path;
    }
    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wagate.toml")
}

/// Write the default config file to the user-global config path.
/// Only called when no config file exists yet.
fn write_default_config(config: &WagateConfig) -> anyhow::Result<()> {
    let path = find_or_default_config_path();
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str =
        toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("serialize config: {e}"))?;
    std::fs::write(&path, &toml_str)?;
    debug!(path = %path.display(), "wrote default config file");
    Ok(())
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<WagateConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn loads_each_format() {
        let dir = tempfile::tempdir().unwrap();

        let toml_path = dir.path().join("wagate.toml");
        std::fs::write(&toml_path, "[server]\nport = 4000\n").unwrap();
        assert_eq!(load_config(&toml_path).unwrap().server.port, 4000);

        let yaml_path = dir.path().join("wagate.yaml");
        std::fs::write(&yaml_path, "server:\n  port: 4001\n").unwrap();
        assert_eq!(load_config(&yaml_path).unwrap().server.port, 4001);

        let json_path = dir.path().join("wagate.json");
        std::fs::write(&json_path, r#"{"server": {"port": 4002}}"#).unwrap();
        assert_eq!(load_config(&json_path).unwrap().server.port, 4002);
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wagate.ini");
        std::fs::write(&path, "port=1").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn env_overrides_win_over_file() {
        let mut cfg: WagateConfig = toml::from_str("[server]\nport = 4000\n").unwrap();
        apply_env_overrides(&mut cfg, |name| match name {
            "WAGATE_PORT" => Some("5000".into()),
            "WAGATE_API_KEY" => Some("k".into()),
            "WAGATE_AUTH_DIR" => Some("/tmp/wagate-auth".into()),
            _ => None,
        });
        assert_eq!(cfg.server.port, 5000);
        assert_eq!(cfg.auth.api_key(), Some("k"));
        assert_eq!(cfg.whatsapp.auth_dir(), PathBuf::from("/tmp/wagate-auth"));
    }

    #[test]
    fn invalid_port_override_is_ignored() {
        let mut cfg = WagateConfig::default();
        apply_env_overrides(&mut cfg, |name| {
            (name == "WAGATE_PORT").then(|| "not-a-port".to_string())
        });
        assert_eq!(cfg.server.port, 3000);
    }

    #[test]
    fn discovers_in_override_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("wagate.toml"),
            "[whatsapp]\ndevice_name = \"office\"\n",
        )
        .unwrap();
        set_config_dir(dir.path().to_path_buf());
        let path = find_or_default_config_path();
        let cfg = load_config(&path).unwrap();
        clear_config_dir();
        assert_eq!(path, dir.path().join("wagate.toml"));
        assert_eq!(cfg.whatsapp.device_name, "office");
    }
}
