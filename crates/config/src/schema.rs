/// Config schema types (server, auth, whatsapp session).
use std::{path::PathBuf, time::Duration};

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize, Serializer},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WagateConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub whatsapp: WhatsAppConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 3000,
        }
    }
}

/// API authentication.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared secret expected as `Authorization: Bearer <key>`.
    /// Empty or absent disables the check entirely.
    #[serde(
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub api_key: Option<Secret<String>>,
}

impl AuthConfig {
    /// The configured key, if it is non-empty.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_ref()
            .map(|k| k.expose_secret().as_str())
            .filter(|k| !k.is_empty())
    }
}

/// WhatsApp session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhatsAppConfig {
    /// Directory holding the persisted credential bundle.
    /// Defaults to `~/.wagate/auth`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_dir: Option<PathBuf>,

    /// Fixed delay before reconnecting after a non-terminal close.
    pub reconnect_delay_secs: u64,

    /// Upper bound for the registration check plus the send itself.
    pub send_timeout_secs: u64,

    /// Upper bound for one connection attempt, including the handshake.
    pub connect_timeout_secs: u64,

    /// Device name shown in the phone's "linked devices" list.
    pub device_name: String,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            auth_dir: None,
            reconnect_delay_secs: 3,
            send_timeout_secs: 30,
            connect_timeout_secs: 60,
            device_name: "wagate".into(),
        }
    }
}

impl WhatsAppConfig {
    pub fn auth_dir(&self) -> PathBuf {
        self.auth_dir
            .clone()
            .unwrap_or_else(|| crate::loader::data_dir().join("auth"))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Write an optional secret as its plain value.
pub fn serialize_option_secret<S: Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = WagateConfig::default();
        assert_eq!(cfg.server.port, 3000);
        assert_eq!(cfg.server.bind, "0.0.0.0");
        assert!(cfg.auth.api_key().is_none());
        assert_eq!(cfg.whatsapp.reconnect_delay(), Duration::from_secs(3));
        assert_eq!(cfg.whatsapp.send_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.whatsapp.connect_timeout(), Duration::from_secs(60));
        assert!(cfg.whatsapp.auth_dir().ends_with("auth"));
    }

    #[test]
    fn empty_api_key_is_disabled() {
        let auth = AuthConfig {
            api_key: Some(Secret::new(String::new())),
        };
        assert!(auth.api_key().is_none());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: WagateConfig = toml::from_str(
            r#"
            [server]
            port = 8080

            [auth]
            api_key = "s3cret"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.server.bind, "0.0.0.0");
        assert_eq!(cfg.auth.api_key(), Some("s3cret"));
        assert_eq!(cfg.whatsapp.device_name, "wagate");
    }

    #[test]
    fn api_key_round_trips_through_toml() {
        let mut cfg = WagateConfig::default();
        cfg.auth.api_key = Some(Secret::new("abc".into()));
        let raw = toml::to_string_pretty(&cfg).unwrap();
        assert!(raw.contains("api_key = \"abc\""));
        let back: WagateConfig = toml::from_str(&raw).unwrap();
        assert_eq!(back.auth.api_key(), Some("abc"));
    }

    #[test]
    fn missing_api_key_is_not_written() {
        let raw = toml::to_string_pretty(&WagateConfig::default()).unwrap();
        assert!(!raw.contains("api_key"));
        assert!(!raw.contains("auth_dir"));
    }
}
