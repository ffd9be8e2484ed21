//! Configuration loading for the gateway.
//!
//! A single `wagate.{toml,yaml,yml,json}` file is discovered, `${ENV}`
//! placeholders are substituted, and `WAGATE_*` environment variables are
//! layered on top.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{
        apply_env_overrides, clear_config_dir, config_dir, data_dir, discover_and_load,
        find_or_default_config_path, load_config, set_config_dir,
    },
    schema::{AuthConfig, ServerConfig, WagateConfig, WhatsAppConfig},
};
