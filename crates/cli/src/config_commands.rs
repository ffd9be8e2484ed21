use {anyhow::Result, clap::Subcommand, secrecy::Secret, wagate_config::WagateConfig};

const REDACTED: &str = "********";

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the path of the config file in use.
    Path,
    /// Print the effective config (file plus env overrides) as TOML.
    Show,
}

pub fn handle_config(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Path => {
            println!("{}", wagate_config::find_or_default_config_path().display());
            Ok(())
        },
        ConfigAction::Show => {
            let config = wagate_config::discover_and_load();
            print!("{}", render_redacted(&config)?);
            Ok(())
        },
    }
}

/// TOML rendering with the API key masked.
fn render_redacted(config: &WagateConfig) -> Result<String> {
    let mut shown = config.clone();
    if shown.auth.api_key().is_some() {
        shown.auth.api_key = Some(Secret::new(REDACTED.to_string()));
    }
    Ok(toml::to_string_pretty(&shown)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn show_masks_api_key() {
        let mut config = WagateConfig::default();
        config.auth.api_key = Some(Secret::new("hunter2".into()));
        let out = render_redacted(&config).unwrap();
        assert!(!out.contains("hunter2"));
        assert!(out.contains(REDACTED));
        assert!(out.contains("port = 3000"));
    }

    #[test]
    fn show_without_key() {
        let out = render_redacted(&WagateConfig::default()).unwrap();
        assert!(!out.contains("api_key"));
        assert!(out.contains("[whatsapp]"));
    }
}
