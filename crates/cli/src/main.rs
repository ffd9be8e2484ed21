mod config_commands;
mod credentials_commands;

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "wagate", about = "wagate: WhatsApp HTTP gateway", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server.
    Gateway {
        /// Overrides `server.bind` / `WAGATE_BIND`.
        #[arg(long)]
        bind: Option<String>,
        /// Overrides `server.port` / `WAGATE_PORT`.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
    /// Stored WhatsApp session management.
    Credentials {
        #[command(subcommand)]
        action: credentials_commands::CredentialsAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "wagate starting");

    match cli.command {
        Commands::Gateway { bind, port } => run_gateway(bind, port).await,
        Commands::Config { action } => config_commands::handle_config(action),
        Commands::Credentials { action } => credentials_commands::handle_credentials(action),
    }
}

#[cfg(feature = "whatsapp-web")]
async fn run_gateway(bind: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    use {std::sync::Arc, wagate_whatsapp::web::WebClientFactory};

    let mut config = wagate_config::discover_and_load();
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let factory = Arc::new(WebClientFactory::new(
        config.whatsapp.auth_dir(),
        config.whatsapp.device_name.clone(),
    ));
    wagate_gateway::server::start_gateway(&config, factory).await
}

#[cfg(not(feature = "whatsapp-web"))]
async fn run_gateway(_bind: Option<String>, _port: Option<u16>) -> anyhow::Result<()> {
    anyhow::bail!("this build has no WhatsApp client; rebuild with `--features whatsapp-web`")
}
