use std::{net::SocketAddr, sync::Arc};

use {
    axum::{
        Json, Router,
        extract::State,
        middleware,
        response::{Html, IntoResponse},
        routing::{get, post},
    },
    tower_http::{
        cors::{Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::{info, warn},
};

use {
    wagate_config::WagateConfig,
    wagate_whatsapp::{
        ClientFactory, Coordinator, CoordinatorConfig, CredentialStore, FileCredentialStore,
    },
};

use crate::{
    api,
    auth::{self, AuthMode},
    state::GatewayState,
};

const QR_PAGE: &str = include_str!("assets/qr.html");

// ── Server startup ───────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(state: Arc<GatewayState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let protected = Router::new()
        .route("/api/status", get(api::status))
        .route("/api/qr", get(api::qr))
        .route("/api/send-message", post(api::send_message))
        .route("/api/logout", post(api::logout))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::require_bearer,
        ));

    Router::new()
        .route("/health", get(health_handler))
        .route("/qr", get(qr_page_handler))
        .merge(protected)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the WhatsApp session and serve the HTTP API until Ctrl-C.
pub async fn start_gateway(
    config: &WagateConfig,
    factory: Arc<dyn ClientFactory>,
) -> anyhow::Result<()> {
    let auth_dir = config.whatsapp.auth_dir();
    let store: Arc<dyn CredentialStore> = Arc::new(FileCredentialStore::new(auth_dir.clone()));
    let coordinator = Coordinator::new(
        factory,
        store,
        CoordinatorConfig::from_config(&config.whatsapp),
    );
    coordinator.start().await?;

    let resolved_auth = auth::resolve_auth(config.auth.api_key());
    if resolved_auth.mode == AuthMode::Open {
        warn!("no API key configured, /api routes are open to anyone who can reach them");
    }

    let state = GatewayState::new(coordinator.clone(), resolved_auth);
    let app = build_gateway_app(Arc::clone(&state));

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Startup banner.
    let lines = [
        format!("wagate gateway v{}", state.version),
        format!("listening on http://{addr}"),
        format!("pairing page: http://{addr}/qr"),
        format!("auth dir: {}", auth_dir.display()),
        format!(
            "api auth: {}",
            match state.auth.mode {
                AuthMode::Open => "open",
                AuthMode::Bearer => "bearer",
            }
        ),
    ];
    let width = lines.iter().map(|l| l.len()).max().unwrap_or(0) + 4;
    info!("┌{}┐", "─".repeat(width));
    for line in &lines {
        info!("│  {:<w$}│", line, w = width - 2);
    }
    info!("└{}┘", "─".repeat(width));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let status = state.coordinator.status().await;
    Json(serde_json::json!({
        "status": "ok",
        "connected": status.connected,
    }))
}

async fn qr_page_handler() -> Html<&'static str> {
    Html(QR_PAGE)
}
