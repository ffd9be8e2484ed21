use std::sync::Arc;

use wagate_whatsapp::Coordinator;

use crate::auth::ResolvedAuth;

/// Shared state handed to every route.
pub struct GatewayState {
    /// The single WhatsApp session.
    pub coordinator: Coordinator,
    /// Auth configuration.
    pub auth: ResolvedAuth,
    /// Server version string.
    pub version: String,
}

impl GatewayState {
    pub fn new(coordinator: Coordinator, auth: ResolvedAuth) -> Arc<Self> {
        Arc::new(Self {
            coordinator,
            auth,
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }
}
