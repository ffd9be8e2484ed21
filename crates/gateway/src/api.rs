//! `/api/*` route handlers.

use std::sync::Arc;

use {
    axum::{
        Json,
        extract::{State, rejection::JsonRejection},
        response::{IntoResponse, Response},
    },
    serde::Deserialize,
    serde_json::json,
    tracing::info,
};

use wagate_whatsapp::StatusView;

use crate::{error::ApiError, state::GatewayState};

pub async fn status(State(state): State<Arc<GatewayState>>) -> Json<StatusView> {
    Json(state.coordinator.status().await)
}

/// Pending pairing image, or why there is none.
pub async fn qr(State(state): State<Arc<GatewayState>>) -> Response {
    let snapshot = state.coordinator.snapshot().await;
    let body = if snapshot.connected {
        json!({ "connected": true, "message": "Already connected" })
    } else if let Some(qr) = snapshot.pending_qr {
        json!({ "qr": qr })
    } else {
        json!({ "message": "QR code not available yet, retry shortly" })
    };
    Json(body).into_response()
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub phone: Option<String>,
    pub message: Option<String>,
}

pub async fn send_message(
    State(state): State<Arc<GatewayState>>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let (Some(phone), Some(message)) = (req.phone, req.message) else {
        return Err(ApiError::bad_request("phone and message are required"));
    };
    state.coordinator.send_message(&phone, &message).await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn logout(
    State(state): State<Arc<GatewayState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.coordinator.logout().await?;
    info!("session logged out via api");
    Ok(Json(json!({ "success": true })))
}
