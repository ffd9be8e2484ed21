//! Mapping of session errors onto HTTP responses.

use {
    axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    serde_json::json,
    tracing::warn,
};

use wagate_whatsapp::Error;

/// Error returned by API handlers.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "Unauthorized")
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_REQUEST", message)
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let (status, code) = match &err {
            Error::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            Error::NotConnected => (StatusCode::SERVICE_UNAVAILABLE, "NOT_CONNECTED"),
            Error::RecipientNotRegistered(_) => (StatusCode::NOT_FOUND, "RECIPIENT_NOT_REGISTERED"),
            Error::SendTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, "SEND_TIMEOUT"),
            Error::SendFailure(_) => (StatusCode::INTERNAL_SERVER_ERROR, "SEND_FAILURE"),
            Error::StoreUnavailable(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_UNAVAILABLE"),
            Error::AlreadyStarted
            | Error::ProtocolClosed(_)
            | Error::Qr(_)
            | Error::Client(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };
        if status.is_server_error() {
            warn!(error = %err, "request failed");
        }
        Self::new(status, code, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "success": false,
            "error": self.message,
            "code": self.code,
        });
        (self.status, Json(body)).into_response()
    }
}
