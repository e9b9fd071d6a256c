use crate::models::api::{ ChatReply, ErrorBody, HealthStatus };
use crate::runner::TextGenerator;
use std::num::NonZeroU32;
use std::sync::Arc;
use axum::{
    routing::{ get, post },
    Router,
    body::Bytes,
    extract::{ DefaultBodyLimit, State },
    extract::rejection::BytesRejection,
    response::{ IntoResponse, Response },
    http::StatusCode,
    Json,
};
use serde_json::Value;
use governor::{ DefaultDirectRateLimiter, Quota, RateLimiter };
use tower_http::cors::{ Any, CorsLayer };
use log::{ info, warn, error };

pub const MESSAGE_REQUIRED: &str = "Message is required";
pub const PROCESSING_ERROR: &str = "Error processing your request";
pub const INTERNAL_ERROR: &str = "Internal server error";
pub const RATE_LIMITED: &str = "Too many requests";
pub const MESSAGE_TOO_LARGE: &str = "Message too large";

#[derive(Clone)]
pub struct AppState {
    generator: Arc<dyn TextGenerator>,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl AppState {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator, limiter: None }
    }

    /// Caps `/api/chat` at `per_second` requests globally. Zero disables the cap.
    pub fn with_rate_limit(mut self, per_second: u32) -> Self {
        self.limiter = NonZeroU32::new(per_second).map(|n|
            Arc::new(RateLimiter::direct(Quota::per_second(n)))
        );
        self
    }
}

pub fn router(state: AppState, max_message_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/api/health", get(health_handler))
        .layer(DefaultBodyLimit::max(max_message_bytes))
        .layer(cors)
        .with_state(state)
}

fn error_response(code: StatusCode, message: &str) -> Response {
    (code, Json(ErrorBody::new(message))).into_response()
}

/// Pulls the message out of a raw body, regardless of content type.
/// Missing or falsy `message` is a client error; anything that cannot be
/// read as a text message is an unexpected one.
fn extract_message(body: &[u8]) -> Result<String, (StatusCode, &'static str)> {
    let value: Value = serde_json::from_slice(body).map_err(|e| {
        warn!("Undecodable chat request body: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
    })?;

    let message = match value {
        Value::Object(mut fields) => fields.remove("message").unwrap_or(Value::Null),
        Value::Null => {
            warn!("Chat request body is JSON null");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR));
        }
        _ => Value::Null,
    };

    match message {
        Value::String(text) if !text.is_empty() => Ok(text),
        ref falsy if is_falsy(falsy) => Err((StatusCode::BAD_REQUEST, MESSAGE_REQUIRED)),
        other => {
            warn!("Chat request message is not text: {}", other);
            Err((StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR))
        }
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().map(|f| f == 0.0).unwrap_or(false),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

async fn chat_handler(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(e) => {
            warn!("Rejected chat request body: {}", e);
            let text = match e.status() {
                StatusCode::PAYLOAD_TOO_LARGE => MESSAGE_TOO_LARGE,
                _ => INTERNAL_ERROR,
            };
            return error_response(e.status(), text);
        }
    };
    let message = match extract_message(&body) {
        Ok(message) => message,
        Err((code, text)) => {
            return error_response(code, text);
        }
    };

    if let Some(limiter) = &state.limiter {
        if limiter.check().is_err() {
            warn!("Chat rate limit exceeded. Rejecting request.");
            return error_response(StatusCode::TOO_MANY_REQUESTS, RATE_LIMITED);
        }
    }

    info!("Chat request received ({} bytes)", message.len());
    match state.generator.generate(&message).await {
        Ok(response) => (StatusCode::OK, Json(ChatReply { response })).into_response(),
        Err(e) if e.is_processing_failure() => {
            error!("External program error: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, PROCESSING_ERROR)
        }
        Err(e) => {
            error!("Error: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
        }
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthStatus { status: "ok".into() })
}
