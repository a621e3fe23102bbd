//! HTTP endpoints of the forwarding server.
//!
//! - `GET /health` – liveness probe
//! - `GET /forward/{short_url}` – how to send a paid message to an endpoint
//! - `POST /forward/{short_url}` – send a message; requires an x402 payment

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use forward_x402_axum::Paygate;
use forward_x402_types::facilitator::Facilitator;
use forward_x402_types::networks::Network;
use serde_json::json;
use std::sync::Arc;
use tracing::instrument;

use crate::mailer::ForwardedEmail;
use crate::state::AppState;
use crate::store::EmailEndpoint;

/// All routes, to be given an [`AppState`].
pub fn routes<F>() -> Router<Arc<AppState<F>>>
where
    F: Facilitator + Send + Sync + 'static,
    F::Error: Send,
{
    Router::new()
        .route("/health", get(get_health))
        .route(
            "/forward/{short_url}",
            get(get_forward_info::<F>).post(post_forward::<F>),
        )
}

fn error_response(status: StatusCode, error: &str) -> Response {
    (status, Json(json!({ "error": error }))).into_response()
}

fn endpoint_not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "Endpoint not found")
}

#[instrument(skip_all)]
pub async fn get_health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// `GET /forward/{short_url}`: describes the endpoint and how to pay for a message.
#[instrument(skip_all)]
pub async fn get_forward_info<F>(
    State(state): State<Arc<AppState<F>>>,
    Path(short_url): Path<String>,
) -> Response {
    let Some(endpoint) = state.store.get_by_short_url(&short_url) else {
        return endpoint_not_found();
    };
    let url = state.settings.forward_url(&endpoint);
    let curl_example = format!(
        r#"curl -X POST {url} \
  -H "Content-Type: application/json" \
  -d '{{
    "email": "your@email.com",
    "subject": "Your Subject Here",
    "message": "Your message content here"
  }}'"#
    );
    let title = if endpoint.label.is_empty() {
        "Email Endpoint"
    } else {
        endpoint.label.as_str()
    };
    Json(json!({
        "title": format!("Forward X402 - {title}"),
        "description": format!("Send Email to {}", endpoint.label),
        "label": endpoint.label,
        "price": format!("{:.6}", endpoint.base_price.0),
        "currency": "USDC",
        "network": Network::from_testnet(state.settings.testnet).to_string(),
        "url": url,
        "curl_example": curl_example,
    }))
    .into_response()
}

/// The JSON body of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardRequest {
    pub email: String,
    pub subject: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ForwardRequestError {
    #[error("Invalid JSON payload")]
    InvalidJson,
    #[error("Missing required fields: email, subject, message")]
    MissingFields,
}

impl ForwardRequest {
    /// Parses a message body. Every field must be a non-empty string.
    pub fn parse(body: &[u8]) -> Result<Self, ForwardRequestError> {
        let value: serde_json::Value =
            serde_json::from_slice(body).map_err(|_| ForwardRequestError::InvalidJson)?;
        let serde_json::Value::Object(fields) = value else {
            return Err(ForwardRequestError::InvalidJson);
        };
        let field = |name: &str| {
            fields
                .get(name)
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .ok_or(ForwardRequestError::MissingFields)
        };
        Ok(ForwardRequest {
            email: field("email")?,
            subject: field("subject")?,
            message: field("message")?,
        })
    }

    fn into_email(self, endpoint: &EmailEndpoint) -> ForwardedEmail {
        ForwardedEmail {
            endpoint_id: endpoint.id.clone(),
            to: endpoint.email.clone(),
            from: self.email,
            subject: self.subject,
            message: self.message,
        }
    }
}

/// `POST /forward/{short_url}`: delivers a message once its x402 payment has settled.
///
/// The hit counter moves on every request to a known endpoint, the payment counter
/// only after delivery.
#[instrument(skip_all)]
pub async fn post_forward<F>(
    State(state): State<Arc<AppState<F>>>,
    Path(short_url): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    F: Facilitator + Send + Sync + 'static,
    F::Error: Send,
{
    let Some(endpoint) = state.store.get_by_short_url(&short_url) else {
        return endpoint_not_found();
    };
    if let Err(err) = state.store.record_hit(&endpoint.id) {
        tracing::warn!(error = %err, "failed to record hit");
    }

    let request = match ForwardRequest::parse(&body) {
        Ok(request) => request,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    };

    let paygate = Paygate::new(
        state.facilitator.clone(),
        endpoint.base_price,
        state.settings.pay_to.clone(),
        state.settings.paygate_config(&endpoint),
    );
    let request_path = format!("/forward/{}", endpoint.short_url);
    let authorized = match paygate.handle_request(&headers, &request_path).await {
        Ok(authorized) => authorized,
        Err(rejection) => return rejection.into_response(),
    };

    let email = request.into_email(&endpoint);
    if let Err(err) = state.mailer.send(&email).await {
        tracing::error!(error = %err, endpoint_id = %endpoint.id, "delivery failed after settlement");
        return authorized.apply(error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Email delivery failed",
        ));
    }
    if let Err(err) = state.store.record_payment(&endpoint.id) {
        tracing::warn!(error = %err, "failed to record payment");
    }

    authorized.apply(Json(json!({
        "success": true,
        "message": "Email sent successfully",
    })))
}
