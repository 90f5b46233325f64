//! HTTP surface — webhook verification, flow completions, inbound texts,
//! and outbound-send triggers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::error::{Error, FlowError, StorageError};
use crate::flows::router::WebhookRouter;
use crate::flows::sender::FlowSender;
use crate::flows::token::FlowType;
use crate::gateway::MessagingGateway;
use crate::onboarding::model::OnboardingDomain;
use crate::onboarding::text::TextRegistrar;

/// Shared state for the webhook routes.
#[derive(Clone)]
pub struct AppState {
    pub sender: Arc<FlowSender>,
    pub router: Arc<WebhookRouter>,
    pub registrar: Arc<TextRegistrar>,
    pub gateway: Arc<dyn MessagingGateway>,
    pub verify_token: Arc<str>,
}

/// Query parameters of the platform's webhook verification handshake.
#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    mode: String,
    #[serde(rename = "hub.verify_token")]
    verify_token: String,
    #[serde(rename = "hub.challenge")]
    challenge: String,
}

/// GET /webhook
///
/// Echoes the challenge if the verify token matches.
async fn verify_webhook(
    State(state): State<AppState>,
    Query(params): Query<VerifyParams>,
) -> impl IntoResponse {
    if params.mode == "subscribe" && params.verify_token == *state.verify_token {
        (StatusCode::OK, params.challenge).into_response()
    } else {
        tracing::warn!(mode = %params.mode, "Webhook verification rejected");
        StatusCode::FORBIDDEN.into_response()
    }
}

/// POST /webhook/flow
///
/// Entry point for a flow-completion callback.
async fn flow_completion(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    match state.router.handle_completion(&body).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "outcome": outcome })),
        )
            .into_response(),
        Err(e) => flow_error_response(e).into_response(),
    }
}

/// An inbound plain-text message relayed by the platform webhook.
#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    pub from: String,
    pub body: String,
}

/// POST /webhook/message
///
/// Drives any active text registration conversation.
async fn inbound_message(
    State(state): State<AppState>,
    Json(message): Json<InboundMessage>,
) -> impl IntoResponse {
    match state
        .registrar
        .handle_inbound(&message.from, &message.body)
        .await
    {
        Ok(Some(reply)) => {
            if let Err(e) = state
                .gateway
                .send_text_message(&message.from, &reply)
                .await
            {
                tracing::warn!(to = %message.from, "Failed to send registration reply: {e}");
            }
            Json(json!({ "status": "ok", "handled": true })).into_response()
        }
        Ok(None) => Json(json!({ "status": "ok", "handled": false })).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct StartOnboardingRequest {
    pub phone: String,
}

/// POST /api/onboarding/{domain}/start
///
/// Triggers an onboarding send for the given domain.
async fn start_onboarding(
    State(state): State<AppState>,
    Path(domain): Path<String>,
    Json(request): Json<StartOnboardingRequest>,
) -> impl IntoResponse {
    let Some(domain) = OnboardingDomain::parse(&domain) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "status": "error", "error": "unknown_domain" })),
        )
            .into_response();
    };

    match state.sender.send_onboarding(domain, &request.phone).await {
        Ok(outcome) => Json(json!({ "status": "ok", "outcome": outcome })).into_response(),
        Err(e) => error_response(e.into()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct SendFlowRequest {
    pub flow_type: String,
    pub phone: String,
    #[serde(default)]
    pub context: Value,
}

/// POST /api/flows/send
///
/// Triggers a non-onboarding flow send.
async fn send_flow(
    State(state): State<AppState>,
    Json(request): Json<SendFlowRequest>,
) -> impl IntoResponse {
    let Some(flow_type) = FlowType::parse(&request.flow_type) else {
        return flow_error_response(FlowError::UnknownFlowType(request.flow_type))
            .into_response();
    };

    let context = if request.context.is_null() {
        json!({})
    } else {
        request.context
    };

    match state
        .sender
        .send_flow(flow_type, &request.phone, context)
        .await
    {
        Ok(token) => Json(json!({ "status": "ok", "token": token })).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

/// Build the webhook router.
pub fn webhook_routes(state: AppState) -> Router {
    Router::new()
        .route("/webhook", get(verify_webhook))
        .route("/webhook/flow", post(flow_completion))
        .route("/webhook/message", post(inbound_message))
        .route("/api/onboarding/{domain}/start", post(start_onboarding))
        .route("/api/flows/send", post(send_flow))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

fn flow_error_response(error: FlowError) -> (StatusCode, Json<Value>) {
    match &error {
        FlowError::MissingToken => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "status": "error", "error": "missing_token" })),
        ),
        FlowError::MalformedPayload(detail) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "status": "error", "error": "malformed_payload", "detail": detail })),
        ),
        FlowError::InvalidOrExpiredToken => (
            StatusCode::GONE,
            Json(json!({ "status": "error", "error": "invalid_or_expired_token" })),
        ),
        FlowError::Validation(report) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "status": "error", "error": "validation_failed", "validation": report })),
        ),
        FlowError::UnknownFlowType(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "status": "error", "error": "unknown_flow_type" })),
        ),
        FlowError::Storage(e) => storage_error_response(e),
    }
}

fn storage_error_response(error: &StorageError) -> (StatusCode, Json<Value>) {
    let status = match error {
        StorageError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(json!({ "status": "error", "error": "storage_error" })),
    )
}

fn error_response(error: Error) -> (StatusCode, Json<Value>) {
    match error {
        Error::Flow(e) => flow_error_response(e),
        Error::Storage(e) => storage_error_response(&e),
        Error::Gateway(e) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "status": "error", "error": "gateway_error", "detail": e.to_string() })),
        ),
        Error::Config(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "status": "error", "error": "configuration_error" })),
        ),
    }
}
