//! WhatsApp Cloud API gateway — sends flow and text messages via the
//! Graph API messages endpoint.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::error::GatewayError;
use crate::gateway::message::{FlowMessage, text_api_payload};

const GRAPH_API_BASE: &str = "https://graph.facebook.com/v21.0";

/// Outbound messaging seam. The send controller and registrar talk to this
/// trait; tests substitute an in-process fake.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Deliver a structured flow message.
    async fn send_flow_message(&self, message: &FlowMessage) -> Result<(), GatewayError>;

    /// Deliver a plain text message.
    async fn send_text_message(&self, to: &str, body: &str) -> Result<(), GatewayError>;
}

/// WhatsApp Cloud API implementation.
pub struct WhatsAppGateway {
    phone_number_id: String,
    access_token: SecretString,
    client: reqwest::Client,
    api_base: String,
}

impl WhatsAppGateway {
    pub fn new(phone_number_id: String, access_token: SecretString) -> Self {
        Self {
            phone_number_id,
            access_token,
            client: reqwest::Client::new(),
            api_base: GRAPH_API_BASE.to_string(),
        }
    }

    /// Point the gateway at a different API base (tests only).
    #[cfg(test)]
    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = base.to_string();
        self
    }

    fn messages_url(&self) -> String {
        format!("{}/{}/messages", self.api_base, self.phone_number_id)
    }

    async fn post_message(
        &self,
        to: &str,
        body: serde_json::Value,
    ) -> Result<(), GatewayError> {
        let resp = self
            .client
            .post(self.messages_url())
            .bearer_auth(self.access_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Http(e.to_string()))?;

        if resp.status().is_success() {
            return Ok(());
        }

        let status = resp.status();
        let error_body = resp.text().await.unwrap_or_default();
        Err(GatewayError::DeliveryFailed {
            to: to.to_string(),
            reason: format!("messages endpoint returned {status}: {error_body}"),
        })
    }
}

#[async_trait]
impl MessagingGateway for WhatsAppGateway {
    async fn send_flow_message(&self, message: &FlowMessage) -> Result<(), GatewayError> {
        tracing::debug!(to = %message.to, flow_id = %message.flow_id, "Sending flow message");
        self.post_message(&message.to, message.to_api_payload())
            .await
    }

    async fn send_text_message(&self, to: &str, body: &str) -> Result<(), GatewayError> {
        tracing::debug!(to = %to, "Sending text message");
        self.post_message(to, text_api_payload(to, body)).await
    }
}
