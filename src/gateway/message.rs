//! Outbound message documents for the WhatsApp Cloud API.

use serde::Serialize;
use serde_json::{Value, json};

/// Interactive-message version pinned by the Cloud API flow contract.
const FLOW_MESSAGE_VERSION: &str = "3";

/// A declarative flow message: recipient, framing text, and an action block
/// carrying the correlation token, flow id, and initial screen.
#[derive(Debug, Clone, Serialize)]
pub struct FlowMessage {
    pub to: String,
    pub header: String,
    pub body: String,
    pub footer: String,
    pub flow_token: String,
    pub flow_id: String,
    pub initial_screen: String,
    /// Label on the call-to-action button.
    pub cta: String,
}

impl FlowMessage {
    /// Render as the Cloud API `interactive.flow` request body.
    pub fn to_api_payload(&self) -> Value {
        json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": self.to,
            "type": "interactive",
            "interactive": {
                "type": "flow",
                "header": { "type": "text", "text": self.header },
                "body": { "text": self.body },
                "footer": { "text": self.footer },
                "action": {
                    "name": "flow",
                    "parameters": {
                        "flow_message_version": FLOW_MESSAGE_VERSION,
                        "flow_token": self.flow_token,
                        "flow_id": self.flow_id,
                        "flow_cta": self.cta,
                        "flow_action": "navigate",
                        "flow_action_payload": { "screen": self.initial_screen }
                    }
                }
            }
        })
    }
}

/// Render a plain text message as the Cloud API request body.
pub fn text_api_payload(to: &str, body: &str) -> Value {
    json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": to,
        "type": "text",
        "text": { "body": body }
    })
}
