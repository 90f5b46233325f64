//! Messaging gateway abstraction for outbound WhatsApp traffic.

pub mod message;
pub mod whatsapp;

pub use message::FlowMessage;
pub use whatsapp::{MessagingGateway, WhatsAppGateway};
