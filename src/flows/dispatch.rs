//! Flow dispatch table — routes a completion payload to the handler for its
//! flow type.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::error::FlowError;
use crate::flows::payload::RawFlowPayload;
use crate::flows::token::{FlowType, FlowTokenRecord};

/// What a flow handler accomplished. Discriminated so callers never have to
/// sniff free text.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    TrainerRegistered { phone: String },
    ClientRegistered { phone: String },
    HabitsCreated { count: usize },
    HabitLogged { habit_id: Uuid },
    ProgressAcknowledged { habits: usize },
    TrainerProfileUpdated { phone: String },
    ClientProfileUpdated { phone: String },
}

/// A handler interpreting the completion payload of one flow type.
#[async_trait]
pub trait FlowHandler: Send + Sync {
    fn flow_type(&self) -> FlowType;

    /// Interpret and persist a completion. A failure leaves the token
    /// unconsumed so the client can retry the same flow session.
    async fn handle(
        &self,
        payload: &RawFlowPayload,
        token: &FlowTokenRecord,
    ) -> Result<DispatchOutcome, FlowError>;
}

/// Static mapping from flow type to handler, built once at startup.
pub struct FlowDispatcher {
    handlers: HashMap<FlowType, Arc<dyn FlowHandler>>,
}

impl FlowDispatcher {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler under its flow type.
    pub fn register(mut self, handler: Arc<dyn FlowHandler>) -> Self {
        self.handlers.insert(handler.flow_type(), handler);
        self
    }

    pub fn count(&self) -> usize {
        self.handlers.len()
    }

    /// Dispatch a completion to the handler for the recorded flow-type tag.
    ///
    /// A tag outside the closed enumeration, or one with no registered
    /// handler, indicates a stale client or a corrupted token row. That is
    /// surfaced as `UnknownFlowType` and logged loudly, never swallowed.
    pub async fn dispatch(
        &self,
        flow_tag: &str,
        payload: &RawFlowPayload,
        token: &FlowTokenRecord,
    ) -> Result<DispatchOutcome, FlowError> {
        let Some(flow_type) = FlowType::parse(flow_tag) else {
            tracing::error!(flow_type = %flow_tag, token = %token.token, "Unknown flow type on token");
            return Err(FlowError::UnknownFlowType(flow_tag.to_string()));
        };

        let Some(handler) = self.handlers.get(&flow_type) else {
            tracing::error!(flow_type = %flow_type, "No handler registered for flow type");
            return Err(FlowError::UnknownFlowType(flow_tag.to_string()));
        };

        handler.handle(payload, token).await
    }
}

impl Default for FlowDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
