//! Webhook response router — entry point for flow-completion callbacks.
//!
//! Resolves the callback's token, dispatches to the flow-type handler, and
//! consumes the token only after the handler succeeds. A failed handler
//! leaves the token live so the client can retry the same flow session —
//! a transient storage error must not force the user to restart the form.

use std::sync::Arc;

use serde_json::Value;

use crate::error::FlowError;
use crate::flows::dispatch::{DispatchOutcome, FlowDispatcher};
use crate::flows::payload::RawFlowPayload;
use crate::flows::token::TokenStore;

/// Decryption seam ahead of normalization.
///
/// The platform encrypts flow response payloads with a key exchanged at flow
/// setup; that contract plugs in here. The shipped implementation handles
/// the unencrypted webhook shape.
pub trait PayloadDecryptor: Send + Sync {
    fn decrypt(&self, body: &Value) -> Result<RawFlowPayload, FlowError>;
}

/// Accepts an already-plaintext JSON completion body.
pub struct PassthroughDecryptor;

impl PayloadDecryptor for PassthroughDecryptor {
    fn decrypt(&self, body: &Value) -> Result<RawFlowPayload, FlowError> {
        RawFlowPayload::from_value(body.clone())
    }
}

/// Routes flow-completion callbacks to their domain handlers.
pub struct WebhookRouter {
    tokens: TokenStore,
    dispatcher: FlowDispatcher,
    decryptor: Arc<dyn PayloadDecryptor>,
}

impl WebhookRouter {
    pub fn new(
        tokens: TokenStore,
        dispatcher: FlowDispatcher,
        decryptor: Arc<dyn PayloadDecryptor>,
    ) -> Self {
        Self {
            tokens,
            dispatcher,
            decryptor,
        }
    }

    /// Process one flow-completion callback body.
    pub async fn handle_completion(&self, body: &Value) -> Result<DispatchOutcome, FlowError> {
        let payload = self.decryptor.decrypt(body)?;

        let Some(token) = payload.flow_token().map(str::to_string) else {
            tracing::warn!("Completion callback without a flow token");
            return Err(FlowError::MissingToken);
        };

        let Some(record) = self.tokens.resolve(&token).await? else {
            tracing::info!(token = %token, "Completion for invalid or expired token");
            return Err(FlowError::InvalidOrExpiredToken);
        };

        // Handler failure propagates here and the token stays live.
        let outcome = self
            .dispatcher
            .dispatch(&record.flow_type, &payload, &record)
            .await?;

        // One-shot semantics: exactly one of two racing completions sees the
        // delete succeed; the other observes an already-consumed token.
        match self.tokens.consume(&token).await {
            Ok(true) => Ok(outcome),
            Ok(false) => {
                tracing::warn!(token = %token, "Token consumed by a concurrent completion");
                Err(FlowError::InvalidOrExpiredToken)
            }
            Err(e) => {
                // The handler's effects are already durable; failing the
                // whole completion now would make the user resubmit work
                // that succeeded. Surface it to the operator instead.
                tracing::error!(token = %token, "Failed to consume token after success: {e}");
                Ok(outcome)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::normalize::{LabelCatalog, PayloadNormalizer};
    use crate::flows::token::{FlowTokenRecord, FlowType};
    use crate::onboarding::handlers::TrainerOnboardingHandler;
    use crate::store::{Database, LibSqlBackend};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::time::Duration;

    async fn router() -> (WebhookRouter, Arc<dyn Database>, TokenStore) {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let normalizer = Arc::new(PayloadNormalizer::new(LabelCatalog::default(), dec!(100)));
        let dispatcher = FlowDispatcher::new().register(Arc::new(TrainerOnboardingHandler::new(
            Arc::clone(&db),
            normalizer,
        )));
        let tokens = TokenStore::new(Arc::clone(&db));
        let router = WebhookRouter::new(
            tokens.clone(),
            dispatcher,
            Arc::new(PassthroughDecryptor),
        );
        (router, db, tokens)
    }

    fn trainer_body(token: &str) -> Value {
        json!({
            "flow_token": token,
            "full_name": "Thandi Mokoena",
            "email": "thandi@example.com",
            "specializations": ["yoga"],
            "services": ["online_coaching"],
            "price_per_session": "350",
            "terms_accepted": true
        })
    }

    #[tokio::test]
    async fn missing_token_fails_fast() {
        let (router, _db, _tokens) = router().await;
        let err = router
            .handle_completion(&json!({"full_name": "x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::MissingToken));
    }

    #[tokio::test]
    async fn unknown_token_is_invalid() {
        let (router, _db, _tokens) = router().await;
        let err = router
            .handle_completion(&trainer_body("no-such-token"))
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::InvalidOrExpiredToken));
    }

    #[tokio::test]
    async fn expired_token_is_invalid() {
        let (router, _db, tokens) = router().await;
        let token = tokens
            .issue("+27821234567", FlowType::TrainerOnboarding, json!({}), Duration::ZERO)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let err = router
            .handle_completion(&trainer_body(&token))
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::InvalidOrExpiredToken));
    }

    #[tokio::test]
    async fn success_consumes_token_and_blocks_resubmission() {
        let (router, db, tokens) = router().await;
        let token = tokens
            .issue(
                "+27821234567",
                FlowType::TrainerOnboarding,
                json!({}),
                Duration::from_secs(600),
            )
            .await
            .unwrap();

        let outcome = router.handle_completion(&trainer_body(&token)).await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::TrainerRegistered { .. }));
        assert!(db
            .get_trainer_by_phone("+27821234567")
            .await
            .unwrap()
            .is_some());

        let err = router
            .handle_completion(&trainer_body(&token))
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::InvalidOrExpiredToken));
    }

    #[tokio::test]
    async fn handler_failure_leaves_token_live_for_retry() {
        let (router, _db, tokens) = router().await;
        let token = tokens
            .issue(
                "+27821234567",
                FlowType::TrainerOnboarding,
                json!({}),
                Duration::from_secs(600),
            )
            .await
            .unwrap();

        // First submission is invalid — validation fails, token survives.
        let err = router
            .handle_completion(&json!({"flow_token": token, "full_name": "Thandi"}))
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Validation(_)));
        assert!(tokens.resolve(&token).await.unwrap().is_some());

        // Corrected resubmission of the same session succeeds.
        let outcome = router.handle_completion(&trainer_body(&token)).await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::TrainerRegistered { .. }));
    }

    #[tokio::test]
    async fn corrupt_flow_type_surfaces_and_keeps_token() {
        let (router, db, tokens) = router().await;
        let record = FlowTokenRecord {
            token: "corrupt-1".into(),
            phone: "+27821234567".into(),
            flow_type: "payment_checkout".into(),
            context: json!({}),
            created_at: Utc::now(),
            expires_at: Utc::now() + chrono::Duration::seconds(600),
        };
        db.insert_flow_token(&record).await.unwrap();

        let err = router
            .handle_completion(&trainer_body("corrupt-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::UnknownFlowType(_)));
        assert!(tokens.resolve("corrupt-1").await.unwrap().is_some());
    }
}
