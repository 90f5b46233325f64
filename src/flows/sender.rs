//! Send-with-fallback controller — delivers an onboarding entry point,
//! preferring a structured flow and degrading per the domain's policy.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use crate::config::AppConfig;
use crate::error::{Error, StorageError};
use crate::flows::token::{FlowType, TokenStore};
use crate::gateway::{FlowMessage, MessagingGateway};
use crate::onboarding::model::OnboardingDomain;
use crate::onboarding::text::{TextRegistrar, TextRegistrationState};
use crate::store::Database;

/// Text sent when a flow cannot be delivered and no fallback applies.
const FORM_UNAVAILABLE_TEXT: &str =
    "Our registration form is temporarily unavailable. Please try again a little later.";

/// Outcome of an onboarding send. The variants are mutually exclusive and
/// exhaustive; callers discriminate on the variant, never on free text.
#[derive(Debug, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SendOutcome {
    /// A record already exists for this phone; no token was minted.
    AlreadyRegistered { domain: OnboardingDomain },
    /// The flow went out; the token correlates the eventual completion.
    FlowSent { token: String },
    /// Delivery failed and the domain degrades to text registration.
    TextFallbackStarted {
        reason: String,
        state: TextRegistrationState,
    },
    /// Delivery failed and the domain does not degrade.
    Failed { reason: String },
}

/// Delivers onboarding flows and other token-correlated flows.
pub struct FlowSender {
    db: Arc<dyn Database>,
    gateway: Arc<dyn MessagingGateway>,
    tokens: TokenStore,
    registrar: Arc<TextRegistrar>,
    config: Arc<AppConfig>,
}

impl FlowSender {
    pub fn new(
        db: Arc<dyn Database>,
        gateway: Arc<dyn MessagingGateway>,
        tokens: TokenStore,
        registrar: Arc<TextRegistrar>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            gateway,
            tokens,
            registrar,
            config,
        }
    }

    /// Deliver an onboarding entry point for the given domain.
    ///
    /// A storage failure during the idempotency check surfaces as an error:
    /// "could not check" must never be conflated with "not registered".
    pub async fn send_onboarding(
        &self,
        domain: OnboardingDomain,
        phone: &str,
    ) -> Result<SendOutcome, StorageError> {
        // Idempotency guard, before any token is minted.
        let already = match domain {
            OnboardingDomain::Trainer => {
                self.db.get_trainer_by_phone(phone).await?.is_some()
            }
            OnboardingDomain::Client => self.db.get_client_by_phone(phone).await?.is_some(),
        };
        if already {
            tracing::info!(phone = %phone, domain = %domain, "Already registered; no flow sent");
            return Ok(SendOutcome::AlreadyRegistered { domain });
        }

        let flow_type = match domain {
            OnboardingDomain::Trainer => FlowType::TrainerOnboarding,
            OnboardingDomain::Client => FlowType::ClientOnboarding,
        };
        let token = self
            .tokens
            .issue(
                phone,
                flow_type,
                json!({ "domain": domain.as_str() }),
                self.config.token_ttl,
            )
            .await?;

        let message = self.build_message(flow_type, phone, &token);
        match self.gateway.send_flow_message(&message).await {
            Ok(()) => {
                tracing::info!(phone = %phone, domain = %domain, "Onboarding flow sent");
                Ok(SendOutcome::FlowSent { token })
            }
            Err(e) => {
                let reason = e.to_string();
                tracing::warn!(phone = %phone, domain = %domain, "Flow delivery failed: {reason}");

                // The fresh token will never complete; drop it rather than
                // letting it linger until TTL.
                if let Err(e) = self.tokens.consume(&token).await {
                    tracing::warn!(token = %token, "Failed to discard unsent token: {e}");
                }

                if self.config.fallback_enabled(domain) {
                    self.start_text_fallback(domain, phone, reason).await
                } else {
                    self.notify_unavailable(phone).await;
                    Ok(SendOutcome::Failed { reason })
                }
            }
        }
    }

    /// Deliver a non-onboarding flow (habit setup/logging, progress, profile
    /// edit). No idempotency guard and no text fallback apply; a delivery
    /// failure discards the token and surfaces as an error.
    pub async fn send_flow(
        &self,
        flow_type: FlowType,
        phone: &str,
        context: serde_json::Value,
    ) -> Result<String, Error> {
        let token = self
            .tokens
            .issue(phone, flow_type, context, self.config.token_ttl)
            .await?;

        let message = self.build_message(flow_type, phone, &token);
        if let Err(e) = self.gateway.send_flow_message(&message).await {
            if let Err(consume_err) = self.tokens.consume(&token).await {
                tracing::warn!(token = %token, "Failed to discard unsent token: {consume_err}");
            }
            return Err(e.into());
        }

        tracing::info!(phone = %phone, flow_type = %flow_type, "Flow sent");
        Ok(token)
    }

    fn build_message(&self, flow_type: FlowType, phone: &str, token: &str) -> FlowMessage {
        let template = self.config.flows.template(flow_type);
        FlowMessage {
            to: phone.to_string(),
            header: template.header.clone(),
            body: template.body.clone(),
            footer: template.footer.clone(),
            flow_token: token.to_string(),
            flow_id: template.flow_id.clone(),
            initial_screen: template.initial_screen.clone(),
            cta: template.cta.clone(),
        }
    }

    async fn start_text_fallback(
        &self,
        domain: OnboardingDomain,
        phone: &str,
        reason: String,
    ) -> Result<SendOutcome, StorageError> {
        let (state, prompt) = self.registrar.start(domain, phone).await?;
        tracing::info!(phone = %phone, domain = %domain, "Text registration fallback started");

        // The opening question is best-effort; the conversation state is
        // already durable, so an inbound message still picks it up.
        if let Err(e) = self.gateway.send_text_message(phone, prompt).await {
            tracing::warn!(phone = %phone, "Failed to send fallback opening prompt: {e}");
        }

        Ok(SendOutcome::TextFallbackStarted { reason, state })
    }

    /// Best-effort "form unavailable" notice; its own failure is logged and
    /// does not change the overall outcome.
    async fn notify_unavailable(&self, phone: &str) {
        if let Err(e) = self
            .gateway
            .send_text_message(phone, FORM_UNAVAILABLE_TEXT)
            .await
        {
            tracing::warn!(phone = %phone, "Failed to send unavailable notice: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use crate::flows::normalize::{LabelCatalog, PayloadNormalizer};
    use crate::store::LibSqlBackend;
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    /// In-process gateway fake recording every send attempt.
    struct FakeGateway {
        fail_flows: bool,
        fail_texts: bool,
        flows: Mutex<Vec<FlowMessage>>,
        texts: Mutex<Vec<(String, String)>>,
    }

    impl FakeGateway {
        fn new(fail_flows: bool, fail_texts: bool) -> Arc<Self> {
            Arc::new(Self {
                fail_flows,
                fail_texts,
                flows: Mutex::new(Vec::new()),
                texts: Mutex::new(Vec::new()),
            })
        }

        fn flow_count(&self) -> usize {
            self.flows.lock().unwrap().len()
        }

        fn text_count(&self) -> usize {
            self.texts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl MessagingGateway for FakeGateway {
        async fn send_flow_message(&self, message: &FlowMessage) -> Result<(), GatewayError> {
            self.flows.lock().unwrap().push(message.clone());
            if self.fail_flows {
                Err(GatewayError::DeliveryFailed {
                    to: message.to.clone(),
                    reason: "simulated outage".into(),
                })
            } else {
                Ok(())
            }
        }

        async fn send_text_message(&self, to: &str, body: &str) -> Result<(), GatewayError> {
            self.texts
                .lock()
                .unwrap()
                .push((to.to_string(), body.to_string()));
            if self.fail_texts {
                Err(GatewayError::DeliveryFailed {
                    to: to.to_string(),
                    reason: "simulated outage".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    async fn sender_with(gateway: Arc<FakeGateway>) -> (FlowSender, Arc<dyn Database>) {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let config = Arc::new(AppConfig::default());
        let normalizer = Arc::new(PayloadNormalizer::new(
            config.labels.clone(),
            config.pricing_floor,
        ));
        let registrar = Arc::new(TextRegistrar::new(Arc::clone(&db), normalizer));
        let sender = FlowSender::new(
            Arc::clone(&db),
            gateway,
            TokenStore::new(Arc::clone(&db)),
            registrar,
            config,
        );
        (sender, db)
    }

    #[tokio::test]
    async fn successful_delivery_returns_flow_sent_with_live_token() {
        let gateway = FakeGateway::new(false, false);
        let (sender, db) = sender_with(Arc::clone(&gateway)).await;

        let outcome = sender
            .send_onboarding(OnboardingDomain::Trainer, "+27821234567")
            .await
            .unwrap();

        let SendOutcome::FlowSent { token } = outcome else {
            panic!("expected FlowSent");
        };
        assert_eq!(gateway.flow_count(), 1);

        let record = db.get_flow_token(&token).await.unwrap().unwrap();
        assert_eq!(record.flow_type, "trainer_onboarding");
        assert_eq!(record.phone, "+27821234567");
        assert!(record.expires_at > Utc::now());
    }

    #[tokio::test]
    async fn already_registered_short_circuits_before_sending() {
        let gateway = FakeGateway::new(false, false);
        let (sender, db) = sender_with(Arc::clone(&gateway)).await;

        let trainer = crate::onboarding::model::TrainerRecord {
            id: uuid::Uuid::new_v4(),
            name: "Thandi".into(),
            phone: "+27821234567".into(),
            email: "thandi@example.com".into(),
            specializations: "Yoga".into(),
            services: "Online Coaching".into(),
            price_per_session: dec!(350),
            pricing_flexibility: "".into(),
            availability: "".into(),
            terms_accepted: true,
            marketing_consent: false,
            status: crate::onboarding::model::RegistrationStatus::PendingApproval,
            created_at: Utc::now(),
        };
        db.insert_trainer(&trainer).await.unwrap();

        let outcome = sender
            .send_onboarding(OnboardingDomain::Trainer, "+27821234567")
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            SendOutcome::AlreadyRegistered {
                domain: OnboardingDomain::Trainer
            }
        ));
        assert_eq!(gateway.flow_count(), 0, "no delivery should be attempted");
        assert_eq!(gateway.text_count(), 0);
    }

    #[tokio::test]
    async fn client_fallback_starts_text_registration() {
        let gateway = FakeGateway::new(true, false);
        let (sender, db) = sender_with(Arc::clone(&gateway)).await;

        let outcome = sender
            .send_onboarding(OnboardingDomain::Client, "+27831112222")
            .await
            .unwrap();

        let SendOutcome::TextFallbackStarted { reason, state } = outcome else {
            panic!("expected TextFallbackStarted");
        };
        assert!(reason.contains("simulated outage"));
        assert_eq!(state.domain, OnboardingDomain::Client);

        // Conversation state is durable and the opening question went out.
        assert!(db
            .get_text_registration("+27831112222")
            .await
            .unwrap()
            .is_some());
        assert_eq!(gateway.text_count(), 1);
    }

    #[tokio::test]
    async fn trainer_failure_notifies_once_even_when_notice_fails() {
        let gateway = FakeGateway::new(true, true);
        let (sender, db) = sender_with(Arc::clone(&gateway)).await;

        let outcome = sender
            .send_onboarding(OnboardingDomain::Trainer, "+27821234567")
            .await
            .unwrap();

        let SendOutcome::Failed { reason } = outcome else {
            panic!("expected Failed");
        };
        assert!(reason.contains("simulated outage"));
        // Exactly one best-effort notice attempted, its own failure ignored.
        assert_eq!(gateway.text_count(), 1);
        // No text registration is started for a fallback-disabled domain.
        assert!(db
            .get_text_registration("+27821234567")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn failed_delivery_discards_the_fresh_token() {
        let gateway = FakeGateway::new(true, true);
        let (sender, db) = sender_with(Arc::clone(&gateway)).await;

        sender
            .send_onboarding(OnboardingDomain::Trainer, "+27821234567")
            .await
            .unwrap();

        // The token embedded in the attempted message must be gone.
        let attempted = gateway.flows.lock().unwrap()[0].flow_token.clone();
        assert!(db.get_flow_token(&attempted).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn generic_flow_send_carries_context() {
        let gateway = FakeGateway::new(false, false);
        let (sender, db) = sender_with(Arc::clone(&gateway)).await;

        let token = sender
            .send_flow(
                FlowType::ClientHabitLogging,
                "+27831112222",
                json!({"habit_id": "abc-123"}),
            )
            .await
            .unwrap();

        let record = db.get_flow_token(&token).await.unwrap().unwrap();
        assert_eq!(record.context["habit_id"], "abc-123");
        assert_eq!(record.flow_type, "client_habit_logging");
    }
}
