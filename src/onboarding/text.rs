//! Text-based conversational registration — the fallback path used when a
//! structured flow cannot be delivered.
//!
//! A linear question/answer state machine per phone number, persisted so a
//! half-finished registration survives restarts. Completed conversations are
//! funnelled through the same payload normalizer as flow submissions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{Error, StorageError};
use crate::flows::normalize::PayloadNormalizer;
use crate::onboarding::model::OnboardingDomain;
use crate::store::Database;

/// The phases of a text registration conversation.
///
/// Progresses linearly: Name → Email → Focus → Services → Pricing → Terms →
/// Complete. Clients skip Services (they have no service catalog to pick).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationPhase {
    Name,
    Email,
    Focus,
    Services,
    Pricing,
    Terms,
    Complete,
}

impl Default for RegistrationPhase {
    fn default() -> Self {
        Self::Name
    }
}

impl RegistrationPhase {
    /// The next phase in the progression for the given domain, if any.
    pub fn next(&self, domain: OnboardingDomain) -> Option<RegistrationPhase> {
        use RegistrationPhase::*;
        match self {
            Name => Some(Email),
            Email => Some(Focus),
            Focus => match domain {
                OnboardingDomain::Trainer => Some(Services),
                OnboardingDomain::Client => Some(Pricing),
            },
            Services => Some(Pricing),
            Pricing => Some(Terms),
            Terms => Some(Complete),
            Complete => None,
        }
    }

    /// Whether this phase is terminal (the conversation is done).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl std::fmt::Display for RegistrationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Name => "name",
            Self::Email => "email",
            Self::Focus => "focus",
            Self::Services => "services",
            Self::Pricing => "pricing",
            Self::Terms => "terms",
            Self::Complete => "complete",
        };
        write!(f, "{s}")
    }
}

impl RegistrationPhase {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "name" => Some(Self::Name),
            "email" => Some(Self::Email),
            "focus" => Some(Self::Focus),
            "services" => Some(Self::Services),
            "pricing" => Some(Self::Pricing),
            "terms" => Some(Self::Terms),
            "complete" => Some(Self::Complete),
            _ => None,
        }
    }
}

/// Persisted state of one text registration conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextRegistrationState {
    pub phone: String,
    pub domain: OnboardingDomain,
    pub phase: RegistrationPhase,
    /// Collected answers keyed by submission field name.
    pub answers: Value,
    pub message_count: u32,
    pub started_at: DateTime<Utc>,
}

impl TextRegistrationState {
    pub fn new(phone: &str, domain: OnboardingDomain) -> Self {
        Self {
            phone: phone.to_string(),
            domain,
            phase: RegistrationPhase::Name,
            answers: json!({}),
            message_count: 0,
            started_at: Utc::now(),
        }
    }

    /// Record an answer under the submission field it maps to.
    pub fn record_answer(&mut self, field: &str, value: Value) {
        if let Some(obj) = self.answers.as_object_mut() {
            obj.insert(field.to_string(), value);
        }
    }

    /// Advance to the next phase. Returns an error if already terminal.
    pub fn advance(&mut self) -> Result<RegistrationPhase, String> {
        let next = self
            .phase
            .next(self.domain)
            .ok_or_else(|| "Already at terminal phase".to_string())?;
        self.phase = next;
        Ok(next)
    }
}

/// The question asked when entering a phase.
pub fn prompt_for(domain: OnboardingDomain, phase: RegistrationPhase) -> &'static str {
    use RegistrationPhase::*;
    match (domain, phase) {
        (_, Name) => "Let's get you registered! What's your full name?",
        (_, Email) => "Great. What's your email address?",
        (OnboardingDomain::Trainer, Focus) => {
            "What do you specialize in? Send a comma-separated list (e.g. yoga, strength training)."
        }
        (OnboardingDomain::Client, Focus) => {
            "What are your fitness goals? Send a comma-separated list (e.g. lose weight, stay active)."
        }
        (_, Services) => {
            "Which services do you offer? Send a comma-separated list (e.g. online coaching, group classes)."
        }
        (OnboardingDomain::Trainer, Pricing) => "What do you charge per session (in Rand)?",
        (OnboardingDomain::Client, Pricing) => {
            "What's your budget per session (in Rand)? Reply 'skip' if you're not sure."
        }
        (_, Terms) => {
            "Almost done. Reply YES to accept our terms and conditions and complete your registration."
        }
        (_, Complete) => "You're all set!",
    }
}

/// Drives text registration conversations over the store.
pub struct TextRegistrar {
    db: Arc<dyn Database>,
    normalizer: Arc<PayloadNormalizer>,
}

impl TextRegistrar {
    pub fn new(db: Arc<dyn Database>, normalizer: Arc<PayloadNormalizer>) -> Self {
        Self { db, normalizer }
    }

    /// Begin a registration conversation. Returns the persisted state and the
    /// first question to send.
    pub async fn start(
        &self,
        domain: OnboardingDomain,
        phone: &str,
    ) -> Result<(TextRegistrationState, &'static str), StorageError> {
        let state = TextRegistrationState::new(phone, domain);
        self.db.upsert_text_registration(&state).await?;
        Ok((state, prompt_for(domain, RegistrationPhase::Name)))
    }

    /// Process one inbound message. Returns the reply to send, or `None` if
    /// no registration conversation is active for this phone.
    pub async fn handle_inbound(
        &self,
        phone: &str,
        text: &str,
    ) -> Result<Option<String>, Error> {
        let Some(mut state) = self.db.get_text_registration(phone).await? else {
            return Ok(None);
        };

        state.message_count += 1;
        let text = text.trim();
        let domain = state.domain;

        let reply = match state.phase {
            RegistrationPhase::Name => {
                if text.is_empty() {
                    prompt_for(domain, RegistrationPhase::Name).to_string()
                } else {
                    state.record_answer("full_name", json!(text));
                    self.step(&mut state)
                }
            }
            RegistrationPhase::Email => {
                if text.contains('@') {
                    state.record_answer("email", json!(text));
                    self.step(&mut state)
                } else {
                    "That doesn't look like an email address — please try again.".to_string()
                }
            }
            RegistrationPhase::Focus => {
                let items = split_list(text);
                if items.is_empty() {
                    prompt_for(domain, RegistrationPhase::Focus).to_string()
                } else {
                    let field = match domain {
                        OnboardingDomain::Trainer => "specializations",
                        OnboardingDomain::Client => "fitness_goals",
                    };
                    state.record_answer(field, json!(items));
                    self.step(&mut state)
                }
            }
            RegistrationPhase::Services => {
                let items = split_list(text);
                if items.is_empty() {
                    prompt_for(domain, RegistrationPhase::Services).to_string()
                } else {
                    state.record_answer("services", json!(items));
                    self.step(&mut state)
                }
            }
            RegistrationPhase::Pricing => match domain {
                OnboardingDomain::Trainer => match text.parse::<Decimal>() {
                    Ok(amount) if amount >= self.normalizer.pricing_floor() => {
                        state.record_answer("price_per_session", json!(amount.to_string()));
                        self.step(&mut state)
                    }
                    Ok(_) => format!(
                        "The minimum session rate is R{} — what do you charge per session?",
                        self.normalizer.pricing_floor()
                    ),
                    Err(_) => "Please send a number, e.g. 350.".to_string(),
                },
                OnboardingDomain::Client => {
                    if text.eq_ignore_ascii_case("skip") {
                        self.step(&mut state)
                    } else {
                        match text.parse::<Decimal>() {
                            Ok(amount) if amount > Decimal::ZERO => {
                                state.record_answer(
                                    "budget_per_session",
                                    json!(amount.to_string()),
                                );
                                self.step(&mut state)
                            }
                            _ => "Please send a number (e.g. 250), or 'skip'.".to_string(),
                        }
                    }
                }
            },
            RegistrationPhase::Terms => {
                if is_affirmative(text) {
                    state.record_answer("terms_accepted", json!(true));
                    state.phase = RegistrationPhase::Complete;
                    return self.finalize(state).await.map(Some);
                }
                "Reply YES to accept the terms and conditions, or STOP to cancel.".to_string()
            }
            RegistrationPhase::Complete => {
                // Conversation already finished but state lingered; clean up.
                let _ = self.db.delete_text_registration(phone).await;
                return Ok(None);
            }
        };

        self.db.upsert_text_registration(&state).await?;
        Ok(Some(reply))
    }

    /// Advance the phase and return the next question.
    fn step(&self, state: &mut TextRegistrationState) -> String {
        match state.advance() {
            Ok(next) => prompt_for(state.domain, next).to_string(),
            Err(e) => {
                tracing::warn!(phone = %state.phone, "Failed to advance registration: {e}");
                prompt_for(state.domain, state.phase).to_string()
            }
        }
    }

    /// Normalize the collected answers and create the record.
    async fn finalize(&self, state: TextRegistrationState) -> Result<String, Error> {
        let phone = state.phone.clone();
        let result = match state.domain {
            OnboardingDomain::Trainer => {
                let sub = serde_json::from_value(state.answers.clone())
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                match self.normalizer.normalize_trainer(sub, &phone) {
                    Ok(record) => {
                        let name = record.name.clone();
                        self.db.insert_trainer(&record).await.map(|_| name)
                    }
                    Err(report) => {
                        tracing::warn!(phone = %phone, errors = %report, "Text registration failed validation");
                        let _ = self.db.delete_text_registration(&phone).await;
                        return Ok(format!(
                            "We couldn't complete your registration: {report}. Please start again."
                        ));
                    }
                }
            }
            OnboardingDomain::Client => {
                let sub = serde_json::from_value(state.answers.clone())
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                match self.normalizer.normalize_client(sub, &phone) {
                    Ok(record) => {
                        let name = record.name.clone();
                        self.db.insert_client(&record).await.map(|_| name)
                    }
                    Err(report) => {
                        tracing::warn!(phone = %phone, errors = %report, "Text registration failed validation");
                        let _ = self.db.delete_text_registration(&phone).await;
                        return Ok(format!(
                            "We couldn't complete your registration: {report}. Please start again."
                        ));
                    }
                }
            }
        };

        let reply = match result {
            Ok(name) => {
                self.db.delete_text_registration(&phone).await?;
                format!(
                    "Thanks {name}! Your registration has been submitted and is pending approval."
                )
            }
            Err(StorageError::Constraint(_)) => {
                self.db.delete_text_registration(&phone).await?;
                "It looks like you're already registered with us.".to_string()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(reply)
    }
}

fn split_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn is_affirmative(text: &str) -> bool {
    matches!(
        text.trim().to_ascii_lowercase().as_str(),
        "yes" | "y" | "accept" | "agree" | "ok"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trainer_phases_walk_in_order() {
        use RegistrationPhase::*;
        let expected = [Email, Focus, Services, Pricing, Terms, Complete];
        let mut current = Name;
        for next in expected {
            current = current.next(OnboardingDomain::Trainer).unwrap();
            assert_eq!(current, next);
        }
        assert!(current.next(OnboardingDomain::Trainer).is_none());
    }

    #[test]
    fn client_skips_services_phase() {
        use RegistrationPhase::*;
        assert_eq!(Focus.next(OnboardingDomain::Client), Some(Pricing));
        assert_eq!(Focus.next(OnboardingDomain::Trainer), Some(Services));
    }

    #[test]
    fn display_matches_serde() {
        use RegistrationPhase::*;
        for phase in [Name, Email, Focus, Services, Pricing, Terms, Complete] {
            let display = format!("{phase}");
            let json = serde_json::to_string(&phase).unwrap();
            assert_eq!(format!("\"{display}\""), json);
            assert_eq!(RegistrationPhase::parse(&display), Some(phase));
        }
    }

    #[test]
    fn state_records_answers() {
        let mut state = TextRegistrationState::new("+27821234567", OnboardingDomain::Trainer);
        state.record_answer("full_name", json!("Thandi"));
        state.record_answer("specializations", json!(["yoga"]));

        assert_eq!(state.answers["full_name"], "Thandi");
        assert_eq!(state.answers["specializations"][0], "yoga");
    }

    #[test]
    fn advance_fails_at_terminal() {
        let mut state = TextRegistrationState::new("+27821234567", OnboardingDomain::Client);
        state.phase = RegistrationPhase::Complete;
        assert!(state.advance().is_err());
    }

    #[test]
    fn affirmative_answers() {
        assert!(is_affirmative("YES"));
        assert!(is_affirmative(" yes "));
        assert!(is_affirmative("agree"));
        assert!(!is_affirmative("no"));
        assert!(!is_affirmative("maybe"));
    }

    #[test]
    fn split_list_trims_and_drops_empties() {
        assert_eq!(
            split_list("yoga, boxing , ,strength"),
            vec!["yoga".to_string(), "boxing".to_string(), "strength".to_string()]
        );
        assert!(split_list("   ").is_empty());
    }
}
