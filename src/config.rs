//! Configuration types — loaded once at startup, immutable afterwards.

use std::collections::HashMap;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::ConfigError;
use crate::flows::normalize::LabelCatalog;
use crate::flows::token::FlowType;
use crate::onboarding::model::OnboardingDomain;

/// Framing text and identity of one flow as delivered to a user.
#[derive(Debug, Clone)]
pub struct FlowTemplate {
    /// The flow's id in the WhatsApp flow catalog.
    pub flow_id: String,
    pub initial_screen: String,
    pub header: String,
    pub body: String,
    pub footer: String,
    pub cta: String,
}

/// Per-flow-type message templates.
#[derive(Debug, Clone)]
pub struct FlowCatalog {
    templates: HashMap<FlowType, FlowTemplate>,
}

impl FlowCatalog {
    pub fn template(&self, flow_type: FlowType) -> &FlowTemplate {
        // Default covers every variant, so the lookup cannot miss.
        self.templates
            .get(&flow_type)
            .expect("flow catalog covers all flow types")
    }

    fn set_flow_id(&mut self, flow_type: FlowType, flow_id: String) {
        if let Some(t) = self.templates.get_mut(&flow_type) {
            t.flow_id = flow_id;
        }
    }
}

impl Default for FlowCatalog {
    fn default() -> Self {
        let footer = "fitlink".to_string();
        let mut templates = HashMap::new();

        let mut add = |flow_type: FlowType, header: &str, body: &str, cta: &str, screen: &str| {
            templates.insert(
                flow_type,
                FlowTemplate {
                    flow_id: format!("{}_v1", flow_type.as_str()),
                    initial_screen: screen.to_string(),
                    header: header.to_string(),
                    body: body.to_string(),
                    footer: footer.clone(),
                    cta: cta.to_string(),
                },
            );
        };

        add(
            FlowType::TrainerOnboarding,
            "Trainer registration",
            "Join our marketplace — tap below to set up your trainer profile.",
            "Register",
            "TRAINER_DETAILS",
        );
        add(
            FlowType::ClientOnboarding,
            "Client registration",
            "Tell us about your fitness goals so we can match you with a trainer.",
            "Get started",
            "CLIENT_DETAILS",
        );
        add(
            FlowType::TrainerHabitSetup,
            "Habit setup",
            "Set up the habits you'd like your client to track.",
            "Set habits",
            "HABIT_LIST",
        );
        add(
            FlowType::ClientHabitLogging,
            "Log your habit",
            "How did it go today?",
            "Log it",
            "HABIT_LOG",
        );
        add(
            FlowType::HabitProgress,
            "Your progress",
            "Here's how your habits are going.",
            "View progress",
            "PROGRESS",
        );
        add(
            FlowType::ProfileEditTrainer,
            "Edit your profile",
            "Update your trainer profile details.",
            "Edit",
            "TRAINER_EDIT",
        );
        add(
            FlowType::ProfileEditClient,
            "Edit your profile",
            "Update your client profile details.",
            "Edit",
            "CLIENT_EDIT",
        );

        Self { templates }
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Lifetime of a flow correlation token.
    pub token_ttl: Duration,
    /// Minimum trainer session rate, in Rand.
    pub pricing_floor: Decimal,
    /// Whether trainer onboarding degrades to text registration on delivery
    /// failure. Off by default; trainers are told the form is unavailable.
    pub trainer_fallback_enabled: bool,
    /// Whether client onboarding degrades to text registration.
    pub client_fallback_enabled: bool,
    pub labels: LabelCatalog,
    pub flows: FlowCatalog,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            token_ttl: Duration::from_secs(600),
            pricing_floor: dec!(100),
            trainer_fallback_enabled: false,
            client_fallback_enabled: true,
            labels: LabelCatalog::default(),
            flows: FlowCatalog::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the environment, falling back to defaults.
    ///
    /// Label dictionaries can be replaced wholesale from a JSON file named
    /// by `FITLINK_LABELS_PATH`; flow ids per type via
    /// `FITLINK_FLOW_ID_<FLOW_TYPE>`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(secs) = env_parsed::<u64>("FITLINK_TOKEN_TTL_SECS")? {
            config.token_ttl = Duration::from_secs(secs);
        }
        if let Some(floor) = env_parsed::<Decimal>("FITLINK_PRICING_FLOOR")? {
            config.pricing_floor = floor;
        }
        if let Some(enabled) = env_bool("FITLINK_TRAINER_FALLBACK")? {
            config.trainer_fallback_enabled = enabled;
        }
        if let Some(enabled) = env_bool("FITLINK_CLIENT_FALLBACK")? {
            config.client_fallback_enabled = enabled;
        }

        if let Ok(path) = std::env::var("FITLINK_LABELS_PATH") {
            let raw = std::fs::read_to_string(&path)?;
            config.labels = serde_json::from_str(&raw)
                .map_err(|e| ConfigError::ParseError(format!("{path}: {e}")))?;
        }

        for flow_type in FlowType::ALL {
            let key = format!("FITLINK_FLOW_ID_{}", flow_type.as_str().to_uppercase());
            if let Ok(flow_id) = std::env::var(&key) {
                config.flows.set_flow_id(flow_type, flow_id);
            }
        }

        Ok(config)
    }

    pub fn fallback_enabled(&self, domain: OnboardingDomain) -> bool {
        match domain {
            OnboardingDomain::Trainer => self.trainer_fallback_enabled,
            OnboardingDomain::Client => self.client_fallback_enabled,
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("could not parse {raw:?}"),
            }),
        Err(_) => Ok(None),
    }
}

fn env_bool(key: &str) -> Result<Option<bool>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(Some(true)),
            "0" | "false" | "no" => Ok(Some(false)),
            other => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected a boolean, got {other:?}"),
            }),
        },
        Err(_) => Ok(None),
    }
}
