//! Canonical onboarding records for trainers and clients.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Approval status of a marketplace member.
///
/// Every newly created record starts as `PendingApproval` regardless of any
/// status value present in the raw submission; client input never sets its
/// own approval state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    PendingApproval,
    Approved,
    Rejected,
}

impl Default for RegistrationStatus {
    fn default() -> Self {
        Self::PendingApproval
    }
}

impl std::fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::PendingApproval => "pending_approval",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        };
        write!(f, "{s}")
    }
}

impl RegistrationStatus {
    /// Parse a status string from the DB. Unknown strings fall back to
    /// `PendingApproval`, the most restrictive state.
    pub fn parse(s: &str) -> Self {
        match s {
            "approved" => Self::Approved,
            "rejected" => Self::Rejected,
            _ => Self::PendingApproval,
        }
    }
}

/// The onboarding domain a flow or text conversation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingDomain {
    Trainer,
    Client,
}

impl OnboardingDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trainer => "trainer",
            Self::Client => "client",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "trainer" => Some(Self::Trainer),
            "client" => Some(Self::Client),
            _ => None,
        }
    }
}

impl std::fmt::Display for OnboardingDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A registered trainer, as produced by the payload normalizer.
///
/// Categorical fields hold canonical labels in comma-joined display form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerRecord {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub specializations: String,
    pub services: String,
    pub price_per_session: Decimal,
    pub pricing_flexibility: String,
    pub availability: String,
    pub terms_accepted: bool,
    pub marketing_consent: bool,
    pub status: RegistrationStatus,
    pub created_at: DateTime<Utc>,
}

/// A registered client, as produced by the payload normalizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRecord {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub fitness_goals: String,
    pub session_types: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_per_session: Option<Decimal>,
    pub availability: String,
    pub terms_accepted: bool,
    pub marketing_consent: bool,
    pub status: RegistrationStatus,
    pub created_at: DateTime<Utc>,
}
