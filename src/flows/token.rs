//! Flow correlation tokens — the only link between a flow-send event and its
//! later completion callback.
//!
//! Tokens are uuid-v4 strings: high-entropy, unguessable, and collision-
//! resistant. A token is valid only until `expires_at`; an expired token
//! resolves as not-found even if the row still physically exists.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::StorageError;
use crate::store::Database;

/// The closed set of flow types this service issues tokens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowType {
    TrainerOnboarding,
    ClientOnboarding,
    TrainerHabitSetup,
    ClientHabitLogging,
    HabitProgress,
    ProfileEditTrainer,
    ProfileEditClient,
}

impl FlowType {
    pub const ALL: [FlowType; 7] = [
        Self::TrainerOnboarding,
        Self::ClientOnboarding,
        Self::TrainerHabitSetup,
        Self::ClientHabitLogging,
        Self::HabitProgress,
        Self::ProfileEditTrainer,
        Self::ProfileEditClient,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TrainerOnboarding => "trainer_onboarding",
            Self::ClientOnboarding => "client_onboarding",
            Self::TrainerHabitSetup => "trainer_habit_setup",
            Self::ClientHabitLogging => "client_habit_logging",
            Self::HabitProgress => "habit_progress",
            Self::ProfileEditTrainer => "profile_edit_trainer",
            Self::ProfileEditClient => "profile_edit_client",
        }
    }

    /// Parse a stored tag. `None` for anything outside the enumeration;
    /// the caller decides how loudly to surface that.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|ft| ft.as_str() == s)
    }
}

impl std::fmt::Display for FlowType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A persisted flow token.
///
/// `flow_type` is kept as the raw stored tag; it is validated against the
/// closed enumeration at dispatch time so that a corrupt or stale tag
/// surfaces as `UnknownFlowType` rather than failing silently at read time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowTokenRecord {
    pub token: String,
    pub phone: String,
    pub flow_type: String,
    /// Opaque context carried from issuance to completion (e.g. the habit
    /// being logged, or the record under edit).
    pub context: Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl FlowTokenRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Issues, resolves, and consumes flow tokens over the store.
#[derive(Clone)]
pub struct TokenStore {
    db: Arc<dyn Database>,
}

impl TokenStore {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Mint and durably persist a new token.
    pub async fn issue(
        &self,
        phone: &str,
        flow_type: FlowType,
        context: Value,
        ttl: Duration,
    ) -> Result<String, StorageError> {
        let token = Uuid::new_v4().simple().to_string();
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl)
            .unwrap_or_else(|_| chrono::Duration::seconds(600));
        let record = FlowTokenRecord {
            token: token.clone(),
            phone: phone.to_string(),
            flow_type: flow_type.as_str().to_string(),
            context,
            created_at: now,
            expires_at: now + ttl,
        };
        self.db.insert_flow_token(&record).await?;
        tracing::debug!(token = %token, flow_type = %flow_type, phone = %phone, "Flow token issued");
        Ok(token)
    }

    /// Look up a token. Expired or missing tokens both resolve to `None`;
    /// never mutates state, so the completion handler can decide whether to
    /// retry before consuming.
    pub async fn resolve(&self, token: &str) -> Result<Option<FlowTokenRecord>, StorageError> {
        match self.db.get_flow_token(token).await? {
            Some(record) if record.is_expired(Utc::now()) => Ok(None),
            other => Ok(other),
        }
    }

    /// Delete a token. Returns whether a row existed. Idempotent, so the
    /// second of two racing consumers observes `false`.
    pub async fn consume(&self, token: &str) -> Result<bool, StorageError> {
        let existed = self.db.delete_flow_token(token).await?;
        if existed {
            tracing::debug!(token = %token, "Flow token consumed");
        }
        Ok(existed)
    }

    /// Delete rows whose TTL has lapsed. Hygiene only; `resolve` already
    /// checks expiry at read time.
    pub async fn prune_expired(&self) -> Result<usize, StorageError> {
        self.db.delete_expired_flow_tokens(Utc::now()).await
    }
}

/// Spawn the periodic expired-token sweep.
pub fn spawn_prune_task(store: TokenStore, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match store.prune_expired().await {
                Ok(0) => {}
                Ok(n) => tracing::debug!(pruned = n, "Expired flow tokens pruned"),
                Err(e) => tracing::warn!("Token prune failed: {e}"),
            }
        }
    })
}
