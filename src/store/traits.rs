//! Unified `Database` trait — single async interface for all persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StorageError;
use crate::flows::token::FlowTokenRecord;
use crate::habits::model::{HabitLogRecord, HabitRecord};
use crate::onboarding::model::{ClientRecord, TrainerRecord};
use crate::onboarding::text::TextRegistrationState;

/// Backend-agnostic database trait covering tokens, members, habits, and
/// text registration conversations.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), StorageError>;

    // ── Flow tokens ─────────────────────────────────────────────────

    async fn insert_flow_token(&self, record: &FlowTokenRecord) -> Result<(), StorageError>;

    /// Point lookup by token. Returns the raw row regardless of expiry;
    /// TTL interpretation belongs to the token store.
    async fn get_flow_token(&self, token: &str) -> Result<Option<FlowTokenRecord>, StorageError>;

    /// Atomic delete-if-exists. Returns whether a row was deleted, so two
    /// near-simultaneous consumers see exactly one `true`.
    async fn delete_flow_token(&self, token: &str) -> Result<bool, StorageError>;

    /// Delete rows whose `expires_at` is before `cutoff`. Returns the count.
    async fn delete_expired_flow_tokens(&self, cutoff: DateTime<Utc>)
    -> Result<usize, StorageError>;

    // ── Trainers ────────────────────────────────────────────────────

    async fn get_trainer_by_phone(&self, phone: &str)
    -> Result<Option<TrainerRecord>, StorageError>;

    /// Insert a new trainer. The phone column carries a UNIQUE constraint;
    /// a duplicate insert surfaces as `StorageError::Constraint`.
    async fn insert_trainer(&self, record: &TrainerRecord) -> Result<(), StorageError>;

    /// Replace an existing trainer row keyed by phone. Returns whether a
    /// row was found.
    async fn update_trainer(&self, record: &TrainerRecord) -> Result<bool, StorageError>;

    // ── Clients ─────────────────────────────────────────────────────

    async fn get_client_by_phone(&self, phone: &str)
    -> Result<Option<ClientRecord>, StorageError>;

    async fn insert_client(&self, record: &ClientRecord) -> Result<(), StorageError>;

    async fn update_client(&self, record: &ClientRecord) -> Result<bool, StorageError>;

    // ── Habits ──────────────────────────────────────────────────────

    async fn insert_habit(&self, record: &HabitRecord) -> Result<(), StorageError>;

    async fn list_habits_for_phone(&self, phone: &str) -> Result<Vec<HabitRecord>, StorageError>;

    async fn insert_habit_log(&self, record: &HabitLogRecord) -> Result<(), StorageError>;

    async fn count_habit_logs(&self, habit_id: Uuid) -> Result<usize, StorageError>;

    // ── Text registrations ──────────────────────────────────────────

    async fn get_text_registration(
        &self,
        phone: &str,
    ) -> Result<Option<TextRegistrationState>, StorageError>;

    async fn upsert_text_registration(
        &self,
        state: &TextRegistrationState,
    ) -> Result<(), StorageError>;

    async fn delete_text_registration(&self, phone: &str) -> Result<bool, StorageError>;
}
