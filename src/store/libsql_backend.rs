//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. Connection/open failures map
//! to `StorageError::Unavailable`; query failures to `Query`; UNIQUE
//! violations to `Constraint`.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::StorageError;
use crate::flows::token::FlowTokenRecord;
use crate::habits::model::{HabitCadence, HabitLogRecord, HabitRecord};
use crate::onboarding::model::{
    ClientRecord, OnboardingDomain, RegistrationStatus, TrainerRecord,
};
use crate::onboarding::text::{RegistrationPhase, TextRegistrationState};
use crate::store::migrations;
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Unavailable(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StorageError::Unavailable(format!("Failed to open database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StorageError::Unavailable(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StorageError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                StorageError::Unavailable(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| StorageError::Unavailable(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Map a write error, classifying UNIQUE violations as constraint errors.
fn write_error(op: &str, e: libsql::Error) -> StorageError {
    let text = e.to_string();
    if text.contains("UNIQUE") {
        StorageError::Constraint(format!("{op}: {text}"))
    } else {
        StorageError::Query(format!("{op}: {text}"))
    }
}

fn row_to_flow_token(row: &libsql::Row) -> Result<FlowTokenRecord, libsql::Error> {
    let context_str: String = row.get(3)?;
    let created_str: String = row.get(4)?;
    let expires_str: String = row.get(5)?;

    Ok(FlowTokenRecord {
        token: row.get(0)?,
        phone: row.get(1)?,
        flow_type: row.get(2)?,
        context: serde_json::from_str(&context_str).unwrap_or_else(|_| serde_json::json!({})),
        created_at: parse_datetime(&created_str),
        expires_at: parse_datetime(&expires_str),
    })
}

fn row_to_trainer(row: &libsql::Row) -> Result<TrainerRecord, libsql::Error> {
    let id_str: String = row.get(0)?;
    let price_str: String = row.get(6)?;
    let terms: i64 = row.get(9)?;
    let marketing: i64 = row.get(10)?;
    let status_str: String = row.get(11)?;
    let created_str: String = row.get(12)?;

    Ok(TrainerRecord {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        name: row.get(1)?,
        phone: row.get(2)?,
        email: row.get(3)?,
        specializations: row.get(4)?,
        services: row.get(5)?,
        price_per_session: price_str.parse().unwrap_or_default(),
        pricing_flexibility: row.get(7)?,
        availability: row.get(8)?,
        terms_accepted: terms != 0,
        marketing_consent: marketing != 0,
        status: RegistrationStatus::parse(&status_str),
        created_at: parse_datetime(&created_str),
    })
}

fn row_to_client(row: &libsql::Row) -> Result<ClientRecord, libsql::Error> {
    let id_str: String = row.get(0)?;
    let budget_str: Option<String> = row.get(6).ok();
    let terms: i64 = row.get(9)?;
    let marketing: i64 = row.get(10)?;
    let status_str: String = row.get(11)?;
    let created_str: String = row.get(12)?;

    Ok(ClientRecord {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        name: row.get(1)?,
        phone: row.get(2)?,
        email: row.get(3)?,
        fitness_goals: row.get(4)?,
        session_types: row.get(5)?,
        budget_per_session: budget_str.and_then(|s| s.parse().ok()),
        availability: row.get(7)?,
        terms_accepted: terms != 0,
        marketing_consent: marketing != 0,
        status: RegistrationStatus::parse(&status_str),
        created_at: parse_datetime(&created_str),
    })
}

fn row_to_habit(row: &libsql::Row) -> Result<HabitRecord, libsql::Error> {
    let id_str: String = row.get(0)?;
    let cadence_str: String = row.get(3)?;
    let created_str: String = row.get(4)?;

    Ok(HabitRecord {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        owner_phone: row.get(1)?,
        title: row.get(2)?,
        cadence: HabitCadence::parse(&cadence_str),
        created_at: parse_datetime(&created_str),
    })
}

fn row_to_text_registration(
    row: &libsql::Row,
) -> Result<TextRegistrationState, StorageError> {
    let phone: String = row
        .get(0)
        .map_err(|e| StorageError::Query(format!("text_registration row: {e}")))?;
    let domain_str: String = row
        .get(1)
        .map_err(|e| StorageError::Query(format!("text_registration row: {e}")))?;
    let phase_str: String = row
        .get(2)
        .map_err(|e| StorageError::Query(format!("text_registration row: {e}")))?;
    let answers_str: String = row
        .get(3)
        .map_err(|e| StorageError::Query(format!("text_registration row: {e}")))?;
    let message_count: i64 = row
        .get(4)
        .map_err(|e| StorageError::Query(format!("text_registration row: {e}")))?;
    let started_str: String = row
        .get(5)
        .map_err(|e| StorageError::Query(format!("text_registration row: {e}")))?;

    let domain = OnboardingDomain::parse(&domain_str).ok_or_else(|| {
        StorageError::Serialization(format!("unknown registration domain: {domain_str}"))
    })?;

    Ok(TextRegistrationState {
        phone,
        domain,
        phase: RegistrationPhase::parse(&phase_str).unwrap_or_default(),
        answers: serde_json::from_str(&answers_str).unwrap_or_else(|_| serde_json::json!({})),
        message_count: message_count as u32,
        started_at: parse_datetime(&started_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

const TOKEN_COLUMNS: &str = "token, phone, flow_type, context, created_at, expires_at";

const TRAINER_COLUMNS: &str = "id, name, phone, email, specializations, services, \
     price_per_session, pricing_flexibility, availability, terms_accepted, \
     marketing_consent, status, created_at";

const CLIENT_COLUMNS: &str = "id, name, phone, email, fitness_goals, session_types, \
     budget_per_session, availability, terms_accepted, marketing_consent, status, created_at";

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), StorageError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Flow tokens ─────────────────────────────────────────────────

    async fn insert_flow_token(&self, record: &FlowTokenRecord) -> Result<(), StorageError> {
        self.conn()
            .execute(
                "INSERT INTO flow_tokens (token, phone, flow_type, context, created_at, expires_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.token.as_str(),
                    record.phone.as_str(),
                    record.flow_type.as_str(),
                    record.context.to_string(),
                    record.created_at.to_rfc3339(),
                    record.expires_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| write_error("insert_flow_token", e))?;
        Ok(())
    }

    async fn get_flow_token(
        &self,
        token: &str,
    ) -> Result<Option<FlowTokenRecord>, StorageError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {TOKEN_COLUMNS} FROM flow_tokens WHERE token = ?1"),
                params![token],
            )
            .await
            .map_err(|e| StorageError::Query(format!("get_flow_token: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_flow_token(&row).map_err(|e| {
                StorageError::Query(format!("get_flow_token row parse: {e}"))
            })?)),
            Ok(None) => Ok(None),
            Err(e) => Err(StorageError::Query(format!("get_flow_token: {e}"))),
        }
    }

    async fn delete_flow_token(&self, token: &str) -> Result<bool, StorageError> {
        let affected = self
            .conn()
            .execute("DELETE FROM flow_tokens WHERE token = ?1", params![token])
            .await
            .map_err(|e| StorageError::Query(format!("delete_flow_token: {e}")))?;
        Ok(affected > 0)
    }

    async fn delete_expired_flow_tokens(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, StorageError> {
        let affected = self
            .conn()
            .execute(
                "DELETE FROM flow_tokens WHERE expires_at < ?1",
                params![cutoff.to_rfc3339()],
            )
            .await
            .map_err(|e| StorageError::Query(format!("delete_expired_flow_tokens: {e}")))?;
        Ok(affected as usize)
    }

    // ── Trainers ────────────────────────────────────────────────────

    async fn get_trainer_by_phone(
        &self,
        phone: &str,
    ) -> Result<Option<TrainerRecord>, StorageError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {TRAINER_COLUMNS} FROM trainers WHERE phone = ?1"),
                params![phone],
            )
            .await
            .map_err(|e| StorageError::Query(format!("get_trainer_by_phone: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_trainer(&row).map_err(|e| {
                StorageError::Query(format!("get_trainer_by_phone row parse: {e}"))
            })?)),
            Ok(None) => Ok(None),
            Err(e) => Err(StorageError::Query(format!("get_trainer_by_phone: {e}"))),
        }
    }

    async fn insert_trainer(&self, record: &TrainerRecord) -> Result<(), StorageError> {
        self.conn()
            .execute(
                "INSERT INTO trainers (id, name, phone, email, specializations, services, \
                 price_per_session, pricing_flexibility, availability, terms_accepted, \
                 marketing_consent, status, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    record.id.to_string(),
                    record.name.as_str(),
                    record.phone.as_str(),
                    record.email.as_str(),
                    record.specializations.as_str(),
                    record.services.as_str(),
                    record.price_per_session.to_string(),
                    record.pricing_flexibility.as_str(),
                    record.availability.as_str(),
                    record.terms_accepted as i64,
                    record.marketing_consent as i64,
                    record.status.to_string(),
                    record.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| write_error("insert_trainer", e))?;

        debug!(phone = %record.phone, "Trainer inserted");
        Ok(())
    }

    async fn update_trainer(&self, record: &TrainerRecord) -> Result<bool, StorageError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE trainers SET name = ?1, email = ?2, specializations = ?3, \
                 services = ?4, price_per_session = ?5, pricing_flexibility = ?6, \
                 availability = ?7, marketing_consent = ?8 WHERE phone = ?9",
                params![
                    record.name.as_str(),
                    record.email.as_str(),
                    record.specializations.as_str(),
                    record.services.as_str(),
                    record.price_per_session.to_string(),
                    record.pricing_flexibility.as_str(),
                    record.availability.as_str(),
                    record.marketing_consent as i64,
                    record.phone.as_str(),
                ],
            )
            .await
            .map_err(|e| write_error("update_trainer", e))?;
        Ok(affected > 0)
    }

    // ── Clients ─────────────────────────────────────────────────────

    async fn get_client_by_phone(
        &self,
        phone: &str,
    ) -> Result<Option<ClientRecord>, StorageError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE phone = ?1"),
                params![phone],
            )
            .await
            .map_err(|e| StorageError::Query(format!("get_client_by_phone: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_client(&row).map_err(|e| {
                StorageError::Query(format!("get_client_by_phone row parse: {e}"))
            })?)),
            Ok(None) => Ok(None),
            Err(e) => Err(StorageError::Query(format!("get_client_by_phone: {e}"))),
        }
    }

    async fn insert_client(&self, record: &ClientRecord) -> Result<(), StorageError> {
        self.conn()
            .execute(
                "INSERT INTO clients (id, name, phone, email, fitness_goals, session_types, \
                 budget_per_session, availability, terms_accepted, marketing_consent, status, \
                 created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    record.id.to_string(),
                    record.name.as_str(),
                    record.phone.as_str(),
                    record.email.as_str(),
                    record.fitness_goals.as_str(),
                    record.session_types.as_str(),
                    match &record.budget_per_session {
                        Some(b) => libsql::Value::Text(b.to_string()),
                        None => libsql::Value::Null,
                    },
                    record.availability.as_str(),
                    record.terms_accepted as i64,
                    record.marketing_consent as i64,
                    record.status.to_string(),
                    record.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| write_error("insert_client", e))?;

        debug!(phone = %record.phone, "Client inserted");
        Ok(())
    }

    async fn update_client(&self, record: &ClientRecord) -> Result<bool, StorageError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE clients SET name = ?1, email = ?2, fitness_goals = ?3, \
                 session_types = ?4, budget_per_session = ?5, availability = ?6, \
                 marketing_consent = ?7 WHERE phone = ?8",
                params![
                    record.name.as_str(),
                    record.email.as_str(),
                    record.fitness_goals.as_str(),
                    record.session_types.as_str(),
                    match &record.budget_per_session {
                        Some(b) => libsql::Value::Text(b.to_string()),
                        None => libsql::Value::Null,
                    },
                    record.availability.as_str(),
                    record.marketing_consent as i64,
                    record.phone.as_str(),
                ],
            )
            .await
            .map_err(|e| write_error("update_client", e))?;
        Ok(affected > 0)
    }

    // ── Habits ──────────────────────────────────────────────────────

    async fn insert_habit(&self, record: &HabitRecord) -> Result<(), StorageError> {
        self.conn()
            .execute(
                "INSERT INTO habits (id, owner_phone, title, cadence, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.id.to_string(),
                    record.owner_phone.as_str(),
                    record.title.as_str(),
                    record.cadence.as_str(),
                    record.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| write_error("insert_habit", e))?;
        Ok(())
    }

    async fn list_habits_for_phone(
        &self,
        phone: &str,
    ) -> Result<Vec<HabitRecord>, StorageError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, owner_phone, title, cadence, created_at FROM habits \
                 WHERE owner_phone = ?1 ORDER BY created_at ASC",
                params![phone],
            )
            .await
            .map_err(|e| StorageError::Query(format!("list_habits_for_phone: {e}")))?;

        let mut habits = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_habit(&row) {
                Ok(habit) => habits.push(habit),
                Err(e) => tracing::warn!("Skipping habit row: {e}"),
            }
        }
        Ok(habits)
    }

    async fn insert_habit_log(&self, record: &HabitLogRecord) -> Result<(), StorageError> {
        self.conn()
            .execute(
                "INSERT INTO habit_logs (id, habit_id, logged_on, completed, note, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.id.to_string(),
                    record.habit_id.to_string(),
                    record.logged_on.to_string(),
                    record.completed as i64,
                    match &record.note {
                        Some(n) => libsql::Value::Text(n.clone()),
                        None => libsql::Value::Null,
                    },
                    record.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| write_error("insert_habit_log", e))?;
        Ok(())
    }

    async fn count_habit_logs(&self, habit_id: Uuid) -> Result<usize, StorageError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM habit_logs WHERE habit_id = ?1",
                params![habit_id.to_string()],
            )
            .await
            .map_err(|e| StorageError::Query(format!("count_habit_logs: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| StorageError::Query(format!("count_habit_logs: {e}")))?;
                Ok(count as usize)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(StorageError::Query(format!("count_habit_logs: {e}"))),
        }
    }

    // ── Text registrations ──────────────────────────────────────────

    async fn get_text_registration(
        &self,
        phone: &str,
    ) -> Result<Option<TextRegistrationState>, StorageError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT phone, domain, phase, answers, message_count, started_at \
                 FROM text_registrations WHERE phone = ?1",
                params![phone],
            )
            .await
            .map_err(|e| StorageError::Query(format!("get_text_registration: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_text_registration(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(StorageError::Query(format!("get_text_registration: {e}"))),
        }
    }

    async fn upsert_text_registration(
        &self,
        state: &TextRegistrationState,
    ) -> Result<(), StorageError> {
        self.conn()
            .execute(
                "INSERT INTO text_registrations (phone, domain, phase, answers, message_count, started_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                 ON CONFLICT(phone) DO UPDATE SET domain = excluded.domain, \
                 phase = excluded.phase, answers = excluded.answers, \
                 message_count = excluded.message_count, updated_at = datetime('now')",
                params![
                    state.phone.as_str(),
                    state.domain.as_str(),
                    state.phase.to_string(),
                    state.answers.to_string(),
                    state.message_count as i64,
                    state.started_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| write_error("upsert_text_registration", e))?;
        Ok(())
    }

    async fn delete_text_registration(&self, phone: &str) -> Result<bool, StorageError> {
        let affected = self
            .conn()
            .execute(
                "DELETE FROM text_registrations WHERE phone = ?1",
                params![phone],
            )
            .await
            .map_err(|e| StorageError::Query(format!("delete_text_registration: {e}")))?;
        Ok(affected > 0)
    }
}
