//! Flow handlers for habit setup, logging, and progress completions.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::FlowError;
use crate::flows::dispatch::{DispatchOutcome, FlowHandler};
use crate::flows::normalize::ValidationReport;
use crate::flows::payload::{HabitLogSubmission, HabitSetupSubmission, RawFlowPayload};
use crate::flows::token::{FlowType, FlowTokenRecord};
use crate::habits::model::{HabitCadence, HabitLogRecord, HabitRecord};
use crate::store::Database;

/// Creates habit rows from a trainer's habit-setup flow.
///
/// The token context may carry a `client_phone` when the trainer sets up
/// habits on a client's behalf; otherwise the habits belong to the sender.
pub struct TrainerHabitSetupHandler {
    db: Arc<dyn Database>,
}

impl TrainerHabitSetupHandler {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl FlowHandler for TrainerHabitSetupHandler {
    fn flow_type(&self) -> FlowType {
        FlowType::TrainerHabitSetup
    }

    async fn handle(
        &self,
        payload: &RawFlowPayload,
        token: &FlowTokenRecord,
    ) -> Result<DispatchOutcome, FlowError> {
        let sub: HabitSetupSubmission = payload.decode()?;

        let titles: Vec<String> = sub
            .habits
            .map(|h| h.into_vec())
            .unwrap_or_default()
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        if titles.is_empty() {
            return Err(FlowError::Validation(ValidationReport::single(
                "habits",
                "habits is required",
            )));
        }

        let cadence = sub
            .cadence
            .as_deref()
            .map(HabitCadence::parse)
            .unwrap_or_default();
        let owner = token
            .context
            .get("client_phone")
            .and_then(|v| v.as_str())
            .unwrap_or(&token.phone);

        let count = titles.len();
        for title in titles {
            let habit = HabitRecord::new(owner, &title, cadence);
            self.db.insert_habit(&habit).await?;
        }

        tracing::info!(owner = %owner, count, "Habits created");
        Ok(DispatchOutcome::HabitsCreated { count })
    }
}

/// Appends a habit log row from a client's habit-logging flow.
///
/// The habit being logged rides in the token context, captured at send time.
pub struct ClientHabitLoggingHandler {
    db: Arc<dyn Database>,
}

impl ClientHabitLoggingHandler {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl FlowHandler for ClientHabitLoggingHandler {
    fn flow_type(&self) -> FlowType {
        FlowType::ClientHabitLogging
    }

    async fn handle(
        &self,
        payload: &RawFlowPayload,
        token: &FlowTokenRecord,
    ) -> Result<DispatchOutcome, FlowError> {
        let habit_id = token
            .context
            .get("habit_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| {
                FlowError::MalformedPayload(
                    "token context is missing a valid habit_id".to_string(),
                )
            })?;

        let sub: HabitLogSubmission = payload.decode()?;
        let completed = sub.completed.map(|f| f.is_true()).unwrap_or(true);
        let note = sub.note.filter(|n| !n.trim().is_empty());

        let log = HabitLogRecord::new(habit_id, completed, note);
        self.db.insert_habit_log(&log).await?;

        tracing::info!(habit_id = %habit_id, completed, "Habit logged");
        Ok(DispatchOutcome::HabitLogged { habit_id })
    }
}

/// Acknowledges a progress-review flow. Read-only: nothing is persisted.
pub struct HabitProgressHandler {
    db: Arc<dyn Database>,
}

impl HabitProgressHandler {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl FlowHandler for HabitProgressHandler {
    fn flow_type(&self) -> FlowType {
        FlowType::HabitProgress
    }

    async fn handle(
        &self,
        _payload: &RawFlowPayload,
        token: &FlowTokenRecord,
    ) -> Result<DispatchOutcome, FlowError> {
        let habits = self.db.list_habits_for_phone(&token.phone).await?;

        let mut total_logs = 0;
        for habit in &habits {
            total_logs += self.db.count_habit_logs(habit.id).await?;
        }
        tracing::info!(
            phone = %token.phone,
            habits = habits.len(),
            logs = total_logs,
            "Progress reviewed"
        );

        Ok(DispatchOutcome::ProgressAcknowledged {
            habits: habits.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LibSqlBackend;
    use chrono::Utc;
    use serde_json::json;

    async fn db() -> Arc<dyn Database> {
        Arc::new(LibSqlBackend::new_memory().await.unwrap())
    }

    fn token_with_context(flow_type: FlowType, context: serde_json::Value) -> FlowTokenRecord {
        FlowTokenRecord {
            token: "t1".into(),
            phone: "+27831112222".into(),
            flow_type: flow_type.as_str().into(),
            context,
            created_at: Utc::now(),
            expires_at: Utc::now() + chrono::Duration::seconds(600),
        }
    }

    #[tokio::test]
    async fn habit_setup_creates_one_row_per_title() {
        let db = db().await;
        let handler = TrainerHabitSetupHandler::new(Arc::clone(&db));
        let token = token_with_context(
            FlowType::TrainerHabitSetup,
            json!({"client_phone": "+27840001111"}),
        );
        let payload = RawFlowPayload::from_value(json!({
            "habits": ["Drink 2L water", "Stretch 10min"],
            "cadence": "daily"
        }))
        .unwrap();

        let outcome = handler.handle(&payload, &token).await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::HabitsCreated { count: 2 }));

        let habits = db.list_habits_for_phone("+27840001111").await.unwrap();
        assert_eq!(habits.len(), 2);
    }

    #[tokio::test]
    async fn habit_setup_requires_at_least_one_habit() {
        let db = db().await;
        let handler = TrainerHabitSetupHandler::new(db);
        let token = token_with_context(FlowType::TrainerHabitSetup, json!({}));
        let payload = RawFlowPayload::from_value(json!({"habits": [" "]})).unwrap();

        let err = handler.handle(&payload, &token).await.unwrap_err();
        assert!(matches!(err, FlowError::Validation(_)));
    }

    #[tokio::test]
    async fn habit_logging_uses_habit_from_context() {
        let db = db().await;
        let habit = HabitRecord::new("+27831112222", "Stretch", HabitCadence::Daily);
        db.insert_habit(&habit).await.unwrap();

        let handler = ClientHabitLoggingHandler::new(Arc::clone(&db));
        let token = token_with_context(
            FlowType::ClientHabitLogging,
            json!({"habit_id": habit.id.to_string()}),
        );
        let payload =
            RawFlowPayload::from_value(json!({"completed": "true", "note": "felt great"}))
                .unwrap();

        let outcome = handler.handle(&payload, &token).await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::HabitLogged { habit_id } if habit_id == habit.id));
        assert_eq!(db.count_habit_logs(habit.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn habit_logging_without_context_fails() {
        let db = db().await;
        let handler = ClientHabitLoggingHandler::new(db);
        let token = token_with_context(FlowType::ClientHabitLogging, json!({}));
        let payload = RawFlowPayload::from_value(json!({"completed": true})).unwrap();

        let err = handler.handle(&payload, &token).await.unwrap_err();
        assert!(matches!(err, FlowError::MalformedPayload(_)));
    }

    #[tokio::test]
    async fn progress_counts_habits() {
        let db = db().await;
        db.insert_habit(&HabitRecord::new("+27831112222", "A", HabitCadence::Daily))
            .await
            .unwrap();
        db.insert_habit(&HabitRecord::new("+27831112222", "B", HabitCadence::Weekly))
            .await
            .unwrap();

        let handler = HabitProgressHandler::new(db);
        let token = token_with_context(FlowType::HabitProgress, json!({}));
        let payload = RawFlowPayload::from_value(json!({})).unwrap();

        let outcome = handler.handle(&payload, &token).await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::ProgressAcknowledged { habits: 2 }));
    }
}
