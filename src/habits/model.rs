//! Habit tracking models — habits set up by trainers, logged by clients.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How often a habit is expected to be performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HabitCadence {
    Daily,
    Weekly,
}

impl Default for HabitCadence {
    fn default() -> Self {
        Self::Daily
    }
}

impl HabitCadence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
        }
    }

    /// Parse a cadence string; unknown values fall back to daily.
    pub fn parse(s: &str) -> Self {
        match s {
            "weekly" => Self::Weekly,
            _ => Self::Daily,
        }
    }
}

impl std::fmt::Display for HabitCadence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A habit assigned to a client by their trainer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HabitRecord {
    pub id: Uuid,
    /// Phone of the client the habit belongs to.
    pub owner_phone: String,
    pub title: String,
    pub cadence: HabitCadence,
    pub created_at: DateTime<Utc>,
}

impl HabitRecord {
    pub fn new(owner_phone: &str, title: &str, cadence: HabitCadence) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_phone: owner_phone.to_string(),
            title: title.to_string(),
            cadence,
            created_at: Utc::now(),
        }
    }
}

/// One logged occurrence of a habit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HabitLogRecord {
    pub id: Uuid,
    pub habit_id: Uuid,
    pub logged_on: NaiveDate,
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl HabitLogRecord {
    pub fn new(habit_id: Uuid, completed: bool, note: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            habit_id,
            logged_on: now.date_naive(),
            completed,
            note,
            created_at: now,
        }
    }
}
