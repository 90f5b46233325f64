//! Habit tracking — habit setup, logging, and progress flows.

pub mod handlers;
pub mod model;

pub use handlers::{ClientHabitLoggingHandler, HabitProgressHandler, TrainerHabitSetupHandler};
pub use model::{HabitCadence, HabitLogRecord, HabitRecord};
