//! Onboarding domain — trainer/client records, flow handlers, and the
//! text-based registration fallback.

pub mod handlers;
pub mod model;
pub mod text;

pub use handlers::{
    ClientOnboardingHandler, ProfileEditClientHandler, ProfileEditTrainerHandler,
    TrainerOnboardingHandler,
};
pub use model::{ClientRecord, OnboardingDomain, RegistrationStatus, TrainerRecord};
pub use text::{TextRegistrar, TextRegistrationState};
