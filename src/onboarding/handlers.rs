//! Flow handlers for onboarding and profile-edit completions.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::FlowError;
use crate::flows::dispatch::{DispatchOutcome, FlowHandler};
use crate::flows::normalize::{PayloadNormalizer, ValidationReport};
use crate::flows::payload::{
    ClientOnboardingSubmission, ProfileEditSubmission, RawFlowPayload,
    TrainerOnboardingSubmission,
};
use crate::flows::token::{FlowType, FlowTokenRecord};
use crate::store::Database;

/// Creates a trainer record from a completed trainer onboarding flow.
pub struct TrainerOnboardingHandler {
    db: Arc<dyn Database>,
    normalizer: Arc<PayloadNormalizer>,
}

impl TrainerOnboardingHandler {
    pub fn new(db: Arc<dyn Database>, normalizer: Arc<PayloadNormalizer>) -> Self {
        Self { db, normalizer }
    }
}

#[async_trait]
impl FlowHandler for TrainerOnboardingHandler {
    fn flow_type(&self) -> FlowType {
        FlowType::TrainerOnboarding
    }

    async fn handle(
        &self,
        payload: &RawFlowPayload,
        token: &FlowTokenRecord,
    ) -> Result<DispatchOutcome, FlowError> {
        let sub: TrainerOnboardingSubmission = payload.decode()?;
        let record = self
            .normalizer
            .normalize_trainer(sub, &token.phone)
            .map_err(FlowError::Validation)?;

        self.db.insert_trainer(&record).await?;
        tracing::info!(phone = %record.phone, "Trainer registered, pending approval");
        Ok(DispatchOutcome::TrainerRegistered {
            phone: record.phone,
        })
    }
}

/// Creates a client record from a completed client onboarding flow.
pub struct ClientOnboardingHandler {
    db: Arc<dyn Database>,
    normalizer: Arc<PayloadNormalizer>,
}

impl ClientOnboardingHandler {
    pub fn new(db: Arc<dyn Database>, normalizer: Arc<PayloadNormalizer>) -> Self {
        Self { db, normalizer }
    }
}

#[async_trait]
impl FlowHandler for ClientOnboardingHandler {
    fn flow_type(&self) -> FlowType {
        FlowType::ClientOnboarding
    }

    async fn handle(
        &self,
        payload: &RawFlowPayload,
        token: &FlowTokenRecord,
    ) -> Result<DispatchOutcome, FlowError> {
        let sub: ClientOnboardingSubmission = payload.decode()?;
        let record = self
            .normalizer
            .normalize_client(sub, &token.phone)
            .map_err(FlowError::Validation)?;

        self.db.insert_client(&record).await?;
        tracing::info!(phone = %record.phone, "Client registered, pending approval");
        Ok(DispatchOutcome::ClientRegistered {
            phone: record.phone,
        })
    }
}

/// Applies a profile-edit flow to an existing trainer record.
///
/// The token's context may carry a `phone` naming the record under edit;
/// otherwise the token's own phone is the target.
pub struct ProfileEditTrainerHandler {
    db: Arc<dyn Database>,
    normalizer: Arc<PayloadNormalizer>,
}

impl ProfileEditTrainerHandler {
    pub fn new(db: Arc<dyn Database>, normalizer: Arc<PayloadNormalizer>) -> Self {
        Self { db, normalizer }
    }
}

#[async_trait]
impl FlowHandler for ProfileEditTrainerHandler {
    fn flow_type(&self) -> FlowType {
        FlowType::ProfileEditTrainer
    }

    async fn handle(
        &self,
        payload: &RawFlowPayload,
        token: &FlowTokenRecord,
    ) -> Result<DispatchOutcome, FlowError> {
        let phone = edit_target(token);
        let Some(mut record) = self.db.get_trainer_by_phone(phone).await? else {
            return Err(FlowError::Validation(ValidationReport::single(
                "phone",
                "no trainer profile exists for this number",
            )));
        };

        let sub: ProfileEditSubmission = payload.decode()?;
        self.normalizer
            .apply_trainer_edits(&mut record, sub)
            .map_err(FlowError::Validation)?;

        self.db.update_trainer(&record).await?;
        tracing::info!(phone = %record.phone, "Trainer profile updated");
        Ok(DispatchOutcome::TrainerProfileUpdated {
            phone: record.phone,
        })
    }
}

/// Applies a profile-edit flow to an existing client record.
pub struct ProfileEditClientHandler {
    db: Arc<dyn Database>,
    normalizer: Arc<PayloadNormalizer>,
}

impl ProfileEditClientHandler {
    pub fn new(db: Arc<dyn Database>, normalizer: Arc<PayloadNormalizer>) -> Self {
        Self { db, normalizer }
    }
}

#[async_trait]
impl FlowHandler for ProfileEditClientHandler {
    fn flow_type(&self) -> FlowType {
        FlowType::ProfileEditClient
    }

    async fn handle(
        &self,
        payload: &RawFlowPayload,
        token: &FlowTokenRecord,
    ) -> Result<DispatchOutcome, FlowError> {
        let phone = edit_target(token);
        let Some(mut record) = self.db.get_client_by_phone(phone).await? else {
            return Err(FlowError::Validation(ValidationReport::single(
                "phone",
                "no client profile exists for this number",
            )));
        };

        let sub: ProfileEditSubmission = payload.decode()?;
        self.normalizer
            .apply_client_edits(&mut record, sub)
            .map_err(FlowError::Validation)?;

        self.db.update_client(&record).await?;
        tracing::info!(phone = %record.phone, "Client profile updated");
        Ok(DispatchOutcome::ClientProfileUpdated {
            phone: record.phone,
        })
    }
}

/// The phone whose record a profile-edit flow targets.
fn edit_target(token: &FlowTokenRecord) -> &str {
    token
        .context
        .get("phone")
        .and_then(|v| v.as_str())
        .unwrap_or(&token.phone)
}
