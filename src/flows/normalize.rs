//! Payload normalization — maps raw flow-screen values into canonical
//! domain records, and validates them before anything is persisted.
//!
//! Label dictionaries are closed per categorical field, but unknown option
//! IDs pass through unchanged as their raw string. That lenience is
//! deliberate: new flow-screen options ship ahead of the catalog, and a
//! submission must not bounce because of an uncatalogued ID.

use std::collections::HashMap;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::flows::payload::{
    ClientOnboardingSubmission, OneOrMany, ProfileEditSubmission, TrainerOnboardingSubmission,
};
use crate::onboarding::model::{ClientRecord, RegistrationStatus, TrainerRecord};

/// A closed dictionary mapping option IDs to canonical display labels.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct LabelMap(HashMap<String, String>);

impl LabelMap {
    pub fn new(entries: &[(&str, &str)]) -> Self {
        Self(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    /// Canonical label for an option ID. Unknown IDs pass through unchanged.
    pub fn canonical(&self, raw: &str) -> String {
        self.0
            .get(raw)
            .cloned()
            .unwrap_or_else(|| raw.to_string())
    }

    /// Map each element of a scalar-or-list field and join into the
    /// comma-separated display form stored on the record.
    pub fn canonical_display(&self, value: OneOrMany) -> String {
        value
            .into_vec()
            .iter()
            .map(|v| self.canonical(v.trim()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// The full set of label dictionaries, loaded once at startup and passed
/// explicitly, never referenced as ambient state.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LabelCatalog {
    pub specializations: LabelMap,
    pub services: LabelMap,
    pub fitness_goals: LabelMap,
    pub session_types: LabelMap,
    pub pricing_flexibility: LabelMap,
}

impl Default for LabelCatalog {
    fn default() -> Self {
        Self {
            specializations: LabelMap::new(&[
                ("weight_loss", "Weight Loss"),
                ("strength_training", "Strength Training"),
                ("yoga", "Yoga"),
                ("pilates", "Pilates"),
                ("endurance", "Endurance"),
                ("rehabilitation", "Rehabilitation"),
                ("nutrition", "Nutrition Coaching"),
                ("boxing", "Boxing"),
            ]),
            services: LabelMap::new(&[
                ("in_person", "In-Person Sessions"),
                ("online_coaching", "Online Coaching"),
                ("group_classes", "Group Classes"),
                ("meal_planning", "Meal Planning"),
                ("programme_design", "Programme Design"),
            ]),
            fitness_goals: LabelMap::new(&[
                ("lose_weight", "Lose Weight"),
                ("build_muscle", "Build Muscle"),
                ("improve_fitness", "Improve Fitness"),
                ("train_for_event", "Train for an Event"),
                ("stay_active", "Stay Active"),
            ]),
            session_types: LabelMap::new(&[
                ("one_on_one", "One-on-One"),
                ("group", "Group"),
                ("virtual", "Virtual"),
            ]),
            pricing_flexibility: LabelMap::new(&[
                ("fixed", "Fixed Rate"),
                ("negotiable", "Negotiable"),
                ("package_deals", "Package Deals"),
            ]),
        }
    }
}

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Outcome of a validation pass. Returned as a value, never raised; callers
/// always receive the full list of field errors.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<FieldError>,
}

impl ValidationReport {
    pub fn failed(errors: Vec<FieldError>) -> Self {
        Self {
            valid: false,
            errors,
        }
    }

    /// A report with a single field error.
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        Self::failed(vec![FieldError::new(field, message)])
    }
}

impl std::fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let joined = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "{joined}")
    }
}

/// Normalizes raw flow submissions into canonical records.
#[derive(Debug, Clone)]
pub struct PayloadNormalizer {
    labels: LabelCatalog,
    pricing_floor: Decimal,
}

impl PayloadNormalizer {
    pub fn new(labels: LabelCatalog, pricing_floor: Decimal) -> Self {
        Self {
            labels,
            pricing_floor,
        }
    }

    pub fn labels(&self) -> &LabelCatalog {
        &self.labels
    }

    pub fn pricing_floor(&self) -> Decimal {
        self.pricing_floor
    }

    /// Build a trainer record from a raw submission, or reject it with
    /// field-level errors. Status is force-set to `PendingApproval`.
    pub fn normalize_trainer(
        &self,
        sub: TrainerOnboardingSubmission,
        phone: &str,
    ) -> Result<TrainerRecord, ValidationReport> {
        let mut errors = Vec::new();

        let name = required_text("full_name", sub.full_name, &mut errors);
        let email = required_email(sub.email, &mut errors);
        let specializations = required_multi(
            "specializations",
            sub.specializations,
            &self.labels.specializations,
            &mut errors,
        );
        let services =
            required_multi("services", sub.services, &self.labels.services, &mut errors);
        let price = self.required_price("price_per_session", sub.price_per_session, &mut errors);

        let terms_accepted = sub.terms_accepted.map(|f| f.is_true()).unwrap_or(false);
        if !terms_accepted {
            errors.push(FieldError::new(
                "terms_accepted",
                "terms and conditions must be accepted",
            ));
        }

        if !errors.is_empty() {
            return Err(ValidationReport::failed(errors));
        }

        Ok(TrainerRecord {
            id: Uuid::new_v4(),
            name,
            phone: phone.to_string(),
            email,
            specializations,
            services,
            price_per_session: price.unwrap_or_default(),
            pricing_flexibility: sub
                .pricing_flexibility
                .map(|v| self.labels.pricing_flexibility.canonical(v.trim()))
                .unwrap_or_default(),
            availability: sub.availability.unwrap_or_default(),
            terms_accepted: true,
            marketing_consent: sub.marketing_consent.map(|f| f.is_true()).unwrap_or(false),
            status: RegistrationStatus::PendingApproval,
            created_at: Utc::now(),
        })
    }

    /// Build a client record from a raw submission, or reject it.
    pub fn normalize_client(
        &self,
        sub: ClientOnboardingSubmission,
        phone: &str,
    ) -> Result<ClientRecord, ValidationReport> {
        let mut errors = Vec::new();

        let name = required_text("full_name", sub.full_name, &mut errors);
        let email = required_email(sub.email, &mut errors);
        let fitness_goals = required_multi(
            "fitness_goals",
            sub.fitness_goals,
            &self.labels.fitness_goals,
            &mut errors,
        );

        let session_types = sub
            .session_types
            .map(|v| self.labels.session_types.canonical_display(v))
            .unwrap_or_default();

        // Budget is optional for clients; when present it must be a number.
        let budget = match sub.budget_per_session {
            Some(raw) => match raw.as_decimal() {
                Some(d) if d > Decimal::ZERO => Some(d),
                Some(_) => {
                    errors.push(FieldError::new(
                        "budget_per_session",
                        "budget_per_session must be positive",
                    ));
                    None
                }
                None => {
                    errors.push(FieldError::new(
                        "budget_per_session",
                        "budget_per_session must be a number",
                    ));
                    None
                }
            },
            None => None,
        };

        let terms_accepted = sub.terms_accepted.map(|f| f.is_true()).unwrap_or(false);
        if !terms_accepted {
            errors.push(FieldError::new(
                "terms_accepted",
                "terms and conditions must be accepted",
            ));
        }

        if !errors.is_empty() {
            return Err(ValidationReport::failed(errors));
        }

        Ok(ClientRecord {
            id: Uuid::new_v4(),
            name,
            phone: phone.to_string(),
            email,
            fitness_goals,
            session_types,
            budget_per_session: budget,
            availability: sub.availability.unwrap_or_default(),
            terms_accepted: true,
            marketing_consent: sub.marketing_consent.map(|f| f.is_true()).unwrap_or(false),
            status: RegistrationStatus::PendingApproval,
            created_at: Utc::now(),
        })
    }

    /// Apply a profile-edit submission to an existing trainer record.
    /// Only present fields change; edited values revalidate.
    pub fn apply_trainer_edits(
        &self,
        record: &mut TrainerRecord,
        sub: ProfileEditSubmission,
    ) -> Result<(), ValidationReport> {
        let mut errors = Vec::new();

        if let Some(name) = sub.full_name {
            if name.trim().is_empty() {
                errors.push(FieldError::new("full_name", "full_name must not be empty"));
            } else {
                record.name = name.trim().to_string();
            }
        }
        if let Some(email) = sub.email {
            if email.contains('@') {
                record.email = email.trim().to_string();
            } else {
                errors.push(FieldError::new(
                    "email",
                    "email must be a valid email address",
                ));
            }
        }
        if let Some(specs) = sub.specializations {
            record.specializations = self.labels.specializations.canonical_display(specs);
        }
        if let Some(services) = sub.services {
            record.services = self.labels.services.canonical_display(services);
        }
        if let Some(raw) = sub.price_per_session {
            match raw.as_decimal() {
                Some(d) if d >= self.pricing_floor => record.price_per_session = d,
                Some(_) => errors.push(FieldError::new(
                    "price_per_session",
                    format!("price_per_session must be at least {}", self.pricing_floor),
                )),
                None => errors.push(FieldError::new(
                    "price_per_session",
                    "price_per_session must be a number",
                )),
            }
        }
        if let Some(availability) = sub.availability {
            record.availability = availability;
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationReport::failed(errors))
        }
    }

    /// Apply a profile-edit submission to an existing client record.
    pub fn apply_client_edits(
        &self,
        record: &mut ClientRecord,
        sub: ProfileEditSubmission,
    ) -> Result<(), ValidationReport> {
        let mut errors = Vec::new();

        if let Some(name) = sub.full_name {
            if name.trim().is_empty() {
                errors.push(FieldError::new("full_name", "full_name must not be empty"));
            } else {
                record.name = name.trim().to_string();
            }
        }
        if let Some(email) = sub.email {
            if email.contains('@') {
                record.email = email.trim().to_string();
            } else {
                errors.push(FieldError::new(
                    "email",
                    "email must be a valid email address",
                ));
            }
        }
        if let Some(goals) = sub.fitness_goals {
            record.fitness_goals = self.labels.fitness_goals.canonical_display(goals);
        }
        if let Some(types) = sub.session_types {
            record.session_types = self.labels.session_types.canonical_display(types);
        }
        if let Some(raw) = sub.budget_per_session {
            match raw.as_decimal() {
                Some(d) if d > Decimal::ZERO => record.budget_per_session = Some(d),
                _ => errors.push(FieldError::new(
                    "budget_per_session",
                    "budget_per_session must be a positive number",
                )),
            }
        }
        if let Some(availability) = sub.availability {
            record.availability = availability;
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationReport::failed(errors))
        }
    }

    fn required_price(
        &self,
        field: &str,
        raw: Option<crate::flows::payload::RawAmount>,
        errors: &mut Vec<FieldError>,
    ) -> Option<Decimal> {
        match raw {
            None => {
                errors.push(FieldError::new(field, format!("{field} is required")));
                None
            }
            Some(raw) => match raw.as_decimal() {
                None => {
                    errors.push(FieldError::new(field, format!("{field} must be a number")));
                    None
                }
                Some(d) if d < self.pricing_floor => {
                    errors.push(FieldError::new(
                        field,
                        format!("{field} must be at least {}", self.pricing_floor),
                    ));
                    None
                }
                Some(d) => Some(d),
            },
        }
    }
}

fn required_text(field: &str, value: Option<String>, errors: &mut Vec<FieldError>) -> String {
    match value {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => {
            errors.push(FieldError::new(field, format!("{field} is required")));
            String::new()
        }
    }
}

fn required_email(value: Option<String>, errors: &mut Vec<FieldError>) -> String {
    match value {
        Some(v) if v.trim().is_empty() => {
            errors.push(FieldError::new("email", "email is required"));
            String::new()
        }
        Some(v) if !v.contains('@') => {
            errors.push(FieldError::new(
                "email",
                "email must be a valid email address",
            ));
            String::new()
        }
        Some(v) => v.trim().to_string(),
        None => {
            errors.push(FieldError::new("email", "email is required"));
            String::new()
        }
    }
}

fn required_multi(
    field: &str,
    value: Option<OneOrMany>,
    map: &LabelMap,
    errors: &mut Vec<FieldError>,
) -> String {
    match value {
        Some(v) if !v.is_empty() => map.canonical_display(v),
        _ => {
            errors.push(FieldError::new(field, format!("{field} is required")));
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::payload::{RawAmount, RawFlag};
    use rust_decimal_macros::dec;

    fn normalizer() -> PayloadNormalizer {
        PayloadNormalizer::new(LabelCatalog::default(), dec!(100))
    }

    fn valid_trainer_submission() -> TrainerOnboardingSubmission {
        TrainerOnboardingSubmission {
            full_name: Some("Thandi Mokoena".into()),
            email: Some("thandi@example.com".into()),
            specializations: Some(OneOrMany::Many(vec![
                "yoga".into(),
                "strength_training".into(),
            ])),
            services: Some(OneOrMany::One("online_coaching".into())),
            price_per_session: Some(RawAmount::Text("350".into())),
            pricing_flexibility: Some("negotiable".into()),
            availability: Some("weekday mornings".into()),
            terms_accepted: Some(RawFlag::Bool(true)),
            marketing_consent: Some(RawFlag::Bool(false)),
        }
    }

    #[test]
    fn maps_known_option_ids_to_canonical_labels() {
        let record = normalizer()
            .normalize_trainer(valid_trainer_submission(), "+27821234567")
            .unwrap();

        assert_eq!(record.specializations, "Yoga, Strength Training");
        assert_eq!(record.services, "Online Coaching");
        assert_eq!(record.pricing_flexibility, "Negotiable");
        assert_eq!(record.price_per_session, dec!(350));
        assert_eq!(record.status, RegistrationStatus::PendingApproval);
        assert_eq!(record.phone, "+27821234567");
    }

    #[test]
    fn unknown_option_ids_pass_through_unchanged() {
        let mut sub = valid_trainer_submission();
        sub.specializations = Some(OneOrMany::Many(vec![
            "yoga".into(),
            "aqua_aerobics".into(),
        ]));

        let record = normalizer()
            .normalize_trainer(sub, "+27821234567")
            .unwrap();
        assert_eq!(record.specializations, "Yoga, aqua_aerobics");
    }

    #[test]
    fn scalar_multi_select_becomes_one_element_list() {
        let mut sub = valid_trainer_submission();
        sub.specializations = Some(OneOrMany::One("pilates".into()));

        let record = normalizer()
            .normalize_trainer(sub, "+27821234567")
            .unwrap();
        assert_eq!(record.specializations, "Pilates");
    }

    #[test]
    fn missing_email_names_the_field() {
        let mut sub = valid_trainer_submission();
        sub.email = None;

        let report = normalizer()
            .normalize_trainer(sub, "+27821234567")
            .unwrap_err();
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.field == "email"));
    }

    #[test]
    fn email_without_at_sign_rejected() {
        let mut sub = valid_trainer_submission();
        sub.email = Some("not-an-email".into());

        let report = normalizer()
            .normalize_trainer(sub, "+27821234567")
            .unwrap_err();
        assert!(report
            .errors
            .iter()
            .any(|e| e.field == "email" && e.message.contains("valid")));
    }

    #[test]
    fn price_below_floor_fails_with_pricing_message() {
        let mut sub = valid_trainer_submission();
        sub.price_per_session = Some(RawAmount::Text("50".into()));

        let report = normalizer()
            .normalize_trainer(sub, "+27821234567")
            .unwrap_err();
        assert!(report
            .errors
            .iter()
            .any(|e| e.field == "price_per_session" && e.message.contains("at least 100")));
    }

    #[test]
    fn unparseable_price_rejected() {
        let mut sub = valid_trainer_submission();
        sub.price_per_session = Some(RawAmount::Text("cheap".into()));

        let report = normalizer()
            .normalize_trainer(sub, "+27821234567")
            .unwrap_err();
        assert!(report
            .errors
            .iter()
            .any(|e| e.field == "price_per_session" && e.message.contains("number")));
    }

    #[test]
    fn terms_must_be_explicitly_true() {
        let mut sub = valid_trainer_submission();
        sub.terms_accepted = Some(RawFlag::Text("false".into()));

        let report = normalizer()
            .normalize_trainer(sub, "+27821234567")
            .unwrap_err();
        assert!(report.errors.iter().any(|e| e.field == "terms_accepted"));

        let mut sub = valid_trainer_submission();
        sub.terms_accepted = None;
        let report = normalizer()
            .normalize_trainer(sub, "+27821234567")
            .unwrap_err();
        assert!(report.errors.iter().any(|e| e.field == "terms_accepted"));
    }

    #[test]
    fn all_errors_collected_in_one_pass() {
        let sub = TrainerOnboardingSubmission::default();
        let report = normalizer()
            .normalize_trainer(sub, "+27821234567")
            .unwrap_err();

        let fields: Vec<&str> = report.errors.iter().map(|e| e.field.as_str()).collect();
        for expected in [
            "full_name",
            "email",
            "specializations",
            "services",
            "price_per_session",
            "terms_accepted",
        ] {
            assert!(fields.contains(&expected), "missing error for {expected}");
        }
    }

    #[test]
    fn client_budget_is_optional() {
        let sub = ClientOnboardingSubmission {
            full_name: Some("Sipho Dlamini".into()),
            email: Some("sipho@example.com".into()),
            fitness_goals: Some(OneOrMany::Many(vec!["lose_weight".into()])),
            session_types: None,
            budget_per_session: None,
            availability: None,
            terms_accepted: Some(RawFlag::Text("true".into())),
            marketing_consent: None,
        };

        let record = normalizer().normalize_client(sub, "+27831112222").unwrap();
        assert_eq!(record.fitness_goals, "Lose Weight");
        assert!(record.budget_per_session.is_none());
        assert_eq!(record.status, RegistrationStatus::PendingApproval);
    }

    #[test]
    fn trainer_edit_applies_only_present_fields() {
        let mut record = normalizer()
            .normalize_trainer(valid_trainer_submission(), "+27821234567")
            .unwrap();

        let edits = ProfileEditSubmission {
            price_per_session: Some(RawAmount::Text("400".into())),
            specializations: Some(OneOrMany::One("boxing".into())),
            ..Default::default()
        };
        normalizer().apply_trainer_edits(&mut record, edits).unwrap();

        assert_eq!(record.price_per_session, dec!(400));
        assert_eq!(record.specializations, "Boxing");
        // Untouched fields survive.
        assert_eq!(record.name, "Thandi Mokoena");
    }

    #[test]
    fn trainer_edit_rejects_price_below_floor() {
        let mut record = normalizer()
            .normalize_trainer(valid_trainer_submission(), "+27821234567")
            .unwrap();

        let edits = ProfileEditSubmission {
            price_per_session: Some(RawAmount::Text("10".into())),
            ..Default::default()
        };
        let report = normalizer()
            .apply_trainer_edits(&mut record, edits)
            .unwrap_err();
        assert!(report.errors.iter().any(|e| e.field == "price_per_session"));
        // Record unchanged on rejection.
        assert_eq!(record.price_per_session, dec!(350));
    }
}
