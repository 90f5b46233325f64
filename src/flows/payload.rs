//! Raw flow-completion payloads and their typed per-flow decodings.
//!
//! A completion callback arrives as a flat JSON object: a `flow_token` plus
//! whatever screen fields the flow collected. Screens send strings, option
//! IDs, or arrays of option IDs, so each flow type declares an explicit
//! submission struct and decodes the raw map at the dispatch boundary —
//! domain logic never touches untyped JSON.

use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::FlowError;

/// Key carrying the correlation token in every completion callback.
pub const FLOW_TOKEN_FIELD: &str = "flow_token";

/// An unvalidated flow-completion payload: screen field name → raw value.
///
/// Never persisted directly; always decoded into a typed submission and run
/// through the normalizer first.
#[derive(Debug, Clone)]
pub struct RawFlowPayload(Map<String, Value>);

impl RawFlowPayload {
    /// Wrap a JSON object. Returns an error for non-object bodies.
    pub fn from_value(value: Value) -> Result<Self, FlowError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(FlowError::MalformedPayload(format!(
                "expected a JSON object, got {other}"
            ))),
        }
    }

    /// The correlation token, if the callback carried one.
    pub fn flow_token(&self) -> Option<&str> {
        self.0.get(FLOW_TOKEN_FIELD).and_then(Value::as_str)
    }

    /// A single raw field value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Decode the screen fields into a typed submission.
    ///
    /// Submission structs keep every field optional so that missing fields
    /// surface as validation errors with field names, not decode failures.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, FlowError> {
        serde_json::from_value(Value::Object(self.0.clone()))
            .map_err(|e| FlowError::MalformedPayload(e.to_string()))
    }
}

/// A field that a flow screen may send as a single option ID or as a
/// multi-select array. Both shapes resolve through the same label map.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    /// Flatten to a list; a scalar becomes a one-element list.
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(v) => vec![v],
            Self::Many(vs) => vs,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::One(v) => v.trim().is_empty(),
            Self::Many(vs) => vs.iter().all(|v| v.trim().is_empty()),
        }
    }
}

/// A monetary amount as a flow screen sends it: a text field or a number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawAmount {
    Text(String),
    Number(serde_json::Number),
}

impl RawAmount {
    /// Parse into a `Decimal`, if the raw value is numeric.
    pub fn as_decimal(&self) -> Option<Decimal> {
        let text = match self {
            Self::Text(s) => s.trim().to_string(),
            Self::Number(n) => n.to_string(),
        };
        text.parse::<Decimal>().ok()
    }
}

/// A boolean as a flow screen sends it: a JSON bool or the string "true".
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawFlag {
    Bool(bool),
    Text(String),
}

impl RawFlag {
    /// Whether the flag is explicitly affirmative. Anything else (absent,
    /// "false", junk) is treated as not accepted.
    pub fn is_true(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Text(s) => s.trim().eq_ignore_ascii_case("true"),
        }
    }
}

// ── Per-flow submissions ────────────────────────────────────────────

/// Screen fields of the trainer onboarding flow.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrainerOnboardingSubmission {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub specializations: Option<OneOrMany>,
    #[serde(default)]
    pub services: Option<OneOrMany>,
    #[serde(default)]
    pub price_per_session: Option<RawAmount>,
    #[serde(default)]
    pub pricing_flexibility: Option<String>,
    #[serde(default)]
    pub availability: Option<String>,
    #[serde(default)]
    pub terms_accepted: Option<RawFlag>,
    #[serde(default)]
    pub marketing_consent: Option<RawFlag>,
}

/// Screen fields of the client onboarding flow.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientOnboardingSubmission {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub fitness_goals: Option<OneOrMany>,
    #[serde(default)]
    pub session_types: Option<OneOrMany>,
    #[serde(default)]
    pub budget_per_session: Option<RawAmount>,
    #[serde(default)]
    pub availability: Option<String>,
    #[serde(default)]
    pub terms_accepted: Option<RawFlag>,
    #[serde(default)]
    pub marketing_consent: Option<RawFlag>,
}

/// Screen fields of the trainer habit-setup flow.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HabitSetupSubmission {
    #[serde(default)]
    pub habits: Option<OneOrMany>,
    #[serde(default)]
    pub cadence: Option<String>,
}

/// Screen fields of the client habit-logging flow.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HabitLogSubmission {
    #[serde(default)]
    pub completed: Option<RawFlag>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Screen fields of the profile-edit flows. Only present fields are applied.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileEditSubmission {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub specializations: Option<OneOrMany>,
    #[serde(default)]
    pub services: Option<OneOrMany>,
    #[serde(default)]
    pub fitness_goals: Option<OneOrMany>,
    #[serde(default)]
    pub session_types: Option<OneOrMany>,
    #[serde(default)]
    pub price_per_session: Option<RawAmount>,
    #[serde(default)]
    pub budget_per_session: Option<RawAmount>,
    #[serde(default)]
    pub availability: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_non_object_bodies() {
        assert!(RawFlowPayload::from_value(json!("just a string")).is_err());
        assert!(RawFlowPayload::from_value(json!([1, 2, 3])).is_err());
        assert!(RawFlowPayload::from_value(json!({"a": 1})).is_ok());
    }

    #[test]
    fn extracts_flow_token() {
        let p = RawFlowPayload::from_value(json!({"flow_token": "t1", "x": "y"})).unwrap();
        assert_eq!(p.flow_token(), Some("t1"));

        let p = RawFlowPayload::from_value(json!({"x": "y"})).unwrap();
        assert_eq!(p.flow_token(), None);
    }

    #[test]
    fn one_or_many_accepts_both_shapes() {
        let one: OneOrMany = serde_json::from_value(json!("yoga")).unwrap();
        assert_eq!(one.into_vec(), vec!["yoga".to_string()]);

        let many: OneOrMany = serde_json::from_value(json!(["yoga", "boxing"])).unwrap();
        assert_eq!(many.into_vec(), vec!["yoga".to_string(), "boxing".to_string()]);
    }

    #[test]
    fn raw_amount_parses_text_and_number() {
        let t: RawAmount = serde_json::from_value(json!("350")).unwrap();
        assert_eq!(t.as_decimal(), Some("350".parse().unwrap()));

        let n: RawAmount = serde_json::from_value(json!(99.5)).unwrap();
        assert_eq!(n.as_decimal(), Some("99.5".parse().unwrap()));

        let bad: RawAmount = serde_json::from_value(json!("not a number")).unwrap();
        assert_eq!(bad.as_decimal(), None);
    }

    #[test]
    fn raw_flag_requires_explicit_true() {
        let b: RawFlag = serde_json::from_value(json!(true)).unwrap();
        assert!(b.is_true());

        let s: RawFlag = serde_json::from_value(json!("true")).unwrap();
        assert!(s.is_true());

        let f: RawFlag = serde_json::from_value(json!("yes")).unwrap();
        assert!(!f.is_true());

        let f: RawFlag = serde_json::from_value(json!(false)).unwrap();
        assert!(!f.is_true());
    }

    #[test]
    fn decodes_trainer_submission_with_missing_fields() {
        let p = RawFlowPayload::from_value(json!({
            "flow_token": "t1",
            "full_name": "Thandi M",
            "specializations": ["yoga"]
        }))
        .unwrap();

        let sub: TrainerOnboardingSubmission = p.decode().unwrap();
        assert_eq!(sub.full_name.as_deref(), Some("Thandi M"));
        assert!(sub.email.is_none());
        assert!(sub.specializations.is_some());
    }
}
