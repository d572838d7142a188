use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One lesion record exactly as the oracle returned it
///
/// The schema is deliberately loose: keys may be missing, renamed or carry
/// unexpected types. The tracker validates it field by field.
pub type RawLesion = Map<String, Value>;

/// Result of one oracle call, after retries
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionOutcome {
    pub observations: Vec<RawLesion>,
    pub success: bool,
    pub raw_response: String,
    pub error: Option<String>,
}

impl ExtractionOutcome {
    pub fn succeeded(observations: Vec<RawLesion>, raw_response: impl Into<String>) -> Self {
        Self {
            observations,
            success: true,
            raw_response: raw_response.into(),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            observations: Vec::new(),
            success: false,
            raw_response: String::new(),
            error: Some(error.into()),
        }
    }
}

/// What the follow-up prompt tells the oracle about one prior lesion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorLesionSummary {
    pub lesion_id: String,
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_cm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_mm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub characteristics: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_outcome_has_no_observations() {
        let outcome = ExtractionOutcome::failed("boom");
        assert!(!outcome.success);
        assert!(outcome.observations.is_empty());
        assert!(outcome.raw_response.is_empty());
        assert_eq!(outcome.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_summary_omits_absent_fields() {
        let summary = PriorLesionSummary {
            lesion_id: "L1".to_string(),
            location: "liver segment 7".to_string(),
            size_cm: Some(1.2),
            size_mm: None,
            characteristics: None,
        };

        let json = serde_json::to_value(&summary).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 3);
        assert!(!obj.contains_key("size_mm"));
        assert!(!obj.contains_key("characteristics"));
    }
}
