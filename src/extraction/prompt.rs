//! Instruction templates for the extraction oracle

use super::types::PriorLesionSummary;
use crate::llm::{ChatMessage, LLMRequest};

const INITIAL_SYSTEM_PROMPT: &str = r#"You are a medical AI assistant specialized in extracting structured lesion information from radiology reports.

Your task is to extract ALL lesions mentioned in the report and return them as a JSON array.

For each lesion, extract:
- location: anatomical location (e.g., "right upper lobe", "liver segment 7", "left frontal lobe")
- size: the size with unit (extract as both size_mm and size_cm if possible)
- characteristics: any additional descriptors (e.g., "enhancing", "nodular")
- raw_text: the exact phrase from the report describing this lesion

Do not assign identifiers; they are assigned after extraction.

Return ONLY a valid JSON array of lesions, with no additional text or explanation.

Example format:
[
  {
    "location": "right upper lobe",
    "size_cm": 2.3,
    "size_mm": 23.0,
    "characteristics": "nodule",
    "raw_text": "2.3 cm nodule in the right upper lobe"
  }
]

If no lesions are found, return an empty array: []
"#;

const FOLLOW_UP_SYSTEM_PROMPT: &str = r#"You are a medical AI assistant specialized in tracking lesions across multiple radiology reports.

Your task is to extract ALL lesions from the current report and match them with previously tracked lesions when possible.

For each lesion in the current report:
1. If it appears to be the same lesion as a previous one (same or similar location), use the same lesion_id
2. If it's a new lesion, assign it a new lesion_id (e.g., "L5", "L6", etc.) that is not used by any previous lesion

Extract for each lesion:
- lesion_id: identifier matching previous timepoints or new ID for new lesions
- location: anatomical location
- size: the size with unit (extract as both size_mm and size_cm if possible)
- characteristics: any additional descriptors
- raw_text: the exact phrase from the report

Return ONLY a valid JSON array of lesions, with no additional text or explanation.

Example format:
[
  {
    "lesion_id": "L1",
    "location": "right upper lobe",
    "size_cm": 2.8,
    "size_mm": 28.0,
    "characteristics": "nodule, increased",
    "raw_text": "right upper lobe nodule has increased to 2.8 cm"
  }
]

If no lesions are found, return an empty array: []
"#;

/// Request for the earliest report of a patient
pub fn initial_request(report_text: &str, temperature: f32) -> LLMRequest {
    let user_prompt = format!(
        "Extract all lesions from this medical report:\n\n{}\n\nReturn the lesions as a JSON array.",
        report_text
    );

    LLMRequest::new(vec![
        ChatMessage::system(INITIAL_SYSTEM_PROMPT),
        ChatMessage::user(user_prompt),
    ])
    .with_temperature(temperature)
}

/// Request for a later report, carrying the previous timepoint's lesions
pub fn follow_up_request(
    report_text: &str,
    prior: &[PriorLesionSummary],
    temperature: f32,
) -> LLMRequest {
    let prior_json = serde_json::to_string_pretty(prior).unwrap_or_else(|_| "[]".to_string());

    let user_prompt = format!(
        "Here are the previously tracked lesions:\n\n{}\n\n\
         Now extract all lesions from this follow-up report, maintaining lesion_id for tracked lesions:\n\n\
         {}\n\nReturn the lesions as a JSON array.",
        prior_json, report_text
    );

    LLMRequest::new(vec![
        ChatMessage::system(FOLLOW_UP_SYSTEM_PROMPT),
        ChatMessage::user(user_prompt),
    ])
    .with_temperature(temperature)
}
