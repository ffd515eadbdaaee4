//! Input-quality classifier (spec §4.D)

use crate::engines::LlmEngine;
use crate::types::InputQuality;

const QUALITY_PROMPT_TEMPLATE: &str = "Analyze this user input and classify it as one of:
- CLEAR: Meaningful, understandable input
- UNCLEAR: Nonsensical, too short, or unintelligible

User input: \"{}\"

Respond with ONLY one word: CLEAR or UNCLEAR";

/// Empty-or-whitespace -> EMPTY. Length < 3 -> UNCLEAR. Otherwise a
/// single-word LLM classification; on LLM failure degrade gracefully
/// (CLEAR if length > 3 else UNCLEAR).
pub async fn classify(text: &str, llm: &dyn LlmEngine) -> InputQuality {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return InputQuality::Empty;
    }
    if trimmed.len() < 3 {
        return InputQuality::Unclear;
    }

    let prompt = QUALITY_PROMPT_TEMPLATE.replace("{}", trimmed);
    match llm.classify(&prompt).await {
        Ok(result) => {
            let upper = result.trim().to_uppercase();
            // "UNCLEAR" contains "CLEAR" as a substring, so check it first.
            if upper.contains("UNCLEAR") {
                InputQuality::Unclear
            } else if upper.contains("CLEAR") {
                InputQuality::Clear
            } else if trimmed.len() > 3 {
                InputQuality::Clear
            } else {
                InputQuality::Unclear
            }
        }
        Err(_) => {
            if trimmed.len() > 3 {
                InputQuality::Clear
            } else {
                InputQuality::Unclear
            }
        }
    }
}
