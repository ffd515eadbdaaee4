//! Confidence Router
//!
//! Routes one ASR result to ACCEPT/CLARIFY/REJECT by confidence band, and
//! produces the clarification prompt text when CLARIFY is chosen.

use crate::config::ConfidenceConfig;
use crate::types::{AsrResult, ConfidenceAction};

pub struct ConfidenceRouter {
    config: ConfidenceConfig,
}

impl ConfidenceRouter {
    pub fn new(config: ConfidenceConfig) -> Self {
        Self { config }
    }

    /// CLARIFY verdicts at or above this confidence are treated as ACCEPT by
    /// the conversation engine (spec §4.D "CLARIFY with confidence ≥ 0.3").
    pub fn repair_threshold(&self) -> f32 {
        self.config.repair
    }

    /// `confidence >= high` accepts the text as-is; `low <= confidence < high`
    /// asks for clarification (text preserved for the caller to echo back);
    /// `confidence < low` rejects outright (text dropped).
    pub fn route(&self, asr: &AsrResult) -> (ConfidenceAction, String) {
        if asr.confidence >= self.config.high {
            (ConfidenceAction::Accept, asr.text.clone())
        } else if asr.confidence >= self.config.low {
            (ConfidenceAction::Clarify, asr.text.clone())
        } else {
            (ConfidenceAction::Reject, String::new())
        }
    }

    /// Two-tier clarification wording. The 0.2-0.4 gap between the gentle
    /// variant and the low threshold both produce the same message; nothing
    /// below 0.2 reaches this function since `route` rejects it first.
    pub fn clarification_message(&self, confidence: f32) -> &'static str {
        if confidence >= 0.7 {
            "I think I heard you, but could you confirm that?"
        } else {
            "I didn't catch that clearly. Could you please repeat?"
        }
    }
}

impl Default for ConfidenceRouter {
    fn default() -> Self {
        Self::new(ConfidenceConfig::default())
    }
}
