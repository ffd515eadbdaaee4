//! Conversation Engine (spec §4.D)
//!
//! A per-session dialog state machine. Operates on an in-memory
//! `Conversation` row; the orchestrator is responsible for loading it from
//! the store before a turn and saving it after. Grounded on
//! `original_source/conversation_engine.py`.

mod linguistic;
mod quality;
mod scripted;

pub use linguistic::check_linguistic_completeness;
pub use quality::classify as classify_input_quality;

/// Scripted line for a TURN-TAKING nudge (spec §4.E step 7).
pub fn scripted_nudge() -> &'static str {
    scripted::NUDGE
}

/// Scripted line for a TURN-TAKING comfort filler (spec §4.E step 8).
pub fn scripted_comfort() -> &'static str {
    scripted::COMFORT
}

/// Scripted line inviting the caller to continue (spec §4.E step 8).
pub fn scripted_continuation_cue() -> &'static str {
    scripted::CONTINUATION_CUE
}

use crate::config::SessionConfig;
use crate::engines::LlmEngine;
use crate::types::{AsrResult, ConfidenceAction, Conversation, ConversationState, InputQuality};
use crate::voice::confidence::ConfidenceRouter;

/// Metadata returned alongside a turn's routing decision (spec §4.D).
#[derive(Debug, Clone)]
pub struct TurnMetadata {
    pub confidence: f32,
    pub action: ConfidenceAction,
    pub language: String,
}

pub struct ConversationEngine {
    session: SessionConfig,
    router: ConfidenceRouter,
}

impl ConversationEngine {
    pub fn new(session: SessionConfig, router: ConfidenceRouter) -> Self {
        Self { session, router }
    }

    /// Step the machine directly from already-decided text (used for the
    /// INIT->GREETING step and for CLARIFY-as-ACCEPT routing). Returns
    /// `(next_state, response_text, should_end)`.
    pub async fn process_state_transition(
        &self,
        conversation: &mut Conversation,
        user_text: Option<&str>,
        llm: &dyn LlmEngine,
    ) -> (ConversationState, String, bool) {
        match conversation.state {
            ConversationState::Init => {
                conversation.state = ConversationState::Greeting;
                (ConversationState::Greeting, scripted::GREETING.to_string(), false)
            }
            ConversationState::Greeting => {
                conversation.state = ConversationState::Listening;
                (ConversationState::Listening, String::new(), false)
            }
            ConversationState::Listening | ConversationState::Clarifying => {
                self.step_listening_like(conversation, user_text)
            }
            ConversationState::Processing => self.step_processing(conversation, user_text, llm).await,
            ConversationState::Responding => self.step_responding(conversation),
            ConversationState::Error => {
                conversation.state = ConversationState::End;
                (ConversationState::End, scripted::ESCALATION.to_string(), true)
            }
            ConversationState::End => (ConversationState::End, String::new(), true),
        }
    }

    /// Route one ASR result through the confidence router and the state
    /// machine (spec §4.D "Confidence routing on ASR result").
    pub async fn process_asr_result(
        &self,
        conversation: &mut Conversation,
        asr: &AsrResult,
        llm: &dyn LlmEngine,
    ) -> (ConversationState, String, bool, TurnMetadata) {
        let (action, text) = self.router.route(asr);
        let metadata = TurnMetadata {
            confidence: asr.confidence,
            action,
            language: asr.language.clone(),
        };

        let (state, response, should_end) = match action {
            ConfidenceAction::Accept => self.accept_text(conversation, &text, llm).await,
            ConfidenceAction::Clarify if asr.confidence >= self.router.repair_threshold() => {
                self.accept_text(conversation, &text, llm).await
            }
            ConfidenceAction::Clarify => {
                let message = self.router.clarification_message(asr.confidence).to_string();
                self.escalate_or_clarify(conversation, &text, message, llm).await
            }
            ConfidenceAction::Reject => {
                let message = scripted::clarification_prompt(conversation.clarification_count + 1)
                    .to_string();
                self.escalate_or_clarify(conversation, "", message, llm).await
            }
        };

        (state, response, should_end, metadata)
    }

    /// ACCEPT (and repaired CLARIFY) drive a full turn: LISTENING/CLARIFYING
    /// hands the text to PROCESSING, and — since PROCESSING never waits on
    /// more input mid-turn — this immediately resolves PROCESSING too,
    /// landing on RESPONDING/CLARIFYING/END in one call (spec §8 scenario 1).
    async fn accept_text(
        &self,
        conversation: &mut Conversation,
        text: &str,
        llm: &dyn LlmEngine,
    ) -> (ConversationState, String, bool) {
        let (state, response, should_end) =
            self.process_state_transition(conversation, Some(text), llm).await;
        if state == ConversationState::Processing && !should_end {
            self.process_state_transition(conversation, None, llm).await
        } else {
            (state, response, should_end)
        }
    }

    /// Post-increment clarification-count check shared by REJECT and
    /// low-confidence CLARIFY (spec §8 scenario 3: two consecutive REJECTs
    /// escalate on the second). `message` is the CLARIFYING-branch text,
    /// precomputed by the caller since REJECT and CLARIFY tier it
    /// differently (by count vs. by confidence).
    async fn escalate_or_clarify(
        &self,
        conversation: &mut Conversation,
        text: &str,
        message: String,
        llm: &dyn LlmEngine,
    ) -> (ConversationState, String, bool) {
        if !text.is_empty() {
            conversation.last_user_input = text.to_string();
        }
        conversation.clarification_count += 1;
        if conversation.clarification_count >= self.session.max_clarifications {
            self.enter_error(conversation, llm).await
        } else {
            conversation.state = ConversationState::Clarifying;
            (ConversationState::Clarifying, message, false)
        }
    }

    /// Lands the machine in ERROR with the escalation line (spec §4.D: "at
    /// `max_clarifications` go ERROR with escalation message (terminal)"),
    /// then immediately runs the ERROR -> END absorbing step (spec §4.D
    /// "ERROR -> END; END is absorbing", spec §8 scenario 3: "state
    /// ERROR->END") so the session persists as closed. The caller reports
    /// the ERROR-tagged response returned here, not the discarded END one.
    async fn enter_error(
        &self,
        conversation: &mut Conversation,
        llm: &dyn LlmEngine,
    ) -> (ConversationState, String, bool) {
        conversation.state = ConversationState::Error;
        self.process_state_transition(conversation, None, llm).await;
        (ConversationState::Error, scripted::ESCALATION.to_string(), true)
    }

    /// LISTENING and CLARIFYING share the empty/non-empty branching (spec
    /// §4.D: "CLARIFYING: same rules as LISTENING").
    fn step_listening_like(
        &self,
        conversation: &mut Conversation,
        user_text: Option<&str>,
    ) -> (ConversationState, String, bool) {
        let text = user_text.unwrap_or("").trim();
        if text.is_empty() {
            self.step_silence(conversation)
        } else {
            conversation.last_user_input = text.to_string();
            conversation.state = ConversationState::Processing;
            (ConversationState::Processing, String::new(), false)
        }
    }

    /// Pre-increment check: the Nth empty turn only ends the session once
    /// `silence_prompts` had already reached the cap *before* this call
    /// (spec §8 scenario 4: the third empty result, not the second, ends
    /// the session with `max_silence_prompts=2`).
    fn step_silence(&self, conversation: &mut Conversation) -> (ConversationState, String, bool) {
        let old_count = conversation.silence_prompts;
        conversation.silence_prompts += 1;
        if old_count >= self.session.max_silence_prompts {
            conversation.state = ConversationState::End;
            (ConversationState::End, scripted::CLOSING.to_string(), true)
        } else {
            conversation.state = ConversationState::Listening;
            let message = scripted::silence_prompt(conversation.silence_prompts).to_string();
            (ConversationState::Listening, message, false)
        }
    }

    async fn step_processing(
        &self,
        conversation: &mut Conversation,
        user_text: Option<&str>,
        llm: &dyn LlmEngine,
    ) -> (ConversationState, String, bool) {
        let text = user_text.unwrap_or(&conversation.last_user_input).to_string();
        match quality::classify(&text, llm).await {
            InputQuality::Empty => self.step_silence(conversation),
            InputQuality::Unclear => {
                // Pre-increment check, mirroring the original's PROCESSING
                // UNCLEAR branch (distinct from the post-increment ASR
                // REJECT path above).
                let old_count = conversation.clarification_count;
                conversation.clarification_count += 1;
                if old_count >= self.session.max_clarifications {
                    self.enter_error(conversation, llm).await
                } else {
                    conversation.state = ConversationState::Clarifying;
                    let message =
                        scripted::clarification_prompt(conversation.clarification_count)
                            .to_string();
                    (ConversationState::Clarifying, message, false)
                }
            }
            InputQuality::Clear => {
                conversation.state = ConversationState::Responding;
                (ConversationState::Responding, String::new(), false)
            }
        }
    }

    fn step_responding(&self, conversation: &mut Conversation) -> (ConversationState, String, bool) {
        conversation.turn_count += 1;
        if conversation.turn_count >= self.session.max_turns {
            conversation.state = ConversationState::End;
            (ConversationState::End, scripted::CLOSING.to_string(), true)
        } else {
            conversation.state = ConversationState::Listening;
            (ConversationState::Listening, String::new(), false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfidenceConfig;
    use crate::engines::fakes::EchoLlm;

    fn engine() -> ConversationEngine {
        ConversationEngine::new(SessionConfig::default(), ConfidenceRouter::default())
    }

    fn asr(text: &str, confidence: f32) -> AsrResult {
        AsrResult {
            text: text.to_string(),
            confidence,
            language: "en".to_string(),
        }
    }

    #[tokio::test]
    async fn init_emits_greeting() {
        let engine = engine();
        let llm = EchoLlm::default();
        let mut conversation = Conversation::new();
        let (state, text, should_end) = engine
            .process_state_transition(&mut conversation, None, &llm)
            .await;
        assert_eq!(state, ConversationState::Greeting);
        assert!(text.contains("SmileCare"));
        assert!(!should_end);
    }

    #[tokio::test]
    async fn happy_path_book_reaches_responding_and_increments_turn() {
        let engine = engine();
        let llm = EchoLlm::default();
        let mut conversation = Conversation::new();
        conversation.state = ConversationState::Listening;

        let (state, _, asr_should_end, metadata) = engine
            .process_asr_result(&mut conversation, &asr("I want to book an appointment", 0.9), &llm)
            .await;
        assert_eq!(metadata.action, ConfidenceAction::Accept);
        assert!(!asr_should_end);
        assert_eq!(state, ConversationState::Responding);

        let (state, _, should_end) = engine.step_responding_pub(&mut conversation);
        assert_eq!(state, ConversationState::Listening);
        assert_eq!(conversation.turn_count, 1);
        assert!(!should_end);
    }

    #[tokio::test]
    async fn low_confidence_rejection_enters_clarifying() {
        let engine = engine();
        let llm = EchoLlm::default();
        let mut conversation = Conversation::new();
        conversation.state = ConversationState::Listening;

        let (state, text, should_end, metadata) = engine
            .process_asr_result(&mut conversation, &asr("mumble", 0.1), &llm)
            .await;
        assert_eq!(metadata.action, ConfidenceAction::Reject);
        assert_eq!(state, ConversationState::Clarifying);
        assert_eq!(conversation.clarification_count, 1);
        assert_eq!(text, scripted::CLARIFICATION_FIRST);
        assert!(!should_end);
    }

    #[tokio::test]
    async fn two_consecutive_rejects_escalate() {
        let engine = engine();
        let llm = EchoLlm::default();
        let mut conversation = Conversation::new();
        conversation.state = ConversationState::Listening;

        engine
            .process_asr_result(&mut conversation, &asr("mumble", 0.1), &llm)
            .await;
        let (state, text, should_end, _) = engine
            .process_asr_result(&mut conversation, &asr("mumble", 0.1), &llm)
            .await;
        // Spec §8 scenario 3: "state ERROR->END" — the reported state is the
        // momentary ERROR the escalation text belongs to; ERROR's absorbing
        // follow-up already landed the persisted state at END so the session
        // closes (should_end=true, conversation.state terminal).
        assert_eq!(state, ConversationState::Error);
        assert_eq!(text, scripted::ESCALATION);
        assert!(should_end);
        assert_eq!(conversation.state, ConversationState::End);
        assert!(conversation.state.is_terminal());
    }

    #[tokio::test]
    async fn three_silent_turns_end_session() {
        let engine = engine();
        let llm = EchoLlm::default();
        let mut conversation = Conversation::new();
        conversation.state = ConversationState::Listening;

        let (s1, _, end1) = engine.process_state_transition(&mut conversation, Some(""), &llm).await;
        assert_eq!(s1, ConversationState::Listening);
        assert!(!end1);
        let (s2, _, end2) = engine.process_state_transition(&mut conversation, Some(""), &llm).await;
        assert_eq!(s2, ConversationState::Listening);
        assert!(!end2);
        let (s3, text, end3) = engine.process_state_transition(&mut conversation, Some(""), &llm).await;
        assert_eq!(s3, ConversationState::End);
        assert_eq!(text, scripted::CLOSING);
        assert!(end3);
    }

    #[tokio::test]
    async fn max_turns_ends_session() {
        let engine = engine();
        let mut conversation = Conversation::new();
        conversation.turn_count = engine.session.max_turns - 1;
        conversation.state = ConversationState::Responding;
        let (state, text, should_end) = engine.step_responding_pub(&mut conversation);
        assert_eq!(state, ConversationState::End);
        assert_eq!(text, scripted::CLOSING);
        assert!(should_end);
    }

    impl ConversationEngine {
        fn step_responding_pub(&self, conversation: &mut Conversation) -> (ConversationState, String, bool) {
            self.step_responding(conversation)
        }
    }
}
