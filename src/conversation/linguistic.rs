//! Linguistic completeness check (spec §4.D)
//!
//! Three tiers: a rule pass with no network, an indicators pass that can
//! short-circuit to COMPLETE, and an LLM pass reserved for ambiguous
//! residue. Grounded on
//! `original_source/conversation_engine.py::check_linguistic_completeness`.

use crate::conversation::scripted::CONTINUATION_CUE;
use crate::engines::LlmEngine;

const HANGING_INTENT_SUFFIXES: &[&str] = &[
    "i want to",
    "i need to",
    "i'd like to",
    "i'm trying to",
    "so basically",
    "and then",
    "but then",
    "or maybe",
    "i think",
    "i guess",
    "maybe",
    "perhaps",
];

const TRAILING_OFF_SUFFIXES: &[&str] = &["...", "…", "and", "so", "but", "or", "then"];

const INTERROGATIVE_WORDS: &[&str] = &["what", "where", "when", "who", "how", "why"];

const HANGING_AUX_PREFIXES: &[&str] = &["i want", "i need", "can you", "could you", "would you"];

const DOMAIN_KEYWORDS: &[&str] = &["appointment", "book", "schedule", "time", "date"];

const COMPLETION_PROMPT_TEMPLATE: &str = "Does this utterance sound like a COMPLETE thought or sentence?
Consider: complete intent (e.g. \"I want to book an appointment\"), complete verb/object,
or trailing off (\"I want to…\", \"So basically…\", \"And then…\").
Reply with ONLY: COMPLETE or INCOMPLETE
If INCOMPLETE, add in parentheses one short continuation cue, e.g. (Mm-hmm… go on.)

User: \"{}\"
";

fn rule_pass_incomplete(text_lower: &str, tokens: &[&str]) -> bool {
    if TRAILING_OFF_SUFFIXES.iter().any(|s| text_lower.ends_with(s)) {
        return true;
    }
    if HANGING_INTENT_SUFFIXES.iter().any(|s| text_lower.ends_with(s)) {
        return true;
    }
    let ends_with_interrogative = INTERROGATIVE_WORDS.iter().any(|w| text_lower.ends_with(w));
    if ends_with_interrogative && !text_lower.contains('?') {
        return true;
    }
    if tokens.len() <= 3 && HANGING_AUX_PREFIXES.iter().any(|p| text_lower.starts_with(p)) {
        return true;
    }
    false
}

fn indicators_pass_complete(text: &str, text_lower: &str, tokens: &[&str]) -> bool {
    let ends_with_terminator = text.ends_with('.') || text.ends_with('!') || text.ends_with('?');
    let long_enough = tokens.len() >= 5;
    let has_domain_keyword = DOMAIN_KEYWORDS.iter().any(|kw| text_lower.contains(kw));
    ends_with_terminator || long_enough || has_domain_keyword
}

/// `(complete?, continuation_cue?)`. Only the LLM pass is async; the rule
/// and indicators passes are pure and synchronous.
pub async fn check_linguistic_completeness(
    text: &str,
    llm: &dyn LlmEngine,
) -> (bool, Option<String>) {
    let trimmed = text.trim();
    if trimmed.len() < 3 {
        return (true, None);
    }

    let text_lower = trimmed.to_lowercase();
    let tokens: Vec<&str> = trimmed.split_whitespace().collect();

    if rule_pass_incomplete(&text_lower, &tokens) {
        return (false, Some(CONTINUATION_CUE.to_string()));
    }

    if indicators_pass_complete(trimmed, &text_lower, &tokens) && tokens.len() >= 4 {
        return (true, None);
    }

    // Ambiguous residue: ask the LLM, terse prompt, COMPLETE/INCOMPLETE.
    let prompt = COMPLETION_PROMPT_TEMPLATE.replace("{}", &trimmed.replace('"', "'"));
    match llm.classify(&prompt).await {
        Ok(reply) => {
            let upper = reply.trim().to_uppercase();
            if upper.contains("INCOMPLETE") {
                let cue = extract_parenthetical(&reply).unwrap_or_else(|| CONTINUATION_CUE.to_string());
                (false, Some(cue))
            } else {
                (true, None)
            }
        }
        Err(_) => (true, None),
    }
}

fn extract_parenthetical(text: &str) -> Option<String> {
    let start = text.find('(')?;
    let end = text[start..].find(')')? + start;
    let inner = text[start + 1..end].trim();
    if inner.is_empty() {
        None
    } else {
        Some(inner.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::fakes::EchoLlm;

    #[tokio::test]
    async fn ellipsis_is_incomplete() {
        let llm = EchoLlm::default();
        let (complete, cue) = check_linguistic_completeness("I want to...", &llm).await;
        assert!(!complete);
        assert_eq!(cue.as_deref(), Some(CONTINUATION_CUE));
    }

    #[tokio::test]
    async fn question_word_without_mark_is_incomplete() {
        let llm = EchoLlm::default();
        let (complete, _) = check_linguistic_completeness("tell me when", &llm).await;
        assert!(!complete);
    }

    #[tokio::test]
    async fn question_with_mark_is_complete_via_indicators() {
        let llm = EchoLlm::default();
        let (complete, _) =
            check_linguistic_completeness("Can you tell me when my appointment is?", &llm).await;
        assert!(complete);
    }

    #[tokio::test]
    async fn domain_keyword_sentence_is_complete() {
        let llm = EchoLlm::default();
        let (complete, _) =
            check_linguistic_completeness("I want to book an appointment", &llm).await;
        assert!(complete);
    }

    #[tokio::test]
    async fn very_short_text_is_complete() {
        let llm = EchoLlm::default();
        let (complete, _) = check_linguistic_completeness("hi", &llm).await;
        assert!(complete);
    }

    #[test]
    fn extracts_parenthetical_cue() {
        assert_eq!(
            extract_parenthetical("INCOMPLETE (Go on, I'm listening.)"),
            Some("Go on, I'm listening.".to_string())
        );
        assert_eq!(extract_parenthetical("INCOMPLETE"), None);
    }
}
