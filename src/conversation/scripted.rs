//! Scripted utterances (spec §4.D)
//!
//! Returned verbatim for testability — these strings are exactly what spec.md
//! names, not paraphrased, so assertions on them are stable.

pub const GREETING: &str = "Hello! Welcome to SmileCare Dental Clinic. How can I help you today?";

pub const CLARIFICATION_FIRST: &str = "I didn't catch that clearly. Could you please repeat?";
pub const CLARIFICATION_SECOND: &str =
    "I'm still having trouble understanding. Could you speak more clearly?";

pub const ESCALATION: &str =
    "I'm having trouble understanding you. Let me connect you to a human representative who can assist you better.";

pub const SILENCE_PROMPTS: [&str; 3] = [
    "I'm listening. Please go ahead and speak.",
    "I'm still here. Please tell me how I can help you.",
    "I didn't hear anything. If you need assistance, please speak now or I'll end this call.",
];

pub const NUDGE: &str = "Are you still there?";
pub const COMFORT: &str = "Take your time, I'm listening.";
pub const CONTINUATION_CUE: &str = "Mm-hmm… go on.";
pub const CLOSING: &str = "Thank you for calling. Have a great day!";

/// `count` is the value of `silence_prompts` *after* increment; indexed
/// directly (not `count - 1`), so the first silent turn lands on
/// `SILENCE_PROMPTS[1]` and index 0 is never reached — matching the
/// original, which reads the post-increment count the same way.
pub fn silence_prompt(count: u32) -> &'static str {
    let idx = (count as usize).min(SILENCE_PROMPTS.len() - 1);
    SILENCE_PROMPTS[idx]
}

/// `count` is 1-based (the value of `clarification_count` after increment).
pub fn clarification_prompt(count: u32) -> &'static str {
    if count <= 1 {
        CLARIFICATION_FIRST
    } else {
        CLARIFICATION_SECOND
    }
}
