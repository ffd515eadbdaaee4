//! Turn-Taking Engine
//!
//! `process_chunk(frame) -> TurnEvent?`, plus `turn_end_incomplete()` and
//! `finalize_turn()`. Single-owner state per session — no locking, unlike
//! the teacher's `Arc<Mutex<>>` VAD; spec §5 guarantees one orchestrator
//! task owns a session's turn engine exclusively.

use crate::config::TurnTakingConfig;
use crate::voice::vad::{is_silence, is_speech};

/// Closed sum type; unknown state strings must be refused, never defaulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Listening,
    CandidateEnd,
    WaitingIncomplete,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    /// Buffered PCM span handed off to the orchestrator; engine stays in
    /// CANDIDATE_END until `finalize_turn` or `turn_end_incomplete` is called.
    TurnEnd(Vec<u8>),
    Nudge,
    Comfort,
    ContinuationCue,
}

/// Per-session internal state of the turn-taking engine (spec §3).
pub struct TurnTakingEngine {
    config: TurnTakingConfig,
    state: TurnState,
    buffer: Vec<u8>,
    speech_chunks: u32,
    silence_chunks: u32,
    idle_silence_chunks: u32,
}

impl TurnTakingEngine {
    pub fn new(config: TurnTakingConfig) -> Self {
        Self {
            config,
            state: TurnState::Idle,
            buffer: Vec::new(),
            speech_chunks: 0,
            silence_chunks: 0,
            idle_silence_chunks: 0,
        }
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// Feed one chunk (default 200 ms) with its already-computed VAD
    /// probability. Returns at most one event per call.
    pub fn process_chunk(&mut self, chunk: &[u8], probability: f32) -> Option<TurnEvent> {
        if chunk.is_empty() {
            return None;
        }

        if is_speech(probability) {
            return self.on_voice(chunk, true);
        }
        if is_silence(probability) {
            return self.on_voice(chunk, false);
        }

        // Uncertain band (0.05 <= p < 0.6): accumulate without changing
        // state if already mid-utterance; in IDLE, a weak (>= 0.1) signal
        // still starts LISTENING so the engine never stalls on a quiet talker.
        match self.state {
            TurnState::Listening | TurnState::CandidateEnd => {
                self.buffer.extend_from_slice(chunk);
                None
            }
            TurnState::Idle if probability >= 0.1 => self.start_listening(chunk),
            _ => None,
        }
    }

    fn on_voice(&mut self, chunk: &[u8], voice: bool) -> Option<TurnEvent> {
        match self.state {
            TurnState::Idle => {
                if voice {
                    self.start_listening(chunk)
                } else {
                    self.idle_silence_chunks += 1;
                    if self.idle_silence_chunks >= self.config.nudge_chunks() {
                        self.idle_silence_chunks = 0;
                        return Some(TurnEvent::Nudge);
                    }
                    None
                }
            }
            TurnState::Listening => {
                self.buffer.extend_from_slice(chunk);
                if voice {
                    self.speech_chunks += 1;
                    self.silence_chunks = 0;
                    None
                } else {
                    self.silence_chunks += 1;
                    if self.silence_chunks >= self.config.silence_grace_chunks() {
                        if self.speech_chunks >= self.config.min_speech_chunks() {
                            self.state = TurnState::CandidateEnd;
                            self.silence_chunks = 0;
                        } else {
                            // Not enough speech to call it a turn — noise.
                            self.reset();
                        }
                    }
                    None
                }
            }
            TurnState::CandidateEnd => {
                if voice {
                    // Pause wasn't the end; the user resumed.
                    self.state = TurnState::Listening;
                    self.buffer.extend_from_slice(chunk);
                    self.speech_chunks += 1;
                    self.silence_chunks = 0;
                    None
                } else {
                    self.buffer.extend_from_slice(chunk);
                    self.silence_chunks += 1;
                    if self.silence_chunks >= self.config.confirmation_chunks() {
                        Some(TurnEvent::TurnEnd(self.buffer.clone()))
                    } else {
                        None
                    }
                }
            }
            TurnState::WaitingIncomplete => {
                if voice {
                    self.state = TurnState::Listening;
                    self.buffer.extend_from_slice(chunk);
                    self.speech_chunks += 1;
                    self.silence_chunks = 0;
                    None
                } else {
                    self.silence_chunks += 1;
                    // Comfort threshold checked first, matching the source:
                    // under default config (incomplete_wait < comfort_wait)
                    // CONTINUATION_CUE always fires and resets state first,
                    // so COMFORT only fires if comfort_wait_chunks is
                    // reconfigured below incomplete_wait_chunks.
                    if self.silence_chunks >= self.config.comfort_wait_chunks() {
                        self.reset();
                        Some(TurnEvent::Comfort)
                    } else if self.silence_chunks >= self.config.incomplete_wait_chunks() {
                        self.reset();
                        Some(TurnEvent::ContinuationCue)
                    } else {
                        None
                    }
                }
            }
        }
    }

    fn start_listening(&mut self, chunk: &[u8]) -> Option<TurnEvent> {
        self.state = TurnState::Listening;
        self.buffer = chunk.to_vec();
        self.speech_chunks = 1;
        self.silence_chunks = 0;
        self.idle_silence_chunks = 0;
        None
    }

    /// Call when ASR + linguistic check say the turn is incomplete: keeps
    /// the buffer, waits for the confirmation/comfort windows.
    pub fn turn_end_incomplete(&mut self) {
        self.state = TurnState::WaitingIncomplete;
        self.silence_chunks = 0;
    }

    /// Call when the turn has been fully processed.
    pub fn finalize_turn(&mut self) {
        self.reset();
    }

    fn reset(&mut self) {
        self.state = TurnState::Idle;
        self.buffer.clear();
        self.speech_chunks = 0;
        self.silence_chunks = 0;
        self.idle_silence_chunks = 0;
    }
}
