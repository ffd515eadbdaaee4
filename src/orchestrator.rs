//! Session Orchestrator (spec §4.E)
//!
//! Owns one connection: routes client bytes through the turn-taking engine,
//! ASR, the conversation engine, and TTS, implements barge-in, and drives
//! session lifecycle against the store. Transport-agnostic — the WS handler
//! in `server::ws` translates axum messages to/from `ClientEvent`/
//! `ServerEvent` and feeds/drains the channels this module owns, mirroring
//! the teacher's split between `realtime_voice.rs`'s connection loop and its
//! single-writer outbound `mpsc` sender task.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::audio::{is_legacy_container, turn_span_to_wav, MIN_TURN_BYTES};
use crate::config::Config;
use crate::conversation::{check_linguistic_completeness, ConversationEngine};
use crate::engines::{AsrEngine, LlmEngine, TtsEngine};
use crate::error::SessionError;
use crate::store::Store;
use crate::types::{AsrResult, ConversationState, Message, Role};
use crate::voice::confidence::ConfidenceRouter;
use crate::voice::turn_taking::{TurnEvent, TurnTakingEngine};
use crate::voice::vad::{is_speech, FrameVad, FRAME_BYTES};

/// Inbound, transport-agnostic client events (spec §6 WebSocket surface).
#[derive(Debug, Clone)]
pub enum ClientEvent {
    Pcm(Vec<u8>),
    LegacyContainer(Vec<u8>),
    Ping,
    End,
}

/// Outbound, transport-agnostic server events (spec §6 WebSocket surface).
#[derive(Debug, Clone)]
pub enum ServerEvent {
    Pong,
    Transcription {
        text: String,
        confidence: f32,
        language: String,
        action: String,
    },
    Response {
        text: String,
        audio: Vec<u8>,
        conversation_state: String,
        should_end: Option<bool>,
    },
    BargeIn,
    Error {
        message: String,
    },
}

/// Batches of legacy container-encoded audio before a single ASR call
/// (spec §9: "legacy container-audio batching path... 50-chunk batches,
/// no turn-taking"; preserved for backward compatibility only).
const LEGACY_BATCH_CHUNKS: usize = 50;

pub struct Orchestrator {
    config: Arc<Config>,
    store: Arc<dyn Store>,
    asr: Arc<dyn AsrEngine>,
    llm: Arc<dyn LlmEngine>,
    tts: Arc<dyn TtsEngine>,
    system_prompt: String,
    engine: ConversationEngine,
}

impl Orchestrator {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn Store>,
        asr: Arc<dyn AsrEngine>,
        llm: Arc<dyn LlmEngine>,
        tts: Arc<dyn TtsEngine>,
        system_prompt: String,
    ) -> Self {
        let engine = ConversationEngine::new(
            config.session.clone(),
            ConfidenceRouter::new(config.confidence),
        );
        Self {
            config,
            store,
            asr,
            llm,
            tts,
            system_prompt,
            engine,
        }
    }

    /// Drive one connection end-to-end until the client disconnects or the
    /// conversation reaches a terminal state. `inbound` is fed by the
    /// transport layer; `outbound` is drained by the transport's
    /// single-writer sender task.
    pub async fn run_session(
        &self,
        session_id: &str,
        mut inbound: mpsc::Receiver<ClientEvent>,
        outbound: mpsc::Sender<ServerEvent>,
    ) -> Result<()> {
        let mut session = match self.store.get_session(session_id).await? {
            Some(s) => s,
            None => {
                let _ = outbound
                    .send(ServerEvent::Error {
                        message: "Invalid session".to_string(),
                    })
                    .await;
                return Err(SessionError::NotFound(session_id.to_string()).into());
            }
        };

        let mut conversation = self
            .store
            .get_conversation(session_id)
            .await?
            .unwrap_or_default();

        let mut turn_engine = TurnTakingEngine::new(self.config.turn_taking);
        let vad = FrameVad::default();

        // The turn-taking engine's counters are expressed in `chunk_ms`-sized
        // chunks (default 200ms = 6400 bytes); the VAD operates at the finer
        // 20ms/640-byte frame granularity needed for barge-in detection. One
        // 200ms chunk is an aggregate of several consecutive VAD frames.
        let chunk_bytes =
            FRAME_BYTES * ((self.config.turn_taking.chunk_ms / 20).max(1) as usize);

        let mut pcm_buffer: Vec<u8> = Vec::new();
        let mut chunk_accum: Vec<u8> = Vec::new();
        let mut legacy_buffer: Vec<u8> = Vec::new();
        let mut legacy_chunk_count = 0usize;

        let mut bot_speaking = false;
        let mut bot_speaking_until: Option<Instant> = None;
        let mut barge_in_streak = 0u32;
        let mut nudge_count = 0u32;

        if conversation.state == ConversationState::Init {
            let (state, text, _should_end) = self
                .engine
                .process_state_transition(&mut conversation, None, self.llm.as_ref())
                .await;
            self.speak(
                &outbound,
                &text,
                state,
                Some(false),
                &mut bot_speaking,
                &mut bot_speaking_until,
            )
            .await?;
            // GREETING -> LISTENING immediately (spec §4.D: "move directly to
            // LISTENING on next call"); nothing is spoken for this step, it
            // just readies the engine for the first real turn.
            self.engine
                .process_state_transition(&mut conversation, None, self.llm.as_ref())
                .await;
        }

        while let Some(event) = inbound.recv().await {
            if bot_speaking_until.map(|t| Instant::now() >= t).unwrap_or(false) {
                bot_speaking = false;
                bot_speaking_until = None;
                barge_in_streak = 0;
            }

            match event {
                ClientEvent::Ping => {
                    let _ = outbound.send(ServerEvent::Pong).await;
                }
                ClientEvent::End => break,
                ClientEvent::LegacyContainer(bytes) => {
                    legacy_buffer.extend_from_slice(&bytes);
                    legacy_chunk_count += 1;
                    if legacy_chunk_count >= LEGACY_BATCH_CHUNKS {
                        let batch = std::mem::take(&mut legacy_buffer);
                        legacy_chunk_count = 0;
                        self.handle_turn_audio(
                            &batch,
                            true,
                            session_id,
                            &mut conversation,
                            &outbound,
                            &mut bot_speaking,
                            &mut bot_speaking_until,
                        )
                        .await?;
                    }
                }
                ClientEvent::Pcm(bytes) => {
                    if is_legacy_container(&bytes) {
                        legacy_buffer.extend_from_slice(&bytes);
                        legacy_chunk_count += 1;
                        if legacy_chunk_count >= LEGACY_BATCH_CHUNKS {
                            let batch = std::mem::take(&mut legacy_buffer);
                            legacy_chunk_count = 0;
                            self.handle_turn_audio(
                                &batch,
                                true,
                                session_id,
                                &mut conversation,
                                &outbound,
                                &mut bot_speaking,
                                &mut bot_speaking_until,
                            )
                            .await?;
                        }
                        continue;
                    }
                    pcm_buffer.extend_from_slice(&bytes);

                    while pcm_buffer.len() >= FRAME_BYTES {
                        let frame: Vec<u8> = pcm_buffer.drain(0..FRAME_BYTES).collect();

                        if bot_speaking {
                            let probability = vad.probability(&frame);
                            if is_speech(probability) {
                                barge_in_streak += 1;
                                if barge_in_streak >= 2 {
                                    bot_speaking = false;
                                    bot_speaking_until = None;
                                    barge_in_streak = 0;
                                    chunk_accum.clear();
                                    let _ = outbound.send(ServerEvent::BargeIn).await;
                                }
                            } else {
                                barge_in_streak = 0;
                            }
                            continue;
                        }

                        chunk_accum.extend_from_slice(&frame);
                        if chunk_accum.len() < chunk_bytes {
                            continue;
                        }
                        let chunk = std::mem::take(&mut chunk_accum);
                        let probability = vad.probability(&chunk);

                        if let Some(turn_event) = turn_engine.process_chunk(&chunk, probability) {
                            match turn_event {
                                TurnEvent::TurnEnd(buffer) => {
                                    if buffer.len() < MIN_TURN_BYTES {
                                        debug!(bytes = buffer.len(), "turn buffer below noise floor, discarding");
                                        turn_engine.finalize_turn();
                                        continue;
                                    }
                                    if !self
                                        .handle_pcm_turn(
                                            &buffer,
                                            &mut turn_engine,
                                            session_id,
                                            &mut conversation,
                                            &outbound,
                                            &mut bot_speaking,
                                            &mut bot_speaking_until,
                                        )
                                        .await?
                                    {
                                        break;
                                    }
                                }
                                TurnEvent::Nudge => {
                                    if nudge_count >= self.config.session.max_nudges {
                                        continue;
                                    }
                                    nudge_count += 1;
                                    conversation.silence_prompts += 1;
                                    self.speak(
                                        &outbound,
                                        crate::conversation::scripted_nudge(),
                                        conversation.state,
                                        None,
                                        &mut bot_speaking,
                                        &mut bot_speaking_until,
                                    )
                                    .await?;
                                }
                                TurnEvent::Comfort => {
                                    self.speak(
                                        &outbound,
                                        crate::conversation::scripted_comfort(),
                                        conversation.state,
                                        None,
                                        &mut bot_speaking,
                                        &mut bot_speaking_until,
                                    )
                                    .await?;
                                }
                                TurnEvent::ContinuationCue => {
                                    self.speak(
                                        &outbound,
                                        crate::conversation::scripted_continuation_cue(),
                                        conversation.state,
                                        None,
                                        &mut bot_speaking,
                                        &mut bot_speaking_until,
                                    )
                                    .await?;
                                }
                            }
                        }
                    }
                }
            }

            if conversation.state.is_terminal() {
                break;
            }
        }

        session.touch();
        if conversation.state.is_terminal() {
            self.store.close_session(session_id).await?;
        } else {
            self.store.save_session(&session).await?;
        }
        self.store.save_conversation(session_id, &conversation).await?;

        Ok(())
    }

    /// Handle one finalized PCM turn span: ASR, linguistic completeness,
    /// then the conversation engine. Returns `false` if the session reached
    /// a terminal state and the connection should close.
    async fn handle_pcm_turn(
        &self,
        buffer: &[u8],
        turn_engine: &mut TurnTakingEngine,
        session_id: &str,
        conversation: &mut crate::types::Conversation,
        outbound: &mpsc::Sender<ServerEvent>,
        bot_speaking: &mut bool,
        bot_speaking_until: &mut Option<Instant>,
    ) -> Result<bool> {
        let wav = turn_span_to_wav(buffer).context("failed to wrap turn span as WAV")?;
        let asr_result = match self.asr.transcribe(&wav, None, false).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "ASR transcription failed, treating as silence");
                turn_engine.finalize_turn();
                return Ok(true);
            }
        };

        let (complete, _cue) = check_linguistic_completeness(&asr_result.text, self.llm.as_ref()).await;
        if !complete {
            turn_engine.turn_end_incomplete();
            return Ok(true);
        }
        turn_engine.finalize_turn();

        if asr_result.text.is_empty() || asr_result.confidence < 0.1 {
            debug!("ASR produced no usable text, skipping turn");
            return Ok(true);
        }

        self.run_conversation_turn(
            session_id,
            conversation,
            &asr_result,
            outbound,
            bot_speaking,
            bot_speaking_until,
        )
        .await
    }

    /// Legacy-container path: no turn engine involved, VAD filter left on.
    async fn handle_turn_audio(
        &self,
        buffer: &[u8],
        use_vad_filter: bool,
        session_id: &str,
        conversation: &mut crate::types::Conversation,
        outbound: &mpsc::Sender<ServerEvent>,
        bot_speaking: &mut bool,
        bot_speaking_until: &mut Option<Instant>,
    ) -> Result<()> {
        let asr_result = match self.asr.transcribe(buffer, None, use_vad_filter).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "legacy-path ASR failed");
                return Ok(());
            }
        };
        if asr_result.text.is_empty() || asr_result.confidence < 0.1 {
            return Ok(());
        }
        self.run_conversation_turn(
            session_id,
            conversation,
            &asr_result,
            outbound,
            bot_speaking,
            bot_speaking_until,
        )
        .await?;
        Ok(())
    }

    /// Steps the conversation engine with an ASR result, reports the
    /// transcription, and either plays a scripted reply or calls out to the
    /// LLM for a free-form one (spec §4.E step 6).
    async fn run_conversation_turn(
        &self,
        session_id: &str,
        conversation: &mut crate::types::Conversation,
        asr_result: &AsrResult,
        outbound: &mpsc::Sender<ServerEvent>,
        bot_speaking: &mut bool,
        bot_speaking_until: &mut Option<Instant>,
    ) -> Result<bool> {
        let (mut state, mut response, mut should_end, metadata) = self
            .engine
            .process_asr_result(conversation, asr_result, self.llm.as_ref())
            .await;

        outbound
            .send(ServerEvent::Transcription {
                text: asr_result.text.clone(),
                confidence: metadata.confidence,
                language: metadata.language.clone(),
                action: metadata.action.as_str().to_string(),
            })
            .await
            .ok();

        if response.is_empty() && state == ConversationState::Responding {
            let user_text = conversation.last_user_input.clone();
            let history = self
                .store
                .get_history(session_id, 2 * self.config.session.max_turns as usize)
                .await
                .unwrap_or_default();

            let reply = match self
                .llm
                .reply(&self.system_prompt, &history, &user_text)
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, "LLM reply failed, falling back to a clarification prompt");
                    response = "I'm having a little trouble responding right now. Could you repeat that?".to_string();
                    String::new()
                }
            };

            if !reply.is_empty() {
                self.store
                    .append_history(
                        session_id,
                        Message {
                            role: Role::User,
                            content: user_text,
                            timestamp: chrono::Utc::now(),
                        },
                    )
                    .await
                    .ok();
                self.store
                    .append_history(
                        session_id,
                        Message {
                            role: Role::Assistant,
                            content: reply.clone(),
                            timestamp: chrono::Utc::now(),
                        },
                    )
                    .await
                    .ok();

                let (next_state, _, next_should_end) = self
                    .engine
                    .process_state_transition(conversation, None, self.llm.as_ref())
                    .await;
                state = next_state;
                should_end = next_should_end;
                response = reply;
            }
        }

        if !response.is_empty() {
            self.speak(
                outbound,
                &response,
                state,
                Some(should_end),
                bot_speaking,
                bot_speaking_until,
            )
            .await?;
        }

        Ok(!should_end)
    }

    async fn speak(
        &self,
        outbound: &mpsc::Sender<ServerEvent>,
        text: &str,
        state: ConversationState,
        should_end: Option<bool>,
        bot_speaking: &mut bool,
        bot_speaking_until: &mut Option<Instant>,
    ) -> Result<()> {
        let audio = self.tts.synthesize(text).await.unwrap_or_default();
        let duration = self.tts.duration(&audio);
        outbound
            .send(ServerEvent::Response {
                text: text.to_string(),
                audio,
                conversation_state: state.as_str().to_string(),
                should_end,
            })
            .await
            .ok();
        *bot_speaking = true;
        *bot_speaking_until = Some(Instant::now() + Duration::from_secs_f64(duration.max(0.0)));
        Ok(())
    }
}

/// Result of a one-shot, non-streaming voice turn (spec §6 `POST /voice`).
#[derive(Debug, Clone)]
pub struct VoiceTurnResult {
    pub text: String,
    pub audio: Vec<u8>,
    pub session_state: String,
    pub conversation_state: String,
    pub should_end: bool,
    pub asr_confidence: f32,
    pub asr_language: String,
    pub asr_action: String,
}

impl Orchestrator {
    /// Runs exactly one turn against a pre-segmented audio clip, without any
    /// turn-taking framing — the caller has already decided where the turn
    /// starts and ends (spec §6: "Used by the non-streaming client").
    /// Reuses the same ASR → linguistic-completeness → conversation-engine →
    /// TTS pipeline as the streaming path, via a throwaway outbound channel.
    pub async fn run_http_voice_turn(&self, session_id: &str, audio: &[u8]) -> Result<VoiceTurnResult> {
        let mut session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        let mut conversation = self
            .store
            .get_conversation(session_id)
            .await?
            .unwrap_or_default();

        if conversation.state == ConversationState::Init {
            self.engine
                .process_state_transition(&mut conversation, None, self.llm.as_ref())
                .await;
        }

        let asr_result = self
            .asr
            .transcribe(audio, None, true)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "voice endpoint: ASR failed, treating as silence");
                AsrResult::silence()
            });

        let (out_tx, mut out_rx) = mpsc::channel(8);
        let mut bot_speaking = false;
        let mut bot_speaking_until = None;

        if !asr_result.text.is_empty() && asr_result.confidence >= 0.1 {
            self.run_conversation_turn(
                session_id,
                &mut conversation,
                &asr_result,
                &out_tx,
                &mut bot_speaking,
                &mut bot_speaking_until,
            )
            .await?;
        }
        drop(out_tx);

        let mut text = String::new();
        let mut audio_out = Vec::new();
        let mut should_end = false;
        let mut routed_action = String::new();
        while let Some(event) = out_rx.recv().await {
            match event {
                ServerEvent::Transcription { action, .. } => routed_action = action,
                ServerEvent::Response {
                    text: t,
                    audio: a,
                    should_end: se,
                    ..
                } => {
                    text = t;
                    audio_out = a;
                    should_end = se.unwrap_or(false);
                }
                _ => {}
            }
        }

        session.touch();
        if conversation.state.is_terminal() {
            self.store.close_session(session_id).await?;
        } else {
            self.store.save_session(&session).await?;
        }
        self.store.save_conversation(session_id, &conversation).await?;

        Ok(VoiceTurnResult {
            text,
            audio: audio_out,
            session_state: session.state.as_str().to_string(),
            conversation_state: conversation.state.as_str().to_string(),
            should_end,
            asr_confidence: asr_result.confidence,
            asr_language: asr_result.language,
            asr_action: routed_action,
        })
    }
}

/// Periodic background housekeeping over the active-session set (spec §4.E
/// "Background housekeeping"). Runs every `interval` until cancelled.
pub async fn run_housekeeping(store: Arc<dyn Store>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let ids = match store.active_session_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "housekeeping: failed to list active sessions");
                continue;
            }
        };

        for id in ids {
            let session = match store.get_session(&id).await {
                Ok(Some(s)) => s,
                Ok(None) => continue,
                Err(e) => {
                    warn!(error = %e, session_id = %id, "housekeeping: failed to load session");
                    continue;
                }
            };

            let now = chrono::Utc::now();
            if session.is_past_max_duration(now) {
                if let Err(e) = store.close_session(&id).await {
                    warn!(error = %e, session_id = %id, "housekeeping: failed to close expired session");
                } else {
                    info!(session_id = %id, "housekeeping: closed session past max duration");
                }
                continue;
            }

            if session.is_idle(now) {
                let mut idled = session;
                idled.state = crate::types::SessionState::Idle;
                if let Err(e) = store.save_session(&idled).await {
                    warn!(error = %e, session_id = %id, "housekeeping: failed to mark session idle");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::engines::fakes::{EchoLlm, ScriptedAsr, SilentTts};
    use crate::store::InMemoryStore;
    use crate::types::AsrResult;

    async fn new_session(store: &dyn Store) -> String {
        let session = store.create_session(30, 600, None).await.unwrap();
        session.session_id
    }

    fn orchestrator(
        store: Arc<dyn Store>,
        asr_results: Vec<AsrResult>,
    ) -> Orchestrator {
        Orchestrator::new(
            Arc::new(Config::default()),
            store,
            Arc::new(ScriptedAsr::new(asr_results)),
            Arc::new(EchoLlm::default()),
            Arc::new(SilentTts),
            "You are a dental clinic assistant.".to_string(),
        )
    }

    #[tokio::test]
    async fn invalid_session_sends_error_and_closes() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let orch = orchestrator(store, vec![]);
        let (_tx, rx) = mpsc::channel(4);
        let (out_tx, mut out_rx) = mpsc::channel(4);

        let result = orch.run_session("nonexistent", rx, out_tx).await;
        assert!(result.is_err());
        match out_rx.recv().await {
            Some(ServerEvent::Error { message }) => assert_eq!(message, "Invalid session"),
            other => panic!("expected error event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn fresh_session_receives_greeting_before_any_audio() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let session_id = new_session(&store.clone()).await;
        let orch = orchestrator(store, vec![]);
        let (tx, rx) = mpsc::channel(4);
        let (out_tx, mut out_rx) = mpsc::channel(8);

        let handle = tokio::spawn(async move { orch.run_session(&session_id, rx, out_tx).await });
        match out_rx.recv().await {
            Some(ServerEvent::Response { text, conversation_state, .. }) => {
                assert!(text.contains("SmileCare"));
                assert_eq!(conversation_state, "GREETING");
            }
            other => panic!("expected greeting response, got {:?}", other),
        }
        drop(tx);
        let _ = handle.await;
    }

    #[tokio::test]
    async fn ping_gets_pong() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let session_id = new_session(&store.clone()).await;
        let orch = orchestrator(store, vec![]);
        let (tx, rx) = mpsc::channel(4);
        let (out_tx, mut out_rx) = mpsc::channel(8);

        let handle = tokio::spawn(async move { orch.run_session(&session_id, rx, out_tx).await });
        out_rx.recv().await; // greeting
        tx.send(ClientEvent::Ping).await.unwrap();
        match out_rx.recv().await {
            Some(ServerEvent::Pong) => {}
            other => panic!("expected pong, got {:?}", other),
        }
        tx.send(ClientEvent::End).await.unwrap();
        let _ = handle.await;
    }
}
