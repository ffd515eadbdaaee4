//! End-to-end orchestrator scenarios (spec.md §8 "Concrete end-to-end
//! scenarios"), driven through the public `Orchestrator` surface rather than
//! the individual component unit tests already covering rule-level behavior.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use voicedialog_core::config::Config;
use voicedialog_core::orchestrator::{ClientEvent, Orchestrator, ServerEvent};
use voicedialog_core::store::{InMemoryStore, Store};
use voicedialog_core::types::{AsrResult, Message};

/// A single 20 ms frame (640 bytes) of loud 16-bit PCM, well above the
/// energy/sub-frame thresholds the Frame VAD uses (spec §4.A).
fn loud_frame() -> Vec<u8> {
    let mut v = Vec::with_capacity(640);
    for _ in 0..320 {
        v.extend_from_slice(&20_000i16.to_le_bytes());
    }
    v
}

fn silent_frame() -> Vec<u8> {
    vec![0u8; 640]
}

/// Scripted ASR double: returns one result per call, silence once exhausted.
struct ScriptedAsr {
    results: std::sync::Mutex<Vec<AsrResult>>,
}

impl ScriptedAsr {
    fn new(results: Vec<AsrResult>) -> Self {
        Self {
            results: std::sync::Mutex::new(results),
        }
    }
}

#[async_trait]
impl voicedialog_core::engines::AsrEngine for ScriptedAsr {
    async fn transcribe(&self, _audio: &[u8], _language: Option<&str>, _use_vad_filter: bool) -> Result<AsrResult> {
        let mut results = self.results.lock().unwrap();
        if results.is_empty() {
            Ok(AsrResult::silence())
        } else {
            Ok(results.remove(0))
        }
    }
}

/// ASR double that always fails, used to exercise the transient-upstream
/// recovery path (spec §7a: "empty ASR result is treated as silence").
struct FailingAsr;

#[async_trait]
impl voicedialog_core::engines::AsrEngine for FailingAsr {
    async fn transcribe(&self, _audio: &[u8], _language: Option<&str>, _use_vad_filter: bool) -> Result<AsrResult> {
        anyhow::bail!("upstream ASR unreachable")
    }
}

struct EchoLlm;

#[async_trait]
impl voicedialog_core::engines::LlmEngine for EchoLlm {
    async fn reply(&self, _system_prompt: &str, _history: &[Message], user_text: &str) -> Result<String> {
        Ok(format!("Sure, let's get that sorted: {}", user_text))
    }

    async fn classify(&self, _prompt: &str) -> Result<String> {
        Ok("CLEAR".to_string())
    }
}

struct SilentTts;

#[async_trait]
impl voicedialog_core::engines::TtsEngine for SilentTts {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        Ok(text.as_bytes().to_vec())
    }

    fn duration(&self, audio: &[u8]) -> f64 {
        audio.len() as f64 / 10.0
    }
}

/// A TTS double with a long, fixed playback duration, so the barge-in window
/// stays open long enough for the test to drive it deterministically (spec
/// §8 scenario 5: "audio_duration = 5 s").
struct LongTts;

#[async_trait]
impl voicedialog_core::engines::TtsEngine for LongTts {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        Ok(text.as_bytes().to_vec())
    }

    fn duration(&self, _audio: &[u8]) -> f64 {
        5.0
    }
}

fn orchestrator(
    store: Arc<dyn Store>,
    asr: Arc<dyn voicedialog_core::engines::AsrEngine>,
    tts: Arc<dyn voicedialog_core::engines::TtsEngine>,
) -> Orchestrator {
    Orchestrator::new(
        Arc::new(Config::default()),
        store,
        asr,
        Arc::new(EchoLlm),
        tts,
        "You are a dental clinic assistant.".to_string(),
    )
}

async fn new_session(store: &dyn Store) -> String {
    store.create_session(30, 600, None).await.unwrap().session_id
}

/// Scenario 1 (spec §8): greeting, then a spoken turn with high-confidence
/// ASR drives LISTENING -> PROCESSING -> RESPONDING and increments
/// `turn_count`, via real PCM frames through the turn-taking engine (not a
/// direct `process_asr_result` call, which conversation/mod.rs already
/// covers at the unit level).
#[tokio::test]
async fn happy_path_book_via_pcm_frames_increments_turn_count() {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let session_id = new_session(store.as_ref()).await;
    let asr = Arc::new(ScriptedAsr::new(vec![AsrResult {
        text: "I want to book an appointment".to_string(),
        confidence: 0.9,
        language: "en".to_string(),
    }]));
    let orch = orchestrator(store.clone(), asr, Arc::new(SilentTts));

    let (tx, rx) = mpsc::channel(64);
    let (out_tx, mut out_rx) = mpsc::channel(64);
    let session_id_task = session_id.clone();
    let handle = tokio::spawn(async move { orch.run_session(&session_id_task, rx, out_tx).await });

    // Greeting. The bot is now "speaking" for the greeting's mock duration,
    // so the first two loud frames are consumed as a barge-in (spec §4.E
    // step 4) rather than fed to the turn-taking engine; clear that first
    // so the frames sent below land on a clean chunk boundary.
    match out_rx.recv().await {
        Some(ServerEvent::Response { conversation_state, .. }) => assert_eq!(conversation_state, "GREETING"),
        other => panic!("expected greeting, got {:?}", other),
    }
    tx.send(ClientEvent::Pcm(loud_frame())).await.unwrap();
    tx.send(ClientEvent::Pcm(loud_frame())).await.unwrap();
    match out_rx.recv().await {
        Some(ServerEvent::BargeIn) => {}
        other => panic!("expected barge-in to clear bot_speaking, got {:?}", other),
    }

    // Two chunks (>= min_speech_chunks=2) of speech, then enough silence to
    // clear the grace window (5 chunks) and the confirmation window (2
    // chunks): 640-byte frames, 10 per 6400-byte chunk.
    for _ in 0..2 {
        for _ in 0..10 {
            tx.send(ClientEvent::Pcm(loud_frame())).await.unwrap();
        }
    }
    for _ in 0..7 {
        for _ in 0..10 {
            tx.send(ClientEvent::Pcm(silent_frame())).await.unwrap();
        }
    }

    match out_rx.recv().await {
        Some(ServerEvent::Transcription { text, action, .. }) => {
            assert_eq!(text, "I want to book an appointment");
            assert_eq!(action, "ACCEPT");
        }
        other => panic!("expected transcription, got {:?}", other),
    }
    match out_rx.recv().await {
        Some(ServerEvent::Response { conversation_state, .. }) => {
            assert_eq!(conversation_state, "LISTENING");
        }
        other => panic!("expected a reply response, got {:?}", other),
    }

    tx.send(ClientEvent::End).await.unwrap();
    let _ = handle.await;

    let conversation = store.get_conversation(&session_id).await.unwrap().unwrap();
    assert_eq!(conversation.turn_count, 1);
    let history = store.get_history(&session_id, 10).await.unwrap();
    assert_eq!(history.len(), 2);
}

/// Scenario 5 (spec §8): a single high-VAD frame never triggers barge-in;
/// two consecutive frames do, exactly once, and stop bot playback.
#[tokio::test]
async fn two_consecutive_loud_frames_trigger_barge_in_once() {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let session_id = new_session(store.as_ref()).await;
    let asr = Arc::new(ScriptedAsr::new(vec![]));
    let orch = orchestrator(store.clone(), asr, Arc::new(LongTts));

    let (tx, rx) = mpsc::channel(64);
    let (out_tx, mut out_rx) = mpsc::channel(64);
    let session_id_task = session_id.clone();
    let handle = tokio::spawn(async move { orch.run_session(&session_id_task, rx, out_tx).await });

    out_rx.recv().await; // greeting; bot_speaking=true, bot_speaking_until ~5s out

    // A single loud frame must not trigger barge-in.
    tx.send(ClientEvent::Pcm(loud_frame())).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Two consecutive loud frames do.
    tx.send(ClientEvent::Pcm(loud_frame())).await.unwrap();
    match tokio::time::timeout(Duration::from_secs(1), out_rx.recv()).await {
        Ok(Some(ServerEvent::BargeIn)) => {}
        other => panic!("expected exactly one barge-in event, got {:?}", other),
    }

    tx.send(ClientEvent::End).await.unwrap();
    let _ = handle.await;
}

/// Invalid session ids close the connection with an error frame (spec §6
/// "Invalid session -> send {type:error...} and close", spec §7c).
#[tokio::test]
async fn unknown_session_id_is_rejected() {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let orch = orchestrator(store, Arc::new(ScriptedAsr::new(vec![])), Arc::new(SilentTts));
    let (_tx, rx) = mpsc::channel(4);
    let (out_tx, mut out_rx) = mpsc::channel(4);

    assert!(orch.run_session("does-not-exist", rx, out_tx).await.is_err());
    match out_rx.recv().await {
        Some(ServerEvent::Error { message }) => assert_eq!(message, "Invalid session"),
        other => panic!("expected error event, got {:?}", other),
    }
}

/// Transient ASR failure degrades to silence rather than propagating an
/// error across the session boundary (spec §7a).
#[tokio::test]
async fn asr_failure_is_treated_as_silence_and_session_stays_open() {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let session_id = new_session(store.as_ref()).await;
    let orch = orchestrator(store.clone(), Arc::new(FailingAsr), Arc::new(SilentTts));

    let (tx, rx) = mpsc::channel(64);
    let (out_tx, mut out_rx) = mpsc::channel(64);
    let session_id_task = session_id.clone();
    let handle = tokio::spawn(async move { orch.run_session(&session_id_task, rx, out_tx).await });

    out_rx.recv().await; // greeting

    // Clear the post-greeting barge-in window first (see the happy-path
    // scenario above for why), then send clean, chunk-aligned speech+silence.
    tx.send(ClientEvent::Pcm(loud_frame())).await.unwrap();
    tx.send(ClientEvent::Pcm(loud_frame())).await.unwrap();
    match out_rx.recv().await {
        Some(ServerEvent::BargeIn) => {}
        other => panic!("expected barge-in to clear bot_speaking, got {:?}", other),
    }

    for _ in 0..2 {
        for _ in 0..10 {
            tx.send(ClientEvent::Pcm(loud_frame())).await.unwrap();
        }
    }
    for _ in 0..7 {
        for _ in 0..10 {
            tx.send(ClientEvent::Pcm(silent_frame())).await.unwrap();
        }
    }

    // No transcription/response should arrive for the failed turn; confirm
    // the session is still alive by sending a ping through the same loop.
    tx.send(ClientEvent::Ping).await.unwrap();
    match tokio::time::timeout(Duration::from_secs(1), out_rx.recv()).await {
        Ok(Some(ServerEvent::Pong)) => {}
        other => panic!("expected the session to still be responsive, got {:?}", other),
    }

    tx.send(ClientEvent::End).await.unwrap();
    let _ = handle.await;
}
