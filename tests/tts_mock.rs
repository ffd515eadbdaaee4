//! Exercises `Orchestrator::speak`'s TTS-failure fallback (spec §7a: a
//! failed synthesize call degrades to empty audio rather than propagating
//! an error across the session boundary) using a `mockall`-generated double
//! for `TtsEngine`, instead of a hand-rolled fake — `TtsEngine` has the
//! smallest surface of the three collaborator traits, so it is the natural
//! one to cover this way alongside the hand-rolled fakes used elsewhere.

use std::sync::Arc;

use async_trait::async_trait;
use mockall::mock;
use tokio::sync::mpsc;

use voicedialog_core::config::Config;
use voicedialog_core::engines::{AsrEngine, LlmEngine, TtsEngine};
use voicedialog_core::orchestrator::{ClientEvent, Orchestrator, ServerEvent};
use voicedialog_core::store::{InMemoryStore, Store};
use voicedialog_core::types::{AsrResult, Message};

mock! {
    pub Tts {}

    #[async_trait]
    impl TtsEngine for Tts {
        async fn synthesize(&self, text: &str) -> anyhow::Result<Vec<u8>>;
        fn duration(&self, audio: &[u8]) -> f64;
    }
}

struct NoAsr;

#[async_trait]
impl AsrEngine for NoAsr {
    async fn transcribe(&self, _audio: &[u8], _language: Option<&str>, _use_vad_filter: bool) -> anyhow::Result<AsrResult> {
        Ok(AsrResult::silence())
    }
}

struct NoLlm;

#[async_trait]
impl LlmEngine for NoLlm {
    async fn reply(&self, _system_prompt: &str, _history: &[Message], _user_text: &str) -> anyhow::Result<String> {
        Ok(String::new())
    }

    async fn classify(&self, _prompt: &str) -> anyhow::Result<String> {
        Ok("CLEAR".to_string())
    }
}

#[tokio::test]
async fn failing_tts_degrades_to_empty_audio_not_a_session_error() {
    let mut mock_tts = MockTts::new();
    mock_tts
        .expect_synthesize()
        .returning(|_text| Err(anyhow::anyhow!("tts backend unreachable")));
    // `duration` is still called on the (empty, post-`unwrap_or_default`)
    // audio buffer, so the mock must answer for the empty-slice case too.
    mock_tts.expect_duration().returning(|audio| audio.len() as f64);

    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let session_id = store.create_session(30, 600, None).await.unwrap().session_id;

    let orch = Orchestrator::new(
        Arc::new(Config::default()),
        store,
        Arc::new(NoAsr),
        Arc::new(NoLlm),
        Arc::new(mock_tts),
        "You are a dental clinic assistant.".to_string(),
    );

    let (tx, rx) = mpsc::channel(8);
    let (out_tx, mut out_rx) = mpsc::channel(8);
    let handle = tokio::spawn(async move { orch.run_session(&session_id, rx, out_tx).await });

    match out_rx.recv().await {
        Some(ServerEvent::Response { audio, conversation_state, .. }) => {
            assert!(audio.is_empty(), "expected empty audio fallback, got {} bytes", audio.len());
            assert_eq!(conversation_state, "GREETING");
        }
        other => panic!("expected a greeting response despite TTS failure, got {:?}", other),
    }

    // The session must still be alive after the TTS failure.
    tx.send(ClientEvent::Ping).await.unwrap();
    match out_rx.recv().await {
        Some(ServerEvent::Pong) => {}
        other => panic!("expected pong after TTS failure, got {:?}", other),
    }

    tx.send(ClientEvent::End).await.unwrap();
    let _ = handle.await;
}
