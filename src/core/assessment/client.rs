//! ISE streaming session.
//!
//! One call to [`IseClient::assess_clip`] opens one WebSocket connection, streams
//! the clip and waits for the scored result.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐   bounded    ┌──────────────────┐    ┌─────────────┐
//! │ frame producer  │─────────────▶│  session loop    │───▶│  ws_sink    │
//! │ (spawned task)  │  mpsc queue  │ (tokio::select!) │    └─────────────┘
//! └─────────────────┘              │                  │◀── ws_stream
//!                                  └────────┬─────────┘
//!                                           ▼
//!                                  ResultAccumulator ──▶ parser::parse
//! ```
//!
//! The producer awaits queue capacity and the loop awaits each flushed send,
//! so a slow socket slows the producer down instead of growing a buffer.
//! The whole session runs under a single deadline; when it expires the
//! session future is dropped, which closes the socket.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, error::ProtocolError, protocol::Message},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::audio;
use super::base::PronunciationAssessor;
use super::config::IseConfig;
use super::messages::{HandshakeFrame, RawProviderFrame, audio_frames, decode_fragments};
use super::parser;
use super::signer::Signer;
use super::types::{
    AssessmentCategory, AssessmentError, AssessmentResult, Language,
    PronunciationAssessmentResult,
};

// =============================================================================
// Session state
// =============================================================================

/// Lifecycle of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Opening the socket and sending the handshake.
    Connecting,
    /// Audio frames are still being queued and sent.
    Streaming,
    /// All audio sent; waiting for the final result frame.
    AwaitingResult,
    /// The final frame arrived or the provider closed the connection.
    Done,
}

/// Collects result fragments for one session.
#[derive(Debug)]
pub struct ResultAccumulator {
    state: SessionState,
    fragments: Vec<String>,
    sid: Option<String>,
}

impl Default for ResultAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultAccumulator {
    pub fn new() -> Self {
        Self {
            state: SessionState::Connecting,
            fragments: Vec::new(),
            sid: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Provider session id, once one has been seen.
    pub fn sid(&self) -> Option<&str> {
        self.sid.as_deref()
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    /// Move to a later state. Transitions never go backwards.
    pub fn advance(&mut self, next: SessionState) {
        let rank = |s: SessionState| match s {
            SessionState::Connecting => 0,
            SessionState::Streaming => 1,
            SessionState::AwaitingResult => 2,
            SessionState::Done => 3,
        };
        if rank(next) > rank(self.state) {
            self.state = next;
        }
    }

    /// Apply one inbound text frame.
    ///
    /// Returns the state after the frame. A non-zero code fails the session.
    pub fn on_text(&mut self, text: &str) -> AssessmentResult<SessionState> {
        let frame = RawProviderFrame::parse(text).map_err(|e| {
            AssessmentError::UnparseableResult(format!("invalid result frame: {e}"))
        })?;

        if self.sid.is_none() {
            self.sid = frame.sid.clone();
        }

        if !frame.is_success() {
            return Err(frame.into_error());
        }

        if let Some(fragment) = frame.fragment() {
            self.fragments.push(fragment.to_string());
        }

        if frame.is_final() {
            self.advance(SessionState::Done);
        }

        Ok(self.state)
    }

    /// Decode and parse everything collected so far.
    pub fn finish(
        mut self,
        category: AssessmentCategory,
    ) -> AssessmentResult<PronunciationAssessmentResult> {
        self.advance(SessionState::Done);
        let xml = decode_fragments(&self.fragments)?;
        parser::parse(&xml, category)
    }
}

// =============================================================================
// IseClient
// =============================================================================

/// Pronunciation assessor backed by the ISE WebSocket API.
#[derive(Debug, Clone)]
pub struct IseClient {
    config: IseConfig,
    signer: Signer,
}

impl IseClient {
    /// Create a client; fails on invalid configuration.
    pub fn new(config: IseConfig) -> AssessmentResult<Self> {
        config.validate()?;
        let signer = Signer::new(&config)?;
        Ok(Self { config, signer })
    }

    pub fn config(&self) -> &IseConfig {
        &self.config
    }

    /// Run one session under the configured deadline.
    pub async fn assess_clip(
        &self,
        audio: Bytes,
        reference_text: &str,
        language: Language,
        category: AssessmentCategory,
    ) -> AssessmentResult<PronunciationAssessmentResult> {
        let session_id = Uuid::new_v4();
        let pcm = audio::strip_wav_header(audio);
        if pcm.is_empty() {
            return Err(AssessmentError::InvalidAudio(
                "audio contains no PCM samples".to_string(),
            ));
        }

        info!(
            "Starting ISE session {} ({} category, {:.1}s of audio)",
            session_id,
            category,
            audio::pcm_duration(pcm.len()).as_secs_f64()
        );

        let deadline = self.config.session_timeout;
        match timeout(
            deadline,
            self.run_session(session_id, pcm, reference_text, language, category),
        )
        .await
        {
            Ok(Ok(result)) => {
                info!(
                    "ISE session {} finished (pronunciation score {:.1}, {} words)",
                    session_id,
                    result.pronunciation_score,
                    result.words.len()
                );
                Ok(result)
            }
            Ok(Err(e)) => {
                error!("ISE session {} failed: {}", session_id, e);
                Err(e)
            }
            Err(_elapsed) => {
                let err = AssessmentError::ProtocolTimeout(deadline);
                error!("ISE session {} timed out: {}", session_id, err);
                Err(err)
            }
        }
    }

    async fn run_session(
        &self,
        session_id: Uuid,
        pcm: Bytes,
        reference_text: &str,
        language: Language,
        category: AssessmentCategory,
    ) -> AssessmentResult<PronunciationAssessmentResult> {
        let mut accumulator = ResultAccumulator::new();

        let url = self.signer.build_authenticated_url()?;
        let (ws_stream, _response) = connect_async(url.as_str()).await.map_err(|e| {
            let message = e.to_string();
            if message.contains("401") || message.contains("403") {
                AssessmentError::ConnectionFailed(format!(
                    "ISE rejected the signed URL ({message}). Check api_key, api_secret and clock skew."
                ))
            } else {
                AssessmentError::ConnectionFailed(format!("Failed to connect to ISE: {message}"))
            }
        })?;

        debug!("ISE session {} connected", session_id);
        let (mut ws_sink, mut ws_stream) = ws_stream.split();

        let handshake =
            HandshakeFrame::new(&self.config.app_id, language, category, reference_text);
        ws_sink
            .send(Message::Text(handshake.to_json()?.into()))
            .await
            .map_err(|e| AssessmentError::NetworkError(format!("Failed to send handshake: {e}")))?;

        accumulator.advance(SessionState::Streaming);

        let (frame_tx, mut frame_rx) =
            mpsc::channel::<AssessmentResult<Message>>(self.config.send_queue_frames);
        let frame_bytes = self.config.frame_bytes;
        let producer = tokio::spawn(async move {
            for frame in audio_frames(&pcm, frame_bytes) {
                let message = frame.to_json().map(|json| Message::Text(json.into()));
                let failed = message.is_err();
                // Receiver gone means the session already ended.
                if frame_tx.send(message).await.is_err() || failed {
                    break;
                }
            }
        });

        let mut frames_sent = 0usize;
        let outcome = loop {
            let sending = accumulator.state() == SessionState::Streaming;

            tokio::select! {
                biased;

                message = ws_stream.next() => match message {
                    Some(Ok(Message::Text(text))) => match accumulator.on_text(text.as_str()) {
                        Ok(SessionState::Done) => break Ok(()),
                        Ok(_) => {}
                        Err(e) => break Err(e),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        info!("ISE session {} closed by provider: {:?}", session_id, frame);
                        break Ok(());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) if is_closed(&e) => {
                        info!("ISE session {} connection dropped by provider: {}", session_id, e);
                        break Ok(());
                    }
                    Some(Err(e)) => {
                        break Err(AssessmentError::NetworkError(format!("WebSocket error: {e}")));
                    }
                    None => {
                        debug!("ISE session {} stream ended", session_id);
                        break Ok(());
                    }
                },

                frame = frame_rx.recv(), if sending => match frame {
                    Some(Ok(message)) => {
                        if let Err(e) = ws_sink.send(message).await {
                            break Err(AssessmentError::NetworkError(format!(
                                "Failed to send audio frame: {e}"
                            )));
                        }
                        frames_sent += 1;
                    }
                    Some(Err(e)) => break Err(e),
                    None => {
                        debug!(
                            "ISE session {} sent {} audio frames; awaiting result",
                            session_id, frames_sent
                        );
                        accumulator.advance(SessionState::AwaitingResult);
                    }
                },
            }
        };

        producer.abort();
        let _ = ws_sink.send(Message::Close(None)).await;

        if let Some(sid) = accumulator.sid() {
            debug!("ISE session {} provider sid {}", session_id, sid);
        }

        outcome?;
        if accumulator.state() != SessionState::Done {
            warn!(
                "ISE session {} ended before the final result frame ({} fragments)",
                session_id,
                accumulator.fragment_count()
            );
        }
        accumulator.finish(category)
    }
}

/// The peer went away, with or without a closing handshake.
///
/// Whatever arrived before this point is still handed to the parser.
fn is_closed(error: &tungstenite::Error) -> bool {
    matches!(
        error,
        tungstenite::Error::ConnectionClosed
            | tungstenite::Error::AlreadyClosed
            | tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake)
    )
}

#[async_trait]
impl PronunciationAssessor for IseClient {
    async fn assess(
        &self,
        audio: Bytes,
        reference_text: &str,
        language: Language,
        category: AssessmentCategory,
    ) -> AssessmentResult<PronunciationAssessmentResult> {
        self.assess_clip(audio, reference_text, language, category)
            .await
    }

    fn name(&self) -> &str {
        "ise"
    }
}
