//! Pronunciation assessment against the ISE (Intelligent Speech Evaluation) API.
//!
//! A clip of 16 kHz mono 16-bit PCM and its reference text go in; a
//! [`PronunciationAssessmentResult`] with aggregate, per-word and per-sentence
//! scores comes out.
//!
//! # Components
//!
//! - [`Signer`]: HMAC-SHA256 signed WebSocket URL
//! - [`messages`]: handshake, audio and result frames
//! - [`IseClient`]: one streaming session per clip
//! - [`parser`]: XML payload to scores, with bitmask-derived fallbacks
//! - [`ChunkedAssessor`]: chapter clips longer than the provider limit
//!
//! # Protocol
//!
//! ```text
//! client                                   provider
//!   │ ── ssb handshake (status 0) ──────────▶ │
//!   │ ── auw frame, aus=1 ──────────────────▶ │
//!   │ ── auw frame, aus=2 ... ──────────────▶ │
//!   │ ── auw frame, aus=4, status 2 ────────▶ │
//!   │ ◀── result fragments ... status 2 ───── │
//! ```
//!
//! # Configuration
//!
//! ```bash
//! export ISE_APP_ID="your-app-id"
//! export ISE_API_KEY="your-api-key"
//! export ISE_API_SECRET="your-api-secret"
//! export ISE_SESSION_TIMEOUT_SECS=60      # Optional
//! export ISE_CHAPTER_CEILING_SECS=90      # Optional
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use ise_gateway::core::assessment::{
//!     AssessmentCategory, IseClient, IseConfig, Language,
//! };
//!
//! # async fn run(pcm: Vec<u8>) -> Result<(), Box<dyn std::error::Error>> {
//! let client = IseClient::new(IseConfig::new("app-id", "api-key", "api-secret"))?;
//! let result = client
//!     .assess_clip(
//!         Bytes::from(pcm),
//!         "今天天气很好。",
//!         Language::Chinese,
//!         AssessmentCategory::Sentence,
//!     )
//!     .await?;
//! println!("pronunciation: {:.1}", result.pronunciation_score);
//! # Ok(())
//! # }
//! ```

pub mod audio;
mod base;
mod chunking;
mod client;
mod config;
pub mod messages;
pub mod parser;
mod signer;
mod types;
pub mod xml;


pub use base::PronunciationAssessor;
pub use chunking::{ChunkPlan, ChunkedAssessor, chunk_count, merge_results, plan_chunks};
pub use client::{IseClient, ResultAccumulator, SessionState};
pub use config::{
    DEFAULT_CHAPTER_CEILING, DEFAULT_FRAME_BYTES, DEFAULT_SEND_QUEUE_FRAMES,
    DEFAULT_SESSION_TIMEOUT, ISE_DEFAULT_ENDPOINT, IseConfig, PCM_BYTES_PER_SECOND, SAMPLE_RATE,
};
pub use signer::{Signer, http_date};
pub use types::{
    AssessmentCategory, AssessmentError, AssessmentResult, ErrorKind, Language, PhoneErrorKind,
    PronunciationAssessmentResult, SentenceResult, WordResult,
};
