//! Assessment result types and the engine error taxonomy.
//!
//! Everything in this module is created fresh for one assessment call and
//! returned by value. The JSON shape (camelCase keys) is what the HTTP
//! boundary hands back to clients.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Category
// =============================================================================

/// Granularity of the reference text being evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssessmentCategory {
    /// Isolated syllables (single characters).
    Syllable,
    /// Isolated words.
    Word,
    /// One or more sentences.
    #[default]
    Sentence,
    /// A longer passage.
    Chapter,
}

impl AssessmentCategory {
    /// Value sent in the `category` field of the handshake frame.
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            Self::Syllable => "read_syllable",
            Self::Word => "read_word",
            Self::Sentence => "read_sentence",
            Self::Chapter => "read_chapter",
        }
    }

    /// XML element carrying the scores for this category.
    ///
    /// The provider reuses the handshake category as the tag name.
    pub fn xml_tag(&self) -> &'static str {
        self.as_wire_str()
    }

    /// Whether the reference text is a list of short items rather than prose.
    pub fn is_itemized(&self) -> bool {
        matches!(self, Self::Syllable | Self::Word)
    }
}

impl std::fmt::Display for AssessmentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Syllable => "syllable",
            Self::Word => "word",
            Self::Sentence => "sentence",
            Self::Chapter => "chapter",
        };
        write!(f, "{name}")
    }
}

impl FromStr for AssessmentCategory {
    type Err = AssessmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "syllable" | "read_syllable" => Ok(Self::Syllable),
            "word" | "read_word" => Ok(Self::Word),
            "sentence" | "read_sentence" => Ok(Self::Sentence),
            "chapter" | "read_chapter" => Ok(Self::Chapter),
            _ => Err(AssessmentError::ConfigurationError(format!(
                "Unsupported assessment category: {s}. Supported categories: syllable, word, sentence, chapter"
            ))),
        }
    }
}

// =============================================================================
// Language
// =============================================================================

/// Language of the reference text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Mandarin Chinese.
    #[default]
    Chinese,
    /// English.
    English,
}

impl Language {
    /// Engine identifier (`ent`) for the handshake frame.
    pub fn engine(&self) -> &'static str {
        match self {
            Self::Chinese => "cn_vip",
            Self::English => "en_vip",
        }
    }
}

impl FromStr for Language {
    type Err = AssessmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "zh" | "zh-cn" | "zh_cn" | "cn" | "chinese" | "mandarin" | "cn_vip" => {
                Ok(Self::Chinese)
            }
            "en" | "en-us" | "en_us" | "en-gb" | "english" | "en_vip" => Ok(Self::English),
            _ => Err(AssessmentError::ConfigurationError(format!(
                "Unsupported assessment language: {s}"
            ))),
        }
    }
}

// =============================================================================
// Per-item results
// =============================================================================

/// Reading error attached to a word or syllable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ErrorKind {
    #[default]
    None,
    Mispronunciation,
    Repetition,
    Insertion,
    Omission,
}

impl ErrorKind {
    /// Insertions and omissions have no counterpart position in the reference.
    pub fn is_unaligned(&self) -> bool {
        matches!(self, Self::Insertion | Self::Omission)
    }
}

/// Which parts of a syllable's phonemes were judged wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhoneErrorKind {
    None,
    Vowel,
    Tone,
    Both,
}

impl PhoneErrorKind {
    /// Build from the two error flags.
    pub fn from_flags(vowel: bool, tone: bool) -> Self {
        match (vowel, tone) {
            (false, false) => Self::None,
            (true, false) => Self::Vowel,
            (false, true) => Self::Tone,
            (true, true) => Self::Both,
        }
    }
}

/// Score for one word (or one syllable in the syllable category).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordResult {
    pub text: String,
    pub accuracy_score: f64,
    pub error_kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tone_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_error_kind: Option<PhoneErrorKind>,
}

/// Score for one sentence (sentence and chapter categories only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentenceResult {
    pub text: String,
    pub score: f64,
}

// =============================================================================
// Assessment result
// =============================================================================

/// Structured pronunciation assessment for one clip.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PronunciationAssessmentResult {
    pub accuracy_score: f64,
    pub fluency_score: f64,
    pub completeness_score: f64,
    pub pronunciation_score: f64,
    pub tone_score: f64,
    pub words: Vec<WordResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentences: Option<Vec<SentenceResult>>,
}

impl PronunciationAssessmentResult {
    /// Result for audio the provider rejected as unintelligible or off-script.
    pub fn zeroed() -> Self {
        Self::default()
    }

    /// True when every aggregate score is zero and nothing was scored.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
            && self.sentences.as_ref().is_none_or(|s| s.is_empty())
            && [
                self.accuracy_score,
                self.fluency_score,
                self.completeness_score,
                self.pronunciation_score,
                self.tone_score,
            ]
            .iter()
            .all(|s| *s == 0.0)
    }

    /// Words that align to a reference position, in order.
    pub fn aligned_words(&self) -> impl Iterator<Item = &WordResult> {
        self.words.iter().filter(|w| !w.error_kind.is_unaligned())
    }
}

/// Clamp a score into the 0–100 range, mapping NaN to zero.
pub(crate) fn clamp_score(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Failures surfaced by the assessment engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AssessmentError {
    /// No terminal state was reached before the session deadline.
    #[error("Assessment timed out after {0:?}")]
    ProtocolTimeout(Duration),

    /// The provider answered with a non-zero code.
    #[error("Provider error {code}: {message}")]
    ProviderError { code: i64, message: String },

    /// The connection closed without a usable payload, or the payload could not be decoded.
    #[error("Unparseable assessment result: {0}")]
    UnparseableResult(String),

    /// Every sub-request of a long-audio assessment failed.
    #[error("All {attempted} audio chunks failed to assess")]
    AllChunksFailed { attempted: usize },

    /// The WebSocket connection could not be established.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The connection broke while streaming.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Invalid engine configuration.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// The audio buffer cannot be assessed.
    #[error("Invalid audio: {0}")]
    InvalidAudio(String),
}

pub type AssessmentResult<T> = Result<T, AssessmentError>;
