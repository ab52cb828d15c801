//! The assessment seam shared by the streaming client and the orchestrator.

use async_trait::async_trait;
use bytes::Bytes;

use super::types::{AssessmentCategory, AssessmentResult, Language, PronunciationAssessmentResult};

/// Anything that can score one clip against a reference text.
///
/// The production implementation opens one provider session per call; tests
/// substitute scripted assessors.
#[async_trait]
pub trait PronunciationAssessor: Send + Sync {
    /// Assess one clip.
    ///
    /// `audio` is raw 16 kHz mono 16-bit PCM, optionally prefixed by a
    /// 44-byte WAV header.
    async fn assess(
        &self,
        audio: Bytes,
        reference_text: &str,
        language: Language,
        category: AssessmentCategory,
    ) -> AssessmentResult<PronunciationAssessmentResult>;

    /// Name used in logs.
    fn name(&self) -> &str;
}
