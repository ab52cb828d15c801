//! Long-audio assessment.
//!
//! The provider caps chapter-category clips at a fixed duration. Longer
//! uploads are cut into contiguous PCM ranges, each paired with the matching
//! share of the reference text, assessed concurrently and merged back in
//! chunk order.

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::join_all;
use tracing::{info, warn};

use super::audio::{self, pcm_duration};
use super::base::PronunciationAssessor;
use super::config::{IseConfig, PCM_BYTES_PER_SECOND};
use super::types::{
    AssessmentCategory, AssessmentError, AssessmentResult, Language,
    PronunciationAssessmentResult, clamp_score,
};

/// One sub-request of a long-audio assessment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    pub index: usize,
    /// Byte range into the PCM payload (header excluded).
    pub pcm_range: Range<usize>,
    pub reference_text: String,
}

/// Number of chunks needed so that none exceeds `ceiling_bytes`.
pub fn chunk_count(total_bytes: usize, ceiling_bytes: usize) -> usize {
    if ceiling_bytes == 0 || total_bytes <= ceiling_bytes {
        1
    } else {
        total_bytes.div_ceil(ceiling_bytes)
    }
}

/// Split `pcm_len` bytes and `reference_text` into chunk plans.
///
/// Ranges are contiguous, start on sample boundaries and are all the same
/// size except the last. The text is cut at the same relative positions,
/// using one characters-per-byte ratio for the whole clip.
pub fn plan_chunks(pcm_len: usize, reference_text: &str, ceiling_bytes: usize) -> Vec<ChunkPlan> {
    let count = chunk_count(pcm_len, ceiling_bytes);
    let chars: Vec<char> = reference_text.chars().collect();

    if count == 1 {
        return vec![ChunkPlan {
            index: 0,
            pcm_range: 0..pcm_len,
            reference_text: reference_text.to_string(),
        }];
    }

    let chunk_bytes = pcm_len.div_ceil(count).next_multiple_of(2);
    let ratio = chars.len() as f64 / pcm_len as f64;
    let text_at = |byte: usize| -> usize {
        if byte >= pcm_len {
            chars.len()
        } else {
            ((byte as f64 * ratio).round() as usize).min(chars.len())
        }
    };

    (0..count)
        .map(|index| {
            let start = (index * chunk_bytes).min(pcm_len);
            let end = ((index + 1) * chunk_bytes).min(pcm_len);
            (start, end)
        })
        .filter(|(start, end)| start < end)
        .enumerate()
        .map(|(index, (start, end))| ChunkPlan {
            index,
            pcm_range: start..end,
            reference_text: chars[text_at(start)..text_at(end)].iter().collect(),
        })
        .collect()
}

/// Merge per-chunk results in the given order.
///
/// Words and sentences are concatenated; the five aggregate scores are the
/// unweighted mean across chunks.
pub fn merge_results(results: Vec<PronunciationAssessmentResult>) -> PronunciationAssessmentResult {
    let count = results.len();
    if count == 0 {
        return PronunciationAssessmentResult::zeroed();
    }

    let mean = |score: fn(&PronunciationAssessmentResult) -> f64| {
        clamp_score(results.iter().map(score).sum::<f64>() / count as f64)
    };

    let accuracy_score = mean(|r| r.accuracy_score);
    let fluency_score = mean(|r| r.fluency_score);
    let completeness_score = mean(|r| r.completeness_score);
    let pronunciation_score = mean(|r| r.pronunciation_score);
    let tone_score = mean(|r| r.tone_score);

    let has_sentences = results.iter().any(|r| r.sentences.is_some());
    let mut words = Vec::new();
    let mut sentences = Vec::new();
    for result in results {
        words.extend(result.words);
        sentences.extend(result.sentences.unwrap_or_default());
    }

    PronunciationAssessmentResult {
        accuracy_score,
        fluency_score,
        completeness_score,
        pronunciation_score,
        tone_score,
        words,
        sentences: has_sentences.then_some(sentences),
    }
}

/// Chapter-category assessor that splits clips longer than the provider limit.
#[derive(Clone)]
pub struct ChunkedAssessor {
    assessor: Arc<dyn PronunciationAssessor>,
    language: Language,
    ceiling_bytes: usize,
}

impl std::fmt::Debug for ChunkedAssessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkedAssessor")
            .field("assessor", &self.assessor.name())
            .field("language", &self.language)
            .field("ceiling_bytes", &self.ceiling_bytes)
            .finish()
    }
}

impl ChunkedAssessor {
    pub fn new(
        assessor: Arc<dyn PronunciationAssessor>,
        language: Language,
        ceiling: Duration,
    ) -> Self {
        let ceiling_bytes =
            ((ceiling.as_secs_f64() * PCM_BYTES_PER_SECOND as f64) as usize) & !1;
        Self {
            assessor,
            language,
            ceiling_bytes,
        }
    }

    /// Use the language and ceiling from the provider configuration.
    pub fn from_config(assessor: Arc<dyn PronunciationAssessor>, config: &IseConfig) -> Self {
        Self {
            assessor,
            language: config.language,
            ceiling_bytes: config.chapter_ceiling_bytes(),
        }
    }

    /// Override the language for the next assessments.
    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    pub fn ceiling_bytes(&self) -> usize {
        self.ceiling_bytes
    }

    /// Assess a chapter-category clip of any length.
    ///
    /// Clips at or under the ceiling go to the provider unchanged. Longer
    /// clips are split; failed chunks are logged and left out of the merge,
    /// and the call fails only when no chunk succeeds.
    pub async fn assess_long_audio(
        &self,
        audio: Bytes,
        reference_text: &str,
    ) -> AssessmentResult<PronunciationAssessmentResult> {
        let split = audio::split_wav(audio.clone());
        let pcm = split.pcm;

        if pcm.len() <= self.ceiling_bytes {
            return self
                .assessor
                .assess(audio, reference_text, self.language, AssessmentCategory::Chapter)
                .await;
        }

        let plans = plan_chunks(pcm.len(), reference_text, self.ceiling_bytes);
        let attempted = plans.len();
        info!(
            "Splitting {:.1}s of audio into {} chunks for {}",
            pcm_duration(pcm.len()).as_secs_f64(),
            attempted,
            self.assessor.name()
        );

        let requests = plans.iter().map(|plan| {
            let buffer = audio::with_header(split.header.as_ref(), &pcm[plan.pcm_range.clone()]);
            self.assessor.assess(
                buffer,
                &plan.reference_text,
                self.language,
                AssessmentCategory::Chapter,
            )
        });
        let outcomes = join_all(requests).await;

        let mut successes = Vec::with_capacity(attempted);
        for (plan, outcome) in plans.iter().zip(outcomes) {
            match outcome {
                Ok(result) => successes.push(result),
                Err(e) => warn!(
                    "Chunk {}/{} ({:.1}s) failed and is excluded from the merge: {}",
                    plan.index + 1,
                    attempted,
                    pcm_duration(plan.pcm_range.len()).as_secs_f64(),
                    e
                ),
            }
        }

        if successes.is_empty() {
            return Err(AssessmentError::AllChunksFailed { attempted });
        }

        if successes.len() < attempted {
            warn!(
                "Merging {} of {} chunks; scores cover only the successful chunks",
                successes.len(),
                attempted
            );
        }

        Ok(merge_results(successes))
    }
}
