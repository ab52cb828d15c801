//! Conversion of the provider's XML scoring payload into assessment records.
//!
//! # Payload layout
//!
//! ```text
//! xml_result
//! └── read_sentence                (wrapper, no scores)
//!     └── rec_paper
//!         └── read_sentence        total_score, fluency_score, tone_score, ...
//!             └── sentence         content, total_score
//!                 └── word         content, dp_message, total_score?
//!                     └── syll     content, dp_message, rec_node_type
//!                         └── phone  content, perr_msg, is_yun
//! ```
//!
//! The wrapper and the scored element share a tag name (the category), so the
//! root is chosen as the first instance carrying `total_score`.
//!
//! # Bitmasks
//!
//! `dp_message` (word/syllable): 16 omission, 32 insertion, 64 repetition,
//! 128 mispronunciation. `perr_msg` (phone): bit 1 vowel error, bit 2 tone error.
//!
//! When the provider leaves out item or aggregate scores they are derived from
//! these bitmasks. Parsing is a pure function of its input.

use tracing::debug;

use super::types::{
    AssessmentCategory, AssessmentError, AssessmentResult, ErrorKind, PhoneErrorKind,
    PronunciationAssessmentResult, SentenceResult, WordResult, clamp_score,
};
use super::xml::{Element, find_elements};

/// `dp_message` bits.
pub mod dp {
    pub const OMISSION: u32 = 16;
    pub const INSERTION: u32 = 32;
    pub const REPETITION: u32 = 64;
    pub const MISPRONUNCIATION: u32 = 128;
}

/// `perr_msg` bits.
pub mod perr {
    pub const VOWEL: u32 = 1;
    pub const TONE: u32 = 2;
}

const OMISSION_SCORE: f64 = 0.0;
const MISPRONUNCIATION_SCORE: f64 = 30.0;
const INSERTION_SCORE: f64 = 50.0;
const REPETITION_SCORE: f64 = 70.0;
const PHONE_ERROR_DEDUCTION: f64 = 20.0;

const TONE_CORRECT_SCORE: f64 = 100.0;
const TONE_ERROR_SCORE: f64 = 40.0;
const TONE_AND_VOWEL_ERROR_SCORE: f64 = 20.0;

const SILENCE_MARKERS: [&str; 3] = ["sil", "silv", "fil"];

// =============================================================================
// Bitmask rules
// =============================================================================

/// Error kind from a `dp_message` mask.
///
/// Priority: mispronunciation, repetition, insertion, omission.
pub fn error_kind_from_dp(mask: u32) -> ErrorKind {
    if mask & dp::MISPRONUNCIATION != 0 {
        ErrorKind::Mispronunciation
    } else if mask & dp::REPETITION != 0 {
        ErrorKind::Repetition
    } else if mask & dp::INSERTION != 0 {
        ErrorKind::Insertion
    } else if mask & dp::OMISSION != 0 {
        ErrorKind::Omission
    } else {
        ErrorKind::None
    }
}

/// Item score when the provider gave none.
///
/// Omission wins over every other flag, then mispronunciation, insertion and
/// repetition. A clean item loses a flat amount per phone with a vowel error.
pub fn derive_item_score(mask: u32, vowel_error_phones: usize) -> f64 {
    if mask & dp::OMISSION != 0 {
        OMISSION_SCORE
    } else if mask & dp::MISPRONUNCIATION != 0 {
        MISPRONUNCIATION_SCORE
    } else if mask & dp::INSERTION != 0 {
        INSERTION_SCORE
    } else if mask & dp::REPETITION != 0 {
        REPETITION_SCORE
    } else {
        clamp_score(100.0 - PHONE_ERROR_DEDUCTION * vowel_error_phones as f64)
    }
}

/// Tone score of one syllable from its rhyme phone's `perr_msg`.
pub fn syllable_tone_score(rhyme_perr: u32, omitted: bool) -> f64 {
    if omitted {
        return 0.0;
    }
    match (rhyme_perr & perr::TONE != 0, rhyme_perr & perr::VOWEL != 0) {
        (false, _) => TONE_CORRECT_SCORE,
        (true, false) => TONE_ERROR_SCORE,
        (true, true) => TONE_AND_VOWEL_ERROR_SCORE,
    }
}

/// Ordering used to pick the worst phone when no rhyme is flagged.
fn tone_severity(mask: u32) -> u8 {
    match (mask & perr::TONE != 0, mask & perr::VOWEL != 0) {
        (true, true) => 3,
        (true, false) => 2,
        (false, true) => 1,
        (false, false) => 0,
    }
}

fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

// =============================================================================
// Syllables and words
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct SyllableScore {
    dp: u32,
    tone: f64,
    vowel_error: bool,
    tone_error: bool,
    vowel_error_phones: usize,
}

fn is_silence(element: &Element<'_>) -> bool {
    if element.attr("rec_node_type").as_deref() == Some("sil") {
        return true;
    }
    element
        .attr("content")
        .is_some_and(|c| SILENCE_MARKERS.contains(&c.trim()))
}

/// `word_dp` is the enclosing word's mask; an omitted word omits every syllable.
fn score_syllable(syll: &Element<'_>, word_dp: u32) -> SyllableScore {
    let mask = syll.attr_u32("dp_message").unwrap_or(0);
    let phones = syll.descendants("phone");
    let perrs: Vec<(bool, u32)> = phones
        .iter()
        .map(|p| {
            let is_rhyme = p.attr("is_yun").as_deref() == Some("1");
            (is_rhyme, p.attr_u32("perr_msg").unwrap_or(0))
        })
        .collect();

    let rhyme_perr = perrs
        .iter()
        .find(|(is_rhyme, _)| *is_rhyme)
        .map(|(_, mask)| *mask)
        .unwrap_or_else(|| {
            perrs
                .iter()
                .map(|(_, mask)| *mask)
                .max_by_key(|mask| tone_severity(*mask))
                .unwrap_or(0)
        });

    SyllableScore {
        dp: mask,
        tone: syllable_tone_score(rhyme_perr, (mask | word_dp) & dp::OMISSION != 0),
        vowel_error: perrs.iter().any(|(_, m)| m & perr::VOWEL != 0),
        tone_error: perrs.iter().any(|(_, m)| m & perr::TONE != 0),
        vowel_error_phones: perrs.iter().filter(|(_, m)| m & perr::VOWEL != 0).count(),
    }
}

fn score_word(word: &Element<'_>) -> Option<WordResult> {
    if is_silence(word) {
        return None;
    }

    let word_dp = word.attr_u32("dp_message").unwrap_or(0);
    let all_sylls = word.descendants("syll");
    let syllables: Vec<SyllableScore> = all_sylls
        .iter()
        .filter(|s| !is_silence(s))
        .map(|s| score_syllable(s, word_dp))
        .collect();

    // A word made only of silence is a pause marker, not a reference item.
    if syllables.is_empty() && !all_sylls.is_empty() {
        return None;
    }

    let mask = syllables
        .iter()
        .fold(word_dp, |acc, s| acc | s.dp);

    let accuracy = match word.attr_f64("total_score") {
        Some(score) => clamp_score(score),
        None => derive_item_score(
            mask,
            syllables.iter().map(|s| s.vowel_error_phones).sum(),
        ),
    };

    let (tone_score, phone_error_kind) = if syllables.is_empty() {
        (None, None)
    } else {
        (
            mean(syllables.iter().map(|s| s.tone)).map(clamp_score),
            Some(PhoneErrorKind::from_flags(
                syllables.iter().any(|s| s.vowel_error),
                syllables.iter().any(|s| s.tone_error),
            )),
        )
    };

    Some(WordResult {
        text: word.attr("content").unwrap_or_default(),
        accuracy_score: accuracy,
        error_kind: error_kind_from_dp(mask),
        tone_score,
        phone_error_kind,
    })
}

fn score_sentence(sentence: &Element<'_>) -> SentenceResult {
    let score = sentence.attr_f64("total_score").unwrap_or_else(|| {
        let words: Vec<WordResult> = sentence
            .descendants("word")
            .iter()
            .filter_map(score_word)
            .collect();
        mean(
            words
                .iter()
                .filter(|w| w.error_kind != ErrorKind::Insertion)
                .map(|w| w.accuracy_score),
        )
        .unwrap_or(0.0)
    });

    SentenceResult {
        text: sentence.attr("content").unwrap_or_default(),
        score: clamp_score(score),
    }
}

// =============================================================================
// Aggregates
// =============================================================================

/// Root-level scores as reported; `None` when the attribute is absent.
#[derive(Debug, Clone, Copy, Default)]
struct ReportedScores {
    total: Option<f64>,
    accuracy: Option<f64>,
    fluency: Option<f64>,
    completeness: Option<f64>,
    tone: Option<f64>,
}

impl ReportedScores {
    fn from_root(root: &Element<'_>) -> Self {
        Self {
            total: root.attr_f64("total_score"),
            accuracy: root
                .attr_f64("accuracy_score")
                .or_else(|| root.attr_f64("phone_score")),
            fluency: root.attr_f64("fluency_score"),
            completeness: root.attr_f64("integrity_score"),
            tone: root.attr_f64("tone_score"),
        }
    }

    fn all_zero(&self) -> bool {
        [self.total, self.fluency, self.tone, self.completeness]
            .iter()
            .all(|s| s.unwrap_or(0.0) == 0.0)
    }
}

/// Aggregates recomputed from item scores.
#[derive(Debug, Clone, Copy)]
struct DerivedScores {
    accuracy: f64,
    completeness: f64,
    tone: f64,
}

impl DerivedScores {
    fn from_words(words: &[WordResult]) -> Option<Self> {
        let aligned: Vec<&WordResult> = words
            .iter()
            .filter(|w| w.error_kind != ErrorKind::Insertion)
            .collect();
        if aligned.is_empty() {
            return None;
        }

        let accuracy = mean(aligned.iter().map(|w| w.accuracy_score)).unwrap_or(0.0);
        let present = aligned
            .iter()
            .filter(|w| w.error_kind != ErrorKind::Omission)
            .count();
        let completeness = present as f64 / aligned.len() as f64 * 100.0;
        let tone = mean(aligned.iter().filter_map(|w| w.tone_score)).unwrap_or(accuracy);

        Some(Self {
            accuracy,
            completeness,
            tone,
        })
    }
}

// =============================================================================
// Entry point
// =============================================================================

fn select_root<'a>(xml: &'a str, category: AssessmentCategory) -> Option<Element<'a>> {
    let candidates = find_elements(xml, category.xml_tag());
    candidates
        .iter()
        .find(|e| e.has_attr("total_score"))
        .or_else(|| candidates.first())
        .copied()
}

/// Parse the decoded XML payload for the given category.
pub fn parse(xml: &str, category: AssessmentCategory) -> AssessmentResult<PronunciationAssessmentResult> {
    let root = select_root(xml, category).ok_or_else(|| {
        AssessmentError::UnparseableResult(format!(
            "no <{}> element in provider result",
            category.xml_tag()
        ))
    })?;

    if root.attr("is_rejected").is_some_and(|v| v.trim() == "true") {
        debug!(
            "Provider rejected the recording (except_info={:?})",
            root.attr("except_info")
        );
        return Ok(PronunciationAssessmentResult::zeroed());
    }

    let words: Vec<WordResult> = root
        .descendants("word")
        .iter()
        .filter_map(score_word)
        .collect();

    let sentences = match category {
        AssessmentCategory::Sentence | AssessmentCategory::Chapter => Some(
            root.descendants("sentence")
                .iter()
                .map(score_sentence)
                .collect(),
        ),
        AssessmentCategory::Syllable | AssessmentCategory::Word => None,
    };

    let reported = ReportedScores::from_root(&root);
    let derived = DerivedScores::from_words(&words);

    let result = match derived {
        Some(derived) if reported.all_zero() => {
            debug!("Root scores are all zero; recomputing from {} words", words.len());
            PronunciationAssessmentResult {
                accuracy_score: derived.accuracy,
                fluency_score: derived.accuracy,
                completeness_score: derived.completeness,
                pronunciation_score: derived.accuracy,
                tone_score: derived.tone,
                words,
                sentences,
            }
        }
        derived => PronunciationAssessmentResult {
            accuracy_score: pick(reported.accuracy, derived.map(|d| d.accuracy)),
            fluency_score: pick(reported.fluency, derived.map(|d| d.accuracy)),
            completeness_score: pick(reported.completeness, derived.map(|d| d.completeness)),
            pronunciation_score: pick(reported.total, derived.map(|d| d.accuracy)),
            tone_score: pick(reported.tone, derived.map(|d| d.tone)),
            words,
            sentences,
        },
    };

    Ok(clamp_all(result))
}

/// Reported value when present, otherwise the derived one.
fn pick(reported: Option<f64>, derived: Option<f64>) -> f64 {
    reported.or(derived).unwrap_or(0.0)
}

fn clamp_all(mut result: PronunciationAssessmentResult) -> PronunciationAssessmentResult {
    result.accuracy_score = clamp_score(result.accuracy_score);
    result.fluency_score = clamp_score(result.fluency_score);
    result.completeness_score = clamp_score(result.completeness_score);
    result.pronunciation_score = clamp_score(result.pronunciation_score);
    result.tone_score = clamp_score(result.tone_score);
    result
}
