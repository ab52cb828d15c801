use axum::{
    extract::{Multipart, State, multipart::MultipartError},
    http::StatusCode,
    response::Json,
};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info};

use crate::core::assessment::{
    AssessmentCategory, Language, PronunciationAssessmentResult, audio::pcm_duration,
};
use crate::errors::{AppError, AppResult};
use crate::state::AppState;

/// Fields of an assessment upload.
#[derive(Debug, Default)]
struct AssessForm {
    audio: Option<Bytes>,
    reference_text: Option<String>,
    category: Option<String>,
    language: Option<String>,
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(e.body_text())
    } else {
        AppError::BadRequest(format!("Invalid multipart body: {}", e.body_text()))
    }
}

async fn read_form(mut multipart: Multipart) -> AppResult<AssessForm> {
    let mut form = AssessForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "audio" => form.audio = Some(field.bytes().await.map_err(multipart_error)?),
            "referenceText" | "reference_text" => {
                form.reference_text = Some(field.text().await.map_err(multipart_error)?)
            }
            "category" => form.category = Some(field.text().await.map_err(multipart_error)?),
            "language" => form.language = Some(field.text().await.map_err(multipart_error)?),
            other => debug!("Ignoring multipart field '{}'", other),
        }
    }

    Ok(form)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Assess an uploaded clip against its reference text
///
/// Multipart fields:
/// - `audio`: 16 kHz mono 16-bit PCM, raw or with a WAV header
/// - `referenceText`: the text the speaker read
/// - `category` (optional): syllable, word, sentence (default) or chapter
/// - `language` (optional): e.g. `zh-CN` or `en`; defaults to the configured language
///
/// Chapter uploads longer than the provider limit are split and merged.
pub async fn assess_handler(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> AppResult<Json<PronunciationAssessmentResult>> {
    let form = read_form(multipart).await?;

    let audio = form
        .audio
        .filter(|a| !a.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing required field 'audio'".to_string()))?;
    let reference_text = non_empty(form.reference_text).ok_or_else(|| {
        AppError::BadRequest("Missing required field 'referenceText'".to_string())
    })?;

    let category = match non_empty(form.category) {
        Some(value) => value
            .parse::<AssessmentCategory>()
            .map_err(|e| AppError::BadRequest(e.to_string()))?,
        None => AssessmentCategory::default(),
    };
    let language = match non_empty(form.language) {
        Some(value) => value
            .parse::<Language>()
            .map_err(|e| AppError::BadRequest(e.to_string()))?,
        None => state.ise.language,
    };

    info!(
        "Assessment requested - category={}, language={:?}, audio={} bytes (~{:.1}s), text={} chars",
        category,
        language,
        audio.len(),
        pcm_duration(audio.len()).as_secs_f64(),
        reference_text.chars().count()
    );

    let result = match category {
        AssessmentCategory::Chapter => {
            state
                .chunked_assessor(language)
                .assess_long_audio(audio, &reference_text)
                .await?
        }
        _ => {
            state
                .assessor
                .assess(audio, &reference_text, language, category)
                .await?
        }
    };

    Ok(Json(result))
}
