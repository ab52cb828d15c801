//! ISE WebSocket message types.
//!
//! Three outbound shapes (handshake, audio) and one inbound shape (result),
//! all JSON text frames. Audio and the XML result travel base64-encoded
//! inside the JSON.

use base64::prelude::*;
use serde::{Deserialize, Serialize};

use super::types::{AssessmentCategory, AssessmentError, AssessmentResult, Language};

/// Byte-order mark the provider requires in front of the reference text.
pub const UTF8_BOM: char = '\u{FEFF}';

/// Punctuation that ends a sentence in chapter/sentence reference texts.
const SENTENCE_TERMINATORS: [char; 4] = ['。', '！', '？', '；'];

/// Separators between items of a word list.
const ITEM_SEPARATORS: [char; 5] = ['，', ',', '、', '；', ';'];

// =============================================================================
// Frame status
// =============================================================================

/// `data.status` value of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// More frames follow (also used by the handshake).
    Continue,
    /// Last frame of the stream.
    Final,
}

impl FrameStatus {
    pub fn code(&self) -> u8 {
        match self {
            Self::Continue => 0,
            Self::Final => 2,
        }
    }

    fn from_code(code: u8) -> Self {
        if code == 2 { Self::Final } else { Self::Continue }
    }
}

impl Serialize for FrameStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for FrameStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u8::deserialize(deserializer).map(Self::from_code)
    }
}

/// Position of an audio frame in the upload (`business.aus`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioPosition {
    First,
    Middle,
    Last,
}

impl AudioPosition {
    pub fn code(&self) -> u8 {
        match self {
            Self::First => 1,
            Self::Middle => 2,
            Self::Last => 4,
        }
    }

    /// Position of chunk `index` in a stream of `total` chunks.
    ///
    /// The final chunk is always `Last`, even when it is also the first.
    pub fn for_index(index: usize, total: usize) -> Self {
        if index + 1 >= total {
            Self::Last
        } else if index == 0 {
            Self::First
        } else {
            Self::Middle
        }
    }
}

impl Serialize for AudioPosition {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

// =============================================================================
// Outbound: handshake
// =============================================================================

/// First frame of every session: identity, business parameters, reference text.
#[derive(Debug, Clone, Serialize)]
pub struct HandshakeFrame {
    pub common: CommonParams,
    pub business: HandshakeBusiness,
    pub data: HandshakeData,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommonParams {
    pub app_id: String,
}

/// Business parameters of the `ssb` command.
///
/// Everything except `ent`, `category` and `text` is fixed.
#[derive(Debug, Clone, Serialize)]
pub struct HandshakeBusiness {
    pub sub: &'static str,
    pub ent: &'static str,
    pub category: &'static str,
    pub aue: &'static str,
    pub auf: &'static str,
    pub cmd: &'static str,
    pub text: String,
    pub tte: &'static str,
    pub rstcd: &'static str,
    pub group: &'static str,
    pub check_type: &'static str,
    pub rst: &'static str,
    pub ise_unite: &'static str,
    pub plev: &'static str,
    pub extra_ability: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct HandshakeData {
    pub status: FrameStatus,
}

impl HandshakeFrame {
    /// Build the handshake for one assessment.
    pub fn new(
        app_id: &str,
        language: Language,
        category: AssessmentCategory,
        reference_text: &str,
    ) -> Self {
        Self {
            common: CommonParams {
                app_id: app_id.to_string(),
            },
            business: HandshakeBusiness {
                sub: "ise",
                ent: language.engine(),
                category: category.as_wire_str(),
                aue: "raw",
                auf: "audio/L16;rate=16000",
                cmd: "ssb",
                text: format_reference_text(reference_text, category),
                tte: "utf-8",
                rstcd: "utf8",
                group: "adult",
                check_type: "common",
                rst: "entirety",
                ise_unite: "1",
                plev: "0",
                extra_ability: "multi_dimension;syll_phone_err_msg",
            },
            data: HandshakeData {
                status: FrameStatus::Continue,
            },
        }
    }

    pub fn to_json(&self) -> AssessmentResult<String> {
        serde_json::to_string(self).map_err(|e| {
            AssessmentError::ConfigurationError(format!("Failed to encode handshake frame: {e}"))
        })
    }
}

// =============================================================================
// Outbound: audio
// =============================================================================

/// One chunk of PCM audio (`auw` command).
#[derive(Debug, Clone, Serialize)]
pub struct AudioFrame {
    pub business: AudioBusiness,
    pub data: AudioData,
}

#[derive(Debug, Clone, Serialize)]
pub struct AudioBusiness {
    pub cmd: &'static str,
    pub aus: AudioPosition,
}

#[derive(Debug, Clone, Serialize)]
pub struct AudioData {
    pub status: FrameStatus,
    /// Base64-encoded PCM bytes.
    pub data: String,
}

impl AudioFrame {
    pub fn new(position: AudioPosition, pcm: &[u8]) -> Self {
        let status = match position {
            AudioPosition::Last => FrameStatus::Final,
            _ => FrameStatus::Continue,
        };

        Self {
            business: AudioBusiness {
                cmd: "auw",
                aus: position,
            },
            data: AudioData {
                status,
                data: BASE64_STANDARD.encode(pcm),
            },
        }
    }

    pub fn is_final(&self) -> bool {
        self.data.status == FrameStatus::Final
    }

    pub fn to_json(&self) -> AssessmentResult<String> {
        serde_json::to_string(self).map_err(|e| {
            AssessmentError::ConfigurationError(format!("Failed to encode audio frame: {e}"))
        })
    }
}

/// Split PCM into frames of `frame_bytes`, marking first and last.
///
/// Empty input produces no frames.
pub fn audio_frames(pcm: &[u8], frame_bytes: usize) -> impl Iterator<Item = AudioFrame> + '_ {
    let frame_bytes = frame_bytes.max(1);
    let total = pcm.len().div_ceil(frame_bytes);
    pcm.chunks(frame_bytes)
        .enumerate()
        .map(move |(index, chunk)| AudioFrame::new(AudioPosition::for_index(index, total), chunk))
}

// =============================================================================
// Inbound: result
// =============================================================================

/// A result frame as received from the provider.
#[derive(Debug, Clone, Deserialize)]
pub struct RawProviderFrame {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub sid: Option<String>,
    #[serde(default)]
    pub data: Option<ResultData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResultData {
    pub status: FrameStatus,
    /// Base64 fragment of the XML payload.
    #[serde(default)]
    pub data: Option<String>,
}

impl RawProviderFrame {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn is_success(&self) -> bool {
        self.code == 0
    }

    /// Whether the provider marked this as the last frame of the result.
    pub fn is_final(&self) -> bool {
        self.data
            .as_ref()
            .is_some_and(|d| d.status == FrameStatus::Final)
    }

    /// The XML fragment carried by this frame, if any.
    pub fn fragment(&self) -> Option<&str> {
        self.data
            .as_ref()
            .and_then(|d| d.data.as_deref())
            .filter(|s| !s.is_empty())
    }

    /// Convert a non-zero code into the matching error.
    pub fn into_error(self) -> AssessmentError {
        AssessmentError::ProviderError {
            code: self.code,
            message: self.message,
        }
    }
}

/// Decode accumulated base64 fragments into the XML document.
///
/// Fragments are joined before decoding. If the joined text is not valid
/// base64 (each fragment padded on its own), they are decoded one by one.
pub fn decode_fragments(fragments: &[String]) -> AssessmentResult<String> {
    if fragments.is_empty() {
        return Err(AssessmentError::UnparseableResult(
            "connection closed before any result data arrived".to_string(),
        ));
    }

    let joined = fragments.concat();
    let bytes = match BASE64_STANDARD.decode(joined.as_bytes()) {
        Ok(bytes) => bytes,
        Err(_) => {
            let mut bytes = Vec::with_capacity(joined.len());
            for fragment in fragments {
                let decoded = BASE64_STANDARD.decode(fragment.as_bytes()).map_err(|e| {
                    AssessmentError::UnparseableResult(format!("invalid base64 in result: {e}"))
                })?;
                bytes.extend_from_slice(&decoded);
            }
            bytes
        }
    };

    String::from_utf8(bytes)
        .map_err(|e| AssessmentError::UnparseableResult(format!("result is not UTF-8: {e}")))
}

// =============================================================================
// Reference text
// =============================================================================

/// Split a reference text into the items the provider will score.
pub fn reference_segments(text: &str, category: AssessmentCategory) -> Vec<String> {
    match category {
        AssessmentCategory::Syllable => text
            .chars()
            .filter(|c| !c.is_whitespace() && !is_punctuation(*c))
            .map(String::from)
            .collect(),
        AssessmentCategory::Word => text
            .split(|c: char| c.is_whitespace() || ITEM_SEPARATORS.contains(&c))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        AssessmentCategory::Sentence | AssessmentCategory::Chapter => split_sentences(text),
    }
}

/// Split prose after each sentence terminator, keeping the terminator.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();

    for c in text.chars() {
        if c == '\n' || c == '\r' {
            push_trimmed(&mut sentences, &mut current);
            continue;
        }
        current.push(c);
        if SENTENCE_TERMINATORS.contains(&c) {
            push_trimmed(&mut sentences, &mut current);
        }
    }
    push_trimmed(&mut sentences, &mut current);

    sentences
}

fn push_trimmed(out: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
    current.clear();
}

/// Reference text as sent in the handshake: BOM + newline-joined segments.
pub fn format_reference_text(text: &str, category: AssessmentCategory) -> String {
    let segments = reference_segments(text, category);
    let mut formatted = String::with_capacity(text.len() + segments.len() + 3);
    formatted.push(UTF8_BOM);
    formatted.push_str(&segments.join("\n"));
    formatted
}

fn is_punctuation(c: char) -> bool {
    c.is_ascii_punctuation()
        || SENTENCE_TERMINATORS.contains(&c)
        || ITEM_SEPARATORS.contains(&c)
        || matches!(c, '：' | '“' | '”' | '‘' | '’' | '（' | '）' | '《' | '》' | '…' | '—')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_handshake_shape() {
        let frame = HandshakeFrame::new(
            "app123",
            Language::Chinese,
            AssessmentCategory::Sentence,
            "今天天气很好。我们去公园吧！",
        );
        let json: Value = serde_json::from_str(&frame.to_json().unwrap()).unwrap();

        assert_eq!(json["common"]["app_id"], "app123");
        assert_eq!(json["business"]["sub"], "ise");
        assert_eq!(json["business"]["ent"], "cn_vip");
        assert_eq!(json["business"]["category"], "read_sentence");
        assert_eq!(json["business"]["cmd"], "ssb");
        assert_eq!(json["business"]["aue"], "raw");
        assert_eq!(json["business"]["auf"], "audio/L16;rate=16000");
        assert_eq!(json["business"]["rst"], "entirety");
        assert_eq!(json["business"]["ise_unite"], "1");
        assert_eq!(
            json["business"]["extra_ability"],
            "multi_dimension;syll_phone_err_msg"
        );
        assert_eq!(
            json["business"]["text"],
            "\u{FEFF}今天天气很好。\n我们去公园吧！"
        );
        assert_eq!(json["data"]["status"], 0);
    }

    #[test]
    fn test_format_syllable_items() {
        let text = format_reference_text("你 好，世界", AssessmentCategory::Syllable);
        assert_eq!(text, "\u{FEFF}你\n好\n世\n界");
    }

    #[test]
    fn test_format_word_items() {
        let text = format_reference_text("中国、北京 上海", AssessmentCategory::Word);
        assert_eq!(text, "\u{FEFF}中国\n北京\n上海");
    }

    #[test]
    fn test_split_sentences_keeps_punctuation() {
        let sentences = split_sentences("春天来了。花开了！你看见了吗？是的；走吧");
        assert_eq!(
            sentences,
            vec!["春天来了。", "花开了！", "你看见了吗？", "是的；", "走吧"]
        );
    }

    #[test]
    fn test_split_sentences_ignores_blank_lines() {
        let sentences = split_sentences("第一句。\n\n  第二句。  ");
        assert_eq!(sentences, vec!["第一句。", "第二句。"]);
    }

    #[test]
    fn test_audio_positions() {
        assert_eq!(AudioPosition::for_index(0, 3), AudioPosition::First);
        assert_eq!(AudioPosition::for_index(1, 3), AudioPosition::Middle);
        assert_eq!(AudioPosition::for_index(2, 3), AudioPosition::Last);
        assert_eq!(AudioPosition::for_index(0, 1), AudioPosition::Last);
    }

    #[test]
    fn test_audio_frames_split_and_mark() {
        let pcm: Vec<u8> = (0..10u8).collect();
        let frames: Vec<_> = audio_frames(&pcm, 4).collect();

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].business.aus, AudioPosition::First);
        assert_eq!(frames[1].business.aus, AudioPosition::Middle);
        assert_eq!(frames[2].business.aus, AudioPosition::Last);
        assert!(frames[2].is_final());
        assert!(!frames[0].is_final());

        let decoded: Vec<u8> = frames
            .iter()
            .flat_map(|f| BASE64_STANDARD.decode(&f.data.data).unwrap())
            .collect();
        assert_eq!(decoded, pcm);
    }

    #[test]
    fn test_audio_frame_json() {
        let frame = AudioFrame::new(AudioPosition::Last, &[1, 2, 3]);
        let json: Value = serde_json::from_str(&frame.to_json().unwrap()).unwrap();
        assert_eq!(json["business"]["cmd"], "auw");
        assert_eq!(json["business"]["aus"], 4);
        assert_eq!(json["data"]["status"], 2);
        assert_eq!(json["data"]["data"], "AQID");
    }

    #[test]
    fn test_audio_frames_empty() {
        assert_eq!(audio_frames(&[], 1280).count(), 0);
    }

    #[test]
    fn test_parse_result_frame() {
        let frame = RawProviderFrame::parse(
            r#"{"code":0,"message":"success","sid":"ise000","data":{"status":2,"data":"PHhtbD4="}}"#,
        )
        .unwrap();
        assert!(frame.is_success());
        assert!(frame.is_final());
        assert_eq!(frame.fragment(), Some("PHhtbD4="));
        assert_eq!(frame.sid.as_deref(), Some("ise000"));
    }

    #[test]
    fn test_parse_error_frame_without_data() {
        let frame =
            RawProviderFrame::parse(r#"{"code":10165,"message":"invalid handle"}"#).unwrap();
        assert!(!frame.is_success());
        assert!(!frame.is_final());
        assert_eq!(
            frame.into_error(),
            AssessmentError::ProviderError {
                code: 10165,
                message: "invalid handle".to_string()
            }
        );
    }

    #[test]
    fn test_parse_intermediate_frame() {
        let frame = RawProviderFrame::parse(r#"{"code":0,"data":{"status":1}}"#).unwrap();
        assert!(!frame.is_final());
        assert_eq!(frame.fragment(), None);
    }

    #[test]
    fn test_decode_fragments_concatenated() {
        let encoded = BASE64_STANDARD.encode("<xml_result>ok</xml_result>");
        let (a, b) = encoded.split_at(8);
        let xml = decode_fragments(&[a.to_string(), b.to_string()]).unwrap();
        assert_eq!(xml, "<xml_result>ok</xml_result>");
    }

    #[test]
    fn test_decode_fragments_individually_padded() {
        let a = BASE64_STANDARD.encode("<xml_res");
        let b = BASE64_STANDARD.encode("ult/>");
        let xml = decode_fragments(&[a, b]).unwrap();
        assert_eq!(xml, "<xml_result/>");
    }

    #[test]
    fn test_decode_fragments_empty() {
        assert!(matches!(
            decode_fragments(&[]),
            Err(AssessmentError::UnparseableResult(_))
        ));
    }

    #[test]
    fn test_decode_fragments_garbage() {
        assert!(matches!(
            decode_fragments(&["!!not base64!!".to_string()]),
            Err(AssessmentError::UnparseableResult(_))
        ));
    }
}
