//! Assessment Integration Tests
//!
//! Drives the real WebSocket client and the long-audio orchestrator against
//! a local mock of the ISE provider.

mod fixtures;
mod mock_providers;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::timeout;

use fixtures::{pcm_len, sine_bytes, wav_bytes};
use ise_gateway::core::assessment::{
    AssessmentCategory, AssessmentError, ChunkedAssessor, ErrorKind, IseClient, IseConfig,
    Language, PronunciationAssessmentResult, PronunciationAssessor,
};
use mock_providers::{IseMockServer, MockBehavior};

const SENTENCE_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?><xml_result><read_sentence lan="cn" type="study" version="7,0,0,1024"><rec_paper><read_sentence content="你好。" total_score="82" accuracy_score="81" fluency_score="77" integrity_score="100" tone_score="95" is_rejected="false"><sentence content="你好。" total_score="82"><word content="你" dp_message="0" total_score="80"><syll content="ni3" dp_message="0" rec_node_type="paper"><phone content="n" perr_msg="0" rec_node_type="paper"/><phone content="i" is_yun="1" perr_msg="0" rec_node_type="paper"/></syll></word><word content="好" dp_message="0" total_score="84"><syll content="hao3" dp_message="0" rec_node_type="paper"><phone content="h" perr_msg="0" rec_node_type="paper"/><phone content="ao" is_yun="1" perr_msg="2" rec_node_type="paper"/></syll></word></sentence></read_sentence></rec_paper></read_sentence></xml_result>"#;

const REJECTED_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?><xml_result><read_sentence lan="cn" type="study" version="7,0,0,1024"><rec_paper><read_sentence content="你好。" total_score="35" is_rejected="true" except_info="28676"><sentence content="你好。" total_score="35"></sentence></read_sentence></rec_paper></read_sentence></xml_result>"#;

fn client_for(server: &IseMockServer) -> IseClient {
    let config = IseConfig::new("test-app", "test-key", "test-secret")
        .with_endpoint(server.endpoint())
        .with_session_timeout(Duration::from_secs(5));
    IseClient::new(config).unwrap()
}

async fn assess_sentence(
    client: &IseClient,
    audio: Vec<u8>,
) -> Result<PronunciationAssessmentResult, AssessmentError> {
    timeout(
        Duration::from_secs(10),
        client.assess_clip(
            Bytes::from(audio),
            "你好。",
            Language::Chinese,
            AssessmentCategory::Sentence,
        ),
    )
    .await
    .expect("assessment did not finish")
}

#[tokio::test]
async fn test_connection_url_is_signed() {
    let server = IseMockServer::start(MockBehavior::Respond {
        xml: SENTENCE_XML.to_string(),
        fragments: 1,
    })
    .await;
    let client = client_for(&server);

    assess_sentence(&client, sine_bytes(440.0, 0.2, 0.5))
        .await
        .unwrap();

    let sessions = server.sessions();
    assert_eq!(sessions.len(), 1);
    let uri = &sessions[0].uri;
    assert!(uri.starts_with("/v2/open-ise?"), "unexpected uri {uri}");
    assert!(uri.contains("authorization="));
    assert!(uri.contains("date="));
    assert!(uri.contains("host=127.0.0.1"));
}

#[tokio::test]
async fn test_handshake_then_ordered_audio_frames() {
    let server = IseMockServer::start(MockBehavior::Respond {
        xml: SENTENCE_XML.to_string(),
        fragments: 1,
    })
    .await;
    let client = client_for(&server);
    let pcm = sine_bytes(440.0, 0.5, 0.5);
    assert_eq!(pcm.len(), 16000);

    assess_sentence(&client, pcm.clone()).await.unwrap();

    let session = server.sessions().remove(0);
    let handshake = session.handshake().unwrap();
    assert_eq!(handshake["business"]["cmd"], "ssb");
    assert_eq!(handshake["common"]["app_id"], "test-app");
    assert_eq!(handshake["business"]["category"], "read_sentence");
    assert_eq!(handshake["business"]["ent"], "cn_vip");
    assert_eq!(session.reference_text(), "你好。");

    // 16000 bytes in 1280-byte frames
    let frames = session.audio_frames();
    assert_eq!(frames.len(), 13);
    assert!(frames.iter().all(|f| f["business"]["cmd"] == "auw"));
    assert_eq!(frames[0]["business"]["aus"], 1);
    assert_eq!(frames[5]["business"]["aus"], 2);
    assert_eq!(frames[12]["business"]["aus"], 4);
    assert!(frames[..12].iter().all(|f| f["data"]["status"] == 0));
    assert_eq!(frames[12]["data"]["status"], 2);

    assert_eq!(session.pcm(), pcm);
}

#[tokio::test]
async fn test_wav_header_is_not_streamed() {
    let server = IseMockServer::start(MockBehavior::Respond {
        xml: SENTENCE_XML.to_string(),
        fragments: 1,
    })
    .await;
    let client = client_for(&server);
    let pcm = sine_bytes(220.0, 0.1, 0.5);

    assess_sentence(&client, wav_bytes(&pcm)).await.unwrap();

    assert_eq!(server.sessions()[0].pcm(), pcm);
}

#[tokio::test]
async fn test_fragmented_result_is_parsed() {
    let server = IseMockServer::start(MockBehavior::Respond {
        xml: SENTENCE_XML.to_string(),
        fragments: 3,
    })
    .await;
    let client = client_for(&server);

    let result = assess_sentence(&client, sine_bytes(440.0, 0.3, 0.5))
        .await
        .unwrap();

    assert_eq!(result.pronunciation_score, 82.0);
    assert_eq!(result.accuracy_score, 81.0);
    assert_eq!(result.fluency_score, 77.0);
    assert_eq!(result.completeness_score, 100.0);
    assert_eq!(result.tone_score, 95.0);

    let texts: Vec<_> = result.words.iter().map(|w| w.text.as_str()).collect();
    assert_eq!(texts, ["你", "好"]);
    assert_eq!(result.words[0].error_kind, ErrorKind::None);
    assert_eq!(result.words[0].tone_score, Some(100.0));
    assert_eq!(result.words[1].tone_score, Some(40.0));

    let sentences = result.sentences.unwrap();
    assert_eq!(sentences.len(), 1);
    assert_eq!(sentences[0].score, 82.0);
}

#[tokio::test]
async fn test_provider_error_code() {
    let server = IseMockServer::start(MockBehavior::ProviderError {
        code: 10165,
        message: "invalid handle".to_string(),
    })
    .await;
    let client = client_for(&server);

    let err = assess_sentence(&client, sine_bytes(440.0, 0.2, 0.5))
        .await
        .unwrap_err();

    match err {
        AssessmentError::ProviderError { code, message } => {
            assert_eq!(code, 10165);
            assert_eq!(message, "invalid handle");
        }
        other => panic!("expected provider error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_rejected_audio_returns_zero_result() {
    let server = IseMockServer::start(MockBehavior::Respond {
        xml: REJECTED_XML.to_string(),
        fragments: 2,
    })
    .await;
    let client = client_for(&server);

    let result = assess_sentence(&client, sine_bytes(440.0, 0.2, 0.5))
        .await
        .unwrap();

    assert!(result.is_empty());
    assert_eq!(result.pronunciation_score, 0.0);
}

#[tokio::test]
async fn test_close_without_result_is_unparseable() {
    let server = IseMockServer::start(MockBehavior::CloseWithoutResult).await;
    let client = client_for(&server);

    let err = assess_sentence(&client, sine_bytes(440.0, 0.2, 0.5))
        .await
        .unwrap_err();

    assert!(
        matches!(err, AssessmentError::UnparseableResult(_)),
        "got {err:?}"
    );
}

#[tokio::test]
async fn test_partial_result_then_close_frame_is_parsed() {
    let server = IseMockServer::start(MockBehavior::PartialThenClose {
        xml: SENTENCE_XML.to_string(),
        fragments: 2,
    })
    .await;
    let client = client_for(&server);

    let result = assess_sentence(&client, sine_bytes(440.0, 0.2, 0.5))
        .await
        .unwrap();

    assert_eq!(result.pronunciation_score, 82.0);
    assert_eq!(result.words.len(), 2);
}

#[tokio::test]
async fn test_partial_result_then_dropped_connection_is_parsed() {
    let server = IseMockServer::start(MockBehavior::PartialThenDrop {
        xml: SENTENCE_XML.to_string(),
        fragments: 1,
    })
    .await;
    let client = client_for(&server);

    let result = assess_sentence(&client, sine_bytes(440.0, 0.2, 0.5))
        .await
        .unwrap();

    assert_eq!(result.pronunciation_score, 82.0);
    assert_eq!(result.tone_score, 95.0);
}

#[tokio::test]
async fn test_dropped_connection_without_result_is_unparseable() {
    let server = IseMockServer::start(MockBehavior::DropWithoutResult).await;
    let client = client_for(&server);

    let err = assess_sentence(&client, sine_bytes(440.0, 0.2, 0.5))
        .await
        .unwrap_err();

    assert!(
        matches!(err, AssessmentError::UnparseableResult(_)),
        "got {err:?}"
    );
}

#[tokio::test]
async fn test_silent_provider_times_out() {
    let server = IseMockServer::start(MockBehavior::Hang).await;
    let config = IseConfig::new("test-app", "test-key", "test-secret")
        .with_endpoint(server.endpoint())
        .with_session_timeout(Duration::from_millis(300));
    let client = IseClient::new(config).unwrap();

    let err = assess_sentence(&client, sine_bytes(440.0, 0.2, 0.5))
        .await
        .unwrap_err();

    assert_eq!(err, AssessmentError::ProtocolTimeout(Duration::from_millis(300)));
}

#[tokio::test]
async fn test_unreachable_endpoint_fails_to_connect() {
    let config = IseConfig::new("test-app", "test-key", "test-secret")
        .with_endpoint("ws://127.0.0.1:1/v2/open-ise");
    let client = IseClient::new(config).unwrap();

    let err = assess_sentence(&client, sine_bytes(440.0, 0.2, 0.5))
        .await
        .unwrap_err();

    assert!(
        matches!(err, AssessmentError::ConnectionFailed(_)),
        "got {err:?}"
    );
}

#[tokio::test]
async fn test_long_chapter_is_split_and_merged_in_order() {
    let server = IseMockServer::start(MockBehavior::EchoReference).await;
    let client: Arc<dyn PronunciationAssessor> = Arc::new(client_for(&server));
    let chunked = ChunkedAssessor::new(client, Language::Chinese, Duration::from_secs(1));

    let text = "一二三四五六七八九十";
    let pcm = sine_bytes(330.0, 2.5, 0.5);
    assert_eq!(pcm.len(), pcm_len(2.5));

    let result = timeout(
        Duration::from_secs(10),
        chunked.assess_long_audio(Bytes::from(pcm.clone()), text),
    )
    .await
    .expect("assessment did not finish")
    .unwrap();

    assert_eq!(server.connection_count(), 3);

    let merged: String = result.words.iter().map(|w| w.text.as_str()).collect();
    assert_eq!(merged, text);
    assert_eq!(result.sentences.as_ref().map(Vec::len), Some(3));
    assert_eq!(result.pronunciation_score, 80.0);
    assert_eq!(result.tone_score, 90.0);

    let sessions = server.sessions();
    let mut texts: Vec<_> = sessions.iter().map(|s| s.reference_text()).collect();
    texts.sort();
    let mut expected = vec!["一二三", "四五六七", "八九十"];
    expected.sort();
    assert_eq!(texts, expected);

    assert!(
        sessions
            .iter()
            .all(|s| s.handshake().unwrap()["business"]["category"] == "read_chapter")
    );
    let streamed: usize = sessions.iter().map(|s| s.pcm().len()).sum();
    assert_eq!(streamed, pcm.len());
}

#[tokio::test]
async fn test_short_chapter_uses_one_session() {
    let server = IseMockServer::start(MockBehavior::EchoReference).await;
    let client: Arc<dyn PronunciationAssessor> = Arc::new(client_for(&server));
    let chunked = ChunkedAssessor::new(client, Language::Chinese, Duration::from_secs(1));

    let result = chunked
        .assess_long_audio(Bytes::from(sine_bytes(330.0, 0.5, 0.5)), "春眠不觉晓")
        .await
        .unwrap();

    assert_eq!(server.connection_count(), 1);
    assert_eq!(result.words.len(), 5);
}
