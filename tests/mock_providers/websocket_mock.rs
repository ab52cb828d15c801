//! WebSocket Mock Server for the ISE provider

use base64::prelude::*;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

const UTF8_BOM: char = '\u{FEFF}';

/// What the server does once it has seen the final audio frame.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Reply with `xml`, base64-encoded and split over `fragments` frames
    Respond { xml: String, fragments: usize },
    /// Reply with a chapter document scoring every reference character
    EchoReference,
    /// Reply to the handshake with a non-zero code
    ProviderError { code: i64, message: String },
    /// Close the socket without sending a result
    CloseWithoutResult,
    /// Send `xml` as non-final fragments, then a close frame
    PartialThenClose { xml: String, fragments: usize },
    /// Send `xml` as non-final fragments, then drop the TCP connection
    PartialThenDrop { xml: String, fragments: usize },
    /// Drop the TCP connection without a close frame or any result
    DropWithoutResult,
    /// Read everything, answer nothing
    Hang,
}

/// Everything the server saw during one session.
#[derive(Debug, Clone, Default)]
pub struct RecordedSession {
    /// Request target of the upgrade, including the query string
    pub uri: String,
    /// Text frames in arrival order, parsed as JSON
    pub frames: Vec<Value>,
}

impl RecordedSession {
    pub fn handshake(&self) -> Option<&Value> {
        self.frames.first()
    }

    pub fn audio_frames(&self) -> &[Value] {
        self.frames.get(1..).unwrap_or_default()
    }

    /// Reference text from the handshake without the BOM.
    pub fn reference_text(&self) -> String {
        self.handshake()
            .and_then(|h| h["business"]["text"].as_str())
            .unwrap_or_default()
            .trim_start_matches(UTF8_BOM)
            .to_string()
    }

    /// Decoded PCM of all audio frames.
    pub fn pcm(&self) -> Vec<u8> {
        self.audio_frames()
            .iter()
            .filter_map(|f| f["data"]["data"].as_str())
            .flat_map(|data| BASE64_STANDARD.decode(data).unwrap_or_default())
            .collect()
    }
}

struct MockState {
    behavior: MockBehavior,
    sessions: Mutex<Vec<RecordedSession>>,
    connection_count: AtomicUsize,
}

/// Local ISE provider listening on an ephemeral port.
pub struct IseMockServer {
    addr: SocketAddr,
    state: Arc<MockState>,
    handle: JoinHandle<()>,
}

impl IseMockServer {
    pub async fn start(behavior: MockBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(MockState {
            behavior,
            sessions: Mutex::new(Vec::new()),
            connection_count: AtomicUsize::new(0),
        });

        let server_state = state.clone();
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = server_state.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, state).await {
                        eprintln!("Mock ISE connection error: {}", e);
                    }
                });
            }
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    /// `ws://` endpoint to point the client at.
    pub fn endpoint(&self) -> String {
        format!("ws://{}/v2/open-ise", self.addr)
    }

    pub fn sessions(&self) -> Vec<RecordedSession> {
        self.state.sessions.lock().clone()
    }

    pub fn connection_count(&self) -> usize {
        self.state.connection_count.load(Ordering::Relaxed)
    }
}

impl Drop for IseMockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn result_frame(sid: &str, status: u8, data: &str) -> Message {
    let frame = json!({
        "code": 0,
        "message": "success",
        "sid": sid,
        "data": { "status": status, "data": data },
    });
    Message::Text(frame.to_string().into())
}

/// Base64 of `xml` cut into `fragments` roughly equal pieces.
fn encode_fragments(xml: &str, fragments: usize) -> Vec<String> {
    let encoded = BASE64_STANDARD.encode(xml);
    let size = encoded.len().div_ceil(fragments.max(1)).max(1);
    encoded
        .as_bytes()
        .chunks(size)
        .map(|c| String::from_utf8_lossy(c).into_owned())
        .collect()
}

/// Chapter document with one sentence and one clean word per character.
pub fn echo_document(reference_text: &str) -> String {
    let content: String = reference_text.chars().filter(|c| !c.is_whitespace()).collect();
    let words: String = content
        .chars()
        .map(|c| {
            format!(
                r#"<word content="{c}" dp_message="0" total_score="80"><syll content="{c}" dp_message="0" rec_node_type="paper"><phone content="a" is_yun="1" perr_msg="0" rec_node_type="paper"/></syll></word>"#
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?><xml_result><read_chapter lan="cn" type="study" version="7,0,0,1024"><rec_paper><read_chapter content="{content}" total_score="80" accuracy_score="80" fluency_score="80" integrity_score="100" tone_score="90" is_rejected="false"><sentence content="{content}" total_score="80">{words}</sentence></read_chapter></rec_paper></read_chapter></xml_result>"#
    )
}

async fn handle_connection(
    stream: TcpStream,
    state: Arc<MockState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let uri = Arc::new(Mutex::new(String::new()));
    let captured = uri.clone();
    let ws_stream = accept_hdr_async(
        stream,
        move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            *captured.lock() = req.uri().to_string();
            Ok(resp)
        },
    )
    .await?;
    let (mut write, mut read) = ws_stream.split();

    let conn_id = state.connection_count.fetch_add(1, Ordering::Relaxed);
    let sid = format!("ise-mock-{conn_id}");
    let session_index = {
        let mut sessions = state.sessions.lock();
        sessions.push(RecordedSession {
            uri: uri.lock().clone(),
            frames: Vec::new(),
        });
        sessions.len() - 1
    };

    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let frame: Value = serde_json::from_str(text.as_str())?;
                let is_handshake = frame["business"]["cmd"] == "ssb";
                let is_last_audio = frame["business"]["cmd"] == "auw" && frame["data"]["status"] == 2;
                state.sessions.lock()[session_index].frames.push(frame);

                if is_handshake
                    && let MockBehavior::ProviderError { code, message } = &state.behavior
                {
                    let error = json!({ "code": code, "message": message, "sid": sid });
                    write.send(Message::Text(error.to_string().into())).await?;
                    continue;
                }

                if !is_last_audio {
                    continue;
                }

                match &state.behavior {
                    MockBehavior::Respond { xml, fragments } => {
                        let parts = encode_fragments(xml, *fragments);
                        let last = parts.len() - 1;
                        for (i, part) in parts.iter().enumerate() {
                            let status = if i == last { 2 } else { 1 };
                            write.send(result_frame(&sid, status, part)).await?;
                        }
                    }
                    MockBehavior::EchoReference => {
                        let reference = state.sessions.lock()[session_index].reference_text();
                        let xml = echo_document(&reference);
                        // Earlier connections answer later
                        let delay = 40u64.saturating_mul(3usize.saturating_sub(conn_id) as u64);
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        write
                            .send(result_frame(&sid, 2, &BASE64_STANDARD.encode(xml)))
                            .await?;
                    }
                    MockBehavior::CloseWithoutResult => {
                        write.send(Message::Close(None)).await?;
                        break;
                    }
                    MockBehavior::PartialThenClose { xml, fragments } => {
                        for part in encode_fragments(xml, *fragments) {
                            write.send(result_frame(&sid, 1, &part)).await?;
                        }
                        write.send(Message::Close(None)).await?;
                        break;
                    }
                    MockBehavior::PartialThenDrop { xml, fragments } => {
                        for part in encode_fragments(xml, *fragments) {
                            write.send(result_frame(&sid, 1, &part)).await?;
                        }
                        // Returning drops both halves: no closing handshake
                        return Ok(());
                    }
                    MockBehavior::DropWithoutResult => return Ok(()),
                    MockBehavior::ProviderError { .. } | MockBehavior::Hang => {}
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(data)) => {
                write.send(Message::Pong(data)).await?;
            }
            Err(e) => {
                eprintln!("WebSocket error: {}", e);
                break;
            }
            _ => {}
        }
    }

    Ok(())
}
