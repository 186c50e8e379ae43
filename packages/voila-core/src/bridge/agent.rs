//! Client-side WebSocket link to the voice-agent server.
//!
//! One link per call. The URL carries the session parameters recognized by
//! the agent (session id, caller phone, interaction id, stream sid, business
//! status), each percent-encoded. Audio travels as raw binary PCM in both
//! directions; any text frame from the agent is a diagnostic message and is
//! never forwarded as audio.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::sink::SinkExt;
use futures::stream::{SplitSink, SplitStream, StreamExt};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::{BridgeError, BridgeResult};
use crate::state::Config;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Query parameters announced to the agent when the link opens.
#[derive(Debug, Clone, Default)]
pub struct AgentLinkParams {
    pub session_id: String,
    pub caller_phone: String,
    pub interaction_id: String,
    pub stream_sid: String,
    pub business_status: String,
}

impl AgentLinkParams {
    /// Builds the connection URL with percent-encoded query parameters.
    pub fn build_url(&self, base_url: &str) -> String {
        let enc = |s: &str| utf8_percent_encode(s, NON_ALPHANUMERIC).to_string();
        format!(
            "{}?session_id={}&caller_phone={}&interaction_id={}&stream_sid={}&business_status={}",
            base_url,
            enc(&self.session_id),
            enc(&self.caller_phone),
            enc(&self.interaction_id),
            enc(&self.stream_sid),
            enc(&self.business_status),
        )
    }
}

/// A frame received from the agent.
#[derive(Debug)]
pub enum AgentFrame {
    /// Raw linear PCM audio.
    Audio(Bytes),
    /// Out-of-band diagnostic text; logged, never bridged.
    Diagnostic(String),
    /// The agent closed the link.
    Closed,
}

/// One WebSocket endpoint toward the voice-agent server.
///
/// The sender half is shared (inbound forwarder and ping task both write);
/// the receiver half is drained by a single task. `close()` is idempotent.
pub struct AgentLink {
    writer: Mutex<WsSink>,
    reader: Mutex<WsSource>,
    closed: AtomicBool,
    close_timeout: Duration,
    ping_interval: Duration,
    ping_timeout: Duration,
    /// Last frame of any kind seen from the agent; staleness past
    /// interval + timeout fails the link.
    last_activity: parking_lot::Mutex<std::time::Instant>,
    url: String,
}

impl AgentLink {
    /// Opens the link to the agent server.
    pub async fn connect(config: &Config, params: &AgentLinkParams) -> BridgeResult<Self> {
        let url = params.build_url(&config.agent_server_url);
        log::info!("[AgentLink] Connecting: {}", url);

        let (socket, _response) = connect_async(url.as_str()).await.map_err(|e| {
            BridgeError::Transport(format!("agent connect failed: {}", e))
        })?;

        log::info!("[AgentLink] Connected: session {}", params.session_id);
        let (writer, reader) = socket.split();

        Ok(Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
            closed: AtomicBool::new(false),
            close_timeout: Duration::from_secs(config.agent_close_timeout_secs),
            ping_interval: Duration::from_secs(config.agent_ping_interval_secs),
            ping_timeout: Duration::from_secs(config.agent_ping_timeout_secs),
            last_activity: parking_lot::Mutex::new(std::time::Instant::now()),
            url,
        })
    }

    /// Returns the URL this link was opened with.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// True once `close()` has run or the peer disconnected.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Sends one frame of raw PCM audio to the agent.
    pub async fn send_audio(&self, pcm: Bytes) -> BridgeResult<()> {
        if self.is_closed() {
            return Err(BridgeError::Transport("agent link is closed".into()));
        }
        self.writer
            .lock()
            .await
            .send(Message::Binary(pcm.to_vec()))
            .await
            .map_err(|e| {
                self.closed.store(true, Ordering::SeqCst);
                BridgeError::Transport(format!("agent send failed: {}", e))
            })
    }

    /// Receives the next frame from the agent.
    ///
    /// Transparent to pings: answers them inline and keeps waiting for the
    /// next data frame.
    pub async fn recv(&self) -> BridgeResult<AgentFrame> {
        let mut reader = self.reader.lock().await;
        loop {
            let frame = reader.next().await;
            if frame.is_some() {
                *self.last_activity.lock() = std::time::Instant::now();
            }
            match frame {
                Some(Ok(Message::Binary(data))) => {
                    return Ok(AgentFrame::Audio(Bytes::from(data)))
                }
                Some(Ok(Message::Text(text))) => {
                    return Ok(AgentFrame::Diagnostic(text.to_string()))
                }
                Some(Ok(Message::Ping(payload))) => {
                    let _ = self.writer.lock().await.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                Some(Ok(Message::Close(_))) | None => {
                    self.closed.store(true, Ordering::SeqCst);
                    return Ok(AgentFrame::Closed);
                }
                Some(Err(e)) => {
                    self.closed.store(true, Ordering::SeqCst);
                    return Err(BridgeError::Transport(format!("agent recv failed: {}", e)));
                }
            }
        }
    }

    /// Spawns the keepalive task: a ping every interval, failure after the
    /// configured timeout. The task ends itself once the link closes.
    pub fn spawn_keepalive(self: &Arc<Self>) -> JoinHandle<()> {
        let link = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(link.ping_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick fires immediately; skip it so the first ping waits
            // a full interval after connect.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if link.is_closed() {
                    break;
                }

                let stale_after = link.ping_interval + link.ping_timeout;
                if link.last_activity.lock().elapsed() > stale_after {
                    log::warn!(
                        "[AgentLink] No agent activity for {:?}, failing the link",
                        stale_after
                    );
                    link.closed.store(true, Ordering::SeqCst);
                    break;
                }

                let send_ping = async {
                    link.writer
                        .lock()
                        .await
                        .send(Message::Ping(Vec::new()))
                        .await
                };
                match tokio::time::timeout(link.ping_timeout, send_ping).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        log::warn!("[AgentLink] Ping failed: {}", e);
                        link.closed.store(true, Ordering::SeqCst);
                        break;
                    }
                    Err(_) => {
                        log::warn!("[AgentLink] Ping timed out after {:?}", link.ping_timeout);
                        link.closed.store(true, Ordering::SeqCst);
                        break;
                    }
                }
            }
        })
    }

    /// Closes the link. Safe to call more than once; later calls are no-ops.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let close_frame = async {
            let mut writer = self.writer.lock().await;
            let _ = writer.send(Message::Close(None)).await;
            let _ = writer.flush().await;
        };
        if tokio::time::timeout(self.close_timeout, close_frame).await.is_err() {
            log::warn!("[AgentLink] Close timed out after {:?}", self.close_timeout);
        } else {
            log::info!("[AgentLink] Closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_percent_encodes_every_parameter() {
        let params = AgentLinkParams {
            session_id: "abc-123".into(),
            caller_phone: "+39 333 1234567".into(),
            interaction_id: "int/7".into(),
            stream_sid: "MZ99".into(),
            business_status: "after_hours".into(),
        };
        let url = params.build_url("ws://localhost:8765");

        assert!(url.starts_with("ws://localhost:8765?session_id=abc%2D123"));
        assert!(url.contains("caller_phone=%2B39%20333%201234567"));
        assert!(url.contains("interaction_id=int%2F7"));
        assert!(url.contains("stream_sid=MZ99"));
        assert!(url.ends_with("business_status=after%5Fhours"));
    }
}
