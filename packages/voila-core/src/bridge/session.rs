//! Per-call bridge session.
//!
//! A session owns both legs of one call: the telephony WebSocket it was
//! accepted on and the agent link it opens after the `start` event. Two
//! forwarder tasks pump audio in each direction while a supervising loop
//! watches for termination, and a phased escalation path hands the caller
//! to a human operator.
//!
//! State is mutated only by the owning session (and the escalation
//! controller, serialized through the transition preconditions); everyone
//! else observes it through a watch channel.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use futures::sink::SinkExt;
use futures::stream::{SplitStream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::audio;
use crate::bridge::agent::{AgentFrame, AgentLink, AgentLinkParams};
use crate::bridge::protocol::{self, StartInfo, TelephonyIncoming, TelephonyOutgoing};
use crate::bridge::registry::{RegistryGuard, SessionRegistry};
use crate::error::{BridgeError, BridgeResult};
use crate::services::stats::{NewCallRecord, StatsWriter};
use crate::state::Config;
use crate::utils::now_millis;

// ─────────────────────────────────────────────────────────────────────────────
// Bridge state
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle state of a bridge session.
///
/// Transitions are monotone except the `WaitingStart -> Active` gate;
/// `Active -> Escalating -> AgentClosed -> Closing -> Closed` is the
/// escalation path, and any state may move to `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    WaitingStart,
    Active,
    Escalating,
    AgentClosed,
    Closing,
    Closed,
    Error,
}

impl BridgeState {
    /// Short lowercase name for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WaitingStart => "waiting_start",
            Self::Active => "active",
            Self::Escalating => "escalating",
            Self::AgentClosed => "agent_closed",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Error => "error",
        }
    }

    /// True while the escalation teardown is in flight and the forwarders
    /// must suspend rather than exit.
    pub fn is_escalation_phase(&self) -> bool {
        matches!(self, Self::Escalating | Self::AgentClosed)
    }

    /// True once the session can no longer carry audio.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closing | Self::Closed)
    }
}

/// Single-writer state cell with watch-channel observers.
pub struct BridgeStateCell {
    tx: watch::Sender<BridgeState>,
}

impl BridgeStateCell {
    fn new(initial: BridgeState) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    /// Returns the current state.
    pub fn get(&self) -> BridgeState {
        *self.tx.borrow()
    }

    /// Subscribes to state transitions.
    pub fn subscribe(&self) -> watch::Receiver<BridgeState> {
        self.tx.subscribe()
    }

    fn set(&self, session_id: &str, new_state: BridgeState) {
        let old = self.get();
        if old != new_state {
            log::info!(
                "[Bridge] Session {}: state {} -> {}",
                session_id,
                old.as_str(),
                new_state.as_str()
            );
            let _ = self.tx.send(new_state);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session statistics
// ─────────────────────────────────────────────────────────────────────────────

/// Packet counters logged when the session stops.
#[derive(Default)]
pub struct SessionStats {
    pub telephony_to_agent: AtomicU64,
    pub agent_to_telephony: AtomicU64,
    pub errors: AtomicU64,
}

impl SessionStats {
    fn count_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Bridge session
// ─────────────────────────────────────────────────────────────────────────────

/// Per-call orchestrator holding both links and the audio pipeline between
/// them.
pub struct BridgeSession {
    session_id: String,
    config: Config,
    state: BridgeStateCell,
    /// Outbound half of the telephony socket, owned by a writer task.
    telephony_tx: mpsc::Sender<Message>,
    /// Agent link, present from start-event processing onward.
    agent: parking_lot::RwLock<Option<Arc<AgentLink>>>,
    /// Agent-side call id (the `session_id` query parameter).
    call_id: parking_lot::RwLock<Option<String>>,
    start_info: parking_lot::RwLock<StartInfo>,
    /// PCM frames held while the agent link is still being opened.
    audio_buffer: Mutex<VecDeque<Bytes>>,
    chunk_counter: AtomicU64,
    escalated: AtomicBool,
    pub stats: SessionStats,
    registry: Arc<SessionRegistry>,
    stats_writer: Arc<StatsWriter>,
}

impl BridgeSession {
    /// Creates a session for a freshly accepted telephony connection.
    ///
    /// Returns the session and the receiving half of its outbound telephony
    /// channel; [`BridgeSession::run`] pairs that receiver with the socket's
    /// sink in a dedicated writer task.
    pub fn accept(
        config: Config,
        registry: Arc<SessionRegistry>,
        stats_writer: Arc<StatsWriter>,
    ) -> (Arc<Self>, mpsc::Receiver<Message>) {
        let (telephony_tx, telephony_rx) = mpsc::channel(64);
        let session = Arc::new(Self {
            session_id: Uuid::new_v4().to_string(),
            config,
            state: BridgeStateCell::new(BridgeState::WaitingStart),
            telephony_tx,
            agent: parking_lot::RwLock::new(None),
            call_id: parking_lot::RwLock::new(None),
            start_info: parking_lot::RwLock::new(StartInfo::default()),
            audio_buffer: Mutex::new(VecDeque::new()),
            chunk_counter: AtomicU64::new(0),
            escalated: AtomicBool::new(false),
            stats: SessionStats::default(),
            registry,
            stats_writer,
        });
        (session, telephony_rx)
    }

    /// Returns this session's identifier.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Returns the agent-side call id, once the agent link is open.
    pub fn call_id(&self) -> Option<String> {
        self.call_id.read().clone()
    }

    /// Returns the stream sid, once the start event has been processed.
    pub fn stream_sid(&self) -> Option<String> {
        self.start_info.read().stream_sid.clone()
    }

    /// Returns the business status extracted from the start event.
    pub fn business_status(&self) -> String {
        self.start_info.read().business_status.clone()
    }

    /// Returns the current bridge state.
    pub fn bridge_state(&self) -> BridgeState {
        self.state.get()
    }

    /// Subscribes to bridge-state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<BridgeState> {
        self.state.subscribe()
    }

    /// Sends a control frame toward the telephony peer.
    pub async fn send_to_telephony(&self, frame: &TelephonyOutgoing) -> BridgeResult<()> {
        let msg = frame
            .to_message()
            .ok_or_else(|| BridgeError::Protocol("unserializable frame".into()))?;
        self.telephony_tx
            .send(msg)
            .await
            .map_err(|_| BridgeError::Transport("telephony writer gone".into()))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Escalation transitions (called from the escalation controller)
    // ─────────────────────────────────────────────────────────────────────────

    /// First escalation phase: close the agent link and wait for it to
    /// drain.
    ///
    /// Precondition: the session is `Active`. On success the state is
    /// `AgentClosed` and the outbound forwarder has suspended.
    pub async fn start_escalation(&self) -> BridgeResult<()> {
        if self.state.get() != BridgeState::Active {
            return Err(BridgeError::Precondition(format!(
                "cannot start escalation in state {}",
                self.state.get().as_str()
            )));
        }

        log::info!("[Bridge] Session {}: starting escalation", self.session_id);
        self.state.set(&self.session_id, BridgeState::Escalating);

        let agent = self.agent.read().clone();
        if let Some(agent) = agent {
            agent.close().await;
        }

        tokio::time::sleep(Duration::from_millis(self.config.bridge.escalation_phase_ms)).await;
        self.state.set(&self.session_id, BridgeState::AgentClosed);
        log::info!(
            "[Bridge] Session {}: escalation ready, agent session completed",
            self.session_id
        );
        Ok(())
    }

    /// Final escalation phase: deliver the stop frame and begin closing.
    ///
    /// Precondition: the session is `Escalating` or `AgentClosed`.
    pub async fn complete_escalation(&self, stop_frame: TelephonyOutgoing) -> BridgeResult<()> {
        let state = self.state.get();
        if !state.is_escalation_phase() {
            return Err(BridgeError::Precondition(format!(
                "cannot complete escalation in state {}",
                state.as_str()
            )));
        }

        self.send_to_telephony(&stop_frame).await?;
        log::info!(
            "[Bridge] Session {}: escalation stop frame sent",
            self.session_id
        );

        self.escalated.store(true, Ordering::SeqCst);
        self.state.set(&self.session_id, BridgeState::Closing);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Audio path
    // ─────────────────────────────────────────────────────────────────────────

    /// Decodes one inbound telephony payload into agent-rate PCM.
    fn decode_inbound(&self, payload_b64: &str) -> Option<Bytes> {
        let mulaw = match BASE64.decode(payload_b64) {
            Ok(data) => data,
            Err(e) => {
                log::warn!(
                    "[Bridge] Session {}: invalid media payload: {}",
                    self.session_id,
                    e
                );
                self.stats.count_error();
                return None;
            }
        };

        let bridge = &self.config.bridge;
        let pcm_low = audio::mulaw_to_linear(&mulaw);
        let pcm_high = audio::resample(
            &pcm_low,
            bridge.telephony_sample_rate,
            bridge.agent_sample_rate,
            bridge.channels,
            2,
        );
        if pcm_high.is_empty() {
            self.stats.count_error();
            return None;
        }
        Some(Bytes::from(pcm_high))
    }

    /// Encodes one agent PCM frame into an outbound telephony `media`
    /// message with the next chunk index.
    fn encode_outbound(&self, pcm: &[u8], stream_sid: &str) -> Option<TelephonyOutgoing> {
        let bridge = &self.config.bridge;
        let pcm_low = audio::resample(
            pcm,
            bridge.agent_sample_rate,
            bridge.telephony_sample_rate,
            bridge.channels,
            2,
        );
        let mulaw = audio::linear_to_mulaw(&pcm_low);
        if mulaw.is_empty() {
            self.stats.count_error();
            return None;
        }

        let chunk = self.chunk_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Some(TelephonyOutgoing::media(
            stream_sid,
            chunk,
            now_millis(),
            BASE64.encode(&mulaw),
        ))
    }

    /// Pushes a frame into the pre-activation buffer, dropping the oldest
    /// when the bound is hit.
    fn buffer_frame(&self, frame: Bytes) {
        let mut buffer = self.audio_buffer.lock();
        if buffer.len() >= self.config.bridge.audio_buffer_frames {
            buffer.pop_front();
        }
        buffer.push_back(frame);
        log::debug!(
            "[Bridge] Session {}: buffered audio frame (buffer size: {})",
            self.session_id,
            buffer.len()
        );
    }

    /// Current number of buffered frames.
    pub fn buffered_frames(&self) -> usize {
        self.audio_buffer.lock().len()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Start-event processing
    // ─────────────────────────────────────────────────────────────────────────

    /// Opens the agent link with the parameters from the start event,
    /// records the initial call-statistics row, activates the bridge, and
    /// drains buffered audio.
    async fn activate(self: &Arc<Self>, info: StartInfo) -> BridgeResult<()> {
        let call_id = Uuid::new_v4().to_string();
        log::info!(
            "[Bridge] Session {}: activating (call {}, stream {:?}, caller {:?}, status {})",
            self.session_id,
            call_id,
            info.stream_sid,
            info.caller_id,
            info.business_status
        );

        let params = AgentLinkParams {
            session_id: call_id.clone(),
            caller_phone: info.caller_id.clone().unwrap_or_default(),
            interaction_id: info.interaction_id.clone().unwrap_or_default(),
            stream_sid: info.stream_sid.clone().unwrap_or_default(),
            business_status: info.business_status.clone(),
        };

        let agent = Arc::new(AgentLink::connect(&self.config, &params).await?);
        agent.spawn_keepalive();
        *self.agent.write() = Some(Arc::clone(&agent));
        *self.call_id.write() = Some(call_id.clone());
        *self.start_info.write() = info.clone();

        // Initial call record is best effort; the call continues either way.
        let record = NewCallRecord {
            call_id,
            assistant_id: self.config.assistant_id.clone(),
            interaction_id: info.interaction_id.clone().unwrap_or_default(),
            phone_number: info.caller_id.clone().unwrap_or_default(),
            stream_sid: info.stream_sid.clone().unwrap_or_default(),
        };
        let writer = Arc::clone(&self.stats_writer);
        tokio::spawn(async move {
            writer.record_call_start(record).await;
        });

        self.state.set(&self.session_id, BridgeState::Active);

        // Drain buffered audio in arrival order.
        let buffered: Vec<Bytes> = self.audio_buffer.lock().drain(..).collect();
        if !buffered.is_empty() {
            log::info!(
                "[Bridge] Session {}: sending {} buffered audio frames to agent",
                self.session_id,
                buffered.len()
            );
            for frame in buffered {
                if let Err(e) = agent.send_audio(frame).await {
                    log::error!(
                        "[Bridge] Session {}: error sending buffered audio: {}",
                        self.session_id,
                        e
                    );
                    self.stats.count_error();
                    break;
                }
                self.stats.telephony_to_agent.fetch_add(1, Ordering::Relaxed);
            }
        }

        if let Some(stream_sid) = &self.start_info.read().stream_sid {
            self.registry.insert(stream_sid.clone(), Arc::clone(self));
        }

        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Forwarders
    // ─────────────────────────────────────────────────────────────────────────

    /// Telephony -> agent pump. Processes control frames in peer order and
    /// returns when the peer stops or disconnects.
    async fn forward_telephony_to_agent(self: Arc<Self>, mut incoming: SplitStream<WebSocket>) {
        log::info!(
            "[Bridge] Session {}: telephony -> agent forwarding started (waiting for start)",
            self.session_id
        );

        loop {
            if self.state.get().is_escalation_phase() {
                tokio::time::sleep(Duration::from_millis(500)).await;
                continue;
            }
            if self.state.get().is_terminal() {
                break;
            }

            let message = match incoming.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    log::error!(
                        "[Bridge] Session {}: telephony receive error: {}",
                        self.session_id,
                        e
                    );
                    self.stats.count_error();
                    break;
                }
                None => break,
            };

            let text = match message {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };

            let frame = match protocol::parse_frame(&text) {
                Ok(frame) => frame,
                Err(e) => {
                    log::error!(
                        "[Bridge] Session {}: invalid JSON from telephony peer: {}",
                        self.session_id,
                        e
                    );
                    self.stats.count_error();
                    continue;
                }
            };

            match frame {
                TelephonyIncoming::Start { stream_sid, start } => {
                    log::info!("[Bridge] Session {}: received START", self.session_id);
                    let info = StartInfo::from_event(stream_sid, start);
                    if let Err(e) = self.activate(info).await {
                        log::error!(
                            "[Bridge] Session {}: failed to initialize agent link: {}",
                            self.session_id,
                            e
                        );
                        self.state.set(&self.session_id, BridgeState::Error);
                        break;
                    }
                }
                TelephonyIncoming::Media { media: Some(media) } if media.is_inbound() => {
                    let Some(payload) = media.payload.as_deref() else {
                        continue;
                    };
                    let Some(pcm) = self.decode_inbound(payload) else {
                        continue;
                    };

                    match self.state.get() {
                        BridgeState::WaitingStart => self.buffer_frame(pcm),
                        BridgeState::Active => {
                            let agent = self.agent.read().clone();
                            if let Some(agent) = agent {
                                if agent.send_audio(pcm).await.is_ok() {
                                    self.stats
                                        .telephony_to_agent
                                        .fetch_add(1, Ordering::Relaxed);
                                }
                            }
                        }
                        _ => {}
                    }
                }
                TelephonyIncoming::Media { .. } => {}
                TelephonyIncoming::Stop => {
                    log::info!(
                        "[Bridge] Session {}: received STOP from telephony peer",
                        self.session_id
                    );
                    break;
                }
                TelephonyIncoming::Other => {}
            }
        }
    }

    /// Agent -> telephony pump. Suspends during the escalation phases and
    /// exits on `Closed` or on agent loss while `Active`.
    async fn forward_agent_to_telephony(self: Arc<Self>) {
        log::info!(
            "[Bridge] Session {}: agent -> telephony forwarding started",
            self.session_id
        );

        loop {
            let state = self.state.get();
            if state.is_escalation_phase() {
                tokio::time::sleep(Duration::from_millis(500)).await;
                continue;
            }
            if state != BridgeState::Active {
                break;
            }

            let agent = match self.agent.read().clone() {
                Some(agent) => agent,
                None => break,
            };

            match agent.recv().await {
                Ok(AgentFrame::Audio(pcm)) if !pcm.is_empty() => {
                    let stream_sid = match self.stream_sid() {
                        Some(sid) => sid,
                        None => continue,
                    };
                    let Some(frame) = self.encode_outbound(&pcm, &stream_sid) else {
                        continue;
                    };
                    if self.send_to_telephony(&frame).await.is_err() {
                        break;
                    }
                    let sent = self
                        .stats
                        .agent_to_telephony
                        .fetch_add(1, Ordering::Relaxed)
                        + 1;
                    if sent == 1 {
                        log::info!(
                            "[Bridge] Session {}: first outbound media frame delivered",
                            self.session_id
                        );
                    }
                }
                Ok(AgentFrame::Audio(_)) => {}
                Ok(AgentFrame::Diagnostic(text)) => {
                    log::debug!(
                        "[Bridge] Session {}: agent control message: {}",
                        self.session_id,
                        text
                    );
                }
                Ok(AgentFrame::Closed) | Err(_) => {
                    if self.state.get() == BridgeState::Active {
                        log::error!(
                            "[Bridge] Session {}: agent link lost unexpectedly",
                            self.session_id
                        );
                        self.stats.count_error();
                    } else {
                        log::info!(
                            "[Bridge] Session {}: agent disconnected for escalation",
                            self.session_id
                        );
                    }
                    break;
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Supervising loop
    // ─────────────────────────────────────────────────────────────────────────

    /// Runs the session to completion over an accepted telephony socket.
    ///
    /// `telephony_rx` is the receiver paired with this session's outbound
    /// channel, as returned by [`BridgeSession::accept`].
    pub async fn run(self: Arc<Self>, socket: WebSocket, mut telephony_rx: mpsc::Receiver<Message>) {
        log::info!("[Bridge] Starting session: {}", self.session_id);

        // Dropped on every exit from this task, panics included, so the
        // registry entry cannot outlive the session.
        let _registry_guard =
            RegistryGuard::new(Arc::clone(&self.registry), Arc::clone(&self));

        let (mut sink, stream) = socket.split();

        // Writer task owns the sink; forwarders and the escalation
        // controller write through the channel. A Close message ends it.
        let writer = tokio::spawn(async move {
            while let Some(msg) = telephony_rx.recv().await {
                let is_close = matches!(msg, Message::Close(_));
                if sink.send(msg).await.is_err() {
                    break;
                }
                if is_close {
                    break;
                }
            }
        });
        let writer_abort = writer.abort_handle();

        let mut forwarders = JoinSet::new();
        forwarders.spawn(Arc::clone(&self).forward_telephony_to_agent(stream));
        let mut outbound_spawned = false;

        let mut tick = tokio::time::interval(Duration::from_secs(1));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            let state = self.state.get();
            if state.is_terminal() || state == BridgeState::Error {
                break;
            }

            // The return pump starts only after the agent link is open.
            if state == BridgeState::Active && !outbound_spawned {
                forwarders.spawn(Arc::clone(&self).forward_agent_to_telephony());
                outbound_spawned = true;
            }

            tokio::select! {
                joined = forwarders.join_next() => {
                    match joined {
                        Some(_) => {
                            let state = self.state.get();
                            // During escalation a forwarder finishing is
                            // expected; keep supervising until the stop
                            // frame has gone out.
                            if state.is_escalation_phase() {
                                continue;
                            }
                            if state == BridgeState::Active {
                                log::info!(
                                    "[Bridge] Session {}: normal termination - forwarder completed",
                                    self.session_id
                                );
                            }
                            break;
                        }
                        None => {
                            if self.state.get().is_escalation_phase() {
                                tick.tick().await;
                                continue;
                            }
                            break;
                        }
                    }
                }
                _ = tick.tick() => {}
            }
        }

        forwarders.abort_all();
        self.stop().await;

        // Give the writer a moment to flush the final stop frame.
        if tokio::time::timeout(Duration::from_secs(2), writer).await.is_err() {
            writer_abort.abort();
        }

        log::info!("[Bridge] Session {} ended", self.session_id);
    }

    /// Tears the session down: deregisters it, closes the agent link, and
    /// notifies the telephony peer unless the escalation stop frame already
    /// did.
    async fn stop(&self) {
        log::info!("[Bridge] Stopping session {}", self.session_id);

        log::info!(
            "[Bridge] Session {} stats: telephony->agent: {}, agent->telephony: {}, errors: {}",
            self.session_id,
            self.stats.telephony_to_agent.load(Ordering::Relaxed),
            self.stats.agent_to_telephony.load(Ordering::Relaxed),
            self.stats.errors.load(Ordering::Relaxed),
        );

        if let Some(stream_sid) = self.stream_sid() {
            self.registry.remove(&stream_sid);
        }

        let agent = self.agent.read().clone();
        if let Some(agent) = agent {
            agent.close().await;
        }

        if !self.escalated.load(Ordering::SeqCst) {
            let _ = self.send_to_telephony(&TelephonyOutgoing::stop()).await;
        }
        let _ = self.telephony_tx.send(Message::Close(None)).await;

        self.state.set(&self.session_id, BridgeState::Closed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_session() -> (Arc<BridgeSession>, mpsc::Receiver<Message>) {
        BridgeSession::accept(
            Config::default(),
            Arc::new(SessionRegistry::new()),
            Arc::new(StatsWriter::disabled()),
        )
    }

    fn set_state(session: &BridgeSession, state: BridgeState) {
        session.state.set("test", state);
    }

    #[tokio::test]
    async fn new_session_waits_for_start() {
        let (session, _rx) = test_session();
        assert_eq!(session.bridge_state(), BridgeState::WaitingStart);
        assert!(session.stream_sid().is_none());
    }

    #[tokio::test]
    async fn buffer_drops_oldest_beyond_bound() {
        let (session, _rx) = test_session();
        let bound = session.config.bridge.audio_buffer_frames;

        for i in 0..bound {
            session.buffer_frame(Bytes::from(vec![i as u8]));
        }
        assert_eq!(session.buffered_frames(), bound);

        // One more evicts the oldest, keeping the bound.
        session.buffer_frame(Bytes::from(vec![0xAB]));
        assert_eq!(session.buffered_frames(), bound);

        let buffer = session.audio_buffer.lock();
        assert_eq!(buffer.front().unwrap()[0], 1);
        assert_eq!(buffer.back().unwrap()[0], 0xAB);
    }

    #[tokio::test]
    async fn chunk_counter_is_strictly_increasing() {
        let (session, mut rx) = test_session();
        *session.start_info.write() = StartInfo {
            stream_sid: Some("MZ1".into()),
            ..StartInfo::default()
        };

        let pcm: Vec<u8> = vec![0; 640];
        let mut last_chunk = 0u64;
        for _ in 0..5 {
            let frame = session.encode_outbound(&pcm, "MZ1").unwrap();
            session.send_to_telephony(&frame).await.unwrap();
            let msg = rx.recv().await.unwrap();
            let Message::Text(text) = msg else {
                panic!("expected text frame");
            };
            let value: serde_json::Value = serde_json::from_str(&text).unwrap();
            let chunk: u64 = value["media"]["chunk"].as_str().unwrap().parse().unwrap();
            assert!(chunk > last_chunk, "chunk {} not above {}", chunk, last_chunk);
            last_chunk = chunk;
        }
    }

    #[tokio::test]
    async fn escalation_requires_active_state() {
        let (session, _rx) = test_session();
        let err = session.start_escalation().await.unwrap_err();
        assert_eq!(err.code(), "precondition_failed");
        // A failed precondition must not mutate state.
        assert_eq!(session.bridge_state(), BridgeState::WaitingStart);
    }

    #[tokio::test(start_paused = true)]
    async fn escalation_walks_the_phase_chain() {
        let (session, mut rx) = test_session();
        set_state(&session, BridgeState::Active);

        session.start_escalation().await.unwrap();
        assert_eq!(session.bridge_state(), BridgeState::AgentClosed);

        let stop = TelephonyOutgoing::escalate("MZ1", "s::n::t::0::2|2|5".into());
        session.complete_escalation(stop).await.unwrap();
        assert_eq!(session.bridge_state(), BridgeState::Closing);

        let Message::Text(text) = rx.recv().await.unwrap() else {
            panic!("expected text frame");
        };
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["stop"]["command"], "escalate");
    }

    #[tokio::test]
    async fn complete_escalation_rejected_outside_phase_chain() {
        let (session, _rx) = test_session();
        set_state(&session, BridgeState::Active);

        let stop = TelephonyOutgoing::escalate("MZ1", "x".into());
        let err = session.complete_escalation(stop).await.unwrap_err();
        assert_eq!(err.code(), "precondition_failed");
        assert_eq!(session.bridge_state(), BridgeState::Active);
    }

    #[tokio::test]
    async fn stop_sends_plain_stop_when_not_escalated() {
        let (session, mut rx) = test_session();
        set_state(&session, BridgeState::Active);

        session.stop().await;
        assert_eq!(session.bridge_state(), BridgeState::Closed);

        let Message::Text(text) = rx.recv().await.unwrap() else {
            panic!("expected text frame");
        };
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["event"], "stop");
        assert!(value.get("stop").is_none());

        assert!(matches!(rx.recv().await, Some(Message::Close(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_after_escalation_sends_no_second_stop() {
        let (session, mut rx) = test_session();
        set_state(&session, BridgeState::Active);

        session.start_escalation().await.unwrap();
        session
            .complete_escalation(TelephonyOutgoing::escalate("MZ1", "rg".into()))
            .await
            .unwrap();
        let _escalate_frame = rx.recv().await.unwrap();

        session.stop().await;
        // Only the socket close remains; no trailing stop frame.
        assert!(matches!(rx.recv().await, Some(Message::Close(_))));
    }

    #[tokio::test]
    async fn registry_guard_cleans_up_a_registered_stream() {
        let registry = Arc::new(SessionRegistry::new());
        let (session, _rx) = BridgeSession::accept(
            Config::default(),
            Arc::clone(&registry),
            Arc::new(StatsWriter::disabled()),
        );

        *session.start_info.write() = StartInfo {
            stream_sid: Some("MZguard".into()),
            ..StartInfo::default()
        };
        registry.insert("MZguard".into(), Arc::clone(&session));
        assert_eq!(registry.session_count(), 1);

        // The guard removes the entry when the owning task unwinds, even
        // though stop() never ran.
        let guard = RegistryGuard::new(Arc::clone(&registry), Arc::clone(&session));
        drop(guard);
        assert_eq!(registry.session_count(), 0);
    }

    #[tokio::test]
    async fn registry_guard_is_a_no_op_before_registration() {
        let registry = Arc::new(SessionRegistry::new());
        let (session, _rx) = BridgeSession::accept(
            Config::default(),
            Arc::clone(&registry),
            Arc::new(StatsWriter::disabled()),
        );

        let guard = RegistryGuard::new(Arc::clone(&registry), session);
        drop(guard);
        assert_eq!(registry.session_count(), 0);
    }

    #[test]
    fn decode_inbound_rejects_bad_base64() {
        let (session, _rx) = test_session();
        assert!(session.decode_inbound("!!notbase64!!").is_none());
        assert_eq!(session.stats.errors.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn inbound_decode_doubles_sample_count() {
        let (session, _rx) = test_session();
        // 160 mu-law bytes = one 20 ms telephony frame.
        let payload = BASE64.encode(vec![0xFFu8; 160]);
        let pcm = session.decode_inbound(&payload).unwrap();
        // 8 kHz mono -> 16 kHz mono doubles frames; 2 bytes per sample.
        assert_eq!(pcm.len(), 160 * 2 * 2);
    }
}
