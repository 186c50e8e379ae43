//! Telephony control-frame protocol.
//!
//! The telephony peer exchanges JSON control frames over its WebSocket:
//! `start` (stream metadata and custom parameters), `media` (base64 mu-law
//! audio), and `stop`. Outbound we emit `media` frames with a chunk counter
//! and, on escalation, a `stop` frame carrying the operator routing string.

use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Incoming frames
// ─────────────────────────────────────────────────────────────────────────────

/// Incoming control frame from the telephony peer.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelephonyIncoming {
    Start {
        #[serde(rename = "streamSid")]
        stream_sid: Option<String>,
        start: Option<StartPayload>,
    },
    Media {
        #[serde(default)]
        media: Option<MediaPayload>,
    },
    Stop,
    /// Any other event is ignored by the forwarder.
    #[serde(other)]
    Other,
}

/// Payload of a `start` event.
#[derive(Debug, Deserialize, Default)]
pub struct StartPayload {
    #[serde(rename = "streamSid")]
    pub stream_sid: Option<String>,
    #[serde(rename = "customParameters", default)]
    pub custom_parameters: CustomParameters,
}

/// Custom parameters attached by the telephony platform.
#[derive(Debug, Deserialize, Default)]
pub struct CustomParameters {
    #[serde(default)]
    pub interaction_id: Option<String>,
    #[serde(default)]
    pub business_hours: Option<String>,
    #[serde(default)]
    pub caller_id: Option<String>,
}

/// Payload of a `media` event.
#[derive(Debug, Deserialize)]
pub struct MediaPayload {
    #[serde(default)]
    pub track: Option<String>,
    #[serde(default)]
    pub payload: Option<String>,
}

impl MediaPayload {
    /// True when this frame carries caller audio.
    pub fn is_inbound(&self) -> bool {
        self.track.as_deref() == Some("inbound")
    }
}

/// Parses a text frame from the telephony peer.
pub fn parse_frame(text: &str) -> Result<TelephonyIncoming, serde_json::Error> {
    serde_json::from_str(text)
}

// ─────────────────────────────────────────────────────────────────────────────
// Start-event extraction
// ─────────────────────────────────────────────────────────────────────────────

/// Everything the bridge needs out of a `start` event before it can open
/// the agent link.
#[derive(Debug, Clone, Default)]
pub struct StartInfo {
    pub stream_sid: Option<String>,
    pub interaction_id: Option<String>,
    pub caller_id: Option<String>,
    pub business_status: String,
}

impl StartInfo {
    /// Extracts stream metadata from a parsed `start` event.
    ///
    /// The stream sid may live at the top level or inside the payload; the
    /// top-level value wins when both are present.
    pub fn from_event(stream_sid: Option<String>, start: Option<StartPayload>) -> Self {
        let mut info = StartInfo {
            stream_sid,
            ..StartInfo::default()
        };

        if let Some(payload) = start {
            if info.stream_sid.is_none() {
                info.stream_sid = payload.stream_sid;
            }
            info.interaction_id = payload.custom_parameters.interaction_id;
            info.caller_id = payload.custom_parameters.caller_id;
            info.business_status = extract_business_status(
                payload.custom_parameters.business_hours.as_deref().unwrap_or(""),
            );
        } else {
            info.business_status = extract_business_status("");
        }

        info
    }
}

/// Extracts the business status from a `business_hours` string of the form
/// `"<open_spec>::<close_spec>::<tz>::<status>"`.
///
/// The status is the last `::`-delimited token, trimmed and lowercased.
/// Anything without at least four fields defaults to `close`.
pub fn extract_business_status(business_hours: &str) -> String {
    if business_hours.contains("::") {
        let parts: Vec<&str> = business_hours.split("::").collect();
        if parts.len() >= 4 {
            if let Some(last) = parts.last() {
                return last.trim().to_lowercase();
            }
        }
    }

    log::warn!(
        "[Bridge] Could not extract business status from: {:?}, defaulting to close",
        business_hours
    );
    "close".to_string()
}

/// True when the call center cannot take operator transfers.
pub fn transfers_blocked(business_status: &str) -> bool {
    matches!(business_status, "close" | "after_hours")
}

// ─────────────────────────────────────────────────────────────────────────────
// Outgoing frames
// ─────────────────────────────────────────────────────────────────────────────

/// Outgoing control frames toward the telephony peer.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelephonyOutgoing {
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutboundMedia,
    },
    Stop {
        #[serde(rename = "streamSid", skip_serializing_if = "Option::is_none")]
        stream_sid: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        stop: Option<StopCommand>,
    },
}

/// Outbound audio payload: base64 mu-law with chunk ordering metadata.
#[derive(Debug, Serialize)]
pub struct OutboundMedia {
    pub track: &'static str,
    /// String-encoded, strictly increasing per stream.
    pub chunk: String,
    /// Epoch milliseconds, string-encoded.
    pub timestamp: String,
    pub payload: String,
}

/// The escalation command delivered in the final stop frame.
#[derive(Debug, Serialize)]
pub struct StopCommand {
    pub command: &'static str,
    #[serde(rename = "ringGroup")]
    pub ring_group: String,
}

impl TelephonyOutgoing {
    /// Builds an outbound `media` frame.
    pub fn media(stream_sid: &str, chunk: u64, timestamp_ms: u64, payload_b64: String) -> Self {
        Self::Media {
            stream_sid: stream_sid.to_string(),
            media: OutboundMedia {
                track: "outbound",
                chunk: chunk.to_string(),
                timestamp: timestamp_ms.to_string(),
                payload: payload_b64,
            },
        }
    }

    /// Builds the escalation stop frame.
    pub fn escalate(stream_sid: &str, ring_group: String) -> Self {
        Self::Stop {
            stream_sid: Some(stream_sid.to_string()),
            stop: Some(StopCommand {
                command: "escalate",
                ring_group,
            }),
        }
    }

    /// Builds the plain end-of-call stop frame.
    pub fn stop() -> Self {
        Self::Stop {
            stream_sid: None,
            stop: None,
        }
    }

    /// Serializes the frame to a WebSocket text message.
    pub fn to_message(&self) -> Option<Message> {
        serde_json::to_string(self)
            .ok()
            .map(|s| Message::Text(s.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_start_event_with_custom_parameters() {
        let text = r#"{
            "event": "start",
            "streamSid": "MZ123",
            "start": {
                "customParameters": {
                    "interaction_id": "int-1",
                    "business_hours": "08:00::20:00::Europe/Rome::Open",
                    "caller_id": "+393331234567"
                }
            }
        }"#;

        match parse_frame(text).unwrap() {
            TelephonyIncoming::Start { stream_sid, start } => {
                let info = StartInfo::from_event(stream_sid, start);
                assert_eq!(info.stream_sid.as_deref(), Some("MZ123"));
                assert_eq!(info.interaction_id.as_deref(), Some("int-1"));
                assert_eq!(info.caller_id.as_deref(), Some("+393331234567"));
                assert_eq!(info.business_status, "open");
            }
            other => panic!("expected start, got {:?}", other),
        }
    }

    #[test]
    fn stream_sid_falls_back_to_start_payload() {
        let text = r#"{"event":"start","start":{"streamSid":"MZnested","customParameters":{}}}"#;
        match parse_frame(text).unwrap() {
            TelephonyIncoming::Start { stream_sid, start } => {
                let info = StartInfo::from_event(stream_sid, start);
                assert_eq!(info.stream_sid.as_deref(), Some("MZnested"));
            }
            other => panic!("expected start, got {:?}", other),
        }
    }

    #[test]
    fn business_status_defaults_to_close_on_malformed_input() {
        assert_eq!(extract_business_status(""), "close");
        assert_eq!(extract_business_status("08:00-20:00"), "close");
        assert_eq!(extract_business_status("a::b::c"), "close");
        assert_eq!(extract_business_status("a::b::c::After_Hours "), "after_hours");
    }

    #[test]
    fn transfers_are_blocked_outside_opening_hours() {
        assert!(transfers_blocked("close"));
        assert!(transfers_blocked("after_hours"));
        assert!(!transfers_blocked("open"));
    }

    #[test]
    fn unknown_events_parse_as_other() {
        assert!(matches!(
            parse_frame(r#"{"event":"mark","name":"x"}"#).unwrap(),
            TelephonyIncoming::Other
        ));
    }

    #[test]
    fn media_frame_exposes_inbound_track() {
        let text = r#"{"event":"media","media":{"track":"inbound","payload":"AAAA"}}"#;
        match parse_frame(text).unwrap() {
            TelephonyIncoming::Media { media: Some(media) } => {
                assert!(media.is_inbound());
                assert_eq!(media.payload.as_deref(), Some("AAAA"));
            }
            other => panic!("expected media, got {:?}", other),
        }
    }

    #[test]
    fn escalation_stop_frame_serializes_expected_shape() {
        let frame = TelephonyOutgoing::escalate("MZ1", "s::n::t::0::1|1|5".into());
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["event"], "stop");
        assert_eq!(json["streamSid"], "MZ1");
        assert_eq!(json["stop"]["command"], "escalate");
        assert_eq!(json["stop"]["ringGroup"], "s::n::t::0::1|1|5");
    }

    #[test]
    fn media_frame_carries_string_chunk_and_timestamp() {
        let frame = TelephonyOutgoing::media("MZ1", 7, 1712345678901, "cGF5".into());
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["media"]["track"], "outbound");
        assert_eq!(json["media"]["chunk"], "7");
        assert_eq!(json["media"]["timestamp"], "1712345678901");
    }
}
