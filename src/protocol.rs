//! Control protocol envelopes and audio frame decoding
//!
//! One transport carries two kinds of frames: JSON text frames for the
//! request/response and push-event protocol, and binary frames holding raw
//! little-endian `f32` PCM samples.
//!
//! ```text
//! request   {"id": 7, "method": "setVolume", "params": [40]}
//! response  {"id": 7, "success": true}
//! event     {"event": "status", "payload": {...}}
//! ```

use bytes::Buf;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// Request from a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

/// Reply to a [`Request`] with the same `id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Response {
    pub fn ok(id: u64) -> Self {
        Self {
            id,
            success: true,
            message: None,
        }
    }

    pub fn error(id: u64, message: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            message: Some(message.into()),
        }
    }
}

/// Unsolicited push notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    pub event: String,
    pub payload: Value,
}

/// A frame as delivered by the transport
#[derive(Debug, Clone, PartialEq)]
pub enum Frame<'a> {
    Text(&'a str),
    Binary(&'a [u8]),
}

/// A classified incoming frame
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Audio(Vec<f32>),
    Request(Request),
    Response(Response),
    Event(EventMessage),
}

/// Classify a frame by payload type, then by shape for text frames
pub fn parse_frame(frame: Frame<'_>) -> Result<Incoming, ProtocolError> {
    match frame {
        Frame::Binary(data) => decode_audio_frame(data).map(Incoming::Audio),
        Frame::Text(text) => {
            let value: Value = serde_json::from_str(text)?;
            let Some(object) = value.as_object() else {
                return Err(ProtocolError::UnknownMessage);
            };

            if object.contains_key("method") {
                Ok(Incoming::Request(serde_json::from_value(value)?))
            } else if object.contains_key("id") {
                Ok(Incoming::Response(serde_json::from_value(value)?))
            } else if object.contains_key("event") {
                Ok(Incoming::Event(serde_json::from_value(value)?))
            } else {
                Err(ProtocolError::UnknownMessage)
            }
        }
    }
}

/// Decode a binary frame of little-endian `f32` samples
pub fn decode_audio_frame(mut data: &[u8]) -> Result<Vec<f32>, ProtocolError> {
    if data.len() % 4 != 0 {
        return Err(ProtocolError::MalformedAudioFrame(data.len()));
    }

    let mut samples = Vec::with_capacity(data.len() / 4);
    while data.has_remaining() {
        samples.push(data.get_f32_le());
    }
    Ok(samples)
}

/// Encode samples as a binary audio frame
pub fn encode_audio_frame(samples: &[f32]) -> Vec<u8> {
    let mut data = Vec::with_capacity(samples.len() * 4);
    for sample in samples {
        data.extend_from_slice(&sample.to_le_bytes());
    }
    data
}

/// Control methods understood by the player
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMethod {
    Start,
    Stop,
    Reset,
    SetVolume(u8),
    SetMute(bool),
    Status,
}

impl ControlMethod {
    /// Interpret a request's method name and positional parameters
    pub fn from_request(request: &Request) -> Result<Self, ProtocolError> {
        let invalid = || ProtocolError::InvalidParams(request.method.clone());

        match request.method.as_str() {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "reset" => Ok(Self::Reset),
            "status" => Ok(Self::Status),
            "setVolume" => {
                let volume = request
                    .params
                    .first()
                    .and_then(Value::as_f64)
                    .ok_or_else(invalid)?;
                if !(0.0..=100.0).contains(&volume) {
                    return Err(invalid());
                }
                Ok(Self::SetVolume(volume.round() as u8))
            }
            "setMute" => request
                .params
                .first()
                .and_then(Value::as_bool)
                .map(Self::SetMute)
                .ok_or_else(invalid),
            other => Err(ProtocolError::UnknownMethod(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_binary_frame_is_audio() {
        let data = encode_audio_frame(&[0.25, -1.0, 0.5]);
        let incoming = parse_frame(Frame::Binary(&data)).unwrap();
        assert_eq!(incoming, Incoming::Audio(vec![0.25, -1.0, 0.5]));
    }

    #[test]
    fn test_truncated_audio_frame() {
        let result = decode_audio_frame(&[0, 0, 128]);
        assert!(matches!(result, Err(ProtocolError::MalformedAudioFrame(3))));
    }

    #[test]
    fn test_text_frames_classified() {
        let request = parse_frame(Frame::Text(r#"{"id":1,"method":"setMute","params":[true]}"#)).unwrap();
        assert!(matches!(request, Incoming::Request(ref r) if r.id == 1 && r.method == "setMute"));

        let response = parse_frame(Frame::Text(r#"{"id":1,"success":false,"message":"nope"}"#)).unwrap();
        assert_eq!(response, Incoming::Response(Response::error(1, "nope")));

        let event = parse_frame(Frame::Text(r#"{"event":"status","payload":{"level":1.0}}"#)).unwrap();
        assert!(matches!(event, Incoming::Event(ref e) if e.event == "status"));

        assert!(matches!(parse_frame(Frame::Text("[1,2]")), Err(ProtocolError::UnknownMessage)));
        assert!(matches!(parse_frame(Frame::Text("{")), Err(ProtocolError::Json(_))));
    }

    #[test]
    fn test_control_methods() {
        let request = |method: &str, params: Vec<Value>| Request {
            id: 0,
            method: method.to_string(),
            params,
        };

        assert_eq!(ControlMethod::from_request(&request("start", vec![])).unwrap(), ControlMethod::Start);
        assert_eq!(
            ControlMethod::from_request(&request("setVolume", vec![json!(42)])).unwrap(),
            ControlMethod::SetVolume(42)
        );
        assert!(matches!(
            ControlMethod::from_request(&request("setVolume", vec![json!(140)])),
            Err(ProtocolError::InvalidParams(_))
        ));
        assert!(matches!(
            ControlMethod::from_request(&request("tune", vec![json!(5_000_000)])),
            Err(ProtocolError::UnknownMethod(_))
        ));
    }

    #[test]
    fn test_response_omits_empty_message() {
        let text = serde_json::to_string(&Response::ok(3)).unwrap();
        assert_eq!(text, r#"{"id":3,"success":true}"#);
    }
}
