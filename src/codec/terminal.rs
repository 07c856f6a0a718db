//! Terminal bridge wire frames
//!
//! Every frame is a JSON object with a `type` discriminator. Terminal bytes
//! travel base64-encoded in `data` because the socket carries text:
//!
//! ```text
//! server → client   {"type":"info","message":"..."}
//! server → client   {"type":"output","data":"<base64>"}
//! client → server   {"type":"input","data":"<base64>"}
//! client → server   {"type":"resize","cols":120,"rows":40}
//! client → server   ls -la\r            (no envelope: raw input)
//! ```

use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Terminal geometry in character cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSize {
    pub cols: u16,
    pub rows: u16,
}

impl TerminalSize {
    /// Build a size, rejecting zero dimensions
    pub fn new(cols: u16, rows: u16) -> Option<Self> {
        (cols > 0 && rows > 0).then_some(Self { cols, rows })
    }
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

/// Frame sent from server to client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFrame {
    /// Human-readable status line
    Info(String),
    /// Bytes produced by the process
    Output(Vec<u8>),
}

/// Frame received from a client, after decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    /// Bytes to write into the process
    Input(Vec<u8>),
    /// New geometry; `None` when the fields were missing or invalid
    Resize(Option<TerminalSize>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutgoingEnvelope<'a> {
    Info { message: &'a str },
    Output { data: String },
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IncomingEnvelope {
    Input {
        data: String,
    },
    Resize {
        #[serde(default)]
        cols: Option<Value>,
        #[serde(default)]
        rows: Option<Value>,
    },
}

impl ServerFrame {
    /// Encode as JSON text for the socket
    pub fn encode(&self) -> String {
        let envelope = match self {
            ServerFrame::Info(message) => OutgoingEnvelope::Info { message },
            ServerFrame::Output(bytes) => OutgoingEnvelope::Output {
                data: STANDARD.encode(bytes),
            },
        };
        // Serializing a tagged enum of strings cannot fail
        serde_json::to_string(&envelope).unwrap_or_default()
    }

    /// Decode a server frame (used by clients and tests)
    pub fn decode(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        match value.get("type").and_then(Value::as_str) {
            Some("info") => {
                let message = value
                    .get("message")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::Codec("info frame without message".to_string()))?;
                Ok(ServerFrame::Info(message.to_string()))
            }
            Some("output") => {
                let data = value
                    .get("data")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::Codec("output frame without data".to_string()))?;
                Ok(ServerFrame::Output(decode_payload(data)?))
            }
            other => Err(Error::Codec(format!("unknown server frame type: {:?}", other))),
        }
    }
}

impl ClientFrame {
    /// Encode as JSON text (used by clients and tests)
    pub fn encode(&self) -> String {
        match self {
            ClientFrame::Input(bytes) => serde_json::json!({
                "type": "input",
                "data": STANDARD.encode(bytes),
            })
            .to_string(),
            ClientFrame::Resize(Some(size)) => serde_json::json!({
                "type": "resize",
                "cols": size.cols,
                "rows": size.rows,
            })
            .to_string(),
            ClientFrame::Resize(None) => serde_json::json!({ "type": "resize" }).to_string(),
        }
    }
}

/// Decode a text message received from a client.
///
/// Only a JSON object with a string `type` counts as an envelope. Anything
/// else is raw input whose literal bytes are the payload. An envelope that
/// cannot be interpreted (unknown type, bad base64) is an error for the
/// caller to log and drop.
pub fn decode_client_text(text: &str) -> Result<ClientFrame> {
    let value = match serde_json::from_str::<Value>(text) {
        Ok(value @ Value::Object(_)) if value.get("type").map_or(false, Value::is_string) => value,
        _ => return Ok(ClientFrame::Input(text.as_bytes().to_vec())),
    };

    let envelope: IncomingEnvelope = serde_json::from_value(value)
        .map_err(|e| Error::Codec(format!("unsupported client frame: {}", e)))?;

    match envelope {
        IncomingEnvelope::Input { data } => Ok(ClientFrame::Input(decode_payload(&data)?)),
        IncomingEnvelope::Resize { cols, rows } => Ok(ClientFrame::Resize(parse_geometry(
            cols.as_ref(),
            rows.as_ref(),
        ))),
    }
}

/// Decode a binary message received from a client: always raw input
pub fn decode_client_binary(bytes: &[u8]) -> ClientFrame {
    ClientFrame::Input(bytes.to_vec())
}

fn decode_payload(data: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(data)
        .map_err(|e| Error::Codec(format!("invalid base64 payload: {}", e)))
}

fn parse_geometry(cols: Option<&Value>, rows: Option<&Value>) -> Option<TerminalSize> {
    let dimension = |value: Option<&Value>| -> Option<u16> {
        let n = value?.as_u64()?;
        u16::try_from(n).ok()
    };
    TerminalSize::new(dimension(cols)?, dimension(rows)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_frame_encoding() {
        let frame = ServerFrame::Output(b"\x1b[31mred\x1b[0m\r\n".to_vec());
        let text = frame.encode();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "output");
        assert_eq!(
            STANDARD.decode(value["data"].as_str().unwrap()).unwrap(),
            b"\x1b[31mred\x1b[0m\r\n"
        );
        assert_eq!(ServerFrame::decode(&text).unwrap(), frame);
    }

    #[test]
    fn test_info_frame_encoding() {
        let text = ServerFrame::Info("Process exited with code 0".to_string()).encode();
        assert_eq!(
            text,
            r#"{"type":"info","message":"Process exited with code 0"}"#
        );
    }

    #[test]
    fn test_input_envelope_is_decoded() {
        let text = format!(r#"{{"type":"input","data":"{}"}}"#, STANDARD.encode([0u8, 3, 255]));
        assert_eq!(
            decode_client_text(&text).unwrap(),
            ClientFrame::Input(vec![0, 3, 255])
        );
    }

    #[test]
    fn test_raw_text_is_input() {
        assert_eq!(
            decode_client_text("ls -la\r").unwrap(),
            ClientFrame::Input(b"ls -la\r".to_vec())
        );
    }

    #[test]
    fn test_json_scalars_are_raw_input() {
        // A typed digit or a quoted word must reach the shell untouched
        assert_eq!(
            decode_client_text("5").unwrap(),
            ClientFrame::Input(b"5".to_vec())
        );
        assert_eq!(
            decode_client_text("\"hi\"").unwrap(),
            ClientFrame::Input(b"\"hi\"".to_vec())
        );
        assert_eq!(
            decode_client_text(r#"{"no_type":1}"#).unwrap(),
            ClientFrame::Input(br#"{"no_type":1}"#.to_vec())
        );
    }

    #[test]
    fn test_unknown_envelope_is_error() {
        assert!(decode_client_text(r#"{"type":"ping"}"#).is_err());
    }

    #[test]
    fn test_bad_base64_is_error() {
        let err = decode_client_text(r#"{"type":"input","data":"!!!"}"#).unwrap_err();
        assert!(matches!(err, Error::Codec(_)));
    }

    #[test]
    fn test_resize_valid() {
        assert_eq!(
            decode_client_text(r#"{"type":"resize","cols":120,"rows":40}"#).unwrap(),
            ClientFrame::Resize(Some(TerminalSize { cols: 120, rows: 40 }))
        );
    }

    #[test]
    fn test_resize_invalid_fields() {
        for text in [
            r#"{"type":"resize","cols":0,"rows":40}"#,
            r#"{"type":"resize","cols":-3,"rows":40}"#,
            r#"{"type":"resize","cols":"120","rows":40}"#,
            r#"{"type":"resize","cols":80.5,"rows":40}"#,
            r#"{"type":"resize","rows":40}"#,
            r#"{"type":"resize","cols":70000,"rows":40}"#,
            r#"{"type":"resize"}"#,
        ] {
            assert_eq!(
                decode_client_text(text).unwrap(),
                ClientFrame::Resize(None),
                "{}",
                text
            );
        }
    }

    #[test]
    fn test_client_frame_encoding_decodes_back() {
        let input = ClientFrame::Input(b"echo hi\n".to_vec());
        assert_eq!(decode_client_text(&input.encode()).unwrap(), input);

        let resize = ClientFrame::Resize(TerminalSize::new(100, 30));
        assert_eq!(decode_client_text(&resize.encode()).unwrap(), resize);
    }

    #[test]
    fn test_binary_is_raw_input() {
        assert_eq!(
            decode_client_binary(&[1, 2, 3]),
            ClientFrame::Input(vec![1, 2, 3])
        );
    }

    #[test]
    fn test_terminal_size_rejects_zero() {
        assert!(TerminalSize::new(0, 24).is_none());
        assert!(TerminalSize::new(80, 0).is_none());
        assert_eq!(TerminalSize::new(80, 24), Some(TerminalSize::default()));
    }
}
