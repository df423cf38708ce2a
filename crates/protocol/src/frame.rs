//! Frame encoding for the event channel.
//!
//! JSON events travel as WebSocket text frames:
//! `{"event": "<name>", "data": <payload>}`.
//!
//! Events carrying raw bytes travel as binary frames:
//! `[4 bytes big-endian header length][JSON header bytes][binary data]`,
//! where the header is a JSON object with an `event` field.

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// A named event with an optional JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl EventFrame {
    /// Creates a frame, serializing `data` if given.
    pub fn new<T: Serialize>(
        event: impl Into<String>,
        data: Option<&T>,
    ) -> Result<Self, serde_json::Error> {
        let data = data.map(serde_json::to_value).transpose()?;
        Ok(Self {
            event: event.into(),
            data,
        })
    }

    /// Deserializes the payload into the given type.
    pub fn parse_data<T: for<'de> Deserialize<'de>>(&self) -> Result<Option<T>, serde_json::Error> {
        match &self.data {
            Some(value) => Ok(Some(T::deserialize(value)?)),
            None => Ok(None),
        }
    }

    /// Encodes the frame as text.
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decodes a text frame.
    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// A decoded binary frame.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryFrame {
    pub event: String,
    /// The full JSON header, including the `event` field.
    pub header: serde_json::Value,
    pub data: Vec<u8>,
}

impl BinaryFrame {
    /// Builds the wire bytes for `event` with the given header fields.
    ///
    /// `header` must be a JSON object (or `null` for no extra fields); the
    /// `event` field is injected.
    pub fn encode(
        event: &str,
        header: &serde_json::Value,
        data: &[u8],
    ) -> Result<Vec<u8>, ProtocolError> {
        let mut header = match header {
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            serde_json::Value::Object(_) => header.clone(),
            _ => return Err(ProtocolError::HeaderNotObject),
        };
        if let Some(obj) = header.as_object_mut() {
            obj.insert("event".into(), serde_json::Value::String(event.to_string()));
        }

        let header_bytes = serde_json::to_vec(&header)?;
        let header_len = header_bytes.len() as u32;

        let mut frame = Vec::with_capacity(4 + header_bytes.len() + data.len());
        frame.extend_from_slice(&header_len.to_be_bytes());
        frame.extend_from_slice(&header_bytes);
        frame.extend_from_slice(data);
        Ok(frame)
    }

    /// Parses wire bytes produced by [`BinaryFrame::encode`].
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let Some(prefix) = frame.get(..4) else {
            return Err(ProtocolError::Truncated {
                expected: 4,
                actual: frame.len(),
            });
        };
        let header_len = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
        let header_end = header_len.checked_add(4).unwrap_or(usize::MAX);
        if frame.len() < header_end {
            return Err(ProtocolError::Truncated {
                expected: header_end,
                actual: frame.len(),
            });
        }

        let header: serde_json::Value = serde_json::from_slice(&frame[4..header_end])?;
        if !header.is_object() {
            return Err(ProtocolError::HeaderNotObject);
        }
        let event = header
            .get("event")
            .and_then(|e| e.as_str())
            .ok_or(ProtocolError::MissingEvent)?
            .to_string();

        Ok(Self {
            event,
            header,
            data: frame[header_end..].to_vec(),
        })
    }

    /// Deserializes the header into the given type.
    pub fn parse_header<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.header)
    }
}
