//! Byte-oriented data channel
//!
//! Messages from the peer arrive as text in a named encoding and are decoded
//! to raw bytes before being written. Bytes read from the device are always
//! forwarded as base64, and only once the peer has subscribed with `read`.

use std::fmt;
use std::str::FromStr;

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use serde::{Deserialize, Deserializer};

use crate::error::SessionError;
use crate::events::Notification;

/// Base64 engine accepting input with or without padding
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Text encoding of a message exchanged with the peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// Standard base64
    Base64,
    /// UTF-8 text
    #[default]
    Utf8,
    /// One byte per character (`latin1`, `ascii`, `binary`)
    Latin1,
    /// Hexadecimal digits
    Hex,
}

impl Encoding {
    /// Decode a peer message into raw bytes
    pub fn decode(&self, message: &str) -> Result<Vec<u8>, SessionError> {
        match self {
            Encoding::Base64 => LENIENT_BASE64
                .decode(message.trim())
                .map_err(|e| SessionError::InvalidRequest(format!("invalid base64 message: {}", e))),
            Encoding::Utf8 => Ok(message.as_bytes().to_vec()),
            Encoding::Latin1 => message
                .chars()
                .map(|c| {
                    u8::try_from(u32::from(c)).map_err(|_| {
                        SessionError::InvalidRequest(format!(
                            "character {:?} does not fit in one byte",
                            c
                        ))
                    })
                })
                .collect(),
            Encoding::Hex => hex::decode(message.trim())
                .map_err(|e| SessionError::InvalidRequest(format!("invalid hex message: {}", e))),
        }
    }
}

impl FromStr for Encoding {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "base64" => Ok(Self::Base64),
            "utf8" | "utf-8" => Ok(Self::Utf8),
            "latin1" | "ascii" | "binary" => Ok(Self::Latin1),
            "hex" => Ok(Self::Hex),
            other => Err(SessionError::InvalidRequest(format!(
                "unsupported encoding: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Encoding::Base64 => "base64",
            Encoding::Utf8 => "utf8",
            Encoding::Latin1 => "latin1",
            Encoding::Hex => "hex",
        };
        f.write_str(name)
    }
}

impl<'de> Deserialize<'de> for Encoding {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = Option::<String>::deserialize(deserializer)?;
        match name {
            Some(name) => name.parse().map_err(serde::de::Error::custom),
            None => Ok(Encoding::default()),
        }
    }
}

/// Read subscription and delivery of incoming bytes
#[derive(Debug, Default)]
pub struct DataChannel {
    subscribed: bool,
}

impl DataChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start delivering incoming bytes to the peer
    pub fn subscribe(&mut self) {
        self.subscribed = true;
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    /// Clear the subscription; only disposal does this
    pub fn reset(&mut self) {
        self.subscribed = false;
    }

    /// Notification for a chunk of incoming bytes, or `None` if unsubscribed
    pub fn deliver(&self, data: &[u8]) -> Option<Notification> {
        if !self.subscribed {
            return None;
        }
        Some(Notification::OnMessage {
            message: STANDARD.encode(data),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_decode_base64_with_and_without_padding() {
        assert_eq!(Encoding::Base64.decode("aGk=").unwrap(), b"hi");
        assert_eq!(Encoding::Base64.decode("aGk").unwrap(), b"hi");
        assert!(matches!(
            Encoding::Base64.decode("!!!"),
            Err(SessionError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_decode_text_encodings() {
        assert_eq!(Encoding::Utf8.decode("é").unwrap(), vec![0xC3, 0xA9]);
        assert_eq!(Encoding::Latin1.decode("é").unwrap(), vec![0xE9]);
        assert!(Encoding::Latin1.decode("€").is_err());
        assert_eq!(Encoding::Hex.decode("0aFF").unwrap(), vec![0x0A, 0xFF]);
    }

    #[test]
    fn test_encoding_names() {
        assert_eq!("UTF-8".parse::<Encoding>().unwrap(), Encoding::Utf8);
        assert_eq!("ascii".parse::<Encoding>().unwrap(), Encoding::Latin1);
        assert!("ucs2".parse::<Encoding>().is_err());

        let parsed: Encoding = serde_json::from_str("null").unwrap();
        assert_eq!(parsed, Encoding::Utf8);
        let parsed: Encoding = serde_json::from_str("\"base64\"").unwrap();
        assert_eq!(parsed, Encoding::Base64);
    }

    #[test]
    fn test_delivery_requires_subscription() {
        let mut channel = DataChannel::new();
        assert_eq!(channel.deliver(b"hi"), None);

        channel.subscribe();
        assert_eq!(
            channel.deliver(b"hi"),
            Some(Notification::OnMessage {
                message: "aGk=".into()
            })
        );

        channel.reset();
        assert!(!channel.is_subscribed());
        assert_eq!(channel.deliver(b"hi"), None);
    }

    proptest! {
        #[test]
        fn delivered_payload_decodes_to_input(data: Vec<u8>) {
            let mut channel = DataChannel::new();
            channel.subscribe();
            let Some(Notification::OnMessage { message }) = channel.deliver(&data) else {
                panic!("expected onMessage");
            };
            prop_assert_eq!(Encoding::Base64.decode(&message).unwrap(), data);
        }
    }
}
