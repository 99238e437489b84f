use serde::{Deserialize, Serialize};

use crate::error::{AlertError, Result};

/// Wire message exchanged with an alert server
///
/// The protocol is newline-delimited JSON over TCP. The server opens every
/// session with a `hello` identifying itself; after that either side may
/// send `alert` level updates at any time. A `bye` announces an orderly
/// shutdown; an EOF without `bye` is an implicit disconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    /// Session handshake sent by the server on connect
    Hello {
        /// Server-assigned device identity
        id: String,
        /// Optional human-readable device name
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },

    /// Alert level update; 0 means inactive, any nonzero value is active
    Alert { level: u32 },

    /// Orderly disconnect announcement
    Bye,
}

impl Message {
    /// Encode as a single protocol line (newline included)
    pub fn to_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Decode a single protocol line
    pub fn from_line(line: &str) -> Result<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Err(AlertError::InvalidMessage("empty line".to_string()));
        }

        serde_json::from_str(trimmed)
            .map_err(|e| AlertError::InvalidMessage(format!("{}: {}", e, trimmed)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_round_trip() {
        let msg = Message::Hello {
            id: "dev-42".to_string(),
            name: Some("Hallway".to_string()),
        };

        let line = msg.to_line().unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(Message::from_line(&line).unwrap(), msg);
    }

    #[test]
    fn hello_without_name() {
        let msg = Message::from_line(r#"{"type":"hello","id":"abc"}"#).unwrap();
        assert_eq!(
            msg,
            Message::Hello {
                id: "abc".to_string(),
                name: None
            }
        );
    }

    #[test]
    fn alert_level() {
        let line = r#"{"type":"alert","level":3}"#;
        assert_eq!(Message::from_line(line).unwrap(), Message::Alert { level: 3 });
    }

    #[test]
    fn rejects_garbage() {
        assert!(Message::from_line("not json").is_err());
        assert!(Message::from_line("").is_err());
        assert!(Message::from_line(r#"{"type":"unknown"}"#).is_err());
    }
}
