//! Decoding of inbound control messages
use log::{debug, warn};
use serde::Deserialize;

use crate::models::AlertState;

/// Optional-boolean view of a command message.
///
/// Decoding goes through `serde_json`, so insignificant whitespace around the
/// key/value separator is accepted: `{"vibrate": true}` and
/// `{"vibrate":true}` mean the same thing. Unknown keys are ignored.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
pub struct Command {
    #[serde(default)]
    pub vibrate: Option<bool>,
    #[serde(default)]
    pub crash_detected: Option<bool>,
}

/// Parse a raw payload, returning None when it is not a JSON object of the
/// expected shape
pub fn decode(raw: &[u8]) -> Option<Command> {
    match serde_json::from_slice::<Command>(raw) {
        Ok(command) => Some(command),
        Err(e) => {
            debug!("Ignoring malformed command ({}): {}", e, String::from_utf8_lossy(raw));
            None
        }
    }
}

/// Map an inbound message to the new alert state
///
/// Only `vibrate: true` raises the drowsiness alert. A crash notification is
/// logged but leaves the alert state to the vibrate field. Anything else,
/// including malformed input, resets to Normal.
pub fn interpret(raw: &[u8]) -> AlertState {
    let command = decode(raw).unwrap_or_default();

    if command.crash_detected == Some(true) {
        warn!("Crash detected by monitoring service, emergency services notified");
    }

    if command.vibrate == Some(true) {
        warn!("Helmet vibrating: drowsiness detected");
        AlertState::Drowsy
    } else {
        AlertState::Normal
    }
}
