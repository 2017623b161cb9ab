//! Wire events for the console stream.
//!
//! Events travel as JSON text frames of the form
//! `{"event": "<name>", "data": <payload>}`. Payloads are plain strings —
//! either raw command text (inbound) or sanitized markup (outbound).

use crate::error::WconResult;
use serde::{Deserialize, Serialize};

/// One event on the viewer connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum WireEvent {
    /// Raw command text submitted by a viewer.
    ConsoleCommand(String),
    /// Sanitized console markup: a history replay, a periodic batch, or an
    /// inline notice addressed to a single viewer.
    ConsoleData(String),
    /// Directive instructing the client to clear its local session state.
    /// Always followed by a server-side disconnect.
    Logout,
}

/// Encode an event into its JSON text frame.
pub fn encode_event(event: &WireEvent) -> WconResult<String> {
    Ok(serde_json::to_string(event)?)
}

/// Decode a JSON text frame into an event.
pub fn decode_event(text: &str) -> WconResult<WireEvent> {
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_command() {
        let ev = WireEvent::ConsoleCommand("say hello".into());
        let text = encode_event(&ev).unwrap();
        assert_eq!(decode_event(&text).unwrap(), ev);
    }

    #[test]
    fn event_names_match_wire_convention() {
        let data = encode_event(&WireEvent::ConsoleData("<mark>x</mark>".into())).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&data).unwrap();
        assert_eq!(parsed["event"], "consoleData");
        assert_eq!(parsed["data"], "<mark>x</mark>");

        let cmd = encode_event(&WireEvent::ConsoleCommand("restart".into())).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&cmd).unwrap();
        assert_eq!(parsed["event"], "consoleCommand");
    }

    #[test]
    fn logout_has_no_payload() {
        let text = encode_event(&WireEvent::Logout).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["event"], "logout");
        assert!(parsed.get("data").is_none());
        assert_eq!(decode_event(&text).unwrap(), WireEvent::Logout);
    }

    #[test]
    fn rejects_unknown_event() {
        assert!(decode_event(r#"{"event":"shutdown","data":"now"}"#).is_err());
        assert!(decode_event("not json").is_err());
    }
}
