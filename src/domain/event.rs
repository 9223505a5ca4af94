//! Domain events emitted on dial and membership changes.
//!
//! Events stay transport agnostic; inbound adapters forward them to
//! protocol-specific envelopes (e.g. WebSocket JSON frames) without
//! re-encoding domain logic. On the wire an event is a tagged value:
//! `{"type": "...", "payload": {...}}`.

use serde::{Deserialize, Serialize};

/// Payload for [`Event::DialValueChanged`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialValueChangedPayload {
    pub id: i32,
    pub value: i32,
}

/// Payload for [`Event::DialMembershipValueChanged`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialMembershipValueChangedPayload {
    pub id: i32,
    pub value: i32,
}

/// An event that occurs in the system, delivered to every member of the
/// affected dial through their subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    /// A dial's aggregate value changed.
    #[serde(rename = "dial:value_changed")]
    DialValueChanged(DialValueChangedPayload),

    /// A member changed their contribution to a dial.
    #[serde(rename = "dial_membership:value_changed")]
    DialMembershipValueChanged(DialMembershipValueChangedPayload),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    fn dial_value_changed_encodes_as_tagged_value() {
        let event = Event::DialValueChanged(DialValueChangedPayload { id: 3, value: 25 });
        let encoded = serde_json::to_value(&event).expect("serialize");
        assert_eq!(
            encoded,
            json!({"type": "dial:value_changed", "payload": {"id": 3, "value": 25}})
        );
    }

    #[rstest]
    fn membership_value_changed_round_trips() {
        let encoded = json!({
            "type": "dial_membership:value_changed",
            "payload": {"id": 7, "value": 60},
        });
        let event: Event = serde_json::from_value(encoded).expect("deserialize");
        assert_eq!(
            event,
            Event::DialMembershipValueChanged(DialMembershipValueChangedPayload {
                id: 7,
                value: 60,
            })
        );
    }
}
