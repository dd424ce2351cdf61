//! Socket message types
//!
//! Every frame in either direction is a JSON envelope `{ "type": ..,
//! "payload": .. }`. Outbound and inbound messages are closed tagged
//! unions; the raw envelope only exists at the transport boundary, where
//! inbound frames are decoded exactly once and unrecognized tags are
//! ignored rather than treated as fatal.

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod payload;
pub use payload::*;

/// Raw wire envelope, both directions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, payload: Option<serde_json::Value>) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Client -> server messages
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum ClientMessage {
    #[serde(rename = "subscribe:offers")]
    SubscribeOffers { pnr: String },
    #[serde(rename = "unsubscribe:offers")]
    UnsubscribeOffers { pnr: String },
    #[serde(rename = "ping")]
    Ping {},
}

impl ClientMessage {
    pub fn to_envelope(&self) -> Envelope {
        // ClientMessage serializes to the envelope shape directly; going
        // through Value keeps a single Envelope type at the transport seam.
        let value = serde_json::to_value(self).expect("client message is always serializable");
        serde_json::from_value(value).expect("client message matches the envelope shape")
    }
}

/// Semantic event kinds, used as the listener-registration key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NewOffer,
    OfferExpired,
    OfferAccepted,
    OfferDenied,
    AllocationConfirmed,
    AllocationRejected,
    BoardingStatus,
    TrainUpdate,
    Pong,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            EventKind::NewOffer => "upgrade:offer",
            EventKind::OfferExpired => "upgrade:expired",
            EventKind::OfferAccepted => "upgrade:accepted",
            EventKind::OfferDenied => "upgrade:denied",
            EventKind::AllocationConfirmed => "upgrade:confirmed",
            EventKind::AllocationRejected => "upgrade:rejected",
            EventKind::BoardingStatus => "passenger:boarding_status",
            EventKind::TrainUpdate => "train:update",
            EventKind::Pong => "pong",
        };
        write!(f, "{tag}")
    }
}

/// Server -> client messages, decoded from the raw envelope
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    NewOffer(OfferEventPayload),
    OfferExpired(NotificationRef),
    /// Echo of an accept this or another device submitted
    OfferAccepted(NotificationRef),
    /// Echo of a deny this or another device submitted
    OfferDenied(NotificationRef),
    AllocationConfirmed(ConfirmationPayload),
    AllocationRejected(RejectionPayload),
    BoardingStatus(BoardingStatusPayload),
    TrainUpdate(TrainUpdatePayload),
    Pong,
}

impl ServerMessage {
    /// Decode an inbound envelope.
    ///
    /// Returns `Ok(None)` for tags this client does not recognize; a payload
    /// that fails to parse for a known tag is an error the caller may log.
    pub fn decode(envelope: &Envelope) -> Result<Option<Self>, serde_json::Error> {
        fn parse<T: serde::de::DeserializeOwned>(
            payload: &Option<serde_json::Value>,
        ) -> Result<T, serde_json::Error> {
            match payload {
                Some(value) => serde_json::from_value(value.clone()),
                None => serde_json::from_value(serde_json::Value::Null),
            }
        }

        let message = match envelope.kind.as_str() {
            "upgrade:offer" => ServerMessage::NewOffer(parse(&envelope.payload)?),
            "upgrade:expired" => ServerMessage::OfferExpired(parse(&envelope.payload)?),
            "upgrade:accepted" => ServerMessage::OfferAccepted(parse(&envelope.payload)?),
            "upgrade:denied" => ServerMessage::OfferDenied(parse(&envelope.payload)?),
            "upgrade:confirmed" => ServerMessage::AllocationConfirmed(parse(&envelope.payload)?),
            "upgrade:rejected" => ServerMessage::AllocationRejected(parse(&envelope.payload)?),
            "passenger:boarding_status" => ServerMessage::BoardingStatus(parse(&envelope.payload)?),
            "train:update" => ServerMessage::TrainUpdate(parse(&envelope.payload)?),
            "pong" => ServerMessage::Pong,
            _ => return Ok(None),
        };
        Ok(Some(message))
    }

    pub fn kind(&self) -> EventKind {
        match self {
            ServerMessage::NewOffer(_) => EventKind::NewOffer,
            ServerMessage::OfferExpired(_) => EventKind::OfferExpired,
            ServerMessage::OfferAccepted(_) => EventKind::OfferAccepted,
            ServerMessage::OfferDenied(_) => EventKind::OfferDenied,
            ServerMessage::AllocationConfirmed(_) => EventKind::AllocationConfirmed,
            ServerMessage::AllocationRejected(_) => EventKind::AllocationRejected,
            ServerMessage::BoardingStatus(_) => EventKind::BoardingStatus,
            ServerMessage::TrainUpdate(_) => EventKind::TrainUpdate,
            ServerMessage::Pong => EventKind::Pong,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_envelope_shape() {
        let msg = ClientMessage::SubscribeOffers {
            pnr: "1234567890".to_string(),
        };
        let envelope = msg.to_envelope();
        assert_eq!(envelope.kind, "subscribe:offers");
        assert_eq!(
            envelope.payload.unwrap()["pnr"],
            serde_json::json!("1234567890")
        );
    }

    #[test]
    fn test_ping_wire_form() {
        let json = ClientMessage::Ping {}.to_envelope().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "ping");
    }

    #[test]
    fn test_decode_new_offer() {
        let envelope = Envelope::from_json(
            r#"{"type":"upgrade:offer","payload":{"notificationId":"n1","toBerth":"S1-22","coach":"S1","berthType":"LB","expiresAt":1700000060000}}"#,
        )
        .unwrap();

        match ServerMessage::decode(&envelope).unwrap() {
            Some(ServerMessage::NewOffer(payload)) => {
                assert_eq!(payload.notification_id.as_deref(), Some("n1"));
                assert_eq!(payload.to_berth.as_deref(), Some("S1-22"));
                assert_eq!(payload.expires_at, Some(1_700_000_060_000));
            }
            other => panic!("unexpected decode result: {other:?}"),
        }
    }

    #[test]
    fn test_decode_pong_without_payload() {
        let envelope = Envelope::from_json(r#"{"type":"pong"}"#).unwrap();
        assert_eq!(
            ServerMessage::decode(&envelope).unwrap(),
            Some(ServerMessage::Pong)
        );
    }

    #[test]
    fn test_unknown_tag_is_ignored() {
        let envelope =
            Envelope::from_json(r#"{"type":"catering:menu","payload":{"items":[]}}"#).unwrap();
        assert_eq!(ServerMessage::decode(&envelope).unwrap(), None);
    }

    #[test]
    fn test_event_kind_tags() {
        let envelope = Envelope::from_json(
            r#"{"type":"upgrade:confirmed","payload":{"notificationId":"n1"}}"#,
        )
        .unwrap();
        let message = ServerMessage::decode(&envelope).unwrap().unwrap();
        assert_eq!(message.kind(), EventKind::AllocationConfirmed);
        assert_eq!(message.kind().to_string(), "upgrade:confirmed");
    }
}
