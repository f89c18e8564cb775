//! JSON messages exchanged over `/ws/detect`.
//!
//! Outbound: `{"type":"frame","data":<base64 jpeg>,"confidence":..,"feedId":..,"alert_config":{..}}`
//! Inbound: `{"type":"detection_result"|"alert"|"ping"|"pong","data":..}`

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::alerts::RemoteAlert;
use crate::config::DetectionConfig;
use crate::detect::FrameResult;
use crate::feed::FeedId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertConfig {
    pub max_people: u32,
    pub alert_enabled: bool,
}

impl From<&DetectionConfig> for AlertConfig {
    fn from(cfg: &DetectionConfig) -> Self {
        Self {
            max_people: cfg.max_people,
            alert_enabled: cfg.alert_enabled,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Frame {
        data: String,
        confidence: f32,
        #[serde(rename = "feedId")]
        feed_id: FeedId,
        alert_config: AlertConfig,
    },
    Pong,
}

impl OutboundMessage {
    pub fn frame(data: String, feed_id: FeedId, cfg: &DetectionConfig) -> Self {
        OutboundMessage::Frame {
            data,
            confidence: cfg.confidence,
            feed_id,
            alert_config: AlertConfig::from(cfg),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("serialize outbound message")
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum InboundMessage {
    DetectionResult(FrameResult),
    Alert(RemoteAlert),
    Ping,
    Pong,
    Unknown(String),
}

#[derive(Deserialize)]
struct RawInbound {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

pub fn parse_inbound(text: &str) -> Result<InboundMessage> {
    let raw: RawInbound = serde_json::from_str(text).context("parse inbound message")?;
    let message = match raw.kind.as_str() {
        "detection_result" => InboundMessage::DetectionResult(
            serde_json::from_value(raw.data).context("parse detection_result payload")?,
        ),
        "alert" => InboundMessage::Alert(
            serde_json::from_value(raw.data).context("parse alert payload")?,
        ),
        "ping" => InboundMessage::Ping,
        "pong" => InboundMessage::Pong,
        _ => InboundMessage::Unknown(raw.kind),
    };
    Ok(message)
}

/// Protocol-level reply owed for an inbound message, if any.
pub fn reply_for(message: &InboundMessage) -> Option<OutboundMessage> {
    match message {
        InboundMessage::Ping => Some(OutboundMessage::Pong),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::Severity;

    #[test]
    fn frame_message_shape() {
        let cfg = DetectionConfig {
            confidence: 0.6,
            max_people: 12,
            alert_enabled: true,
            ..DetectionConfig::default()
        };
        let msg = OutboundMessage::frame("QUJD".to_string(), FeedId::new("feed2"), &cfg);
        let value: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "frame");
        assert_eq!(value["data"], "QUJD");
        assert_eq!(value["feedId"], "feed2");
        assert!((value["confidence"].as_f64().unwrap() - 0.6).abs() < 1e-6);
        assert_eq!(value["alert_config"]["max_people"], 12);
        assert_eq!(value["alert_config"]["alert_enabled"], true);
    }

    #[test]
    fn pong_message_shape() {
        assert_eq!(OutboundMessage::Pong.to_json().unwrap(), r#"{"type":"pong"}"#);
    }

    #[test]
    fn parses_detection_result() {
        let msg = parse_inbound(
            r#"{"type":"detection_result","data":{"detections":[{"bbox":[1,2,3,4],"confidence":0.8}],"people_count":1,"processing_time":0.03}}"#,
        )
        .unwrap();
        match msg {
            InboundMessage::DetectionResult(result) => {
                assert_eq!(result.people_count(), 1);
                assert_eq!(result.detections[0].bbox, [1.0, 2.0, 3.0, 4.0]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_alert_ping_and_unknown() {
        match parse_inbound(r#"{"type":"alert","data":{"message":"too many","severity":"high"}}"#)
            .unwrap()
        {
            InboundMessage::Alert(alert) => assert_eq!(alert.severity, Severity::High),
            other => panic!("unexpected {:?}", other),
        }
        let ping = parse_inbound(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(reply_for(&ping), Some(OutboundMessage::Pong));
        assert_eq!(
            parse_inbound(r#"{"type":"stats","data":{}}"#).unwrap(),
            InboundMessage::Unknown("stats".to_string())
        );
        assert!(parse_inbound("not json").is_err());
    }
}
