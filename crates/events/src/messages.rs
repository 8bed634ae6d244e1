//! Event bus message types and parser.
//!
//! The server sends JSON frames shaped `{"type": "<kind>", "data": {...}}`.
//! Every frame is decoded into the [`BusEvent`] union at the transport
//! boundary; unknown types or shapes fail to parse and are dropped by
//! the caller.

use coldreach_core::event_names;
use coldreach_core::types::{CampaignId, Timestamp};
use serde::{Deserialize, Serialize};

/// All known inbound event bus messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum BusEvent {
    CampaignProgress(CampaignProgressData),
    CampaignProgressDetailed(CampaignProgressDetailedData),
    CampaignStatus(CampaignStatusData),
    CampaignStatusDetailed(CampaignStatusDetailedData),
    SystemNotification(NotificationData),
    ErrorNotification(ErrorNotificationData),
    /// Periodic heartbeat from the server, used for latency estimation.
    ServerMetrics(ServerMetricsData),
    /// Ordered list of other events delivered in one frame.
    ProgressBatch(ProgressBatchData),
    UsageUpdate(UsageUpdateData),
    BillingAlert(BillingAlertData),
}

/// Discriminant of [`BusEvent`], used as the handler registration key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    CampaignProgress,
    CampaignProgressDetailed,
    CampaignStatus,
    CampaignStatusDetailed,
    SystemNotification,
    ErrorNotification,
    ServerMetrics,
    ProgressBatch,
    UsageUpdate,
    BillingAlert,
}

impl EventKind {
    /// Wire name carried in the envelope's `type` field.
    pub fn name(self) -> &'static str {
        match self {
            EventKind::CampaignProgress => event_names::CAMPAIGN_PROGRESS,
            EventKind::CampaignProgressDetailed => event_names::CAMPAIGN_PROGRESS_DETAILED,
            EventKind::CampaignStatus => event_names::CAMPAIGN_STATUS,
            EventKind::CampaignStatusDetailed => event_names::CAMPAIGN_STATUS_DETAILED,
            EventKind::SystemNotification => event_names::SYSTEM_NOTIFICATION,
            EventKind::ErrorNotification => event_names::ERROR_NOTIFICATION,
            EventKind::ServerMetrics => event_names::SERVER_METRICS,
            EventKind::ProgressBatch => event_names::PROGRESS_BATCH,
            EventKind::UsageUpdate => event_names::USAGE_UPDATE,
            EventKind::BillingAlert => event_names::BILLING_ALERT,
        }
    }
}

impl BusEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            BusEvent::CampaignProgress(_) => EventKind::CampaignProgress,
            BusEvent::CampaignProgressDetailed(_) => EventKind::CampaignProgressDetailed,
            BusEvent::CampaignStatus(_) => EventKind::CampaignStatus,
            BusEvent::CampaignStatusDetailed(_) => EventKind::CampaignStatusDetailed,
            BusEvent::SystemNotification(_) => EventKind::SystemNotification,
            BusEvent::ErrorNotification(_) => EventKind::ErrorNotification,
            BusEvent::ServerMetrics(_) => EventKind::ServerMetrics,
            BusEvent::ProgressBatch(_) => EventKind::ProgressBatch,
            BusEvent::UsageUpdate(_) => EventKind::UsageUpdate,
            BusEvent::BillingAlert(_) => EventKind::BillingAlert,
        }
    }
}

/// Severity shared by notifications and billing alerts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }
}

/// Payload for `campaign_progress`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignProgressData {
    pub campaign_id: CampaignId,
    pub current: u64,
    pub total: u64,
    /// Server-computed percentage; derived from the counters when absent.
    #[serde(default)]
    pub percentage: Option<f64>,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Payload for `campaign_progress_detailed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignProgressDetailedData {
    #[serde(flatten)]
    pub progress: CampaignProgressData,
    #[serde(default)]
    pub sent: u64,
    #[serde(default)]
    pub failed: u64,
    #[serde(default)]
    pub skipped: u64,
    #[serde(default)]
    pub estimated_remaining_seconds: Option<f64>,
}

/// Payload for `campaign_status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignStatusData {
    pub campaign_id: CampaignId,
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// Payload for `campaign_status_detailed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignStatusDetailedData {
    pub campaign_id: CampaignId,
    pub status: String,
    #[serde(default)]
    pub previous_status: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
}

/// Payload for `system_notification`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationData {
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub severity: Severity,
}

/// Payload for `error_notification`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorNotificationData {
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub campaign_id: Option<CampaignId>,
}

/// Payload for `server_metrics`.
///
/// When the server echoes the `clientTime` of our last `ping`, the
/// difference to now is a full round trip. Otherwise `serverTime` gives
/// a one-way estimate that includes clock skew.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMetricsData {
    /// Epoch milliseconds echoed from the client's `ping`.
    #[serde(default)]
    pub client_time: Option<i64>,
    /// Epoch milliseconds at which the server emitted this frame.
    #[serde(default)]
    pub server_time: Option<i64>,
    #[serde(default)]
    pub active_connections: Option<u64>,
}

/// Payload for `progress_batch`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressBatchData {
    pub events: Vec<BusEvent>,
}

/// Payload for `usage_update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageUpdateData {
    pub metric: String,
    pub period: String,
    pub current: f64,
    pub limit: f64,
    #[serde(default)]
    pub percentage: Option<f64>,
}

/// Payload for `billing_alert`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingAlertData {
    /// Server-assigned id; the billing monitor derives one when absent.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub severity: Severity,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
}

/// Frames the client sends to the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    SubscribeCampaign { campaign_id: CampaignId },
    #[serde(rename_all = "camelCase")]
    UnsubscribeCampaign { campaign_id: CampaignId },
    #[serde(rename_all = "camelCase")]
    Ping { client_time: i64 },
}

impl ClientMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Parse an event bus text frame into a typed event.
///
/// Returns `Err` for malformed JSON or unknown `type` values. Callers
/// should log and continue.
pub fn parse_event(text: &str) -> Result<BusEvent, serde_json::Error> {
    serde_json::from_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_campaign_progress() {
        let json = r#"{"type":"campaign_progress","data":{"campaignId":"c-1","current":20,"total":80,"stage":"sending"}}"#;
        match parse_event(json).unwrap() {
            BusEvent::CampaignProgress(data) => {
                assert_eq!(data.campaign_id, "c-1");
                assert_eq!(data.current, 20);
                assert_eq!(data.total, 80);
                assert!(data.percentage.is_none());
                assert_eq!(data.stage.as_deref(), Some("sending"));
            }
            other => panic!("Expected CampaignProgress, got {other:?}"),
        }
    }

    #[test]
    fn parse_detailed_progress_flattens_base_fields() {
        let json = r#"{"type":"campaign_progress_detailed","data":{"campaignId":"c-2","current":5,"total":10,"percentage":50,"sent":4,"failed":1}}"#;
        match parse_event(json).unwrap() {
            BusEvent::CampaignProgressDetailed(data) => {
                assert_eq!(data.progress.campaign_id, "c-2");
                assert_eq!(data.progress.percentage, Some(50.0));
                assert_eq!(data.sent, 4);
                assert_eq!(data.failed, 1);
                assert_eq!(data.skipped, 0);
            }
            other => panic!("Expected CampaignProgressDetailed, got {other:?}"),
        }
    }

    #[test]
    fn parse_billing_alert_without_id() {
        let json = r#"{"type":"billing_alert","data":{"severity":"warning","title":"Almost out","message":"90% of emails used"}}"#;
        match parse_event(json).unwrap() {
            BusEvent::BillingAlert(data) => {
                assert!(data.id.is_none());
                assert_eq!(data.severity, Severity::Warning);
                assert_eq!(data.title, "Almost out");
            }
            other => panic!("Expected BillingAlert, got {other:?}"),
        }
    }

    #[test]
    fn parse_progress_batch_keeps_order() {
        let json = r#"{"type":"progress_batch","data":{"events":[
            {"type":"campaign_status","data":{"campaignId":"c-1","status":"running"}},
            {"type":"usage_update","data":{"metric":"emails","period":"2026-10","current":10,"limit":100}},
            {"type":"campaign_status","data":{"campaignId":"c-1","status":"paused"}}
        ]}}"#;
        match parse_event(json).unwrap() {
            BusEvent::ProgressBatch(batch) => {
                let kinds: Vec<EventKind> = batch.events.iter().map(BusEvent::kind).collect();
                assert_eq!(
                    kinds,
                    vec![
                        EventKind::CampaignStatus,
                        EventKind::UsageUpdate,
                        EventKind::CampaignStatus
                    ]
                );
            }
            other => panic!("Expected ProgressBatch, got {other:?}"),
        }
    }

    #[test]
    fn parse_server_metrics_with_echo() {
        let json = r#"{"type":"server_metrics","data":{"clientTime":1000,"serverTime":1020}}"#;
        match parse_event(json).unwrap() {
            BusEvent::ServerMetrics(data) => {
                assert_eq!(data.client_time, Some(1000));
                assert_eq!(data.server_time, Some(1020));
            }
            other => panic!("Expected ServerMetrics, got {other:?}"),
        }
    }

    #[test]
    fn notification_severity_defaults_to_info() {
        let json = r#"{"type":"system_notification","data":{"title":"Maintenance","message":"Tonight"}}"#;
        match parse_event(json).unwrap() {
            BusEvent::SystemNotification(data) => assert_eq!(data.severity, Severity::Info),
            other => panic!("Expected SystemNotification, got {other:?}"),
        }
    }

    #[test]
    fn kind_names_match_wire_names() {
        let event = parse_event(
            r#"{"type":"error_notification","data":{"message":"SMTP rejected"}}"#,
        )
        .unwrap();
        assert_eq!(event.kind().name(), "error_notification");
        assert_eq!(EventKind::CampaignStatusDetailed.name(), "campaign_status_detailed");
    }

    #[test]
    fn unknown_type_returns_error() {
        assert!(parse_event(r#"{"type":"lead_created","data":{}}"#).is_err());
    }

    #[test]
    fn wrong_shape_returns_error() {
        assert!(parse_event(r#"{"type":"usage_update","data":{"metric":"emails"}}"#).is_err());
    }

    #[test]
    fn subscribe_frame_shape() {
        let frame = ClientMessage::SubscribeCampaign {
            campaign_id: "c-9".into(),
        };
        let value: serde_json::Value = serde_json::from_str(&frame.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "subscribe_campaign");
        assert_eq!(value["data"]["campaignId"], "c-9");

        let frame = ClientMessage::UnsubscribeCampaign {
            campaign_id: "c-9".into(),
        };
        let value: serde_json::Value = serde_json::from_str(&frame.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "unsubscribe_campaign");
    }

    #[test]
    fn ping_frame_shape() {
        let frame = ClientMessage::Ping { client_time: 42 };
        let value: serde_json::Value = serde_json::from_str(&frame.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "ping");
        assert_eq!(value["data"]["clientTime"], 42);
    }
}
