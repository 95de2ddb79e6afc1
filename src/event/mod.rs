//! Notification event model.
//!
//! Events are immutable values produced by upstream domain logic (health
//! monitoring, liquidation execution, governance, compliance). The engine
//! consumes each event exactly once per logical emission and never mutates it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use uuid::Uuid;

use crate::channel::Channel;

/// Closed taxonomy of domain events the engine can fan out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// Health factor dipped below the caution threshold
    HealthFactorCaution,
    /// Health factor dipped below the danger threshold
    HealthFactorDanger,
    /// Health factor dipped below the critical threshold
    HealthFactorCritical,
    /// Position is eligible for liquidation soon
    LiquidationWarning,
    /// Position was liquidated
    LiquidationExecuted,
    /// New governance proposal opened for voting
    GovernanceProposalCreated,
    /// Governance vote closed with a result
    GovernanceVoteClosed,
    /// KYB verification approved
    KybApproved,
    /// KYB verification rejected
    KybRejected,
    /// KYB reviewer requested additional documents
    KybInfoRequested,
    /// Login from a previously unseen device
    LoginNewDevice,
    /// Account password was changed
    PasswordChanged,
    /// Protocol-wide operator broadcast
    SystemBroadcast,
    /// Scheduled maintenance announcement
    SystemMaintenance,
}

impl EventType {
    /// Category this event type belongs to.
    pub fn category(&self) -> Category {
        match self {
            Self::HealthFactorCaution
            | Self::HealthFactorDanger
            | Self::HealthFactorCritical
            | Self::LiquidationWarning
            | Self::LiquidationExecuted => Category::Financial,
            Self::GovernanceProposalCreated | Self::GovernanceVoteClosed => Category::Governance,
            Self::KybApproved | Self::KybRejected | Self::KybInfoRequested => Category::Compliance,
            Self::LoginNewDevice | Self::PasswordChanged => Category::Auth,
            Self::SystemBroadcast | Self::SystemMaintenance => Category::System,
        }
    }

    /// Default severity for this event type.
    pub fn default_severity(&self) -> Severity {
        match self {
            Self::HealthFactorCaution => Severity::Info,
            Self::HealthFactorDanger => Severity::Warning,
            Self::HealthFactorCritical => Severity::Critical,
            Self::LiquidationWarning => Severity::Warning,
            Self::LiquidationExecuted => Severity::Critical,
            Self::GovernanceProposalCreated | Self::GovernanceVoteClosed => Severity::Info,
            Self::KybApproved => Severity::Info,
            Self::KybRejected | Self::KybInfoRequested => Severity::Warning,
            Self::LoginNewDevice => Severity::Warning,
            Self::PasswordChanged => Severity::Info,
            Self::SystemBroadcast => Severity::Info,
            Self::SystemMaintenance => Severity::Warning,
        }
    }

    /// Position of this type on the liquidation-risk escalation ladder.
    ///
    /// A type with a higher rank supersedes records left by lower-ranked
    /// types for the same tracked position, so a worsening position is never
    /// suppressed by an earlier, milder notification. Returns `None` for
    /// types outside the ladder.
    pub fn risk_rank(&self) -> Option<u8> {
        match self {
            Self::HealthFactorCaution => Some(0),
            Self::HealthFactorDanger => Some(1),
            Self::HealthFactorCritical => Some(2),
            Self::LiquidationWarning => Some(3),
            Self::LiquidationExecuted => Some(4),
            _ => None,
        }
    }

    /// Stable wire name, used in dedup keys and redis keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HealthFactorCaution => "HEALTH_FACTOR_CAUTION",
            Self::HealthFactorDanger => "HEALTH_FACTOR_DANGER",
            Self::HealthFactorCritical => "HEALTH_FACTOR_CRITICAL",
            Self::LiquidationWarning => "LIQUIDATION_WARNING",
            Self::LiquidationExecuted => "LIQUIDATION_EXECUTED",
            Self::GovernanceProposalCreated => "GOVERNANCE_PROPOSAL_CREATED",
            Self::GovernanceVoteClosed => "GOVERNANCE_VOTE_CLOSED",
            Self::KybApproved => "KYB_APPROVED",
            Self::KybRejected => "KYB_REJECTED",
            Self::KybInfoRequested => "KYB_INFO_REQUESTED",
            Self::LoginNewDevice => "LOGIN_NEW_DEVICE",
            Self::PasswordChanged => "PASSWORD_CHANGED",
            Self::SystemBroadcast => "SYSTEM_BROADCAST",
            Self::SystemMaintenance => "SYSTEM_MAINTENANCE",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The liquidation-risk escalation ladder, in ascending rank order.
pub const RISK_LADDER: [EventType; 5] = [
    EventType::HealthFactorCaution,
    EventType::HealthFactorDanger,
    EventType::HealthFactorCritical,
    EventType::LiquidationWarning,
    EventType::LiquidationExecuted,
];

/// Notification categories recipients can toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Financial,
    Auth,
    Compliance,
    Governance,
    /// Protocol-wide safety broadcasts; never silenceable.
    System,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Financial => "financial",
            Self::Auth => "auth",
            Self::Compliance => "compliance",
            Self::Governance => "governance",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity levels for notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Critical,
}

impl Severity {
    /// Numeric delivery-job priority. Lower value dequeues first.
    pub fn job_priority(&self) -> u8 {
        match self {
            Self::Critical => 1,
            Self::Warning => 5,
            Self::Info => 10,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A notification event, immutable after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    /// Unique identifier for this notification
    pub id: Uuid,
    /// When the event was created
    pub created_at: DateTime<Utc>,
    /// Event type
    pub event_type: EventType,
    /// Recipient of the notification
    pub recipient_id: String,
    /// Category (derived from type unless overridden upstream)
    pub category: Category,
    /// Severity
    pub severity: Severity,
    /// Short human-readable title
    pub title: String,
    /// Longer human-readable message
    pub message: String,
    /// Opaque event payload
    pub payload: serde_json::Value,
    /// Explicit channel override; `None` means all channels are candidates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_channels: Option<SmallVec<[Channel; 4]>>,
    /// Dedup key override; `None` defaults to `recipientId:type`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedup_key: Option<String>,
}

impl NotificationEvent {
    /// Create a builder for the given type and recipient.
    pub fn builder(event_type: EventType, recipient_id: impl Into<String>) -> EventBuilder {
        EventBuilder::new(event_type, recipient_id)
    }

    /// Logical identity of "this same notification" for suppression.
    pub fn effective_dedup_key(&self) -> String {
        match &self.dedup_key {
            Some(key) => key.clone(),
            None => format!("{}:{}", self.recipient_id, self.event_type),
        }
    }
}

/// Builder for notification events.
#[derive(Debug, Clone)]
pub struct EventBuilder {
    event_type: EventType,
    recipient_id: String,
    severity: Severity,
    title: String,
    message: String,
    payload: serde_json::Value,
    requested_channels: Option<SmallVec<[Channel; 4]>>,
    dedup_key: Option<String>,
}

impl EventBuilder {
    pub fn new(event_type: EventType, recipient_id: impl Into<String>) -> Self {
        Self {
            event_type,
            recipient_id: recipient_id.into(),
            severity: event_type.default_severity(),
            title: String::new(),
            message: String::new(),
            payload: serde_json::Value::Null,
            requested_channels: None,
            dedup_key: None,
        }
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Restrict delivery to the given channels.
    pub fn channels(mut self, channels: impl IntoIterator<Item = Channel>) -> Self {
        self.requested_channels = Some(channels.into_iter().collect());
        self
    }

    /// Override the dedup key, e.g. to scope suppression to a position.
    pub fn dedup_key(mut self, key: impl Into<String>) -> Self {
        self.dedup_key = Some(key.into());
        self
    }

    pub fn build(self) -> NotificationEvent {
        NotificationEvent {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            event_type: self.event_type,
            category: self.event_type.category(),
            severity: self.severity,
            recipient_id: self.recipient_id,
            title: self.title,
            message: self.message,
            payload: self.payload,
            requested_channels: self.requested_channels,
            dedup_key: self.dedup_key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_defaults() {
        let event = NotificationEvent::builder(EventType::LiquidationWarning, "u1")
            .title("Position at risk")
            .payload(json!({"position_id": "pos-42"}))
            .build();

        assert_eq!(event.recipient_id, "u1");
        assert_eq!(event.category, Category::Financial);
        assert_eq!(event.severity, Severity::Warning);
        assert_eq!(event.effective_dedup_key(), "u1:LIQUIDATION_WARNING");
    }

    #[test]
    fn test_dedup_key_override() {
        let event = NotificationEvent::builder(EventType::LiquidationWarning, "u1")
            .dedup_key("u1:pos-42")
            .build();
        assert_eq!(event.effective_dedup_key(), "u1:pos-42");
    }

    #[test]
    fn test_risk_ladder_ordering() {
        let ladder = [
            EventType::HealthFactorCaution,
            EventType::HealthFactorDanger,
            EventType::HealthFactorCritical,
            EventType::LiquidationWarning,
            EventType::LiquidationExecuted,
        ];
        for pair in ladder.windows(2) {
            assert!(pair[0].risk_rank() < pair[1].risk_rank());
        }
        assert_eq!(EventType::KybApproved.risk_rank(), None);
    }

    #[test]
    fn test_severity_job_priority() {
        assert!(Severity::Critical.job_priority() < Severity::Warning.job_priority());
        assert!(Severity::Warning.job_priority() < Severity::Info.job_priority());
    }

    #[test]
    fn test_category_mapping() {
        assert_eq!(EventType::SystemBroadcast.category(), Category::System);
        assert_eq!(EventType::KybRejected.category(), Category::Compliance);
        assert_eq!(
            EventType::GovernanceProposalCreated.category(),
            Category::Governance
        );
        assert_eq!(EventType::LoginNewDevice.category(), Category::Auth);
    }
}
