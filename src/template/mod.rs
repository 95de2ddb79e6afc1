//! Email template mapping.
//!
//! Fixed lookup from event type to the template identifier the mail worker
//! renders with. The closed `EventType` enum makes an unmapped type a
//! compile error rather than a runtime fallback; `GENERIC_DIGEST` remains
//! the identifier for digest-style rendering of aggregated content.

use crate::event::EventType;

/// Template used for digest-style aggregated rendering.
pub const GENERIC_DIGEST: &str = "generic-digest";

/// Template identifier for an event type.
pub fn template_for(event_type: EventType) -> &'static str {
    match event_type {
        EventType::HealthFactorCaution => "health-factor-caution",
        EventType::HealthFactorDanger => "health-factor-danger",
        EventType::HealthFactorCritical => "health-factor-critical",
        EventType::LiquidationWarning => "liquidation-warning",
        EventType::LiquidationExecuted => "liquidation-executed",
        EventType::GovernanceProposalCreated => "governance-proposal",
        EventType::GovernanceVoteClosed => "governance-vote-closed",
        EventType::KybApproved => "kyb-approved",
        EventType::KybRejected => "kyb-rejected",
        EventType::KybInfoRequested => "kyb-info-requested",
        EventType::LoginNewDevice => "login-new-device",
        EventType::PasswordChanged => "password-changed",
        EventType::SystemBroadcast => "system-broadcast",
        EventType::SystemMaintenance => "system-maintenance",
    }
}
