//! Recipient delivery preferences.
//!
//! Preferences are read-mostly, loaded on demand from an external store, and
//! cached for a bounded TTL. The resolver never fails: any lookup problem
//! degrades to a documented default set.

mod resolver;

pub use resolver::{PreferenceResolver, ResolverConfig, ResolverStats};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors a preference store lookup can produce.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backing store unreachable or timed out
    #[error("Preference store unavailable: {0}")]
    Unavailable(String),

    /// Stored record could not be decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Per-channel delivery toggles.
///
/// Websocket carries no toggle: pushing to a live connection is
/// opportunistic and harmless, so it is always a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelToggles {
    pub in_app: bool,
    pub email: bool,
    pub webhook: bool,
}

impl Default for ChannelToggles {
    fn default() -> Self {
        Self {
            in_app: true,
            email: true,
            webhook: false,
        }
    }
}

/// Per-category enable flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryToggles {
    pub financial: bool,
    pub auth: bool,
    pub compliance: bool,
    pub governance: bool,
}

impl Default for CategoryToggles {
    fn default() -> Self {
        Self {
            financial: true,
            auth: true,
            compliance: true,
            governance: false,
        }
    }
}

/// Digest settings. Carried for completeness; digest scheduling is handled
/// by an external collaborator, not by delivery routing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DigestSettings {
    pub enabled: bool,
    /// Delivery interval in hours when enabled
    pub interval_hours: u32,
}

/// A recipient's resolved delivery configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientPreferences {
    /// Master toggle gating all channels, including in-app and websocket
    pub enabled: bool,
    pub channels: ChannelToggles,
    pub categories: CategoryToggles,
    pub digest: DigestSettings,
}

impl Default for RecipientPreferences {
    fn default() -> Self {
        Self {
            enabled: true,
            channels: ChannelToggles::default(),
            categories: CategoryToggles::default(),
            digest: DigestSettings::default(),
        }
    }
}

/// External preference store contract.
///
/// Implementations must be thread-safe (`Send + Sync`) as they are shared
/// across many concurrent emit tasks.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Fetch stored preferences, `Ok(None)` when no record exists.
    async fn get(&self, recipient_id: &str) -> Result<Option<RecipientPreferences>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_preferences() {
        let prefs = RecipientPreferences::default();
        assert!(prefs.enabled);
        assert!(prefs.channels.in_app);
        assert!(prefs.channels.email);
        assert!(!prefs.channels.webhook);
        assert!(prefs.categories.financial);
        assert!(!prefs.categories.governance);
        assert!(!prefs.digest.enabled);
    }
}
