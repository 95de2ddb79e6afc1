//! Delivery channels and the pure category/channel filters.
//!
//! Filtering is deliberately side-effect free: given preferences and an
//! event, decide whether the category passes and which channels remain
//! candidates. An empty channel set means the event is dropped silently.

mod router;

pub use router::{ChannelRouter, DeliveryOutcome, RouteError};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::event::Category;
use crate::preferences::RecipientPreferences;

/// Delivery surfaces the engine can route to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Persistent in-app notification feed
    InApp,
    /// Best-effort push to a live connection
    Websocket,
    /// Email, delivered via an external queue worker
    Email,
    /// Webhook, delivered via an external queue worker
    Webhook,
}

impl Channel {
    /// All channels, in routing order. In-app comes first so the websocket
    /// double-delivery check sees it.
    pub const ALL: [Channel; 4] = [
        Channel::InApp,
        Channel::Websocket,
        Channel::Email,
        Channel::Webhook,
    ];

    /// Whether delivery is handed to an external queue worker.
    pub fn is_queued(&self) -> bool {
        matches!(self, Channel::Email | Channel::Webhook)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::InApp => "in_app",
            Channel::Websocket => "websocket",
            Channel::Email => "email",
            Channel::Webhook => "webhook",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decide whether an event category passes the recipient's category toggles.
///
/// `System` always passes: protocol-wide safety broadcasts must not be
/// silenceable.
pub fn category_passes(prefs: &RecipientPreferences, category: Category) -> bool {
    match category {
        Category::System => true,
        Category::Financial => prefs.categories.financial,
        Category::Auth => prefs.categories.auth,
        Category::Compliance => prefs.categories.compliance,
        Category::Governance => prefs.categories.governance,
    }
}

/// Intersect requested channels with the recipient's enabled channels.
///
/// `Websocket` is always considered enabled: pushing to a live connection is
/// opportunistic and harmless to attempt. The master toggle gates everything,
/// including in-app and websocket.
pub fn eligible_channels(
    prefs: &RecipientPreferences,
    requested: Option<&SmallVec<[Channel; 4]>>,
) -> SmallVec<[Channel; 4]> {
    if !prefs.enabled {
        return SmallVec::new();
    }

    let candidates: &[Channel] = match requested {
        Some(channels) => channels.as_slice(),
        None => &Channel::ALL,
    };

    candidates
        .iter()
        .copied()
        .filter(|channel| match channel {
            Channel::InApp => prefs.channels.in_app,
            Channel::Websocket => true,
            Channel::Email => prefs.channels.email,
            Channel::Webhook => prefs.channels.webhook,
        })
        .collect()
}
