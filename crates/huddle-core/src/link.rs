//! Observable link state.

use std::fmt;

/// State of a room's real-time link, as shown by status indicators.
///
/// ```text
/// Disconnected ──connect──> Connecting ──ok──> Connected
///       ^                     │    ^              │
///       │ offline/exhausted   │    │ retry due    │ lost
///       │                     v    │              │
///       └──────────────── Reconnecting <──────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LinkState {
    /// No link and no retry scheduled.
    #[default]
    Disconnected,
    /// A dial is in progress.
    Connecting,
    /// Link established and subscribed.
    Connected,
    /// Waiting for a scheduled retry.
    Reconnecting,
}

impl LinkState {
    /// Lowercase label (`connected`, `connecting`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }

    /// True if the link is usable or about to be.
    ///
    /// A cached link in one of these states is reused instead of dialing
    /// again.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Connected | Self::Connecting)
    }

    /// Compact encoding for atomic storage.
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Connected => 2,
            Self::Reconnecting => 3,
        }
    }

    /// Inverse of [`Self::to_u8`]. Unknown values read as disconnected.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Reconnecting,
            _ => Self::Disconnected,
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
