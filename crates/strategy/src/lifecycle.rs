//! Strategy status state machine.
//!
//! ```text
//! CREATED -> ARMED -> ACTIVE <-> PAUSED
//!     \         \        \        /
//!      `---------`--------`----> CLOSING (terminal)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StrategyStatus {
    #[default]
    Created,
    Armed,
    Active,
    Paused,
    Closing,
}

impl StrategyStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closing)
    }

    /// Whether `evaluate` dispatches to the policy in this state.
    #[must_use]
    pub const fn is_evaluated(self) -> bool {
        matches!(self, Self::Armed | Self::Active)
    }

    #[must_use]
    pub const fn can_arm(self) -> bool {
        matches!(self, Self::Created)
    }

    #[must_use]
    pub const fn can_pause(self) -> bool {
        matches!(self, Self::Created | Self::Armed | Self::Active)
    }

    #[must_use]
    pub const fn can_resume(self) -> bool {
        matches!(self, Self::Paused)
    }

    #[must_use]
    pub const fn can_close(self) -> bool {
        !self.is_terminal()
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Armed => "ARMED",
            Self::Active => "ACTIVE",
            Self::Paused => "PAUSED",
            Self::Closing => "CLOSING",
        }
    }
}

impl fmt::Display for StrategyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
