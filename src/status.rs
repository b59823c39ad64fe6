//! Message counts and the change classification consumed by displays

use serde::Serialize;
use std::fmt;

/// Total and unread message counts of one reading.
///
/// Both are non-negative for a valid reading. [`MailCounts::UNKNOWN`]
/// (`-1`/`-1`) marks a mailbox that has never been read successfully,
/// or whose last check failed, so the next success always registers
/// as a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct MailCounts {
    pub total: i64,
    pub unread: i64,
}

impl MailCounts {
    pub const UNKNOWN: Self = Self {
        total: -1,
        unread: -1,
    };

    #[must_use]
    pub const fn new(total: i64, unread: i64) -> Self {
        Self { total, unread }
    }

    #[must_use]
    pub const fn is_known(&self) -> bool {
        self.total >= 0 && self.unread >= 0
    }
}

impl Default for MailCounts {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

/// Outcome of comparing a poll with the one before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Classification {
    /// The check failed.
    Error,
    Unchanged,
    /// Counts moved but nothing new to read.
    ChangedNoNewMail,
    /// Unread count went up and is positive.
    ChangedNewMail,
}

impl Classification {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Unchanged => "unchanged",
            Self::ChangedNoNewMail => "changed-no-new-mail",
            Self::ChangedNewMail => "changed-new-mail",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a successful reading against the previous one.
#[must_use]
pub const fn classify(previous: MailCounts, current: MailCounts) -> Classification {
    if current.unread > previous.unread && current.unread > 0 {
        Classification::ChangedNewMail
    } else if current.unread < previous.unread || current.total != previous.total {
        Classification::ChangedNoNewMail
    } else {
        Classification::Unchanged
    }
}
