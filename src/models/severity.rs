//! Closed severity enumeration with a stable total order.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::AppError;

/// Ordered importance level of a traced event.
///
/// Declaration order is the comparison order: `Trace` is the least
/// important level and `Halt` the most important. Policy checks compare
/// [`ordinal`](Self::ordinal) values, never names.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Fine-grained diagnostic detail.
    Trace,
    /// Developer-oriented diagnostics.
    Debug,
    /// Normal operational messages.
    Info,
    /// Significant but expected conditions.
    Notice,
    /// Unexpected conditions that do not stop processing.
    Warning,
    /// Failed operations.
    Error,
    /// Failures affecting a whole component.
    Critical,
    /// Failures affecting the whole process.
    Failure,
    /// Unrecoverable conditions.
    Fatal,
    /// Process is about to stop.
    Halt,
}

impl Severity {
    /// Every level, in ascending order.
    pub const ALL: [Self; 10] = [
        Self::Trace,
        Self::Debug,
        Self::Info,
        Self::Notice,
        Self::Warning,
        Self::Error,
        Self::Critical,
        Self::Failure,
        Self::Fatal,
        Self::Halt,
    ];

    /// Position of this level in the ascending order.
    #[must_use]
    pub const fn ordinal(self) -> u8 {
        self as u8
    }

    /// Canonical upper-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Notice => "NOTICE",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
            Self::Failure => "FAILURE",
            Self::Fatal => "FATAL",
            Self::Halt => "HALT",
        }
    }

    /// Whether an event at this level clears the `minimum` threshold.
    #[must_use]
    pub const fn at_least(self, minimum: Self) -> bool {
        self.ordinal() >= minimum.ordinal()
    }
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = AppError;

    /// Case-insensitive parse; surrounding whitespace is ignored.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let name = raw.trim();
        Self::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| AppError::Parse(format!("unknown severity '{name}'")))
    }
}
