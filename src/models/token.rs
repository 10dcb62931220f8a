//! Policy token: one compiled `SEVERITY[:valuePattern]` rule.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use regex::Regex;

use crate::models::severity::Severity;
use crate::{AppError, Result};

/// Separator between the severity and the optional value pattern.
pub const PATTERN_SEPARATOR: char = ':';

/// Immutable parsed rule derived from one repository value.
///
/// A changed repository value produces a replacement token; tokens are
/// never edited in place.
#[derive(Debug, Clone)]
pub struct PolicyToken {
    minimum: Severity,
    pattern: Option<Regex>,
    raw: String,
}

impl PolicyToken {
    /// Parse a raw repository value.
    ///
    /// The value is split once on the first `:`. The left segment is a
    /// case-insensitive severity name; a non-empty right segment is compiled
    /// as a regular expression anchored at both ends so that it must match
    /// the whole supplied value.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Parse` if the severity is unknown or the pattern
    /// does not compile.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let (level, pattern) = match raw.split_once(PATTERN_SEPARATOR) {
            Some((level, pattern)) => (level, Some(pattern)),
            None => (raw, None),
        };

        let minimum = level.parse::<Severity>()?;
        let pattern = match pattern.filter(|p| !p.is_empty()) {
            Some(p) => Some(Regex::new(&format!("^(?:{p})$"))?),
            None => None,
        };

        Ok(Self {
            minimum,
            pattern,
            raw: raw.to_owned(),
        })
    }

    /// Render the raw value for `severity` with an optional value pattern.
    #[must_use]
    pub fn render(severity: Severity, value: Option<&str>) -> String {
        match value {
            Some(value) => format!("{severity}{PATTERN_SEPARATOR}{value}"),
            None => severity.to_string(),
        }
    }

    /// Minimum severity an event must reach.
    #[must_use]
    pub fn minimum(&self) -> Severity {
        self.minimum
    }

    /// Whether this token restricts the event value.
    #[must_use]
    pub fn has_pattern(&self) -> bool {
        self.pattern.is_some()
    }

    /// Value string as stored in the repository.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Evaluate the rule.
    ///
    /// Passes iff `severity` reaches the minimum and, when a pattern is
    /// present, `value` is supplied and fully matches it. A failing pattern
    /// denies the event regardless of how high its severity is.
    #[must_use]
    pub fn matches(&self, severity: Severity, value: Option<&str>) -> bool {
        if !severity.at_least(self.minimum) {
            return false;
        }
        match (&self.pattern, value) {
            (None, _) => true,
            (Some(pattern), Some(value)) => pattern.is_match(value),
            (Some(_), None) => false,
        }
    }
}

impl PartialEq for PolicyToken {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for PolicyToken {}

impl Display for PolicyToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for PolicyToken {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self> {
        Self::parse(raw)
    }
}
