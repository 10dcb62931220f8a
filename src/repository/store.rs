//! Line-oriented `key=value` store document.
//!
//! Keeps comment lines (`#`, `!`), blank lines and entry order so that
//! programmatic edits leave the rest of an operator-maintained file intact.
//! Values are taken verbatim after the first `=`; no escape processing is
//! done, so regular expressions such as `\d+` survive unchanged. Leading
//! whitespace of a value is dropped; trailing whitespace is kept.

use std::collections::BTreeMap;

use crate::{AppError, Result};

/// Separator between a key and its value.
const SEPARATOR: char = '=';

/// Reject a key or value that would read back differently after a
/// render/parse cycle.
///
/// Keys must be non-empty, free of `=`, line breaks and surrounding
/// whitespace, and must not start with a comment marker. Values must be
/// free of line breaks and leading whitespace.
///
/// # Errors
///
/// Returns `AppError::Repository` naming the offending key or value.
pub fn check_entry(key: &str, value: &str) -> Result<()> {
    let bad_key = key.is_empty()
        || key.starts_with(char::is_whitespace)
        || key.ends_with(char::is_whitespace)
        || key.starts_with(['#', '!'])
        || key.contains([SEPARATOR, '\r', '\n']);
    if bad_key {
        return Err(AppError::Repository(format!(
            "key {key:?} cannot be stored"
        )));
    }
    if value.starts_with(char::is_whitespace) || value.contains(['\r', '\n']) {
        return Err(AppError::Repository(format!(
            "value {value:?} for key '{key}' cannot be stored"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Verbatim(String),
    Entry { key: String, value: String },
}

/// Parsed store document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreDocument {
    lines: Vec<Line>,
}

impl StoreDocument {
    /// Parse store text. Parsing never fails: a non-comment line without a
    /// separator is a key with an empty value.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let lines = text
            .lines()
            .map(|line| {
                let content = line.trim_start();
                if content.trim_end().is_empty() || content.starts_with(['#', '!']) {
                    return Line::Verbatim(line.to_owned());
                }
                let (key, value) = content.split_once(SEPARATOR).unwrap_or((content, ""));
                Line::Entry {
                    key: key.trim_end().to_owned(),
                    value: value.trim_start().to_owned(),
                }
            })
            .collect();
        Self { lines }
    }

    /// Build a document holding exactly `entries`, in key order.
    #[must_use]
    pub fn from_entries(entries: &BTreeMap<String, String>) -> Self {
        let lines = entries
            .iter()
            .map(|(key, value)| Line::Entry {
                key: key.clone(),
                value: value.clone(),
            })
            .collect();
        Self { lines }
    }

    /// Effective key/value pairs; a later duplicate key overrides an earlier one.
    #[must_use]
    pub fn entries(&self) -> BTreeMap<String, String> {
        self.lines
            .iter()
            .filter_map(|line| match line {
                Line::Entry { key, value } => Some((key.clone(), value.clone())),
                Line::Verbatim(_) => None,
            })
            .collect()
    }

    /// Effective value of `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().rev().find_map(|line| match line {
            Line::Entry { key: k, value } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// Set `key` to `value`, editing its effective line in place or
    /// appending a new one. Returns the previous value.
    pub fn set(&mut self, key: &str, value: &str) -> Option<String> {
        let existing = self.lines.iter_mut().rev().find_map(|line| match line {
            Line::Entry { key: k, value } if k == key => Some(value),
            _ => None,
        });
        match existing {
            Some(slot) => Some(std::mem::replace(slot, value.to_owned())),
            None => {
                self.lines.push(Line::Entry {
                    key: key.to_owned(),
                    value: value.to_owned(),
                });
                None
            }
        }
    }

    /// Remove every line for `key`. Returns the previous effective value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let previous = self.get(key).map(str::to_owned);
        self.lines
            .retain(|line| !matches!(line, Line::Entry { key: k, .. } if k == key));
        previous
    }

    /// Remove every entry, keeping comments. Returns whether anything was removed.
    pub fn clear(&mut self) -> bool {
        let before = self.lines.len();
        self.lines.retain(|line| matches!(line, Line::Verbatim(_)));
        self.lines.len() != before
    }

    /// Render back to text, one line per entry.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                Line::Verbatim(text) => out.push_str(text),
                Line::Entry { key, value } => {
                    out.push_str(key);
                    out.push(SEPARATOR);
                    out.push_str(value);
                }
            }
            out.push('\n');
        }
        out
    }
}
