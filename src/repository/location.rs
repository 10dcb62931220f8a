//! Store location resolution.
//!
//! A single configured string is resolved with a fixed precedence, first
//! match wins:
//!
//! 1. contains a URL scheme separator (`scheme://`) → URL;
//! 2. names a resource in the repository's [`ResourceBundle`] → embedded text;
//! 3. anything else → filesystem path.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::Arc;

use crate::{AppError, Result};

const SCHEME_SEPARATOR: &str = "://";

/// Named texts compiled into the program, standing in for packaged
/// resources. Owned per repository instance.
#[derive(Debug, Clone, Default)]
pub struct ResourceBundle {
    resources: Arc<HashMap<String, &'static str>>,
}

impl ResourceBundle {
    /// Empty bundle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource, typically the output of `include_str!`.
    #[must_use]
    pub fn with(mut self, name: &str, text: &'static str) -> Self {
        Arc::make_mut(&mut self.resources).insert(normalize(name).to_owned(), text);
        self
    }

    /// Look up a resource by name; a leading `/` is ignored.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&'static str> {
        self.resources.get(normalize(name)).copied()
    }
}

fn normalize(name: &str) -> &str {
    name.trim_start_matches('/')
}

/// Resolved store location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// Remote `http`/`https` store, read-only.
    Remote(String),
    /// Embedded resource, read-only and never changes.
    Resource {
        /// Resource name.
        name: String,
        /// Resource contents.
        text: &'static str,
    },
    /// Filesystem path (also used for `file://` URLs).
    Path(PathBuf),
}

impl Location {
    /// Resolve `raw` against `resources`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `raw` is empty or uses an unsupported
    /// URL scheme.
    pub fn resolve(raw: &str, resources: &ResourceBundle) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(AppError::Config("store location is empty".into()));
        }

        if let Some((scheme, rest)) = split_scheme(raw) {
            return match scheme.to_ascii_lowercase().as_str() {
                "http" | "https" => Ok(Self::Remote(raw.to_owned())),
                "file" => Ok(Self::Path(PathBuf::from(strip_file_authority(rest)))),
                other => Err(AppError::Config(format!(
                    "unsupported store url scheme '{other}'"
                ))),
            };
        }

        if let Some(text) = resources.get(raw) {
            return Ok(Self::Resource {
                name: normalize(raw).to_owned(),
                text,
            });
        }

        Ok(Self::Path(PathBuf::from(raw)))
    }

    /// Whether programmatic writes are possible.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        matches!(self, Self::Path(_))
    }

    /// Whether the store can change after it was first read.
    #[must_use]
    pub fn is_pollable(&self) -> bool {
        !matches!(self, Self::Resource { .. })
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Remote(url) => f.write_str(url),
            Self::Resource { name, .. } => write!(f, "resource:{name}"),
            Self::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Split `scheme://rest` when `scheme` is a syntactically valid URL scheme.
fn split_scheme(raw: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = raw.split_once(SCHEME_SEPARATOR)?;
    let mut chars = scheme.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some((scheme, rest))
}

/// `file://localhost/etc/x` and `file:///etc/x` both name `/etc/x`.
fn strip_file_authority(rest: &str) -> &str {
    rest.strip_prefix("localhost").unwrap_or(rest)
}
