//! Error types shared across the crate.

use std::fmt::{Display, Formatter};

/// Shared crate result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Error enumeration covering all selector and repository failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing, validation, or location resolution failure.
    Config(String),
    /// Backing store write failure or missing store.
    Repository(String),
    /// Accessor invoked while the repository is closed.
    NotOpen(String),
    /// Write attempted against a store that cannot be modified.
    ReadOnly(String),
    /// Policy token or store document could not be parsed.
    Parse(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// Remote store fetch failure.
    Http(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Repository(msg) => write!(f, "repository: {msg}"),
            Self::NotOpen(msg) => write!(f, "not open: {msg}"),
            Self::ReadOnly(msg) => write!(f, "read only: {msg}"),
            Self::Parse(msg) => write!(f, "parse: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Http(msg) => write!(f, "http: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<regex::Error> for AppError {
    fn from(err: regex::Error) -> Self {
        Self::Parse(format!("invalid value pattern: {err}"))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}
