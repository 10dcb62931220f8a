#![forbid(unsafe_code)]

//! Hot-reloadable admission control for trace and log emission.
//!
//! A [`Selector`] decides, per call site, whether an event at a given
//! [`Severity`] for a classification key (and optional value) should be
//! emitted. The policy lives in an external `key=value` store read through
//! a [`Repository`] that can be edited while the process runs.

pub mod config;
pub mod errors;
pub mod models;
pub mod repository;
pub mod selector;

pub use config::SelectorConfig;
pub use errors::{AppError, Result};
pub use models::event::{ChangeEvent, ChangeKind};
pub use models::severity::Severity;
pub use models::token::PolicyToken;
pub use repository::Repository;
pub use selector::{DefaultSelector, Selector};
