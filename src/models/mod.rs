//! Domain model module declarations.

pub mod event;
pub mod severity;
pub mod token;
