//! `snapslot-core`: configuration, shared identifiers and the class catalog.

pub mod classes;
pub mod config;
pub mod error;
pub mod types;

pub use error::{Result, SnapslotError};
