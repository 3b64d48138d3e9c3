//! # DevRel Core
//!
//! Shared building blocks for the DevRel platform: the error type,
//! TOML configuration, and the list/pagination/sort types used by every
//! tenant-scoped listing.

pub mod config;
pub mod error;
pub mod types;

pub use config::DevRelConfig;
pub use error::{DevRelError, Result};
