//! # DevRel Platform
//! Tenant-isolated store and service layer: campaigns, developers,
//! activities, funnel analytics, plugins and API tokens.

pub mod activities;
pub mod auth;
pub mod campaigns;
pub mod db;
pub mod developers;
pub mod events;
pub mod funnel;
pub mod overview;
pub mod plugins;
pub mod runs;
pub mod tokens;
pub mod validation;

pub use db::PlatformDb;
