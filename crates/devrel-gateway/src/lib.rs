//! # DevRel Gateway
//!
//! JSON API over the platform service layer. Every `/api/*` route except
//! health and login is authenticated and tenant-scoped.

pub mod auth;
pub mod error;
pub mod extract;
pub mod routes;
pub mod server;

pub use error::{ApiError, ApiResult};
pub use server::{build_router, start, AppState};
