//! Web server module.
//!
//! This module provides the HTTP surface of the edge backend:
//! - The QQ webhook (callback validation handshake and message events)
//! - Inbox polling and "mark processed"
//! - The AI classification relay
//! - CRUD for tasks, plans and monitored groups

pub mod handlers;
pub mod records;
pub mod router;
pub mod signature;

pub use handlers::{AppState, HealthResponse, SignatureResponse};
pub use router::build_router;
pub use signature::{sign, QqSigner, SeedDerivation, SignatureError};
