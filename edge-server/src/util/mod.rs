//! Shared helpers.

pub mod ids;

pub use ids::generate_id;
