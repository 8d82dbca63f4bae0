//! Glass Memo edge backend.
//!
//! This library provides shared modules for the two Glass Memo binaries:
//! - `glassmemo-web`: HTTP service receiving QQ webhooks and serving the API
//! - `glassmemo-poller`: Client that drains the message inbox into tasks
//!
//! ## Architecture
//!
//! ```text
//! QQ platform → webhook → normalize → inbox → poller → tasks
//!                  ↑
//!        Ed25519 validation handshake
//! ```

pub mod config;
pub mod error;
pub mod inbox;
pub mod poller;
pub mod process;
pub mod relay;
pub mod store;
pub mod util;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use error::ApiError;
pub use inbox::{CanonicalMessage, MemoryInbox, MessageInbox, MessageOrigin};
pub use poller::{
    AcceptAll, Classifier, EdgeClient, Poller, PollerHandle, RelayClassifier, Verdict,
};
pub use web::{build_router, AppState};
