//! Configuration module for environment variable parsing.
//!
//! Both binaries read their settings from the environment; anything invalid
//! falls back to a default with a warning.

use std::env;
use std::fmt;

use tracing::warn;

use crate::web::signature::SeedDerivation;

/// Default upstream for the AI classification relay (DashScope text generation).
pub const DEFAULT_ALI_API_URL: &str =
    "https://dashscope.aliyuncs.com/api/v1/services/aigc/text-generation/generation";

/// Default text-generation model for message classification.
pub const DEFAULT_AI_MODEL: &str = "qwen-turbo";

/// A configuration value that must never end up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(len={})", self.0.len())
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// QQ bot secret used to derive the Ed25519 signing key
    pub qq_secret: Option<Secret>,

    /// How the secret is turned into a 32-byte Ed25519 seed
    pub qq_seed_derivation: SeedDerivation,

    /// Reject event pushes whose X-Signature-Ed25519 does not verify
    pub qq_verify_events: bool,

    /// Upstream endpoint for the AI classification relay
    pub ali_api_url: String,

    // =========================================================================
    // Poller Configuration
    // =========================================================================

    /// Base URL of the edge API the poller talks to
    pub edge_api_base: String,

    /// Delay between two polls in milliseconds
    pub poll_interval_ms: u64,

    /// DashScope key used by the poller's classifier; without it every
    /// message becomes a task
    pub ali_api_key: Option<Secret>,

    /// Model named in classification requests
    pub ai_model: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 3000,
            qq_secret: None,
            qq_seed_derivation: SeedDerivation::Sha256,
            qq_verify_events: false,
            ali_api_url: DEFAULT_ALI_API_URL.to_string(),
            edge_api_base: "http://localhost:3000/api/edge".to_string(),
            poll_interval_ms: 5000,
            ali_api_key: None,
            ai_model: DEFAULT_AI_MODEL.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Config::default();

        Config {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),

            qq_secret: env::var("QQ_SECRET")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(Secret::new),

            qq_seed_derivation: parse_derivation(
                "QQ_SEED_DERIVATION",
                defaults.qq_seed_derivation,
            ),

            qq_verify_events: parse_bool("QQ_VERIFY_EVENTS", defaults.qq_verify_events),

            ali_api_url: env::var("ALI_API_URL").unwrap_or(defaults.ali_api_url),

            edge_api_base: env::var("EDGE_API_BASE").unwrap_or(defaults.edge_api_base),

            poll_interval_ms: env::var("POLL_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|ms| *ms > 0)
                .unwrap_or(defaults.poll_interval_ms),

            ali_api_key: env::var("ALI_API_KEY")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(Secret::new),

            ai_model: env::var("AI_MODEL")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.ai_model),
        }
    }
}

/// Parse a boolean flag such as "true", "1", "yes" or "off".
fn parse_bool(name: &str, default: bool) -> bool {
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => {
            warn!(env_var = name, value = %raw, "Invalid boolean, using default");
            default
        }
    }
}

fn parse_derivation(name: &str, default: SeedDerivation) -> SeedDerivation {
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    raw.parse().unwrap_or_else(|_| {
        warn!(env_var = name, value = %raw, "Invalid seed derivation, using default");
        default
    })
}
