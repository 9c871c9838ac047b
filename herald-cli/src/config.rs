//! Configuration module
//!
//! Handles CLI configuration including the relay URL.

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the Herald relay
    pub server_url: String,
}
