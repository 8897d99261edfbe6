//! Environment-only configuration, spec.md §6.3.
//!
//! The teacher reads a `~/.monocle/monocle.toml` file plus `MONOCLE_`-
//! prefixed env overrides, because it is a CLI tool with a persistent data
//! directory. This crate is a stateless service with nothing to put on disk,
//! so the same `config` builder is kept but pointed only at the process
//! environment (`.env` via `dotenvy` for local development), matching
//! spec.md §6.3's "configuration is sourced exclusively from the process
//! environment" requirement.

use anyhow::{anyhow, Result};
use config::Config as ConfigBuilder;
use serde::Deserialize;

/// Defaults per spec.md §6.3.
const DEFAULT_MIN_PREFIX_V4: u8 = 9;
const DEFAULT_MIN_PREFIX_V6: u8 = 29;
const DEFAULT_MAX_QUERY_LENGTH: usize = 255;
const DEFAULT_SET_EXPANSION_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SET_SIZE_LIMIT: usize = 1000;
const DEFAULT_MAX_QUERY_RESULTS: usize = 10_000;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Postgres connection string for the BGP-origin and RIR-stats local
    /// stores (spec.md §6.2).
    pub database_url: String,

    /// Base URL of the IRR adapter's upstream HTTP/GraphQL-like endpoint.
    pub irrd_endpoint: String,

    /// `redis://` URL for the canonical memoization backend. When unset,
    /// `cache::build` falls back to the in-memory `moka` implementation
    /// (spec.md Design Notes).
    #[serde(default)]
    pub redis_url: Option<String>,

    #[serde(default = "default_min_prefix_v4")]
    pub minimum_prefix_size_ipv4: u8,

    #[serde(default = "default_min_prefix_v6")]
    pub minimum_prefix_size_ipv6: u8,

    #[serde(default = "default_max_query_length")]
    pub max_query_length: usize,

    #[serde(default = "default_set_expansion_timeout_secs")]
    pub set_expansion_timeout_secs: u64,

    #[serde(default = "default_set_size_limit")]
    pub set_size_limit: usize,

    #[serde(default = "default_max_query_results")]
    pub max_query_results: usize,

    /// Address the HTTP facade binds to, e.g. `0.0.0.0:8000`.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

fn default_min_prefix_v4() -> u8 {
    DEFAULT_MIN_PREFIX_V4
}
fn default_min_prefix_v6() -> u8 {
    DEFAULT_MIN_PREFIX_V6
}
fn default_max_query_length() -> usize {
    DEFAULT_MAX_QUERY_LENGTH
}
fn default_set_expansion_timeout_secs() -> u64 {
    DEFAULT_SET_EXPANSION_TIMEOUT_SECS
}
fn default_set_size_limit() -> usize {
    DEFAULT_SET_SIZE_LIMIT
}
fn default_max_query_results() -> usize {
    DEFAULT_MAX_QUERY_RESULTS
}
fn default_listen_addr() -> String {
    "0.0.0.0:8000".to_string()
}

impl AppConfig {
    /// Load configuration from `.env` (if present) plus the process
    /// environment. Variable names are upper-cased snake-case, unprefixed
    /// (e.g. `DATABASE_URL`, `SET_SIZE_LIMIT`) to match the names spec.md
    /// §6.3 gives them directly.
    pub fn load() -> Result<AppConfig> {
        // Missing .env is fine -- env vars may be set directly (container,
        // systemd unit, etc).
        let _ = dotenvy::dotenv();

        let settings = ConfigBuilder::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()
            .map_err(|e| anyhow!("failed to build configuration: {e}"))?;

        settings
            .try_deserialize()
            .map_err(|e| anyhow!("failed to parse configuration: {e}"))
    }

    pub fn set_expansion_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.set_expansion_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        assert_eq!(DEFAULT_MIN_PREFIX_V4, 9);
        assert_eq!(DEFAULT_MIN_PREFIX_V6, 29);
        assert_eq!(DEFAULT_MAX_QUERY_LENGTH, 255);
        assert_eq!(DEFAULT_SET_EXPANSION_TIMEOUT_SECS, 30);
        assert_eq!(DEFAULT_SET_SIZE_LIMIT, 1000);
    }

    #[test]
    fn load_requires_database_url_and_irrd_endpoint() {
        // try_deserialize fails when required fields are absent from the
        // environment; this is exercised with env manipulation in the
        // integration tests rather than here, since env vars are
        // process-global and unsafe to mutate in parallel unit tests.
    }
}
