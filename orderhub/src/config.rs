//! Configuration Management
//!
//! Configuration values are read from environment variables with sensible defaults.
//!
//! ## Configuration Variables
//!
//! - `DATABASE_URL`: Path to SQLite database file (default: `orderdesk.db`)
//! - `BIND_ADDRESS`: HTTP server bind address (default: `0.0.0.0:3000`)
//! - `PAGE_SIZE`: Orders per listing page (default: `7`)
//! - `LINK_WINDOW`: Page links shown at once under a listing (default: `5`)
//! - `REQUEST_TIMEOUT_MS`: Deadline for the store calls of one request (default: `5000`)
//! - `AUTH_HEADER`: Header carrying the authenticated username (default: `x-remote-user`)

use std::time::Duration;

use tracing::warn;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    pub listing: ListingConfig,
    pub auth_header: String,
}

/// Pagination defaults for one listing, passed to the listing service on
/// construction instead of living in shared state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingConfig {
    pub page_size: i64,
    pub link_window: i64,
    pub request_timeout: Duration,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            page_size: 7,
            link_window: 5,
            request_timeout: Duration::from_millis(5000),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "orderdesk.db".to_string(),
            bind_address: "0.0.0.0:3000".to_string(),
            listing: ListingConfig::default(),
            auth_header: "x-remote-user".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let default = Self::default();

        Self {
            database_url: lookup("DATABASE_URL").unwrap_or(default.database_url),
            bind_address: lookup("BIND_ADDRESS").unwrap_or(default.bind_address),
            listing: ListingConfig {
                page_size: positive(&lookup, "PAGE_SIZE", default.listing.page_size),
                link_window: positive(&lookup, "LINK_WINDOW", default.listing.link_window),
                request_timeout: Duration::from_millis(positive(
                    &lookup,
                    "REQUEST_TIMEOUT_MS",
                    default.listing.request_timeout.as_millis() as i64,
                ) as u64),
            },
            auth_header: lookup("AUTH_HEADER")
                .map(|h| h.to_lowercase())
                .unwrap_or(default.auth_header),
        }
    }
}

fn positive(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: i64) -> i64 {
    let Some(raw) = lookup(key) else {
        return default;
    };

    match raw.trim().parse::<i64>() {
        Ok(value) if value >= 1 => value,
        _ => {
            warn!(key, value = raw.as_str(), default, "Ignoring invalid configuration value");
            default
        }
    }
}
