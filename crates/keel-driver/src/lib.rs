//! IaaS driver implementations for Keel.
//!
//! [`DropletDriver`] talks to a droplet-style cloud JSON API over HTTPS;
//! [`LocalDriver`] is a deterministic in-memory driver for local runs and
//! tests.

#![forbid(unsafe_code)]

pub mod droplet;
pub mod local;

pub use droplet::DropletDriver;
pub use local::LocalDriver;

/// Shared HTTP client defaults for driver API calls.
pub(crate) fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .expect("failed to build HTTP client")
}
