#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! prefixcollate - a query and aggregation engine for Internet routing data
//!
//! Given an ASN, prefix, or RPSL set name, this crate collates IRR route
//! objects, observed BGP origins, and RIR/NIR delegation records into a
//! per-prefix summary, the way a BGP analyst would when trying to answer
//! "who is actually originating this prefix, and does that match what the
//! registries and routing databases say should be happening".
//!
//! # Architecture
//!
//! - [`model`]: the data model shared by every module (`PrefixSummary`,
//!   `AsnPrefixes`, `SetExpansion`, `MemberOf`, and the `Rir`/`Nir`/
//!   `DataSource` closed sets).
//! - [`error`]: typed domain errors and non-fatal warnings.
//! - [`config`]: environment-driven configuration.
//! - [`classify`]: turns a raw query string into an ASN / prefix / set-name
//!   classification.
//! - [`aggregate`]: reduces a set of prefixes to their minimal
//!   non-overlapping cover.
//! - [`adapters`]: the IRR, BGP-origin, and RIR-stats source adapters.
//! - [`collector`]: fans out to the adapters and collates their results
//!   into `PrefixSummary`/`AsnPrefixes`.
//! - [`expand`]: RPSL set expansion and member-of resolution.
//! - [`cache`]: the memoization layer (Redis-backed, or in-memory).
//! - [`http`] (feature `http`): a thin `axum` facade over the above.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use prefixcollate::adapters::{BgpAdapter, IrrAdapter, RirStatsAdapter};
//! use prefixcollate::collector::{Collector, PrefixFloor};
//!
//! let irr = IrrAdapter::new("https://irrd.example.net/graphql");
//! let bgp = BgpAdapter::new(pg_pool.clone(), 10_000);
//! let rirstats = RirStatsAdapter::new(pg_pool);
//! let collector = Collector::new(irr, bgp, rirstats, PrefixFloor { ipv4: 9, ipv6: 29 });
//!
//! let summaries = collector.prefix_summary("1.1.1.0/24".parse()?).await?;
//! ```

pub mod adapters;
pub mod aggregate;
pub mod cache;
pub mod classify;
pub mod collector;
pub mod config;
pub mod error;
pub mod expand;
pub mod model;

#[cfg(feature = "http")]
pub mod http;

pub use collector::{Collector, PrefixFloor};
pub use config::AppConfig;
pub use error::{Error, Warning};
