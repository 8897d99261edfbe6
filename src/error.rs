//! Typed error kinds, spec.md §7.
//!
//! The teacher (`bgpkit-monocle`) has no typed domain error -- everything is
//! `anyhow::Error`. That works for a CLI tool where the only consumer of an
//! error is a human reading stderr, but this crate's `http` facade needs to
//! tell `SourceUnavailable(IRR)` apart from `InvalidQuery` to pick a status
//! code, so a matchable enum is adopted from the `bgpkit-commons` sibling
//! example instead.

use crate::model::DataSource;

/// A hard failure: the request cannot be satisfied.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The classifier rejected the raw query string.
    #[error("{0}")]
    InvalidQuery(String),

    /// A source adapter's remote/DB call failed outright. Per spec.md
    /// §4.4.5, this fails the whole request rather than returning a partial
    /// summary, so callers can't mistake "source unreachable" for "source
    /// has no data".
    #[error("source unavailable: {0}")]
    SourceUnavailable(DataSource),

    /// An invariant the collator depends on was violated by adapter data
    /// (e.g. an IRR record missing its ASN or source). The offending record
    /// is dropped and the request continues; this variant exists for
    /// logging / tests, not for aborting a request.
    #[error("internal: {0}")]
    Internal(String),

    /// Glue/transport-level failure not otherwise classified (e.g. a
    /// malformed upstream JSON body).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A soft failure: the request still returns `200`, but with a warning
/// attached to the response envelope (spec.md §7).
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum Warning {
    /// An adapter hit its per-query result cap; the returned data is a
    /// truncated prefix of what the source actually holds.
    #[error("{0} result cap reached, response truncated")]
    SourceCap(DataSource),

    /// Set expansion exceeded its hard deadline (spec.md §4.5).
    #[error("set expansion timed out")]
    ExpansionTimeout,

    /// Set expansion hit its size or depth cap before exhausting the graph.
    #[error("set expansion truncated: size or depth cap reached")]
    ExpansionTruncated,
}

pub type Result<T> = std::result::Result<T, Error>;
