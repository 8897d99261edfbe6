//! The BGP-origin adapter: a `sqlx::PgPool`-backed local store over the
//! `bgp(prefix CIDR, asn INTEGER)` table of spec.md §6.2. Grounded on
//! `lachen-nv-bare-metal-manager-core`'s `ip_allocator.rs` for the
//! `sqlx::PgPool` + `ipnetwork::IpNetwork` query shape, and on
//! `irrexplorer/backends/bgp.py::BgpAdapter` for the result cap /
//! truncation-warning behavior (`MAX_QUERY_RESULTS`).

use async_trait::async_trait;
use sqlx::PgPool;

use super::{with_retries, SourceAdapter};
use crate::error::Error;
use crate::model::{DataSource, IpNetwork, RouteInfo};

pub struct BgpAdapter {
    pool: PgPool,
    max_query_results: i64,
}

impl BgpAdapter {
    pub fn new(pool: PgPool, max_query_results: usize) -> BgpAdapter {
        BgpAdapter {
            pool,
            max_query_results: max_query_results as i64,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BgpRow {
    prefix: IpNetwork,
    asn: i64,
}

#[async_trait]
impl SourceAdapter for BgpAdapter {
    fn source(&self) -> DataSource {
        DataSource::Bgp
    }

    async fn query_prefixes(&self, prefixes: &[IpNetwork]) -> Result<Vec<RouteInfo>, Error> {
        with_retries(DataSource::Bgp, || async {
            let rows: Vec<BgpRow> = sqlx::query_as(
                "SELECT prefix, asn FROM bgp WHERE prefix = ANY($1) LIMIT $2",
            )
            .bind(prefixes)
            .bind(self.max_query_results + 1)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Other(e.into()))?;

            Ok(rows_to_routes(rows, self.max_query_results))
        })
        .await
    }

    async fn query_asn(&self, asn: u32) -> Result<Vec<RouteInfo>, Error> {
        with_retries(DataSource::Bgp, || async {
            let rows: Vec<BgpRow> =
                sqlx::query_as("SELECT prefix, asn FROM bgp WHERE asn = $1 LIMIT $2")
                    .bind(asn as i64)
                    .bind(self.max_query_results + 1)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| Error::Other(e.into()))?;

            Ok(rows_to_routes(rows, self.max_query_results))
        })
        .await
    }
}

/// Truncates to `cap` rows, logging a warning when the query hit the `+1`
/// probe row used to detect truncation without a second `COUNT(*)` query.
fn rows_to_routes(mut rows: Vec<BgpRow>, cap: i64) -> Vec<RouteInfo> {
    if rows.len() as i64 > cap {
        tracing::warn!(cap, "BGP query result cap reached, response truncated");
        rows.truncate(cap as usize);
    }
    rows.into_iter()
        .map(|r| RouteInfo::bgp(r.prefix, r.asn as u32))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_to_routes_truncates_at_cap() {
        let rows = (0..5)
            .map(|i| BgpRow {
                prefix: "192.0.2.0/24".parse().unwrap(),
                asn: i,
            })
            .collect();
        let out = rows_to_routes(rows, 3);
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn rows_to_routes_passes_through_under_cap() {
        let rows = vec![BgpRow {
            prefix: "192.0.2.0/24".parse().unwrap(),
            asn: 64500,
        }];
        let out = rows_to_routes(rows, 10);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].asn, Some(64500));
    }
}
