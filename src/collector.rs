//! Prefix Collector & Collator, spec.md §4.4.
//!
//! Grounded near line-for-line on
//! `irrexplorer/api/collectors.py::PrefixCollector`: `prefix_summary` and
//! `asn_summary` both collect from all three non-RPKI-specific sources
//! (IRR, BGP, RIR-stats) concurrently, then collate per prefix. The fan-out
//! itself uses `tokio::try_join!` where the teacher's connection loop
//! (`src/server/mod.rs`) reaches for `futures`/`tokio::select!`.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::adapters::{BgpAdapter, IrrAdapter, IrrSource, RirStatsAdapter, SourceAdapter};
use crate::aggregate::aggregate;
use crate::error::Error;
use crate::model::{
    AsnPrefixes, DataSource, IpNetwork, LastUpdate, PrefixIrrDetail, PrefixSummary, RPKI_IRR_SOURCE,
};

/// Minimum prefix lengths accepted for a direct `prefix_summary` query
/// (spec.md §6.3's `MINIMUM_PREFIX_SIZE_IPV4`/`_IPV6`).
#[derive(Debug, Clone, Copy)]
pub struct PrefixFloor {
    pub ipv4: u8,
    pub ipv6: u8,
}

impl PrefixFloor {
    fn permits(&self, prefix: &IpNetwork) -> bool {
        match prefix {
            IpNetwork::V4(n) => n.prefix() >= self.ipv4,
            IpNetwork::V6(n) => n.prefix() >= self.ipv6,
        }
    }
}

pub struct Collector {
    irr: IrrAdapter,
    bgp: BgpAdapter,
    rirstats: RirStatsAdapter,
    floor: PrefixFloor,
}

impl Collector {
    pub fn new(irr: IrrAdapter, bgp: BgpAdapter, rirstats: RirStatsAdapter, floor: PrefixFloor) -> Collector {
        Collector {
            irr,
            bgp,
            rirstats,
            floor,
        }
    }

    /// `prefix_summary`: all known data for one search prefix.
    pub async fn prefix_summary(&self, search_prefix: IpNetwork) -> Result<Vec<PrefixSummary>, Error> {
        // This check is normally caught by the classifier; kept here as a
        // second line of defense since `Collector` is also callable
        // directly (e.g. from `asn_summary`'s aggregate re-query).
        if !self.floor.permits(&search_prefix) {
            return Ok(Vec::new());
        }

        let collected = self.collect_for_prefixes(&[search_prefix]).await?;
        Ok(collate_per_prefix(collected))
    }

    /// `asn_summary`: every prefix an ASN touches, partitioned into prefixes
    /// it directly originates vs. prefixes it merely overlaps.
    pub async fn asn_summary(&self, asn: u32) -> Result<AsnPrefixes, Error> {
        let aggregates = self.collect_aggregate_prefixes_for_asn(asn).await?;
        let collected = self.collect_for_prefixes(&aggregates).await?;
        let summaries = collate_per_prefix(collected);

        let mut response = AsnPrefixes::default();
        for summary in summaries {
            if summary.originates(asn) {
                response.direct_origin.push(summary);
            } else {
                response.overlaps.push(summary);
            }
        }
        Ok(response)
    }

    /// `GET /metadata`: the most recent successful import per source
    /// (spec.md SPEC_FULL.md §2; the BGP/RIR-stats import timestamps come
    /// from a `last_data_import` table the out-of-scope importers write).
    pub async fn metadata(&self) -> Result<LastUpdate, Error> {
        self.irr.query_last_update().await
    }

    async fn collect_for_prefixes(&self, search_prefixes: &[IpNetwork]) -> Result<Collected, Error> {
        if search_prefixes.is_empty() {
            return Ok(Collected::default());
        }

        let (routes_irr, routes_bgp, rirstats) = tokio::try_join!(
            self.irr.query_prefixes(search_prefixes),
            self.bgp.query_prefixes(search_prefixes),
            self.rirstats.query_prefixes_any(search_prefixes),
        )?;

        let mut irr_per_prefix: HashMap<IpNetwork, Vec<_>> = HashMap::new();
        for r in routes_irr {
            irr_per_prefix.entry(r.prefix).or_default().push(r);
        }
        let mut bgp_per_prefix: HashMap<IpNetwork, Vec<_>> = HashMap::new();
        for r in routes_bgp {
            bgp_per_prefix.entry(r.prefix).or_default().push(r);
        }

        Ok(Collected {
            irr_per_prefix,
            bgp_per_prefix,
            rirstats,
        })
    }

    /// `_collect_aggregate_prefixes_for_asn`: every prefix IRR/BGP ever
    /// attribute to `asn`, reduced to its minimal cover. The re-query in
    /// `asn_summary` against these aggregates (rather than the original,
    /// more granular per-route prefixes) is preserved exactly as specified
    /// -- see DESIGN.md's Open Question decisions.
    async fn collect_aggregate_prefixes_for_asn(&self, asn: u32) -> Result<Vec<IpNetwork>, Error> {
        let (routes_irr, routes_bgp) =
            tokio::try_join!(self.irr.query_asn(asn), self.bgp.query_asn(asn))?;

        let prefixes = routes_irr
            .into_iter()
            .chain(routes_bgp)
            .map(|r| r.prefix)
            .filter(|p| self.floor.permits(p));

        Ok(aggregate(prefixes))
    }
}

#[derive(Default)]
struct Collected {
    irr_per_prefix: HashMap<IpNetwork, Vec<crate::model::RouteInfo>>,
    bgp_per_prefix: HashMap<IpNetwork, Vec<crate::model::RouteInfo>>,
    rirstats: Vec<(IpNetwork, crate::model::Registry)>,
}

/// `_collate_per_prefix`: translate the raw per-source collection into one
/// `PrefixSummary` per distinct prefix seen by either IRR or BGP.
fn collate_per_prefix(collected: Collected) -> Vec<PrefixSummary> {
    let all_prefixes: BTreeSet<IpNetwork> = collected
        .irr_per_prefix
        .keys()
        .chain(collected.bgp_per_prefix.keys())
        .copied()
        .collect();

    let mut summaries = Vec::with_capacity(all_prefixes.len());
    for prefix in all_prefixes {
        let rir = rir_for_prefix(&collected.rirstats, &prefix);

        let mut summary = PrefixSummary::new(prefix);
        summary.rir = rir;
        if let Some(bgp_entries) = collected.bgp_per_prefix.get(&prefix) {
            summary.bgp_origins = bgp_entries.iter().filter_map(|r| r.asn).collect();
        }

        if let Some(irr_entries) = collected.irr_per_prefix.get(&prefix) {
            let mut entries = irr_entries.clone();
            entries.sort_by_key(|r| r.asn.unwrap_or(0));
            for entry in entries {
                let Some(asn) = entry.asn else {
                    tracing::error!(?entry, "IRR entry missing ASN");
                    continue;
                };
                let Some(irr_source) = entry.irr_source.clone() else {
                    tracing::error!(?entry, "IRR entry missing source");
                    continue;
                };
                let detail = PrefixIrrDetail {
                    asn,
                    rpsl_pk: entry.rpsl_pk,
                    rpki_status: entry.rpki_status,
                    rpki_max_length: entry.rpki_max_length,
                    rpsl_text: entry.rpsl_text,
                };
                if irr_source == RPKI_IRR_SOURCE {
                    summary.rpki_routes.push(detail);
                } else {
                    summary.irr_routes.entry(irr_source).or_default().push(detail);
                }
            }
        }
        summaries.push(summary);
    }
    summaries
}

/// `_rir_for_prefix`: the most specific overlapping delegation, preferring
/// a NIR over its parent RIR at equal specificity (spec.md §4.4.4). Ties at
/// equal prefix length are broken by `(registry name)` for determinism
/// (see DESIGN.md's Open Question decisions).
fn rir_for_prefix(
    rirstats: &[(IpNetwork, crate::model::Registry)],
    prefix: &IpNetwork,
) -> Option<crate::model::Registry> {
    let mut candidates: Vec<&(IpNetwork, crate::model::Registry)> = rirstats
        .iter()
        .filter(|(stat_prefix, _)| overlaps(stat_prefix, prefix))
        .collect();

    candidates.sort_by(|a, b| {
        b.0.prefix()
            .cmp(&a.0.prefix())
            .then_with(|| b.1.is_nir().cmp(&a.1.is_nir()))
            .then_with(|| a.1.name().cmp(&b.1.name()))
    });

    candidates.first().map(|(_, registry)| registry.clone())
}

fn overlaps(a: &IpNetwork, b: &IpNetwork) -> bool {
    a.is_ipv4() == b.is_ipv4() && (a.contains(b.network()) || b.contains(a.network()))
}

/// Member-of resolution, spec.md §4.6. The IRR adapter returns raw data
/// only (plain set membership plus `aut-num` back-references); this is
/// where `irrexplorer/api/collectors.py::collect_member_of`'s `mbrs-by-ref`
/// filter actually runs, matching spec.md §4.2's rule: for `object_class =
/// ASSET`, an `aut-num` back-reference is accepted iff the referenced set's
/// `mbrs-by-ref` contains `ANY`, or the `aut-num`'s `mnt-by` set intersects
/// it. Plain set membership is always accepted regardless of `object_class`.
pub async fn member_of(
    irr: &(impl IrrSource + ?Sized),
    target: &str,
    object_class: crate::model::ObjectClass,
) -> Result<crate::model::MemberOf, Error> {
    let raw = irr.query_member_of(target).await?;
    let mut result = crate::model::MemberOf::default();

    for (source, sets) in raw.sets_per_source {
        if sets.is_empty() {
            continue;
        }
        result.irrs_seen.push(source.clone());
        result.sets_per_irr.entry(source).or_default().extend(sets);
    }

    if object_class == crate::model::ObjectClass::AsSet {
        for (source, refs) in raw.autnum_refs_per_source {
            for r in refs {
                if autnum_ref_accepted(&r) {
                    result.irrs_seen.push(source.clone());
                    result.sets_per_irr.entry(source.clone()).or_default().insert(r.set_name);
                }
            }
        }
    }

    result.irrs_seen.sort();
    result.irrs_seen.dedup();
    Ok(result)
}

/// The RPSL `mbrs-by-ref` rule (spec.md §4.2): a maintainer-unrestricted
/// `ANY` short-circuits the check; otherwise the `aut-num`'s `mnt-by` must
/// intersect the referenced set's `mbrs-by-ref`.
fn autnum_ref_accepted(r: &crate::adapters::AutnumRef) -> bool {
    r.mbrs_by_ref.iter().any(|m| m == "ANY") || r.mnt_by.iter().any(|m| r.mbrs_by_ref.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Nir, Registry, Rir};

    fn net(s: &str) -> IpNetwork {
        s.parse().unwrap()
    }

    #[test]
    fn rir_for_prefix_prefers_more_specific() {
        let stats = vec![
            (net("192.0.0.0/8"), Registry::Rir(Rir::Arin)),
            (net("192.0.2.0/24"), Registry::Rir(Rir::Ripencc)),
        ];
        let found = rir_for_prefix(&stats, &net("192.0.2.0/24"));
        assert_eq!(found, Some(Registry::Rir(Rir::Ripencc)));
    }

    #[test]
    fn rir_for_prefix_prefers_nir_at_equal_specificity() {
        let stats = vec![
            (net("2001:db8::/32"), Registry::Rir(Rir::Apnic)),
            (net("2001:db8::/32"), Registry::Nir(Nir::Jpnic)),
        ];
        let found = rir_for_prefix(&stats, &net("2001:db8::/32"));
        assert_eq!(found, Some(Registry::Nir(Nir::Jpnic)));
    }

    #[test]
    fn rir_for_prefix_none_when_no_overlap() {
        let stats = vec![(net("198.51.100.0/24"), Registry::Rir(Rir::Arin))];
        let found = rir_for_prefix(&stats, &net("192.0.2.0/24"));
        assert_eq!(found, None);
    }

    #[test]
    fn collate_drops_irr_entry_missing_source() {
        use crate::model::{DataSource, RouteInfo};

        let prefix = net("192.0.2.0/24");
        let mut irr_per_prefix = HashMap::new();
        irr_per_prefix.insert(
            prefix,
            vec![RouteInfo {
                source: DataSource::Irr,
                prefix,
                asn: Some(64500),
                irr_source: None,
                rpsl_pk: None,
                rpki_status: None,
                rpki_max_length: None,
                rpsl_text: None,
            }],
        );
        let collected = Collected {
            irr_per_prefix,
            bgp_per_prefix: HashMap::new(),
            rirstats: Vec::new(),
        };
        let summaries = collate_per_prefix(collected);
        assert_eq!(summaries.len(), 1);
        assert!(summaries[0].irr_routes.is_empty());
        assert!(summaries[0].rpki_routes.is_empty());
    }

    #[test]
    fn collate_buckets_rpki_source_separately() {
        use crate::model::{DataSource, RouteInfo};

        let prefix = net("192.0.2.0/24");
        let mut irr_per_prefix = HashMap::new();
        irr_per_prefix.insert(
            prefix,
            vec![RouteInfo {
                source: DataSource::Irr,
                prefix,
                asn: Some(64500),
                irr_source: Some("RPKI".to_string()),
                rpsl_pk: None,
                rpki_status: None,
                rpki_max_length: None,
                rpsl_text: None,
            }],
        );
        let collected = Collected {
            irr_per_prefix,
            bgp_per_prefix: HashMap::new(),
            rirstats: Vec::new(),
        };
        let summaries = collate_per_prefix(collected);
        assert_eq!(summaries[0].rpki_routes.len(), 1);
        assert!(summaries[0].irr_routes.is_empty());
    }

    #[test]
    fn prefix_floor_rejects_broad_ipv4() {
        let floor = PrefixFloor { ipv4: 9, ipv6: 29 };
        assert!(!floor.permits(&net("10.0.0.0/8")));
        assert!(floor.permits(&net("10.0.0.0/9")));
    }

    fn autnum_ref(mnt_by: &[&str], mbrs_by_ref: &[&str]) -> crate::adapters::AutnumRef {
        crate::adapters::AutnumRef {
            set_name: "AS-CUSTOMERS".to_string(),
            mnt_by: mnt_by.iter().map(|s| s.to_string()).collect(),
            mbrs_by_ref: mbrs_by_ref.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn autnum_ref_accepted_on_any() {
        assert!(autnum_ref_accepted(&autnum_ref(&["MNT-OTHER"], &["ANY"])));
    }

    #[test]
    fn autnum_ref_accepted_on_mntner_overlap() {
        assert!(autnum_ref_accepted(&autnum_ref(&["MNT-A", "MNT-B"], &["MNT-B"])));
    }

    #[test]
    fn autnum_ref_rejected_without_overlap_or_any() {
        assert!(!autnum_ref_accepted(&autnum_ref(&["MNT-A"], &["MNT-B"])));
    }

    struct StubIrr {
        raw: crate::adapters::MemberOfRaw,
    }

    #[async_trait::async_trait]
    impl crate::adapters::SourceAdapter for StubIrr {
        fn source(&self) -> DataSource {
            DataSource::Irr
        }
        async fn query_prefixes(&self, _prefixes: &[IpNetwork]) -> Result<Vec<crate::model::RouteInfo>, Error> {
            Ok(Vec::new())
        }
        async fn query_asn(&self, _asn: u32) -> Result<Vec<crate::model::RouteInfo>, Error> {
            Ok(Vec::new())
        }
    }

    #[async_trait::async_trait]
    impl IrrSource for StubIrr {
        async fn query_set_members(
            &self,
            _names: &[String],
        ) -> Result<HashMap<String, Vec<crate::adapters::SetMember>>, Error> {
            Ok(HashMap::new())
        }
        async fn query_member_of(&self, _target: &str) -> Result<crate::adapters::MemberOfRaw, Error> {
            Ok(self.raw.clone())
        }
        async fn query_last_update(&self) -> Result<LastUpdate, Error> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn member_of_always_includes_plain_set_membership() {
        let mut raw = crate::adapters::MemberOfRaw::default();
        raw.sets_per_source.insert("RIPE".to_string(), vec!["AS-EXAMPLE".to_string()]);
        let irr = StubIrr { raw };

        let result = member_of(&irr, "AS64500", crate::model::ObjectClass::RouteSet).await.unwrap();
        assert_eq!(result.irrs_seen, vec!["RIPE".to_string()]);
        assert!(result.sets_per_irr["RIPE"].contains("AS-EXAMPLE"));
    }

    #[tokio::test]
    async fn member_of_ignores_autnum_refs_for_non_asset() {
        let mut raw = crate::adapters::MemberOfRaw::default();
        raw.autnum_refs_per_source
            .insert("RIPE".to_string(), vec![autnum_ref(&["MNT-A"], &["ANY"])]);
        let irr = StubIrr { raw };

        let result = member_of(&irr, "AS64500", crate::model::ObjectClass::RouteSet).await.unwrap();
        assert!(result.sets_per_irr.is_empty());
    }

    #[tokio::test]
    async fn member_of_applies_mbrs_by_ref_filter_for_as_set() {
        let mut raw = crate::adapters::MemberOfRaw::default();
        raw.autnum_refs_per_source.insert(
            "RIPE".to_string(),
            vec![
                autnum_ref(&["MNT-A"], &["ANY"]),
                autnum_ref(&["MNT-X"], &["MNT-Y"]),
            ],
        );
        let irr = StubIrr { raw };

        let result = member_of(&irr, "AS64500", crate::model::ObjectClass::AsSet).await.unwrap();
        assert_eq!(result.sets_per_irr["RIPE"].len(), 1);
    }
}
