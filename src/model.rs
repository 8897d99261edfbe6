//! Core data model.
//!
//! Types mirror the shapes `irrexplorer` serializes to its consumers: field
//! names use `camelCase` on the wire, `RIR`/`NIR`/IRR source names stay
//! upper-case, and `irr_routes` buckets by the upstream IRR source name
//! exactly once. See the `Akaere-NetWorks-whois-server` IRR Explorer client
//! in the example pack for independent confirmation of this wire shape.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// An IP prefix, v4 or v6. `ipnetwork::IpNetwork` decodes directly from the
/// Postgres `CIDR`/`INET` columns the BGP/RIR-stats adapters read.
pub type IpNetwork = ipnetwork::IpNetwork;

/// A Regional Internet Registry. Closed set per spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Rir {
    Afrinic,
    Apnic,
    Arin,
    Lacnic,
    #[serde(rename = "RIPE NCC")]
    Ripencc,
}

impl fmt::Display for Rir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Rir::Afrinic => "AFRINIC",
            Rir::Apnic => "APNIC",
            Rir::Arin => "ARIN",
            Rir::Lacnic => "LACNIC",
            Rir::Ripencc => "RIPE NCC",
        };
        write!(f, "{s}")
    }
}

/// A National Internet Registry: a sub-delegation of a parent RIR, which
/// takes precedence over it when both cover a prefix (spec.md §4.4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Nir {
    #[serde(rename = "NIC.BR")]
    Nicbr,
    #[serde(rename = "JPNIC")]
    Jpnic,
    #[serde(rename = "KRNIC")]
    Krnic,
    #[serde(rename = "TWNIC")]
    Twnic,
    #[serde(rename = "CNNIC")]
    Cnnic,
    #[serde(rename = "IDNIC")]
    Idnic,
    #[serde(rename = "VNNIC")]
    Vnnic,
}

impl Nir {
    /// All NIR names, used to classify an rirstats row's `rir` field.
    pub const ALL: [Nir; 7] = [
        Nir::Nicbr,
        Nir::Jpnic,
        Nir::Krnic,
        Nir::Twnic,
        Nir::Cnnic,
        Nir::Idnic,
        Nir::Vnnic,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Nir::Nicbr => "NIC.BR",
            Nir::Jpnic => "JPNIC",
            Nir::Krnic => "KRNIC",
            Nir::Twnic => "TWNIC",
            Nir::Cnnic => "CNNIC",
            Nir::Idnic => "IDNIC",
            Nir::Vnnic => "VNNIC",
        }
    }

    pub fn from_name(name: &str) -> Option<Nir> {
        Nir::ALL.into_iter().find(|n| n.name() == name)
    }
}

/// A governing registry for a prefix: either a plain RIR, or a NIR (which
/// also belongs to one parent RIR, but is reported by name).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Registry {
    Rir(Rir),
    Nir(Nir),
}

impl Registry {
    pub fn name(&self) -> String {
        match self {
            Registry::Rir(r) => r.to_string(),
            Registry::Nir(n) => n.name().to_string(),
        }
    }

    pub fn is_nir(&self) -> bool {
        matches!(self, Registry::Nir(_))
    }
}

/// The four heterogeneous data sources the collector fans out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataSource {
    Irr,
    Bgp,
    #[serde(rename = "RIRSTATS")]
    RirStats,
    Rpki,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataSource::Irr => "IRR",
            DataSource::Bgp => "BGP",
            DataSource::RirStats => "RIRSTATS",
            DataSource::Rpki => "RPKI",
        };
        write!(f, "{s}")
    }
}

/// RPKI route origin validation state, as reported by the IRR adapter's
/// `RPKI`-sourced records. The core never derives this independently
/// (spec.md §1 Non-goals).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RpkiStatus {
    Valid,
    Invalid,
    Unknown,
}

/// The literal IRR source name that marks a record as RPKI-derived rather
/// than a genuine IRR route object (spec.md §3).
pub const RPKI_IRR_SOURCE: &str = "RPKI";

/// A single record returned by a source adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteInfo {
    pub source: DataSource,
    pub prefix: IpNetwork,
    pub asn: Option<u32>,
    pub irr_source: Option<String>,
    pub rpsl_pk: Option<String>,
    pub rpki_status: Option<RpkiStatus>,
    pub rpki_max_length: Option<u8>,
    pub rpsl_text: Option<String>,
}

impl RouteInfo {
    /// A minimal BGP-origin record: BGP rows only ever carry `asn`/`prefix`.
    pub fn bgp(prefix: IpNetwork, asn: u32) -> Self {
        Self {
            source: DataSource::Bgp,
            prefix,
            asn: Some(asn),
            irr_source: None,
            rpsl_pk: None,
            rpki_status: None,
            rpki_max_length: None,
            rpsl_text: None,
        }
    }
}

/// The per-record payload attached to a `PrefixSummary`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrefixIrrDetail {
    pub asn: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpsl_pk: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpki_status: Option<RpkiStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpki_max_length: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpsl_text: Option<String>,
}

/// The per-prefix output record: one per distinct prefix in a result list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrefixSummary {
    pub prefix: IpNetwork,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rir: Option<Registry>,
    pub bgp_origins: BTreeSet<u32>,
    pub rpki_routes: Vec<PrefixIrrDetail>,
    pub irr_routes: BTreeMap<String, Vec<PrefixIrrDetail>>,
}

impl PrefixSummary {
    pub fn new(prefix: IpNetwork) -> Self {
        Self {
            prefix,
            rir: None,
            bgp_origins: BTreeSet::new(),
            rpki_routes: Vec::new(),
            irr_routes: BTreeMap::new(),
        }
    }

    /// `{r.asn : r in rpki_routes}`, derived for output (spec.md §3).
    pub fn rpki_origins(&self) -> BTreeSet<u32> {
        self.rpki_routes.iter().map(|r| r.asn).collect()
    }

    /// `union {r.asn : r in values(irr_routes)}`, derived for output.
    pub fn irr_origins(&self) -> BTreeSet<u32> {
        self.irr_routes
            .values()
            .flat_map(|records| records.iter().map(|r| r.asn))
            .collect()
    }

    /// True iff `asn` appears in any of the three origin sets -- the
    /// `direct_origin` vs. `overlaps` partition of `asn_summary` (spec.md
    /// §4.4.2).
    pub fn originates(&self, asn: u32) -> bool {
        self.bgp_origins.contains(&asn)
            || self.rpki_origins().contains(&asn)
            || self.irr_origins().contains(&asn)
    }
}

/// `asn_summary`'s output: summaries partitioned by whether the queried ASN
/// actually originates the prefix.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsnPrefixes {
    pub direct_origin: Vec<PrefixSummary>,
    pub overlaps: Vec<PrefixSummary>,
}

/// One `(name, source)` node encountered during set expansion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetExpansion {
    pub name: String,
    pub source: String,
    pub depth: usize,
    pub path: Vec<String>,
    pub members: Vec<String>,
}

/// The RPSL object class a `member_of` query is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObjectClass {
    AsSet,
    RouteSet,
}

impl ObjectClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectClass::AsSet => "as-set",
            ObjectClass::RouteSet => "route-set",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<ObjectClass> {
        match s {
            "as-set" => Some(ObjectClass::AsSet),
            "route-set" => Some(ObjectClass::RouteSet),
            _ => None,
        }
    }
}

/// Result of `member_of`: which IRR sources name the target as a member,
/// and under which source each containing set was found.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberOf {
    pub irrs_seen: Vec<String>,
    pub sets_per_irr: BTreeMap<String, BTreeSet<String>>,
}

/// The classifier's four query categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueryCategory {
    Asn,
    Prefix,
    #[serde(rename = "as-set")]
    AsSet,
    #[serde(rename = "route-set")]
    RouteSet,
}

/// The classifier's output: a category and the canonicalized query string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    pub category: QueryCategory,
    pub cleaned_value: String,
}

/// `GET /metadata`'s payload: the most recent successful import timestamp
/// for each upstream source (spec.md §6.1, SPEC_FULL.md §2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastUpdate {
    pub irr: Option<chrono::DateTime<chrono::Utc>>,
    pub importer: Option<chrono::DateTime<chrono::Utc>>,
}
