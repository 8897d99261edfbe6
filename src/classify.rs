//! Query Classifier, spec.md §4.1.
//!
//! Grounded on `irrexplorer/api/queries.py::Query.__init__`: try ASN first
//! (but not `AS-` set names), then a bare IP prefix, then fall back to the
//! RPSL set-name grammar, splitting `AS-`/`RS-` prefixed names into
//! `as-set`/`route-set`. Anything else is rejected.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::Error;
use crate::model::{Query, QueryCategory};

/// RPSL set names: alnum segments separated by `:`, each segment starting
/// with a letter. `AS-`/`RS-` prefixes are stripped by the caller before
/// this matches the remainder.
#[allow(clippy::unwrap_used)]
static SET_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*(:[A-Za-z][A-Za-z0-9_-]*)*$").unwrap());

/// Classify and canonicalize a raw query string.
///
/// `max_len` is spec.md §6.3's `MAX_QUERY_LENGTH` (default 255); queries
/// longer than that are rejected before any parsing is attempted.
/// `min_prefix_ipv4`/`min_prefix_ipv6` are `MINIMUM_PREFIX_SIZE[version]`
/// (spec.md §4.1 step 2): a prefix query shorter than its version's floor
/// is rejected here, naming the floor in the error message, rather than
/// left to `collector::Collector::prefix_summary`'s silent-empty-result
/// safety net.
pub fn classify(
    raw: &str,
    max_len: usize,
    min_prefix_ipv4: u8,
    min_prefix_ipv6: u8,
) -> Result<Query, Error> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidQuery("empty query".to_string()));
    }
    if trimmed.len() > max_len {
        return Err(Error::InvalidQuery(format!(
            "query exceeds maximum length of {max_len}"
        )));
    }

    let upper = trimmed.to_uppercase();

    // ASN: "AS" + digits, but not "AS-" (that's a set name).
    if let Some(digits) = upper.strip_prefix("AS") {
        if !digits.starts_with('-') && !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
        {
            if digits.parse::<u32>().is_ok() {
                return Ok(Query {
                    category: QueryCategory::Asn,
                    cleaned_value: upper,
                });
            }
        }
    }

    // Prefix: parseable as an IP network (bare address implies a host
    // route, matching ipaddress.ip_network's behavior in the original).
    if let Ok(net) = trimmed.parse::<ipnetwork::IpNetwork>() {
        check_prefix_floor(&net, min_prefix_ipv4, min_prefix_ipv6)?;
        return Ok(Query {
            category: QueryCategory::Prefix,
            cleaned_value: net.to_string(),
        });
    }
    if let Ok(addr) = trimmed.parse::<std::net::IpAddr>() {
        let net = ipnetwork::IpNetwork::from(addr);
        check_prefix_floor(&net, min_prefix_ipv4, min_prefix_ipv6)?;
        return Ok(Query {
            category: QueryCategory::Prefix,
            cleaned_value: net.to_string(),
        });
    }

    // RPSL set name: AS-SET or ROUTE-SET, distinguished by an RS- prefix.
    if let Some(rest) = upper.strip_prefix("RS-") {
        if SET_NAME_RE.is_match(rest) || SET_NAME_RE.is_match(&upper) {
            return Ok(Query {
                category: QueryCategory::RouteSet,
                cleaned_value: upper,
            });
        }
    }
    if upper.starts_with("AS-") && SET_NAME_RE.is_match(&upper) {
        return Ok(Query {
            category: QueryCategory::AsSet,
            cleaned_value: upper,
        });
    }

    Err(Error::InvalidQuery(format!(
        "could not classify query: {trimmed}"
    )))
}

/// spec.md §4.1 step 2 / §8 testable property 3: reject prefixes shorter
/// than their version's configured floor, naming the floor in the message
/// (E2E scenario 6's `"Query too large: the minimum prefix length is 9."`).
fn check_prefix_floor(net: &ipnetwork::IpNetwork, min_ipv4: u8, min_ipv6: u8) -> Result<(), Error> {
    let (prefixlen, floor) = match net {
        ipnetwork::IpNetwork::V4(n) => (n.prefix(), min_ipv4),
        ipnetwork::IpNetwork::V6(n) => (n.prefix(), min_ipv6),
    };
    if prefixlen < floor {
        return Err(Error::InvalidQuery(format!(
            "Query too large: the minimum prefix length is {floor}."
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Default-floor (`9`/`29`, spec.md §6.3) classify for tests that don't
    /// care about the floor check.
    fn c(raw: &str) -> Result<Query, Error> {
        classify(raw, 255, 9, 29)
    }

    #[test]
    fn classifies_asn() {
        let q = c("AS2914").unwrap();
        assert_eq!(q.category, QueryCategory::Asn);
        assert_eq!(q.cleaned_value, "AS2914");
    }

    #[test]
    fn classifies_lowercase_asn() {
        let q = c("as2914").unwrap();
        assert_eq!(q.category, QueryCategory::Asn);
    }

    #[test]
    fn classifies_ipv4_prefix() {
        let q = c("192.0.2.0/24").unwrap();
        assert_eq!(q.category, QueryCategory::Prefix);
        assert_eq!(q.cleaned_value, "192.0.2.0/24");
    }

    #[test]
    fn classifies_bare_ipv4_as_host_route() {
        let q = c("192.0.2.1").unwrap();
        assert_eq!(q.category, QueryCategory::Prefix);
        assert_eq!(q.cleaned_value, "192.0.2.1/32");
    }

    #[test]
    fn classifies_ipv6_prefix() {
        let q = c("2001:db8::/32").unwrap();
        assert_eq!(q.category, QueryCategory::Prefix);
    }

    #[test]
    fn classifies_as_set() {
        let q = c("AS-EXAMPLE").unwrap();
        assert_eq!(q.category, QueryCategory::AsSet);
    }

    #[test]
    fn classifies_hierarchical_as_set() {
        let q = c("AS-EXAMPLE:AS-CUSTOMERS").unwrap();
        assert_eq!(q.category, QueryCategory::AsSet);
    }

    #[test]
    fn classifies_route_set() {
        let q = c("RS-EXAMPLE").unwrap();
        assert_eq!(q.category, QueryCategory::RouteSet);
    }

    #[test]
    fn rejects_garbage() {
        assert!(c("!!!not a query!!!").is_err());
    }

    #[test]
    fn rejects_empty() {
        assert!(c("   ").is_err());
    }

    #[test]
    fn rejects_over_max_length() {
        let long = "A".repeat(10);
        assert!(classify(&long, 5, 9, 29).is_err());
    }

    #[test]
    fn classify_is_idempotent_on_cleaned_value() {
        let first = c("as2914").unwrap();
        let second = c(&first.cleaned_value).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn rejects_ipv4_prefix_below_floor() {
        let err = classify("10.0.0.0/4", 255, 9, 29).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Query too large: the minimum prefix length is 9."
        );
    }

    #[test]
    fn accepts_ipv4_prefix_at_floor() {
        assert!(classify("10.0.0.0/9", 255, 9, 29).is_ok());
    }

    #[test]
    fn rejects_ipv6_prefix_below_floor() {
        assert!(classify("2001:db8::/16", 255, 9, 29).is_err());
    }
}
