//! Prefix Aggregator, spec.md §4.3.
//!
//! Computes the minimal non-overlapping cover of a set of prefixes per
//! RFC 4632: redundant (contained) prefixes are dropped, and sibling pairs
//! that together exactly fill their parent are merged, repeated until no
//! more merges apply. Grounded on
//! `irrexplorer/api/collectors.py::ip_networks_aggregates` (which wraps the
//! Python `aggregate6` library) -- implemented directly over
//! `ipnetwork::IpNetwork` here rather than pulling in an aggregation crate,
//! so the merge order and the stable output order spec.md §8 requires are
//! both in this crate's direct control.

use std::cmp::Ordering;

use ipnetwork::IpNetwork;

/// A network reduced to a bit-width-independent `(base, prefixlen)` pair so
/// v4 and v6 can share one merge routine. `base` is masked to `prefixlen`
/// on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Node {
    base: u128,
    prefixlen: u8,
    max_len: u8,
}

impl Node {
    fn from_network(net: &IpNetwork) -> Node {
        let max_len = if net.is_ipv4() { 32 } else { 128 };
        let prefixlen = net.prefix();
        let base = address_to_u128(net) & mask(prefixlen, max_len);
        Node {
            base,
            prefixlen,
            max_len,
        }
    }

    fn contains(&self, other: &Node) -> bool {
        self.max_len == other.max_len
            && self.prefixlen <= other.prefixlen
            && self.base == (other.base & mask(self.prefixlen, self.max_len))
    }

    /// `Some(parent)` iff `self` and `other` are the two halves of the same
    /// parent network: same prefixlen, and one is the other's bit-flipped
    /// sibling at that length.
    fn sibling_parent(&self, other: &Node) -> Option<Node> {
        if self.max_len != other.max_len || self.prefixlen != other.prefixlen || self.prefixlen == 0 {
            return None;
        }
        let parent_len = self.prefixlen - 1;
        let parent_mask = mask(parent_len, self.max_len);
        if self.base & parent_mask != other.base & parent_mask {
            return None;
        }
        let bit = 1u128 << (self.max_len - self.prefixlen);
        if (self.base ^ other.base) == bit {
            Some(Node {
                base: self.base & parent_mask,
                prefixlen: parent_len,
                max_len: self.max_len,
            })
        } else {
            None
        }
    }

    fn to_network(self) -> IpNetwork {
        u128_to_network(self.base, self.prefixlen, self.max_len)
    }
}

/// A `prefixlen`-bit mask within a `max_len`-bit address field, in the same
/// low-order placement `address_to_u128` uses (bit 0 is the host's LSB,
/// regardless of whether `max_len` is 32 or 128).
fn mask(prefixlen: u8, max_len: u8) -> u128 {
    let full: u128 = if max_len >= 128 {
        u128::MAX
    } else {
        (1u128 << max_len) - 1
    };
    if prefixlen == 0 {
        0
    } else if prefixlen >= max_len {
        full
    } else {
        full & !((1u128 << (max_len - prefixlen)) - 1)
    }
}

fn address_to_u128(net: &IpNetwork) -> u128 {
    match net.network() {
        std::net::IpAddr::V4(a) => u32::from(a) as u128,
        std::net::IpAddr::V6(a) => u128::from(a),
    }
}

fn u128_to_network(base: u128, prefixlen: u8, max_len: u8) -> IpNetwork {
    if max_len == 32 {
        let addr = std::net::Ipv4Addr::from(base as u32);
        ipnetwork::Ipv4Network::new(addr, prefixlen.min(32))
            .map(IpNetwork::V4)
            .unwrap_or_else(|_| IpNetwork::V4(ipnetwork::Ipv4Network::from(addr)))
    } else {
        let addr = std::net::Ipv6Addr::from(base);
        ipnetwork::Ipv6Network::new(addr, prefixlen.min(128))
            .map(IpNetwork::V6)
            .unwrap_or_else(|_| IpNetwork::V6(ipnetwork::Ipv6Network::from(addr)))
    }
}

/// Reduce `networks` to their minimal non-overlapping cover.
///
/// Output is sorted lexicographically by `(base address, prefixlen)`,
/// which is a stable, deterministic order independent of input order
/// (spec.md §8, testable property 2).
pub fn aggregate(networks: impl IntoIterator<Item = IpNetwork>) -> Vec<IpNetwork> {
    let mut nodes: Vec<Node> = networks.into_iter().map(|n| Node::from_network(&n)).collect();
    nodes.sort_by(node_order);
    nodes.dedup();

    // Drop any node fully contained within another: walk in (prefixlen
    // asc, base asc) order so broader networks are seen before narrower
    // ones they might contain.
    let mut by_breadth = nodes.clone();
    by_breadth.sort_by(|a, b| a.prefixlen.cmp(&b.prefixlen).then(a.base.cmp(&b.base)));
    let mut kept: Vec<Node> = Vec::with_capacity(by_breadth.len());
    for n in by_breadth {
        if !kept.iter().any(|k| k.contains(&n)) {
            kept.push(n);
        }
    }

    // Repeatedly merge sibling pairs until a full pass produces no merge.
    loop {
        kept.sort_by(node_order);
        let mut merged: Vec<Node> = Vec::with_capacity(kept.len());
        let mut changed = false;
        let mut i = 0;
        while i < kept.len() {
            if i + 1 < kept.len() {
                if let Some(parent) = kept[i].sibling_parent(&kept[i + 1]) {
                    merged.push(parent);
                    i += 2;
                    changed = true;
                    continue;
                }
            }
            merged.push(kept[i]);
            i += 1;
        }
        kept = merged;
        if !changed {
            break;
        }
    }

    kept.sort_by(node_order);
    kept.into_iter().map(Node::to_network).collect()
}

fn node_order(a: &Node, b: &Node) -> Ordering {
    a.max_len
        .cmp(&b.max_len)
        .then(a.base.cmp(&b.base))
        .then(a.prefixlen.cmp(&b.prefixlen))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(s: &str) -> IpNetwork {
        s.parse().unwrap()
    }

    #[test]
    fn merges_exact_sibling_pair() {
        let out = aggregate([net("192.0.2.0/25"), net("192.0.2.128/25")]);
        assert_eq!(out, vec![net("192.0.2.0/24")]);
    }

    #[test]
    fn drops_contained_prefix() {
        let out = aggregate([net("192.0.2.0/24"), net("192.0.2.0/25")]);
        assert_eq!(out, vec![net("192.0.2.0/24")]);
    }

    #[test]
    fn leaves_disjoint_prefixes_unmerged() {
        let out = aggregate([net("192.0.2.0/24"), net("198.51.100.0/24")]);
        assert_eq!(out, vec![net("192.0.2.0/24"), net("198.51.100.0/24")]);
    }

    #[test]
    fn cascades_merges_up_multiple_levels() {
        let out = aggregate([
            net("192.0.2.0/26"),
            net("192.0.2.64/26"),
            net("192.0.2.128/26"),
            net("192.0.2.192/26"),
        ]);
        assert_eq!(out, vec![net("192.0.2.0/24")]);
    }

    #[test]
    fn output_order_is_independent_of_input_order() {
        let a = aggregate([net("198.51.100.0/24"), net("192.0.2.0/24")]);
        let b = aggregate([net("192.0.2.0/24"), net("198.51.100.0/24")]);
        assert_eq!(a, b);
    }

    #[test]
    fn handles_ipv6() {
        let out = aggregate([net("2001:db8::/33"), net("2001:db8:8000::/33")]);
        assert_eq!(out, vec![net("2001:db8::/32")]);
    }

    #[test]
    fn does_not_merge_non_sibling_same_length() {
        let out = aggregate([net("192.0.2.0/25"), net("192.0.3.0/25")]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn idempotent_on_already_aggregated_input() {
        let once = aggregate([net("192.0.2.0/24")]);
        let twice = aggregate(once.clone());
        assert_eq!(once, twice);
    }
}
