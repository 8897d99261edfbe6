//! Set Expander, spec.md §4.5.
//!
//! Grounded on `irrexplorer/api/collectors.py::collect_set_expansion`:
//! breadth-first resolution of one query-step-per-depth-level (so a single
//! `query_set_members` round-trip can batch every to-resolve name at that
//! depth), followed by a depth-first traversal of the resolved tree to
//! produce `SetExpansion` rows with a recorded path and no repeated nodes
//! on any path (cycle detection). The 30s wall-clock deadline uses
//! `tokio::time::timeout`, mirroring the teacher's own use of
//! `tokio::time` in its connection loop (`src/server/mod.rs`).

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::adapters::IrrSource;
use crate::error::{Error, Warning};
use crate::model::SetExpansion;

const MAX_DEPTH: usize = 20;

/// `(source -> member names)` for one resolved set, as returned by a single
/// `query_set_members` round.
type ResolvedStep = BTreeMap<String, Vec<String>>;

/// True if `name` is not itself a plain ASN (`AS<digits>`), i.e. it's worth
/// trying to resolve as a set.
fn is_set(name: &str) -> bool {
    match name.strip_prefix("AS") {
        Some(rest) if !rest.is_empty() => !rest.chars().all(|c| c.is_ascii_digit()),
        _ => true,
    }
}

pub struct ExpansionOutcome {
    pub results: Vec<SetExpansion>,
    pub warning: Option<Warning>,
}

/// Expand `name` (an `as-set` or `route-set`) into every member it
/// transitively contains, subject to `size_limit` (total resolved node
/// count) and a 30s-by-default hard deadline.
pub async fn expand_set(
    irr: &(impl IrrSource + ?Sized),
    name: &str,
    size_limit: usize,
    timeout: std::time::Duration,
) -> Result<ExpansionOutcome, Error> {
    match tokio::time::timeout(timeout, expand_with_limit(irr, name, size_limit)).await {
        Ok(Ok(outcome)) => Ok(outcome),
        Ok(Err(e)) => Err(e),
        Err(_) => {
            tracing::error!(name, "set expansion timed out");
            Ok(ExpansionOutcome {
                results: Vec::new(),
                warning: Some(Warning::ExpansionTimeout),
            })
        }
    }
}

async fn expand_with_limit(
    irr: &(impl IrrSource + ?Sized),
    name: &str,
    size_limit: usize,
) -> Result<ExpansionOutcome, Error> {
    let mut resolved: HashMap<String, ResolvedStep> = HashMap::new();
    resolved.insert(name.to_string(), ResolvedStep::new());

    let mut to_resolve: HashSet<String> = HashSet::new();
    to_resolve.insert(name.to_string());

    let mut depth = 0usize;
    let mut truncated = false;

    while !to_resolve.is_empty() && depth < MAX_DEPTH {
        depth += 1;
        if to_resolve.len() > size_limit || resolved.len() > size_limit {
            tracing::warn!(size_limit, "set expansion size limit reached");
            truncated = true;
            break;
        }

        // One batched round trip per BFS layer instead of one per frontier
        // member (spec.md §4.5: "BFS with batched lookups amortizes the
        // round-trip cost").
        let frontier: Vec<String> = to_resolve.iter().cloned().collect();
        let mut batch = irr.query_set_members(&frontier).await?;

        let mut next: HashSet<String> = HashSet::new();
        for target in &frontier {
            let members = batch.remove(target).unwrap_or_default();
            let mut step: ResolvedStep = BTreeMap::new();
            for m in members {
                step.entry(m.source).or_default().push(m.name);
            }
            for names in step.values() {
                for member in names {
                    if is_set(member) && !to_resolve.contains(member) {
                        next.insert(member.clone());
                    }
                }
            }
            resolved.insert(target.clone(), step);
        }
        to_resolve = next.difference(&resolved.keys().cloned().collect()).cloned().collect();
    }
    if depth >= MAX_DEPTH && !to_resolve.is_empty() {
        truncated = true;
    }

    let mut results = Vec::new();
    let mut seen_results: HashSet<(String, String, usize)> = HashSet::new();
    traverse(name, 0, &mut Vec::new(), &resolved, &mut results, &mut seen_results);
    results.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.name.cmp(&b.name)));

    Ok(ExpansionOutcome {
        results,
        warning: if truncated { Some(Warning::ExpansionTruncated) } else { None },
    })
}

fn traverse(
    stub_name: &str,
    depth: usize,
    path: &mut Vec<String>,
    resolved: &HashMap<String, ResolvedStep>,
    results: &mut Vec<SetExpansion>,
    seen: &mut HashSet<(String, String, usize)>,
) {
    if path.contains(&stub_name.to_string()) {
        return;
    }
    path.push(stub_name.to_string());
    let depth = depth + 1;

    let Some(step) = resolved.get(stub_name) else {
        path.pop();
        return;
    };

    for (source, members) in step {
        let key = (stub_name.to_string(), source.clone(), depth);
        if seen.insert(key) {
            let mut sorted_members = members.clone();
            sorted_members.sort();
            results.push(SetExpansion {
                name: stub_name.to_string(),
                source: source.clone(),
                depth,
                path: path.clone(),
                members: sorted_members,
            });
        }
    }

    for members in step.values() {
        for member in members {
            if resolved.contains_key(member) {
                traverse(member, depth, path, resolved, results, seen);
            }
        }
    }
    path.pop();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_set_recognizes_as_set_name() {
        assert!(is_set("AS-EXAMPLE"));
    }

    #[test]
    fn is_set_rejects_plain_asn() {
        assert!(!is_set("AS2914"));
    }

    #[test]
    fn is_set_recognizes_route_set() {
        assert!(is_set("RS-EXAMPLE"));
    }

    #[test]
    fn traverse_stops_on_cycle() {
        let mut resolved = HashMap::new();
        let mut step_a = ResolvedStep::new();
        step_a.insert("RIPE".to_string(), vec!["AS-B".to_string()]);
        resolved.insert("AS-A".to_string(), step_a);
        let mut step_b = ResolvedStep::new();
        step_b.insert("RIPE".to_string(), vec!["AS-A".to_string()]);
        resolved.insert("AS-B".to_string(), step_b);

        let mut results = Vec::new();
        let mut seen = HashSet::new();
        traverse("AS-A", 0, &mut Vec::new(), &resolved, &mut results, &mut seen);
        // AS-A -> AS-B -> (AS-A would cycle, stopped)
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn traverse_sorts_members() {
        let mut resolved = HashMap::new();
        let mut step = ResolvedStep::new();
        step.insert("RIPE".to_string(), vec!["AS3".to_string(), "AS1".to_string()]);
        resolved.insert("AS-A".to_string(), step);

        let mut results = Vec::new();
        let mut seen = HashSet::new();
        traverse("AS-A", 0, &mut Vec::new(), &resolved, &mut results, &mut seen);
        assert_eq!(results[0].members, vec!["AS1".to_string(), "AS3".to_string()]);
    }
}
