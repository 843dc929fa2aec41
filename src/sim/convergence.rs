use std::collections::{BTreeMap, BTreeSet};

use sha2::{Digest, Sha256};

use crate::model::routing::Route;

/// Canonicalizes each node's routing table to `destination -> sorted next
/// hops` and hashes the result, so two runs that reach the same converged
/// state produce the same hash regardless of the order routes were
/// installed in.
pub fn hash_routes(route_tables: &BTreeMap<u32, Vec<Route>>) -> String {
    let mut normalized: BTreeMap<u32, BTreeMap<u32, BTreeSet<u32>>> = BTreeMap::new();
    for (node, routes) in route_tables {
        let entry = normalized.entry(*node).or_default();
        for route in routes {
            entry
                .entry(route.destination)
                .or_default()
                .insert(route.next_hop);
        }
    }

    let mut buf = String::from("{");
    for (node, dests) in &normalized {
        buf.push_str(&format!("\"{node}\":{{"));
        for (dst, hops) in dests {
            let hop_list: Vec<String> = hops.iter().map(ToString::to_string).collect();
            buf.push_str(&format!("\"{dst}\":[{}],", hop_list.join(",")));
        }
        buf.push_str("},");
    }
    buf.push('}');

    let mut hasher = Sha256::new();
    hasher.update(buf.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Declares convergence once the route-table hash has held steady for
/// `stable_window` consecutive ticks.
pub struct ConvergenceTracker {
    stable_window: u64,
    last_hash: Option<String>,
    same_count: u64,
    pub converged_tick: Option<u64>,
}

impl ConvergenceTracker {
    pub fn new(stable_window: u64) -> Self {
        Self {
            stable_window: stable_window.max(1),
            last_hash: None,
            same_count: 0,
            converged_tick: None,
        }
    }

    pub fn observe(&mut self, tick: u64, route_tables: &BTreeMap<u32, Vec<Route>>) -> bool {
        let current = hash_routes(route_tables);
        if Some(&current) == self.last_hash.as_ref() {
            self.same_count += 1;
        } else {
            self.same_count = 1;
            self.last_hash = Some(current);
        }
        if self.converged_tick.is_none() && self.same_count >= self.stable_window {
            self.converged_tick = Some(tick);
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(destination: u32, next_hop: u32) -> Route {
        Route::new_host(destination, next_hop, 1.0, "ospf")
    }

    #[test]
    fn hash_is_stable_regardless_of_insertion_order() {
        let mut a = BTreeMap::new();
        a.insert(1, vec![route(2, 2), route(3, 2)]);
        let mut b = BTreeMap::new();
        b.insert(1, vec![route(3, 2), route(2, 2)]);
        assert_eq!(hash_routes(&a), hash_routes(&b));
    }

    #[test]
    fn hash_changes_when_next_hop_changes() {
        let mut a = BTreeMap::new();
        a.insert(1, vec![route(2, 2)]);
        let mut b = BTreeMap::new();
        b.insert(1, vec![route(2, 3)]);
        assert_ne!(hash_routes(&a), hash_routes(&b));
    }

    #[test]
    fn tracker_declares_convergence_after_stable_window() {
        let mut tables = BTreeMap::new();
        tables.insert(1, vec![route(2, 2)]);
        let mut tracker = ConvergenceTracker::new(3);
        assert!(!tracker.observe(0, &tables));
        assert!(!tracker.observe(1, &tables));
        assert!(tracker.observe(2, &tables));
        assert_eq!(tracker.converged_tick, Some(2));
    }

    #[test]
    fn tracker_resets_stability_count_on_change() {
        let mut tables = BTreeMap::new();
        tables.insert(1, vec![route(2, 2)]);
        let mut tracker = ConvergenceTracker::new(2);
        assert!(!tracker.observe(0, &tables));
        tables.insert(1, vec![route(2, 3)]);
        assert!(!tracker.observe(1, &tables));
        assert!(!tracker.observe(2, &tables));
        assert!(tracker.observe(3, &tables));
        assert_eq!(tracker.converged_tick, Some(3));
    }
}
