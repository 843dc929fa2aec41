use std::collections::{BTreeMap, BTreeSet};

/// Undirected weighted topology the simulator drives its routers over.
/// Links are stored per-direction so asymmetric costs (and asymmetric
/// failures, in principle) are representable, though `add_link`/
/// `remove_link` keep both directions in lockstep like the teacher's
/// neighbor config does.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    links: BTreeMap<u32, BTreeMap<u32, f64>>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> BTreeSet<u32> {
        self.links.keys().copied().collect()
    }

    pub fn neighbors(&self, node: u32) -> BTreeMap<u32, f64> {
        self.links.get(&node).cloned().unwrap_or_default()
    }

    pub fn metric(&self, node: u32, neighbor: u32) -> Option<f64> {
        self.links.get(&node).and_then(|links| links.get(&neighbor)).copied()
    }

    pub fn add_link(&mut self, u: u32, v: u32, metric: f64) {
        self.links.entry(u).or_default();
        self.links.entry(v).or_default();
        self.links.entry(u).or_default().insert(v, metric);
        self.links.entry(v).or_default().insert(u, metric);
    }

    pub fn remove_link(&mut self, u: u32, v: u32) {
        if let Some(links) = self.links.get_mut(&u) {
            links.remove(&v);
        }
        if let Some(links) = self.links.get_mut(&v) {
            links.remove(&u);
        }
    }

    pub fn update_metric(&mut self, u: u32, v: u32, metric: f64) {
        if let Some(links) = self.links.get_mut(&u) {
            if links.contains_key(&v) {
                links.insert(v, metric);
            }
        }
        if let Some(links) = self.links.get_mut(&v) {
            if links.contains_key(&u) {
                links.insert(u, metric);
            }
        }
    }

    pub fn snapshot(&self) -> BTreeMap<u32, BTreeMap<u32, f64>> {
        self.links.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_link_is_symmetric_and_registers_both_endpoints() {
        let mut topo = Topology::new();
        topo.add_link(1, 2, 5.0);
        assert_eq!(topo.metric(1, 2), Some(5.0));
        assert_eq!(topo.metric(2, 1), Some(5.0));
        assert_eq!(topo.nodes(), BTreeSet::from([1, 2]));
    }

    #[test]
    fn remove_link_clears_both_directions() {
        let mut topo = Topology::new();
        topo.add_link(1, 2, 5.0);
        topo.remove_link(1, 2);
        assert_eq!(topo.metric(1, 2), None);
        assert_eq!(topo.metric(2, 1), None);
        assert!(topo.neighbors(1).is_empty());
    }

    #[test]
    fn update_metric_only_touches_existing_links() {
        let mut topo = Topology::new();
        topo.add_link(1, 2, 5.0);
        topo.update_metric(1, 2, 9.0);
        assert_eq!(topo.metric(1, 2), Some(9.0));
        topo.update_metric(1, 3, 2.0);
        assert_eq!(topo.metric(1, 3), None);
    }
}
