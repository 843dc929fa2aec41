use std::collections::{BTreeMap, BTreeSet};

pub type Graph = BTreeMap<u32, BTreeMap<u32, f64>>;

#[derive(Debug, Clone)]
pub struct PathCandidate {
    pub nodes: Vec<u32>,
    pub cost: f64,
}

#[derive(Debug, Clone)]
pub struct SpfSingleResult {
    pub dist: BTreeMap<u32, f64>,
    pub first_hop: BTreeMap<u32, u32>,
}

#[derive(Debug, Clone)]
pub struct SpfEcmpResult {
    pub dist: BTreeMap<u32, f64>,
    pub first_hops: BTreeMap<u32, BTreeSet<u32>>,
}
