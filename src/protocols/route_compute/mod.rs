mod ksp;
mod spf;
mod strategy;
mod types;

pub use ksp::{compare_path_candidate, k_shortest_simple_paths};
pub use spf::{compute_spf_ecmp, compute_spf_single};
pub use strategy::{
    compute_scalar_route_entries, hash_mix, NextHopSelectionPolicy, ScalarRouteAlgorithm,
    ScalarRouteStrategyConfig, StrategyRouteEntry,
};
pub use types::{Graph, PathCandidate, SpfEcmpResult, SpfSingleResult};
