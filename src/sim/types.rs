use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::routing::Route;

/// Topology mutation injected at a specific tick. Mirrors the three edit
/// operations a running network actually experiences: a link going down, a
/// link coming up, and a link's cost changing underneath the protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum EventAction {
    RemoveLink { u: u32, v: u32 },
    AddLink { u: u32, v: u32, metric: f64 },
    UpdateMetric { u: u32, v: u32, metric: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExternalEvent {
    pub tick: u64,
    pub action: EventAction,
}

/// Everything a single simulation run produced, returned once `max_ticks`
/// has been exhausted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResult {
    pub run_id: String,
    pub seed: u64,
    pub protocol: String,
    pub converged_tick: Option<u64>,
    pub route_hashes: Vec<String>,
    pub route_tables: BTreeMap<u32, Vec<Route>>,
    pub delivered_messages: u64,
    pub dropped_messages: u64,
    pub events_applied: usize,
    pub route_flaps: u64,
}
