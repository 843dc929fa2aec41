use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct NeighborInfo {
    pub router_id: u32,
    pub address: String,
    pub port: u16,
    pub cost: f64,
    pub interface_name: Option<String>,
    pub last_seen: Option<f64>,
    pub is_up: bool,
}

#[derive(Debug, Default)]
pub struct NeighborTable {
    neighbors: BTreeMap<u32, NeighborInfo>,
}

impl NeighborTable {
    pub fn new(neighbors: Vec<NeighborInfo>) -> Self {
        let neighbors = neighbors
            .into_iter()
            .map(|neighbor| (neighbor.router_id, neighbor))
            .collect();
        Self { neighbors }
    }

    pub fn mark_seen(&mut self, router_id: u32, now: f64) -> bool {
        let Some(neighbor) = self.neighbors.get_mut(&router_id) else {
            return false;
        };
        let was_up = neighbor.is_up;
        neighbor.last_seen = Some(now);
        neighbor.is_up = true;
        !was_up
    }

    pub fn refresh_liveness(&mut self, now: f64, dead_interval: f64) -> Vec<u32> {
        let mut changed = Vec::new();
        for (router_id, neighbor) in &mut self.neighbors {
            let Some(last_seen) = neighbor.last_seen else {
                continue;
            };
            let alive = (now - last_seen) <= dead_interval;
            if alive != neighbor.is_up {
                neighbor.is_up = alive;
                changed.push(*router_id);
            }
        }
        changed
    }

    pub fn get(&self, router_id: u32) -> Option<&NeighborInfo> {
        self.neighbors.get(&router_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u32, &NeighborInfo)> {
        self.neighbors.iter()
    }
}

#[derive(Debug, Clone)]
pub struct LinkStateRecord {
    pub router_id: u32,
    pub seq: i64,
    pub links: BTreeMap<u32, f64>,
    pub learned_at: f64,
}

#[derive(Debug, Default)]
pub struct LinkStateDb {
    records: BTreeMap<u32, LinkStateRecord>,
}

impl LinkStateDb {
    pub fn upsert(
        &mut self,
        router_id: u32,
        seq: i64,
        links: BTreeMap<u32, f64>,
        now: f64,
    ) -> bool {
        if let Some(current) = self.records.get(&router_id) {
            if seq <= current.seq {
                return false;
            }
        }

        self.records.insert(
            router_id,
            LinkStateRecord {
                router_id,
                seq,
                links,
                learned_at: now,
            },
        );
        true
    }

    pub fn records(&self) -> Vec<LinkStateRecord> {
        self.records.values().cloned().collect()
    }

    pub fn age_out(&mut self, now: f64, max_age: f64) -> bool {
        let before = self.records.len();
        self.records
            .retain(|_, record| (now - record.learned_at) <= max_age);
        before != self.records.len()
    }
}

/// A partial update to a neighbor's fast-changing state, as piggybacked on a
/// Hello. Fields left `None` are not touched by `NeighborStateDb::upsert_fast_state`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeighborFastStatePatch {
    pub queue_level: Option<usize>,
    pub interface_utilization: Option<f64>,
    pub delay_ms: Option<f64>,
    pub loss_rate: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NeighborFastState {
    pub queue_level: Option<usize>,
    pub interface_utilization: Option<f64>,
    pub delay_ms: Option<f64>,
    pub loss_rate: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
struct NeighborFastStateRecord {
    state: NeighborFastState,
    updated_at: f64,
}

/// Per-neighbor fast state (queue pressure, utilization, loss) learned from
/// Hello piggybacking rather than full LSA flooding. Adaptive protocols treat
/// a record older than their configured max age as absent.
#[derive(Debug, Default)]
pub struct NeighborStateDb {
    records: BTreeMap<u32, NeighborFastStateRecord>,
}

impl NeighborStateDb {
    pub fn upsert_fast_state(
        &mut self,
        neighbor_id: u32,
        patch: NeighborFastStatePatch,
        now: f64,
    ) -> bool {
        let record = self
            .records
            .entry(neighbor_id)
            .or_insert_with(|| NeighborFastStateRecord {
                state: NeighborFastState::default(),
                updated_at: now,
            });

        let mut changed = false;
        if let Some(value) = patch.queue_level {
            if record.state.queue_level != Some(value) {
                record.state.queue_level = Some(value);
                changed = true;
            }
        }
        if let Some(value) = patch.interface_utilization {
            if record.state.interface_utilization != Some(value) {
                record.state.interface_utilization = Some(value);
                changed = true;
            }
        }
        if let Some(value) = patch.delay_ms {
            if record.state.delay_ms != Some(value) {
                record.state.delay_ms = Some(value);
                changed = true;
            }
        }
        if let Some(value) = patch.loss_rate {
            if record.state.loss_rate != Some(value) {
                record.state.loss_rate = Some(value);
                changed = true;
            }
        }
        record.updated_at = now;
        changed
    }

    pub fn upsert_queue_level(&mut self, neighbor_id: u32, level: usize, now: f64) -> bool {
        self.upsert_fast_state(
            neighbor_id,
            NeighborFastStatePatch {
                queue_level: Some(level),
                ..NeighborFastStatePatch::default()
            },
            now,
        )
    }

    pub fn remove(&mut self, neighbor_id: u32) -> bool {
        self.records.remove(&neighbor_id).is_some()
    }

    pub fn age_out(&mut self, now: f64, max_age: f64) -> bool {
        let before = self.records.len();
        self.records
            .retain(|_, record| (now - record.updated_at) <= max_age);
        before != self.records.len()
    }

    pub fn get_state_fresh(&self, neighbor_id: u32, now: f64, max_age: f64) -> Option<NeighborFastState> {
        let record = self.records.get(&neighbor_id)?;
        if (now - record.updated_at) > max_age {
            return None;
        }
        Some(record.state)
    }

    pub fn get_queue_level_fresh(&self, neighbor_id: u32, now: f64, max_age: f64) -> Option<usize> {
        self.get_state_fresh(neighbor_id, now, max_age)?.queue_level
    }

    pub fn queue_levels_snapshot(&self) -> BTreeMap<u32, usize> {
        self.records
            .iter()
            .filter_map(|(neighbor_id, record)| record.state.queue_level.map(|v| (*neighbor_id, v)))
            .collect()
    }

    pub fn fast_state_snapshot(&self) -> BTreeMap<u32, NeighborFastState> {
        self.records
            .iter()
            .map(|(neighbor_id, record)| (*neighbor_id, record.state))
            .collect()
    }
}

#[cfg(test)]
mod neighbor_state_tests {
    use super::*;

    #[test]
    fn upsert_fast_state_reports_change_only_on_new_values() {
        let mut db = NeighborStateDb::default();
        assert!(db.upsert_queue_level(2, 1, 0.0));
        assert!(!db.upsert_queue_level(2, 1, 1.0));
        assert!(db.upsert_queue_level(2, 2, 2.0));
    }

    #[test]
    fn stale_record_is_hidden_but_not_removed_until_aged_out() {
        let mut db = NeighborStateDb::default();
        db.upsert_queue_level(2, 3, 0.0);
        assert_eq!(db.get_queue_level_fresh(2, 10.0, 1.0), None);
        assert!(db.age_out(10.0, 1.0));
        assert_eq!(db.get_queue_level_fresh(2, 10.0, 1.0), None);
    }
}
