use std::collections::BTreeMap;

use crate::model::messages::ControlMessage;

/// In-memory transport standing in for the wire: every message sent during a
/// tick is queued for delivery `base_delay_ticks` (+ up to `jitter_ticks`)
/// later, dropped with probability `loss_prob`. Delivery order within a tick
/// is resolved by `ControlMessage::sort_key` so two runs with the same seed
/// always produce the same tick-by-tick trace.
pub struct NetworkModel {
    base_delay_ticks: u64,
    jitter_ticks: u64,
    loss_prob: f64,
    rng_state: u64,
    inflight: BTreeMap<u64, Vec<(u32, ControlMessage)>>,
    pub delivered_messages: u64,
    pub dropped_messages: u64,
}

impl NetworkModel {
    pub fn new(base_delay_ticks: u64, jitter_ticks: u64, loss_prob: f64, seed: u64) -> Self {
        Self {
            base_delay_ticks,
            jitter_ticks,
            loss_prob: loss_prob.clamp(0.0, 1.0),
            rng_state: seed.max(1),
            inflight: BTreeMap::new(),
            delivered_messages: 0,
            dropped_messages: 0,
        }
    }

    fn next_random_u64(&mut self) -> u64 {
        self.rng_state = self
            .rng_state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1);
        self.rng_state
    }

    fn next_unit_f64(&mut self) -> f64 {
        self.next_random_u64() as f64 / u64::MAX as f64
    }

    pub fn send(&mut self, dst: u32, message: ControlMessage, now_tick: u64) {
        if self.loss_prob > 0.0 && self.next_unit_f64() < self.loss_prob {
            self.dropped_messages += 1;
            return;
        }
        let extra = if self.jitter_ticks > 0 {
            self.next_random_u64() % (self.jitter_ticks + 1)
        } else {
            0
        };
        let due_tick = now_tick + self.base_delay_ticks + extra;
        self.inflight.entry(due_tick).or_default().push((dst, message));
    }

    pub fn deliver(&mut self, tick: u64) -> Vec<(u32, ControlMessage)> {
        let mut due = self.inflight.remove(&tick).unwrap_or_default();
        due.sort_by(|(dst_a, msg_a), (dst_b, msg_b)| {
            msg_a.sort_key(*dst_a).cmp(&msg_b.sort_key(*dst_b))
        });
        self.delivered_messages += due.len() as u64;
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::messages::MessageKind;
    use std::collections::BTreeMap as Map;

    fn msg(seq: u64) -> ControlMessage {
        ControlMessage {
            protocol: "ospf".to_string(),
            kind: MessageKind::Hello,
            src_router_id: 1,
            seq,
            payload: Map::new(),
            ts: 0.0,
        }
    }

    #[test]
    fn message_is_delivered_after_base_delay() {
        let mut net = NetworkModel::new(2, 0, 0.0, 7);
        net.send(9, msg(1), 0);
        assert!(net.deliver(0).is_empty());
        assert!(net.deliver(1).is_empty());
        let delivered = net.deliver(2);
        assert_eq!(delivered.len(), 1);
        assert_eq!(net.delivered_messages, 1);
    }

    #[test]
    fn full_loss_probability_drops_every_message() {
        let mut net = NetworkModel::new(1, 0, 1.0, 3);
        for seq in 0..5 {
            net.send(2, msg(seq), 0);
        }
        assert_eq!(net.dropped_messages, 5);
        assert!(net.deliver(1).is_empty());
    }

    #[test]
    fn deterministic_given_same_seed() {
        let mut a = NetworkModel::new(1, 4, 0.25, 42);
        let mut b = NetworkModel::new(1, 4, 0.25, 42);
        for tick in 0..10 {
            a.send(2, msg(tick), tick);
            b.send(2, msg(tick), tick);
        }
        for tick in 0..20 {
            assert_eq!(a.deliver(tick).len(), b.deliver(tick).len());
        }
        assert_eq!(a.delivered_messages, b.delivered_messages);
        assert_eq!(a.dropped_messages, b.dropped_messages);
    }
}
