use std::collections::BTreeMap;

use anyhow::Result;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::model::messages::ControlMessage;
use crate::model::routing::RouteTable;
use crate::protocols::base::{Ipv4RoutingProtocol, ProtocolContext, RouterLink};
use crate::protocols::registry::{build_protocol, ProtocolBuildParams};
use crate::sim::convergence::{hash_routes, ConvergenceTracker};
use crate::sim::network_model::NetworkModel;
use crate::sim::topology::Topology;
use crate::sim::types::{EventAction, ExternalEvent, RunResult};

/// Network-model delay/jitter/loss knobs, separated from protocol params
/// since they describe the simulated wire, not the protocol running over it.
#[derive(Debug, Clone)]
pub struct NetworkModelConfig {
    pub base_delay_ticks: u64,
    pub jitter_ticks: u64,
    pub loss_prob: f64,
    pub seed: u64,
}

#[derive(Debug, Clone)]
pub struct TickEngineConfig {
    pub protocol: String,
    pub protocol_params: Map<String, Value>,
    pub tick_interval: f64,
    pub dead_interval: f64,
    pub max_ticks: u64,
    pub convergence_window: u64,
    pub topology: Topology,
    pub events: Vec<ExternalEvent>,
    pub network: NetworkModelConfig,
}

/// Deterministic discrete-event driver: every tick delivers whatever the
/// network model released, lets each router react, then ships the new
/// outbound batch back into the network model for a future tick. Shares
/// `Ipv4RoutingProtocol` and `ControlMessage` with the UDP daemon, so a
/// protocol behaves identically whether it's driven by real sockets or by
/// this loop.
pub struct TickEngine {
    routers: BTreeMap<u32, Box<dyn Ipv4RoutingProtocol>>,
    route_tables: BTreeMap<u32, RouteTable>,
    topology: Topology,
    network: NetworkModel,
    max_ticks: u64,
    events: Vec<ExternalEvent>,
    tracker: ConvergenceTracker,
    tick_interval: f64,
    route_flaps: u64,
    run_id: String,
    seed: u64,
    protocol_name: String,
}

impl TickEngine {
    pub fn new(cfg: TickEngineConfig) -> Result<Self> {
        let mut routers = BTreeMap::new();
        let mut route_tables = BTreeMap::new();
        for node in cfg.topology.nodes() {
            let mut protocol = build_protocol(&ProtocolBuildParams {
                protocol: cfg.protocol.clone(),
                tick_interval: cfg.tick_interval,
                dead_interval: cfg.dead_interval,
                protocol_params: cfg.protocol_params.clone(),
            })?;
            protocol.set_ipv4_context(node);
            routers.insert(node, protocol);
            route_tables.insert(node, RouteTable::default());
        }

        let run_id = format!("{}-{}", cfg.protocol, cfg.network.seed);

        Ok(Self {
            routers,
            route_tables,
            topology: cfg.topology,
            network: NetworkModel::new(
                cfg.network.base_delay_ticks,
                cfg.network.jitter_ticks,
                cfg.network.loss_prob,
                cfg.network.seed,
            ),
            max_ticks: cfg.max_ticks,
            events: {
                let mut events = cfg.events;
                events.sort_by_key(|event| event.tick);
                events
            },
            tracker: ConvergenceTracker::new(cfg.convergence_window),
            tick_interval: cfg.tick_interval,
            route_flaps: 0,
            run_id,
            seed: cfg.network.seed,
            protocol_name: cfg.protocol,
        })
    }

    pub fn run(&mut self) -> Result<RunResult> {
        let mut route_hashes = Vec::new();
        let mut event_idx = 0;
        let tick_interval = self.tick_interval;

        let mut bootstrap_outbound = Vec::new();
        for (node, router) in self.routers.iter_mut() {
            let ctx = Self::context_for(&self.topology, *node, 0, tick_interval);
            let outputs = router.start(&ctx);
            Self::record_outputs(
                &mut self.route_tables,
                &mut self.route_flaps,
                *node,
                router.name(),
                outputs,
                &mut bootstrap_outbound,
            );
        }
        for (dst, message) in bootstrap_outbound {
            self.network.send(dst, message, 0);
        }

        for tick in 0..self.max_ticks {
            while event_idx < self.events.len() && self.events[event_idx].tick == tick {
                let event = self.events[event_idx].clone();
                self.handle_event(tick, &event);
                debug!("event_applied tick={tick} action={:?}", event.action);
                event_idx += 1;
            }

            let incoming = self.network.deliver(tick);
            let mut inbox: BTreeMap<u32, Vec<ControlMessage>> = self
                .routers
                .keys()
                .map(|node| (*node, Vec::new()))
                .collect();
            for (dst, message) in incoming {
                if let Some(bucket) = inbox.get_mut(&dst) {
                    bucket.push(message);
                }
            }

            let mut outbound = Vec::new();
            for (node, router) in self.routers.iter_mut() {
                let ctx = Self::context_for(&self.topology, *node, tick, tick_interval);
                let timer_outputs = router.on_timer(&ctx);
                Self::record_outputs(
                    &mut self.route_tables,
                    &mut self.route_flaps,
                    *node,
                    router.name(),
                    timer_outputs,
                    &mut outbound,
                );

                for message in inbox.remove(node).unwrap_or_default() {
                    let msg_outputs = router.on_message(&ctx, &message);
                    Self::record_outputs(
                        &mut self.route_tables,
                        &mut self.route_flaps,
                        *node,
                        router.name(),
                        msg_outputs,
                        &mut outbound,
                    );
                }
            }
            for (dst, message) in outbound {
                self.network.send(dst, message, tick);
            }

            let route_tables = self.route_tables_snapshot();
            let route_hash = hash_routes(&route_tables);
            route_hashes.push(route_hash.clone());
            self.tracker.observe(tick, &route_tables);
            info!(
                "tick={tick} route_hash={route_hash} delivered={} dropped={} flaps={}",
                self.network.delivered_messages, self.network.dropped_messages, self.route_flaps
            );
        }

        Ok(RunResult {
            run_id: self.run_id.clone(),
            seed: self.seed,
            protocol: self.protocol_name.clone(),
            converged_tick: self.tracker.converged_tick,
            route_hashes,
            route_tables: self.route_tables_snapshot(),
            delivered_messages: self.network.delivered_messages,
            dropped_messages: self.network.dropped_messages,
            events_applied: event_idx,
            route_flaps: self.route_flaps,
        })
    }

    fn context_for(topology: &Topology, node: u32, tick: u64, tick_interval: f64) -> ProtocolContext {
        let links: BTreeMap<u32, RouterLink> = topology
            .neighbors(node)
            .into_iter()
            .map(|(neighbor_id, cost)| {
                (
                    neighbor_id,
                    RouterLink {
                        neighbor_id,
                        cost,
                        address: String::new(),
                        port: 0,
                        interface_name: None,
                        is_up: true,
                    },
                )
            })
            .collect();

        ProtocolContext {
            router_id: node,
            now: tick as f64 * tick_interval,
            links,
        }
    }

    fn record_outputs(
        route_tables: &mut BTreeMap<u32, RouteTable>,
        route_flaps: &mut u64,
        node: u32,
        protocol_name: &str,
        outputs: crate::protocols::base::ProtocolOutputs,
        outbound: &mut Vec<(u32, ControlMessage)>,
    ) {
        outbound.extend(outputs.outbound);

        let Some(routes) = outputs.routes else {
            return;
        };
        let Some(table) = route_tables.get_mut(&node) else {
            return;
        };
        if table.replace_protocol_routes(protocol_name, &routes) {
            *route_flaps += 1;
        }
    }

    fn route_tables_snapshot(&self) -> BTreeMap<u32, Vec<crate::model::routing::Route>> {
        self.route_tables
            .iter()
            .map(|(node, table)| (*node, table.snapshot()))
            .collect()
    }

    fn handle_event(&mut self, tick: u64, event: &ExternalEvent) {
        match event.action {
            EventAction::RemoveLink { u, v } => {
                self.topology.remove_link(u, v);
                self.notify_link_change(tick, u, v, false);
                self.notify_link_change(tick, v, u, false);
            }
            EventAction::AddLink { u, v, metric } => {
                self.topology.add_link(u, v, metric);
                self.notify_link_change(tick, u, v, true);
                self.notify_link_change(tick, v, u, true);
            }
            EventAction::UpdateMetric { u, v, metric } => {
                self.topology.update_metric(u, v, metric);
            }
        }
    }

    fn notify_link_change(&mut self, tick: u64, node: u32, neighbor: u32, up: bool) {
        let Some(protocol) = self.routers.get_mut(&node) else {
            return;
        };
        let ctx = ProtocolContext {
            router_id: node,
            now: tick as f64 * self.tick_interval,
            links: BTreeMap::new(),
        };
        let outputs = if up {
            protocol.notify_interface_up(&ctx, neighbor)
        } else {
            protocol.notify_interface_down(&ctx, neighbor)
        };
        let protocol_name = protocol.name();
        let mut outbound = Vec::new();
        Self::record_outputs(
            &mut self.route_tables,
            &mut self.route_flaps,
            node,
            protocol_name,
            outputs,
            &mut outbound,
        );
        for (dst, message) in outbound {
            self.network.send(dst, message, tick);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_node_engine() -> TickEngine {
        let mut topology = Topology::new();
        topology.add_link(1, 2, 1.0);
        TickEngine::new(TickEngineConfig {
            protocol: "ospf".to_string(),
            protocol_params: Map::new(),
            tick_interval: 1.0,
            dead_interval: 10.0,
            max_ticks: 10,
            convergence_window: 3,
            topology,
            events: Vec::new(),
            network: NetworkModelConfig {
                base_delay_ticks: 1,
                jitter_ticks: 0,
                loss_prob: 0.0,
                seed: 1,
            },
        })
        .expect("engine should build")
    }

    #[test]
    fn two_node_ospf_converges_and_installs_direct_routes() {
        let mut engine = two_node_engine();
        let result = engine.run().expect("run should succeed");
        assert!(result.converged_tick.is_some());
        let node1_routes = &result.route_tables[&1];
        assert!(node1_routes.iter().any(|r| r.destination == 2));
    }

    #[test]
    fn full_run_is_deterministic_given_same_seed() {
        fn scenario() -> TickEngineConfig {
            let mut topology = Topology::new();
            topology.add_link(1, 2, 1.0);
            topology.add_link(2, 3, 1.0);
            topology.add_link(1, 3, 4.0);
            TickEngineConfig {
                protocol: "ospf".to_string(),
                protocol_params: Map::new(),
                tick_interval: 1.0,
                dead_interval: 10.0,
                max_ticks: 15,
                convergence_window: 3,
                topology,
                events: vec![ExternalEvent {
                    tick: 5,
                    action: EventAction::RemoveLink { u: 1, v: 3 },
                }],
                network: NetworkModelConfig {
                    base_delay_ticks: 1,
                    jitter_ticks: 1,
                    loss_prob: 0.1,
                    seed: 7,
                },
            }
        }

        let mut engine_a = TickEngine::new(scenario()).expect("engine should build");
        let mut engine_b = TickEngine::new(scenario()).expect("engine should build");
        let result_a = engine_a.run().expect("run should succeed");
        let result_b = engine_b.run().expect("run should succeed");
        assert_eq!(result_a, result_b);
    }

    #[test]
    fn remove_link_event_is_applied_and_counted() {
        let mut topology = Topology::new();
        topology.add_link(1, 2, 1.0);
        let mut engine = TickEngine::new(TickEngineConfig {
            protocol: "ospf".to_string(),
            protocol_params: Map::new(),
            tick_interval: 1.0,
            dead_interval: 10.0,
            max_ticks: 5,
            convergence_window: 2,
            topology,
            events: vec![ExternalEvent {
                tick: 2,
                action: EventAction::RemoveLink { u: 1, v: 2 },
            }],
            network: NetworkModelConfig {
                base_delay_ticks: 0,
                jitter_ticks: 0,
                loss_prob: 0.0,
                seed: 1,
            },
        })
        .expect("engine should build");
        let result = engine.run().expect("run should succeed");
        assert_eq!(result.events_applied, 1);
    }
}
