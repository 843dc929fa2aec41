use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::algo::{DecisionContext, DecisionEngine, PassthroughDecisionEngine};
use crate::model::messages::{decode_message, encode_message};
use crate::model::routing::{ForwardingTable, RouteTable};
use crate::model::state::{NeighborInfo, NeighborTable};
use crate::protocols::base::{Ipv4RoutingProtocol, ProtocolContext, RouterLink};
use crate::protocols::profile::build_protocol_metrics;
use crate::protocols::registry::{build_protocol, ProtocolBuildParams};
use crate::runtime::config::DaemonConfig;
use crate::runtime::forwarding::{
    ForwardingApplier, LinuxForwardingApplier, NullForwardingApplier,
};
use crate::runtime::mgmt::{DaemonSnapshot, MgmtServer};
use crate::runtime::transport::UdpTransport;

pub struct RouterDaemon {
    cfg: DaemonConfig,
    transport: UdpTransport,
    neighbor_table: NeighborTable,
    protocol: Box<dyn Ipv4RoutingProtocol>,
    route_table: RouteTable,
    forwarding_table: ForwardingTable,
    applier: Box<dyn ForwardingApplier>,
    policy: Box<dyn DecisionEngine>,
    mgmt: MgmtServer,
    running: Arc<AtomicBool>,
    epoch: Instant,
}

impl RouterDaemon {
    pub fn new(cfg: DaemonConfig) -> Result<Self> {
        let transport = UdpTransport::bind(&cfg.bind_address, cfg.bind_port, 65_535)?;
        let neighbors: Vec<NeighborInfo> = cfg
            .neighbors
            .iter()
            .map(|neighbor| NeighborInfo {
                router_id: neighbor.router_id,
                address: neighbor.address.clone(),
                port: neighbor.port,
                cost: neighbor.cost,
                interface_name: neighbor.interface_name.clone(),
                last_seen: None,
                is_up: false,
            })
            .collect();

        let mut protocol = build_protocol(&ProtocolBuildParams {
            protocol: cfg.protocol.clone(),
            tick_interval: cfg.tick_interval,
            dead_interval: cfg.dead_interval,
            protocol_params: cfg.protocol_params.clone(),
        })?;
        protocol.set_ipv4_context(cfg.router_id);
        let applier: Box<dyn ForwardingApplier> = if cfg.forwarding.enabled {
            Box::new(LinuxForwardingApplier::new(cfg.forwarding.clone()))
        } else {
            Box::new(NullForwardingApplier)
        };
        let initial_snapshot = DaemonSnapshot::from_parts(
            cfg.router_id,
            &cfg.protocol,
            &cfg.bind_address,
            cfg.bind_port,
            cfg.tick_interval,
            cfg.dead_interval,
            &cfg.forwarding,
            build_protocol_metrics(&cfg.protocol, protocol.metrics()),
            0.0,
            neighbors.clone(),
            Vec::new(),
            Vec::new(),
        );
        let mgmt = MgmtServer::start(initial_snapshot, &cfg.management)?;

        Ok(Self {
            cfg,
            transport,
            neighbor_table: NeighborTable::new(neighbors),
            protocol,
            route_table: RouteTable::default(),
            forwarding_table: ForwardingTable::default(),
            applier,
            policy: Box::new(PassthroughDecisionEngine),
            mgmt,
            running: Arc::new(AtomicBool::new(true)),
            epoch: Instant::now(),
        })
    }

    pub fn run_forever(&mut self) -> Result<()> {
        self.install_signal_handlers()?;

        info!(
            "routerd start: router_id={} protocol={} bind={}:{} neighbors={:?}",
            self.cfg.router_id,
            self.cfg.protocol,
            self.cfg.bind_address,
            self.cfg.bind_port,
            self.cfg
                .neighbors
                .iter()
                .map(|neighbor| neighbor.router_id)
                .collect::<Vec<u32>>()
        );

        let start_outputs = self.protocol.start(&self.context(self.now_secs()));
        self.apply_outputs(start_outputs)?;
        self.publish_snapshot();

        let mut next_tick = self.now_secs() + self.cfg.tick_interval;

        while self.running.load(Ordering::Relaxed) {
            let now = self.now_secs();
            let timeout_s = (next_tick - now).max(0.0);
            let timeout = if timeout_s <= 0.0 {
                Duration::from_millis(1)
            } else {
                Duration::from_secs_f64(timeout_s)
            };

            if let Some((payload, _addr)) = self.transport.recv(timeout)? {
                self.handle_packet(&payload, self.now_secs())?;
            }

            let now = self.now_secs();
            if now >= next_tick {
                let changed = self
                    .neighbor_table
                    .refresh_liveness(now, self.cfg.dead_interval);
                for router_id in &changed {
                    let outputs = if self
                        .neighbor_table
                        .get(*router_id)
                        .is_some_and(|neighbor| neighbor.is_up)
                    {
                        self.protocol
                            .notify_interface_up(&self.context(now), *router_id)
                    } else {
                        self.protocol
                            .notify_interface_down(&self.context(now), *router_id)
                    };
                    self.apply_outputs(outputs)?;
                }
                if !changed.is_empty() {
                    self.publish_snapshot();
                }
                let timer_outputs = self.protocol.on_timer(&self.context(now));
                self.apply_outputs(timer_outputs)?;
                next_tick = now + self.cfg.tick_interval;
            }
        }

        info!("routerd stopped");
        Ok(())
    }

    fn install_signal_handlers(&self) -> Result<()> {
        let running = Arc::clone(&self.running);
        ctrlc::set_handler(move || {
            running.store(false, Ordering::Relaxed);
        })?;
        Ok(())
    }

    fn handle_packet(&mut self, payload: &[u8], now: f64) -> Result<()> {
        let message = match decode_message(payload) {
            Ok(message) => message,
            Err(err) => {
                warn!("drop invalid packet: {err}");
                return Ok(());
            }
        };

        if message.protocol != self.protocol.name() {
            return Ok(());
        }

        if self.neighbor_table.get(message.src_router_id).is_none() {
            debug!(
                "drop packet from unknown router_id={}",
                message.src_router_id
            );
            return Ok(());
        }

        let became_up = self.neighbor_table.mark_seen(message.src_router_id, now);
        if became_up {
            let outputs = self
                .protocol
                .notify_interface_up(&self.context(now), message.src_router_id);
            self.apply_outputs(outputs)?;
        }
        self.publish_snapshot();

        let outputs = self.protocol.on_message(&self.context(now), &message);
        self.apply_outputs(outputs)
    }

    fn apply_outputs(&mut self, outputs: crate::protocols::base::ProtocolOutputs) -> Result<()> {
        for (neighbor_id, message) in outputs.outbound {
            let Some(neighbor) = self.neighbor_table.get(neighbor_id) else {
                continue;
            };
            match encode_message(&message) {
                Ok(payload) => {
                    self.transport
                        .send(&payload, &neighbor.address, neighbor.port)?;
                }
                Err(err) => {
                    warn!("skip outbound message encode failure: {err}");
                }
            }
        }

        let Some(protocol_routes) = outputs.routes else {
            return Ok(());
        };

        let selected_routes = self.policy.choose_routes(
            &DecisionContext {
                router_id: self.cfg.router_id,
                protocol: self.protocol.name().to_string(),
                now: self.now_secs(),
            },
            &protocol_routes,
        );

        let rib_updated = self
            .route_table
            .replace_protocol_routes(self.protocol.name(), &protocol_routes);
        let fib_updated = self.forwarding_table.sync_from_routes(&selected_routes);
        if !rib_updated && !fib_updated {
            return Ok(());
        }

        if fib_updated {
            let fib_entries = self.forwarding_table.snapshot();
            self.applier.apply(&fib_entries)?;

            let summary: Vec<(u32, u32, f64)> = fib_entries
                .iter()
                .map(|entry| (entry.destination, entry.next_hop, entry.metric))
                .collect();
            info!("RIB/FIB updated: {:?}", summary);
        }
        self.publish_snapshot();

        Ok(())
    }

    fn context(&self, now: f64) -> ProtocolContext {
        let links: BTreeMap<u32, RouterLink> = self
            .neighbor_table
            .iter()
            .map(|(router_id, info)| {
                (
                    *router_id,
                    RouterLink {
                        neighbor_id: *router_id,
                        cost: info.cost,
                        address: info.address.clone(),
                        port: info.port,
                        interface_name: info.interface_name.clone(),
                        is_up: info.is_up,
                    },
                )
            })
            .collect();

        ProtocolContext {
            router_id: self.cfg.router_id,
            now,
            links,
        }
    }

    fn now_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    fn publish_snapshot(&self) {
        self.mgmt.publish(self.build_snapshot(self.now_secs()));
    }

    fn build_snapshot(&self, now: f64) -> DaemonSnapshot {
        let neighbors = self
            .neighbor_table
            .iter()
            .map(|(_, item)| item.clone())
            .collect::<Vec<_>>();
        let routes = self.route_table.snapshot();
        let fib = self.forwarding_table.snapshot();
        DaemonSnapshot::from_parts(
            self.cfg.router_id,
            self.protocol.name(),
            &self.cfg.bind_address,
            self.cfg.bind_port,
            self.cfg.tick_interval,
            self.cfg.dead_interval,
            &self.cfg.forwarding,
            build_protocol_metrics(self.protocol.name(), self.protocol.metrics()),
            now,
            neighbors,
            routes,
            fib,
        )
    }
}
