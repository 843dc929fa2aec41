use anyhow::Result;
use serde_json::{Map, Value};

use crate::protocols::base::Ipv4RoutingProtocol;
use crate::protocols::ddr::{DdrParams, DdrProtocol, DdrTimers};
use crate::protocols::ecmp::{EcmpParams, EcmpProtocol, EcmpTimers};
use crate::protocols::ospf::{OspfProtocol, OspfTimers};
use crate::protocols::rip::{RipProtocol, RipTimers};
use crate::protocols::topk::{TopkParams, TopkProtocol, TopkTimers};

/// Everything a protocol constructor needs, shared by the UDP daemon and the
/// deterministic simulator so both faces build the identical engine from the
/// same `protocol_params` bag.
#[derive(Debug, Clone)]
pub struct ProtocolBuildParams {
    pub protocol: String,
    pub tick_interval: f64,
    pub dead_interval: f64,
    pub protocol_params: Map<String, Value>,
}

pub fn available_protocols() -> Vec<&'static str> {
    vec!["ospf", "rip", "ecmp", "topk", "ddr", "dgr", "octopus"]
}

pub fn build_protocol(build: &ProtocolBuildParams) -> Result<Box<dyn Ipv4RoutingProtocol>> {
    let params = &build.protocol_params;
    match build.protocol.as_str() {
        "ospf" => {
            let hello_interval = param_f64(params, "hello_interval", 1.0);
            let lsa_interval = param_f64(params, "lsa_interval", 3.0);
            let lsa_max_age = param_f64(
                params,
                "lsa_max_age",
                (build.dead_interval * 3.0).max(10.0),
            );
            let lsa_min_trigger_spacing_s = param_f64(params, "lsa_min_trigger_spacing_s", 0.0);

            Ok(Box::new(OspfProtocol::new(OspfTimers {
                hello_interval,
                lsa_interval,
                lsa_max_age,
                lsa_min_trigger_spacing_s,
            })))
        }
        "rip" => {
            let update_interval = param_f64(params, "update_interval", 5.0);
            let infinity_metric = param_f64(params, "infinity_metric", 16.0);
            let split_horizon = param_bool(params, "split_horizon", true);
            let poison_reverse = param_bool(params, "poison_reverse", true);
            let neighbor_timeout =
                param_f64(params, "neighbor_timeout", build.dead_interval.max(15.0));

            Ok(Box::new(RipProtocol::new(
                RipTimers {
                    update_interval,
                    neighbor_timeout,
                },
                infinity_metric,
                split_horizon,
                poison_reverse,
            )))
        }
        "ecmp" => {
            let hello_interval = param_f64(params, "hello_interval", 1.0);
            let lsa_interval = param_f64(params, "lsa_interval", 3.0);
            let lsa_max_age = param_f64(
                params,
                "lsa_max_age",
                (build.dead_interval * 3.0).max(10.0),
            );
            let lsa_min_trigger_spacing_s = param_f64(params, "lsa_min_trigger_spacing_s", 0.0);
            let hash_seed = param_u64(params, "hash_seed", 1);

            Ok(Box::new(EcmpProtocol::new(EcmpParams {
                timers: EcmpTimers {
                    hello_interval,
                    lsa_interval,
                    lsa_max_age,
                    lsa_min_trigger_spacing_s,
                },
                hash_seed,
            })))
        }
        "topk" => {
            let hello_interval = param_f64(params, "hello_interval", 1.0);
            let lsa_interval = param_f64(params, "lsa_interval", 3.0);
            let lsa_max_age = param_f64(
                params,
                "lsa_max_age",
                (build.dead_interval * 3.0).max(10.0),
            );
            let k_paths = param_usize(params, "k_paths", 3).max(1);
            let explore_probability = param_f64(params, "explore_probability", 0.3);
            let selection_hold_time_s = param_f64(params, "selection_hold_time_s", 3.0);
            let rng_seed = param_u64(params, "rng_seed", 1);

            Ok(Box::new(TopkProtocol::new(TopkParams {
                timers: TopkTimers {
                    hello_interval,
                    lsa_interval,
                    lsa_max_age,
                },
                k_paths,
                explore_probability,
                selection_hold_time_s,
                rng_seed,
            })))
        }
        "ddr" | "dgr" | "octopus" => {
            let name: &'static str = match build.protocol.as_str() {
                "ddr" => "ddr",
                "dgr" => "dgr",
                _ => "octopus",
            };
            let hello_interval = param_f64(params, "hello_interval", 1.0);
            let lsa_interval = param_f64(params, "lsa_interval", 3.0);
            let lsa_max_age = param_f64(
                params,
                "lsa_max_age",
                (build.dead_interval * 3.0).max(10.0),
            );
            let lsa_min_trigger_spacing_s = param_f64(params, "lsa_min_trigger_spacing_s", 0.0);
            let queue_sample_interval = param_f64(
                params,
                "queue_sample_interval",
                build.tick_interval.max(0.5),
            );
            let k_paths = param_usize(params, "k_paths", 3);
            let default_randomize = name != "ddr";
            // Octopus is queue-aware multipath with stochastic exploration, so deadline
            // filtering defaults to effectively disabled unless explicitly configured.
            let default_deadline_ms = if name == "octopus" {
                1_000_000_000.0
            } else {
                100.0
            };
            let deadline_ms = param_f64(params, "deadline_ms", default_deadline_ms);
            let flow_size_bytes = param_f64(params, "flow_size_bytes", 64_000.0).max(1.0);
            let link_bandwidth_bps =
                param_f64(params, "link_bandwidth_bps", 9_600_000.0).max(1.0);
            let queue_levels = param_usize(params, "queue_levels", 4).max(1);
            let default_pressure_threshold = if name == "octopus" {
                queue_levels - 1
            } else {
                2
            };
            let pressure_threshold =
                param_usize(params, "pressure_threshold", default_pressure_threshold);
            let queue_level_scale_ms = param_f64(params, "queue_level_scale_ms", 8.0).max(1e-6);
            let neighbor_state_max_age_s =
                param_f64(params, "neighbor_state_max_age_s", 0.0).max(0.0);
            let randomize_route_selection =
                param_bool(params, "randomize_route_selection", default_randomize);
            let rng_seed = param_u64(params, "rng_seed", 1);

            Ok(Box::new(DdrProtocol::new_with_name(
                DdrParams {
                    timers: DdrTimers {
                        hello_interval,
                        lsa_interval,
                        lsa_max_age,
                        lsa_min_trigger_spacing_s,
                        queue_sample_interval,
                    },
                    k_paths,
                    deadline_ms,
                    flow_size_bytes,
                    link_bandwidth_bps,
                    queue_levels,
                    pressure_threshold,
                    queue_level_scale_ms,
                    neighbor_state_max_age_s,
                    randomize_route_selection,
                    rng_seed,
                },
                name,
            )))
        }
        "irp" => anyhow::bail!(
            "protocol 'irp' is an abstract architecture and cannot be instantiated; \
use a concrete protocol (ospf, rip, ecmp, topk, ddr, dgr, octopus)"
        ),
        other => anyhow::bail!("unsupported protocol: {other}"),
    }
}

fn param_f64(params: &Map<String, Value>, key: &str, default: f64) -> f64 {
    match params.get(key) {
        Some(Value::Number(num)) => num.as_f64().unwrap_or(default),
        Some(Value::String(text)) => text.parse::<f64>().unwrap_or(default),
        _ => default,
    }
}

fn param_bool(params: &Map<String, Value>, key: &str, default: bool) -> bool {
    match params.get(key) {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(text)) => match text.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => true,
            "0" | "false" | "no" => false,
            _ => default,
        },
        _ => default,
    }
}

fn param_usize(params: &Map<String, Value>, key: &str, default: usize) -> usize {
    match params.get(key) {
        Some(Value::Number(num)) => num
            .as_u64()
            .and_then(|v| usize::try_from(v).ok())
            .unwrap_or(default),
        Some(Value::String(text)) => text.parse::<usize>().unwrap_or(default),
        _ => default,
    }
}

fn param_u64(params: &Map<String, Value>, key: &str, default: u64) -> u64 {
    match params.get(key) {
        Some(Value::Number(num)) => num.as_u64().unwrap_or(default),
        Some(Value::String(text)) => text.parse::<u64>().unwrap_or(default),
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(protocol: &str) -> ProtocolBuildParams {
        ProtocolBuildParams {
            protocol: protocol.to_string(),
            tick_interval: 1.0,
            dead_interval: 10.0,
            protocol_params: Map::new(),
        }
    }

    #[test]
    fn builds_known_protocols_with_defaults() {
        for name in available_protocols() {
            let engine = build_protocol(&build(name)).unwrap_or_else(|_| panic!("{name}"));
            assert_eq!(engine.name(), name);
        }
    }

    #[test]
    fn rejects_abstract_and_unknown_protocol_names() {
        assert!(build_protocol(&build("irp")).is_err());
        assert!(build_protocol(&build("nonexistent")).is_err());
    }
}
