use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::runtime::config::yaml_to_json_object;
use crate::sim::engine::{NetworkModelConfig, TickEngineConfig};
use crate::sim::topology::Topology;
use crate::sim::types::{EventAction, ExternalEvent};

#[derive(Debug, Deserialize)]
struct RawLink {
    u: u32,
    v: u32,
    #[serde(default = "default_metric")]
    metric: f64,
}

fn default_metric() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    tick: u64,
    action: String,
    #[serde(default)]
    u: Option<u32>,
    #[serde(default)]
    v: Option<u32>,
    #[serde(default)]
    metric: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct RawNetwork {
    base_delay_ticks: Option<u64>,
    jitter_ticks: Option<u64>,
    loss_prob: Option<f64>,
    seed: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct RawTimers {
    tick_interval: Option<f64>,
    dead_interval: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawScenario {
    protocol: String,
    #[serde(default)]
    protocol_params: serde_yaml::Value,
    #[serde(default)]
    timers: RawTimers,
    max_ticks: u64,
    #[serde(default = "default_convergence_window")]
    convergence_window: u64,
    #[serde(default)]
    links: Vec<RawLink>,
    #[serde(default)]
    events: Vec<RawEvent>,
    #[serde(default)]
    network: RawNetwork,
}

fn default_convergence_window() -> u64 {
    5
}

pub fn load_scenario(path: &Path) -> Result<TickEngineConfig> {
    let raw_text = fs::read_to_string(path)
        .with_context(|| format!("failed to read scenario file {}", path.display()))?;
    let raw: RawScenario =
        serde_yaml::from_str(&raw_text).context("failed to parse scenario yaml")?;

    let mut topology = Topology::new();
    for link in &raw.links {
        topology.add_link(link.u, link.v, link.metric);
    }

    let events = raw
        .events
        .into_iter()
        .map(parse_event)
        .collect::<Result<Vec<_>>>()?;

    let network = raw.network;
    Ok(TickEngineConfig {
        protocol: raw.protocol.to_lowercase(),
        protocol_params: yaml_to_json_object(&raw.protocol_params)?,
        tick_interval: raw.timers.tick_interval.unwrap_or(1.0),
        dead_interval: raw.timers.dead_interval.unwrap_or(4.0),
        max_ticks: raw.max_ticks,
        convergence_window: raw.convergence_window,
        topology,
        events,
        network: NetworkModelConfig {
            base_delay_ticks: network.base_delay_ticks.unwrap_or(1),
            jitter_ticks: network.jitter_ticks.unwrap_or(0),
            loss_prob: network.loss_prob.unwrap_or(0.0),
            seed: network.seed.unwrap_or(1),
        },
    })
}

fn parse_event(raw: RawEvent) -> Result<ExternalEvent> {
    let action = match raw.action.as_str() {
        "remove_link" => EventAction::RemoveLink {
            u: require(raw.u, "u")?,
            v: require(raw.v, "v")?,
        },
        "add_link" => EventAction::AddLink {
            u: require(raw.u, "u")?,
            v: require(raw.v, "v")?,
            metric: raw.metric.unwrap_or(1.0),
        },
        "update_metric" => EventAction::UpdateMetric {
            u: require(raw.u, "u")?,
            v: require(raw.v, "v")?,
            metric: require(raw.metric, "metric")?,
        },
        other => anyhow::bail!("unsupported event action: {other}"),
    };
    Ok(ExternalEvent {
        tick: raw.tick,
        action,
    })
}

fn require<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| anyhow::anyhow!("event missing required field '{field}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_a_minimal_scenario() {
        let mut file = tempfile_with(
            r#"
protocol: ospf
max_ticks: 20
links:
  - { u: 1, v: 2, metric: 1.0 }
  - { u: 2, v: 3, metric: 1.0 }
events:
  - { tick: 5, action: remove_link, u: 1, v: 2 }
"#,
        );
        file.flush().unwrap();
        let cfg = load_scenario(file.path()).expect("scenario should parse");
        assert_eq!(cfg.protocol, "ospf");
        assert_eq!(cfg.max_ticks, 20);
        assert_eq!(cfg.events.len(), 1);
        assert_eq!(cfg.topology.nodes().len(), 3);
    }

    fn tempfile_with(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(contents.as_bytes()).expect("write");
        file
    }
}
