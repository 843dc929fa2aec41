use std::process::Command;

use anyhow::Result;
use tracing::{debug, warn};

use crate::model::routing::ForwardingEntry;
use crate::runtime::config::ForwardingConfig;

/// Seam between the in-process FIB model and whatever actually moves
/// packets. Swappable so tests and non-Linux hosts can run the daemon
/// without a real kernel routing table.
pub trait ForwardingApplier: Send {
    fn apply(&self, entries: &[ForwardingEntry]) -> Result<()>;
}

/// Does nothing. Used whenever `forwarding.enabled` is false so the rest of
/// the daemon doesn't need to know forwarding is turned off.
pub struct NullForwardingApplier;

impl ForwardingApplier for NullForwardingApplier {
    fn apply(&self, _entries: &[ForwardingEntry]) -> Result<()> {
        Ok(())
    }
}

/// Installs the computed FIB into the Linux kernel routing table via `ip
/// route replace`, one command per destination. Entries whose router-id
/// isn't mapped to a destination prefix or next-hop IP in config are
/// skipped, since there's nothing meaningful to install.
pub struct LinuxForwardingApplier {
    cfg: ForwardingConfig,
}

impl LinuxForwardingApplier {
    pub fn new(cfg: ForwardingConfig) -> Self {
        Self { cfg }
    }

    fn run(&self, args: &[String]) {
        if self.cfg.dry_run {
            debug!("forwarding dry-run: ip {}", args.join(" "));
            return;
        }
        match Command::new("ip").args(args).output() {
            Ok(out) if out.status.success() => {}
            Ok(out) => warn!(
                "ip {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&out.stderr).trim()
            ),
            Err(err) => warn!("ip {} unavailable: {err}", args.join(" ")),
        }
    }
}

impl ForwardingApplier for LinuxForwardingApplier {
    fn apply(&self, entries: &[ForwardingEntry]) -> Result<()> {
        let table = self.cfg.table.to_string();
        let installed: Vec<u32> = entries.iter().map(|entry| entry.destination).collect();

        for entry in entries {
            let Some(prefix) = self.cfg.destination_prefixes.get(&entry.destination) else {
                continue;
            };
            let Some(next_hop_ip) = self.cfg.next_hop_ips.get(&entry.next_hop) else {
                continue;
            };
            self.run(&[
                "route".to_string(),
                "replace".to_string(),
                prefix.clone(),
                "via".to_string(),
                next_hop_ip.clone(),
                "table".to_string(),
                table.clone(),
                "metric".to_string(),
                (entry.metric.round() as i64).max(0).to_string(),
            ]);
        }

        for (router_id, prefix) in &self.cfg.destination_prefixes {
            if installed.contains(router_id) {
                continue;
            }
            self.run(&[
                "route".to_string(),
                "del".to_string(),
                prefix.clone(),
                "table".to_string(),
                table.clone(),
            ]);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn null_applier_always_succeeds() {
        let applier = NullForwardingApplier;
        let entries = vec![ForwardingEntry {
            destination: 4,
            next_hop: 2,
            metric: 10.0,
            protocol: "ospf".to_string(),
        }];
        assert!(applier.apply(&entries).is_ok());
    }

    #[test]
    fn dry_run_applier_does_not_error_without_kernel_access() {
        let mut destination_prefixes = BTreeMap::new();
        destination_prefixes.insert(4, "10.0.0.4/32".to_string());
        let mut next_hop_ips = BTreeMap::new();
        next_hop_ips.insert(2, "10.0.0.2".to_string());

        let applier = LinuxForwardingApplier::new(ForwardingConfig {
            enabled: true,
            dry_run: true,
            table: 254,
            destination_prefixes,
            next_hop_ips,
        });
        let entries = vec![ForwardingEntry {
            destination: 4,
            next_hop: 2,
            metric: 10.0,
            protocol: "ospf".to_string(),
        }];
        assert!(applier.apply(&entries).is_ok());
    }

    #[test]
    fn entries_missing_prefix_or_next_hop_mapping_are_skipped() {
        let applier = LinuxForwardingApplier::new(ForwardingConfig {
            enabled: true,
            dry_run: true,
            table: 254,
            destination_prefixes: BTreeMap::new(),
            next_hop_ips: BTreeMap::new(),
        });
        let entries = vec![ForwardingEntry {
            destination: 4,
            next_hop: 2,
            metric: 10.0,
            protocol: "ospf".to_string(),
        }];
        assert!(applier.apply(&entries).is_ok());
    }
}
