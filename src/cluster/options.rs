use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::wire::codec::MAX_TIMEOUT_SECS;

/// Well-known group every node joins.
pub const DEFAULT_MULTICAST_GROUP: IpAddr = IpAddr::V4(Ipv4Addr::new(224, 0, 0, 2));

/// Run configuration, read-only once the manager starts.
///
/// Times are seconds as `f32`, matching the on-wire timeout field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClusterOptions {
    /// Shared token; datagrams carrying another secret are dropped.
    pub secret: u64,
    /// Total nodes expected, including this one.
    pub expected_nodes: usize,
    pub port: u16,
    pub send_message_timeout_sec: f32,
    pub message_ack_retry_timeout_sec: f32,
    pub identify_cluster_timeout_sec: f32,
    /// Longest the process worker waits for traffic before sweeping.
    pub resend_thread_sleep_time_sec: f32,
    pub multicast_group: IpAddr,
    /// Address advertised to peers; discovered from the routing table when unset.
    pub local_address: Option<IpAddr>,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            secret: 1234,
            expected_nodes: 1,
            port: 58085,
            send_message_timeout_sec: 0.2,
            message_ack_retry_timeout_sec: 0.1,
            identify_cluster_timeout_sec: 20.0,
            resend_thread_sleep_time_sec: 0.5,
            multicast_group: DEFAULT_MULTICAST_GROUP,
            local_address: None,
        }
    }
}

impl ClusterOptions {
    pub fn new(secret: u64, expected_nodes: usize) -> Self {
        Self {
            secret,
            expected_nodes,
            ..Self::default()
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read cluster options {}", path.display()))?;
        let options: ClusterOptions = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid cluster options in {}", path.display()))?;
        options.validate()?;
        Ok(options)
    }

    /// Overlays `CLUSTER_*` environment variables onto these options.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    pub(crate) fn apply_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        fn parse<T: FromStr>(key: &str, value: String) -> Result<T>
        where
            T::Err: std::fmt::Display,
        {
            value
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid {}={:?}: {}", key, value, e))
        }

        if let Some(v) = lookup("CLUSTER_SECRET") {
            self.secret = parse("CLUSTER_SECRET", v)?;
        }
        if let Some(v) = lookup("CLUSTER_EXPECTED_NODES") {
            self.expected_nodes = parse("CLUSTER_EXPECTED_NODES", v)?;
        }
        if let Some(v) = lookup("CLUSTER_PORT") {
            self.port = parse("CLUSTER_PORT", v)?;
        }
        if let Some(v) = lookup("CLUSTER_SEND_TIMEOUT_SEC") {
            self.send_message_timeout_sec = parse("CLUSTER_SEND_TIMEOUT_SEC", v)?;
        }
        if let Some(v) = lookup("CLUSTER_ACK_RETRY_SEC") {
            self.message_ack_retry_timeout_sec = parse("CLUSTER_ACK_RETRY_SEC", v)?;
        }
        if let Some(v) = lookup("CLUSTER_IDENTIFY_TIMEOUT_SEC") {
            self.identify_cluster_timeout_sec = parse("CLUSTER_IDENTIFY_TIMEOUT_SEC", v)?;
        }
        if let Some(v) = lookup("CLUSTER_POLL_INTERVAL_SEC") {
            self.resend_thread_sleep_time_sec = parse("CLUSTER_POLL_INTERVAL_SEC", v)?;
        }
        if let Some(v) = lookup("CLUSTER_MULTICAST_GROUP") {
            self.multicast_group = parse("CLUSTER_MULTICAST_GROUP", v)?;
        }
        if let Some(v) = lookup("CLUSTER_LOCAL_ADDRESS") {
            self.local_address = Some(parse("CLUSTER_LOCAL_ADDRESS", v)?);
        }

        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.expected_nodes >= 1, "expected_nodes must include this node");
        for (name, value) in [
            ("send_message_timeout_sec", self.send_message_timeout_sec),
            ("message_ack_retry_timeout_sec", self.message_ack_retry_timeout_sec),
            ("identify_cluster_timeout_sec", self.identify_cluster_timeout_sec),
            ("resend_thread_sleep_time_sec", self.resend_thread_sleep_time_sec),
        ] {
            anyhow::ensure!(
                value > 0.0 && value <= MAX_TIMEOUT_SECS,
                "{} must be between 0 and {} seconds, got {}",
                name,
                MAX_TIMEOUT_SECS,
                value
            );
        }
        anyhow::ensure!(
            self.multicast_group.is_multicast(),
            "{} is not a multicast group address",
            self.multicast_group
        );
        Ok(())
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs_f32(self.send_message_timeout_sec)
    }

    pub fn ack_retry_interval(&self) -> Duration {
        Duration::from_secs_f32(self.message_ack_retry_timeout_sec)
    }

    pub fn identify_timeout(&self) -> Duration {
        Duration::from_secs_f32(self.identify_cluster_timeout_sec)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f32(self.resend_thread_sleep_time_sec)
    }
}
