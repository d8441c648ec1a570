//! Channel address planning
//!
//! Every address the pipeline uses is computed here, once, before any worker
//! starts. Workers receive their address sets by value (inside their frozen
//! configuration) and never discover endpoints at runtime.
//!
//! Four sets exist, each with a `descriptions` and an `events` address:
//!
//! | Set                | Owner              | Abstract names                                     | Ports    |
//! |--------------------|--------------------|----------------------------------------------------|----------|
//! | `capture_out`      | Capture-Transport  | `rtt2socket_desc`, `rtt2socket_ev`                 | base+0,1 |
//! | `model_in`         | Model (binds)      | `model_creator_desc`, `model_creator_ev`           | base+2,3 |
//! | `model_out`        | Model              | `model_creator_proc_desc`, `model_creator_proc_ev` | base+4,5 |
//! | `plot_in`          | Presentation (binds) | `plot_desc`, `plot_ev`                           | base+6,7 |
//!
//! A hop is `(producer outbound, consumer inbound)`. The consumer inbound
//! set is held in an [`Arc`] and the very same `Arc` is handed to the
//! producer as its remote set, so both sides of a hop cannot drift apart.

use crate::config::{AddressingSettings, TransportPreference, LOOPBACK_HOST};
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Number of loopback ports in the plan (four sets of two channels)
pub const PORT_BLOCK_LEN: u16 = 8;

/// Platform capability deciding the address family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressFamily {
    /// Abstract (unnamed-filesystem) local datagram sockets
    AbstractLocal,
    /// Loopback TCP on a fixed port block
    LoopbackTcp,
}

impl AddressFamily {
    /// The family this platform supports natively
    pub fn native() -> Self {
        if Self::supports_abstract_sockets() {
            AddressFamily::AbstractLocal
        } else {
            AddressFamily::LoopbackTcp
        }
    }

    /// Abstract socket names exist on Linux only
    pub fn supports_abstract_sockets() -> bool {
        cfg!(target_os = "linux")
    }

    pub fn from_preference(preference: TransportPreference) -> Self {
        match preference {
            TransportPreference::Auto => Self::native(),
            TransportPreference::Tcp => AddressFamily::LoopbackTcp,
        }
    }
}

/// The two logical channels of every hop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Descriptions,
    Events,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 2] = [ChannelKind::Descriptions, ChannelKind::Events];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Descriptions => "descriptions",
            ChannelKind::Events => "events",
        }
    }

    /// Suffix used in abstract socket names
    fn name_suffix(&self) -> &'static str {
        match self {
            ChannelKind::Descriptions => "desc",
            ChannelKind::Events => "ev",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One transport endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum ChannelAddress {
    AbstractLocal { name: String },
    LoopbackTcp { host: String, port: u16 },
}

impl ChannelAddress {
    pub fn family(&self) -> AddressFamily {
        match self {
            ChannelAddress::AbstractLocal { .. } => AddressFamily::AbstractLocal,
            ChannelAddress::LoopbackTcp { .. } => AddressFamily::LoopbackTcp,
        }
    }
}

impl std::fmt::Display for ChannelAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelAddress::AbstractLocal { name } => write!(f, "@{}", name),
            ChannelAddress::LoopbackTcp { host, port } => write!(f, "{}:{}", host, port),
        }
    }
}

/// Addresses of the `descriptions` and `events` channels of one endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelAddressSet {
    pub descriptions: ChannelAddress,
    pub events: ChannelAddress,
}

impl ChannelAddressSet {
    pub fn get(&self, kind: ChannelKind) -> &ChannelAddress {
        match kind {
            ChannelKind::Descriptions => &self.descriptions,
            ChannelKind::Events => &self.events,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ChannelKind, &ChannelAddress)> {
        ChannelKind::ALL.into_iter().map(move |kind| (kind, self.get(kind)))
    }
}

impl std::fmt::Display for ChannelAddressSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{descriptions: {}, events: {}}}", self.descriptions, self.events)
    }
}

/// Validated inputs of the address plan
///
/// Fields are private: the whole port block always fits below `u16::MAX`,
/// which [`AddressPlan::compute`] relies on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressingConfig {
    family: AddressFamily,
    host: String,
    base_port: u16,
    namespace: Option<String>,
}

/// Highest base port that still fits the whole block
pub const MAX_BASE_PORT: u16 = u16::MAX - (PORT_BLOCK_LEN - 1);

fn check_base_port(base_port: u16) -> Result<u16> {
    if base_port == 0 || base_port > MAX_BASE_PORT {
        return Err(PipelineError::Config(format!(
            "base port {} leaves no room for {} consecutive ports",
            base_port, PORT_BLOCK_LEN
        )));
    }
    Ok(base_port)
}

fn check_namespace(namespace: String) -> Result<String> {
    if namespace.is_empty() || namespace.contains('\0') {
        return Err(PipelineError::Config(format!(
            "invalid socket namespace {:?}",
            namespace
        )));
    }
    Ok(namespace)
}

impl AddressingConfig {
    pub fn new(family: AddressFamily) -> Self {
        Self {
            family,
            host: LOOPBACK_HOST.to_string(),
            base_port: crate::config::DEFAULT_BASE_PORT,
            namespace: None,
        }
    }

    /// Resolve settings, rejecting a port block that does not fit
    pub fn from_settings(settings: &AddressingSettings) -> Result<Self> {
        let mut config = Self::new(AddressFamily::from_preference(settings.transport))
            .with_base_port(settings.base_port)?;
        if let Some(ns) = &settings.namespace {
            config = config.with_namespace(ns.clone())?;
        }
        Ok(config)
    }

    pub fn with_base_port(mut self, base_port: u16) -> Result<Self> {
        self.base_port = check_base_port(base_port)?;
        Ok(self)
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Result<Self> {
        self.namespace = Some(check_namespace(namespace.into())?);
        Ok(self)
    }

    pub fn family(&self) -> AddressFamily {
        self.family
    }

    pub fn base_port(&self) -> u16 {
        self.base_port
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
}

/// The four address sets of one pipeline
#[derive(Debug, Clone)]
pub struct AddressPlan {
    /// Capture-Transport's own send-side endpoint
    pub capture_out: Arc<ChannelAddressSet>,
    /// Model's receiving endpoint, target of the first hop
    pub model_in: Arc<ChannelAddressSet>,
    /// Model's own send-side endpoint
    pub model_out: Arc<ChannelAddressSet>,
    /// Presentation's receiving endpoint, target of the second hop
    pub plot_in: Arc<ChannelAddressSet>,
}

/// Set slots in plan order: (label, abstract name stem)
const SLOTS: [(&str, &str); 4] = [
    ("capture_out", "rtt2socket"),
    ("model_in", "model_creator"),
    ("model_out", "model_creator_proc"),
    ("plot_in", "plot"),
];

impl AddressPlan {
    /// Compute the plan. Pure; never fails on a validated config.
    pub fn compute(config: &AddressingConfig) -> Self {
        let set_at = |slot: usize| -> Arc<ChannelAddressSet> {
            let address = |kind: ChannelKind| match config.family {
                AddressFamily::AbstractLocal => {
                    let stem = SLOTS[slot].1;
                    let name = match config.namespace.as_deref() {
                        Some(ns) => format!("{}_{}_{}", ns, stem, kind.name_suffix()),
                        None => format!("{}_{}", stem, kind.name_suffix()),
                    };
                    ChannelAddress::AbstractLocal { name }
                }
                AddressFamily::LoopbackTcp => {
                    let offset = slot as u16 * 2
                        + match kind {
                            ChannelKind::Descriptions => 0,
                            ChannelKind::Events => 1,
                        };
                    ChannelAddress::LoopbackTcp {
                        host: config.host.clone(),
                        port: config.base_port + offset,
                    }
                }
            };
            Arc::new(ChannelAddressSet {
                descriptions: address(ChannelKind::Descriptions),
                events: address(ChannelKind::Events),
            })
        };

        Self {
            capture_out: set_at(0),
            model_in: set_at(1),
            model_out: set_at(2),
            plot_in: set_at(3),
        }
    }

    /// All four sets with their labels, in plan order
    pub fn sets(&self) -> [(&'static str, &Arc<ChannelAddressSet>); 4] {
        [
            (SLOTS[0].0, &self.capture_out),
            (SLOTS[1].0, &self.model_in),
            (SLOTS[2].0, &self.model_out),
            (SLOTS[3].0, &self.plot_in),
        ]
    }

    /// Every address in the plan
    pub fn addresses(&self) -> Vec<&ChannelAddress> {
        self.sets()
            .into_iter()
            .flat_map(|(_, set)| [&set.descriptions, &set.events])
            .collect()
    }

    pub fn log_summary(&self) {
        for (label, set) in self.sets() {
            tracing::debug!("Channel set {}: {}", label, set);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_abstract_names() {
        let plan = AddressPlan::compute(&AddressingConfig::new(AddressFamily::AbstractLocal));
        assert_eq!(
            plan.capture_out.descriptions,
            ChannelAddress::AbstractLocal {
                name: "rtt2socket_desc".into()
            }
        );
        assert_eq!(plan.model_out.events.to_string(), "@model_creator_proc_ev");
        assert_eq!(plan.plot_in.descriptions.to_string(), "@plot_desc");
    }

    #[test]
    fn test_tcp_port_block() {
        let plan = AddressPlan::compute(&AddressingConfig::new(AddressFamily::LoopbackTcp));
        let ports: Vec<u16> = plan
            .addresses()
            .into_iter()
            .map(|a| match a {
                ChannelAddress::LoopbackTcp { port, .. } => *port,
                other => panic!("unexpected address {other}"),
            })
            .collect();
        assert_eq!(ports, (8000..8008).collect::<Vec<_>>());
    }

    #[test]
    fn test_all_addresses_unique() {
        for family in [AddressFamily::AbstractLocal, AddressFamily::LoopbackTcp] {
            let plan = AddressPlan::compute(&AddressingConfig::new(family));
            let unique: HashSet<_> = plan.addresses().into_iter().collect();
            assert_eq!(unique.len(), 8, "family {:?}", family);
        }
    }

    #[test]
    fn test_plan_is_deterministic() {
        let config = AddressingConfig::new(AddressFamily::LoopbackTcp)
            .with_base_port(9100)
            .unwrap();
        let a = AddressPlan::compute(&config);
        let b = AddressPlan::compute(&config);
        assert_eq!(a.addresses(), b.addresses());
    }

    #[test]
    fn test_namespace_prefixes_names() {
        let config = AddressingConfig::new(AddressFamily::AbstractLocal).with_namespace("t42")
            .unwrap();
        let plan = AddressPlan::compute(&config);
        assert_eq!(plan.model_in.events.to_string(), "@t42_model_creator_ev");
    }

    #[test]
    fn test_port_block_must_fit() {
        let settings = AddressingSettings {
            base_port: u16::MAX - 3,
            ..Default::default()
        };
        assert!(AddressingConfig::from_settings(&settings).is_err());

        let settings = AddressingSettings {
            base_port: u16::MAX - 7,
            ..Default::default()
        };
        assert!(AddressingConfig::from_settings(&settings).is_ok());
    }

    #[test]
    fn test_builder_rejects_port_block_past_u16() {
        let config = AddressingConfig::new(AddressFamily::LoopbackTcp);
        assert!(config.clone().with_base_port(u16::MAX - 6).is_err());
        assert!(config.clone().with_base_port(u16::MAX - 3).is_err());
        assert!(config.clone().with_base_port(0).is_err());

        let config = config.with_base_port(u16::MAX - 7).unwrap();
        let plan = AddressPlan::compute(&config);
        assert_eq!(
            plan.plot_in.events,
            ChannelAddress::LoopbackTcp {
                host: LOOPBACK_HOST.to_string(),
                port: u16::MAX
            }
        );
    }

    #[test]
    fn test_builder_rejects_empty_namespace() {
        let config = AddressingConfig::new(AddressFamily::AbstractLocal);
        assert!(config.clone().with_namespace("").is_err());
        assert!(config.with_namespace("a\0b").is_err());
    }

    #[test]
    fn test_forced_tcp() {
        let settings = AddressingSettings {
            transport: TransportPreference::Tcp,
            ..Default::default()
        };
        let config = AddressingConfig::from_settings(&settings).unwrap();
        assert_eq!(config.family(), AddressFamily::LoopbackTcp);
    }

    #[test]
    fn test_set_serializes_with_family_tag() {
        let set = ChannelAddressSet {
            descriptions: ChannelAddress::LoopbackTcp {
                host: "127.0.0.1".into(),
                port: 8006,
            },
            events: ChannelAddress::AbstractLocal {
                name: "plot_ev".into(),
            },
        };
        let json = serde_json::to_string(&set).unwrap();
        assert!(json.contains(r#""family":"loopback_tcp""#));
        let back: ChannelAddressSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
    }
}
