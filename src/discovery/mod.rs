//! Domain discovery: introspection traits and inventory snapshot types.
//!
//! Each domain exposes its native discovery service through a narrow
//! trait so the pollers and the reconciler never depend on a concrete
//! middleware. The HTTP-backed implementations live in [`client`]; test
//! code substitutes its own.

pub mod client;
pub mod domain_a;
pub mod domain_b;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// Type placeholder recorded for endpoints whose type the domain does
/// not report (Domain A subscribers). An empty type is still bridgeable
/// demand; the reconciler treats it as "unknown", never as a mismatch.
pub const UNKNOWN_TYPE: &str = "";

/// A service type split into its package and type-name components.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceType {
    pub package: String,
    pub name: String,
}

impl ServiceType {
    /// Parse a `package/TypeName` string. The split happens at the
    /// first `/`; a string without a separator is not a valid type.
    pub fn parse(raw: &str) -> Option<Self> {
        let (package, name) = raw.split_once('/')?;
        Some(Self {
            package: package.to_string(),
            name: name.to_string(),
        })
    }
}

impl std::fmt::Display for ServiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.package, self.name)
    }
}

/// Per-cycle record of active, whitelisted service names and types.
pub type ServiceInventory = BTreeMap<String, ServiceType>;

/// Raw system state reported by Domain A's discovery service: for each
/// topic, the names of the nodes publishing or subscribing to it, plus
/// the flat list of advertised service names.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SystemState {
    pub publishers: Vec<TopicNodes>,
    pub subscribers: Vec<TopicNodes>,
    pub services: Vec<String>,
}

/// One topic and the nodes attached to it on one side.
#[derive(Debug, Clone, Deserialize)]
pub struct TopicNodes {
    pub topic: String,
    pub nodes: Vec<String>,
}

/// A Domain B topic with its advertised types and endpoint counts.
#[derive(Debug, Clone, Deserialize)]
pub struct TopicEndpoint {
    pub name: String,
    pub types: Vec<String>,
    pub publisher_count: usize,
    pub subscriber_count: usize,
}

/// A Domain B service with its advertised types.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceEndpoint {
    pub name: String,
    pub types: Vec<String>,
}

/// Failure talking to a domain's discovery service. Aborts the current
/// poll cycle; the engine stays idle on stale state until the next
/// successful poll.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("discovery request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("service '{name}' is not known to the naming service")]
    UnknownService { name: String },
}

/// Domain A discovery primitives: master-style system state, topic
/// metadata, and the naming lookup the type probe needs.
#[async_trait]
pub trait DomainAIntrospect: Send + Sync {
    /// Query the full system state. `caller` identifies the bridge so
    /// the domain can attribute the request.
    async fn system_state(&self, caller: &str) -> Result<SystemState, DiscoveryError>;

    /// All known topics with their message types.
    async fn topic_types(&self) -> Result<Vec<(String, String)>, DiscoveryError>;

    /// Resolve a service name to the host/port of its server.
    async fn lookup_service(&self, name: &str) -> Result<(String, u16), DiscoveryError>;
}

/// Domain B discovery primitives: the graph reports names together with
/// advertised type lists and endpoint counts, and services carry their
/// type directly (no probe needed).
#[async_trait]
pub trait DomainBIntrospect: Send + Sync {
    async fn topic_endpoints(&self) -> Result<Vec<TopicEndpoint>, DiscoveryError>;

    async fn service_endpoints(&self) -> Result<Vec<ServiceEndpoint>, DiscoveryError>;
}
