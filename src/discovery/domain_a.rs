//! Domain A inventory builder.
//!
//! One poll queries the domain's discovery service for the full system
//! state, filters out the bridge's own endpoints, applies the whitelist,
//! resolves topic types from the domain's metadata, and probes service
//! types over the wire (Domain A does not advertise them).

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::discovery::{
    DiscoveryError, DomainAIntrospect, ServiceInventory, UNKNOWN_TYPE,
};
use crate::probe::TypeProbe;
use crate::whitelist::{MatchCache, WarnOnce, Whitelist};

/// One cycle's view of Domain A: whitelisted topic names with their
/// types, split by role, plus probed services.
#[derive(Debug, Default)]
pub struct DomainASnapshot {
    pub publishers: BTreeMap<String, String>,
    pub subscribers: BTreeMap<String, String>,
    pub services: ServiceInventory,
}

pub struct DomainAPoller {
    introspect: Arc<dyn DomainAIntrospect>,
    probe: TypeProbe,
    /// The bridge's own node identity; endpoints owned by it are not
    /// external demand and are filtered out of every snapshot.
    node_name: String,
    topic_whitelist: Arc<Whitelist>,
    service_whitelist: Arc<Whitelist>,
    topic_cache: MatchCache,
    service_cache: MatchCache,
    /// Names already reported as ignored, so the notification fires
    /// once. The whitelist itself still sees every name every cycle.
    ignored_topics: WarnOnce,
    ignored_services: WarnOnce,
}

impl DomainAPoller {
    pub fn new(
        introspect: Arc<dyn DomainAIntrospect>,
        probe: TypeProbe,
        node_name: impl Into<String>,
        topic_whitelist: Arc<Whitelist>,
        service_whitelist: Arc<Whitelist>,
    ) -> Self {
        Self {
            introspect,
            probe,
            node_name: node_name.into(),
            topic_whitelist,
            service_whitelist,
            topic_cache: MatchCache::new(),
            service_cache: MatchCache::new(),
            ignored_topics: WarnOnce::new(),
            ignored_services: WarnOnce::new(),
        }
    }

    /// Build one snapshot. Fails only if the discovery service itself
    /// is unreachable; individual probe failures just leave the service
    /// out of this cycle.
    pub async fn poll(&mut self) -> Result<DomainASnapshot, DiscoveryError> {
        let state = self.introspect.system_state(&self.node_name).await?;
        let topic_types: BTreeMap<String, String> =
            self.introspect.topic_types().await?.into_iter().collect();

        let mut snapshot = DomainASnapshot::default();

        for entry in &state.publishers {
            if !self.admit_topic(&entry.topic, &entry.nodes) {
                continue;
            }
            // A publisher not yet listed in the topic metadata has no
            // usable type; leave it out until the metadata catches up.
            let Some(ty) = topic_types.get(&entry.topic) else {
                continue;
            };
            snapshot.publishers.insert(entry.topic.clone(), ty.clone());
        }

        for entry in &state.subscribers {
            if !self.admit_topic(&entry.topic, &entry.nodes) {
                continue;
            }
            // Pure subscribers have no type in the topic metadata; keep
            // them with the unknown placeholder instead of dropping.
            let ty = topic_types
                .get(&entry.topic)
                .cloned()
                .unwrap_or_else(|| UNKNOWN_TYPE.to_string());
            snapshot.subscribers.insert(entry.topic.clone(), ty);
        }

        for name in &state.services {
            if !self.service_whitelist.matches(name, &mut self.service_cache) {
                if self.ignored_services.first(name) {
                    tracing::debug!(service = name.as_str(), "ignoring Domain A service");
                }
                continue;
            }
            match self.probe.probe(self.introspect.as_ref(), name).await {
                Ok(ty) => {
                    snapshot.services.insert(name.clone(), ty);
                }
                Err(error) => {
                    tracing::warn!(
                        service = name.as_str(),
                        error = %error,
                        "failed to probe Domain A service type"
                    );
                }
            }
        }

        Ok(snapshot)
    }

    /// Topic admission: at least one node besides the bridge itself,
    /// and a whitelist match.
    fn admit_topic(&mut self, topic: &str, nodes: &[String]) -> bool {
        if !nodes.iter().any(|node| *node != self.node_name) {
            return false;
        }
        if self.topic_whitelist.matches(topic, &mut self.topic_cache) {
            return true;
        }
        if self.ignored_topics.first(topic) {
            tracing::debug!(topic = topic, "ignoring Domain A topic");
        }
        false
    }
}
