//! The reconciliation pass: diff the latest inventories against the
//! registry and create, replace, tolerate, or tear down bridges.
//!
//! Runs once per poll, always inside the engine's critical section, so
//! a pass never overlaps another pass or a snapshot publish.
//!
//! Policies worth knowing before editing:
//!
//! - Topic bridges are never proactively removed when demand
//!   disappears; transient discovery flaps must not tear down working
//!   bridges. Replacement happens only on a type change. The removal
//!   logic does exist behind `remove_stale_topic_bridges` (default
//!   off).
//! - The B→A pass tolerates an empty recorded Domain A type: a bridge
//!   created against an unknown-type subscriber is never considered
//!   stale by type mismatch alone. The A→B pass compares strictly.
//!   This asymmetry is deliberate; do not unify it.
//! - A service name is bridged in at most one direction at a time;
//!   whichever side reconciles first wins the name until removed.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::factory::{BridgeFactory, FactoryError, TypeMap};
use super::registry::{BridgeRegistry, ServiceBridge, TopicBridge};
use super::{Direction, Domain};
use crate::discovery::{ServiceInventory, UNKNOWN_TYPE};
use crate::whitelist::WarnOnce;

/// Fixed per-side queue depth for topic bridges.
const TOPIC_QUEUE_DEPTH: usize = 10;

/// Borrowed view of all six inventory maps for one pass.
pub struct Inventories<'a> {
    pub a_publishers: &'a BTreeMap<String, String>,
    pub a_subscribers: &'a BTreeMap<String, String>,
    pub b_publishers: &'a BTreeMap<String, String>,
    pub b_subscribers: &'a BTreeMap<String, String>,
    pub a_services: &'a ServiceInventory,
    pub b_services: &'a ServiceInventory,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcilerOptions {
    /// Bridge every Domain A publisher, with or without a Domain B
    /// subscriber, using the anticipated type mapping.
    pub bridge_all_a_to_b: bool,
    /// Mirror for Domain B publishers.
    pub bridge_all_b_to_a: bool,
    /// Tear down topic bridges whose demand disappeared. Off by
    /// default; known to destabilize bridges on unreliable networks.
    pub remove_stale_topic_bridges: bool,
}

pub struct Reconciler {
    factory: Arc<dyn BridgeFactory>,
    type_map: Arc<dyn TypeMap>,
    options: ReconcilerOptions,
    /// Service names already reported as unbridgeable, so the warning
    /// fires once per name. The capability lookup itself is cheap and
    /// still retried every cycle.
    unbridgeable_warned: WarnOnce,
}

impl Reconciler {
    pub fn new(
        factory: Arc<dyn BridgeFactory>,
        type_map: Arc<dyn TypeMap>,
        options: ReconcilerOptions,
    ) -> Self {
        Self {
            factory,
            type_map,
            options,
            unbridgeable_warned: WarnOnce::new(),
        }
    }

    /// Run one full reconciliation pass.
    pub fn run(&mut self, inv: &Inventories<'_>, registry: &mut BridgeRegistry) {
        self.reconcile_topics_a_to_b(inv, registry);
        self.reconcile_topics_b_to_a(inv, registry);
        if self.options.remove_stale_topic_bridges {
            self.remove_stale_topics(inv, registry);
        }
        self.reconcile_services(inv, registry);
        self.remove_stale_services(inv, registry);
    }

    // ── Topic passes ─────────────────────────────────────────────────────

    fn reconcile_topics_a_to_b(&self, inv: &Inventories<'_>, registry: &mut BridgeRegistry) {
        for (topic, type_a) in inv.a_publishers {
            // Demand exists when Domain B has a subscriber; bridge-all
            // substitutes the anticipated mapped type instead.
            let type_b = match inv.b_subscribers.get(topic) {
                Some(ty) => ty.clone(),
                None => {
                    if !self.options.bridge_all_a_to_b {
                        continue;
                    }
                    match self.type_map.map_a_to_b(type_a) {
                        Some(ty) => ty,
                        None => continue,
                    }
                }
            };

            if let Some(existing) = registry.topics_a_to_b.get(topic) {
                if existing.type_a == *type_a && existing.type_b == type_b {
                    continue;
                }
                registry.topics_a_to_b.remove(topic);
                tracing::info!(topic = topic.as_str(), "replacing A->B bridge for topic");
            }

            match self.factory.create_topic_bridge(
                Direction::AToB,
                type_a,
                topic,
                TOPIC_QUEUE_DEPTH,
                &type_b,
                topic,
                TOPIC_QUEUE_DEPTH,
            ) {
                Ok(handle) => {
                    tracing::info!(
                        topic = topic.as_str(),
                        type_a = type_a.as_str(),
                        type_b = type_b.as_str(),
                        "created A->B bridge for topic"
                    );
                    registry.topics_a_to_b.insert(
                        topic.clone(),
                        TopicBridge {
                            type_a: type_a.clone(),
                            type_b,
                            handle,
                        },
                    );
                }
                Err(error) => self.log_topic_failure(Direction::AToB, topic, type_a, &error),
            }
        }
    }

    fn reconcile_topics_b_to_a(&self, inv: &Inventories<'_>, registry: &mut BridgeRegistry) {
        for (topic, type_b) in inv.b_publishers {
            let type_a = match inv.a_subscribers.get(topic) {
                Some(ty) => ty.clone(),
                None => {
                    if !self.options.bridge_all_b_to_a {
                        continue;
                    }
                    match self.type_map.map_b_to_a(type_b) {
                        Some(ty) => ty,
                        None => continue,
                    }
                }
            };

            if let Some(existing) = registry.topics_b_to_a.get(topic) {
                // An empty recorded Domain A type means the bridge was
                // created against an unknown-type subscriber; it stays
                // valid whatever type the subscriber reports later.
                let type_a_ok =
                    existing.type_a == type_a || existing.type_a == UNKNOWN_TYPE;
                if type_a_ok && existing.type_b == *type_b {
                    continue;
                }
                registry.topics_b_to_a.remove(topic);
                tracing::info!(topic = topic.as_str(), "replacing B->A bridge for topic");
            }

            match self.factory.create_topic_bridge(
                Direction::BToA,
                type_b,
                topic,
                TOPIC_QUEUE_DEPTH,
                &type_a,
                topic,
                TOPIC_QUEUE_DEPTH,
            ) {
                Ok(handle) => {
                    tracing::info!(
                        topic = topic.as_str(),
                        type_b = type_b.as_str(),
                        type_a = type_a.as_str(),
                        "created B->A bridge for topic"
                    );
                    registry.topics_b_to_a.insert(
                        topic.clone(),
                        TopicBridge {
                            type_a,
                            type_b: type_b.clone(),
                            handle,
                        },
                    );
                }
                Err(error) => self.log_topic_failure(Direction::BToA, topic, type_b, &error),
            }
        }
    }

    fn log_topic_failure(
        &self,
        direction: Direction,
        topic: &str,
        source_type: &str,
        error: &FactoryError,
    ) {
        tracing::error!(
            topic = topic,
            source_type = source_type,
            direction = %direction,
            error = %error,
            "failed to create bridge for topic"
        );
        if matches!(error, FactoryError::UnsupportedPair { .. }) {
            tracing::error!("check the list of supported pairs with the --print-pairs option");
        }
    }

    /// Optional stale-topic teardown: an entry goes when its source
    /// publisher vanished, or (unless bridge-all holds the direction
    /// open) when the target-side demand vanished.
    fn remove_stale_topics(&self, inv: &Inventories<'_>, registry: &mut BridgeRegistry) {
        let stale_a_to_b: Vec<String> = registry
            .topics_a_to_b
            .keys()
            .filter(|topic| {
                !inv.a_publishers.contains_key(*topic)
                    || (!self.options.bridge_all_a_to_b
                        && !inv.b_subscribers.contains_key(*topic))
            })
            .cloned()
            .collect();
        for topic in stale_a_to_b {
            registry.topics_a_to_b.remove(&topic);
            tracing::info!(topic = topic.as_str(), "removed A->B bridge for topic");
        }

        let stale_b_to_a: Vec<String> = registry
            .topics_b_to_a
            .keys()
            .filter(|topic| {
                !inv.b_publishers.contains_key(*topic)
                    || (!self.options.bridge_all_b_to_a
                        && !inv.a_subscribers.contains_key(*topic))
            })
            .cloned()
            .collect();
        for topic in stale_b_to_a {
            registry.topics_b_to_a.remove(&topic);
            tracing::info!(topic = topic.as_str(), "removed B->A bridge for topic");
        }
    }

    // ── Service passes ───────────────────────────────────────────────────

    fn reconcile_services(&mut self, inv: &Inventories<'_>, registry: &mut BridgeRegistry) {
        // Services hosted on Domain A are served to Domain B callers:
        // the bridge runs B->A. Mirror below. Checking both maps before
        // creating keeps a name in at most one direction.
        for (name, ty) in inv.a_services {
            if registry.service_bridged(name) {
                continue;
            }
            match self.factory.service_factory(Domain::A, &ty.package, &ty.name) {
                Some(capability) => {
                    match capability.build_service_bridge(Direction::BToA, name) {
                        Ok(handle) => {
                            tracing::info!(
                                service = name.as_str(),
                                service_type = %ty,
                                "created B->A bridge for service"
                            );
                            registry
                                .services_b_to_a
                                .insert(name.clone(), ServiceBridge { handle });
                        }
                        Err(error) => tracing::error!(
                            service = name.as_str(),
                            error = %error,
                            "failed to create B->A bridge for service"
                        ),
                    }
                }
                None => self.warn_unbridgeable(Domain::A, name, ty),
            }
        }

        for (name, ty) in inv.b_services {
            if registry.service_bridged(name) {
                continue;
            }
            match self.factory.service_factory(Domain::B, &ty.package, &ty.name) {
                Some(capability) => {
                    match capability.build_service_bridge(Direction::AToB, name) {
                        Ok(handle) => {
                            tracing::info!(
                                service = name.as_str(),
                                service_type = %ty,
                                "created A->B bridge for service"
                            );
                            registry
                                .services_a_to_b
                                .insert(name.clone(), ServiceBridge { handle });
                        }
                        Err(error) => tracing::error!(
                            service = name.as_str(),
                            error = %error,
                            "failed to create A->B bridge for service"
                        ),
                    }
                }
                None => self.warn_unbridgeable(Domain::B, name, ty),
            }
        }
    }

    fn warn_unbridgeable(&mut self, domain: Domain, name: &str, ty: &crate::discovery::ServiceType) {
        if self.unbridgeable_warned.first(&format!("{domain}:{name}")) {
            tracing::warn!(
                service = name,
                domain = %domain,
                service_type = %ty,
                "no capability to bridge service"
            );
        }
    }

    /// Unlike topics, a service bridge goes away as soon as its
    /// originating domain stops listing the name.
    fn remove_stale_services(&self, inv: &Inventories<'_>, registry: &mut BridgeRegistry) {
        let stale_b_to_a: Vec<String> = registry
            .services_b_to_a
            .keys()
            .filter(|name| !inv.a_services.contains_key(*name))
            .cloned()
            .collect();
        for name in stale_b_to_a {
            if let Some(mut bridge) = registry.services_b_to_a.remove(&name) {
                if let Err(error) = bridge.handle.shutdown() {
                    tracing::error!(
                        service = name.as_str(),
                        error = %error,
                        "error while removing B->A bridge for service"
                    );
                }
                tracing::info!(service = name.as_str(), "removed B->A bridge for service");
            }
        }

        let stale_a_to_b: Vec<String> = registry
            .services_a_to_b
            .keys()
            .filter(|name| !inv.b_services.contains_key(*name))
            .cloned()
            .collect();
        for name in stale_a_to_b {
            if let Some(mut bridge) = registry.services_a_to_b.remove(&name) {
                if let Err(error) = bridge.handle.shutdown() {
                    tracing::error!(
                        service = name.as_str(),
                        error = %error,
                        "error while removing A->B bridge for service"
                    );
                }
                tracing::info!(service = name.as_str(), "removed A->B bridge for service");
            }
        }
    }
}
