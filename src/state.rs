//! Shared engine state.
//!
//! The two pollers run on independent timers but never touch the maps
//! directly: each hands its finished snapshot to the engine, which
//! swaps it in and reconciles inside one critical section. A single
//! mutex guards all six inventory maps, the registry, and the
//! reconciler, so a pass always sees a consistent world.
//!
//! Slow work (HTTP queries, type probes) happens in the pollers before
//! the lock is taken; the critical section is pure map diffing.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::bridge::reconciler::{Inventories, Reconciler};
use crate::bridge::registry::BridgeRegistry;
use crate::discovery::domain_a::DomainASnapshot;
use crate::discovery::domain_b::DomainBSnapshot;
use crate::discovery::ServiceInventory;

/// Registry sizes for the periodic status log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeStats {
    pub topics_a_to_b: usize,
    pub topics_b_to_a: usize,
    pub services_a_to_b: usize,
    pub services_b_to_a: usize,
}

struct Shared {
    a_publishers: BTreeMap<String, String>,
    a_subscribers: BTreeMap<String, String>,
    a_services: ServiceInventory,
    b_publishers: BTreeMap<String, String>,
    b_subscribers: BTreeMap<String, String>,
    b_services: ServiceInventory,
    registry: BridgeRegistry,
    reconciler: Reconciler,
}

pub struct Engine {
    shared: Mutex<Shared>,
    show_introspection: bool,
}

impl Engine {
    pub fn new(reconciler: Reconciler, show_introspection: bool) -> Self {
        Self {
            shared: Mutex::new(Shared {
                a_publishers: BTreeMap::new(),
                a_subscribers: BTreeMap::new(),
                a_services: ServiceInventory::new(),
                b_publishers: BTreeMap::new(),
                b_subscribers: BTreeMap::new(),
                b_services: ServiceInventory::new(),
                registry: BridgeRegistry::new(),
                reconciler,
            }),
            show_introspection,
        }
    }

    /// Swap in a Domain A snapshot and reconcile.
    pub fn publish_domain_a(&self, snapshot: DomainASnapshot) {
        if self.show_introspection {
            tracing::info!(
                publishers = ?snapshot.publishers,
                subscribers = ?snapshot.subscribers,
                services = ?snapshot.services.keys().collect::<Vec<_>>(),
                "Domain A inventory"
            );
        }

        let mut shared = self.shared.lock();
        shared.a_publishers = snapshot.publishers;
        shared.a_subscribers = snapshot.subscribers;
        shared.a_services = snapshot.services;
        reconcile_locked(&mut shared);
    }

    /// Swap in a Domain B snapshot and reconcile. The snapshot carries
    /// raw endpoint counts; one publisher or subscriber is discounted
    /// per topic the bridge itself currently mirrors, so our own
    /// endpoints never read as external demand. That check needs the
    /// registry, which is why it happens here under the lock and not in
    /// the poller.
    pub fn publish_domain_b(&self, snapshot: DomainBSnapshot) {
        if self.show_introspection {
            tracing::info!(
                topics = ?snapshot.topics,
                services = ?snapshot.services.keys().collect::<Vec<_>>(),
                "Domain B inventory"
            );
        }

        let mut shared = self.shared.lock();

        let mut b_publishers = BTreeMap::new();
        let mut b_subscribers = BTreeMap::new();
        for topic in snapshot.topics {
            let mut publisher_count = topic.publisher_count;
            let mut subscriber_count = topic.subscriber_count;
            // An A->B bridge publishes on Domain B; a B->A bridge
            // subscribes there.
            if shared.registry.topics_a_to_b.contains_key(&topic.name) {
                publisher_count = publisher_count.saturating_sub(1);
            }
            if shared.registry.topics_b_to_a.contains_key(&topic.name) {
                subscriber_count = subscriber_count.saturating_sub(1);
            }
            if publisher_count > 0 {
                b_publishers.insert(topic.name.clone(), topic.ty.clone());
            }
            if subscriber_count > 0 {
                b_subscribers.insert(topic.name, topic.ty);
            }
        }

        shared.b_publishers = b_publishers;
        shared.b_subscribers = b_subscribers;
        shared.b_services = snapshot.services;
        reconcile_locked(&mut shared);
    }

    pub fn stats(&self) -> BridgeStats {
        let shared = self.shared.lock();
        BridgeStats {
            topics_a_to_b: shared.registry.topics_a_to_b.len(),
            topics_b_to_a: shared.registry.topics_b_to_a.len(),
            services_a_to_b: shared.registry.services_a_to_b.len(),
            services_b_to_a: shared.registry.services_b_to_a.len(),
        }
    }
}

fn reconcile_locked(shared: &mut Shared) {
    let Shared {
        a_publishers,
        a_subscribers,
        a_services,
        b_publishers,
        b_subscribers,
        b_services,
        registry,
        reconciler,
    } = shared;
    let inventories = Inventories {
        a_publishers,
        a_subscribers,
        b_publishers,
        b_subscribers,
        a_services,
        b_services,
    };
    reconciler.run(&inventories, registry);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::bridge::factory::{StaticFactory, StaticTypeMap};
    use crate::bridge::reconciler::ReconcilerOptions;
    use crate::discovery::domain_b::TopicCounts;

    fn engine() -> Engine {
        let factory = Arc::new(StaticFactory::new(
            vec![
                ("LaserScan".to_string(), "sensors/LaserScan".to_string()),
                ("Twist".to_string(), "geometry/Twist".to_string()),
            ],
            Vec::new(),
        ));
        let type_map = Arc::new(StaticTypeMap::default());
        Engine::new(
            Reconciler::new(factory, type_map, ReconcilerOptions::default()),
            false,
        )
    }

    fn b_topic(name: &str, ty: &str, pubs: usize, subs: usize) -> TopicCounts {
        TopicCounts {
            name: name.to_string(),
            ty: ty.to_string(),
            publisher_count: pubs,
            subscriber_count: subs,
        }
    }

    #[test]
    fn test_snapshots_from_both_domains_create_bridge() {
        let engine = engine();

        engine.publish_domain_b(DomainBSnapshot {
            topics: vec![b_topic("/scan", "sensors/LaserScan", 0, 1)],
            services: ServiceInventory::new(),
        });
        assert_eq!(engine.stats().topics_a_to_b, 0);

        let mut snapshot = DomainASnapshot::default();
        snapshot
            .publishers
            .insert("/scan".to_string(), "LaserScan".to_string());
        engine.publish_domain_a(snapshot);

        assert_eq!(engine.stats().topics_a_to_b, 1);
    }

    #[test]
    fn test_own_publisher_discounted_on_domain_b() {
        let engine = engine();

        // Establish the A->B bridge; it now publishes /scan on Domain B.
        engine.publish_domain_b(DomainBSnapshot {
            topics: vec![b_topic("/scan", "sensors/LaserScan", 0, 1)],
            services: ServiceInventory::new(),
        });
        let mut snapshot = DomainASnapshot::default();
        snapshot
            .publishers
            .insert("/scan".to_string(), "LaserScan".to_string());
        engine.publish_domain_a(snapshot);
        assert_eq!(engine.stats().topics_a_to_b, 1);

        // Domain B now counts one publisher: the bridge's own. After
        // the discount there is no external publisher, so no B->A
        // bridge appears.
        engine.publish_domain_b(DomainBSnapshot {
            topics: vec![b_topic("/scan", "sensors/LaserScan", 1, 1)],
            services: ServiceInventory::new(),
        });
        assert_eq!(engine.stats().topics_b_to_a, 0);
        assert_eq!(engine.stats().topics_a_to_b, 1);
    }

    #[test]
    fn test_own_subscriber_discounted_on_domain_b() {
        let engine = engine();

        // External Domain B publisher plus a Domain A subscriber makes
        // a B->A bridge, which subscribes on Domain B.
        let mut snapshot = DomainASnapshot::default();
        snapshot
            .subscribers
            .insert("/cmd".to_string(), "Twist".to_string());
        engine.publish_domain_a(snapshot);

        engine.publish_domain_b(DomainBSnapshot {
            topics: vec![b_topic("/cmd", "geometry/Twist", 1, 0)],
            services: ServiceInventory::new(),
        });
        assert_eq!(engine.stats().topics_b_to_a, 1);

        // The next poll counts the bridge's subscriber; the discount
        // keeps /cmd out of the subscriber inventory and the bridge
        // persists untouched.
        engine.publish_domain_b(DomainBSnapshot {
            topics: vec![b_topic("/cmd", "geometry/Twist", 1, 1)],
            services: ServiceInventory::new(),
        });
        assert_eq!(engine.stats().topics_b_to_a, 1);
        assert_eq!(engine.stats().topics_a_to_b, 0);
    }
}
