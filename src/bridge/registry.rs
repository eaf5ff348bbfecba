//! In-memory registry of live bridge entries.
//!
//! Pure storage: four independent collections keyed by endpoint name,
//! one per bridge category. All mutation happens inside the
//! reconciler's critical section; reads for introspection (the Domain B
//! self-count subtraction) happen under the same engine lock.

use std::collections::BTreeMap;

use super::factory::BridgeHandle;

/// A live topic bridge and the types it was last created with.
///
/// The recorded types always reflect the types used when the handle was
/// (re)created; a stale pair triggers replacement, never silent
/// divergence.
pub struct TopicBridge {
    pub type_a: String,
    pub type_b: String,
    pub handle: Box<dyn BridgeHandle>,
}

/// A live service bridge.
pub struct ServiceBridge {
    pub handle: Box<dyn BridgeHandle>,
}

/// The four bridge collections.
///
/// A topic name may legally appear in both topic maps (bidirectional
/// bridging); a service name may occupy at most one of the two service
/// maps at a time.
#[derive(Default)]
pub struct BridgeRegistry {
    pub topics_a_to_b: BTreeMap<String, TopicBridge>,
    pub topics_b_to_a: BTreeMap<String, TopicBridge>,
    pub services_a_to_b: BTreeMap<String, ServiceBridge>,
    pub services_b_to_a: BTreeMap<String, ServiceBridge>,
}

impl BridgeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any collection holds an entry for `name`.
    pub fn service_bridged(&self, name: &str) -> bool {
        self.services_a_to_b.contains_key(name) || self.services_b_to_a.contains_key(name)
    }
}
