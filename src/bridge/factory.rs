//! External bridge-construction capabilities, expressed as traits.
//!
//! The engine never builds message or service conversions itself; it
//! asks an injected [`BridgeFactory`] for them and records the opaque
//! handles it gets back. The [`TypeMap`] answers "what type would this
//! bridge to?" for bridge-all mode and backs `--print-pairs`.

use std::sync::Arc;

use thiserror::Error;

use super::{Direction, Domain};

/// Failure from the bridge factory.
#[derive(Debug, Error)]
pub enum FactoryError {
    /// No conversion is registered for the requested type pair. The
    /// reconciler points the operator at `--print-pairs` on this one.
    #[error("no conversion registered for type pair '{source_type}' <=> '{target}'")]
    UnsupportedPair { source_type: String, target: String },

    #[error("bridge construction failed: {0}")]
    Construction(String),
}

/// A live bridge object. Dropping the handle releases the underlying
/// endpoints; [`BridgeHandle::shutdown`] exists so teardown errors can
/// be surfaced before the drop.
pub trait BridgeHandle: Send {
    fn shutdown(&mut self) -> Result<(), FactoryError> {
        Ok(())
    }
}

impl std::fmt::Debug for dyn BridgeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn BridgeHandle")
    }
}

/// Builds directional service bridges for one service type.
pub trait ServiceCapability: Send + Sync {
    fn build_service_bridge(
        &self,
        direction: Direction,
        name: &str,
    ) -> Result<Box<dyn BridgeHandle>, FactoryError>;
}

/// Produces topic bridges and looks up service capabilities.
pub trait BridgeFactory: Send + Sync {
    /// Construct a directional topic bridge. `source` names the side
    /// the data comes from; both sides get their own queue depth.
    #[allow(clippy::too_many_arguments)]
    fn create_topic_bridge(
        &self,
        direction: Direction,
        source_type: &str,
        source_topic: &str,
        source_queue: usize,
        target_type: &str,
        target_topic: &str,
        target_queue: usize,
    ) -> Result<Box<dyn BridgeHandle>, FactoryError>;

    /// Look up a capability for bridging the service type hosted on
    /// `domain`. `None` means the triple is not bridgeable at all
    /// (cheap lookup, safe to retry every cycle).
    fn service_factory(
        &self,
        domain: Domain,
        package: &str,
        name: &str,
    ) -> Option<Arc<dyn ServiceCapability>>;

    /// Supported service conversion pairs, for `--print-pairs`.
    fn supported_service_pairs(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

/// Anticipated type mapping used by bridge-all mode: given a source
/// type on one domain, what type would the bridged counterpart have?
pub trait TypeMap: Send + Sync {
    fn map_a_to_b(&self, type_a: &str) -> Option<String>;

    fn map_b_to_a(&self, type_b: &str) -> Option<String>;

    /// Supported message conversion pairs, for `--print-pairs`.
    fn message_pairs(&self) -> Vec<(String, String)>;
}

/// One-to-one type mapping loaded from the config file.
#[derive(Debug, Default)]
pub struct StaticTypeMap {
    pairs: Vec<(String, String)>,
}

impl StaticTypeMap {
    pub fn new(pairs: Vec<(String, String)>) -> Self {
        Self { pairs }
    }
}

impl TypeMap for StaticTypeMap {
    fn map_a_to_b(&self, type_a: &str) -> Option<String> {
        self.pairs
            .iter()
            .find(|(a, _)| a == type_a)
            .map(|(_, b)| b.clone())
    }

    fn map_b_to_a(&self, type_b: &str) -> Option<String> {
        self.pairs
            .iter()
            .find(|(_, b)| b == type_b)
            .map(|(a, _)| a.clone())
    }

    fn message_pairs(&self) -> Vec<(String, String)> {
        self.pairs.clone()
    }
}

/// Table-driven factory for development and dry runs.
///
/// It accepts exactly the topic type pairs and service triples declared
/// in the config file and produces inert handles, standing in for a
/// real conversion backend. Anything not declared fails with
/// [`FactoryError::UnsupportedPair`] or an absent capability, which is
/// also what a generated backend reports for unknown types.
#[derive(Debug, Default)]
pub struct StaticFactory {
    topic_pairs: Vec<(String, String)>,
    service_triples: Vec<(Domain, String, String)>,
}

impl StaticFactory {
    pub fn new(
        topic_pairs: Vec<(String, String)>,
        service_triples: Vec<(Domain, String, String)>,
    ) -> Self {
        Self {
            topic_pairs,
            service_triples,
        }
    }
}

struct InertHandle;

impl BridgeHandle for InertHandle {}

struct InertServiceCapability;

impl ServiceCapability for InertServiceCapability {
    fn build_service_bridge(
        &self,
        _direction: Direction,
        _name: &str,
    ) -> Result<Box<dyn BridgeHandle>, FactoryError> {
        Ok(Box::new(InertHandle))
    }
}

impl BridgeFactory for StaticFactory {
    fn create_topic_bridge(
        &self,
        direction: Direction,
        source_type: &str,
        _source_topic: &str,
        _source_queue: usize,
        target_type: &str,
        _target_topic: &str,
        _target_queue: usize,
    ) -> Result<Box<dyn BridgeHandle>, FactoryError> {
        let supported = self.topic_pairs.iter().any(|(a, b)| match direction {
            Direction::AToB => a == source_type && b == target_type,
            Direction::BToA => b == source_type && a == target_type,
        });
        if supported {
            Ok(Box::new(InertHandle))
        } else {
            Err(FactoryError::UnsupportedPair {
                source_type: source_type.to_string(),
                target: target_type.to_string(),
            })
        }
    }

    fn service_factory(
        &self,
        domain: Domain,
        package: &str,
        name: &str,
    ) -> Option<Arc<dyn ServiceCapability>> {
        let known = self
            .service_triples
            .iter()
            .any(|(d, p, n)| *d == domain && p == package && n == name);
        known.then(|| Arc::new(InertServiceCapability) as Arc<dyn ServiceCapability>)
    }

    fn supported_service_pairs(&self) -> Vec<(String, String)> {
        self.service_triples
            .iter()
            .map(|(_, package, name)| (format!("{package}/{name}"), format!("{package}/{name}")))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_type_map_lookups() {
        let map = StaticTypeMap::new(vec![
            ("LaserScan".to_string(), "sensors/LaserScan".to_string()),
            ("Twist".to_string(), "geometry/Twist".to_string()),
        ]);

        assert_eq!(
            map.map_a_to_b("LaserScan").as_deref(),
            Some("sensors/LaserScan")
        );
        assert_eq!(map.map_b_to_a("geometry/Twist").as_deref(), Some("Twist"));
        assert!(map.map_a_to_b("Unknown").is_none());
        assert_eq!(map.message_pairs().len(), 2);
    }

    #[test]
    fn test_static_factory_accepts_declared_pair() {
        let factory = StaticFactory::new(
            vec![("LaserScan".to_string(), "sensors/LaserScan".to_string())],
            Vec::new(),
        );

        let result = factory.create_topic_bridge(
            Direction::AToB,
            "LaserScan",
            "/scan",
            10,
            "sensors/LaserScan",
            "/scan",
            10,
        );
        assert!(result.is_ok());

        // The same pair works in the other direction, swapped.
        let result = factory.create_topic_bridge(
            Direction::BToA,
            "sensors/LaserScan",
            "/scan",
            10,
            "LaserScan",
            "/scan",
            10,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_static_factory_rejects_unknown_pair() {
        let factory = StaticFactory::default();
        let err = factory
            .create_topic_bridge(Direction::AToB, "X", "/t", 10, "Y", "/t", 10)
            .unwrap_err();
        assert!(matches!(err, FactoryError::UnsupportedPair { .. }));
    }

    #[test]
    fn test_static_factory_service_lookup_is_domain_scoped() {
        let factory = StaticFactory::new(
            Vec::new(),
            vec![(Domain::A, "std_srvs".to_string(), "Trigger".to_string())],
        );

        assert!(factory.service_factory(Domain::A, "std_srvs", "Trigger").is_some());
        assert!(factory.service_factory(Domain::B, "std_srvs", "Trigger").is_none());
        assert!(factory.service_factory(Domain::A, "std_srvs", "Reset").is_none());
    }
}
