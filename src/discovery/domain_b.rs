//! Domain B inventory builder.
//!
//! Domain B's graph reports topic and service names together with their
//! advertised type lists and endpoint counts, so no probing is needed.
//! The snapshot keeps the raw counts; the engine subtracts the bridge's
//! own mirrored endpoints under its lock, where the registry is
//! consistent.

use std::sync::Arc;

use crate::discovery::{DiscoveryError, DomainBIntrospect, ServiceInventory, ServiceType};
use crate::whitelist::{MatchCache, WarnOnce, Whitelist};

/// Housekeeping topics Domain B creates for every participant; bridging
/// them would mirror infrastructure chatter, never application data.
const HOUSEKEEPING_TOPICS: &[&str] = &["/parameter_events"];

/// A whitelisted Domain B topic with raw endpoint counts, before the
/// bridge's own endpoints are subtracted.
#[derive(Debug, Clone)]
pub struct TopicCounts {
    pub name: String,
    pub ty: String,
    pub publisher_count: usize,
    pub subscriber_count: usize,
}

/// One cycle's view of Domain B.
#[derive(Debug, Default)]
pub struct DomainBSnapshot {
    pub topics: Vec<TopicCounts>,
    pub services: ServiceInventory,
}

pub struct DomainBPoller {
    introspect: Arc<dyn DomainBIntrospect>,
    topic_whitelist: Arc<Whitelist>,
    service_whitelist: Arc<Whitelist>,
    topic_cache: MatchCache,
    service_cache: MatchCache,
    ignored_topics: WarnOnce,
    ignored_services: WarnOnce,
    /// Names already warned about for an unusable advertised type list
    /// (multiple types, or a type without a package separator). Topics
    /// and services track separately; a name common to both still gets
    /// each warning once.
    topic_type_warned: WarnOnce,
    service_type_warned: WarnOnce,
}

impl DomainBPoller {
    pub fn new(
        introspect: Arc<dyn DomainBIntrospect>,
        topic_whitelist: Arc<Whitelist>,
        service_whitelist: Arc<Whitelist>,
    ) -> Self {
        Self {
            introspect,
            topic_whitelist,
            service_whitelist,
            topic_cache: MatchCache::new(),
            service_cache: MatchCache::new(),
            ignored_topics: WarnOnce::new(),
            ignored_services: WarnOnce::new(),
            topic_type_warned: WarnOnce::new(),
            service_type_warned: WarnOnce::new(),
        }
    }

    pub async fn poll(&mut self) -> Result<DomainBSnapshot, DiscoveryError> {
        let topics = self.introspect.topic_endpoints().await?;
        let services = self.introspect.service_endpoints().await?;

        let mut snapshot = DomainBSnapshot::default();

        for endpoint in topics {
            if HOUSEKEEPING_TOPICS.contains(&endpoint.name.as_str()) {
                continue;
            }
            if !self
                .topic_whitelist
                .matches(&endpoint.name, &mut self.topic_cache)
            {
                if self.ignored_topics.first(&endpoint.name) {
                    tracing::debug!(topic = endpoint.name.as_str(), "ignoring Domain B topic");
                }
                continue;
            }
            let ty = match Self::single_type(
                &mut self.topic_type_warned,
                &endpoint.name,
                &endpoint.types,
                "topic",
            ) {
                Some(ty) => ty,
                None => continue,
            };
            snapshot.topics.push(TopicCounts {
                name: endpoint.name,
                ty,
                publisher_count: endpoint.publisher_count,
                subscriber_count: endpoint.subscriber_count,
            });
        }

        for endpoint in services {
            if !self
                .service_whitelist
                .matches(&endpoint.name, &mut self.service_cache)
            {
                if self.ignored_services.first(&endpoint.name) {
                    tracing::debug!(
                        service = endpoint.name.as_str(),
                        "ignoring Domain B service"
                    );
                }
                continue;
            }
            let raw = match Self::single_type(
                &mut self.service_type_warned,
                &endpoint.name,
                &endpoint.types,
                "service",
            ) {
                Some(raw) => raw,
                None => continue,
            };
            match ServiceType::parse(&raw) {
                Some(ty) => {
                    snapshot.services.insert(endpoint.name, ty);
                }
                None => {
                    if self.service_type_warned.first(&endpoint.name) {
                        tracing::warn!(
                            service = endpoint.name.as_str(),
                            service_type = raw.as_str(),
                            "Domain B service type has no package separator, skipping"
                        );
                    }
                }
            }
        }

        Ok(snapshot)
    }

    /// A name advertising anything other than exactly one type is
    /// unsupported and skipped, with a one-time warning per name.
    fn single_type(
        warned: &mut WarnOnce,
        name: &str,
        types: &[String],
        kind: &str,
    ) -> Option<String> {
        match types {
            [ty] => Some(ty.clone()),
            _ => {
                if warned.first(name) {
                    tracing::warn!(
                        name = name,
                        kind = kind,
                        types = types.join(", "),
                        "Domain B name advertises {} types, skipping",
                        types.len()
                    );
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::discovery::{ServiceEndpoint, TopicEndpoint};

    struct FakeIntrospect {
        topics: Vec<TopicEndpoint>,
        services: Vec<ServiceEndpoint>,
    }

    #[async_trait]
    impl DomainBIntrospect for FakeIntrospect {
        async fn topic_endpoints(&self) -> Result<Vec<TopicEndpoint>, DiscoveryError> {
            Ok(self.topics.clone())
        }

        async fn service_endpoints(&self) -> Result<Vec<ServiceEndpoint>, DiscoveryError> {
            Ok(self.services.clone())
        }
    }

    fn topic(name: &str, types: &[&str], pubs: usize, subs: usize) -> TopicEndpoint {
        TopicEndpoint {
            name: name.to_string(),
            types: types.iter().map(|t| t.to_string()).collect(),
            publisher_count: pubs,
            subscriber_count: subs,
        }
    }

    fn poller(introspect: FakeIntrospect) -> DomainBPoller {
        DomainBPoller::new(
            Arc::new(introspect),
            Arc::new(Whitelist::compile(&["/scan.*".to_string(), "/cmd.*".to_string()])),
            Arc::new(Whitelist::compile(&["/reset".to_string()])),
        )
    }

    #[tokio::test]
    async fn test_single_type_topics_kept_with_counts() {
        let mut poller = poller(FakeIntrospect {
            topics: vec![topic("/scan", &["sensors/LaserScan"], 2, 1)],
            services: Vec::new(),
        });

        let snapshot = poller.poll().await.unwrap();
        assert_eq!(snapshot.topics.len(), 1);
        let counts = &snapshot.topics[0];
        assert_eq!(counts.name, "/scan");
        assert_eq!(counts.ty, "sensors/LaserScan");
        assert_eq!(counts.publisher_count, 2);
        assert_eq!(counts.subscriber_count, 1);
    }

    #[tokio::test]
    async fn test_multi_type_topic_skipped() {
        let mut poller = poller(FakeIntrospect {
            topics: vec![topic("/scan", &["sensors/LaserScan", "legacy/LaserScan"], 1, 0)],
            services: Vec::new(),
        });

        let snapshot = poller.poll().await.unwrap();
        assert!(snapshot.topics.is_empty());
    }

    #[tokio::test]
    async fn test_housekeeping_and_non_matching_topics_skipped() {
        let mut poller = poller(FakeIntrospect {
            topics: vec![
                topic("/parameter_events", &["infra/ParameterEvent"], 3, 3),
                topic("/internal/heartbeat", &["infra/Heartbeat"], 1, 1),
                topic("/cmd_vel", &["geometry/Twist"], 0, 1),
            ],
            services: Vec::new(),
        });

        let snapshot = poller.poll().await.unwrap();
        let names: Vec<&str> = snapshot.topics.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["/cmd_vel"]);
    }

    #[tokio::test]
    async fn test_service_type_parsed_or_skipped() {
        let mut poller = poller(FakeIntrospect {
            topics: Vec::new(),
            services: vec![
                ServiceEndpoint {
                    name: "/reset".to_string(),
                    types: vec!["std_srvs/Trigger".to_string()],
                },
                ServiceEndpoint {
                    name: "/reset".to_string(),
                    types: vec!["NoSeparator".to_string()],
                },
            ],
        });

        let snapshot = poller.poll().await.unwrap();
        // The valid entry wins; the separator-less one is skipped.
        assert_eq!(snapshot.services.len(), 1);
        assert_eq!(
            snapshot.services.get("/reset").unwrap().to_string(),
            "std_srvs/Trigger"
        );
    }

    #[tokio::test]
    async fn test_topic_and_service_type_warnings_tracked_separately() {
        // Same name on both sides, both with unusable type lists: each
        // side records its own first warning.
        let mut poller = DomainBPoller::new(
            Arc::new(FakeIntrospect {
                topics: vec![topic("/shared", &["pkg/A", "pkg/B"], 1, 0)],
                services: vec![ServiceEndpoint {
                    name: "/shared".to_string(),
                    types: vec!["pkg/X".to_string(), "pkg/Y".to_string()],
                }],
            }),
            Arc::new(Whitelist::compile(&[".*".to_string()])),
            Arc::new(Whitelist::compile(&[".*".to_string()])),
        );

        let snapshot = poller.poll().await.unwrap();
        assert!(snapshot.topics.is_empty());
        assert!(snapshot.services.is_empty());
        assert!(poller.topic_type_warned.seen("/shared"));
        assert!(poller.service_type_warned.seen("/shared"));
    }

    #[tokio::test]
    async fn test_ignored_name_noted_once_across_polls() {
        let mut poller = poller(FakeIntrospect {
            topics: vec![topic("/internal/heartbeat", &["infra/Heartbeat"], 1, 1)],
            services: Vec::new(),
        });

        poller.poll().await.unwrap();
        assert!(poller.ignored_topics.seen("/internal/heartbeat"));

        poller.poll().await.unwrap();
        // Still excluded, and the notification was already recorded on
        // the first poll, so it does not fire again.
        assert!(!poller.ignored_topics.first("/internal/heartbeat"));
    }
}
