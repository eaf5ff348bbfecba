//! Trestle — dynamic whitelist bridge
//!
//! A discovery-and-reconciliation engine between two pub/sub
//! middleware domains:
//!
//! 1. **Discovery**: poll each domain's introspection service about
//!    once a second for the topics and services currently active.
//!
//! 2. **Whitelisting**: admit only names matching the operator's regex
//!    pattern lists, with a positive-only match cache so the stable
//!    majority of names never hits the regex engine twice.
//!
//! 3. **Reconciliation**: diff the whitelisted inventories against the
//!    live bridge registry and create, replace, or tear down bridges so
//!    every topic with a publisher on one side and a subscriber on the
//!    other gets exactly one conversion path.
//!
//! Bridge construction itself is delegated to a factory; this binary
//! ships a table-driven one fed from the configuration file.

mod bridge;
mod config;
mod discovery;
mod probe;
mod state;
mod whitelist;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use bridge::factory::{BridgeFactory, StaticFactory, StaticTypeMap, TypeMap};
use bridge::reconciler::{Reconciler, ReconcilerOptions};
use config::FileConfig;
use discovery::client::{HttpDomainA, HttpDomainB};
use discovery::domain_a::DomainAPoller;
use discovery::domain_b::DomainBPoller;
use probe::TypeProbe;
use state::Engine;
use whitelist::Whitelist;

/// Interval between status log lines.
const STATUS_INTERVAL: Duration = Duration::from_secs(30);

/// Offset between the two poll timers, so the snapshots interleave
/// instead of racing for the engine lock at the same instant.
const DOMAIN_B_STAGGER: Duration = Duration::from_millis(500);

// ── CLI Arguments ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "trestle", version, about = "Dynamic whitelist bridge between two pub/sub domains")]
struct Args {
    /// Configuration file holding the whitelist pattern lists and
    /// conversion tables
    #[arg(short, long, env = "TRESTLE_CONFIG")]
    config: PathBuf,

    /// Base URL of the Domain A discovery gateway
    #[arg(long, default_value = "http://127.0.0.1:7411", env = "TRESTLE_DOMAIN_A_URL")]
    domain_a_url: String,

    /// Base URL of the Domain B discovery gateway
    #[arg(long, default_value = "http://127.0.0.1:7412", env = "TRESTLE_DOMAIN_B_URL")]
    domain_b_url: String,

    /// Configuration key holding the topic pattern list
    #[arg(long, default_value = "topics_re")]
    topic_regex_list: String,

    /// Configuration key holding the service pattern list
    #[arg(long, default_value = "services_re")]
    service_regex_list: String,

    /// Node identity suffix; the bridge registers as "bridge_<suffix>"
    #[arg(long, default_value = "default", env = "TRESTLE_NODE_SUFFIX")]
    node_suffix: String,

    /// Poll interval per domain, in milliseconds
    #[arg(long, default_value_t = 1000)]
    poll_interval_ms: u64,

    /// Per-service type probe timeout, in milliseconds
    #[arg(long, default_value_t = 2000)]
    probe_timeout_ms: u64,

    /// Bridge every whitelisted topic in both directions, even without
    /// an observed peer on the target domain
    #[arg(long)]
    bridge_all_topics: bool,

    /// Bridge every whitelisted Domain A publisher to Domain B
    #[arg(long)]
    bridge_all_a2b: bool,

    /// Bridge every whitelisted Domain B publisher to Domain A
    #[arg(long)]
    bridge_all_b2a: bool,

    /// Tear down topic bridges whose demand disappeared
    #[arg(long)]
    remove_stale_topic_bridges: bool,

    /// Log the full inventory snapshots every cycle
    #[arg(long)]
    show_introspection: bool,

    /// Print the supported conversion pairs and exit without bridging
    #[arg(long)]
    print_pairs: bool,
}

// ── Entry Point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trestle=info".into()),
        )
        .init();

    let args = Args::parse();

    let file_config = match FileConfig::load(
        &args.config,
        &args.topic_regex_list,
        &args.service_regex_list,
    ) {
        Ok(config) => config,
        Err(error) => {
            tracing::error!(path = %args.config.display(), error = %error, "cannot load configuration");
            std::process::exit(1);
        }
    };

    let type_map: Arc<dyn TypeMap> = Arc::new(StaticTypeMap::new(file_config.type_pairs.clone()));
    let factory: Arc<dyn BridgeFactory> = Arc::new(StaticFactory::new(
        file_config.type_pairs.clone(),
        file_config.service_triples(),
    ));

    if args.print_pairs {
        print_pairs(type_map.as_ref(), factory.as_ref());
        return;
    }

    let topic_whitelist = Arc::new(Whitelist::compile(&file_config.topic_patterns));
    let service_whitelist = Arc::new(Whitelist::compile(&file_config.service_patterns));
    tracing::info!(
        topic_patterns = topic_whitelist.len(),
        service_patterns = service_whitelist.len(),
        "whitelists loaded"
    );

    let node_name = format!("bridge_{}", args.node_suffix);
    let poll_interval = Duration::from_millis(args.poll_interval_ms);

    let options = ReconcilerOptions {
        bridge_all_a_to_b: args.bridge_all_topics || args.bridge_all_a2b,
        bridge_all_b_to_a: args.bridge_all_topics || args.bridge_all_b2a,
        remove_stale_topic_bridges: args.remove_stale_topic_bridges,
    };
    let engine = Arc::new(Engine::new(
        Reconciler::new(factory, type_map, options),
        args.show_introspection,
    ));

    let http = reqwest::Client::new();
    let domain_a = Arc::new(HttpDomainA::new(http.clone(), args.domain_a_url.clone()));
    let domain_b = Arc::new(HttpDomainB::new(http, args.domain_b_url.clone()));

    tracing::info!(
        node = node_name.as_str(),
        domain_a = args.domain_a_url.as_str(),
        domain_b = args.domain_b_url.as_str(),
        "starting bridge"
    );

    // ── Poll Tasks ────────────────────────────────────────────────────────

    let mut poller_a = DomainAPoller::new(
        domain_a,
        TypeProbe::new(
            node_name.clone(),
            Duration::from_millis(args.probe_timeout_ms),
        ),
        node_name,
        Arc::clone(&topic_whitelist),
        Arc::clone(&service_whitelist),
    );
    let engine_a = Arc::clone(&engine);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(poll_interval);
        loop {
            interval.tick().await;
            match poller_a.poll().await {
                Ok(snapshot) => engine_a.publish_domain_a(snapshot),
                Err(error) => tracing::error!(error = %error, "Domain A poll failed"),
            }
        }
    });

    let mut poller_b = DomainBPoller::new(domain_b, topic_whitelist, service_whitelist);
    let engine_b = Arc::clone(&engine);
    tokio::spawn(async move {
        tokio::time::sleep(DOMAIN_B_STAGGER).await;
        let mut interval = tokio::time::interval(poll_interval);
        loop {
            interval.tick().await;
            match poller_b.poll().await {
                Ok(snapshot) => engine_b.publish_domain_b(snapshot),
                Err(error) => tracing::error!(error = %error, "Domain B poll failed"),
            }
        }
    });

    // Periodic status log
    let engine_stats = Arc::clone(&engine);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(STATUS_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            let stats = engine_stats.stats();
            tracing::info!(
                topics_a_to_b = stats.topics_a_to_b,
                topics_b_to_a = stats.topics_b_to_a,
                services_a_to_b = stats.services_a_to_b,
                services_b_to_a = stats.services_b_to_a,
                "bridge status"
            );
        }
    });

    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %error, "failed to listen for shutdown signal");
    }
    tracing::info!("shutting down");
}

fn print_pairs(type_map: &dyn TypeMap, factory: &dyn BridgeFactory) {
    let message_pairs = type_map.message_pairs();
    if message_pairs.is_empty() {
        println!("No message conversion pairs supported.");
    } else {
        println!("Supported message conversion pairs:");
        for (type_a, type_b) in message_pairs {
            println!("  '{type_a}' <=> '{type_b}'");
        }
    }

    let service_pairs = factory.supported_service_pairs();
    if service_pairs.is_empty() {
        println!("No service conversion pairs supported.");
    } else {
        println!("Supported service conversion pairs:");
        for (type_a, type_b) in service_pairs {
            println!("  '{type_a}' <=> '{type_b}'");
        }
    }
}
