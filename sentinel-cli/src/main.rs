//! Relay Sentinel CLI
//!
//! Relay network health, trust, and diversity intelligence.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{warn, Level};
use tracing_subscriber::FmtSubscriber;

use sentinel_analytics::{classify_probes, consensus_freshness};
use sentinel_core::{SourceId, SourcePayload};
use sentinel_runtime::{
    Coordinator, CoordinatorConfig, IntelligenceEngine, JsonPublisher, SnapshotPublisher,
};
use sentinel_sources::{
    claims_from_details, create_client, default_authorities, fetch_text, probe_all,
    AuthoritiesAdapter, ConsensusAdapter, DetailsAdapter, FetchConfig, ProofAdapter,
    SourceAdapter, UptimeAdapter,
};

mod config;

use config::Config;

const DEFAULT_DETAILS_ENDPOINT: &str = "https://onionoo.torproject.org/details?type=relay";
const DEFAULT_UPTIME_ENDPOINT: &str = "https://onionoo.torproject.org/uptime?type=relay";
const DEFAULT_CONSENSUS_ENDPOINT: &str =
    "https://collector.torproject.org/recent/relay-descriptors/consensuses/latest-consensus";

#[derive(Parser)]
#[command(name = "relay-sentinel")]
#[command(author, version, about = "Relay Sentinel: relay network intelligence", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (0-3)
    #[arg(short, long, default_value = "1")]
    verbose: u8,

    /// Optional TOML config file with endpoint/interval overrides
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full intelligence engine, publishing record sets
    Run {
        /// Output directory for published snapshots
        #[arg(short, long, default_value = "snapshots")]
        output: PathBuf,

        /// Seconds between analysis cycles
        #[arg(long, default_value = "300")]
        cycle_interval: u64,

        /// Seconds to wait for all sources before the first cycle
        #[arg(long, default_value = "120")]
        warmup: u64,

        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,

        /// SOCKS proxy for all fetches (e.g. socks5://127.0.0.1:9050)
        #[arg(long, env = "SENTINEL_PROXY")]
        proxy: Option<String>,

        /// Relay directory details endpoint
        #[arg(long, env = "SENTINEL_DETAILS_ENDPOINT")]
        details_endpoint: Option<String>,

        /// Historical uptime endpoint
        #[arg(long, env = "SENTINEL_UPTIME_ENDPOINT")]
        uptime_endpoint: Option<String>,

        /// Consensus document endpoint
        #[arg(long, env = "SENTINEL_CONSENSUS_ENDPOINT")]
        consensus_endpoint: Option<String>,
    },

    /// Probe all directory authorities once and print their status
    Status,

    /// Fetch the consensus once and print freshness and flag counts
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = match cli.verbose {
        0 => Level::ERROR,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Run {
            output,
            cycle_interval,
            warmup,
            once,
            proxy,
            details_endpoint,
            uptime_endpoint,
            consensus_endpoint,
        } => {
            let opts = RunOptions {
                output,
                cycle_interval,
                warmup,
                once,
                proxy,
                details_endpoint,
                uptime_endpoint,
                consensus_endpoint,
            };
            run_engine(config, opts).await?;
        }
        Commands::Status => {
            check_authorities(config).await?;
        }
        Commands::Check => {
            check_consensus(config).await?;
        }
    }

    Ok(())
}

/// Settings for the `run` subcommand. CLI flags win over the config file.
struct RunOptions {
    output: PathBuf,
    cycle_interval: u64,
    warmup: u64,
    once: bool,
    proxy: Option<String>,
    details_endpoint: Option<String>,
    uptime_endpoint: Option<String>,
    consensus_endpoint: Option<String>,
}

async fn run_engine(config: Config, opts: RunOptions) -> Result<()> {
    println!("🛰️  Relay Sentinel\n");

    let details_endpoint = opts
        .details_endpoint
        .as_deref()
        .or(config.details_endpoint.as_deref())
        .unwrap_or(DEFAULT_DETAILS_ENDPOINT);
    let uptime_endpoint = opts
        .uptime_endpoint
        .as_deref()
        .or(config.uptime_endpoint.as_deref())
        .unwrap_or(DEFAULT_UPTIME_ENDPOINT);
    let consensus_endpoint = opts
        .consensus_endpoint
        .as_deref()
        .or(config.consensus_endpoint.as_deref())
        .unwrap_or(DEFAULT_CONSENSUS_ENDPOINT);

    println!("📡 Directory: {}", details_endpoint);
    println!("📜 Consensus: {}", consensus_endpoint);
    println!("📂 Output: {}", opts.output.display());
    println!(
        "⏱️  Cycle every {}s (warmup {}s)\n",
        opts.cycle_interval, opts.warmup
    );

    let proof_adapter = Arc::new(ProofAdapter::new(Vec::new()));
    let authorities_adapter = AuthoritiesAdapter::new();
    let registry = authorities_adapter.authorities().to_vec();

    let mut adapters: Vec<Arc<dyn SourceAdapter>> = vec![
        Arc::new(config.apply_interval(
            SourceId::Details,
            DetailsAdapter::new(details_endpoint),
            DetailsAdapter::with_interval,
        )),
        Arc::new(config.apply_interval(
            SourceId::Uptime,
            UptimeAdapter::new(uptime_endpoint),
            UptimeAdapter::with_interval,
        )),
        Arc::new(config.apply_interval(
            SourceId::Consensus,
            ConsensusAdapter::new(consensus_endpoint),
            ConsensusAdapter::with_interval,
        )),
        Arc::new(authorities_adapter),
    ];
    adapters.push(proof_adapter.clone());

    let fetch = FetchConfig {
        proxy_addr: opts.proxy.clone().or(config.proxy.clone()),
        ..FetchConfig::default()
    };
    let coordinator = Coordinator::new(CoordinatorConfig { fetch, ..Default::default() }, adapters)?;
    let store = coordinator.store();
    coordinator.start();

    println!("🚀 Waiting for sources...");
    let reported = coordinator
        .await_quiescence(Duration::from_secs(opts.warmup))
        .await;
    println!(
        "✅ {} of {} sources reported\n",
        reported.len(),
        SourceId::ALL.len()
    );

    let mut engine = IntelligenceEngine::new(registry);
    let publisher = JsonPublisher::new(&opts.output);

    loop {
        // Domain claims come from the freshest directory snapshot; the
        // proof source picks them up on its next fetch.
        if let Some(record) = store.get(SourceId::Details) {
            if let Some(SourcePayload::Details { relays }) = &record.payload {
                proof_adapter.set_claims(claims_from_details(relays));
            }
        }

        match engine.run_cycle(&store) {
            Ok(records) => {
                publisher.publish(&records).await?;
                println!(
                    "📦 Generation {}: {} relays, {} operators, {} alerts",
                    records.generation,
                    records.relays.len(),
                    records.operators.len(),
                    records.alerts.len()
                );
                for alert in &records.alerts {
                    println!("  ⚠️  [{:?}] {}", alert.level, alert.message);
                }
            }
            Err(e) => {
                warn!("Cycle skipped: {}", e);
                println!("⏭️  Cycle skipped: {}", e);
            }
        }

        if opts.once {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(opts.cycle_interval)) => {}
            _ = tokio::signal::ctrl_c() => {
                println!("\n👋 Shutting down");
                break;
            }
        }
    }

    coordinator.shutdown();
    Ok(())
}

async fn check_authorities(config: Config) -> Result<()> {
    println!("🔌 Probing directory authorities...\n");

    let client = create_client(&FetchConfig {
        proxy_addr: config.proxy.clone(),
        ..FetchConfig::default()
    })?;
    let registry = default_authorities();
    let probes = probe_all(&client, &registry, registry.len()).await;
    let statuses = classify_probes(&probes, &registry);

    println!("{:<12} {:<10} {:>10}", "AUTHORITY", "STATUS", "LATENCY");
    for status in &statuses {
        let latency = status
            .latency_ms
            .map(|ms| format!("{ms} ms"))
            .unwrap_or_else(|| "-".to_string());
        println!("{:<12} {:<10} {:>10}", status.name, format!("{:?}", status.status), latency);
    }

    let reachable = statuses.iter().filter(|s| !s.status.is_unreachable()).count();
    println!("\n✅ {} of {} authorities reachable", reachable, statuses.len());
    Ok(())
}

async fn check_consensus(config: Config) -> Result<()> {
    let endpoint = config
        .consensus_endpoint
        .as_deref()
        .unwrap_or(DEFAULT_CONSENSUS_ENDPOINT);
    println!("📜 Fetching consensus from {}...\n", endpoint);

    let client = create_client(&FetchConfig {
        proxy_addr: config.proxy.clone(),
        ..FetchConfig::default()
    })?;
    let body = fetch_text(&client, endpoint).await?;
    let document = sentinel_sources::consensus::parse_consensus(&body)?;

    let now = chrono::Utc::now();
    let freshness = consensus_freshness(Some(&document), now);
    println!("Valid after:  {}", document.valid_after);
    println!("Fresh until:  {}", document.fresh_until);
    println!("Freshness:    {:?}", freshness);
    println!("Method:       {}", document.method);
    println!("Authorities:  {}", document.authorities.len());
    println!("Relays:       {}", document.relays.len());

    let mut counts: Vec<_> = document.flag_counts().into_iter().collect();
    counts.sort_by_key(|(flag, _)| flag.name());
    println!("\nFlag populations:");
    for (flag, count) in counts {
        println!("  {:<10} {}", flag.name(), count);
    }
    Ok(())
}
