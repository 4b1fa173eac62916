use ringmesh::cluster::{Cluster, ClusterOptions};
use ringmesh::membership::types::{ClusterEvent, Endpoint};
use std::collections::HashMap;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 3 {
        eprintln!("Usage: {} --bind <addr:port> [--seed <addr:port>] [--meta key=value]", args[0]);
        eprintln!("Example: {} --bind 127.0.0.1:5000", args[0]);
        eprintln!(
            "Example: {} --bind 127.0.0.1:5001 --seed 127.0.0.1:5000 --meta role=frontend",
            args[0]
        );

        std::process::exit(1);
    }

    let mut bind_addr: Option<Endpoint> = None;
    let mut seed_addr: Option<Endpoint> = None;
    let mut metadata: HashMap<String, String> = HashMap::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" => {
                bind_addr = Some(args[i + 1].parse().map_err(|e| anyhow::anyhow!("{e}"))?);
                i += 2;
            }
            "--seed" => {
                seed_addr = Some(args[i + 1].parse().map_err(|e| anyhow::anyhow!("{e}"))?);
                i += 2;
            }
            "--meta" => {
                if let Some((key, value)) = args[i + 1].split_once('=') {
                    metadata.insert(key.to_string(), value.to_string());
                }
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }

    let bind_addr = bind_addr.expect("--bind is required");

    let mut settings = ringmesh::Settings::default();
    if let Some(ms) = std::env::var("PROBE_INTERVAL_MS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
    {
        settings.probe_interval = std::time::Duration::from_millis(ms);
    }
    if let Some(ms) = std::env::var("FAST_ROUND_TIMEOUT_MS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
    {
        settings.fast_round_timeout = std::time::Duration::from_millis(ms);
    }

    let options = ClusterOptions {
        metadata,
        settings,
        ..ClusterOptions::default()
    };

    let cluster = match &seed_addr {
        Some(seed) => {
            tracing::info!("Joining cluster via seed {}", seed);
            Cluster::join(bind_addr.clone(), seed.clone(), options).await?
        }
        None => {
            tracing::info!("Starting as seed node (founder)");
            Cluster::start(bind_addr.clone(), options).await?
        }
    };
    let cluster = Arc::new(cluster);

    // Log every cluster event an operator would care about.
    cluster
        .subscribe(
            ClusterEvent::ViewChangeProposal,
            Box::new(|changes| {
                tracing::info!("View-change proposal: {:?}", changes);
            }),
        )
        .await?;
    cluster
        .subscribe(
            ClusterEvent::ViewChange,
            Box::new(|changes| {
                tracing::info!("View change: {:?}", changes);
            }),
        )
        .await?;
    cluster
        .subscribe(
            ClusterEvent::ViewChangeOneStepFailed,
            Box::new(|changes| {
                tracing::warn!("One-step consensus failed, falling back: {:?}", changes);
            }),
        )
        .await?;
    cluster
        .subscribe(
            ClusterEvent::Kicked,
            Box::new(|_| {
                tracing::warn!("This node was removed from the cluster view");
            }),
        )
        .await?;

    // Periodic cluster stats.
    let stats_cluster = cluster.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(5));

        loop {
            interval.tick().await;
            let members = stats_cluster.member_list();
            tracing::info!(
                "Cluster stats: {} members in configuration {}",
                members.len(),
                stats_cluster.configuration_id()
            );
            for member in members {
                tracing::info!("  - {}", member);
            }
        }
    });

    tracing::info!("Node {} running; press Ctrl+C to shut down", bind_addr);
    tokio::signal::ctrl_c().await?;

    cluster.shutdown().await;
    Ok(())
}
