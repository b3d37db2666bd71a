use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::OwoColorize;
use tokio_util::sync::CancellationToken;

mod agent;
mod config;
mod control_loop;
mod labeler;
mod leader;
mod node;
mod util;

use config::Cli;
use node::events::{EventPublisher, RECONCILER_SOURCE};
use node::reconcile::{Reconciler, ReconcilerConfig};
use node::store::{KubeNodeStore, NodeStore};

#[tokio::main]
async fn main() -> Result<()> {
    owo_colors::set_override(
        !["1", "true"].contains(
            &std::env::var("DISABLE_COLORS")
                .unwrap_or_default()
                .to_lowercase()
                .as_str(),
        ),
    );

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("{}", format!("🛑 {e:?}").red());
        std::process::exit(1);
    }
    Ok(())
}

/// Validated, ready-to-use configuration. Building this is where every
/// configuration error surfaces and is fatal before leader election
/// even starts.
struct Startup {
    reconcile_interval: std::time::Duration,
    reconciler_config: ReconcilerConfig,
    auto_label_container_linux: bool,
    agent: Option<agent::AgentEnsurerConfig>,
    #[cfg(feature = "metrics")]
    metrics_port: Option<u16>,
}

fn validate(cli: &Cli) -> Result<Startup, util::Error> {
    let reconcile_interval = cli.reconcile_interval()?;
    let window = cli.reboot_window()?;
    let agent = match cli.agent_image_repo()? {
        None => None,
        Some(repo) => Some(agent::AgentEnsurerConfig {
            namespace: cli.pod_namespace.clone(),
            image_repo: repo.to_string(),
            version: env!("CARGO_PKG_VERSION")
                .parse()
                .map_err(|e: semver::Error| util::Error::Config(format!("invalid crate version: {e}")))?,
        }),
    };

    Ok(Startup {
        reconcile_interval,
        reconciler_config: ReconcilerConfig {
            before_reboot_annotations: cli.before_reboot_annotations.clone(),
            after_reboot_annotations: cli.after_reboot_annotations.clone(),
            window,
            max_concurrent_reboots: node::admission::MAX_CONCURRENT_REBOOTS,
        },
        auto_label_container_linux: cli.auto_label_container_linux,
        agent,
        #[cfg(feature = "metrics")]
        metrics_port: cli.metrics_port,
    })
}

async fn run(cli: Cli) -> Result<()> {
    let startup = validate(&cli).context("invalid configuration")?;

    println!("{}", "⚙️ starting node-reboot-operator...".green());

    let client = kube::Client::try_default()
        .await
        .context("failed to build Kubernetes client")?;

    #[cfg(feature = "metrics")]
    let metrics = startup.metrics_port.map(|port| {
        let metrics = Arc::new(util::metrics::ControllerMetrics::new());
        util::metrics::spawn(port, metrics.clone());
        metrics
    });

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal_wait().await;
        shutdown_signal.cancel();
    });

    let store: Arc<dyn NodeStore> = Arc::new(KubeNodeStore::new(client.clone()));
    let events = Arc::new(EventPublisher::new(client.clone(), RECONCILER_SOURCE));

    if let Some(agent_config) = &startup.agent {
        if let Err(e) = agent::ensure(client.clone(), agent_config).await {
            // Invariant violations here abort only the agent-ensurer
            // startup task; they never block leader election or the
            // reconcile loop.
            eprintln!(
                "{}",
                format!("⚠️ agent-workload ensurer failed, continuing without it: {e}").yellow()
            );
        }
    }

    if startup.auto_label_container_linux {
        let labeler_store = store.clone();
        let labeler_shutdown = shutdown.clone();
        tokio::spawn(async move { labeler::run(labeler_store, labeler_shutdown).await });
    }

    let holder_id = leader::holder_identity();
    let lease_namespace = cli.pod_namespace.clone();
    let control_shutdown = shutdown.clone();

    leader::run(
        client,
        lease_namespace,
        "node-reboot-operator-lock".to_string(),
        holder_id,
        shutdown.clone(),
        move || {
            let reconciler = Reconciler::new(
                store.clone(),
                startup.reconciler_config.clone(),
                Some(events.clone()),
                #[cfg(feature = "metrics")]
                metrics.clone(),
            );
            let interval = startup.reconcile_interval;
            let control_shutdown = control_shutdown.clone();
            tokio::spawn(async move { control_loop::run(reconciler, interval, control_shutdown).await })
        },
    )
    .await?;

    println!("{}", "🛑 node-reboot-operator shut down gracefully".red());
    Ok(())
}

/// Listens for SIGINT/SIGTERM so the process can shut down cleanly
/// instead of being killed mid-reconcile.
async fn shutdown_signal_wait() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt()).expect("install SIGINT handler");
        let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");

        tokio::select! {
            _ = sigint.recv() => eprintln!("{}", "🛑 received SIGINT".red()),
            _ = sigterm.recv() => eprintln!("{}", "🛑 received SIGTERM".red()),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.expect("install Ctrl+C handler");
    }
}
