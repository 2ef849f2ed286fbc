//! `testbedd`: experiment controller daemon.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use cluster_testbed::broadcast::StatusBroadcaster;
use cluster_testbed::config::Config;
use cluster_testbed::console::TelnetConsole;
use cluster_testbed::control_plane::{ControlPlane, HttpControlPlane};
use cluster_testbed::distribute::Distributor;
use cluster_testbed::experiment::MemoryExperimentStore;
use cluster_testbed::metrics::{HttpMetrics, LocalMetrics, Metrics};
use cluster_testbed::pipeline::{Coordinator, Services};
use cluster_testbed::placement::{HttpPlacement, LocalPlacement, Placement};
use cluster_testbed::provision::Provisioner;
use cluster_testbed::remote::SshRemote;
use cluster_testbed::server;
use cluster_testbed::topology::FileTopologySource;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load().context("loading configuration")?;
    let control_plane = connect_control_plane(&config).await?;

    let provisioner = Provisioner::new(
        control_plane,
        Arc::new(TelnetConsole::new(config.provision.console_settings())),
        config.provision.provision_settings(),
    );
    let distributor = Distributor::new(
        Arc::new(SshRemote::new(config.remote.remote_settings())),
        config.remote.distribution_settings(),
    );

    let placement: Arc<dyn Placement> = match &config.placement.url {
        Some(url) => {
            tracing::info!(url = %url, "using placement service");
            Arc::new(HttpPlacement::new(url.clone()))
        }
        None => Arc::new(LocalPlacement::new()),
    };
    let metrics: Arc<dyn Metrics> = match &config.metrics.url {
        Some(url) => {
            tracing::info!(url = %url, "using metrics service");
            Arc::new(HttpMetrics::new(url.clone()))
        }
        None => Arc::new(LocalMetrics::new()),
    };

    let services = Services {
        topologies: Arc::new(FileTopologySource::new(config.topologies.dir.clone())),
        provisioner: Arc::new(provisioner),
        placement,
        distributor: Arc::new(distributor),
        metrics,
    };
    let coordinator = Arc::new(Coordinator::new(
        services,
        Arc::new(MemoryExperimentStore::new()),
        Arc::new(StatusBroadcaster::new()),
    ));

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("binding {}", config.server.bind))?;
    server::serve(listener, coordinator).await?;
    Ok(())
}

async fn connect_control_plane(config: &Config) -> anyhow::Result<Arc<dyn ControlPlane>> {
    let cp = &config.control_plane;
    let client = if let Some(token) = &cp.token {
        HttpControlPlane::new(cp.url.clone(), Some(token.clone()))
    } else {
        HttpControlPlane::login(cp.url.clone(), &cp.username, &cp.password)
            .await
            .with_context(|| format!("logging in to control plane at {}", cp.url))?
    };
    tracing::info!(url = %cp.url, "control plane ready");
    Ok(Arc::new(client))
}
