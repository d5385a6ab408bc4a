//! Startup sequencing and task lifecycle.
//!
//! `bootstrap` validates, connects, verifies the node and only then builds
//! the task manager. The scheduler and heartbeat can only be spawned from
//! the resulting [`Bootstrapped`], so nothing is ever scheduled against an
//! unready node.

use std::fmt;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{self, Secrets, Settings, ValidatedConfig};
use crate::error::StartupError;
use crate::gate::ReadinessGate;
use crate::heartbeat;
use crate::metrics::MetricsPusher;
use crate::rpc::{NodeConnection, ServerInfo};
use crate::scheduler::{PayoutJob, Scheduler};
use crate::task::{TaskContext, TaskManager};

/// Reject a node that cannot serve payouts.
pub fn verify_readiness(expected_network: &str, info: &ServerInfo) -> Result<(), StartupError> {
    if !info.is_synced {
        return Err(StartupError::NodeNotSynced);
    }
    if !info.has_utxo_index {
        return Err(StartupError::MissingUtxoIndex);
    }
    if let Some(actual) = &info.network_id {
        if actual != expected_network {
            return Err(StartupError::NetworkMismatch {
                expected: expected_network.to_string(),
                actual: actual.clone(),
            });
        }
    }
    Ok(())
}

/// A verified connection with its task manager, ready to be scheduled.
pub struct Bootstrapped {
    config: ValidatedConfig,
    gate: ReadinessGate,
    connection: Arc<dyn NodeConnection>,
    task_manager: Arc<dyn TaskManager>,
}

impl fmt::Debug for Bootstrapped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bootstrapped")
            .field("config", &self.config)
            .field("gate", &self.gate)
            .field("node_url", &self.connection.url())
            .finish_non_exhaustive()
    }
}

pub async fn bootstrap<C, M>(
    settings: &Settings,
    secrets: &Secrets,
    make_connection: C,
    make_task_manager: M,
) -> Result<Bootstrapped, StartupError>
where
    C: FnOnce(&ValidatedConfig) -> Arc<dyn NodeConnection>,
    M: FnOnce(&ValidatedConfig, TaskContext) -> anyhow::Result<Arc<dyn TaskManager>>,
{
    let config = config::validate(settings, secrets)?;
    tracing::info!(
        network_id = %config.network_id,
        interval_hours = config.interval.hours(),
        "Configuration validated"
    );

    let gate = ReadinessGate::new();
    let connection = make_connection(&config);

    connection.connect().await?;

    let info = connection.get_server_info().await?;
    tracing::info!(
        is_synced = info.is_synced,
        has_utxo_index = info.has_utxo_index,
        server_version = info.server_version.as_deref().unwrap_or("unknown"),
        virtual_daa_score = info.virtual_daa_score,
        "Received node server info"
    );
    verify_readiness(&config.network_id, &info)?;

    gate.mark_connected();
    tracing::info!(url = connection.url().as_deref().unwrap_or(""), "Node is ready");

    let context = TaskContext {
        network_id: config.network_id.clone(),
        treasury_key: config.treasury_key.clone(),
        database_url: config.database_url.clone(),
        connection: connection.clone(),
    };
    let task_manager = make_task_manager(&config, context).map_err(StartupError::TaskManager)?;
    tracing::info!("Task manager initialised");

    Ok(Bootstrapped {
        config,
        gate,
        connection,
        task_manager,
    })
}

impl Bootstrapped {
    pub fn config(&self) -> &ValidatedConfig {
        &self.config
    }

    pub fn gate(&self) -> &ReadinessGate {
        &self.gate
    }

    pub fn connection(&self) -> &Arc<dyn NodeConnection> {
        &self.connection
    }

    /// Start the scheduler and heartbeat. With `run_now`, one extra run starts immediately.
    pub fn spawn(self, cancel: CancellationToken, run_now: bool) -> Running {
        let interval = self.config.interval;
        let metrics = MetricsPusher::new(&self.config.metrics_endpoint, &self.config.network_id);
        tracing::info!(metrics_url = metrics.url(), run_now, "Starting scheduler and heartbeat");
        let job = Arc::new(PayoutJob::new(self.gate, self.task_manager, Some(metrics)));

        let immediate = run_now.then(|| {
            let job = job.clone();
            tokio::spawn(async move {
                job.fire().await;
            })
        });

        let scheduler = tokio::spawn(Scheduler::new(job, interval).run(cancel.clone()));
        let heartbeat = tokio::spawn(heartbeat::run(interval, self.config.heartbeat, cancel));

        Running {
            scheduler,
            heartbeat,
            immediate,
        }
    }
}

/// Handles of the spawned periodic tasks.
pub struct Running {
    scheduler: JoinHandle<()>,
    heartbeat: JoinHandle<()>,
    immediate: Option<JoinHandle<()>>,
}

impl Running {
    /// Wait for every task to wind down after cancellation.
    pub async fn join(self) {
        if let Some(immediate) = self.immediate {
            if let Err(e) = immediate.await {
                tracing::error!(error = %e, "Immediate payout task panicked");
            }
        }
        if let Err(e) = self.scheduler.await {
            tracing::error!(error = %e, "Scheduler task panicked");
        }
        if let Err(e) = self.heartbeat.await {
            tracing::error!(error = %e, "Heartbeat task panicked");
        }
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("Shutdown signal received");
}
