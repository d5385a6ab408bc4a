use std::fmt;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;

use crate::rpc::NodeConnection;

/// The payout collaborator. One call moves the treasury's balances out.
#[async_trait]
pub trait TaskManager: Send + Sync {
    async fn transfer_balances(&self) -> Result<()>;
}

/// What a task manager is bound to when it is built.
#[derive(Clone)]
pub struct TaskContext {
    pub network_id: String,
    pub treasury_key: String,
    pub database_url: String,
    /// The verified startup connection. Only its `url()` is handed on; the
    /// payout executable opens its own node session. Nothing reads this
    /// socket between runs, so node pings go unanswered and a dropped link
    /// is not detected here.
    pub connection: Arc<dyn NodeConnection>,
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("network_id", &self.network_id)
            .field("node_url", &self.connection.url())
            .finish_non_exhaustive()
    }
}

/// Runs an external executable to perform the transfer.
///
/// The executable receives the network, credential, database and node url
/// through `PAYOUT_*` environment variables; exit status 0 means success.
#[derive(Debug)]
pub struct CommandTaskManager {
    program: String,
    args: Vec<String>,
    context: TaskContext,
}

impl CommandTaskManager {
    pub fn new(program: String, args: Vec<String>, context: TaskContext) -> Result<Self> {
        if program.trim().is_empty() {
            bail!("payout_command is empty");
        }
        Ok(Self {
            program,
            args,
            context,
        })
    }
}

#[async_trait]
impl TaskManager for CommandTaskManager {
    async fn transfer_balances(&self) -> Result<()> {
        let node_url = self.context.connection.url().unwrap_or_default();

        let status = Command::new(&self.program)
            .args(&self.args)
            .env("PAYOUT_NETWORK_ID", &self.context.network_id)
            .env("PAYOUT_TREASURY_KEY", &self.context.treasury_key)
            .env("PAYOUT_DATABASE_URL", &self.context.database_url)
            .env("PAYOUT_NODE_URL", node_url)
            .status()
            .await
            .with_context(|| format!("failed to start `{}`", self.program))?;

        if !status.success() {
            bail!("`{}` exited with {}", self.program, status);
        }
        Ok(())
    }
}
