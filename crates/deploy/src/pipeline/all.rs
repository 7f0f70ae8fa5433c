//! `deploy-all`: the mocks and vault drivers as sequential stages.
//!
//! Each stage runs as its own process so it gets a fresh chain connection and a clean
//! exit status. A non-zero status stops the sequence.

use std::{future::Future, path::PathBuf};

use anyhow::Context;

use crate::config::ResolvedConfig;

/// A stage of `deploy-all`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Stage {
    #[strum(serialize = "deploy-mocks")]
    Mocks,
    #[strum(serialize = "deploy-vault")]
    Vault,
}

impl Stage {
    /// CLI subcommand running the stage.
    pub fn subcommand(&self) -> &'static str {
        match self {
            Stage::Mocks => "deploy-mocks",
            Stage::Vault => "deploy-vault",
        }
    }
}

/// Stages to run for the active environment. Forks build on mainnet contracts, so no mocks.
pub fn stages(config: &ResolvedConfig) -> Vec<Stage> {
    if config.is_fork {
        vec![Stage::Vault]
    } else {
        vec![Stage::Mocks, Stage::Vault]
    }
}

/// Runs a stage to completion and reports its exit code.
pub trait StageRunner {
    fn run_stage(&self, stage: Stage) -> impl Future<Output = anyhow::Result<i32>> + Send;
}

/// Runs stages as child processes of the current executable.
#[derive(Debug, Clone)]
pub struct SubprocessRunner {
    program: PathBuf,
    /// Global arguments placed before the stage subcommand.
    forwarded_args: Vec<String>,
}

impl SubprocessRunner {
    pub fn new(program: impl Into<PathBuf>, forwarded_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            forwarded_args,
        }
    }

    /// Runner re-invoking the running binary.
    pub fn current_exe(forwarded_args: Vec<String>) -> anyhow::Result<Self> {
        let program = std::env::current_exe().context("Failed to locate the current executable")?;
        Ok(Self::new(program, forwarded_args))
    }

    /// Full argument list for `stage`.
    pub fn args(&self, stage: Stage) -> Vec<String> {
        let mut args = self.forwarded_args.clone();
        args.push(stage.subcommand().to_string());
        args
    }
}

impl StageRunner for SubprocessRunner {
    async fn run_stage(&self, stage: Stage) -> anyhow::Result<i32> {
        let args = self.args(stage);
        tracing::debug!(program = %self.program.display(), args = ?args, "Spawning stage");

        let status = tokio::process::Command::new(&self.program)
            .args(&args)
            .status()
            .await
            .with_context(|| format!("Failed to spawn {}", stage))?;

        // Killed by a signal: no exit code.
        Ok(status.code().unwrap_or(-1))
    }
}

/// Run every stage in order, stopping at the first non-zero exit.
pub async fn deploy_all<R: StageRunner>(
    config: &ResolvedConfig,
    runner: &R,
) -> anyhow::Result<Vec<Stage>> {
    let stages = stages(config);
    let total = stages.len();

    if config.is_fork {
        tracing::info!("Fork mode: skipping mocks, using mainnet contracts");
    }

    for (i, stage) in stages.iter().enumerate() {
        tracing::info!(stage = %stage, "Stage {}/{}", i + 1, total);

        let code = runner.run_stage(*stage).await?;
        if code != 0 {
            anyhow::bail!("Stage {} failed with exit code {}", stage, code);
        }
    }

    Ok(stages)
}
