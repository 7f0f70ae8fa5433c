//! Local `starknet-devnet` launcher.
//!
//! Runs a fresh chain with pre-funded accounts, or a fork of a live network, as a child
//! process bound to the given port.

use std::{path::PathBuf, process::ExitStatus, time::Duration};

use anyhow::Context;
use tokio::process::{Child, Command};

use crate::{
    config::ResolvedConfig,
    rpc::{self, ReadinessPolicy},
};

/// Default devnet port.
pub const DEFAULT_DEVNET_PORT: u16 = 5050;

/// Seed of the deterministic devnet accounts.
pub const DEVNET_SEED: u64 = 0;

/// Number of pre-funded accounts on a fresh devnet.
pub const DEVNET_ACCOUNTS: u32 = 3;

/// Initial balance of each pre-funded account (1000 ETH in wei).
pub const DEVNET_INITIAL_BALANCE: &str = "1000000000000000000000";

/// Startup budget of a launched devnet.
pub const DEVNET_STARTUP: ReadinessPolicy = ReadinessPolicy::new(60, Duration::from_millis(500));

/// Default location of the devnet binary installed by `dojoup`.
pub fn default_devnet_bin() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".dojo").join("bin").join("starknet-devnet"))
}

/// Builder for `starknet-devnet` arguments.
#[derive(Debug, Clone)]
pub struct DevnetCmdBuilder {
    host: String,
    port: u16,
    seed: u64,
    accounts: Option<u32>,
    initial_balance: Option<String>,
    fork_network: Option<String>,
    fork_block: Option<String>,
    extra_args: Vec<String>,
}

impl Default for DevnetCmdBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DevnetCmdBuilder {
    pub fn new() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_DEVNET_PORT,
            seed: DEVNET_SEED,
            accounts: None,
            initial_balance: None,
            fork_network: None,
            fork_block: None,
            extra_args: Vec::new(),
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Number of pre-funded accounts.
    pub fn accounts(mut self, accounts: u32) -> Self {
        self.accounts = Some(accounts);
        self
    }

    /// Balance of each pre-funded account, in wei.
    pub fn initial_balance(mut self, balance: impl Into<String>) -> Self {
        self.initial_balance = Some(balance.into());
        self
    }

    /// Fork the network served at `url`.
    pub fn fork_network(mut self, url: impl Into<String>) -> Self {
        self.fork_network = Some(url.into());
        self
    }

    /// Fork at `block` instead of the latest block.
    pub fn fork_block(mut self, block: Option<String>) -> Self {
        self.fork_block = block;
        self
    }

    pub fn extra_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.extra_args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Build the argument list.
    pub fn build(self) -> Vec<String> {
        let mut cmd = vec![
            "--host".to_string(),
            self.host,
            "--port".to_string(),
            self.port.to_string(),
            "--seed".to_string(),
            self.seed.to_string(),
        ];

        if let Some(accounts) = self.accounts {
            cmd.push("--accounts".to_string());
            cmd.push(accounts.to_string());
        }

        if let Some(balance) = self.initial_balance {
            cmd.push("--initial-balance".to_string());
            cmd.push(balance);
        }

        if let Some(fork_network) = self.fork_network {
            cmd.push("--fork-network".to_string());
            cmd.push(fork_network);

            if let Some(fork_block) = self.fork_block {
                cmd.push("--fork-block".to_string());
                cmd.push(fork_block);
            }
        }

        cmd.extend(self.extra_args);

        cmd
    }
}

/// What the devnet starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DevnetMode {
    /// Empty chain with pre-funded accounts.
    Fresh,
    /// Mirror of a live network, optionally pinned to a block.
    Fork { url: String, block: Option<String> },
}

/// Everything needed to start a devnet.
#[derive(Debug, Clone)]
pub struct DevnetConfig {
    pub bin: PathBuf,
    pub port: u16,
    pub mode: DevnetMode,
}

impl DevnetConfig {
    /// Devnet matching the resolved environment. `fork` overrides the environment's choice.
    pub fn from_resolved(config: &ResolvedConfig, bin: PathBuf, port: u16, fork: bool) -> Self {
        let mode = if fork || config.is_fork {
            DevnetMode::Fork {
                url: config.fork_source_url.clone(),
                block: config.fork_block.clone(),
            }
        } else {
            DevnetMode::Fresh
        };

        Self { bin, port, mode }
    }

    pub fn is_fork(&self) -> bool {
        matches!(self.mode, DevnetMode::Fork { .. })
    }

    /// URL the launched devnet is reachable at from this host.
    pub fn rpc_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn args(&self) -> Vec<String> {
        let builder = DevnetCmdBuilder::new().port(self.port);

        match &self.mode {
            DevnetMode::Fresh => builder
                .accounts(DEVNET_ACCOUNTS)
                .initial_balance(DEVNET_INITIAL_BALANCE)
                .build(),
            DevnetMode::Fork { url, block } => builder
                .fork_network(url.clone())
                .fork_block(block.clone())
                .build(),
        }
    }

    /// Start the devnet as a child process sharing this terminal.
    pub fn spawn(&self) -> anyhow::Result<DevnetHandle> {
        if !self.bin.exists() {
            anyhow::bail!(
                "starknet-devnet not found at {}. Install it with dojoup or pass --bin",
                self.bin.display()
            );
        }

        let args = self.args();
        tracing::info!(bin = %self.bin.display(), args = ?args, "Starting starknet-devnet...");

        let child = Command::new(&self.bin)
            .args(&args)
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start {}", self.bin.display()))?;

        Ok(DevnetHandle {
            child,
            rpc_url: self.rpc_url(),
        })
    }
}

/// A running devnet.
#[derive(Debug)]
pub struct DevnetHandle {
    child: Child,
    rpc_url: String,
}

impl DevnetHandle {
    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Wait until the devnet answers RPC calls.
    pub async fn wait_ready(&self, policy: ReadinessPolicy) -> bool {
        rpc::wait_for_ready(&self.rpc_url, policy.max_attempts, policy.delay).await
    }

    /// Wait for the devnet to exit on its own.
    pub async fn wait(&mut self) -> anyhow::Result<ExitStatus> {
        self.child.wait().await.context("Failed to wait for starknet-devnet")
    }

    /// Stop the devnet.
    pub async fn kill(&mut self) -> anyhow::Result<()> {
        tracing::info!("Shutting down devnet...");
        self.child.kill().await.context("Failed to stop starknet-devnet")
    }
}
