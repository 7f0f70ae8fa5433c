use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use hashyield_deploy::{accounts::parse_felt, devnet::DEFAULT_DEVNET_PORT};
use starknet::core::types::Felt;
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "hashyield")]
#[command(
    author,
    version,
    about = "Deploy the HashYield contracts to Starknet and keep the web app in sync"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(
        short,
        long,
        global = true,
        env = "HASHYIELD_VERBOSITY",
        default_value_t = LevelFilter::INFO
    )]
    pub verbosity: LevelFilter,

    /// Path to a TOML settings file. Environment variables take precedence over it.
    #[arg(short, long, global = true, env = "HASHYIELD_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Global arguments to forward to a child invocation of this binary.
    pub fn forwarded_args(&self) -> Vec<String> {
        let mut args = vec!["--verbosity".to_string(), self.verbosity.to_string()];
        if let Some(config) = &self.config {
            args.push("--config".to_string());
            args.push(config.display().to_string());
        }
        args
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Start a local starknet-devnet in the foreground.
    Devnet(DevnetArgs),

    /// Check that the chain of the active environment answers RPC calls.
    CheckDevnet,

    /// Deploy MockWBTC and MockVesuPool.
    #[command(visible_alias = "deploy:mocks")]
    DeployMocks,

    /// Deploy the vault and its lending strategy, then wire them together.
    #[command(visible_alias = "deploy:vault")]
    DeployVault,

    /// Deploy a new strategy for the vault already recorded in the manifest.
    #[command(visible_alias = "deploy:strategy")]
    DeployStrategy,

    /// Run deploy-mocks (skipped on forks) then deploy-vault.
    #[command(visible_alias = "deploy:all")]
    DeployAll,

    /// Mint MockWBTC to a test wallet.
    Faucet(FaucetArgs),

    /// Copy the manifest addresses into the web app's address table.
    SyncAddresses,

    /// Print the on-chain state of the deployed contracts.
    Inspect,
}

#[derive(Args)]
pub struct DevnetArgs {
    /// Fork the mainnet RPC (MAINNET_RPC_URL) instead of starting an empty chain.
    #[arg(long)]
    pub fork: bool,

    /// Port to listen on.
    #[arg(short, long, env = "DEVNET_PORT", default_value_t = DEFAULT_DEVNET_PORT)]
    pub port: u16,

    /// Path to the starknet-devnet binary. Defaults to ~/.dojo/bin/starknet-devnet.
    #[arg(long, env = "DEVNET_BIN")]
    pub bin: Option<PathBuf>,
}

#[derive(Args)]
pub struct FaucetArgs {
    /// Recipient address. Defaults to the deployer account.
    #[arg(long, value_parser = parse_felt)]
    pub to: Option<Felt>,

    /// Amount in base units (8 decimals). Defaults to 10 WBTC.
    #[arg(long)]
    pub amount: Option<u128>,
}
