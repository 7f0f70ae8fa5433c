//! hashyield deploys the HashYield vault contracts to Starknet and keeps the web app's
//! address table in sync with the deployments.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::Table;
use starknet::core::{types::Felt, utils::parse_cairo_short_string};

use cli::{Cli, Command, DevnetArgs, FaucetArgs};
use hashyield_deploy::{
    ArtifactStore, DEVNET_ACCOUNTS, DeployContext, DeploymentManifest, ManifestStore,
    ReadinessPolicy, ResolvedConfig, Settings, StarknetChain,
    calldata::{WBTC_DECIMALS, format_units},
    deploy::DeployedContractRecord,
    devnet::{DEVNET_STARTUP, DevnetConfig, default_devnet_bin},
    pipeline::{
        all::{self, SubprocessRunner},
        devnet_hint,
        faucet::{self, FaucetRequest},
        inspect, mocks,
        vault::{self, MAINNET_ADDRESSES},
    },
    propagate::sync_to_consumer,
    resolve_deployer, rpc,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let settings = Settings::load(cli.config.as_deref())?;
    let config = ResolvedConfig::resolve(&settings);

    tracing::debug!(
        environment = %config.environment,
        rpc_url = %config.rpc_url,
        is_fork = config.is_fork,
        "Resolved deployment target"
    );

    match &cli.command {
        Command::Devnet(args) => run_devnet(&config, args).await,
        Command::CheckDevnet => check_devnet(&config).await,
        Command::SyncAddresses => sync_addresses(&config),
        Command::DeployAll => {
            let runner = SubprocessRunner::current_exe(cli.forwarded_args())?;
            all::deploy_all(&config, &runner).await?;

            tracing::info!("All contracts deployed");
            println!("\nNext: hashyield sync-addresses");
            Ok(())
        }
        Command::DeployMocks => {
            let session = Session::open(&config, &settings)?;
            let deployment = mocks::run(&session.context(&config)).await?;

            print_records(&[
                ("mockWbtc", &deployment.mock_wbtc),
                ("mockVesuPool", &deployment.mock_vesu_pool),
            ]);
            println!(
                "\nManifest: {}",
                session.manifests.path(config.environment).display()
            );
            println!("Next: hashyield deploy-vault");
            Ok(())
        }
        Command::DeployVault => {
            let session = Session::open(&config, &settings)?;
            let deployment = vault::run(&session.context(&config)).await?;

            print_records(&[
                ("vault", &deployment.vault),
                ("strategy", &deployment.strategy),
            ]);
            println!(
                "\nUnderlying ({}): wbtc {:#066x}, vesuPool {:#066x}",
                deployment.dependencies.source,
                deployment.dependencies.wbtc,
                deployment.dependencies.vesu_pool
            );
            println!("set_strategy: {:#066x}", deployment.set_strategy_tx);
            println!("Next: hashyield sync-addresses");
            Ok(())
        }
        Command::DeployStrategy => {
            let session = Session::open(&config, &settings)?;
            let deployment =
                vault::deploy_strategy(&session.context(&config), &MAINNET_ADDRESSES).await?;

            print_records(&[("strategy", &deployment.strategy)]);
            println!(
                "\nVault {:#066x} now uses strategy {:#066x}",
                deployment.vault, deployment.strategy.address
            );
            Ok(())
        }
        Command::Faucet(args) => run_faucet(&config, &settings, args).await,
        Command::Inspect => {
            let session = Session::open(&config, &settings)?;
            let report = inspect::run(&session.context(&config)).await?;

            println!("Chain: {}", display_chain_id(report.chain_id));
            print_manifest(&report.manifest);

            for contract in &report.contracts {
                let Some(address) = contract.address else {
                    println!("\n{}: not deployed", contract.name);
                    continue;
                };

                let mut table = Table::new();
                table.set_header(vec!["View", "Value"]);
                for reading in &contract.readings {
                    let value = match &reading.value {
                        Ok(value) => value.clone(),
                        Err(e) => format!("error: {}", e),
                    };
                    table.add_row(vec![reading.view.to_string(), value]);
                }
                println!("\n{} ({:#066x})\n{}", contract.name, address, table);
            }
            Ok(())
        }
    }
}

/// Signing connection plus local stores for a driver invocation.
struct Session {
    chain: StarknetChain,
    artifacts: ArtifactStore,
    manifests: ManifestStore,
}

impl Session {
    fn open(config: &ResolvedConfig, settings: &Settings) -> Result<Self> {
        let signer = resolve_deployer(config, settings)?;

        tracing::info!(
            environment = %config.environment,
            rpc_url = %config.rpc_url,
            deployer = format!("{:#066x}", signer.address),
            "Connecting deployer account"
        );

        Ok(Self {
            chain: StarknetChain::new(&config.rpc_url, config.chain_id, &signer)?,
            artifacts: ArtifactStore::new(config.artifacts_dir()),
            manifests: ManifestStore::new(config.deployments_dir()),
        })
    }

    fn context<'a>(
        &'a self,
        config: &'a ResolvedConfig,
    ) -> DeployContext<'a, StarknetChain, ArtifactStore> {
        DeployContext::new(config, &self.chain, &self.artifacts, &self.manifests)
    }
}

async fn run_devnet(config: &ResolvedConfig, args: &DevnetArgs) -> Result<()> {
    let bin = match &args.bin {
        Some(bin) => bin.clone(),
        None => default_devnet_bin().context("Cannot locate the home directory, pass --bin")?,
    };

    let devnet = DevnetConfig::from_resolved(config, bin, args.port, args.fork);
    let mut handle = devnet.spawn()?;

    if !handle.wait_ready(DEVNET_STARTUP).await {
        handle.kill().await?;
        anyhow::bail!(
            "Devnet failed to start within {} attempts at {}",
            DEVNET_STARTUP.max_attempts,
            handle.rpc_url()
        );
    }

    tracing::info!(rpc_url = %handle.rpc_url(), fork = devnet.is_fork(), "Devnet is ready");
    if devnet.is_fork() {
        println!("Fork mode: mainnet contracts such as WBTC are available.");
        println!("Next: DEPLOY_ENV=fork hashyield deploy-vault");
    } else {
        print_devnet_accounts();
        println!("Next: hashyield deploy-all");
    }
    println!("Press Ctrl+C to stop the devnet.");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    tokio::select! {
        _ = &mut ctrl_c => {
            handle.kill().await?;
            Ok(())
        }
        status = handle.wait() => {
            let status = status?;
            if status.success() {
                Ok(())
            } else {
                tracing::error!(%status, "starknet-devnet exited");
                std::process::exit(status.code().unwrap_or(1));
            }
        }
    }
}

async fn check_devnet(config: &ResolvedConfig) -> Result<()> {
    let policy = ReadinessPolicy::default();
    tracing::info!(rpc_url = %config.rpc_url, "Checking devnet...");

    if !rpc::wait_for_ready(&config.rpc_url, policy.max_attempts, policy.delay).await {
        anyhow::bail!(
            "Devnet is not running at {}. Start it with: {}",
            config.rpc_url,
            devnet_hint(config)
        );
    }

    let client = rpc::create_client()?;
    let chain_id = rpc::query_chain_id(&client, &config.rpc_url).await?;

    println!("Devnet is ready ({})", display_chain_id(chain_id));
    if chain_id != config.chain_id {
        tracing::warn!(
            expected = %display_chain_id(config.chain_id),
            found = %display_chain_id(chain_id),
            "Chain id does not match the {} environment",
            config.environment
        );
    }

    Ok(())
}

fn sync_addresses(config: &ResolvedConfig) -> Result<()> {
    let manifests = ManifestStore::new(config.deployments_dir());
    let manifest = manifests.load(config.environment)?.ok_or_else(|| {
        anyhow::anyhow!(
            "No deployment manifest found for environment: {}. Deploy contracts first: hashyield deploy-all",
            config.environment
        )
    })?;

    print_manifest(&manifest);

    let report = sync_to_consumer(&config.web_addresses_path, &manifest)?;

    let mut table = Table::new();
    table.set_header(vec!["Key", "Status", "Address"]);
    for change in &report.updated {
        table.add_row(vec![
            change.key.clone(),
            "updated".to_string(),
            format!("{:#066x}", change.address),
        ]);
    }
    for key in &report.unchanged {
        table.add_row(vec![key.clone(), "unchanged".to_string(), String::new()]);
    }
    for key in &report.missing {
        table.add_row(vec![key.clone(), "not found".to_string(), String::new()]);
    }

    println!("\n{} ({} block)\n{}", config.web_addresses_path.display(), report.block, table);
    Ok(())
}

async fn run_faucet(config: &ResolvedConfig, settings: &Settings, args: &FaucetArgs) -> Result<()> {
    let session = Session::open(config, settings)?;
    let receipt = faucet::run(
        &session.context(config),
        FaucetRequest {
            recipient: args.to,
            amount: args.amount,
        },
    )
    .await?;

    let mut table = Table::new();
    table.set_header(vec!["", "Units", "WBTC"]);
    for (label, amount) in [
        ("Minted", receipt.amount),
        ("Balance before", receipt.balance_before),
        ("Balance after", receipt.balance_after),
    ] {
        table.add_row(vec![
            label.to_string(),
            amount.to_string(),
            format_units(amount, WBTC_DECIMALS),
        ]);
    }

    println!("Recipient:   {:#066x}", receipt.recipient);
    println!("Transaction: {:#066x}", receipt.tx_hash);
    println!("{table}");
    Ok(())
}

fn print_records(records: &[(&str, &DeployedContractRecord)]) {
    let mut table = Table::new();
    table.set_header(vec!["Contract", "Address", "Class hash", "Declared"]);
    for (name, record) in records {
        let declared = match record.declared.tx_hash() {
            Some(tx_hash) => format!("{:#x}", tx_hash),
            None => "already declared".to_string(),
        };
        table.add_row(vec![
            name.to_string(),
            format!("{:#066x}", record.address),
            format!("{:#066x}", record.class_hash),
            declared,
        ]);
    }
    println!("{table}");
}

fn print_manifest(manifest: &DeploymentManifest) {
    let mut table = Table::new();
    table.set_header(vec!["Contract", "Address"]);
    for (name, address) in &manifest.contracts {
        table.add_row(vec![name.to_string(), format!("{:#066x}", address)]);
    }
    println!(
        "Manifest: {} ({})\n{}",
        manifest.environment,
        manifest.timestamp.to_rfc3339(),
        table
    );
}

fn print_devnet_accounts() {
    let mut table = Table::new();
    table.set_header(vec!["Account", "Address", "Private key"]);
    for (name, account) in [
        ("deployer", &DEVNET_ACCOUNTS.deployer),
        ("user1", &DEVNET_ACCOUNTS.user1),
        ("user2", &DEVNET_ACCOUNTS.user2),
    ] {
        table.add_row(vec![
            name.to_string(),
            format!("{:#066x}", account.address),
            format!("{:#x}", account.private_key),
        ]);
    }
    println!("{table}");
}

/// Chain ids are short strings such as `SN_SEPOLIA`; fall back to hex otherwise.
fn display_chain_id(chain_id: Felt) -> String {
    parse_cairo_short_string(&chain_id).unwrap_or_else(|_| format!("{:#x}", chain_id))
}
