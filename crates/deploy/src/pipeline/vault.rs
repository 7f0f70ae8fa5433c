//! `deploy-vault`: the HashYield vault and its lending strategy.
//!
//! The strategy embeds the vault address in its constructor, so the vault always goes
//! first. A vault without its strategy configured is unusable, so `set_strategy` and its
//! read-back are part of the run rather than a best-effort follow-up.

use starknet::{
    core::types::{Call, Felt},
    macros::selector,
};

use crate::{
    artifacts::{ArtifactSource, ContractClassKind},
    calldata::encode_byte_array,
    chain::ChainClient,
    config::ResolvedConfig,
    deploy::{DeployedContractRecord, declare_and_deploy},
    manifest::{ContractName, DeploymentManifest, ManifestUpdate},
};

use super::{DeployContext, PipelineError, PipelineRun, PipelineStep, check_readiness};

/// Name of the vault share token.
pub const VAULT_NAME: &str = "HashYield BTC";
/// Symbol of the vault share token.
pub const VAULT_SYMBOL: &str = "hyBTC";

/// Live contracts a forked devnet builds on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MainnetAddresses {
    pub wbtc: Felt,
    /// Vesu vToken for the WBTC pool. Zero until configured.
    pub vesu_wbtc_vtoken: Felt,
}

pub const MAINNET_ADDRESSES: MainnetAddresses = MainnetAddresses {
    wbtc: Felt::from_hex_unchecked(
        "0x03fe2b97c1fd336e750087d68b9b867997fd64a2661ff3ca5a7c771641e8e7ac",
    ),
    vesu_wbtc_vtoken: Felt::ZERO,
};

/// Where the vault's underlying contracts come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum DependencySource {
    Manifest,
    Mainnet,
}

/// Underlying asset and lending pool of the vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaultDependencies {
    pub wbtc: Felt,
    pub vesu_pool: Felt,
    pub source: DependencySource,
}

/// Outcome of a successful `deploy-vault` run.
#[derive(Debug, Clone)]
pub struct VaultDeployment {
    pub dependencies: VaultDependencies,
    pub vault: DeployedContractRecord,
    pub strategy: DeployedContractRecord,
    pub set_strategy_tx: Felt,
    pub manifest: DeploymentManifest,
}

/// Outcome of a successful `deploy-strategy` run.
#[derive(Debug, Clone)]
pub struct StrategyDeployment {
    pub dependencies: VaultDependencies,
    pub vault: Felt,
    pub strategy: DeployedContractRecord,
    pub set_strategy_tx: Felt,
    pub manifest: DeploymentManifest,
}

/// Pick the vault's underlying contracts for the active environment.
///
/// Fork mode uses the live mainnet contracts. Every other environment uses the mocks
/// recorded by `deploy-mocks`.
pub fn resolve_dependencies(
    config: &ResolvedConfig,
    manifest: Option<&DeploymentManifest>,
    mainnet: &MainnetAddresses,
) -> anyhow::Result<VaultDependencies> {
    if config.is_fork {
        if mainnet.vesu_wbtc_vtoken == Felt::ZERO {
            anyhow::bail!(
                "Vesu WBTC vToken address is not configured for fork mode. \
                 Set it in MAINNET_ADDRESSES before deploying against a fork"
            );
        }

        return Ok(VaultDependencies {
            wbtc: mainnet.wbtc,
            vesu_pool: mainnet.vesu_wbtc_vtoken,
            source: DependencySource::Mainnet,
        });
    }

    let (Some(wbtc), Some(vesu_pool)) = (
        manifest.and_then(|m| m.contract(ContractName::MockWbtc)),
        manifest.and_then(|m| m.contract(ContractName::MockVesuPool)),
    ) else {
        anyhow::bail!(
            "Mock contracts not found in the {} manifest. Deploy them first: hashyield deploy-mocks",
            config.environment
        );
    };

    Ok(VaultDependencies {
        wbtc,
        vesu_pool,
        source: DependencySource::Manifest,
    })
}

/// Vault constructor: `(asset, name: ByteArray, symbol: ByteArray, owner)`.
pub fn vault_calldata(asset: Felt, owner: Felt) -> Vec<Felt> {
    let mut calldata = vec![asset];
    calldata.extend(encode_byte_array(VAULT_NAME));
    calldata.extend(encode_byte_array(VAULT_SYMBOL));
    calldata.push(owner);
    calldata
}

/// Strategy constructor: `(asset, v_token, vault, owner)`.
pub fn strategy_calldata(deps: &VaultDependencies, vault: Felt, owner: Felt) -> Vec<Felt> {
    vec![deps.wbtc, deps.vesu_pool, vault, owner]
}

/// Point `vault` at `strategy` and check that the vault reports it back.
pub async fn configure_strategy<C: ChainClient>(
    chain: &C,
    vault: Felt,
    strategy: Felt,
) -> anyhow::Result<Felt> {
    tracing::info!(
        vault = format!("{:#066x}", vault),
        strategy = format!("{:#066x}", strategy),
        "Configuring vault strategy..."
    );

    let tx_hash = chain
        .invoke(vec![Call {
            to: vault,
            selector: selector!("set_strategy"),
            calldata: vec![strategy],
        }])
        .await
        .map_err(|e| anyhow::Error::new(e).context("Failed to submit set_strategy"))?;

    chain
        .wait_for_finality(tx_hash)
        .await
        .map_err(|e| anyhow::Error::new(e).context("set_strategy did not succeed"))?;

    let current = chain
        .call(vault, selector!("current_strategy"), vec![])
        .await
        .map_err(|e| anyhow::Error::new(e).context("Failed to read back current_strategy"))?;

    match current.first() {
        Some(configured) if *configured == strategy => Ok(tx_hash),
        Some(configured) => anyhow::bail!(
            "Vault reports strategy {:#066x}, expected {:#066x}",
            configured,
            strategy
        ),
        None => anyhow::bail!("current_strategy returned no value"),
    }
}

/// Run `deploy-vault` with the live mainnet contracts for fork mode.
pub async fn run<C, A>(ctx: &DeployContext<'_, C, A>) -> Result<VaultDeployment, PipelineError>
where
    C: ChainClient,
    A: ArtifactSource,
{
    run_with(ctx, &MAINNET_ADDRESSES).await
}

/// Deploy the vault, then the strategy, wire them together and record both.
pub async fn run_with<C, A>(
    ctx: &DeployContext<'_, C, A>,
    mainnet: &MainnetAddresses,
) -> Result<VaultDeployment, PipelineError>
where
    C: ChainClient,
    A: ArtifactSource,
{
    let mut run = PipelineRun::new("deploy-vault");
    let owner = ctx.chain.account_address();

    tracing::info!(
        environment = %ctx.environment(),
        rpc_url = %ctx.config.rpc_url,
        deployer = format!("{:#066x}", owner),
        "Deploying vault and strategy"
    );

    run.step(PipelineStep::ReadinessCheck, check_readiness(ctx))
        .await?;

    let dependencies = run
        .step(PipelineStep::ResolveDependencies, async {
            let manifest = ctx.manifest()?;
            resolve_dependencies(ctx.config, manifest.as_ref(), mainnet)
        })
        .await?;

    tracing::info!(
        source = %dependencies.source,
        wbtc = format!("{:#066x}", dependencies.wbtc),
        vesu_pool = format!("{:#066x}", dependencies.vesu_pool),
        "Resolved vault dependencies"
    );

    let vault = run
        .step(
            PipelineStep::Deploy(ContractName::Vault),
            declare_and_deploy(
                ctx.chain,
                ctx.artifacts,
                ContractClassKind::Vault,
                &vault_calldata(dependencies.wbtc, owner),
            ),
        )
        .await?;

    let strategy = run
        .step(
            PipelineStep::Deploy(ContractName::Strategy),
            declare_and_deploy(
                ctx.chain,
                ctx.artifacts,
                ContractClassKind::LendingStrategyV0,
                &strategy_calldata(&dependencies, vault.address, owner),
            ),
        )
        .await?;

    let set_strategy_tx = run
        .step(
            PipelineStep::ConfigureCrossReferences,
            configure_strategy(ctx.chain, vault.address, strategy.address),
        )
        .await?;

    let update = ManifestUpdate::default()
        .contract(ContractName::Vault, vault.address)
        .contract(ContractName::Strategy, strategy.address)
        .contract(ContractName::Wbtc, dependencies.wbtc)
        .contract(ContractName::VesuPool, dependencies.vesu_pool)
        .class_hash(ContractName::Vault, vault.class_hash)
        .class_hash(ContractName::Strategy, strategy.class_hash);

    let manifest = run
        .step(PipelineStep::PersistManifest, async {
            Ok(ctx.manifests.merge_and_save(ctx.environment(), update)?)
        })
        .await?;

    run.finish();

    Ok(VaultDeployment {
        dependencies,
        vault,
        strategy,
        set_strategy_tx,
        manifest,
    })
}

/// Deploy a fresh strategy for the vault already recorded in the manifest.
pub async fn deploy_strategy<C, A>(
    ctx: &DeployContext<'_, C, A>,
    mainnet: &MainnetAddresses,
) -> Result<StrategyDeployment, PipelineError>
where
    C: ChainClient,
    A: ArtifactSource,
{
    let mut run = PipelineRun::new("deploy-strategy");
    let owner = ctx.chain.account_address();

    run.step(PipelineStep::ReadinessCheck, check_readiness(ctx))
        .await?;

    let (vault, dependencies) = run
        .step(PipelineStep::ResolveDependencies, async {
            let manifest = ctx.manifest()?;
            let Some(vault) = manifest.as_ref().and_then(|m| m.contract(ContractName::Vault))
            else {
                anyhow::bail!(
                    "Vault not found in the {} manifest. Deploy it first: hashyield deploy-vault",
                    ctx.environment()
                );
            };
            let dependencies = resolve_dependencies(ctx.config, manifest.as_ref(), mainnet)?;
            Ok((vault, dependencies))
        })
        .await?;

    let strategy = run
        .step(
            PipelineStep::Deploy(ContractName::Strategy),
            declare_and_deploy(
                ctx.chain,
                ctx.artifacts,
                ContractClassKind::LendingStrategyV0,
                &strategy_calldata(&dependencies, vault, owner),
            ),
        )
        .await?;

    let set_strategy_tx = run
        .step(
            PipelineStep::ConfigureCrossReferences,
            configure_strategy(ctx.chain, vault, strategy.address),
        )
        .await?;

    let update = ManifestUpdate::default()
        .contract(ContractName::Strategy, strategy.address)
        .class_hash(ContractName::Strategy, strategy.class_hash);

    let manifest = run
        .step(PipelineStep::PersistManifest, async {
            Ok(ctx.manifests.merge_and_save(ctx.environment(), update)?)
        })
        .await?;

    run.finish();

    Ok(StrategyDeployment {
        dependencies,
        vault,
        strategy,
        set_strategy_tx,
        manifest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Environment, Settings};

    fn config(env: &str) -> ResolvedConfig {
        ResolvedConfig::resolve(&Settings {
            deploy_env: Some(env.to_string()),
            ..Default::default()
        })
    }

    #[test]
    fn test_vault_calldata_layout() {
        let calldata = vault_calldata(Felt::from(0xa55e7u64), Felt::from(0x0111u64));

        assert_eq!(calldata.first(), Some(&Felt::from(0xa55e7u64)));
        assert_eq!(calldata.last(), Some(&Felt::from(0x0111u64)));
        // asset + 2 short ByteArrays of 3 felts + owner
        assert_eq!(calldata.len(), 8);
        assert_eq!(calldata[3], Felt::from(VAULT_NAME.len()));
        assert_eq!(calldata[6], Felt::from(VAULT_SYMBOL.len()));
    }

    #[test]
    fn test_strategy_calldata_embeds_vault() {
        let deps = VaultDependencies {
            wbtc: Felt::ONE,
            vesu_pool: Felt::TWO,
            source: DependencySource::Manifest,
        };
        assert_eq!(
            strategy_calldata(&deps, Felt::from(3u64), Felt::from(4u64)),
            vec![Felt::ONE, Felt::TWO, Felt::from(3u64), Felt::from(4u64)]
        );
    }

    #[test]
    fn test_local_dependencies_come_from_manifest() {
        let mut manifest = DeploymentManifest::new(Environment::Local);
        manifest.contracts.insert(ContractName::MockWbtc, Felt::from(0x10u64));
        manifest.contracts.insert(ContractName::MockVesuPool, Felt::from(0x20u64));

        let deps =
            resolve_dependencies(&config("local"), Some(&manifest), &MAINNET_ADDRESSES).unwrap();
        assert_eq!(deps.wbtc, Felt::from(0x10u64));
        assert_eq!(deps.vesu_pool, Felt::from(0x20u64));
        assert_eq!(deps.source, DependencySource::Manifest);
    }

    #[test]
    fn test_missing_mocks_is_a_precondition_failure() {
        let err = resolve_dependencies(&config("local"), None, &MAINNET_ADDRESSES).unwrap_err();
        assert!(err.to_string().contains("hashyield deploy-mocks"));
    }

    #[test]
    fn test_fork_requires_vtoken() {
        let err = resolve_dependencies(&config("fork"), None, &MAINNET_ADDRESSES).unwrap_err();
        assert!(err.to_string().contains("vToken"));

        let mainnet = MainnetAddresses {
            vesu_wbtc_vtoken: Felt::from(0x77u64),
            ..MAINNET_ADDRESSES
        };
        let deps = resolve_dependencies(&config("fork"), None, &mainnet).unwrap();
        assert_eq!(deps.wbtc, MAINNET_ADDRESSES.wbtc);
        assert_eq!(deps.source, DependencySource::Mainnet);
    }
}
