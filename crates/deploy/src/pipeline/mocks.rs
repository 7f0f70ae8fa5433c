//! `deploy-mocks`: stand-ins for the mainnet WBTC token and Vesu pool.

use crate::{
    artifacts::{ArtifactSource, ContractClassKind},
    chain::ChainClient,
    deploy::{DeployedContractRecord, declare_and_deploy},
    manifest::{ContractName, DeploymentManifest, ManifestUpdate},
};

use super::{DeployContext, PipelineError, PipelineRun, PipelineStep, check_readiness};

/// Outcome of a successful `deploy-mocks` run.
#[derive(Debug, Clone)]
pub struct MocksDeployment {
    pub mock_wbtc: DeployedContractRecord,
    pub mock_vesu_pool: DeployedContractRecord,
    pub manifest: DeploymentManifest,
}

impl MocksDeployment {
    /// Manifest entries recorded by the run. The mocks double as `wbtc` and `vesuPool`.
    pub fn manifest_update(
        mock_wbtc: &DeployedContractRecord,
        mock_vesu_pool: &DeployedContractRecord,
    ) -> ManifestUpdate {
        ManifestUpdate::default()
            .contract(ContractName::MockWbtc, mock_wbtc.address)
            .contract(ContractName::MockVesuPool, mock_vesu_pool.address)
            .contract(ContractName::Wbtc, mock_wbtc.address)
            .contract(ContractName::VesuPool, mock_vesu_pool.address)
            .class_hash(ContractName::MockWbtc, mock_wbtc.class_hash)
            .class_hash(ContractName::MockVesuPool, mock_vesu_pool.class_hash)
    }
}

/// Deploy MockWBTC then MockVesuPool over it, and record both.
pub async fn run<C, A>(ctx: &DeployContext<'_, C, A>) -> Result<MocksDeployment, PipelineError>
where
    C: ChainClient,
    A: ArtifactSource,
{
    let mut run = PipelineRun::new("deploy-mocks");

    tracing::info!(
        environment = %ctx.environment(),
        rpc_url = %ctx.config.rpc_url,
        deployer = format!("{:#066x}", ctx.chain.account_address()),
        "Deploying mock contracts"
    );

    run.step(PipelineStep::ReadinessCheck, check_readiness(ctx))
        .await?;

    let mock_wbtc = run
        .step(
            PipelineStep::Deploy(ContractName::MockWbtc),
            declare_and_deploy(ctx.chain, ctx.artifacts, ContractClassKind::MockWBTC, &[]),
        )
        .await?;

    let mock_vesu_pool = run
        .step(
            PipelineStep::Deploy(ContractName::MockVesuPool),
            declare_and_deploy(
                ctx.chain,
                ctx.artifacts,
                ContractClassKind::MockVesuPool,
                &[mock_wbtc.address],
            ),
        )
        .await?;

    let update = MocksDeployment::manifest_update(&mock_wbtc, &mock_vesu_pool);
    let manifest = run
        .step(PipelineStep::PersistManifest, async {
            Ok(ctx.manifests.merge_and_save(ctx.environment(), update)?)
        })
        .await?;

    run.finish();

    Ok(MocksDeployment {
        mock_wbtc,
        mock_vesu_pool,
        manifest,
    })
}
