//! Deployment drivers.
//!
//! Every driver walks a fixed sequence of [`PipelineStep`]s. The first failing step ends the
//! run in [`PipelineState::Failed`] and no later step runs. Manifest writes only happen in
//! the final [`PipelineStep::PersistManifest`] step.

pub mod all;
pub mod faucet;
pub mod inspect;
pub mod mocks;
pub mod vault;

use std::{fmt, future::Future};

use thiserror::Error;

use crate::{
    config::{Environment, ResolvedConfig},
    manifest::{ContractName, DeploymentManifest, ManifestStore},
    rpc::{self, ReadinessPolicy},
};

/// A step of a driver's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStep {
    ReadinessCheck,
    ResolveDependencies,
    Deploy(ContractName),
    ConfigureCrossReferences,
    Mint,
    PersistManifest,
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStep::ReadinessCheck => write!(f, "readiness check"),
            PipelineStep::ResolveDependencies => write!(f, "resolve dependencies"),
            PipelineStep::Deploy(name) => write!(f, "deploy {}", name),
            PipelineStep::ConfigureCrossReferences => write!(f, "configure cross-references"),
            PipelineStep::Mint => write!(f, "mint"),
            PipelineStep::PersistManifest => write!(f, "persist manifest"),
        }
    }
}

/// Where a driver run stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Pending,
    Running(PipelineStep),
    Done,
    Failed(PipelineStep),
}

/// A driver run that stopped at `step`.
#[derive(Debug, Error)]
#[error("{driver} failed at step '{step}': {source}")]
pub struct PipelineError {
    pub driver: &'static str,
    pub step: PipelineStep,
    #[source]
    pub source: anyhow::Error,
}

/// State machine of one driver invocation.
#[derive(Debug)]
pub struct PipelineRun {
    driver: &'static str,
    state: PipelineState,
    history: Vec<PipelineStep>,
}

impl PipelineRun {
    pub fn new(driver: &'static str) -> Self {
        Self {
            driver,
            state: PipelineState::Pending,
            history: Vec::new(),
        }
    }

    pub fn driver(&self) -> &'static str {
        self.driver
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Steps entered so far, in order.
    pub fn history(&self) -> &[PipelineStep] {
        &self.history
    }

    /// Run `fut` as `step`.
    ///
    /// A run that already failed or completed does not poll `fut` and reports the
    /// request as a failure of `step`.
    pub async fn step<T, F>(&mut self, step: PipelineStep, fut: F) -> Result<T, PipelineError>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        if matches!(self.state, PipelineState::Failed(_) | PipelineState::Done) {
            return Err(PipelineError {
                driver: self.driver,
                step,
                source: anyhow::anyhow!("Run is already {:?}", self.state),
            });
        }

        tracing::debug!(driver = self.driver, step = %step, "Entering step");
        self.state = PipelineState::Running(step);
        self.history.push(step);

        fut.await.map_err(|source| {
            self.state = PipelineState::Failed(step);
            tracing::error!(driver = self.driver, step = %step, error = %format!("{source:#}"), "Step failed");
            PipelineError {
                driver: self.driver,
                step,
                source,
            }
        })
    }

    /// Mark the run as complete.
    pub fn finish(&mut self) {
        if let PipelineState::Running(_) | PipelineState::Pending = self.state {
            self.state = PipelineState::Done;
        }
    }
}

/// Everything a driver needs, resolved once by the caller.
pub struct DeployContext<'a, C, A> {
    pub config: &'a ResolvedConfig,
    pub chain: &'a C,
    pub artifacts: &'a A,
    pub manifests: &'a ManifestStore,
    pub readiness: ReadinessPolicy,
}

impl<'a, C, A> DeployContext<'a, C, A> {
    pub fn new(
        config: &'a ResolvedConfig,
        chain: &'a C,
        artifacts: &'a A,
        manifests: &'a ManifestStore,
    ) -> Self {
        Self {
            config,
            chain,
            artifacts,
            manifests,
            readiness: ReadinessPolicy::default(),
        }
    }

    pub fn with_readiness(mut self, readiness: ReadinessPolicy) -> Self {
        self.readiness = readiness;
        self
    }

    pub fn environment(&self) -> Environment {
        self.config.environment
    }

    /// Current manifest of the active environment.
    pub fn manifest(&self) -> anyhow::Result<Option<DeploymentManifest>> {
        Ok(self.manifests.load(self.config.environment)?)
    }
}

/// Command suggested to bring up the chain the active environment expects.
pub fn devnet_hint(config: &ResolvedConfig) -> String {
    match config.environment {
        Environment::Local => "hashyield devnet".to_string(),
        Environment::Fork => "hashyield devnet --fork".to_string(),
        Environment::Sepolia | Environment::Mainnet => {
            format!("check that {} is reachable", config.rpc_url)
        }
    }
}

/// Gate every mutating call on the node answering a chain-id query.
pub async fn check_readiness<C, A>(ctx: &DeployContext<'_, C, A>) -> anyhow::Result<()>
where
    C: crate::chain::ChainClient,
{
    let ready = rpc::wait_for(&ctx.config.rpc_url, ctx.readiness, || ctx.chain.chain_id()).await;

    if !ready {
        anyhow::bail!(
            "Chain is not reachable at {} after {} attempts. Start it first with: {}",
            ctx.config.rpc_url,
            ctx.readiness.max_attempts,
            devnet_hint(ctx.config)
        );
    }

    tracing::debug!(rpc_url = %ctx.config.rpc_url, "Chain is ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_records_steps_in_order() {
        let mut run = PipelineRun::new("test");
        run.step(PipelineStep::ReadinessCheck, async { Ok(()) })
            .await
            .unwrap();
        let value = run
            .step(PipelineStep::Deploy(ContractName::Vault), async { Ok(7) })
            .await
            .unwrap();
        run.finish();

        assert_eq!(value, 7);
        assert_eq!(run.state(), PipelineState::Done);
        assert_eq!(
            run.history(),
            &[
                PipelineStep::ReadinessCheck,
                PipelineStep::Deploy(ContractName::Vault)
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_state_is_absorbing() {
        let mut run = PipelineRun::new("test");
        let err = run
            .step(PipelineStep::ResolveDependencies, async {
                Err::<(), _>(anyhow::anyhow!("mockWbtc missing"))
            })
            .await
            .unwrap_err();

        assert_eq!(err.step, PipelineStep::ResolveDependencies);
        assert!(err.to_string().contains("resolve dependencies"));
        assert!(err.to_string().contains("mockWbtc missing"));

        let mut polled = false;
        let again = run
            .step(PipelineStep::PersistManifest, async {
                polled = true;
                Ok(())
            })
            .await;

        assert!(again.is_err());
        assert!(!polled);
        run.finish();
        assert_eq!(
            run.state(),
            PipelineState::Failed(PipelineStep::ResolveDependencies)
        );
        assert_eq!(run.history(), &[PipelineStep::ResolveDependencies]);
    }

    #[test]
    fn test_step_display() {
        assert_eq!(
            PipelineStep::Deploy(ContractName::MockVesuPool).to_string(),
            "deploy mockVesuPool"
        );
    }
}
