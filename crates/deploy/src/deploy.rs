//! Contract instantiation from declared classes.
//!
//! Deploying is not idempotent: every call without an explicit salt creates a new
//! instance. Callers that want a stable address pass their own salt.

use starknet::core::types::Felt;

use crate::{
    artifacts::{ArtifactSource, ContractClassKind},
    chain::ChainClient,
    declare::{DeclaredClass, declare_if_absent},
};

/// Address and transaction of a finalized deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deployment {
    pub address: Felt,
    pub tx_hash: Felt,
}

/// Result of declaring then deploying a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeployedContractRecord {
    pub class_hash: Felt,
    pub address: Felt,
    pub tx_hash: Felt,
    pub declared: DeclaredClass,
}

/// A fresh random deployment salt.
pub fn random_salt() -> Felt {
    Felt::from(rand::random::<u128>())
}

/// Deploy an instance of `class_hash` and wait until the transaction is final.
pub async fn deploy<C: ChainClient>(
    chain: &C,
    class_hash: Felt,
    constructor_calldata: &[Felt],
    salt: Option<Felt>,
) -> anyhow::Result<Deployment> {
    let salt = salt.unwrap_or_else(random_salt);

    tracing::debug!(
        class_hash = format!("{:#066x}", class_hash),
        salt = format!("{:#x}", salt),
        args = constructor_calldata.len(),
        "Submitting deploy transaction"
    );

    let instance = chain
        .deploy(class_hash, constructor_calldata, salt)
        .await
        .map_err(|e| {
            anyhow::Error::new(e).context(format!("Failed to deploy class {:#066x}", class_hash))
        })?;

    chain.wait_for_finality(instance.tx_hash).await.map_err(|e| {
        anyhow::Error::new(e).context(format!(
            "Deployment at {:#066x} did not succeed",
            instance.address
        ))
    })?;

    Ok(Deployment {
        address: instance.address,
        tx_hash: instance.tx_hash,
    })
}

/// Declare `kind` if needed, then deploy one instance of it.
pub async fn declare_and_deploy<C, A>(
    chain: &C,
    artifacts: &A,
    kind: ContractClassKind,
    constructor_calldata: &[Felt],
) -> anyhow::Result<DeployedContractRecord>
where
    C: ChainClient,
    A: ArtifactSource,
{
    let declared = declare_if_absent(chain, artifacts, kind).await?;

    tracing::info!(contract = %kind, "Deploying...");
    let deployment = deploy(chain, declared.class_hash, constructor_calldata, None).await?;

    tracing::info!(
        contract = %kind,
        address = format!("{:#066x}", deployment.address),
        "Deployed"
    );

    Ok(DeployedContractRecord {
        class_hash: declared.class_hash,
        address: deployment.address,
        tx_hash: deployment.tx_hash,
        declared,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_salt_is_fresh() {
        assert_ne!(random_salt(), random_salt());
    }
}
