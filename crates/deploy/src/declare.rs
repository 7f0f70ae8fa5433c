//! Idempotent class declaration.

use starknet::core::types::Felt;

use crate::{
    artifacts::{ArtifactSource, ContractClassKind},
    chain::{ChainClient, ChainError},
};

/// How a class ended up declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclareOutcome {
    /// The class was already on chain; nothing was submitted.
    AlreadyDeclared,
    /// A declare transaction was submitted and reached finality.
    Declared { tx_hash: Felt },
    /// The lookup missed but the declare reported the class as already present.
    Raced,
}

/// A declared class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeclaredClass {
    pub kind: ContractClassKind,
    pub class_hash: Felt,
    pub outcome: DeclareOutcome,
}

impl DeclaredClass {
    pub fn tx_hash(&self) -> Option<Felt> {
        match self.outcome {
            DeclareOutcome::Declared { tx_hash } => Some(tx_hash),
            _ => None,
        }
    }
}

/// Declare the class `kind` unless the chain already knows its class hash.
///
/// The class hash is computed locally from the artifact, so repeated calls resolve to the
/// same identifier. Losing a declaration race counts as success.
pub async fn declare_if_absent<C, A>(
    chain: &C,
    artifacts: &A,
    kind: ContractClassKind,
) -> anyhow::Result<DeclaredClass>
where
    C: ChainClient,
    A: ArtifactSource,
{
    let class = artifacts.prepare(kind)?;
    let class_hash = class.class_hash;
    let declared = |outcome| DeclaredClass {
        kind,
        class_hash,
        outcome,
    };

    match chain.lookup_class(class_hash).await {
        Ok(()) => {
            tracing::info!(
                class = %kind,
                class_hash = format!("{:#066x}", class_hash),
                "Class already declared"
            );
            return Ok(declared(DeclareOutcome::AlreadyDeclared));
        }
        Err(ChainError::NotFound) => {}
        Err(e) => {
            return Err(anyhow::Error::new(e)
                .context(format!("Failed to look up class {} ({:#066x})", kind, class_hash)));
        }
    }

    tracing::info!(class = %kind, "Declaring class...");

    let tx_hash = match chain.declare(&class).await {
        Ok(tx_hash) => tx_hash,
        Err(ChainError::AlreadyExists) => {
            tracing::warn!(
                class = %kind,
                class_hash = format!("{:#066x}", class_hash),
                "Class was declared concurrently, using the local class hash"
            );
            return Ok(declared(DeclareOutcome::Raced));
        }
        Err(e) => {
            return Err(anyhow::Error::new(e).context(format!("Failed to declare {}", kind)));
        }
    };

    chain
        .wait_for_finality(tx_hash)
        .await
        .map_err(|e| anyhow::Error::new(e).context(format!("Declaration of {} failed", kind)))?;

    tracing::info!(
        class = %kind,
        class_hash = format!("{:#066x}", class_hash),
        tx_hash = format!("{:#066x}", tx_hash),
        "Class declared"
    );

    Ok(declared(DeclareOutcome::Declared { tx_hash }))
}
