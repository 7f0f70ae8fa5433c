//! Loading of compiled contract classes from the build output directory.
//!
//! Artifacts are read fresh from disk on every call since `scarb build` may rewrite
//! them between invocations.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::de::DeserializeOwned;
use starknet::core::types::{
    Felt, FlattenedSierraClass,
    contract::{CompiledClass, SierraClass},
};
use thiserror::Error;

/// Hint appended to a missing Sierra artifact error.
const SIERRA_HINT: &str = "Run 'scarb build' first.";
/// Hint appended to a missing CASM artifact error.
const CASM_HINT: &str = "Ensure 'casm = true' in Scarb.toml and run 'scarb build'.";

/// Errors raised while loading an artifact.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("{kind} not found: {}\n{hint}", path.display())]
    Missing {
        kind: &'static str,
        path: PathBuf,
        hint: &'static str,
    },

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to compute the class hash of {name}: {message}")]
    Hash { name: String, message: String },
}

/// The contract classes produced by the `hash_yield` Scarb package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum::Display)]
pub enum ContractClassKind {
    Vault,
    LendingStrategyV0,
    MockWBTC,
    MockVesuPool,
    MockStrategy,
}

impl ContractClassKind {
    /// File name of the Sierra contract class.
    pub fn sierra_file(&self) -> String {
        format!("hash_yield_{}.contract_class.json", self)
    }

    /// File name of the compiled (CASM) contract class.
    pub fn casm_file(&self) -> String {
        format!("hash_yield_{}.compiled_contract_class.json", self)
    }
}

/// A contract class ready to be declared.
#[derive(Debug, Clone)]
pub struct PreparedClass {
    pub kind: ContractClassKind,
    /// Content-derived identifier of the Sierra class.
    pub class_hash: Felt,
    /// Hash of the CASM the sequencer must compile the class to.
    pub compiled_class_hash: Felt,
    pub sierra: Arc<FlattenedSierraClass>,
}

/// Source of declarable classes.
pub trait ArtifactSource {
    fn prepare(&self, kind: ContractClassKind) -> Result<PreparedClass, ArtifactError>;
}

/// Artifact loader rooted at a Scarb build output directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load a Sierra contract class.
    pub fn load_compiled(&self, name: &str) -> Result<SierraClass, ArtifactError> {
        self.load_json(name, "Contract artifact", SIERRA_HINT)
    }

    /// Load a CASM compiled contract class.
    pub fn load_assembly(&self, name: &str) -> Result<CompiledClass, ArtifactError> {
        self.load_json(name, "CASM artifact", CASM_HINT)
    }

    fn load_json<T: DeserializeOwned>(
        &self,
        name: &str,
        kind: &'static str,
        hint: &'static str,
    ) -> Result<T, ArtifactError> {
        let path = self.dir.join(name);

        if !path.exists() {
            return Err(ArtifactError::Missing { kind, path, hint });
        }

        let content = std::fs::read_to_string(&path).map_err(|source| ArtifactError::Read {
            path: path.clone(),
            source,
        })?;

        tracing::debug!(path = %path.display(), "Loaded artifact");

        serde_json::from_str(&content).map_err(|source| ArtifactError::Parse { path, source })
    }
}

impl ArtifactSource for ArtifactStore {
    fn prepare(&self, kind: ContractClassKind) -> Result<PreparedClass, ArtifactError> {
        let sierra = self.load_compiled(&kind.sierra_file())?;
        let casm = self.load_assembly(&kind.casm_file())?;

        let hash_error = |message: String| ArtifactError::Hash {
            name: kind.to_string(),
            message,
        };

        let class_hash = sierra.class_hash().map_err(|e| hash_error(e.to_string()))?;
        let compiled_class_hash = casm.class_hash().map_err(|e| hash_error(e.to_string()))?;
        let flattened = sierra.flatten().map_err(|e| hash_error(e.to_string()))?;

        Ok(PreparedClass {
            kind,
            class_hash,
            compiled_class_hash,
            sierra: Arc::new(flattened),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_artifact_file_names() {
        assert_eq!(
            ContractClassKind::Vault.sierra_file(),
            "hash_yield_Vault.contract_class.json"
        );
        assert_eq!(
            ContractClassKind::LendingStrategyV0.casm_file(),
            "hash_yield_LendingStrategyV0.compiled_contract_class.json"
        );
        assert_eq!(
            ContractClassKind::MockWBTC.sierra_file(),
            "hash_yield_MockWBTC.contract_class.json"
        );
    }

    #[test]
    fn test_missing_sierra_artifact() {
        let dir = TempDir::new("artifacts").unwrap();
        let store = ArtifactStore::new(dir.path());

        let err = store
            .load_compiled(&ContractClassKind::Vault.sierra_file())
            .unwrap_err();

        assert!(matches!(err, ArtifactError::Missing { .. }));
        let message = err.to_string();
        assert!(message.contains("Contract artifact not found"));
        assert!(message.contains("scarb build"));
    }

    #[test]
    fn test_missing_casm_artifact_hint() {
        let dir = TempDir::new("artifacts").unwrap();
        let store = ArtifactStore::new(dir.path());

        let err = store
            .load_assembly(&ContractClassKind::Vault.casm_file())
            .unwrap_err();

        assert!(err.to_string().contains("casm = true"));
    }

    #[test]
    fn test_malformed_artifact() {
        let dir = TempDir::new("artifacts").unwrap();
        let name = ContractClassKind::MockWBTC.sierra_file();
        std::fs::write(dir.path().join(&name), "{ not json").unwrap();

        let err = ArtifactStore::new(dir.path())
            .load_compiled(&name)
            .unwrap_err();

        assert!(matches!(err, ArtifactError::Parse { .. }));
    }

    #[test]
    fn test_prepare_fails_fast_on_missing_build() {
        let dir = TempDir::new("artifacts").unwrap();
        let err = ArtifactStore::new(dir.path())
            .prepare(ContractClassKind::MockVesuPool)
            .unwrap_err();

        match err {
            ArtifactError::Missing { path, .. } => {
                assert!(path.ends_with("hash_yield_MockVesuPool.contract_class.json"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
