//! Environment-scoped record of deployed contracts.
//!
//! One JSON file per environment under the deployments directory. Drivers only mutate it
//! through [`ManifestStore::merge_and_save`], after every step of their run succeeded.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use starknet::core::types::Felt;
use thiserror::Error;

use crate::config::Environment;

/// Logical names of the contracts the pipelines track.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum ContractName {
    Vault,
    Strategy,
    Wbtc,
    VesuPool,
    MockWbtc,
    MockVesuPool,
    MockStrategy,
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error(
        "Manifest {} belongs to environment '{found}', expected '{expected}'",
        path.display()
    )]
    EnvironmentMismatch {
        path: PathBuf,
        expected: Environment,
        found: Environment,
    },

    #[error("Failed to access manifest {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse manifest {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize manifest: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Deployment record of one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentManifest {
    pub environment: Environment,
    /// Last write. Informational only.
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    #[serde(default)]
    pub contracts: BTreeMap<ContractName, Felt>,
    #[serde(default)]
    pub class_hashes: BTreeMap<ContractName, Felt>,
}

impl DeploymentManifest {
    /// An empty manifest stamped with the current time.
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            timestamp: Utc::now(),
            block_number: None,
            contracts: BTreeMap::new(),
            class_hashes: BTreeMap::new(),
        }
    }

    pub fn contract(&self, name: ContractName) -> Option<Felt> {
        self.contracts.get(&name).copied()
    }

    pub fn class_hash(&self, name: ContractName) -> Option<Felt> {
        self.class_hashes.get(&name).copied()
    }
}

/// Entries to fold into a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestUpdate {
    pub contracts: BTreeMap<ContractName, Felt>,
    pub class_hashes: BTreeMap<ContractName, Felt>,
}

impl ManifestUpdate {
    pub fn contract(mut self, name: ContractName, address: Felt) -> Self {
        self.contracts.insert(name, address);
        self
    }

    pub fn class_hash(mut self, name: ContractName, class_hash: Felt) -> Self {
        self.class_hashes.insert(name, class_hash);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty() && self.class_hashes.is_empty()
    }
}

/// Manifests on disk, one `<environment>.json` per environment.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    dir: PathBuf,
}

impl ManifestStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the manifest for `environment`.
    pub fn path(&self, environment: Environment) -> PathBuf {
        self.dir.join(format!("{}.json", environment))
    }

    /// Load the manifest of `environment`, or `None` if nothing was deployed there yet.
    pub fn load(
        &self,
        environment: Environment,
    ) -> Result<Option<DeploymentManifest>, ManifestError> {
        let path = self.path(environment);

        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path).map_err(|source| ManifestError::Io {
            path: path.clone(),
            source,
        })?;

        let manifest: DeploymentManifest =
            serde_json::from_str(&content).map_err(|source| ManifestError::Parse {
                path: path.clone(),
                source,
            })?;

        if manifest.environment != environment {
            return Err(ManifestError::EnvironmentMismatch {
                path,
                expected: environment,
                found: manifest.environment,
            });
        }

        tracing::debug!(path = %path.display(), "Manifest loaded");
        Ok(Some(manifest))
    }

    /// Replace the manifest of `manifest.environment` as a whole.
    ///
    /// The content is written to a sibling `.tmp` file and renamed over the target, so a
    /// reader sees either the previous or the new manifest.
    pub fn save(&self, manifest: &DeploymentManifest) -> Result<(), ManifestError> {
        let path = self.path(manifest.environment);
        let io_error = |source| ManifestError::Io {
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(&self.dir).map_err(io_error)?;

        let content = serde_json::to_string_pretty(manifest)?;

        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, content + "\n").map_err(io_error)?;
        std::fs::rename(&tmp, &path).map_err(io_error)?;

        tracing::info!(path = %path.display(), "Manifest saved");
        Ok(())
    }

    /// Merge `update` into the manifest of `environment` and persist the result.
    ///
    /// New keys overwrite existing ones and every other key is kept. A missing manifest is
    /// created on the fly.
    pub fn merge_and_save(
        &self,
        environment: Environment,
        update: ManifestUpdate,
    ) -> Result<DeploymentManifest, ManifestError> {
        let mut manifest = self
            .load(environment)?
            .unwrap_or_else(|| DeploymentManifest::new(environment));

        manifest.contracts.extend(update.contracts);
        manifest.class_hashes.extend(update.class_hashes);
        manifest.timestamp = Utc::now();

        self.save(&manifest)?;
        Ok(manifest)
    }
}
