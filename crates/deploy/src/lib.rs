//! hashyield-deploy - Deployment library for the HashYield Starknet contracts.
//!
//! This crate declares and deploys the HashYield vault, its lending strategy and their
//! local mocks, records the resulting addresses in per-environment manifests, and
//! propagates them to the web app.

pub mod accounts;
pub mod artifacts;
pub mod calldata;
pub mod chain;
pub mod config;
pub mod declare;
pub mod deploy;
pub mod devnet;
pub mod manifest;
pub mod pipeline;
pub mod propagate;
pub mod rpc;

pub use accounts::{AccountInfo, DEVNET_ACCOUNTS, resolve_deployer};
pub use artifacts::{ArtifactError, ArtifactSource, ArtifactStore, ContractClassKind, PreparedClass};
pub use chain::{ChainClient, ChainError, DeployedInstance, StarknetChain};
pub use config::{Environment, ResolvedConfig, Settings};
pub use declare::{DeclareOutcome, DeclaredClass, declare_if_absent};
pub use deploy::{DeployedContractRecord, Deployment, declare_and_deploy};
pub use devnet::{DevnetCmdBuilder, DevnetConfig, DevnetHandle, DevnetMode};
pub use manifest::{ContractName, DeploymentManifest, ManifestError, ManifestStore, ManifestUpdate};
pub use pipeline::{DeployContext, PipelineError, PipelineRun, PipelineState, PipelineStep};
pub use propagate::{SyncReport, sync_to_consumer};
pub use rpc::{ReadinessPolicy, wait_for_ready};
