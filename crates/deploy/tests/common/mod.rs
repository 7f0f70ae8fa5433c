//! In-memory chain and artifact fakes shared by the pipeline tests.

#![allow(dead_code)]

use std::{
    collections::{BTreeSet, HashMap},
    sync::{Arc, Mutex},
    time::Duration,
};

use hashyield_deploy::{
    ArtifactError, ArtifactSource, ChainClient, ChainError, ContractClassKind, DeployContext,
    DeployedInstance, ManifestStore, PreparedClass, ReadinessPolicy, ResolvedConfig, Settings,
    accounts::DEVNET_ACCOUNTS,
    calldata::{decode_u256, encode_u256},
};
use starknet::{
    core::{
        chain_id,
        types::{Call, EntryPointsByType, Felt, FlattenedSierraClass},
    },
    macros::selector,
};
use tempdir::TempDir;

/// Readiness policy short enough for tests.
pub const FAST_READINESS: ReadinessPolicy = ReadinessPolicy::new(3, Duration::from_millis(10));

/// A deploy transaction seen by the fake chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployCall {
    pub class_hash: Felt,
    pub address: Felt,
    pub calldata: Vec<Felt>,
}

#[derive(Debug, Default)]
pub struct ChainState {
    pub offline: bool,
    /// The node accepts requests but never answers a chain-id query.
    pub stalled: bool,
    /// Lookups miss and the declare reports the class as already present.
    pub race_declare: bool,
    /// Deploys of this class revert.
    pub revert_deploys_of: Option<Felt>,
    /// Invoke transactions revert after being accepted.
    pub revert_invokes: bool,
    /// `current_strategy` reports this address instead of the configured one.
    pub wrong_strategy: Option<Felt>,
    pub declared: BTreeSet<Felt>,
    pub deploys: Vec<DeployCall>,
    /// Number of submitted declare, deploy and invoke transactions.
    pub transactions: usize,
    pub strategies: HashMap<Felt, Felt>,
    pub balances: HashMap<(Felt, Felt), u128>,
    reverted: HashMap<Felt, String>,
    nonce: u64,
}

impl ChainState {
    fn next_tx(&mut self) -> Felt {
        self.transactions += 1;
        self.nonce += 1;
        Felt::from(0xf000 + self.nonce)
    }
}

/// Single-account chain held in memory.
#[derive(Debug, Default)]
pub struct MockChain {
    pub state: Mutex<ChainState>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offline() -> Self {
        let chain = Self::new();
        chain.state.lock().unwrap().offline = true;
        chain
    }

    pub fn stalled() -> Self {
        let chain = Self::new();
        chain.state.lock().unwrap().stalled = true;
        chain
    }

    pub fn transactions(&self) -> usize {
        self.state.lock().unwrap().transactions
    }

    pub fn deploys(&self) -> Vec<DeployCall> {
        self.state.lock().unwrap().deploys.clone()
    }

    pub fn strategy_of(&self, vault: Felt) -> Option<Felt> {
        self.state.lock().unwrap().strategies.get(&vault).copied()
    }

    fn check_online(&self) -> Result<(), ChainError> {
        if self.state.lock().unwrap().offline {
            return Err(ChainError::fatal("error sending request: connection refused"));
        }
        Ok(())
    }
}

impl ChainClient for MockChain {
    fn account_address(&self) -> Felt {
        DEVNET_ACCOUNTS.deployer.address
    }

    async fn chain_id(&self) -> Result<Felt, ChainError> {
        self.check_online()?;
        let stalled = self.state.lock().unwrap().stalled;
        if stalled {
            std::future::pending::<()>().await;
        }
        Ok(chain_id::SEPOLIA)
    }

    async fn lookup_class(&self, class_hash: Felt) -> Result<(), ChainError> {
        self.check_online()?;
        let state = self.state.lock().unwrap();
        if !state.race_declare && state.declared.contains(&class_hash) {
            Ok(())
        } else {
            Err(ChainError::NotFound)
        }
    }

    async fn declare(&self, class: &PreparedClass) -> Result<Felt, ChainError> {
        self.check_online()?;
        let mut state = self.state.lock().unwrap();
        if !state.declared.insert(class.class_hash) || state.race_declare {
            return Err(ChainError::AlreadyExists);
        }
        Ok(state.next_tx())
    }

    async fn deploy(
        &self,
        class_hash: Felt,
        constructor_calldata: &[Felt],
        _salt: Felt,
    ) -> Result<DeployedInstance, ChainError> {
        self.check_online()?;
        let mut state = self.state.lock().unwrap();
        if !state.declared.contains(&class_hash) {
            return Err(ChainError::fatal("Class hash not declared"));
        }

        let tx_hash = state.next_tx();
        let address = Felt::from(0xa000 + state.deploys.len() as u64);

        if state.revert_deploys_of == Some(class_hash) {
            state
                .reverted
                .insert(tx_hash, "Constructor failed".to_string());
        } else {
            state.deploys.push(DeployCall {
                class_hash,
                address,
                calldata: constructor_calldata.to_vec(),
            });
        }

        Ok(DeployedInstance { address, tx_hash })
    }

    async fn invoke(&self, calls: Vec<Call>) -> Result<Felt, ChainError> {
        self.check_online()?;
        let mut state = self.state.lock().unwrap();

        for call in &calls {
            if call.selector == selector!("set_strategy") {
                state.strategies.insert(call.to, call.calldata[0]);
            } else if call.selector == selector!("mint") {
                let amount = decode_u256(&call.calldata[1..])
                    .map_err(ChainError::fatal)?;
                *state.balances.entry((call.to, call.calldata[0])).or_default() += amount;
            } else {
                return Err(ChainError::fatal("Entry point not found"));
            }
        }

        let tx_hash = state.next_tx();
        if state.revert_invokes {
            state
                .reverted
                .insert(tx_hash, "Caller is not the owner".to_string());
        }
        Ok(tx_hash)
    }

    async fn call(
        &self,
        contract: Felt,
        selector: Felt,
        calldata: Vec<Felt>,
    ) -> Result<Vec<Felt>, ChainError> {
        self.check_online()?;
        let state = self.state.lock().unwrap();

        if selector == selector!("current_strategy") {
            let strategy = state
                .wrong_strategy
                .or_else(|| state.strategies.get(&contract).copied())
                .unwrap_or(Felt::ZERO);
            Ok(vec![strategy])
        } else if selector == selector!("balance_of") {
            let balance = state
                .balances
                .get(&(contract, calldata[0]))
                .copied()
                .unwrap_or_default();
            Ok(encode_u256(balance).to_vec())
        } else {
            Err(ChainError::fatal("Entry point not found"))
        }
    }

    async fn wait_for_finality(&self, tx_hash: Felt) -> Result<(), ChainError> {
        let state = self.state.lock().unwrap();
        match state.reverted.get(&tx_hash) {
            Some(reason) => Err(ChainError::Reverted {
                tx_hash,
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// Artifact source producing synthetic classes with stable hashes.
#[derive(Debug, Default)]
pub struct FakeArtifacts {
    pub missing: BTreeSet<ContractClassKind>,
}

impl FakeArtifacts {
    pub fn class_hash(kind: ContractClassKind) -> Felt {
        let index = match kind {
            ContractClassKind::Vault => 1u64,
            ContractClassKind::LendingStrategyV0 => 2,
            ContractClassKind::MockWBTC => 3,
            ContractClassKind::MockVesuPool => 4,
            ContractClassKind::MockStrategy => 5,
        };
        Felt::from(0xc1a55000 + index)
    }
}

impl ArtifactSource for FakeArtifacts {
    fn prepare(&self, kind: ContractClassKind) -> Result<PreparedClass, ArtifactError> {
        if self.missing.contains(&kind) {
            return Err(ArtifactError::Missing {
                kind: "Contract artifact",
                path: kind.sierra_file().into(),
                hint: "Run 'scarb build' first.",
            });
        }

        Ok(PreparedClass {
            kind,
            class_hash: Self::class_hash(kind),
            compiled_class_hash: Felt::from(0xca5eu64),
            sierra: Arc::new(FlattenedSierraClass {
                sierra_program: vec![Felt::ONE],
                contract_class_version: "0.1.0".to_string(),
                entry_points_by_type: EntryPointsByType {
                    constructor: vec![],
                    external: vec![],
                    l1_handler: vec![],
                },
                abi: "[]".to_string(),
            }),
        })
    }
}

/// Initialize tracing for tests (idempotent).
pub fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init()
        .ok();
}

/// Workspace with its own contracts directory.
pub struct TestContext {
    pub dir: TempDir,
    pub config: ResolvedConfig,
    pub manifests: ManifestStore,
    pub chain: MockChain,
    pub artifacts: FakeArtifacts,
}

impl TestContext {
    pub fn new(environment: &str) -> Self {
        Self::with_chain(environment, MockChain::new())
    }

    pub fn with_chain(environment: &str, chain: MockChain) -> Self {
        init_test_tracing();

        let dir = TempDir::new("hashyield").unwrap();
        let config = ResolvedConfig::resolve(&Settings {
            deploy_env: Some(environment.to_string()),
            contracts_dir: Some(dir.path().join("contracts")),
            web_addresses_path: Some(dir.path().join("addresses.ts")),
            ..Default::default()
        });
        let manifests = ManifestStore::new(config.deployments_dir());

        Self {
            dir,
            config,
            manifests,
            chain,
            artifacts: FakeArtifacts::default(),
        }
    }

    pub fn ctx(&self) -> DeployContext<'_, MockChain, FakeArtifacts> {
        DeployContext::new(&self.config, &self.chain, &self.artifacts, &self.manifests)
            .with_readiness(FAST_READINESS)
    }
}
