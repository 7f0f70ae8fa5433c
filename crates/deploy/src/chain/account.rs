//! [`ChainClient`] backed by a starknet-rs single-owner account over JSON-RPC.

use std::time::Duration;

use anyhow::Context;
use backon::{ConstantBuilder, Retryable};
use starknet::{
    accounts::{
        Account, AccountError, ConnectedAccount, ExecutionEncoding, SingleOwnerAccount,
    },
    contract::ContractFactory,
    core::types::{
        BlockId, BlockTag, Call, ExecutionResult, Felt, FunctionCall, StarknetError,
        TransactionFinalityStatus,
    },
    providers::{JsonRpcClient, Provider, ProviderError, jsonrpc::HttpTransport},
    signers::{LocalWallet, SigningKey},
};
use url::Url;

use super::{ChainClient, ChainError, DeployedInstance};
use crate::{accounts::AccountInfo, artifacts::PreparedClass};

/// How long a transaction may take to reach finality before the wait gives up.
pub const FINALITY_TIMEOUT: Duration = Duration::from_secs(300);

/// Interval between receipt polls.
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(1);

type RpcAccount = SingleOwnerAccount<JsonRpcClient<HttpTransport>, LocalWallet>;

/// Deployer account connected to a Starknet node.
pub struct StarknetChain {
    account: RpcAccount,
}

impl StarknetChain {
    /// Connect `signer` to the node at `rpc_url`, signing for `chain_id`.
    pub fn new(rpc_url: &str, chain_id: Felt, signer: &AccountInfo) -> anyhow::Result<Self> {
        let url =
            Url::parse(rpc_url).with_context(|| format!("Invalid RPC URL: {}", rpc_url))?;
        let provider = JsonRpcClient::new(HttpTransport::new(url));
        let wallet =
            LocalWallet::from_signing_key(SigningKey::from_secret_scalar(signer.private_key));

        Ok(Self {
            account: SingleOwnerAccount::new(
                provider,
                wallet,
                signer.address,
                chain_id,
                ExecutionEncoding::New,
            ),
        })
    }
}

fn classify_provider(err: ProviderError) -> ChainError {
    match err {
        ProviderError::StarknetError(StarknetError::ClassAlreadyDeclared) => {
            ChainError::AlreadyExists
        }
        ProviderError::StarknetError(
            StarknetError::ClassHashNotFound | StarknetError::ContractNotFound,
        ) => ChainError::NotFound,
        other => ChainError::fatal(other),
    }
}

fn classify_account<S: std::fmt::Display>(err: AccountError<S>) -> ChainError {
    match err {
        AccountError::Provider(err) => classify_provider(err),
        other => ChainError::fatal(other),
    }
}

impl ChainClient for StarknetChain {
    fn account_address(&self) -> Felt {
        self.account.address()
    }

    async fn chain_id(&self) -> Result<Felt, ChainError> {
        self.account
            .provider()
            .chain_id()
            .await
            .map_err(classify_provider)
    }

    async fn lookup_class(&self, class_hash: Felt) -> Result<(), ChainError> {
        self.account
            .provider()
            .get_class(BlockId::Tag(BlockTag::Latest), class_hash)
            .await
            .map(|_| ())
            .map_err(classify_provider)
    }

    async fn declare(&self, class: &PreparedClass) -> Result<Felt, ChainError> {
        let result = self
            .account
            .declare_v3(class.sierra.clone(), class.compiled_class_hash)
            .send()
            .await
            .map_err(classify_account)?;

        tracing::debug!(
            class = %class.kind,
            tx_hash = format!("{:#066x}", result.transaction_hash),
            "Declare transaction submitted"
        );

        Ok(result.transaction_hash)
    }

    async fn deploy(
        &self,
        class_hash: Felt,
        constructor_calldata: &[Felt],
        salt: Felt,
    ) -> Result<DeployedInstance, ChainError> {
        let factory = ContractFactory::new(class_hash, &self.account);
        let deployment = factory.deploy_v3(constructor_calldata.to_vec(), salt, true);
        let address = deployment.deployed_address();

        let result = deployment.send().await.map_err(classify_account)?;

        Ok(DeployedInstance {
            address,
            tx_hash: result.transaction_hash,
        })
    }

    async fn invoke(&self, calls: Vec<Call>) -> Result<Felt, ChainError> {
        self.account
            .execute_v3(calls)
            .send()
            .await
            .map(|result| result.transaction_hash)
            .map_err(classify_account)
    }

    async fn call(
        &self,
        contract: Felt,
        selector: Felt,
        calldata: Vec<Felt>,
    ) -> Result<Vec<Felt>, ChainError> {
        self.account
            .provider()
            .call(
                FunctionCall {
                    contract_address: contract,
                    entry_point_selector: selector,
                    calldata,
                },
                BlockId::Tag(BlockTag::Latest),
            )
            .await
            .map_err(classify_provider)
    }

    async fn wait_for_finality(&self, tx_hash: Felt) -> Result<(), ChainError> {
        let provider = self.account.provider();
        let max_polls = (FINALITY_TIMEOUT.as_millis() / RECEIPT_POLL_INTERVAL.as_millis()) as usize;

        let poll = || async {
            match provider.get_transaction_receipt(tx_hash).await {
                Ok(receipt) => Ok(receipt),
                Err(ProviderError::StarknetError(StarknetError::TransactionHashNotFound)) => {
                    Err(ChainError::NotFound)
                }
                Err(e) => Err(ChainError::fatal(e)),
            }
        };

        let receipt = poll
            .retry(
                ConstantBuilder::default()
                    .with_delay(RECEIPT_POLL_INTERVAL)
                    .with_max_times(max_polls),
            )
            .sleep(tokio::time::sleep)
            .when(|e| matches!(e, ChainError::NotFound))
            .await
            .map_err(|e| match e {
                ChainError::NotFound => ChainError::Timeout { tx_hash },
                other => other,
            })?;

        if let ExecutionResult::Reverted { reason } = receipt.receipt.execution_result() {
            return Err(ChainError::Reverted {
                tx_hash,
                reason: reason.clone(),
            });
        }

        let status = receipt.receipt.finality_status();
        if !matches!(
            status,
            TransactionFinalityStatus::AcceptedOnL2 | TransactionFinalityStatus::AcceptedOnL1
        ) {
            return Err(ChainError::Fatal(format!(
                "Transaction {:#066x} ended with finality status {:?}",
                tx_hash, status
            )));
        }

        tracing::debug!(tx_hash = format!("{:#066x}", tx_hash), "Transaction accepted");
        Ok(())
    }
}
