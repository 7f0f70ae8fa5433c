//! `faucet`: mint MockWBTC to a test wallet.

use starknet::{
    core::types::{Call, Felt},
    macros::selector,
};

use crate::{
    calldata::{decode_u256, encode_u256},
    chain::ChainClient,
    manifest::ContractName,
};

use super::{DeployContext, PipelineError, PipelineRun, PipelineStep, check_readiness};

/// Default mint: 10 WBTC in base units (8 decimals).
pub const DEFAULT_MINT_AMOUNT: u128 = 1_000_000_000;

/// What to mint, and to whom. `None` picks the defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaucetRequest {
    pub recipient: Option<Felt>,
    pub amount: Option<u128>,
}

/// Outcome of a mint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaucetReceipt {
    pub token: Felt,
    pub recipient: Felt,
    pub amount: u128,
    pub balance_before: u128,
    pub balance_after: u128,
    pub tx_hash: Felt,
}

/// Read `owner`'s token balance.
pub async fn balance_of<C: ChainClient>(chain: &C, token: Felt, owner: Felt) -> anyhow::Result<u128> {
    let result = chain
        .call(token, selector!("balance_of"), vec![owner])
        .await
        .map_err(|e| anyhow::Error::new(e).context("balance_of call failed"))?;
    decode_u256(&result)
}

/// Mint MockWBTC from the manifest. Refused on forks, where no mock token exists.
///
/// The manifest is read but never written.
pub async fn run<C, A>(
    ctx: &DeployContext<'_, C, A>,
    request: FaucetRequest,
) -> Result<FaucetReceipt, PipelineError>
where
    C: ChainClient,
{
    let mut run = PipelineRun::new("faucet");
    let recipient = request.recipient.unwrap_or_else(|| ctx.chain.account_address());
    let amount = request.amount.unwrap_or(DEFAULT_MINT_AMOUNT);

    run.step(PipelineStep::ReadinessCheck, check_readiness(ctx))
        .await?;

    let token = run
        .step(PipelineStep::ResolveDependencies, async {
            if ctx.config.is_fork {
                anyhow::bail!(
                    "The faucet only works with mock contracts. \
                     In fork mode, use a mainnet WBTC holder or bridge tokens"
                );
            }

            ctx.manifest()?
                .and_then(|m| m.contract(ContractName::MockWbtc))
                .ok_or_else(|| {
                    anyhow::anyhow!("MockWBTC not deployed. Deploy mocks first: hashyield deploy-mocks")
                })
        })
        .await?;

    let receipt = run
        .step(PipelineStep::Mint, async {
            let balance_before = match balance_of(ctx.chain, token, recipient).await {
                Ok(balance) => balance,
                Err(e) => {
                    tracing::warn!(error = %format!("{e:#}"), "Could not read the balance before minting, assuming 0");
                    0
                }
            };

            tracing::info!(
                recipient = format!("{:#066x}", recipient),
                amount,
                "Minting MockWBTC..."
            );

            let mut calldata = vec![recipient];
            calldata.extend(encode_u256(amount));

            let tx_hash = ctx
                .chain
                .invoke(vec![Call {
                    to: token,
                    selector: selector!("mint"),
                    calldata,
                }])
                .await
                .map_err(|e| {
                    anyhow::Error::new(e).context(
                        "Failed to submit mint. MockWBTC must expose \
                         mint(to: ContractAddress, amount: u256)",
                    )
                })?;

            ctx.chain
                .wait_for_finality(tx_hash)
                .await
                .map_err(|e| anyhow::Error::new(e).context("Mint did not succeed"))?;

            let balance_after = balance_of(ctx.chain, token, recipient).await?;

            Ok(FaucetReceipt {
                token,
                recipient,
                amount,
                balance_before,
                balance_after,
                tx_hash,
            })
        })
        .await?;

    run.finish();
    Ok(receipt)
}
