//! `inspect`: read-only report of the deployed contracts.

use starknet::{core::types::Felt, macros::selector};

use crate::{
    calldata::{decode_string, decode_u256, felt_to_u128},
    chain::ChainClient,
    manifest::{ContractName, DeploymentManifest},
};

use super::{DeployContext, check_readiness};

/// How to render a view's return data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewOutput {
    U256,
    Integer,
    Text,
    Address,
}

/// A view function to query.
#[derive(Debug, Clone, Copy)]
pub struct View {
    pub name: &'static str,
    pub selector: Felt,
    pub output: ViewOutput,
}

const fn view(name: &'static str, selector: Felt, output: ViewOutput) -> View {
    View {
        name,
        selector,
        output,
    }
}

const VAULT_VIEWS: &[View] = &[
    view("total_assets", selector!("total_assets"), ViewOutput::U256),
    view("total_supply", selector!("total_supply"), ViewOutput::U256),
    view("name", selector!("name"), ViewOutput::Text),
    view("symbol", selector!("symbol"), ViewOutput::Text),
    view("decimals", selector!("decimals"), ViewOutput::Integer),
    view("current_strategy", selector!("current_strategy"), ViewOutput::Address),
];

const TOKEN_VIEWS: &[View] = &[
    view("name", selector!("name"), ViewOutput::Text),
    view("symbol", selector!("symbol"), ViewOutput::Text),
    view("total_supply", selector!("total_supply"), ViewOutput::U256),
];

const STRATEGY_VIEWS: &[View] = &[
    view("vault", selector!("vault"), ViewOutput::Address),
    view("asset", selector!("asset"), ViewOutput::Address),
    view("total_assets", selector!("total_assets"), ViewOutput::U256),
];

/// Contracts covered by the report, in display order.
pub const INSPECTED: &[(ContractName, &[View])] = &[
    (ContractName::Vault, VAULT_VIEWS),
    (ContractName::Wbtc, TOKEN_VIEWS),
    (ContractName::Strategy, STRATEGY_VIEWS),
];

/// Result of one view call. Failures are kept as text rather than aborting the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewReading {
    pub view: &'static str,
    pub value: Result<String, String>,
}

/// Readings of one contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractReport {
    pub name: ContractName,
    /// `None` when the manifest has no address for `name`.
    pub address: Option<Felt>,
    pub readings: Vec<ViewReading>,
}

/// Full inspection report.
#[derive(Debug, Clone)]
pub struct InspectionReport {
    pub chain_id: Felt,
    pub manifest: DeploymentManifest,
    pub contracts: Vec<ContractReport>,
}

fn render(output: ViewOutput, data: &[Felt]) -> anyhow::Result<String> {
    match output {
        ViewOutput::U256 => Ok(decode_u256(data)?.to_string()),
        ViewOutput::Text => decode_string(data),
        ViewOutput::Integer => match data.first() {
            Some(value) => Ok(felt_to_u128(value)?.to_string()),
            None => anyhow::bail!("Empty result"),
        },
        ViewOutput::Address => match data.first() {
            Some(value) => Ok(format!("{:#066x}", value)),
            None => anyhow::bail!("Empty result"),
        },
    }
}

/// Query every view of `views` on `address`.
pub async fn read_views<C: ChainClient>(chain: &C, address: Felt, views: &[View]) -> Vec<ViewReading> {
    let mut readings = Vec::with_capacity(views.len());

    for v in views {
        let value = match chain.call(address, v.selector, vec![]).await {
            Ok(data) => render(v.output, &data).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        if let Err(e) = &value {
            tracing::warn!(
                address = format!("{:#066x}", address),
                view = v.name,
                error = %e,
                "View call failed"
            );
        }

        readings.push(ViewReading {
            view: v.name,
            value,
        });
    }

    readings
}

/// Read the state of every deployed contract of the active environment.
pub async fn run<C, A>(ctx: &DeployContext<'_, C, A>) -> anyhow::Result<InspectionReport>
where
    C: ChainClient,
{
    check_readiness(ctx).await?;

    let manifest = ctx.manifest()?.ok_or_else(|| {
        anyhow::anyhow!(
            "No deployment manifest for environment '{}'. Deploy first: hashyield deploy-all",
            ctx.environment()
        )
    })?;

    let chain_id = ctx
        .chain
        .chain_id()
        .await
        .map_err(|e| anyhow::Error::new(e).context("Failed to query chain id"))?;

    let mut contracts = Vec::with_capacity(INSPECTED.len());
    for (name, views) in INSPECTED {
        let address = manifest.contract(*name);
        let readings = match address {
            Some(address) => read_views(ctx.chain, address, views).await,
            None => Vec::new(),
        };

        contracts.push(ContractReport {
            name: *name,
            address,
            readings,
        });
    }

    Ok(InspectionReport {
        chain_id,
        manifest,
        contracts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calldata::encode_byte_array;

    #[test]
    fn test_render_outputs() {
        assert_eq!(
            render(ViewOutput::U256, &[Felt::from(1500u64), Felt::ZERO]).unwrap(),
            "1500"
        );
        assert_eq!(
            render(ViewOutput::Text, &encode_byte_array("hyBTC")).unwrap(),
            "hyBTC"
        );
        assert_eq!(render(ViewOutput::Integer, &[Felt::from(8u64)]).unwrap(), "8");
        assert!(render(ViewOutput::Address, &[Felt::ONE]).unwrap().starts_with("0x000"));
        assert!(render(ViewOutput::Integer, &[]).is_err());
    }
}
