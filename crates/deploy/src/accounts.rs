//! Signing accounts used by the deployment pipelines.

use anyhow::Context;
use starknet::core::types::Felt;

use crate::config::{ResolvedConfig, Settings};

/// Address and private key of a Starknet account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    pub address: Felt,
    pub private_key: Felt,
}

/// Pre-funded accounts of `starknet-devnet --seed 0`.
///
/// - deployer: signs every declare, deploy and invoke on local and fork targets.
/// - user1, user2: test wallets for the web app.
#[derive(Debug, Clone)]
pub struct DevnetAccounts {
    pub deployer: AccountInfo,
    pub user1: AccountInfo,
    pub user2: AccountInfo,
}

/// The deterministic devnet accounts.
pub const DEVNET_ACCOUNTS: DevnetAccounts = DevnetAccounts {
    deployer: AccountInfo {
        address: Felt::from_hex_unchecked(
            "0x064b48806902a367c8598f4f95c305e8c1a1acba5f082d294a43793113115691",
        ),
        private_key: Felt::from_hex_unchecked("0x71d7bb07b9a64f6f78ac4c816aff4da9"),
    },
    user1: AccountInfo {
        address: Felt::from_hex_unchecked(
            "0x078662e7352d062084b0010068b99288486c2d8b914f6e2a55ce945f8792c8b1",
        ),
        private_key: Felt::from_hex_unchecked("0x0e1406455b7d66b1690803be066cbe5e"),
    },
    user2: AccountInfo {
        address: Felt::from_hex_unchecked(
            "0x049dfb8ce986e21d354ac93ea65e6a11f639c1934ea253e5ff14ca62eca0f38e",
        ),
        private_key: Felt::from_hex_unchecked("0xa20a02f0ac53692d144b20cb371a60d7"),
    },
};

/// Resolve the account that signs deployments for the active environment.
///
/// Local and fork targets use the pre-funded devnet deployer. Remote targets require
/// `DEPLOYER_ADDRESS` and `DEPLOYER_PRIVATE_KEY`.
pub fn resolve_deployer(config: &ResolvedConfig, settings: &Settings) -> anyhow::Result<AccountInfo> {
    if config.is_local {
        return Ok(DEVNET_ACCOUNTS.deployer.clone());
    }

    let (Some(address), Some(private_key)) = (
        settings.deployer_address.as_deref().filter(|s| !s.is_empty()),
        settings.deployer_private_key.as_deref().filter(|s| !s.is_empty()),
    ) else {
        anyhow::bail!(
            "DEPLOYER_ADDRESS and DEPLOYER_PRIVATE_KEY must be set for {} deployments",
            config.environment
        );
    };

    Ok(AccountInfo {
        address: parse_felt(address).context("Invalid DEPLOYER_ADDRESS")?,
        private_key: parse_felt(private_key).context("Invalid DEPLOYER_PRIVATE_KEY")?,
    })
}

/// Parse a `0x`-prefixed hex felt.
pub fn parse_felt(value: &str) -> anyhow::Result<Felt> {
    if !value.starts_with("0x") {
        anyhow::bail!("Expected a 0x-prefixed hex value, got '{}'", value);
    }
    Felt::from_hex(value).map_err(|e| anyhow::anyhow!("Invalid hex value '{}': {}", value, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote_settings() -> Settings {
        Settings {
            deploy_env: Some("sepolia".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_local_uses_devnet_deployer() {
        let settings = Settings::default();
        let config = ResolvedConfig::resolve(&settings);
        let deployer = resolve_deployer(&config, &settings).unwrap();
        assert_eq!(deployer, DEVNET_ACCOUNTS.deployer);
    }

    #[test]
    fn test_remote_requires_credentials() {
        let settings = remote_settings();
        let config = ResolvedConfig::resolve(&settings);
        let err = resolve_deployer(&config, &settings).unwrap_err();
        assert!(err.to_string().contains("DEPLOYER_ADDRESS"));
    }

    #[test]
    fn test_remote_with_credentials() {
        let settings = Settings {
            deployer_address: Some("0x1234".to_string()),
            deployer_private_key: Some("0xabcd".to_string()),
            ..remote_settings()
        };
        let config = ResolvedConfig::resolve(&settings);
        let deployer = resolve_deployer(&config, &settings).unwrap();
        assert_eq!(deployer.address, Felt::from(0x1234u64));
        assert_eq!(deployer.private_key, Felt::from(0xabcdu64));
    }

    #[test]
    fn test_parse_felt_rejects_non_hex() {
        assert!(parse_felt("1234").is_err());
        assert!(parse_felt("0xZZ").is_err());
        assert!(parse_felt("0x0").is_ok());
    }
}
