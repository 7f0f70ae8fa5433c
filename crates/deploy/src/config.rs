//! Environment resolution for the deployment toolkit.
//!
//! Settings are layered with figment (defaults, optional TOML file, process environment)
//! and resolved once at process start into a [`ResolvedConfig`] that every component
//! receives explicitly.

use std::path::{Path, PathBuf};

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};
use starknet::core::{chain_id, types::Felt};

/// Default RPC URL for the local devnet (fresh and forked).
pub const DEFAULT_LOCAL_RPC_URL: &str = "http://127.0.0.1:5050";
/// Default public Sepolia RPC URL.
pub const DEFAULT_SEPOLIA_RPC_URL: &str = "https://api.cartridge.gg/x/starknet/sepolia";
/// Default public Mainnet RPC URL.
pub const DEFAULT_MAINNET_RPC_URL: &str = "https://api.cartridge.gg/x/starknet/mainnet";

/// Default location of the contracts package, relative to the working directory.
pub const DEFAULT_CONTRACTS_DIR: &str = "packages/contracts";
/// Default location of the web app's address table.
pub const DEFAULT_WEB_ADDRESSES_PATH: &str = "apps/web/constants/addresses.ts";

/// Environment variables read into [`Settings`].
const SETTINGS_ENV_VARS: &[&str] = &[
    "DEPLOY_ENV",
    "LOCAL_RPC_URL",
    "FORK_RPC_URL",
    "SEPOLIA_RPC_URL",
    "MAINNET_RPC_URL",
    "FORK_BLOCK",
    "DEPLOYER_ADDRESS",
    "DEPLOYER_PRIVATE_KEY",
    "CONTRACTS_DIR",
    "WEB_ADDRESSES_PATH",
];

/// The deployment target.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Environment {
    #[default]
    Local,
    Fork,
    Sepolia,
    Mainnet,
}

impl Environment {
    /// Parse an environment name, falling back to [`Environment::Local`] for anything
    /// that is not one of the four recognized values.
    pub fn parse_or_default(value: Option<&str>) -> Self {
        value
            .and_then(|v| v.parse::<Self>().ok())
            .unwrap_or_default()
    }

    /// The chain id a node serving this environment is expected to report.
    pub fn chain_id(&self) -> Felt {
        match self {
            Environment::Local | Environment::Sepolia => chain_id::SEPOLIA,
            Environment::Fork | Environment::Mainnet => chain_id::MAINNET,
        }
    }
}

/// Fork point as written by the user: a block number or a tag such as `latest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ForkBlock {
    Number(u64),
    Tag(String),
}

/// Raw process-level configuration. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub deploy_env: Option<String>,
    pub local_rpc_url: Option<String>,
    pub fork_rpc_url: Option<String>,
    pub sepolia_rpc_url: Option<String>,
    pub mainnet_rpc_url: Option<String>,
    pub fork_block: Option<ForkBlock>,
    pub deployer_address: Option<String>,
    pub deployer_private_key: Option<String>,
    pub contracts_dir: Option<PathBuf>,
    pub web_addresses_path: Option<PathBuf>,
}

impl Settings {
    /// Load settings from an optional TOML file, overridden by the process environment.
    pub fn load(config_file: Option<&Path>) -> anyhow::Result<Self> {
        let mut figment = Figment::new();

        if let Some(path) = config_file {
            if !path.exists() {
                anyhow::bail!("Configuration file not found: {}", path.display());
            }
            figment = figment.merge(Toml::file(path));
        }

        figment
            .merge(Env::raw().only(SETTINGS_ENV_VARS))
            .extract()
            .context("Failed to load settings")
    }
}

/// The single active deployment target, resolved once at process start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub environment: Environment,
    pub rpc_url: String,
    pub chain_id: Felt,
    pub is_fork: bool,
    pub is_local: bool,
    /// Fork point for fork mode, `None` meaning the latest block.
    pub fork_block: Option<String>,
    /// Upstream RPC URL a forked devnet mirrors.
    pub fork_source_url: String,
    pub contracts_dir: PathBuf,
    pub web_addresses_path: PathBuf,
}

impl ResolvedConfig {
    /// Resolve the active target. Never fails: unknown or missing environments become `local`.
    pub fn resolve(settings: &Settings) -> Self {
        let environment = Environment::parse_or_default(settings.deploy_env.as_deref());

        let or_default = |value: &Option<String>, default: &str| {
            value
                .as_deref()
                .filter(|v| !v.is_empty())
                .unwrap_or(default)
                .to_string()
        };

        let rpc_url = match environment {
            Environment::Local => or_default(&settings.local_rpc_url, DEFAULT_LOCAL_RPC_URL),
            Environment::Fork => or_default(&settings.fork_rpc_url, DEFAULT_LOCAL_RPC_URL),
            Environment::Sepolia => {
                or_default(&settings.sepolia_rpc_url, DEFAULT_SEPOLIA_RPC_URL)
            }
            Environment::Mainnet => {
                or_default(&settings.mainnet_rpc_url, DEFAULT_MAINNET_RPC_URL)
            }
        };

        let fork_block = match &settings.fork_block {
            Some(ForkBlock::Number(n)) => Some(n.to_string()),
            Some(ForkBlock::Tag(tag)) if !tag.is_empty() && tag != "latest" => Some(tag.clone()),
            _ => None,
        };

        Self {
            environment,
            rpc_url,
            chain_id: environment.chain_id(),
            is_fork: environment == Environment::Fork,
            is_local: matches!(environment, Environment::Local | Environment::Fork),
            fork_block,
            fork_source_url: or_default(&settings.mainnet_rpc_url, DEFAULT_MAINNET_RPC_URL),
            contracts_dir: settings
                .contracts_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONTRACTS_DIR)),
            web_addresses_path: settings
                .web_addresses_path
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_WEB_ADDRESSES_PATH)),
        }
    }

    /// Directory holding the compiled contract classes.
    pub fn artifacts_dir(&self) -> PathBuf {
        self.contracts_dir.join("target").join("dev")
    }

    /// Directory holding one manifest per environment.
    pub fn deployments_dir(&self) -> PathBuf {
        self.contracts_dir.join("deployments")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with_env(env: &str) -> Settings {
        Settings {
            deploy_env: Some(env.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_unknown_environment_defaults_to_local() {
        let config = ResolvedConfig::resolve(&settings_with_env("staging"));
        assert_eq!(config.environment, Environment::Local);
        assert!(config.is_local);
        assert!(!config.is_fork);

        let config = ResolvedConfig::resolve(&Settings::default());
        assert_eq!(config.environment, Environment::Local);
        assert_eq!(config.rpc_url, DEFAULT_LOCAL_RPC_URL);
    }

    #[test]
    fn test_fork_is_local_and_fork() {
        let config = ResolvedConfig::resolve(&settings_with_env("fork"));
        assert_eq!(config.environment, Environment::Fork);
        assert!(config.is_fork);
        assert!(config.is_local);
        assert_eq!(config.chain_id, chain_id::MAINNET);
    }

    #[test]
    fn test_remote_environments_are_not_local() {
        for (name, url) in [
            ("sepolia", DEFAULT_SEPOLIA_RPC_URL),
            ("mainnet", DEFAULT_MAINNET_RPC_URL),
        ] {
            let config = ResolvedConfig::resolve(&settings_with_env(name));
            assert!(!config.is_local, "{name} must not be local");
            assert!(!config.is_fork);
            assert_eq!(config.rpc_url, url);
        }
    }

    #[test]
    fn test_rpc_url_override() {
        let settings = Settings {
            deploy_env: Some("sepolia".to_string()),
            sepolia_rpc_url: Some("http://sepolia.example:9545".to_string()),
            local_rpc_url: Some("http://ignored:1".to_string()),
            ..Default::default()
        };
        let config = ResolvedConfig::resolve(&settings);
        assert_eq!(config.rpc_url, "http://sepolia.example:9545");
        assert_eq!(config.chain_id, chain_id::SEPOLIA);
    }

    #[test]
    fn test_fork_block_latest_is_unset() {
        let settings = Settings {
            fork_block: Some(ForkBlock::Tag("latest".to_string())),
            ..settings_with_env("fork")
        };
        assert_eq!(ResolvedConfig::resolve(&settings).fork_block, None);

        let settings = Settings {
            fork_block: Some(ForkBlock::Number(1200000)),
            ..settings_with_env("fork")
        };
        assert_eq!(
            ResolvedConfig::resolve(&settings).fork_block.as_deref(),
            Some("1200000")
        );
    }

    #[test]
    fn test_derived_paths() {
        let settings = Settings {
            contracts_dir: Some(PathBuf::from("/tmp/contracts")),
            ..Default::default()
        };
        let config = ResolvedConfig::resolve(&settings);
        assert_eq!(config.artifacts_dir(), PathBuf::from("/tmp/contracts/target/dev"));
        assert_eq!(config.deployments_dir(), PathBuf::from("/tmp/contracts/deployments"));
    }

    #[test]
    fn test_load_missing_config_file() {
        let err = Settings::load(Some(Path::new("/nonexistent/hashyield.toml"))).unwrap_err();
        assert!(err.to_string().contains("Configuration file not found"));
    }
}
