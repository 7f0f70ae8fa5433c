//! Propagation of manifest addresses into the web app's address table.
//!
//! The table is a hand-maintained TypeScript file with one block per environment:
//!
//! ```text
//! export const CONTRACT_ADDRESSES = {
//!   local: {
//!     vault: "0x...",
//!     wbtc: "0x...",
//!   },
//!   sepolia: { ... },
//! } as const;
//! ```
//!
//! Values are substituted in place so comments and formatting survive. Entries that
//! cannot be located are reported rather than treated as errors.

use std::{ops::Range, path::Path};

use anyhow::Context;
use regex::Regex;
use starknet::core::types::Felt;

use crate::{
    config::Environment,
    manifest::{ContractName, DeploymentManifest},
};

/// Manifest entries mirrored in the address table, with their key in the table.
pub const CONSUMER_KEYS: &[(ContractName, &str)] = &[
    (ContractName::Vault, "vault"),
    (ContractName::Wbtc, "wbtc"),
    (ContractName::VesuPool, "vesu"),
];

/// A value rewritten in the address table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncChange {
    pub key: String,
    pub previous: Option<Felt>,
    pub address: Felt,
}

/// Outcome of a sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Block of the table that was targeted.
    pub block: String,
    pub updated: Vec<SyncChange>,
    pub unchanged: Vec<String>,
    /// Keys with no matching entry (or no matching block at all).
    pub missing: Vec<String>,
}

impl SyncReport {
    pub fn is_changed(&self) -> bool {
        !self.updated.is_empty()
    }
}

/// Block of the address table that holds `environment`'s addresses.
///
/// A forked devnet is served to the web app as `local`.
pub fn consumer_block(environment: Environment) -> Environment {
    match environment {
        Environment::Fork => Environment::Local,
        other => other,
    }
}

/// Rewrite the address table at `path` from `manifest`.
///
/// The file is only written when at least one value changed.
pub fn sync_to_consumer(path: &Path, manifest: &DeploymentManifest) -> anyhow::Result<SyncReport> {
    if !path.exists() {
        anyhow::bail!("Web addresses file not found: {}", path.display());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let updates: Vec<(&str, Felt)> = CONSUMER_KEYS
        .iter()
        .filter_map(|(name, key)| manifest.contract(*name).map(|address| (*key, address)))
        .collect();

    let block = consumer_block(manifest.environment).to_string();
    let (rewritten, report) = substitute_addresses(&content, &block, &updates)?;

    if report.is_changed() {
        std::fs::write(path, rewritten)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!(
            path = %path.display(),
            updated = report.updated.len(),
            "Address table updated"
        );
    } else {
        tracing::info!(path = %path.display(), "Address table already up to date");
    }

    Ok(report)
}

/// Substitute `updates` inside the `block` section of `content`.
///
/// Only the first `key: "0x..."` entry of each key within the block is replaced.
pub fn substitute_addresses(
    content: &str,
    block: &str,
    updates: &[(&str, Felt)],
) -> anyhow::Result<(String, SyncReport)> {
    let mut report = SyncReport {
        block: block.to_string(),
        ..Default::default()
    };

    let Some(range) = find_block(content, block)? else {
        tracing::warn!(block = %block, "No matching block in the address table");
        report.missing = updates.iter().map(|(key, _)| key.to_string()).collect();
        return Ok((content.to_string(), report));
    };

    let mut body = content[range.clone()].to_string();

    for (key, address) in updates {
        let entry = Regex::new(&format!(
            r#"(\b{}\s*:\s*)"(0x[0-9a-fA-F]+)""#,
            regex::escape(key)
        ))?;

        let Some(caps) = entry.captures(&body) else {
            tracing::warn!(block = %block, key = %key, "No matching entry in the address table");
            report.missing.push(key.to_string());
            continue;
        };

        let previous = Felt::from_hex(&caps[2]).ok();
        if previous == Some(*address) {
            report.unchanged.push(key.to_string());
            continue;
        }

        let span = caps.get(0).map(|m| m.range()).unwrap_or_default();
        let replacement = format!("{}\"{:#x}\"", &caps[1], address);
        body.replace_range(span, &replacement);

        tracing::debug!(block = %block, key = %key, address = format!("{:#x}", address), "Updated entry");
        report.updated.push(SyncChange {
            key: key.to_string(),
            previous,
            address: *address,
        });
    }

    let mut rewritten = String::with_capacity(content.len() + body.len());
    rewritten.push_str(&content[..range.start]);
    rewritten.push_str(&body);
    rewritten.push_str(&content[range.end..]);

    Ok((rewritten, report))
}

/// Byte range of the body of `name: { ... }`, braces excluded.
fn find_block(content: &str, name: &str) -> anyhow::Result<Option<Range<usize>>> {
    let opener = Regex::new(&format!(r"\b{}\s*:\s*\{{", regex::escape(name)))?;

    let Some(start) = opener.find(content).map(|m| m.end()) else {
        return Ok(None);
    };

    // Braces inside comments and string literals do not count.
    let mut depth = 1usize;
    let mut chars = content[start..].char_indices().peekable();
    while let Some((offset, c)) = chars.next() {
        match c {
            '/' if chars.next_if(|(_, n)| *n == '/').is_some() => {
                while chars.next_if(|(_, n)| *n != '\n').is_some() {}
            }
            '/' if chars.next_if(|(_, n)| *n == '*').is_some() => {
                let mut prev = ' ';
                for (_, n) in chars.by_ref() {
                    if prev == '*' && n == '/' {
                        break;
                    }
                    prev = n;
                }
            }
            '"' | '\'' | '`' => {
                while let Some((_, n)) = chars.next() {
                    match n {
                        '\\' => {
                            chars.next();
                        }
                        n if n == c => break,
                        _ => {}
                    }
                }
            }
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(Some(start..start + offset));
                }
            }
            _ => {}
        }
    }

    tracing::warn!(block = %name, "Unterminated block in the address table");
    Ok(None)
}
