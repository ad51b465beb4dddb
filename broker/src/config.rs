//! `{mcpServers: {...}}` configuration loading, per §6/§10.3.
//!
//! `#[serde(alias = "mcpServers")]` top-level shape with `~`-expansion,
//! extended with `%USERPROFILE%`/`%APPDATA%` and later-overrides-earlier
//! merging across multiple config files.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use broker_core::UpstreamConfig;

/// Top-level `mcp.json`-style document. Unknown top-level keys are
/// rejected; unknown keys inside a server entry are tolerated, since
/// upstream server configs commonly carry tool-specific extras.
#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct McpConfigDocument {
    #[serde(alias = "mcpServers", default)]
    pub servers: HashMap<String, ServerEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ServerEntry {
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Expands `~`, `%USERPROFILE%`, and `%APPDATA%` via plain string
/// substitution (no shell invocation), per §10.3.
pub fn expand_path(raw: &str) -> String {
    let mut expanded = raw.to_string();

    if expanded.starts_with("~/") || expanded == "~" {
        if let Some(home) = dirs::home_dir() {
            expanded = expanded.replacen('~', &home.to_string_lossy(), 1);
        }
    }

    if expanded.contains("%USERPROFILE%")
        && let Some(home) = dirs::home_dir()
    {
        expanded = expanded.replace("%USERPROFILE%", &home.to_string_lossy());
    }

    if expanded.contains("%APPDATA%")
        && let Some(appdata) = dirs::config_dir()
    {
        expanded = expanded.replace("%APPDATA%", &appdata.to_string_lossy());
    }

    expanded
}

/// Parses one config document's raw text into `(name, UpstreamConfig)`
/// pairs. Entries missing `command` are skipped with a warning; their
/// name is still returned so the caller can log which server was
/// dropped.
fn parse_document(raw: &str) -> Result<Vec<(String, Option<UpstreamConfig>)>> {
    let document: McpConfigDocument =
        serde_json::from_str(raw).context("failed to parse mcp config document")?;

    Ok(document
        .servers
        .into_iter()
        .map(|(name, entry)| {
            let Some(command) = entry.command else {
                return (name, None);
            };
            let config = UpstreamConfig {
                name: name.clone(),
                command: expand_path(&command),
                args: entry.args.iter().map(|a| expand_path(a)).collect(),
                env: entry.env,
            };
            (name, Some(config))
        })
        .collect())
}

/// Loads and merges one or more config file paths, in order, later
/// overriding earlier by server name. Missing `command` entries are
/// skipped with a `tracing::warn!` line.
pub fn load_configs(paths: &[impl AsRef<Path>]) -> Result<HashMap<String, UpstreamConfig>> {
    let mut merged = HashMap::new();

    for path in paths {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read mcp config at {}", path.display()))?;

        for (name, config) in parse_document(&raw)? {
            match config {
                Some(config) => {
                    merged.insert(name, config);
                }
                None => {
                    tracing::warn!(server = %name, path = %path.display(), "skipping server entry with no command");
                }
            }
        }
    }

    Ok(merged)
}
