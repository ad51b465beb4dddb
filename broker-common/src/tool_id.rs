//! Canonical tool identifiers shared by every crate in the broker.
//!
//! A [`ToolId`] names a single upstream-local tool as `mcp__<server>__<tool>`,
//! where each segment matches `[a-z0-9_]+`. Parsing is total: any string that
//! doesn't fit the shape is rejected at the boundary rather than accepted and
//! failing later deep in the pool or breaker.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

const PREFIX: &str = "mcp__";
const SEP: &str = "__";

/// A parsed `mcp__<server>__<tool>` identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ToolId {
    server: String,
    tool: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error(
    "invalid tool id '{0}': expected 'mcp__<server>__<tool>' with [a-z0-9_]+ segments"
)]
pub struct ToolIdParseError(pub String);

impl ToolId {
    pub fn new(server: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            tool: tool.into(),
        }
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// Parse `mcp__<server>__<tool>`. The server segment is everything up to the
    /// last `__`, so upstream-local tool names may themselves contain `_`.
    pub fn parse(raw: &str) -> Result<Self, ToolIdParseError> {
        let err = || ToolIdParseError(raw.to_string());

        let rest = raw.strip_prefix(PREFIX).ok_or_else(err)?;
        let (server, tool) = rest.rsplit_once(SEP).ok_or_else(err)?;

        if !is_valid_segment(server) || !is_valid_segment(tool) {
            return Err(err());
        }

        Ok(Self {
            server: server.to_string(),
            tool: tool.to_string(),
        })
    }
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PREFIX}{}{SEP}{}", self.server, self.tool)
    }
}

impl TryFrom<String> for ToolId {
    type Error = ToolIdParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ToolId> for String {
    fn from(value: ToolId) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_id() {
        let id = ToolId::parse("mcp__zen__codereview").unwrap();
        assert_eq!(id.server(), "zen");
        assert_eq!(id.tool(), "codereview");
        assert_eq!(id.to_string(), "mcp__zen__codereview");
    }

    #[test]
    fn tool_segment_may_contain_underscores() {
        let id = ToolId::parse("mcp__filesystem__read_file").unwrap();
        assert_eq!(id.server(), "filesystem");
        assert_eq!(id.tool(), "read_file");
    }

    #[test]
    fn rejects_missing_prefix() {
        assert!(ToolId::parse("zen__codereview").is_err());
    }

    #[test]
    fn rejects_missing_segment() {
        assert!(ToolId::parse("mcp__zen").is_err());
    }

    #[test]
    fn rejects_uppercase() {
        assert!(ToolId::parse("mcp__Zen__codereview").is_err());
    }

    #[test]
    fn rejects_empty_segment() {
        assert!(ToolId::parse("mcp____codereview").is_err());
    }

    #[test]
    fn round_trips_through_display() {
        let id = ToolId::new("fetcher", "fetch");
        let reparsed = ToolId::parse(&id.to_string()).unwrap();
        assert_eq!(id, reparsed);
    }
}
