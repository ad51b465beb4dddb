//! Sandbox runner collaborator contract, per §4.P.
//!
//! The broker core never executes user code itself; it only proxies tool
//! calls. This module defines the interface a sandbox implementation must
//! satisfy and a reference implementation covering the runner's own
//! responsibilities (tempfile integrity, write-path validation,
//! tool-allow-list intersection, blocking remote module imports) while
//! delegating the actual interpreter process to a configured command.
//! Write-path validation canonicalizes the target, then requires it
//! `starts_with` the scope root, falling back to canonicalizing the
//! parent plus lexical normalization for paths that don't exist yet.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::Write;
use tokio::process::Command;

/// What a sandboxed execution needs to run.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionRequest {
    pub code: String,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    pub timeout_ms: u64,
    #[serde(default)]
    pub permissions: Permissions,
}

/// Coarse-grained permissions the runner enforces before handing code to
/// the interpreter.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Permissions {
    /// Paths the interpreter may write under. Empty means no writes
    /// outside the execution's own working directory.
    #[serde(default)]
    pub write_paths: Vec<PathBuf>,
}

/// Outcome of a sandboxed execution. Every failure mode — integrity
/// mismatch, disallowed write path, blocked remote import, interpreter
/// crash — is surfaced here rather than as a propagated error, per §4.P.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    fn ok(output: String) -> Self {
        Self { success: true, output: Some(output), error: None }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self { success: false, output: None, error: Some(message.into()) }
    }
}

/// Injected into the interpreter so user code can reach the per-execution
/// proxy without the sandbox implementation needing to know HTTP details.
#[derive(Debug, Clone)]
pub struct ProxyHandle {
    pub url: String,
    pub token: String,
}

#[async_trait]
pub trait SandboxRunner: Send + Sync {
    async fn run(&self, request: ExecutionRequest, proxy: ProxyHandle) -> ExecutionResult;
}

/// Reference sandbox runner: writes the supplied code to a tempfile,
/// re-reads it to guard against a TOCTOU write, validates declared write
/// paths, intersects the request's `allowedTools` with the server's
/// configured allow-list, and refuses code containing an obvious remote
/// module import before ever spawning the interpreter.
pub struct TempfileSandboxRunner {
    interpreter_command: String,
    interpreter_args: Vec<String>,
    server_allowed_tools: HashSet<String>,
    scope_root: PathBuf,
}

impl TempfileSandboxRunner {
    pub fn new(
        interpreter_command: impl Into<String>,
        interpreter_args: Vec<String>,
        server_allowed_tools: impl IntoIterator<Item = String>,
        scope_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            interpreter_command: interpreter_command.into(),
            interpreter_args,
            server_allowed_tools: server_allowed_tools.into_iter().collect(),
            scope_root: scope_root.into(),
        }
    }

    fn intersect_allowed_tools(&self, requested: &[String]) -> Vec<String> {
        requested
            .iter()
            .filter(|tool| self.server_allowed_tools.contains(*tool))
            .cloned()
            .collect()
    }

    fn contains_remote_import(code: &str) -> bool {
        const MARKERS: &[&str] = &["http://", "https://"];
        code.lines().any(|line| {
            let trimmed = line.trim_start();
            let looks_like_import = trimmed.starts_with("import ")
                || trimmed.starts_with("from ")
                || trimmed.starts_with("require(")
                || trimmed.starts_with("use ");
            looks_like_import && MARKERS.iter().any(|m| trimmed.contains(m))
        })
    }

    async fn validate_write_paths(&self, permissions: &Permissions) -> Result<(), String> {
        let root = tokio::fs::canonicalize(&self.scope_root)
            .await
            .map_err(|e| format!("failed to canonicalize sandbox scope root: {e}"))?;

        for path in &permissions.write_paths {
            let candidate = if path.is_absolute() { path.clone() } else { root.join(path) };
            let resolved = match tokio::fs::canonicalize(&candidate).await {
                Ok(p) => p,
                Err(_) => normalize_lexically(&candidate),
            };
            if !resolved.starts_with(&root) {
                return Err(format!("write path {path:?} is outside the sandbox scope"));
            }
        }
        Ok(())
    }

    async fn write_and_verify(&self, code: &str) -> Result<tempfile::NamedTempFile, String> {
        let mut file =
            tempfile::NamedTempFile::new().map_err(|e| format!("failed to create tempfile: {e}"))?;
        file.write_all(code.as_bytes()).map_err(|e| format!("failed to write tempfile: {e}"))?;
        file.flush().map_err(|e| format!("failed to flush tempfile: {e}"))?;

        let on_disk = tokio::fs::read_to_string(file.path())
            .await
            .map_err(|e| format!("failed to re-read tempfile: {e}"))?;
        if on_disk != code {
            return Err("tempfile integrity check failed: on-disk content diverged from supplied code".to_string());
        }
        Ok(file)
    }
}

fn normalize_lexically(path: &Path) -> PathBuf {
    use std::path::Component;
    let mut stack = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                stack.pop();
            }
            Component::Normal(c) => stack.push(c),
            Component::RootDir => stack.clear(),
            _ => {}
        }
    }
    let mut result = PathBuf::from("/");
    for c in stack {
        result.push(c);
    }
    result
}

#[async_trait]
impl SandboxRunner for TempfileSandboxRunner {
    async fn run(&self, request: ExecutionRequest, proxy: ProxyHandle) -> ExecutionResult {
        if Self::contains_remote_import(&request.code) {
            return ExecutionResult::failed(
                "remote module import blocked: execution integrity check failed",
            );
        }

        if let Err(e) = self.validate_write_paths(&request.permissions).await {
            return ExecutionResult::failed(format!("{e}: execution integrity check failed"));
        }

        let allowed_tools = self.intersect_allowed_tools(&request.allowed_tools);

        let tempfile = match self.write_and_verify(&request.code).await {
            Ok(f) => f,
            Err(e) => return ExecutionResult::failed(e),
        };

        let mut command = Command::new(&self.interpreter_command);
        command
            .args(&self.interpreter_args)
            .arg(tempfile.path())
            .env("BROKER_PROXY_URL", &proxy.url)
            .env("BROKER_PROXY_TOKEN", &proxy.token)
            .env("BROKER_ALLOWED_TOOLS", allowed_tools.join(","));

        let run = tokio::time::timeout(
            Duration::from_millis(request.timeout_ms),
            command.output(),
        )
        .await;

        match run {
            Ok(Ok(output)) if output.status.success() => {
                ExecutionResult::ok(String::from_utf8_lossy(&output.stdout).into_owned())
            }
            Ok(Ok(output)) => ExecutionResult::failed(format!(
                "interpreter exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )),
            Ok(Err(e)) => ExecutionResult::failed(format!("failed to spawn interpreter: {e}")),
            Err(_) => ExecutionResult::failed("execution timed out"),
        }
    }
}
