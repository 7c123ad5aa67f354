//! Vendor CLI execution
//!
//! Adapters shell out to vendor binaries (`vercel`, `wrangler`, `supabase`,
//! `turso`, `aws`, `gh`) to detect tooling and, for AWS, to read state. The
//! [`CommandRunner`] trait keeps that mockable.

use async_trait::async_trait;
use fluorite_core::{FluoriteError, Result};
use std::collections::HashMap;
use std::process::Output;
use tokio::process::Command;
use tracing::{debug, instrument};

/// Output from a vendor command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            success: true,
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            success: false,
        }
    }
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
        }
    }
}

/// Trait for executing vendor commands (allows mocking in tests)
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program args...` with extra environment variables
    async fn exec(&self, program: &str, args: &[&str], envs: &[(String, String)])
        -> Result<CommandOutput>;

    /// Whether `program --version` runs successfully
    async fn is_installed(&self, program: &str) -> bool {
        match self.exec(program, &["--version"], &[]).await {
            Ok(output) => output.success,
            Err(e) => {
                debug!("{} not available: {}", program, e);
                false
            }
        }
    }
}

/// Runs real processes
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    #[instrument(skip(self, envs))]
    async fn exec(
        &self,
        program: &str,
        args: &[&str],
        envs: &[(String, String)],
    ) -> Result<CommandOutput> {
        debug!("Executing {} {:?}", program, args);

        let output = Command::new(program)
            .args(args)
            .envs(envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| FluoriteError::provider(program, format!("Failed to execute: {}", e)))?;

        let output = CommandOutput::from(output);
        if !output.success {
            debug!("{} failed: {}", program, output.stderr.trim());
        }
        Ok(output)
    }
}

/// Canned responses keyed by the full command line
#[derive(Debug, Clone, Default)]
pub struct MockRunner {
    responses: HashMap<String, CommandOutput>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, command: &str, output: CommandOutput) -> Self {
        self.responses.insert(command.to_string(), output);
        self
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn exec(
        &self,
        program: &str,
        args: &[&str],
        _envs: &[(String, String)],
    ) -> Result<CommandOutput> {
        let key = std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        self.responses
            .get(&key)
            .cloned()
            .ok_or_else(|| FluoriteError::provider(program, format!("No mock response for: {}", key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_runner() {
        let runner = MockRunner::new()
            .with_response("vercel --version", CommandOutput::ok("Vercel CLI 33.0.1"));

        let output = runner.exec("vercel", &["--version"], &[]).await.unwrap();
        assert!(output.success);
        assert!(output.stdout.contains("33.0.1"));
        assert!(runner.is_installed("vercel").await);
        assert!(!runner.is_installed("wrangler").await);
    }

    #[tokio::test]
    async fn test_missing_binary_is_not_installed() {
        let runner = SystemRunner;
        assert!(!runner.is_installed("definitely-not-a-real-binary-7f3a").await);
    }
}
