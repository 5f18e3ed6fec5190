//! Judge backed by the `claude` CLI (or a user-supplied command).

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use super::{Judge, JudgeError};

/// Find the claude executable in PATH
pub fn find_claude_executable() -> Option<PathBuf> {
    let candidates = if cfg!(target_os = "windows") {
        vec!["claude.exe", "claude.cmd", "claude.bat"]
    } else {
        vec!["claude"]
    };

    let which_cmd = if cfg!(target_os = "windows") {
        "where"
    } else {
        "which"
    };

    for candidate in candidates {
        if let Ok(output) = Command::new(which_cmd).arg(candidate).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout)
                    .lines()
                    .next()
                    .unwrap_or("")
                    .trim()
                    .to_owned();
                if !path.is_empty() {
                    return Some(PathBuf::from(path));
                }
            }
        }
    }

    // ~/.local/bin is often missing from PATH for non-login shells.
    #[cfg(not(target_os = "windows"))]
    if let Some(home) = std::env::var_os("HOME") {
        let fallback = PathBuf::from(home).join(".local/bin/claude");
        if fallback.is_file() {
            return Some(fallback);
        }
    }

    None
}

/// Runs one CLI process per judgment, prompt piped via stdin.
///
/// `custom_command` replaces the claude CLI entirely; it is split on
/// whitespace and executed without a shell. Only set it from trusted
/// configuration.
#[derive(Debug, Clone)]
pub struct ClaudeCliJudge {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ClaudeCliJudge {
    /// Use the installed claude CLI with `model`.
    pub fn new(model: &str, timeout: Duration) -> Result<Self, JudgeError> {
        let program = find_claude_executable().ok_or(JudgeError::ClaudeNotFound)?;
        Ok(Self {
            program,
            args: vec![
                "--print".to_owned(),
                "--model".to_owned(),
                model.to_owned(),
                "--setting-sources".to_owned(),
                String::new(),
                "--disable-slash-commands".to_owned(),
                "--strict-mcp-config".to_owned(),
            ],
            timeout,
        })
    }

    pub fn with_command(custom_command: &str, timeout: Duration) -> Result<Self, JudgeError> {
        let mut parts = custom_command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| JudgeError::CommandFailed("Custom command is empty".to_owned()))?;
        Ok(Self {
            program: PathBuf::from(program),
            args: parts.map(str::to_owned).collect(),
            timeout,
        })
    }

    async fn run(&self, prompt: &str) -> Result<String, JudgeError> {
        let mut child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env_remove("CLAUDECODE")
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| JudgeError::CommandFailed(format!("{}: {e}", self.program.display())))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .map_err(|e| JudgeError::CommandFailed(format!("Failed to write prompt: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| JudgeError::CommandFailed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(JudgeError::CommandFailed(stderr.trim().to_owned()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if stdout.trim().is_empty() {
            return Err(JudgeError::EmptyResponse);
        }
        Ok(stdout)
    }
}

#[async_trait]
impl Judge for ClaudeCliJudge {
    fn name(&self) -> &str {
        "claude-cli"
    }

    async fn judge(&self, prompt: &str) -> Result<String, JudgeError> {
        tokio::time::timeout(self.timeout, self.run(prompt))
            .await
            .map_err(|_| JudgeError::Timeout(self.timeout))?
    }
}
