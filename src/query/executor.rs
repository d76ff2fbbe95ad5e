use super::{QueryError, QueryRunner};
use crate::config::QueryEngineConfig;
use crate::observability::MetricsRecorder;
use crate::workspace::WorkspaceLocation;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};

/// Upper bound on diagnostic text carried in errors
const MAX_DIAGNOSTIC_BYTES: usize = 4096;

/// How the engine is invoked: `<binary> <subcommand> <output_flag> <format>
/// <workspace_flag> <path> -- <query>`
#[derive(Debug, Clone)]
pub struct EngineCommand {
    pub binary: String,
    pub subcommand: String,
    pub output_flag: String,
    pub output_format: String,
    pub workspace_flag: String,
}

impl EngineCommand {
    /// Argument vector, one element per argument. The query is always the
    /// final element, after `--`, and is never parsed by a shell.
    pub fn args(&self, workspace: &Path, query: &str) -> Vec<OsString> {
        vec![
            OsString::from(&self.subcommand),
            OsString::from(&self.output_flag),
            OsString::from(&self.output_format),
            OsString::from(&self.workspace_flag),
            workspace.as_os_str().to_os_string(),
            OsString::from("--"),
            OsString::from(query),
        ]
    }
}

impl From<&QueryEngineConfig> for EngineCommand {
    fn from(config: &QueryEngineConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            subcommand: config.subcommand.clone(),
            output_flag: config.output_flag.clone(),
            output_format: config.output_format.clone(),
            workspace_flag: config.workspace_flag.clone(),
        }
    }
}

/// Runs the engine as a child process with a hard timeout.
///
/// On unix the engine leads its own process group. The whole group is killed
/// when the timeout fires or when the calling request is dropped mid-flight,
/// so helper processes the engine started do not outlive it.
pub struct ProcessQueryExecutor {
    command: EngineCommand,
    timeout: Duration,
}

impl ProcessQueryExecutor {
    pub fn new(command: EngineCommand, timeout: Duration) -> Self {
        Self { command, timeout }
    }

    pub fn from_config(config: &QueryEngineConfig) -> Self {
        Self::new(
            EngineCommand::from(config),
            Duration::from_secs(config.timeout_seconds),
        )
    }

    async fn run(
        &self,
        query: &str,
        workspace: &WorkspaceLocation,
    ) -> Result<serde_json::Value, QueryError> {
        if query.trim().is_empty() {
            return Err(QueryError::EmptyQuery);
        }

        let workspace_exists = tokio::fs::metadata(workspace.path())
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false);
        if !workspace_exists {
            return Err(QueryError::WorkspaceNotFound {
                path: workspace.path().to_path_buf(),
            });
        }

        tracing::debug!(query = %query, "Query text");

        let mut command = Command::new(&self.command.binary);
        command
            .args(self.command.args(workspace.path(), query))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|e| QueryError::ProcessExecution {
            exit_code: None,
            diagnostics: format!("failed to spawn {}: {}", self.command.binary, e),
            timeout: None,
        })?;
        let mut group = ProcessGroupGuard::new(&child);

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let collected = tokio::time::timeout(self.timeout, async {
            tokio::join!(read_pipe(stdout), read_pipe(stderr), child.wait())
        })
        .await;

        let output = match collected {
            Ok((Ok(stdout), Ok(stderr), Ok(status))) => {
                group.disarm();
                std::process::Output {
                    status,
                    stdout,
                    stderr,
                }
            }
            Ok((stdout, stderr, status)) => {
                let e = stdout.err().or(stderr.err()).or(status.err());
                return Err(QueryError::ProcessExecution {
                    exit_code: None,
                    diagnostics: format!(
                        "failed to collect engine output: {}",
                        e.map(|e| e.to_string()).unwrap_or_default()
                    ),
                    timeout: None,
                });
            }
            Err(_elapsed) => {
                group.kill();
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "Failed to reap timed out query engine");
                }
                tracing::warn!(
                    timeout_secs = self.timeout.as_secs_f64(),
                    "Query engine timed out; process group killed"
                );
                return Err(QueryError::ProcessExecution {
                    exit_code: None,
                    diagnostics: format!(
                        "query engine did not finish within {:?} and was terminated",
                        self.timeout
                    ),
                    timeout: Some(self.timeout),
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let diagnostics = if stderr.trim().is_empty() {
                truncate(&String::from_utf8_lossy(&output.stdout))
            } else {
                truncate(&stderr)
            };

            return Err(QueryError::ProcessExecution {
                exit_code: output.status.code(),
                diagnostics,
                timeout: None,
            });
        }

        serde_json::from_slice(&output.stdout).map_err(QueryError::OutputParse)
    }
}

#[async_trait]
impl QueryRunner for ProcessQueryExecutor {
    #[tracing::instrument(skip(self, query), fields(workspace = %workspace.path().display()))]
    async fn execute(
        &self,
        query: &str,
        workspace: &WorkspaceLocation,
    ) -> Result<serde_json::Value, QueryError> {
        let start = Instant::now();
        let result = self.run(query, workspace).await;
        let elapsed = start.elapsed().as_secs_f64();

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        MetricsRecorder::record_query_execution(outcome, elapsed);

        match &result {
            Ok(_) => tracing::info!(duration_secs = elapsed, "Query executed"),
            Err(e) => tracing::warn!(duration_secs = elapsed, outcome, error = %e, "Query failed"),
        }

        result
    }
}

/// Kills the engine's process group on drop unless disarmed
struct ProcessGroupGuard {
    pgid: Option<u32>,
}

impl ProcessGroupGuard {
    fn new(child: &Child) -> Self {
        Self { pgid: child.id() }
    }

    /// The engine exited on its own; leave whatever it left behind alone
    fn disarm(&mut self) {
        self.pgid = None;
    }

    fn kill(&mut self) {
        let Some(pgid) = self.pgid.take() else {
            return;
        };

        #[cfg(unix)]
        {
            // SAFETY: killpg has no memory-safety preconditions. The group id
            // is the pid of a child spawned with process_group(0).
            let rc = unsafe { libc::killpg(pgid as libc::pid_t, libc::SIGKILL) };
            if rc != 0 {
                tracing::debug!(
                    pgid,
                    error = %std::io::Error::last_os_error(),
                    "killpg failed"
                );
            }
        }
        #[cfg(not(unix))]
        let _ = pgid;
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

fn truncate(text: &str) -> String {
    let text = text.trim();
    if text.len() <= MAX_DIAGNOSTIC_BYTES {
        return text.to_string();
    }

    let mut end = MAX_DIAGNOSTIC_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...[truncated, total {} bytes]", &text[..end], text.len())
}
