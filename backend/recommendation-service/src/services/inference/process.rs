use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, warn};

use super::{InferenceFailure, InferenceOutcome, InferenceRequest, InferenceRunner};
use crate::models::CandidateItem;

#[derive(Debug, Clone)]
pub struct ProcessSettings {
    pub program: String,
    pub args: Vec<String>,
    pub workdir: Option<PathBuf>,
    pub timeout: Duration,
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["-u".to_string(), "models/recommend_api.py".to_string()],
            workdir: None,
            timeout: Duration::from_secs(120),
        }
    }
}

/// Runs one child process per request: JSON line in on stdin, one JSON
/// line out on stdout.
pub struct ProcessInferenceRunner {
    settings: ProcessSettings,
}

#[derive(Deserialize)]
struct Reply {
    ok: bool,
    items: Option<Vec<ReplyItem>>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct ReplyItem {
    #[serde(rename = "productId")]
    product_id: i64,
    score: Option<f64>,
}

/// Interpret the process's stdout
pub fn parse_reply(stdout: &str) -> InferenceOutcome {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return InferenceOutcome::Failed(InferenceFailure::NoOutput);
    }
    if trimmed.lines().count() > 1 {
        return InferenceOutcome::Failed(InferenceFailure::InvalidJson);
    }

    let reply: Reply = match serde_json::from_str(trimmed) {
        Ok(reply) => reply,
        Err(e) => {
            debug!(error = %e, "Inference reply is not valid JSON");
            return InferenceOutcome::Failed(InferenceFailure::InvalidJson);
        }
    };

    if !reply.ok {
        let reason = reply.error.unwrap_or_else(|| "unknown".to_string());
        return InferenceOutcome::Failed(InferenceFailure::Remote(reason));
    }

    InferenceOutcome::Ok(
        reply
            .items
            .unwrap_or_default()
            .into_iter()
            .map(|i| CandidateItem::scored(i.product_id, i.score.unwrap_or(0.0)))
            .collect(),
    )
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            debug!(error = %e, "Failed to read inference pipe");
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

impl ProcessInferenceRunner {
    pub fn new(settings: ProcessSettings) -> Self {
        Self { settings }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.settings.program);
        command
            .args(&self.settings.args)
            .env("PYTHONUNBUFFERED", "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.settings.workdir {
            command.current_dir(dir);
        }
        // Own process group so the whole tree can be killed on timeout
        #[cfg(unix)]
        command.process_group(0);
        command
    }

    async fn terminate(pid: Option<u32>, child: &mut Child) {
        #[cfg(unix)]
        {
            if let Some(pid) = pid {
                let group = format!("-{pid}");
                if let Err(e) = Command::new("kill")
                    .args(["-s", "KILL", "--", group.as_str()])
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .status()
                    .await
                {
                    debug!(pid = pid, error = %e, "Failed to signal process group");
                }
            }
        }
        #[cfg(not(unix))]
        let _ = pid;

        if let Err(e) = child.kill().await {
            debug!(error = %e, "Inference process already gone");
        }
    }
}

#[async_trait]
impl InferenceRunner for ProcessInferenceRunner {
    async fn run(&self, request: &InferenceRequest) -> InferenceOutcome {
        let payload = match serde_json::to_string(request) {
            Ok(payload) => payload,
            Err(e) => return InferenceOutcome::Failed(InferenceFailure::SpawnFailed(e.to_string())),
        };

        let mut child = match self.command().spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(program = %self.settings.program, error = %e, "Failed to spawn inference process");
                return InferenceOutcome::Failed(InferenceFailure::SpawnFailed(e.to_string()));
            }
        };

        let pid = child.id();
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let exchange = async {
            if let Some(mut stdin) = stdin {
                let line = format!("{payload}\n");
                if let Err(e) = stdin.write_all(line.as_bytes()).await {
                    debug!(error = %e, "Inference process closed stdin early");
                }
            }
            tokio::join!(child.wait(), read_pipe(stdout), read_pipe(stderr))
        };

        match timeout(self.settings.timeout, exchange).await {
            Err(_) => {
                Self::terminate(pid, &mut child).await;
                InferenceOutcome::Failed(InferenceFailure::Timeout)
            }
            Ok((Err(e), _, _)) => InferenceOutcome::Failed(InferenceFailure::SpawnFailed(e.to_string())),
            Ok((Ok(status), stdout, stderr)) => {
                if !stderr.trim().is_empty() {
                    debug!(model = %request.model, stderr = %stderr.trim(), "Inference process stderr");
                }
                if !status.success() {
                    return InferenceOutcome::Failed(match status.code() {
                        Some(code) => InferenceFailure::ExitCode(code),
                        None => InferenceFailure::KilledBySignal,
                    });
                }
                parse_reply(&stdout)
            }
        }
    }
}
