//! Child process runner for the external tally engine
//!
//! The engine is spawned with no standard input; stdout and stderr are
//! captured and joined into one text. A run that outlives the configured
//! timeout is killed.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tallyboard_core::{
    EngineConfig, EngineOutput, TallyEngine, TallyParams, TallyboardError, TallyboardResult,
};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Runs the engine as a local child process
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    config: EngineConfig,
}

impl ProcessEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Full argument list for a run: configured args, then run parameters
    pub fn command_args(&self, params: &TallyParams) -> Vec<String> {
        let mut args = self.config.args.clone();
        args.extend(params.to_args());
        args
    }

    fn build_command(&self, params: &TallyParams) -> Command {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(self.command_args(params))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }

        cmd
    }
}

/// Join stdout and stderr the way they are reported back to callers
pub fn combine_output(stdout: &[u8], stderr: &[u8]) -> String {
    let stdout = String::from_utf8_lossy(stdout);
    let stderr = String::from_utf8_lossy(stderr);

    if stderr.trim().is_empty() {
        stdout.into_owned()
    } else {
        format!("{stdout}\nSTDERR:\n{stderr}")
    }
}

/// Output collected from one pipe so far
type PipeBuffer = Arc<Mutex<Vec<u8>>>;

/// Time allowed for the pipes to reach EOF once a timed-out engine is killed
const KILL_DRAIN_GRACE: Duration = Duration::from_millis(200);

/// Read a child pipe to EOF, keeping whatever arrived if the task is aborted
fn drain<R>(reader: Option<R>) -> (PipeBuffer, JoinHandle<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buffer = PipeBuffer::default();
    let sink = Arc::clone(&buffer);

    let handle = tokio::spawn(async move {
        let Some(mut reader) = reader else {
            return;
        };
        let mut chunk = [0u8; 4096];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => sink.lock().extend_from_slice(&chunk[..n]),
                Err(e) => {
                    debug!("Engine pipe read failed: {}", e);
                    break;
                }
            }
        }
    });

    (buffer, handle)
}

#[async_trait]
impl TallyEngine for ProcessEngine {
    async fn execute(&self, params: &TallyParams) -> TallyboardResult<EngineOutput> {
        let timeout_duration = Duration::from_secs(self.config.timeout_secs);

        info!(
            "Spawning engine: {} {}",
            self.config.program,
            self.command_args(params).join(" ")
        );

        let mut child = self.build_command(params).spawn().map_err(|e| {
            TallyboardError::engine_failure(
                format!("failed to spawn {}: {}", self.config.program, e),
                String::new(),
            )
        })?;

        let started = Instant::now();
        let (stdout, mut stdout_task) = drain(child.stdout.take());
        let (stderr, mut stderr_task) = drain(child.stderr.take());
        let captured = || combine_output(&stdout.lock(), &stderr.lock());

        let finished = timeout(timeout_duration, async {
            let status = child.wait().await;
            let _ = (&mut stdout_task).await;
            let _ = (&mut stderr_task).await;
            status
        })
        .await;

        match finished {
            Ok(Ok(status)) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                let text = captured();
                let exit_code = status.code().unwrap_or(-1);

                if status.success() {
                    debug!(
                        "Engine exited cleanly after {}ms ({} bytes of output)",
                        elapsed_ms,
                        text.len()
                    );
                    Ok(EngineOutput {
                        text,
                        exit_code,
                        elapsed_ms,
                    })
                } else {
                    warn!("Engine exited with code {}", exit_code);
                    Err(TallyboardError::engine_failure(
                        format!("engine exited with code {}", exit_code),
                        text,
                    ))
                }
            }
            Ok(Err(e)) => Err(TallyboardError::engine_failure(
                format!("failed to wait for engine: {}", e),
                captured(),
            )),
            Err(_) => {
                warn!(
                    "Engine timed out after {}s, killing it",
                    self.config.timeout_secs
                );
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill engine: {}", e);
                }

                // Descendants of the engine may still hold the pipes open
                let _ = timeout(KILL_DRAIN_GRACE, async {
                    if !stdout_task.is_finished() {
                        let _ = (&mut stdout_task).await;
                    }
                    if !stderr_task.is_finished() {
                        let _ = (&mut stderr_task).await;
                    }
                })
                .await;
                stdout_task.abort();
                stderr_task.abort();

                Err(TallyboardError::engine_failure(
                    format!("engine timed out after {}s", self.config.timeout_secs),
                    captured(),
                ))
            }
        }
    }
}
