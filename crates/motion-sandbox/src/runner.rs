//! Renderer subprocess
//!
//! Writes the source into the job workspace, invokes the renderer on the
//! fixed entry point and locates the artifact. Output is captured, never
//! inherited from the service process.

use crate::discover::discover_output;
use crate::error::RenderError;
use crate::quality::RenderQuality;
use crate::state::ExecutionState;
use crate::workspace::JobWorkspace;
use async_trait::async_trait;
use motion_codegen::ENTRY_POINT;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};

const READ_CHUNK: usize = 64 * 1024;

/// Renderer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Renderer executable
    pub program: String,
    /// Arguments placed before the standard ones
    pub extra_args: Vec<String>,
    pub quality: RenderQuality,
    /// Parent of all job workspaces
    pub work_root: PathBuf,
    pub timeout_secs: u64,
    /// Capture budget shared by stdout and stderr
    pub max_output_bytes: usize,
    pub media_extension: String,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            program: "manim".to_string(),
            extra_args: Vec::new(),
            quality: RenderQuality::default(),
            work_root: std::env::temp_dir().join("motion-jobs"),
            timeout_secs: 600,
            max_output_bytes: 1024 * 1024,
            media_extension: "mp4".to_string(),
        }
    }
}

/// Captured renderer output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    /// At least one stream hit its half of the budget
    pub truncated: bool,
}

/// Successful execution
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub output_path: PathBuf,
    /// Wall-clock time of the renderer process
    pub duration: Duration,
    pub output: CapturedOutput,
}

/// Executes scene source inside a job workspace
#[async_trait]
pub trait SceneRenderer: Send + Sync {
    /// Render `source_code` in `workspace`
    async fn run(&self, workspace: &JobWorkspace, source_code: &str) -> Result<ExecutionResult, RenderError>;
}

/// Manim Community Edition command-line renderer
#[derive(Debug, Clone)]
pub struct ManimRenderer {
    config: RendererConfig,
}

impl ManimRenderer {
    #[inline]
    #[must_use]
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    fn command(&self, workspace: &JobWorkspace, source_path: &std::path::Path) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.config.program);
        cmd.args(&self.config.extra_args)
            .arg(self.config.quality.flag())
            .arg("--media_dir")
            .arg(workspace.media_dir())
            .arg(source_path)
            .arg(ENTRY_POINT);

        cmd.current_dir(workspace.path());
        cmd.env_clear();
        if let Some(path) = std::env::var_os("PATH") {
            cmd.env("PATH", path);
        }
        cmd.env("LANG", "C.UTF-8");
        cmd.env("HOME", workspace.path());

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        // own group, so a timeout reaches the encoder subprocesses too
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }

    async fn execute(&self, workspace: &JobWorkspace, source_path: &std::path::Path) -> Result<(CapturedOutput, Duration), RenderError> {
        let started = Instant::now();
        let mut child = self
            .command(workspace, source_path)
            .spawn()
            .map_err(|source| RenderError::Spawn {
                program: self.config.program.clone(),
                source,
            })?;

        let pid = child.id();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let per_stream = self.config.max_output_bytes / 2;
        let timeout = Duration::from_secs(self.config.timeout_secs);

        let waited = tokio::time::timeout(timeout, async {
            let (out, err, status) = tokio::join!(
                read_bounded(stdout, per_stream),
                read_bounded(stderr, per_stream),
                child.wait()
            );
            (out, err, status)
        })
        .await;

        let duration = started.elapsed();
        let Ok(((stdout, out_truncated), (stderr, err_truncated), status)) = waited else {
            kill_process_group(pid);
            if let Err(e) = child.kill().await {
                tracing::warn!("Failed to kill timed out renderer for {}: {}", workspace.job_id(), e);
            }
            return Err(RenderError::TimedOut {
                secs: self.config.timeout_secs,
            });
        };

        let mut output = CapturedOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            truncated: out_truncated || err_truncated,
        };
        if output.truncated {
            output.stderr.push_str("\n[output truncated]");
        }
        tracing::debug!("Renderer stdout for {}: {}", workspace.job_id(), output.stdout);
        tracing::debug!("Renderer stderr for {}: {}", workspace.job_id(), output.stderr);

        let status = status?;
        if !status.success() {
            return Err(RenderError::ProcessFailed {
                exit_status: status.code(),
                captured_stderr: output.stderr,
            });
        }
        Ok((output, duration))
    }
}

#[async_trait]
impl SceneRenderer for ManimRenderer {
    async fn run(&self, workspace: &JobWorkspace, source_code: &str) -> Result<ExecutionResult, RenderError> {
        let job_id = workspace.job_id();
        let mut state = ExecutionState::Pending;

        let source_path = workspace.source_path();
        tokio::fs::write(&source_path, source_code).await?;

        state.advance(ExecutionState::Running)?;
        tracing::info!(
            "Rendering job {} with {} {}",
            job_id,
            self.config.program,
            self.config.quality.flag()
        );

        let attempt = async {
            let (output, duration) = self.execute(workspace, &source_path).await?;
            let output_path = discover_output(
                &workspace.media_dir(),
                job_id,
                self.config.quality,
                &self.config.media_extension,
            )
            .await?;
            Ok::<_, RenderError>(ExecutionResult {
                output_path,
                duration,
                output,
            })
        }
        .await;

        match attempt {
            Ok(result) => {
                state.advance(ExecutionState::Succeeded)?;
                tracing::info!(
                    "Rendered job {} in {:.2}s: {}",
                    job_id,
                    result.duration.as_secs_f64(),
                    result.output_path.display()
                );
                Ok(result)
            }
            Err(e) => {
                state.advance(ExecutionState::Failed)?;
                tracing::warn!("Render failed for job {}: {}", job_id, e);
                Err(e)
            }
        }
    }
}

/// Read a pipe to EOF, keeping at most `limit` bytes
///
/// The renderer keeps writing after the cap is hit, so the pipe is drained
/// rather than closed.
async fn read_bounded<R>(reader: Option<R>, limit: usize) -> (Vec<u8>, bool)
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return (Vec::new(), false);
    };
    let mut buf = Vec::new();
    let mut truncated = false;
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let keep = n.min(limit.saturating_sub(buf.len()));
                buf.extend_from_slice(&chunk[..keep]);
                truncated |= keep < n;
            }
        }
    }
    (buf, truncated)
}

/// Kill the renderer's whole process group (encoders included)
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        tracing::debug!("killpg({}) failed: {}", pid, e);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::WorkspaceRegistry;
    use motion_ledger::JobId;

    /// Renderer config running `sh -c <script>` in place of the real binary.
    ///
    /// Positional parameters seen by the script:
    /// `$1` quality flag, `$2` `--media_dir`, `$3` media dir, `$4` source, `$5` scene
    fn shell(script: &str, root: &std::path::Path) -> RendererConfig {
        RendererConfig {
            program: "sh".to_string(),
            extra_args: vec!["-c".to_string(), script.to_string(), "fake-renderer".to_string()],
            work_root: root.to_path_buf(),
            timeout_secs: 5,
            ..RendererConfig::default()
        }
    }

    const WRITES_VIDEO: &str = r#"stem=$(basename "$4" .py); out="$3/videos/$stem/1080p60"; mkdir -p "$out" && printf 'frames' > "$out/$5.mp4""#;

    async fn workspace(root: &std::path::Path, id: &str) -> JobWorkspace {
        WorkspaceRegistry::new(root)
            .claim(&JobId::parse(id).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn successful_render_finds_artifact() {
        let root = tempfile::tempdir().unwrap();
        let ws = workspace(root.path(), "ok1").await;
        let renderer = ManimRenderer::new(shell(WRITES_VIDEO, root.path()));

        let result = renderer.run(&ws, "from manim import *\n").await.unwrap();

        assert!(result.output_path.ends_with("videos/ok1/1080p60/GeneratedScene.mp4"));
        assert_eq!(std::fs::read(&result.output_path).unwrap(), b"frames");
        assert!(ws.source_path().is_file());
        assert!(result.duration > Duration::ZERO);
    }

    #[tokio::test]
    async fn non_zero_exit_captures_stderr() {
        let root = tempfile::tempdir().unwrap();
        let ws = workspace(root.path(), "fail1").await;
        let renderer = ManimRenderer::new(shell("echo 'NameError: Circl' >&2; exit 3", root.path()));

        let err = renderer.run(&ws, "broken").await.unwrap_err();
        match &err {
            RenderError::ProcessFailed {
                exit_status,
                captured_stderr,
            } => {
                assert_eq!(*exit_status, Some(3));
                assert!(captured_stderr.contains("NameError: Circl"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.diagnostic().contains("NameError"));
    }

    #[tokio::test]
    async fn zero_exit_without_file_is_no_output() {
        let root = tempfile::tempdir().unwrap();
        let ws = workspace(root.path(), "empty1").await;
        let renderer = ManimRenderer::new(shell("exit 0", root.path()));

        let err = renderer.run(&ws, "pass").await.unwrap_err();
        assert!(matches!(err, RenderError::NoOutput { .. }));
    }

    #[tokio::test]
    async fn slow_render_times_out() {
        let root = tempfile::tempdir().unwrap();
        let ws = workspace(root.path(), "slow1").await;
        let mut config = shell("sleep 30", root.path());
        config.timeout_secs = 1;
        let renderer = ManimRenderer::new(config);

        let started = Instant::now();
        let err = renderer.run(&ws, "pass").await.unwrap_err();
        assert!(matches!(err, RenderError::TimedOut { secs: 1 }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn environment_is_cleared() {
        let root = tempfile::tempdir().unwrap();
        let ws = workspace(root.path(), "env1").await;
        std::env::set_var("MOTION_LEAK_CHECK", "secret");
        let renderer = ManimRenderer::new(shell(
            r#"test -z "$MOTION_LEAK_CHECK" && test "$HOME" = "$PWD" || exit 9; stem=$(basename "$4" .py); out="$3/videos/$stem/1080p60"; mkdir -p "$out" && printf x > "$out/s.mp4""#,
            root.path(),
        ));

        assert!(renderer.run(&ws, "pass").await.is_ok());
    }

    #[tokio::test]
    async fn output_capture_is_bounded() {
        let root = tempfile::tempdir().unwrap();
        let ws = workspace(root.path(), "loud1").await;
        let mut config = shell("head -c 100000 /dev/zero | tr '\\0' 'e' >&2; exit 1", root.path());
        config.max_output_bytes = 1024;
        let renderer = ManimRenderer::new(config);

        match renderer.run(&ws, "pass").await.unwrap_err() {
            RenderError::ProcessFailed {
                captured_stderr, ..
            } => {
                assert!(captured_stderr.len() <= 512 + "\n[output truncated]".len());
                assert!(captured_stderr.ends_with("[output truncated]"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn chatty_renderer_still_succeeds() {
        let root = tempfile::tempdir().unwrap();
        let ws = workspace(root.path(), "chatty1").await;
        // a closed pipe would fail the write, like Python's BrokenPipeError
        let script = format!("head -c 200000 /dev/zero | tr '\\0' 'p' >&2 || exit 1; {WRITES_VIDEO}");
        let mut config = shell(&script, root.path());
        config.max_output_bytes = 1024;
        let renderer = ManimRenderer::new(config);

        let result = renderer.run(&ws, "pass").await.unwrap();

        assert!(result.output_path.ends_with("videos/chatty1/1080p60/GeneratedScene.mp4"));
        assert!(result.output.truncated);
        assert!(result.output.stderr.len() <= 512 + "\n[output truncated]".len());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_kills_background_children() {
        let root = tempfile::tempdir().unwrap();
        let ws = workspace(root.path(), "spawner1").await;
        let marker = root.path().join("leaked");
        let mut config = shell(r#"(sleep 2; touch "$PWD/../leaked") & sleep 30"#, root.path());
        config.timeout_secs = 1;
        let renderer = ManimRenderer::new(config);

        let err = renderer.run(&ws, "pass").await.unwrap_err();
        assert!(matches!(err, RenderError::TimedOut { secs: 1 }));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let root = tempfile::tempdir().unwrap();
        let ws = workspace(root.path(), "nobin").await;
        let renderer = ManimRenderer::new(RendererConfig {
            program: "/nonexistent/motion-renderer".to_string(),
            work_root: root.path().to_path_buf(),
            ..RendererConfig::default()
        });

        assert!(matches!(
            renderer.run(&ws, "pass").await,
            Err(RenderError::Spawn { .. })
        ));
    }
}
