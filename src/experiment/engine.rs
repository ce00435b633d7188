//! External engine invocation
//!
//! One [`EngineCommand`] is shared by every scale point of a build. Each
//! invocation owns its child process for the duration of one scale point
//! only: stdout is streamed line by line, stderr is drained concurrently,
//! and the child is reaped on every exit path (success, failure, timeout).

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::parameters::{ParameterValue, ScalePoint};
use crate::{Error, Result};

/// How resolved parameters are handed to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgumentStyle {
    /// Write `<run_id>.params` with `name: value` lines and pass its path.
    #[default]
    ParameterFile,
    /// Pass `--name value` pairs.
    Flags,
}

/// Where the engine's artifact comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputCapture {
    /// The engine writes the artifact at the `outputfile` path it is given.
    #[default]
    File,
    /// The engine's stdout is the artifact.
    Stdout,
}

/// Command line used to start the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    env: Vec<(String, String)>,
}

impl EngineCommand {
    /// Run `program` directly.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: Vec::new(),
        }
    }

    /// Run the engine through `cargo run --release` for the given manifest.
    #[must_use]
    pub fn cargo(manifest_path: impl AsRef<Path>) -> Self {
        Self::new("cargo").args([
            "run".to_string(),
            "--release".to_string(),
            "--manifest-path".to_string(),
            manifest_path.as_ref().display().to_string(),
            "--".to_string(),
        ])
    }

    /// Append one fixed argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append fixed arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory of the engine.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set an environment variable for the engine.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Get the program.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Get the fixed arguments.
    #[must_use]
    pub fn fixed_args(&self) -> &[String] {
        &self.args
    }

    /// Render the command line for logging.
    #[must_use]
    pub fn display_with(&self, extra: &[String]) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .chain(extra.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn command(&self, extra: &[String]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .args(extra)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }
}

/// Render resolved parameters in the engine's `name: value` format.
#[must_use]
pub fn render_parameter_file(parameters: &[(String, ParameterValue)]) -> String {
    let mut out = String::new();
    for (name, value) in parameters {
        out.push_str(name);
        out.push_str(": ");
        out.push_str(&value.to_string());
        out.push('\n');
    }
    out
}

/// Render resolved parameters as `--name value` pairs.
#[must_use]
pub fn render_flags(parameters: &[(String, ParameterValue)]) -> Vec<String> {
    parameters
        .iter()
        .flat_map(|(name, value)| [format!("--{name}"), value.to_string()])
        .collect()
}

/// Output captured from a successful invocation.
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput {
    /// Standard output, one entry per line
    pub stdout: Vec<String>,
    /// Standard error
    pub stderr: String,
}

/// One engine invocation for one scale point.
#[derive(Debug)]
pub struct EngineInvocation<'a> {
    command: &'a EngineCommand,
    arguments: Vec<String>,
    scale_point: &'a ScalePoint,
    timeout: Option<Duration>,
}

impl<'a> EngineInvocation<'a> {
    /// Prepare an invocation with per-run arguments.
    #[must_use]
    pub const fn new(
        command: &'a EngineCommand,
        arguments: Vec<String>,
        scale_point: &'a ScalePoint,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            command,
            arguments,
            scale_point,
            timeout,
        }
    }

    /// Start the engine and stream its stdout through `on_line`.
    ///
    /// `on_line` receives each raw stdout line (without its line terminator)
    /// and its 0-based index as soon as it is read. Lines that are not valid
    /// UTF-8 are still delivered and captured lossily. Exit status 0 is the
    /// only success signal.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EngineExecution`] if the engine cannot start or exits
    /// non-zero, [`Error::EngineTimeout`] if it outlives the timeout (the
    /// child is killed and reaped first), or an IO error from the pipes.
    pub async fn run<F>(self, mut on_line: F) -> Result<CapturedOutput>
    where
        F: FnMut(usize, &[u8]),
    {
        debug!(command = %self.command.display_with(&self.arguments), "starting engine");
        let mut child = self
            .command
            .command(&self.arguments)
            .spawn()
            .map_err(|err| Error::EngineExecution {
                scale_point: self.scale_point.clone(),
                status: format!("failed to start: {err}"),
                stdout: String::new(),
                stderr: String::new(),
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("engine stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("engine stderr not captured"))?;
        let stderr_task = tokio::spawn(read_all(stderr));

        let mut lines_seen = Vec::new();
        let drive = async {
            let mut lines = BufReader::new(stdout).split(b'\n');
            while let Some(mut raw) = lines.next_segment().await? {
                if raw.last() == Some(&b'\r') {
                    raw.pop();
                }
                let line = String::from_utf8_lossy(&raw).into_owned();
                debug!(">> {line}");
                on_line(lines_seen.len(), &raw);
                lines_seen.push(line);
            }
            child.wait().await
        };

        let status: std::io::Result<ExitStatus> = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, drive).await {
                Ok(status) => status,
                Err(_) => {
                    warn!(scale_point = %self.scale_point, ?limit, "engine timed out, terminating");
                    child.kill().await?;
                    stderr_task.abort();
                    return Err(Error::EngineTimeout {
                        scale_point: self.scale_point.clone(),
                        timeout: limit,
                    });
                }
            },
            None => drive.await,
        };
        let status = status?;
        let stderr = match stderr_task.await {
            Ok(Ok(stderr)) => stderr,
            Ok(Err(err)) => {
                warn!(scale_point = %self.scale_point, error = %err, "failed to read engine stderr");
                String::new()
            }
            Err(err) => {
                warn!(scale_point = %self.scale_point, error = %err, "engine stderr reader did not finish");
                String::new()
            }
        };

        if !status.success() {
            return Err(Error::EngineExecution {
                scale_point: self.scale_point.clone(),
                status: status.to_string(),
                stdout: lines_seen.join("\n"),
                stderr,
            });
        }
        Ok(CapturedOutput {
            stdout: lines_seen,
            stderr,
        })
    }
}

async fn read_all<R: AsyncRead + Unpin>(mut reader: R) -> std::io::Result<String> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
