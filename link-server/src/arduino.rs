//! Arduino toolchain
//!
//! Sketches are compiled with `arduino-cli` into a scratch directory that
//! lives until the next build, and the resulting Intel HEX image is written
//! with `avrdude`. Output from both tools is forwarded line by line, stdout
//! and stderr interleaved as they arrive.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use link_session::{BuildStatus, FlashParams, OutputSink, Toolchain, ToolchainError};
use tempfile::TempDir;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::settings::ToolchainSettings;

const SKETCH_NAME: &str = "sketch";

/// Output of the last successful build
#[derive(Debug)]
struct Artifact {
    /// Keeps the scratch directory alive
    _dir: TempDir,
    hex: PathBuf,
}

/// Builds with arduino-cli and flashes with avrdude
#[derive(Debug)]
pub struct ArduinoToolchain {
    settings: ToolchainSettings,
    artifact: Mutex<Option<Artifact>>,
}

impl ArduinoToolchain {
    pub fn new(settings: ToolchainSettings) -> Self {
        Self {
            settings,
            artifact: Mutex::new(None),
        }
    }

    fn artifact(&self) -> MutexGuard<'_, Option<Artifact>> {
        self.artifact.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Arguments of `arduino-cli` for compiling `sketch_dir` into `build_dir`
fn compile_args(board: &str, sketch_dir: &Path, build_dir: &Path) -> Vec<OsString> {
    vec![
        "compile".into(),
        "--fqbn".into(),
        board.into(),
        "--output-dir".into(),
        build_dir.into(),
        sketch_dir.into(),
    ]
}

/// Part number avrdude is told to expect
fn partno(params: &FlashParams) -> Result<&str, ToolchainError> {
    params
        .partno
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ToolchainError::MissingParameter("partno".to_string()))
}

/// Arguments of `avrdude` for writing `hex` to the device at `port`
///
/// `programmer` and `baud` in the upload config override the settings.
fn flash_args(
    settings: &ToolchainSettings,
    port: &str,
    params: &FlashParams,
    hex: &Path,
) -> Result<Vec<OsString>, ToolchainError> {
    let partno = partno(params)?;
    let programmer = params
        .extra_str("programmer")
        .unwrap_or(&settings.programmer);
    let baud = params.extra_u32("baud").unwrap_or(settings.flash_baud);

    let mut args: Vec<OsString> = Vec::new();
    if let Some(config) = &settings.avrdude_config {
        args.push("-C".into());
        args.push(config.into());
    }
    args.extend([
        "-p".into(),
        partno.into(),
        "-c".into(),
        programmer.into(),
        "-P".into(),
        port.into(),
        "-b".into(),
        baud.to_string().into(),
        "-D".into(),
        "-U".into(),
    ]);
    let mut write = OsString::from("flash:w:");
    write.push(hex);
    write.push(":i");
    args.push(write);
    Ok(args)
}

async fn next_line<R>(lines: &mut Option<Lines<R>>) -> Option<String>
where
    R: AsyncBufRead + Unpin,
{
    match lines.as_mut()?.next_line().await {
        Ok(line) => line,
        Err(e) => {
            warn!("Error reading tool output: {}", e);
            None
        }
    }
}

/// Run `program` to completion, forwarding its output lines
///
/// The child is killed if the returned future is dropped.
async fn run_tool(
    program: &str,
    args: &[OsString],
    output: &OutputSink,
) -> Result<ExitStatus, ToolchainError> {
    debug!("Running {} {:?}", program, args);
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ToolchainError::Launch {
            tool: program.to_string(),
            reason: e.to_string(),
        })?;

    let mut stdout = child.stdout.take().map(|s| BufReader::new(s).lines());
    let mut stderr = child.stderr.take().map(|s| BufReader::new(s).lines());

    while stdout.is_some() || stderr.is_some() {
        tokio::select! {
            line = next_line(&mut stdout), if stdout.is_some() => match line {
                Some(line) => output.line(line),
                None => stdout = None,
            },
            line = next_line(&mut stderr), if stderr.is_some() => match line {
                Some(line) => output.line(line),
                None => stderr = None,
            },
        }
    }

    let status = child.wait().await?;
    debug!("{} finished with {}", program, status);
    Ok(status)
}

#[async_trait]
impl Toolchain for ArduinoToolchain {
    async fn build(
        &self,
        source: &str,
        board: &str,
        output: OutputSink,
    ) -> Result<BuildStatus, ToolchainError> {
        if board.is_empty() {
            return Err(ToolchainError::MissingParameter("board".to_string()));
        }
        self.artifact().take();

        let dir = tempfile::Builder::new().prefix("serlink-").tempdir()?;
        let sketch_dir = dir.path().join(SKETCH_NAME);
        let build_dir = dir.path().join("build");
        tokio::fs::create_dir_all(&sketch_dir).await?;
        tokio::fs::write(sketch_dir.join(format!("{}.ino", SKETCH_NAME)), source).await?;

        info!("Compiling sketch for {}", board);
        let args = compile_args(board, &sketch_dir, &build_dir);
        let status = run_tool(&self.settings.arduino_cli, &args, &output).await?;
        if !status.success() {
            return Ok(BuildStatus::Other(format!("Failed ({})", status)));
        }

        let hex = build_dir.join(format!("{}.ino.hex", SKETCH_NAME));
        *self.artifact() = Some(Artifact { _dir: dir, hex });
        Ok(BuildStatus::Success)
    }

    async fn flash(
        &self,
        port: &str,
        params: &FlashParams,
        output: OutputSink,
    ) -> Result<(), ToolchainError> {
        let hex = self
            .artifact()
            .as_ref()
            .map(|artifact| artifact.hex.clone())
            .ok_or(ToolchainError::NoArtifact)?;
        let args = flash_args(&self.settings, port, params, &hex)?;

        info!("Flashing {} via {}", port, self.settings.avrdude);
        let status = run_tool(&self.settings.avrdude, &args, &output).await?;
        if status.success() {
            Ok(())
        } else {
            Err(ToolchainError::Failed {
                tool: self.settings.avrdude.clone(),
                status: status.to_string(),
            })
        }
    }

    fn check_flash_params(&self, params: &FlashParams) -> Result<(), ToolchainError> {
        if params.board.is_empty() {
            return Err(ToolchainError::MissingParameter("board".to_string()));
        }
        partno(params).map(|_| ())
    }
}
