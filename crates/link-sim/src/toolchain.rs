//! Scripted firmware toolchain
//!
//! Replays configured output lines and results for build and flash, records
//! every invocation, and can check that the port was released by the
//! session before flashing started.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use link_session::{BuildStatus, FlashParams, OutputSink, Toolchain, ToolchainError};
use tracing::debug;

use crate::bus::VirtualBus;

/// One recorded toolchain invocation
#[derive(Debug, Clone, PartialEq)]
pub enum ToolchainCall {
    Build { source: String, board: String },
    Flash { port: String, params: FlashParams },
}

#[derive(Debug)]
struct Script {
    build_lines: Vec<String>,
    build_result: Result<String, String>,
    build_delay: Duration,
    flash_lines: Vec<String>,
    flash_result: Result<(), String>,
    required_params: Vec<String>,
    calls: Vec<ToolchainCall>,
    /// Whether the port was free at each flash, when a bus is watched
    port_free_at_flash: Vec<bool>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            build_lines: Vec::new(),
            build_result: Ok("Success".to_string()),
            build_delay: Duration::ZERO,
            flash_lines: Vec::new(),
            flash_result: Ok(()),
            required_params: Vec::new(),
            calls: Vec::new(),
            port_free_at_flash: Vec::new(),
        }
    }
}

/// Toolchain that replays a script
#[derive(Debug, Clone, Default)]
pub struct ScriptedToolchain {
    script: Arc<Mutex<Script>>,
    bus: Option<VirtualBus>,
}

impl ScriptedToolchain {
    /// Toolchain whose build reports `Success` and whose flash succeeds
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record whether `bus` still holds the port open when flashing starts
    pub fn watch_bus(mut self, bus: VirtualBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Status string the build reports
    pub fn build_status(self, status: impl Into<String>) -> Self {
        self.lock().build_result = Ok(status.into());
        self
    }

    /// Make the build fail to run
    pub fn build_error(self, message: impl Into<String>) -> Self {
        self.lock().build_result = Err(message.into());
        self
    }

    /// Delay before the build completes
    pub fn build_delay(self, delay: Duration) -> Self {
        self.lock().build_delay = delay;
        self
    }

    pub fn build_output<I, S>(self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock().build_lines = lines.into_iter().map(Into::into).collect();
        self
    }

    pub fn flash_output<I, S>(self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock().flash_lines = lines.into_iter().map(Into::into).collect();
        self
    }

    /// Make the flash fail
    pub fn flash_error(self, message: impl Into<String>) -> Self {
        self.lock().flash_result = Err(message.into());
        self
    }

    /// Reject uploads whose flashing parameters lack `name`
    ///
    /// `partno` is the dedicated field, anything else an extra parameter.
    pub fn require_param(self, name: impl Into<String>) -> Self {
        self.lock().required_params.push(name.into());
        self
    }

    /// Every invocation so far
    pub fn calls(&self) -> Vec<ToolchainCall> {
        self.lock().calls.clone()
    }

    pub fn build_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| matches!(call, ToolchainCall::Build { .. }))
            .count()
    }

    pub fn flash_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| matches!(call, ToolchainCall::Flash { .. }))
            .count()
    }

    /// For each flash, whether the watched bus had the port released
    pub fn port_free_at_flash(&self) -> Vec<bool> {
        self.lock().port_free_at_flash.clone()
    }
}

#[async_trait]
impl Toolchain for ScriptedToolchain {
    async fn build(
        &self,
        source: &str,
        board: &str,
        output: OutputSink,
    ) -> Result<BuildStatus, ToolchainError> {
        let (lines, result, delay) = {
            let mut script = self.lock();
            script.calls.push(ToolchainCall::Build {
                source: source.to_string(),
                board: board.to_string(),
            });
            (
                script.build_lines.clone(),
                script.build_result.clone(),
                script.build_delay,
            )
        };
        debug!("Scripted build for {} ({} bytes)", board, source.len());

        for line in lines {
            output.line(line);
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match result {
            Ok(status) => Ok(BuildStatus::from(status.as_str())),
            Err(message) => Err(ToolchainError::Failed {
                tool: "build".to_string(),
                status: message,
            }),
        }
    }

    async fn flash(
        &self,
        port: &str,
        params: &FlashParams,
        output: OutputSink,
    ) -> Result<(), ToolchainError> {
        let port_free = self.bus.as_ref().map(|bus| !bus.is_open(port));
        let (lines, result) = {
            let mut script = self.lock();
            script.calls.push(ToolchainCall::Flash {
                port: port.to_string(),
                params: params.clone(),
            });
            if let Some(free) = port_free {
                script.port_free_at_flash.push(free);
            }
            (script.flash_lines.clone(), script.flash_result.clone())
        };
        debug!("Scripted flash of {}", port);

        for line in lines {
            output.line(line);
        }

        result.map_err(|message| ToolchainError::Failed {
            tool: "flash".to_string(),
            status: message,
        })
    }

    fn check_flash_params(&self, params: &FlashParams) -> Result<(), ToolchainError> {
        let script = self.lock();
        let missing = script.required_params.iter().find(|name| match name.as_str() {
            "partno" => params.partno.as_deref().map_or(true, str::is_empty),
            other => !params.extra.contains_key(other),
        });
        match missing {
            Some(name) => Err(ToolchainError::MissingParameter(name.clone())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn quiet() -> OutputSink {
        OutputSink::new(|_| {})
    }

    fn params() -> FlashParams {
        FlashParams {
            board: "arduino:avr:uno".into(),
            partno: Some("atmega328p".into()),
            extra: Map::new(),
        }
    }

    #[tokio::test]
    async fn test_replays_script_and_records_calls() {
        let toolchain = ScriptedToolchain::new()
            .build_output(["Compiling", "Linking"])
            .flash_output(["Writing"]);
        let lines = Arc::new(Mutex::new(Vec::new()));
        let captured = lines.clone();
        let sink = OutputSink::new(move |line| captured.lock().unwrap().push(line));

        let status = toolchain
            .build("void setup() {}", "arduino:avr:uno", sink.clone())
            .await
            .unwrap();
        assert_eq!(status, BuildStatus::Success);
        toolchain.flash("/dev/ttyUSB0", &params(), sink).await.unwrap();

        assert_eq!(*lines.lock().unwrap(), vec!["Compiling", "Linking", "Writing"]);
        assert_eq!(toolchain.build_count(), 1);
        assert_eq!(toolchain.flash_count(), 1);
        assert_eq!(
            toolchain.calls()[0],
            ToolchainCall::Build {
                source: "void setup() {}".into(),
                board: "arduino:avr:uno".into()
            }
        );
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let toolchain = ScriptedToolchain::new()
            .build_status("Failed")
            .flash_error("programmer not responding");

        let status = toolchain
            .build("", "arduino:avr:uno", quiet())
            .await
            .unwrap();
        assert!(!status.is_success());

        let err = toolchain
            .flash("/dev/ttyUSB0", &params(), quiet())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("programmer not responding"));

        let toolchain = ScriptedToolchain::new().build_error("compiler missing");
        assert!(toolchain
            .build("", "arduino:avr:uno", quiet())
            .await
            .is_err());
    }

    #[test]
    fn test_required_params() {
        let toolchain = ScriptedToolchain::new().require_param("partno");
        assert!(toolchain.check_flash_params(&params()).is_ok());

        let mut without = params();
        without.partno = None;
        assert!(matches!(
            toolchain.check_flash_params(&without),
            Err(ToolchainError::MissingParameter(p)) if p == "partno"
        ));
        assert!(ScriptedToolchain::new().check_flash_params(&without).is_ok());
    }
}
