//! Firmware upload pipeline
//!
//! An upload runs build, release of the link, flash and reconnect strictly in
//! sequence. The build runs while the data link is still open; only a build
//! reporting exactly `Success` moves on to flashing. The actor owns the
//! `UploadJob` and drives the link transitions between stages, so the spawned
//! stage tasks never touch the connection themselves.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::actor::Internal;
use crate::error::{SessionError, ToolchainError};
use crate::state::UploadStage;
use crate::toolchain::{BuildStatus, FlashParams, OutputSink, Toolchain};

/// Prefix applied to every `uploadError` message (ANSI red)
pub const ERROR_PREFIX: &str = "\x1b[31m";

/// Target platform tag of the implemented toolchain
pub const ARDUINO_TARGET: &str = "arduino";

/// `config` object of an `upload` request
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UploadConfig {
    /// Target platform tag
    #[serde(rename = "type")]
    pub target: String,
    /// Board identifier passed to the build tool
    #[serde(default)]
    pub board: String,
    /// Target part number for the flasher
    #[serde(default)]
    pub partno: Option<String>,
    /// Any other flashing parameters
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Toolchain family selected by the upload target tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadTarget {
    /// Arduino-family boards (build + avrdude-style flash)
    Arduino,
    /// Accepted but nothing is performed
    Unimplemented(String),
}

impl UploadConfig {
    pub fn upload_target(&self) -> UploadTarget {
        if self.target.eq_ignore_ascii_case(ARDUINO_TARGET) {
            UploadTarget::Arduino
        } else {
            UploadTarget::Unimplemented(self.target.clone())
        }
    }
}

/// Format a pipeline failure for the `uploadError` notification
pub fn error_message(error: &SessionError) -> String {
    let reason = match error {
        SessionError::BuildFailure(reason) | SessionError::FlashFailure(reason) => reason.clone(),
        other => other.to_string(),
    };
    format!("{}{}", ERROR_PREFIX, reason)
}

/// Map the outcome of the build step onto the pipeline
pub fn build_outcome(result: Result<BuildStatus, ToolchainError>) -> Result<(), SessionError> {
    match result {
        Ok(BuildStatus::Success) => Ok(()),
        Ok(BuildStatus::Other(status)) => Err(SessionError::BuildFailure(format!(
            "build finished with status {}",
            status
        ))),
        Err(e) => Err(SessionError::BuildFailure(e.to_string())),
    }
}

/// Map the outcome of the flash step onto the pipeline
pub fn flash_outcome(result: Result<(), ToolchainError>) -> Result<(), SessionError> {
    result.map_err(|e| SessionError::FlashFailure(e.to_string()))
}

/// An upload in flight, owned by the session actor
#[derive(Debug)]
pub struct UploadJob {
    id: u64,
    stage: UploadStage,
    params: FlashParams,
    task: Option<JoinHandle<()>>,
}

impl UploadJob {
    /// Start the build stage for `source`
    pub(crate) fn start(
        id: u64,
        source: String,
        config: &UploadConfig,
        toolchain: Arc<dyn Toolchain>,
        internal_tx: mpsc::UnboundedSender<Internal>,
    ) -> Self {
        let board = config.board.clone();
        let sink = output_sink(id, internal_tx.clone());

        info!("Upload {}: building for board {}", id, board);
        let task = tokio::spawn(async move {
            let result = toolchain.build(&source, &board, sink).await;
            debug!("Upload {}: build finished: {:?}", id, result);
            let _ = internal_tx.send(Internal::BuildFinished {
                upload: id,
                result: build_outcome(result),
            });
        });

        Self {
            id,
            stage: UploadStage::Building,
            params: FlashParams::from(config),
            task: Some(task),
        }
    }

    /// Start the flash stage on `port`; the link must already be released
    pub(crate) fn flash(
        &mut self,
        port: String,
        toolchain: Arc<dyn Toolchain>,
        internal_tx: mpsc::UnboundedSender<Internal>,
    ) {
        let id = self.id;
        let params = self.params.clone();
        let sink = output_sink(id, internal_tx.clone());

        info!("Upload {}: flashing {}", id, port);
        self.stage = UploadStage::Flashing;
        self.task = Some(tokio::spawn(async move {
            let result = toolchain.flash(&port, &params, sink).await;
            debug!("Upload {}: flash finished: {:?}", id, result);
            let _ = internal_tx.send(Internal::FlashFinished {
                upload: id,
                result: flash_outcome(result),
            });
        }));
    }

    pub(crate) fn set_reconnecting(&mut self) {
        self.stage = UploadStage::Reconnecting;
        self.task = None;
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn stage(&self) -> UploadStage {
        self.stage
    }

    /// Stop the running stage, if any
    pub fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for UploadJob {
    fn drop(&mut self) {
        self.abort();
    }
}

fn output_sink(upload: u64, internal_tx: mpsc::UnboundedSender<Internal>) -> OutputSink {
    OutputSink::new(move |line| {
        let _ = internal_tx.send(Internal::UploadOutput { upload, line });
    })
}
