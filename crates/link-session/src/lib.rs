//! Serial Link Session Engine
//!
//! This crate provides the session state machine that lets a remote peer
//! discover, open and exchange bytes with one serial-attached device, and
//! reflash its firmware over the same link.
//!
//! # Architecture
//!
//! A session is a single actor task. The peer drives it through a
//! `SessionHandle` and receives notifications through one outbound channel:
//!
//! - **Discovery**: a periodic enumeration task reports each matching port
//!   once per cycle (`didDiscoverPeripheral`)
//! - **Connection**: at most one open device, watched by a liveness task
//!   that reports removal (`peripheralUnplug`)
//! - **Data**: writes are acknowledged with the byte count; incoming bytes
//!   are forwarded as base64 once the peer calls `read` (`onMessage`)
//! - **Upload**: build, release the port, flash, reopen (`uploadStdout`,
//!   `uploadSuccess`, `uploadError`)
//!
//! The device driver, port enumeration and firmware toolchain are traits,
//! so the same actor runs against real hardware or a simulation.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use link_detect::PortScanner;
//! use link_session::{SessionBackend, SessionConfig, SessionHandle, TokioSerialDriver, Toolchain};
//! use serde_json::json;
//!
//! # async fn run(toolchain: Arc<dyn Toolchain>) {
//! let backend = SessionBackend {
//!     enumerator: Arc::new(PortScanner::new()),
//!     driver: Arc::new(TokioSerialDriver::new()),
//!     toolchain,
//! };
//! let (session, mut outbound) = SessionHandle::spawn(backend, SessionConfig::default());
//!
//! session
//!     .call("discover", json!({ "filters": { "patterns": ["*"] } }))
//!     .await
//!     .unwrap();
//! while let Some(message) = outbound.recv().await {
//!     println!("{:?}", message);
//! }
//! # }
//! ```

pub mod actor;
pub mod config;
pub mod connection;
pub mod data;
pub mod discovery;
pub mod driver;
pub mod error;
pub mod events;
pub mod handle;
pub mod periodic;
pub mod protocol;
pub mod rpc;
pub mod state;
pub mod toolchain;
pub mod upload;

// Re-export actor types
pub use actor::{run_session_actor, SessionBackend, SessionCommand};
pub use handle::{PendingCall, SessionHandle};

pub use config::SessionConfig;
pub use data::Encoding;
pub use driver::{DeviceIo, PeripheralConfig, SerialDriver, TokioSerialDriver};
pub use error::{DriverError, SessionError, ToolchainError};
pub use events::{Notification, Outbound};
pub use protocol::Method;
pub use rpc::{PendingRequests, RpcError, RpcMessage};
pub use state::{SessionState, SessionStatus, UploadStage};
pub use toolchain::{BuildStatus, FlashParams, OutputSink, Toolchain};
pub use upload::UploadConfig;
