//! Session Actor
//!
//! All session state lives in one async actor. Calls from the peer, timer
//! ticks, device data, device removal and upload stage results all arrive as
//! messages and are handled one at a time, so no state is ever shared.
//!
//! # Architecture
//!
//! The actor receives `SessionCommand`s from every `SessionHandle` and emits
//! `Outbound` messages through a single channel. Spawned helpers (discovery
//! scans, the liveness watchdog, device I/O and upload stages) report back
//! through an internal unbounded channel, so they never wait on the actor.
//!
//! # Example
//!
//! ```rust,ignore
//! use link_session::{run_session_actor, SessionBackend, SessionConfig};
//! use tokio::sync::mpsc;
//!
//! let (cmd_tx, cmd_rx) = mpsc::channel(256);
//! let (outbound_tx, mut outbound_rx) = mpsc::channel(256);
//!
//! tokio::spawn(run_session_actor(backend, SessionConfig::default(), cmd_rx, outbound_tx));
//! ```

use std::mem;
use std::sync::Arc;

use link_detect::{PortEnumerator, SerialPortInfo};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use crate::config::SessionConfig;
use crate::connection::{spawn_watchdog, ConnectTarget, Connection};
use crate::data::DataChannel;
use crate::discovery::DiscoveryScanner;
use crate::driver::SerialDriver;
use crate::error::{DriverError, SessionError};
use crate::events::{Notification, Outbound};
use crate::periodic::PeriodicTask;
use crate::protocol::{parse_params, ConnectParams, DiscoverParams, Method, UploadParams, WriteParams};
use crate::state::{SessionState, SessionStatus};
use crate::toolchain::{FlashParams, Toolchain};
use crate::upload::{error_message, UploadJob, UploadTarget};

/// External collaborators of a session
#[derive(Clone)]
pub struct SessionBackend {
    /// Lists attached serial devices
    pub enumerator: Arc<dyn PortEnumerator>,
    /// Opens devices
    pub driver: Arc<dyn SerialDriver>,
    /// Builds and flashes firmware
    pub toolchain: Arc<dyn Toolchain>,
}

/// Commands sent to the session actor
#[derive(Debug)]
pub enum SessionCommand {
    /// Invoke a protocol method
    Call {
        /// Method name
        method: String,
        /// Method params (`null` reads as `{}`)
        params: Value,
        /// Completion of the call
        reply: oneshot::Sender<Result<Value, SessionError>>,
    },

    /// Snapshot the session state
    Status {
        reply: oneshot::Sender<SessionStatus>,
    },

    /// Tear the session down; acknowledged once every resource is released
    Dispose { reply: oneshot::Sender<()> },
}

/// Reports from tasks spawned by the actor
#[derive(Debug)]
pub(crate) enum Internal {
    /// One enumeration tick of discovery cycle `cycle`
    DiscoveryListing {
        cycle: u64,
        ports: Vec<SerialPortInfo>,
    },
    /// The watchdog saw the connection close
    Unplugged { connection: u64 },
    /// Bytes read from the device
    DeviceData { connection: u64, data: Vec<u8> },
    /// One line of build or flash output
    UploadOutput { upload: u64, line: String },
    /// Build stage finished
    BuildFinished {
        upload: u64,
        result: Result<(), SessionError>,
    },
    /// Flash stage finished
    FlashFinished {
        upload: u64,
        result: Result<(), SessionError>,
    },
}

/// An open connection and the watchdog polling it
#[derive(Debug)]
struct ActiveLink {
    connection: Connection,
    watchdog: PeriodicTask,
}

/// What the session is doing with the physical link
///
/// Each variant owns the resources it needs, so the discovery task exists
/// only while discovering and the watchdog only while connected.
#[derive(Debug)]
enum LinkState {
    Idle,
    Discovering { cycle: u64, scan: PeriodicTask },
    Connected(ActiveLink),
    /// The flasher holds the port
    Flashing,
    Disposed,
}

struct SessionActor {
    backend: SessionBackend,
    config: SessionConfig,
    outbound_tx: mpsc::Sender<Outbound>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    link: LinkState,
    scanner: DiscoveryScanner,
    data: DataChannel,
    /// Target of the last successful connect, reused after flashing
    saved: Option<ConnectTarget>,
    upload: Option<UploadJob>,
    next_connection: u64,
    next_upload: u64,
    was_connected: bool,
}

impl SessionActor {
    fn new(
        backend: SessionBackend,
        config: SessionConfig,
        outbound_tx: mpsc::Sender<Outbound>,
        internal_tx: mpsc::UnboundedSender<Internal>,
    ) -> Self {
        Self {
            backend,
            config,
            outbound_tx,
            internal_tx,
            link: LinkState::Idle,
            scanner: DiscoveryScanner::new(),
            data: DataChannel::new(),
            saved: None,
            upload: None,
            next_connection: 0,
            next_upload: 0,
            was_connected: false,
        }
    }

    fn is_disposed(&self) -> bool {
        matches!(self.link, LinkState::Disposed)
    }

    /// Single emission point; closed once disposal begins
    async fn send_outbound(&self, outbound: Outbound) -> bool {
        if self.is_disposed() {
            trace!("Dropping outbound message after disposal");
            return false;
        }
        if self.outbound_tx.send(outbound).await.is_err() {
            debug!("Outbound receiver dropped");
            return false;
        }
        true
    }

    async fn emit(&self, notification: Notification) {
        debug!("Emitting {}", notification.method());
        self.send_outbound(Outbound::Notification(notification)).await;
    }

    async fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Call {
                method,
                params,
                reply,
            } => {
                if self.is_disposed() {
                    let _ = reply.send(Err(SessionError::Disposed));
                    return;
                }
                let method = match method.parse::<Method>() {
                    Ok(method) => method,
                    Err(e) => {
                        warn!("Unknown method {}", method);
                        let _ = reply.send(Err(e));
                        return;
                    }
                };
                debug!("Call {} {}", method, params);

                match method {
                    // Completed by the device I/O task once the bytes are written
                    Method::Write => self.write(params, reply),
                    Method::PingMe => {
                        let _ = reply.send(Ok(json!("willPing")));
                        self.ping().await;
                    }
                    other => {
                        let result = self.dispatch(other, params).await;
                        if let Err(e) = &result {
                            debug!("Call {} failed: {}", other, e);
                        }
                        let _ = reply.send(result);
                    }
                }
            }

            SessionCommand::Status { reply } => {
                let _ = reply.send(self.status());
            }

            SessionCommand::Dispose { reply } => {
                self.dispose().await;
                let _ = reply.send(());
            }
        }
    }

    async fn dispatch(&mut self, method: Method, params: Value) -> Result<Value, SessionError> {
        match method {
            Method::Discover => self.discover(params),
            Method::Connect => self.connect(params),
            Method::Disconnect => self.disconnect().await,
            Method::Read => {
                self.data.subscribe();
                Ok(Value::Null)
            }
            Method::Upload => self.upload(params),
            Method::GetServices => Ok(json!([])),
            Method::Write | Method::PingMe => Ok(Value::Null),
        }
    }

    fn discover(&mut self, params: Value) -> Result<Value, SessionError> {
        match self.link {
            LinkState::Connected(_) => {
                return Err(SessionError::InvalidRequest(
                    "cannot discover when connected".into(),
                ))
            }
            LinkState::Flashing => {
                return Err(SessionError::InvalidRequest(
                    "cannot discover while an upload holds the link".into(),
                ))
            }
            _ => {}
        }

        let filters = parse_params::<DiscoverParams>(params)?.into_filters()?;
        let cycle = self.scanner.begin(filters);
        let scan = DiscoveryScanner::spawn_scan(
            cycle,
            self.config.discovery_period,
            self.backend.enumerator.clone(),
            self.internal_tx.clone(),
        );

        // Replacing the state drops (and cancels) the previous scan
        self.link = LinkState::Discovering { cycle, scan };
        info!("Discovery cycle {} started", cycle);
        Ok(Value::Null)
    }

    fn connect(&mut self, params: Value) -> Result<Value, SessionError> {
        let params: ConnectParams = parse_params(params)?;
        match self.link {
            LinkState::Connected(_) => return Err(SessionError::AlreadyConnected),
            LinkState::Flashing => return Err(SessionError::UploadInProgress),
            _ => {}
        }

        let peripheral = self
            .scanner
            .directory()
            .get(&params.peripheral_id)
            .cloned()
            .ok_or(SessionError::UnknownPeripheral(params.peripheral_id))?;
        let config = params.peripheral_config.config;
        config
            .validate()
            .map_err(|e| SessionError::InvalidRequest(e.to_string()))?;

        self.open_link(ConnectTarget { peripheral, config })?;
        Ok(Value::Null)
    }

    /// Open `target`, replacing discovery with a watched connection
    fn open_link(&mut self, target: ConnectTarget) -> Result<(), SessionError> {
        if let LinkState::Discovering { cycle, .. } = &self.link {
            debug!("Stopping discovery cycle {}", cycle);
            self.link = LinkState::Idle;
        }

        let path = target.peripheral.path().to_string();
        let io = self
            .backend
            .driver
            .open(&path, &target.config)
            .map_err(|e| open_error(&path, e))?;

        self.next_connection += 1;
        let id = self.next_connection;
        let connection = Connection::spawn(
            id,
            target.clone(),
            io,
            self.internal_tx.clone(),
            self.config.read_buffer_size,
            self.config.write_queue,
        );
        let watchdog = spawn_watchdog(
            id,
            connection.open_flag(),
            self.config.watchdog_period,
            self.internal_tx.clone(),
        );

        info!(
            "Connected to {} at {} baud (connection {})",
            target.peripheral.name, target.config.baud_rate, id
        );
        self.link = LinkState::Connected(ActiveLink {
            connection,
            watchdog,
        });
        self.saved = Some(target);
        self.was_connected = true;
        Ok(())
    }

    async fn close_link(&self, link: ActiveLink) -> Result<(), DriverError> {
        let ActiveLink {
            connection,
            watchdog,
        } = link;
        watchdog.cancel();
        let path = connection.path().to_string();
        let result = connection.close(self.config.close_timeout).await;
        match &result {
            Ok(()) => info!("Closed {}", path),
            Err(e) => warn!("Error closing {}: {}", path, e),
        }
        result
    }

    async fn disconnect(&mut self) -> Result<Value, SessionError> {
        match mem::replace(&mut self.link, LinkState::Idle) {
            LinkState::Connected(link) => {
                self.close_link(link)
                    .await
                    .map_err(|e| SessionError::CloseError(e.to_string()))?;
            }
            other => self.link = other,
        }
        Ok(Value::Null)
    }

    fn write(
        &mut self,
        params: Value,
        reply: oneshot::Sender<Result<Value, SessionError>>,
    ) {
        let params: WriteParams = match parse_params(params) {
            Ok(params) => params,
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };
        let LinkState::Connected(link) = &self.link else {
            let _ = reply.send(Err(SessionError::NotConnected));
            return;
        };
        let bytes = match params.encoding.decode(&params.message) {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };

        let ack = match link.connection.write(bytes) {
            Ok(ack) => ack,
            Err(e) => {
                let _ = reply.send(Err(SessionError::WriteError(e.to_string())));
                return;
            }
        };
        tokio::spawn(async move {
            let result = match ack.await {
                Ok(Ok(written)) => Ok(json!(written)),
                Ok(Err(e)) => Err(SessionError::WriteError(e.to_string())),
                Err(_) => Err(SessionError::WriteError(
                    "device closed before the write completed".into(),
                )),
            };
            let _ = reply.send(result);
        });
    }

    fn upload(&mut self, params: Value) -> Result<Value, SessionError> {
        let params: UploadParams = parse_params(params)?;
        let source = params.encoding.decode(&params.message)?;
        let source = String::from_utf8(source).map_err(|e| {
            SessionError::InvalidRequest(format!("sketch source is not valid UTF-8: {}", e))
        })?;

        if self.upload.is_some() {
            return Err(SessionError::UploadInProgress);
        }
        if let UploadTarget::Unimplemented(target) = params.config.upload_target() {
            info!("Upload target {} is not implemented, ignoring", target);
            return Ok(Value::Null);
        }
        if self.saved.is_none() {
            return Err(SessionError::NotConnected);
        }
        self.backend
            .toolchain
            .check_flash_params(&FlashParams::from(&params.config))
            .map_err(|e| SessionError::InvalidRequest(e.to_string()))?;

        self.next_upload += 1;
        self.upload = Some(UploadJob::start(
            self.next_upload,
            source,
            &params.config,
            self.backend.toolchain.clone(),
            self.internal_tx.clone(),
        ));
        Ok(Value::Null)
    }

    async fn ping(&self) {
        let (reply, rx) = oneshot::channel();
        let sent = self
            .send_outbound(Outbound::Request {
                method: "ping".into(),
                params: Value::Null,
                reply,
            })
            .await;
        if !sent {
            return;
        }
        tokio::spawn(async move {
            match rx.await {
                Ok(Ok(result)) => info!("Got result from ping: {}", result),
                Ok(Err(e)) => warn!("Ping failed: {}", e),
                Err(_) => debug!("Ping was never answered"),
            }
        });
    }

    fn is_current_upload(&self, upload: u64) -> bool {
        self.upload.as_ref().is_some_and(|job| job.id() == upload)
    }

    async fn fail_upload(&mut self, error: SessionError) {
        warn!("Upload failed: {}", error);
        self.upload = None;
        if matches!(self.link, LinkState::Flashing) {
            self.link = LinkState::Idle;
        }
        self.emit(Notification::UploadError {
            message: error_message(&error),
        })
        .await;
    }

    async fn handle_internal(&mut self, msg: Internal) {
        if self.is_disposed() {
            trace!("Ignoring {:?} after disposal", msg);
            return;
        }

        match msg {
            Internal::DiscoveryListing { cycle, ports } => {
                let current = matches!(self.link, LinkState::Discovering { cycle: c, .. } if c == cycle);
                if !current {
                    trace!("Ignoring listing from finished cycle {}", cycle);
                    return;
                }
                for peripheral in self.scanner.accept(cycle, &ports) {
                    info!("Discovered {}", peripheral.name);
                    self.emit(Notification::DidDiscoverPeripheral {
                        peripheral_id: peripheral.id,
                        name: peripheral.name,
                    })
                    .await;
                }
            }

            Internal::Unplugged { connection } => {
                match mem::replace(&mut self.link, LinkState::Idle) {
                    LinkState::Connected(link) if link.connection.id() == connection => {
                        warn!("Peripheral {} was unplugged", link.connection.path());
                        if let Err(e) = self.close_link(link).await {
                            debug!("Cleanup after unplug: {}", e);
                        }
                        self.emit(Notification::PeripheralUnplug).await;
                    }
                    other => self.link = other,
                }
            }

            Internal::DeviceData { connection, data } => {
                let current = matches!(&self.link, LinkState::Connected(link) if link.connection.id() == connection);
                if !current {
                    return;
                }
                match self.data.deliver(&data) {
                    Some(notification) => self.emit(notification).await,
                    None => trace!("Dropping {} bytes, not subscribed", data.len()),
                }
            }

            Internal::UploadOutput { upload, line } => {
                if self.is_current_upload(upload) {
                    self.emit(Notification::UploadStdout { message: line }).await;
                }
            }

            Internal::BuildFinished { upload, result } => {
                if !self.is_current_upload(upload) {
                    return;
                }
                if let Err(e) = result {
                    self.fail_upload(e).await;
                    return;
                }
                self.start_flash().await;
            }

            Internal::FlashFinished { upload, result } => {
                if !self.is_current_upload(upload) {
                    return;
                }
                if let Err(e) = result {
                    self.fail_upload(e).await;
                    return;
                }
                self.reconnect_after_upload().await;
            }
        }
    }

    /// Release the link and hand the port to the flasher
    async fn start_flash(&mut self) {
        let Some(port) = self
            .saved
            .as_ref()
            .map(|target| target.peripheral.path().to_string())
        else {
            self.fail_upload(SessionError::NotConnected).await;
            return;
        };

        if let LinkState::Connected(link) = mem::replace(&mut self.link, LinkState::Flashing) {
            if let Err(e) = self.close_link(link).await {
                warn!("Flashing {} although close failed: {}", port, e);
            }
        }

        let toolchain = self.backend.toolchain.clone();
        let internal_tx = self.internal_tx.clone();
        if let Some(job) = self.upload.as_mut() {
            job.flash(port, toolchain, internal_tx);
        }
    }

    /// Reopen the saved target once flashing succeeded
    async fn reconnect_after_upload(&mut self) {
        if let Some(job) = self.upload.as_mut() {
            job.set_reconnecting();
        }
        self.link = LinkState::Idle;

        let Some(target) = self.saved.clone() else {
            self.fail_upload(SessionError::NotConnected).await;
            return;
        };
        match self.open_link(target) {
            Ok(()) => {
                info!("Upload finished");
                self.upload = None;
                self.emit(Notification::UploadSuccess).await;
            }
            Err(e) => {
                // A device that cannot be reopened is treated as removed
                self.emit(Notification::PeripheralUnplug).await;
                self.fail_upload(e).await;
            }
        }
    }

    fn status(&self) -> SessionStatus {
        let state = match &self.link {
            LinkState::Disposed => SessionState::Disposed,
            _ if self.upload.is_some() => SessionState::Uploading,
            LinkState::Flashing => SessionState::Uploading,
            LinkState::Connected(_) if self.data.is_subscribed() => SessionState::Reading,
            LinkState::Connected(_) => SessionState::Connected,
            LinkState::Discovering { .. } => SessionState::Discovering,
            LinkState::Idle if self.was_connected => SessionState::Disconnected,
            LinkState::Idle => SessionState::Idle,
        };
        let peripheral = match &self.link {
            LinkState::Connected(link) => Some(link.connection.path().to_string()),
            _ => None,
        };
        SessionStatus {
            state,
            peripheral,
            subscribed: self.data.is_subscribed(),
            upload: self.upload.as_ref().map(UploadJob::stage),
            discovery_cycle: self.scanner.cycle(),
        }
    }

    /// Tear down in an order that closes the emission gate first
    async fn dispose(&mut self) {
        if self.is_disposed() {
            return;
        }
        info!("Disposing session");

        let previous = mem::replace(&mut self.link, LinkState::Disposed);
        if let Some(mut job) = self.upload.take() {
            job.abort();
        }
        match previous {
            LinkState::Discovering { scan, .. } => scan.cancel(),
            LinkState::Connected(link) => {
                if let Err(e) = self.close_link(link).await {
                    warn!("Error releasing device during disposal: {}", e);
                }
            }
            _ => {}
        }
        self.data.reset();
    }
}

fn open_error(path: &str, error: DriverError) -> SessionError {
    let reason = match error {
        DriverError::OpenFailed { reason, .. } => reason,
        other => other.to_string(),
    };
    SessionError::OpenError {
        path: path.to_string(),
        reason,
    }
}

/// Run the session actor
///
/// This async function owns all session state and processes commands until
/// every `SessionHandle` is dropped, disposing the session on the way out.
///
/// # Arguments
///
/// * `backend` - Enumerator, driver and toolchain the session works with
/// * `config` - Timing and buffering parameters
/// * `cmd_rx` - Receiver for commands sent to the actor
/// * `outbound_tx` - Sender for notifications and requests to the peer
pub async fn run_session_actor(
    backend: SessionBackend,
    config: SessionConfig,
    mut cmd_rx: mpsc::Receiver<SessionCommand>,
    outbound_tx: mpsc::Sender<Outbound>,
) {
    let (internal_tx, mut internal_rx) = mpsc::unbounded_channel();
    let mut actor = SessionActor::new(backend, config, outbound_tx, internal_tx);
    info!("Session actor started");

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    debug!("All session handles dropped");
                    actor.dispose().await;
                    break;
                };
                actor.handle_command(cmd).await;
            }

            Some(msg) = internal_rx.recv() => {
                actor.handle_internal(msg).await;
            }
        }
    }

    info!("Session actor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use link_detect::DetectError;
    use std::time::Duration;

    use crate::driver::{DeviceIo, PeripheralConfig};
    use crate::error::ToolchainError;
    use crate::handle::SessionHandle;
    use crate::toolchain::{BuildStatus, OutputSink};

    struct NoPorts;

    impl PortEnumerator for NoPorts {
        fn list_ports(&self) -> Result<Vec<SerialPortInfo>, DetectError> {
            Ok(Vec::new())
        }
    }

    struct NoDriver;

    impl SerialDriver for NoDriver {
        fn open(
            &self,
            path: &str,
            _config: &PeripheralConfig,
        ) -> Result<Box<dyn DeviceIo>, DriverError> {
            Err(DriverError::OpenFailed {
                port: path.to_string(),
                reason: "no such device".into(),
            })
        }
    }

    struct NoToolchain;

    #[async_trait]
    impl Toolchain for NoToolchain {
        async fn build(
            &self,
            _source: &str,
            _board: &str,
            _output: OutputSink,
        ) -> Result<BuildStatus, ToolchainError> {
            Ok(BuildStatus::Success)
        }

        async fn flash(
            &self,
            _port: &str,
            _params: &FlashParams,
            _output: OutputSink,
        ) -> Result<(), ToolchainError> {
            Ok(())
        }
    }

    fn spawn() -> (SessionHandle, mpsc::Receiver<Outbound>) {
        let backend = SessionBackend {
            enumerator: Arc::new(NoPorts),
            driver: Arc::new(NoDriver),
            toolchain: Arc::new(NoToolchain),
        };
        let config = SessionConfig {
            discovery_period: Duration::from_millis(5),
            watchdog_period: Duration::from_millis(2),
            ..SessionConfig::default()
        };
        SessionHandle::spawn(backend, config)
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let (session, _outbound) = spawn();
        assert_eq!(
            session.call("fly", Value::Null).await,
            Err(SessionError::MethodNotFound("fly".into()))
        );
    }

    #[tokio::test]
    async fn test_legacy_calls() {
        let (session, mut outbound) = spawn();
        assert_eq!(session.call("getServices", json!({})).await, Ok(json!([])));
        assert_eq!(session.call("pingMe", Value::Null).await, Ok(json!("willPing")));

        match outbound.recv().await.unwrap() {
            Outbound::Request { method, reply, .. } => {
                assert_eq!(method, "ping");
                let _ = reply.send(Ok(json!("pong")));
            }
            other => panic!("unexpected outbound: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_discover_requires_filters() {
        let (session, _outbound) = spawn();
        for params in [json!({}), json!({ "filters": { "patterns": [] } })] {
            assert!(matches!(
                session.call("discover", params).await,
                Err(SessionError::InvalidRequest(_))
            ));
        }
        let status = session.status().await.unwrap();
        assert_eq!(status.state, SessionState::Idle);
    }

    #[tokio::test]
    async fn test_calls_without_connection() {
        let (session, _outbound) = spawn();
        assert_eq!(
            session.call("write", json!({ "message": "hi" })).await,
            Err(SessionError::NotConnected)
        );
        assert_eq!(session.call("disconnect", json!({})).await, Ok(Value::Null));
        assert_eq!(
            session
                .call(
                    "connect",
                    json!({
                        "peripheralId": "/dev/ttyUSB0",
                        "peripheralConfig": { "config": { "baudRate": 9600 } }
                    })
                )
                .await,
            Err(SessionError::UnknownPeripheral("/dev/ttyUSB0".into()))
        );
        assert_eq!(
            session
                .call(
                    "upload",
                    json!({ "message": "void setup() {}", "config": { "type": "arduino" } })
                )
                .await,
            Err(SessionError::NotConnected)
        );
        assert_eq!(
            session
                .call(
                    "upload",
                    json!({ "message": "", "config": { "type": "microbit" } })
                )
                .await,
            Ok(Value::Null)
        );
    }

    #[tokio::test]
    async fn test_dispose_is_idempotent() {
        let (session, mut outbound) = spawn();
        session
            .call("discover", json!({ "filters": { "patterns": ["*"] } }))
            .await
            .unwrap();
        session.call("read", json!({})).await.unwrap();

        session.dispose().await;
        session.dispose().await;

        let status = session.status().await.unwrap();
        assert_eq!(status.state, SessionState::Disposed);
        assert!(!status.subscribed);
        assert_eq!(
            session.call("read", json!({})).await,
            Err(SessionError::Disposed)
        );

        drop(session);
        assert!(outbound.recv().await.is_none());
    }
}
