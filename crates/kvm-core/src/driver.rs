//! Device drivers
//!
//! A [`Driver`] is the handle for one physical switching device. Behind it
//! run three tasks: the transport read/write pair (see
//! [`crate::transport`]) and a processing task that owns the protocol state
//! machine. The processing task is the single writer of all driver state;
//! handles observe it through a `watch` snapshot channel and talk to it over
//! an `mpsc` command channel, so no locks are involved anywhere.
//!
//! Matrix swaps are serialized per driver: at most one is in flight, a
//! caller blocks on a `oneshot` until the device confirms, and a second
//! request while one is pending is rejected as a no-op. A pending swap that
//! the device never confirms expires after the configured timeout instead of
//! wedging the driver forever.

use kvm_protocol::blustream::{self, MatrixEvent, MatrixState};
use kvm_protocol::startech::{self, KvmEvent, KvmState};
use kvm_protocol::{DeviceFamily, InputPort, OutputPort};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::DriverError;
use crate::transport::{self, TransportEvent};

fn default_swap_timeout_ms() -> u64 {
    5_000
}

fn default_settle_delay_ms() -> u64 {
    500
}

/// Static configuration for one device, consumed at driver construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Initial display name (replaced once the device identifies itself)
    pub name: String,
    /// Short name used by layouts and the registry
    pub short_name: String,
    /// Protocol family the device speaks
    pub family: DeviceFamily,
    /// Serial device path
    pub serial_path: String,
    /// Serial baud rate
    pub baud_rate: u32,
    /// How long a pending swap may wait for confirmation before the gate
    /// is released
    #[serde(default = "default_swap_timeout_ms")]
    pub swap_timeout_ms: u64,
    /// Settle time between opening the port and the first command
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

/// Snapshot of a driver's state, published by its processing task
///
/// Serialized verbatim for status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct DriverStatus {
    /// Display name ("<model> v<version>" once identified)
    pub name: String,
    /// Short name used by layouts
    pub short_name: String,
    /// Protocol family
    pub family: DeviceFamily,
    /// Whether the device is connected and operational
    pub running: bool,
    /// Whether a start was attempted
    pub start_attempted: bool,
    /// Whether the device or connection has a recorded error
    pub has_error: bool,
    /// Text of the most recent error, if any
    pub last_error: Option<String>,
    /// Whether a matrix swap is currently in flight
    pub switching: bool,
    /// Active channel (single-output devices only)
    pub active_channel: Option<u8>,
    /// Known input ports
    pub inputs: Vec<InputPort>,
    /// Known output ports
    pub outputs: Vec<OutputPort>,
}

impl DriverStatus {
    fn initial(config: &DeviceConfig) -> Self {
        Self {
            name: config.name.clone(),
            short_name: config.short_name.clone(),
            family: config.family,
            running: false,
            start_attempted: false,
            has_error: false,
            last_error: None,
            switching: false,
            active_channel: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }
}

/// How a matrix swap request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapOutcome {
    /// The device confirmed the routing change
    Completed,
    /// The request was dropped: another swap pending, unresolved port name,
    /// wrong capability, or the driver is not running
    Rejected,
    /// No confirmation arrived before the deadline; the gate was released
    TimedOut,
}

/// Commands handled by a driver's processing task
#[derive(Debug)]
enum DriverCommand {
    SwitchMatrix {
        output: String,
        input: String,
        done: oneshot::Sender<SwapOutcome>,
    },
    SwitchSingle {
        input: String,
    },
    RefreshStatus,
    Shutdown,
}

/// Handle for one switching device
#[derive(Debug)]
pub struct Driver {
    config: DeviceConfig,
    cmd_tx: mpsc::Sender<DriverCommand>,
    /// Taken by the processing task on start; `Some` means not yet started
    cmd_rx: Option<mpsc::Receiver<DriverCommand>>,
    status_rx: watch::Receiver<DriverStatus>,
    status_tx: Option<watch::Sender<DriverStatus>>,
}

impl Driver {
    /// Build a driver for a configured device; nothing runs until
    /// [`Driver::start`]
    pub fn new(config: DeviceConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (status_tx, status_rx) = watch::channel(DriverStatus::initial(&config));
        Self {
            config,
            cmd_tx,
            cmd_rx: Some(cmd_rx),
            status_rx,
            status_tx: Some(status_tx),
        }
    }

    /// Open the serial connection and launch the driver tasks
    ///
    /// Returns whether the attempt was initiated. A `true` does not mean
    /// the device handshake will succeed, only that the port opened and the
    /// tasks are running. On failure the error is recorded on the driver and
    /// other drivers are unaffected.
    pub fn start(&mut self) -> bool {
        if self.cmd_rx.is_none() {
            return true;
        }

        match transport::open_serial(&self.config.serial_path, self.config.baud_rate) {
            Ok(stream) => {
                self.spawn_with_io(stream);
                true
            }
            Err(err) => {
                warn!(driver = %self.config.short_name, %err, "failed to open serial port");
                if let Some(status_tx) = &self.status_tx {
                    status_tx.send_modify(|status| {
                        status.start_attempted = true;
                        status.has_error = true;
                        status.last_error = Some(err.to_string());
                    });
                }
                false
            }
        }
    }

    /// Launch the driver tasks over an arbitrary connection
    ///
    /// Used by tests to drive a driver against `tokio::io::duplex()` instead
    /// of a serial port.
    pub fn start_with_io<T>(&mut self, io: T) -> bool
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        if self.cmd_rx.is_none() {
            return true;
        }
        self.spawn_with_io(io);
        true
    }

    fn spawn_with_io<T>(&mut self, io: T)
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (Some(cmd_rx), Some(status_tx)) = (self.cmd_rx.take(), self.status_tx.take()) else {
            return;
        };
        status_tx.send_modify(|status| status.start_attempted = true);

        let (event_tx, event_rx) = mpsc::channel(64);
        let (write_tx, write_rx) = mpsc::channel(16);
        transport::spawn_io_tasks(io, event_tx, write_rx);

        let runtime = DriverRuntime {
            machine: DeviceMachine::new(self.config.family),
            config: self.config.clone(),
            status: status_tx,
            write_tx,
            event_rx,
            cmd_rx,
            pending: None,
        };
        tokio::spawn(runtime.run());
    }

    /// Short name used by layouts and the registry
    pub fn short_name(&self) -> &str {
        &self.config.short_name
    }

    /// Protocol family of the device
    pub fn family(&self) -> DeviceFamily {
        self.config.family
    }

    /// Current display name of the device
    pub fn driver_name(&self) -> String {
        self.status_rx.borrow().name.clone()
    }

    /// Whether the device is connected and operational
    pub fn is_running(&self) -> bool {
        self.status_rx.borrow().running
    }

    /// Most recent error recorded on this driver, if any
    pub fn last_error(&self) -> Option<String> {
        self.status_rx.borrow().last_error.clone()
    }

    /// Snapshot of the full driver state
    pub fn status(&self) -> DriverStatus {
        self.status_rx.borrow().clone()
    }

    /// Watch channel carrying status snapshots, for observers that want to
    /// await changes rather than poll
    pub fn watch_status(&self) -> watch::Receiver<DriverStatus> {
        self.status_rx.clone()
    }

    /// Route `output` to `input` on a matrix device
    ///
    /// Blocks until the device confirms the change, the swap times out, or
    /// the request is rejected. Rejections are silent no-ops by design:
    /// unresolved port names, a swap already in flight, and wrong-capability
    /// calls all leave the device untouched.
    pub async fn set_matrix_output(&self, output: &str, input: &str) -> SwapOutcome {
        if self.config.family != DeviceFamily::Matrix {
            debug!(driver = %self.config.short_name, "ignoring matrix switch on single-output driver");
            return SwapOutcome::Rejected;
        }
        if self.cmd_rx.is_some() {
            return SwapOutcome::Rejected;
        }

        let (done_tx, done_rx) = oneshot::channel();
        let command = DriverCommand::SwitchMatrix {
            output: output.to_string(),
            input: input.to_string(),
            done: done_tx,
        };
        if self.cmd_tx.send(command).await.is_err() {
            return SwapOutcome::Rejected;
        }
        done_rx.await.unwrap_or(SwapOutcome::Rejected)
    }

    /// Select `input` on a single-output device
    ///
    /// Fire-and-forget: the protocol has no confirmation to wait for.
    pub async fn set_single_output(&self, input: &str) {
        if self.config.family != DeviceFamily::Single {
            debug!(driver = %self.config.short_name, "ignoring channel select on matrix driver");
            return;
        }
        if self.cmd_rx.is_some() {
            return;
        }
        let _ = self
            .cmd_tx
            .send(DriverCommand::SwitchSingle {
                input: input.to_string(),
            })
            .await;
    }

    /// Re-issue the status query on devices that support one; no-op
    /// otherwise
    pub async fn refresh_status(&self) {
        if self.cmd_rx.is_some() {
            return;
        }
        let _ = self.cmd_tx.send(DriverCommand::RefreshStatus).await;
    }

    /// Stop the driver tasks and disconnect from the device
    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(DriverCommand::Shutdown).await;
    }
}

/// Protocol state machine behind a driver, chosen at construction
#[derive(Debug)]
enum DeviceMachine {
    Matrix(MatrixState),
    Single(KvmState),
}

impl DeviceMachine {
    fn new(family: DeviceFamily) -> Self {
        match family {
            DeviceFamily::Matrix => Self::Matrix(MatrixState::new()),
            DeviceFamily::Single => Self::Single(KvmState::new()),
        }
    }
}

/// A swap awaiting its confirmation line
#[derive(Debug)]
struct PendingSwap {
    output: String,
    input: String,
    done: oneshot::Sender<SwapOutcome>,
    deadline: Instant,
}

/// The processing task: sole owner and writer of driver state
struct DriverRuntime {
    machine: DeviceMachine,
    config: DeviceConfig,
    status: watch::Sender<DriverStatus>,
    write_tx: mpsc::Sender<String>,
    event_rx: mpsc::Receiver<TransportEvent>,
    cmd_rx: mpsc::Receiver<DriverCommand>,
    pending: Option<PendingSwap>,
}

impl DriverRuntime {
    async fn run(mut self) {
        info!(driver = %self.config.short_name, "driver started");

        // Give the device (and the USB serial adapter) a moment before the
        // first command; both supported devices drop bytes written into a
        // freshly opened port.
        tokio::time::sleep(Duration::from_millis(self.config.settle_delay_ms)).await;
        self.bootstrap().await;

        loop {
            let deadline = self
                .pending
                .as_ref()
                .map(|pending| pending.deadline)
                .unwrap_or_else(Instant::now);

            tokio::select! {
                command = self.cmd_rx.recv() => match command {
                    Some(DriverCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                event = self.event_rx.recv() => match event {
                    Some(TransportEvent::Line(line)) => self.handle_line(&line),
                    Some(TransportEvent::WriteFailed(message)) => {
                        self.record_error(DriverError::WriteFailed(message));
                    }
                    Some(TransportEvent::Closed(message)) => {
                        self.connection_lost(message);
                        break;
                    }
                    None => {
                        self.connection_lost("transport tasks exited".to_string());
                        break;
                    }
                },
                _ = sleep_until(deadline), if self.pending.is_some() => {
                    self.expire_swap();
                }
            }
        }

        if let Some(pending) = self.pending.take() {
            let _ = pending.done.send(SwapOutcome::Rejected);
        }
        info!(driver = %self.config.short_name, "driver stopped");
    }

    /// First contact after the settle delay
    async fn bootstrap(&mut self) {
        match &mut self.machine {
            DeviceMachine::Matrix(state) => {
                state.begin_status();
                let _ = self.write_tx.send(blustream::STATUS_QUERY.to_string()).await;
            }
            DeviceMachine::Single(_) => {
                // The KVM has no status query; provoke the handshake ERROR
                // with a command it cannot understand.
                let _ = self
                    .write_tx
                    .send(startech::BOOTSTRAP_PROBE.to_string())
                    .await;
            }
        }
    }

    async fn handle_command(&mut self, command: DriverCommand) {
        match command {
            DriverCommand::SwitchMatrix {
                output,
                input,
                done,
            } => self.switch_matrix(output, input, done).await,
            DriverCommand::SwitchSingle { input } => {
                let _ = self.write_tx.send(startech::select_command(&input)).await;
            }
            DriverCommand::RefreshStatus => {
                if let DeviceMachine::Matrix(state) = &mut self.machine {
                    state.begin_status();
                    let _ = self.write_tx.send(blustream::STATUS_QUERY.to_string()).await;
                }
            }
            DriverCommand::Shutdown => {}
        }
    }

    async fn switch_matrix(
        &mut self,
        output: String,
        input: String,
        done: oneshot::Sender<SwapOutcome>,
    ) {
        if self.pending.is_some() {
            debug!(
                driver = %self.config.short_name,
                %output, %input,
                "swap already in flight; rejecting"
            );
            let _ = done.send(SwapOutcome::Rejected);
            return;
        }

        let DeviceMachine::Matrix(state) = &self.machine else {
            let _ = done.send(SwapOutcome::Rejected);
            return;
        };
        if state.find_output(&output).is_none() || state.find_input(&input).is_none() {
            debug!(
                driver = %self.config.short_name,
                %output, %input,
                "ignoring switch to unresolved target"
            );
            let _ = done.send(SwapOutcome::Rejected);
            return;
        }

        info!(driver = %self.config.short_name, %output, %input, "switching output");
        if self
            .write_tx
            .send(blustream::switch_command(&output, &input))
            .await
            .is_err()
        {
            let _ = done.send(SwapOutcome::Rejected);
            return;
        }

        let deadline = Instant::now() + Duration::from_millis(self.config.swap_timeout_ms);
        self.pending = Some(PendingSwap {
            output,
            input,
            done,
            deadline,
        });
        self.status.send_modify(|status| status.switching = true);
    }

    fn handle_line(&mut self, line: &str) {
        if matches!(self.machine, DeviceMachine::Matrix(_)) {
            self.handle_matrix_line(line);
        } else {
            self.handle_kvm_line(line);
        }
    }

    fn handle_matrix_line(&mut self, line: &str) {
        let DeviceMachine::Matrix(state) = &mut self.machine else {
            return;
        };
        let Some(event) = state.process_line(line) else {
            return;
        };
        let inputs = state.inputs().to_vec();
        let outputs = state.outputs().to_vec();

        match event {
            MatrixEvent::SwapConfirmed { output, input } => {
                info!(
                    driver = %self.config.short_name,
                    %output, %input,
                    "swap confirmed"
                );
                if let Some(pending) = self.pending.take() {
                    let _ = pending.done.send(SwapOutcome::Completed);
                }
                self.status.send_modify(|status| status.switching = false);
            }
            MatrixEvent::ModelIdentified { name } => {
                info!(driver = %self.config.short_name, %name, "device identified");
                self.status.send_modify(|status| status.name = name);
            }
            MatrixEvent::StatusComplete => {
                self.status.send_modify(|status| {
                    status.running = true;
                    status.inputs = inputs;
                    status.outputs = outputs;
                });
            }
            MatrixEvent::InputChanged { .. } | MatrixEvent::OutputChanged { .. } => {
                self.status.send_modify(|status| {
                    status.inputs = inputs;
                    status.outputs = outputs;
                });
            }
        }
    }

    fn handle_kvm_line(&mut self, line: &str) {
        let DeviceMachine::Single(state) = &mut self.machine else {
            return;
        };
        let Some(event) = state.process_line(line) else {
            return;
        };

        match event {
            KvmEvent::HandshakeComplete => {
                info!(driver = %self.config.short_name, "handshake complete");
                self.status.send_modify(|status| status.running = true);
            }
            KvmEvent::Fault { message } => {
                warn!(driver = %self.config.short_name, %message, "device reported a fault");
                self.status.send_modify(|status| {
                    status.has_error = true;
                    status.last_error = Some(message);
                });
            }
            KvmEvent::NameIdentified { name } => {
                info!(driver = %self.config.short_name, %name, "device identified");
                self.status.send_modify(|status| status.name = name);
            }
            KvmEvent::ChannelChanged { channel } => {
                self.status
                    .send_modify(|status| status.active_channel = Some(channel));
            }
        }
    }

    /// Release the swap gate when the device never confirms
    fn expire_swap(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        warn!(
            driver = %self.config.short_name,
            output = %pending.output,
            input = %pending.input,
            timeout_ms = self.config.swap_timeout_ms,
            "no confirmation before deadline; releasing swap gate"
        );
        let _ = pending.done.send(SwapOutcome::TimedOut);
        self.status.send_modify(|status| status.switching = false);
    }

    fn record_error(&mut self, err: DriverError) {
        warn!(driver = %self.config.short_name, %err, "recording driver error");
        self.status.send_modify(|status| {
            status.has_error = true;
            status.last_error = Some(err.to_string());
        });
    }

    fn connection_lost(&mut self, message: String) {
        let err = DriverError::ConnectionLost(message);
        warn!(driver = %self.config.short_name, %err, "connection lost");
        self.status.send_modify(|status| {
            status.running = false;
            status.has_error = true;
            status.last_error = Some(err.to_string());
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(family: DeviceFamily) -> DeviceConfig {
        DeviceConfig {
            name: "Test device".to_string(),
            short_name: "test".to_string(),
            family,
            serial_path: "/dev/null".to_string(),
            baud_rate: 57_600,
            swap_timeout_ms: 100,
            settle_delay_ms: 0,
        }
    }

    #[test]
    fn test_initial_status() {
        let driver = Driver::new(test_config(DeviceFamily::Matrix));
        let status = driver.status();
        assert_eq!(status.name, "Test device");
        assert!(!status.running);
        assert!(!status.start_attempted);
        assert!(!status.switching);
        assert!(status.inputs.is_empty());
    }

    #[tokio::test]
    async fn test_unstarted_driver_rejects_swaps() {
        let driver = Driver::new(test_config(DeviceFamily::Matrix));
        assert_eq!(
            driver.set_matrix_output("01", "02").await,
            SwapOutcome::Rejected
        );
    }

    #[tokio::test]
    async fn test_wrong_capability_is_rejected() {
        let driver = Driver::new(test_config(DeviceFamily::Single));
        assert_eq!(
            driver.set_matrix_output("01", "02").await,
            SwapOutcome::Rejected
        );

        // And the inverse shape on a matrix driver is silently dropped
        let driver = Driver::new(test_config(DeviceFamily::Matrix));
        driver.set_single_output("1").await;
    }

    #[test]
    fn test_status_snapshot_serializes() {
        let driver = Driver::new(test_config(DeviceFamily::Single));
        let json = serde_json::to_value(driver.status()).unwrap();
        assert_eq!(json["short_name"], "test");
        assert_eq!(json["family"], "single");
        assert_eq!(json["running"], false);
    }
}
