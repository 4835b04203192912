// src/engine.rs
use std::cell::Cell;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use log::{debug, error};
use crate::drivers::{FtirError, Result};
use crate::session::{DeviceState, MeasurementSettings, Session, StateHandle};
use crate::types::{DeviceCommand, DeviceEvent};
/// Id the engine thread uses for events not caused by a request.
pub const UNSOLICITED: u64 = 0;
/// Runs `session` on its own thread until `Shutdown` arrives or every sender is dropped.
///
/// Every event is sent with the id of the command that caused it.
/// `defaults` supplies the calibration buffer capacities for commands that do
/// not carry their own settings.
pub fn spawn_thread(
    mut session: Session,
    defaults: MeasurementSettings,
    tx: Sender<(u64, DeviceEvent)>,
    rx_cmd: Receiver<(u64, DeviceCommand)>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let ready = format!("engine ready ({} backend)", session.backend_name());
        tx.send((UNSOLICITED, DeviceEvent::Log(ready))).ok();
        let mut last_state = session.state();
        while let Ok((id, cmd)) = rx_cmd.recv() {
            if matches!(cmd, DeviceCommand::Shutdown) {
                session.disconnect();
                tx.send((id, DeviceEvent::State(session.state()))).ok();
                tx.send((id, DeviceEvent::Done("shutdown"))).ok();
                break;
            }
            let operation = operation_name(&cmd);
            debug!("engine: {operation} (request {id})");
            match execute(&mut session, &defaults, cmd) {
                Ok(events) => {
                    for event in events {
                        tx.send((id, event)).ok();
                    }
                    report_state(&session, &mut last_state, id, &tx);
                    tx.send((id, DeviceEvent::Done(operation))).ok();
                }
                Err(err) => {
                    error!("engine: {operation}: {err}");
                    report_state(&session, &mut last_state, id, &tx);
                    let event = DeviceEvent::Error {
                        operation,
                        code: err.status_code(),
                        message: err.to_string(),
                    };
                    tx.send((id, event)).ok();
                }
            }
        }
        debug!("engine stopped");
    })
}
fn report_state(session: &Session, last_state: &mut DeviceState, id: u64, tx: &Sender<(u64, DeviceEvent)>) {
    let state = session.state();
    if state != *last_state {
        *last_state = state;
        tx.send((id, DeviceEvent::State(state))).ok();
    }
}
fn operation_name(cmd: &DeviceCommand) -> &'static str {
    match cmd {
        DeviceCommand::Connect(_) => "connect",
        DeviceCommand::Disconnect => "disconnect",
        DeviceCommand::Identify => "identify",
        DeviceCommand::Capture { .. } => "capture",
        DeviceCommand::Measure(_) => "measure",
        DeviceCommand::ReadCalibration => "read calibration",
        DeviceCommand::WriteCalibration(_) => "write calibration",
        DeviceCommand::WriteWaveform { .. } => "write waveform",
        DeviceCommand::AutoAlign => "auto align",
        DeviceCommand::AutoCalibrate { .. } => "auto calibrate",
        DeviceCommand::LastError => "last error",
        DeviceCommand::Shutdown => "shutdown",
    }
}
fn execute(session: &mut Session, defaults: &MeasurementSettings, cmd: DeviceCommand) -> Result<Vec<DeviceEvent>> {
    let events = match cmd {
        DeviceCommand::Connect(port) => {
            let status = session.connect(port)?;
            vec![DeviceEvent::Connected { status }]
        }
        DeviceCommand::Disconnect => {
            session.disconnect();
            vec![DeviceEvent::Log("disconnected".into())]
        }
        DeviceCommand::Identify => vec![DeviceEvent::Identity(session.identify()?)],
        DeviceCommand::Capture { delay_ms, len } => {
            vec![DeviceEvent::Interferogram(session.capture(delay_ms, len)?)]
        }
        DeviceCommand::Measure(settings) => {
            let measurement = session.measure(&settings)?;
            let mut events: Vec<DeviceEvent> = measurement
                .scans
                .into_iter()
                .map(DeviceEvent::Spectrum)
                .collect();
            events.push(DeviceEvent::Log(format!(
                "averaged {} scans",
                settings.scan_average
            )));
            events.push(DeviceEvent::Spectrum(measurement.average));
            events
        }
        DeviceCommand::ReadCalibration => vec![DeviceEvent::Calibration(
            session.read_calibration(defaults.waveform_capacity, defaults.relation_capacity)?,
        )],
        DeviceCommand::WriteCalibration(text) => {
            vec![DeviceEvent::WriteReport(session.write_calibration(&text)?)]
        }
        DeviceCommand::WriteWaveform { max_voltage, waveform } => {
            vec![DeviceEvent::WriteReport(session.write_waveform(max_voltage, &waveform)?)]
        }
        DeviceCommand::AutoAlign => {
            session.auto_align()?;
            vec![DeviceEvent::Log("alignment finished".into())]
        }
        DeviceCommand::AutoCalibrate { delay_ms, laser_wavelength_nm } => {
            let current = session.read_calibration(defaults.waveform_capacity, defaults.relation_capacity)?;
            session.auto_calibrate(delay_ms, laser_wavelength_nm, &current.voltage_waveform)?;
            let updated = session.read_calibration(defaults.waveform_capacity, defaults.relation_capacity)?;
            vec![DeviceEvent::Calibration(updated)]
        }
        DeviceCommand::LastError => vec![DeviceEvent::StatusText(session.last_error()?)],
        DeviceCommand::Shutdown => Vec::new(),
    };
    Ok(events)
}
/// Owner side of a running engine.
pub struct Engine {
    commands: Sender<(u64, DeviceCommand)>,
    events: Receiver<(u64, DeviceEvent)>,
    next_id: Cell<u64>,
    state: StateHandle,
    thread: Option<JoinHandle<()>>,
}
impl Engine {
    pub fn start(session: Session, defaults: MeasurementSettings) -> Self {
        let (tx_cmd, rx_cmd) = mpsc::channel();
        let (tx_event, rx_event) = mpsc::channel();
        let state = session.state_handle();
        let thread = spawn_thread(session, defaults, tx_event, rx_cmd);
        Self {
            commands: tx_cmd,
            events: rx_event,
            next_id: Cell::new(UNSOLICITED + 1),
            state,
            thread: Some(thread),
        }
    }
    /// Current session state, readable while a command is running.
    pub fn state(&self) -> DeviceState {
        self.state.get()
    }
    /// Queues `cmd` and returns the id its events will carry.
    pub fn send(&self, cmd: DeviceCommand) -> Result<u64> {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.commands
            .send((id, cmd))
            .map_err(|_| FtirError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "engine has stopped")))?;
        Ok(id)
    }
    /// Sends `cmd` and collects its events up to and including the closing
    /// `Done` or `Error`.
    ///
    /// Events left over from earlier requests, such as one that timed out,
    /// are discarded.
    pub fn request(&self, cmd: DeviceCommand, timeout: Duration) -> Result<Vec<DeviceEvent>> {
        let id = self.send(cmd)?;
        let deadline = Instant::now() + timeout;
        let mut collected = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok((event_id, _)) if event_id != id => {
                    debug!("dropping stale event of request {event_id}");
                }
                Ok((_, event)) => {
                    let last = matches!(event, DeviceEvent::Done(_) | DeviceEvent::Error { .. });
                    collected.push(event);
                    if last {
                        return Ok(collected);
                    }
                }
                Err(RecvTimeoutError::Timeout) => return Err(FtirError::Timeout(timeout)),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(FtirError::Io(std::io::Error::new(
                        std::io::ErrorKind::BrokenPipe,
                        "engine has stopped",
                    )))
                }
            }
        }
    }
    pub fn shutdown(mut self) {
        self.stop();
    }
    fn stop(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.commands.send((UNSOLICITED, DeviceCommand::Shutdown)).ok();
            thread.join().ok();
        }
    }
}
impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}
