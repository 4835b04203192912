//! Connection lifecycle around a backend, plus the averaged measurement
//! workflow built on top of it.
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use crate::backend::{FtirBackend, ProcessRequest};
use crate::drivers::{FtirError, Interferogram, Result, ScanAccumulator, Spectrum, SpectrumProcessor, WavelengthGrid};
use crate::types::{CalibrationData, DeviceHandle, DeviceIdentity, MeasurementMode, PortName, WriteReport};
/// Bounds of the scan averaging count.
pub const MIN_SCAN_AVERAGE: usize = 1;
pub const MAX_SCAN_AVERAGE: usize = 10_000;
pub const DEFAULT_CAPTURE_ATTEMPTS: u32 = 5;
const BASE_TIMEOUT: Duration = Duration::from_secs(120);
const PER_SCAN_TIMEOUT: Duration = Duration::from_millis(500);
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceState {
    Disconnected,
    Connected,
    Busy,
    Faulted,
}
impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceState::Disconnected => "disconnected",
            DeviceState::Connected => "connected",
            DeviceState::Busy => "busy",
            DeviceState::Faulted => "faulted",
        };
        f.write_str(name)
    }
}
/// Read-only view of a session's state that can be handed to other threads.
#[derive(Clone, Debug)]
pub struct StateHandle(Arc<Mutex<DeviceState>>);
impl StateHandle {
    pub fn get(&self) -> DeviceState {
        *self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
    fn set(&self, state: DeviceState) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }
}
/// Parameters of one averaged measurement.
#[derive(Clone, Debug, PartialEq)]
pub struct MeasurementSettings {
    pub delay_ms: u32,
    pub interferogram_len: usize,
    /// Grid the backend processes onto.
    pub grid: WavelengthGrid,
    /// Reported range, `window_min_nm <= wavelength < window_max_nm`.
    pub window_min_nm: f64,
    pub window_max_nm: f64,
    pub mode: MeasurementMode,
    pub scan_average: usize,
    pub align_first: bool,
    pub capture_attempts: u32,
    pub waveform_capacity: usize,
    pub relation_capacity: usize,
}
impl Default for MeasurementSettings {
    fn default() -> Self {
        Self {
            delay_ms: 0,
            interferogram_len: 8192,
            grid: WavelengthGrid {
                min_nm: 900.0,
                max_nm: 2600.0,
                points: 1701,
            },
            window_min_nm: 950.0,
            window_max_nm: 2451.0,
            mode: MeasurementMode::Raw,
            scan_average: 1,
            align_first: false,
            capture_attempts: DEFAULT_CAPTURE_ATTEMPTS,
            waveform_capacity: 4096,
            relation_capacity: 64,
        }
    }
}
impl MeasurementSettings {
    pub fn validate(&self) -> Result<()> {
        if !(MIN_SCAN_AVERAGE..=MAX_SCAN_AVERAGE).contains(&self.scan_average) {
            return Err(FtirError::invalid(format!(
                "scan average {} outside {MIN_SCAN_AVERAGE}..={MAX_SCAN_AVERAGE}",
                self.scan_average
            )));
        }
        if self.interferogram_len == 0 {
            return Err(FtirError::invalid("interferogram length must be positive"));
        }
        if self.capture_attempts == 0 {
            return Err(FtirError::invalid("at least one capture attempt is required"));
        }
        if self.waveform_capacity == 0 || self.relation_capacity == 0 {
            return Err(FtirError::invalid("calibration capacities must be positive"));
        }
        if !(self.window_min_nm < self.window_max_nm) {
            return Err(FtirError::invalid(format!(
                "window {}..{} nm is empty",
                self.window_min_nm, self.window_max_nm
            )));
        }
        self.grid.validate()
    }
    /// Two minutes plus half a second per scan.
    ///
    /// [`Session::measure`] checks it before each scan and cannot interrupt a
    /// capture already in progress. Callers that must not block on a hung
    /// device should run the measurement through [`crate::Engine::request`]
    /// with this timeout.
    pub fn timeout(&self) -> Duration {
        BASE_TIMEOUT + PER_SCAN_TIMEOUT * self.scan_average as u32
    }
}
/// Result of [`Session::measure`]: every windowed scan and their mean.
#[derive(Clone, Debug)]
pub struct Measurement {
    pub scans: Vec<Spectrum>,
    pub average: Spectrum,
}
pub struct Session {
    backend: Box<dyn FtirBackend>,
    state: StateHandle,
    port: Option<PortName>,
    status_text: Option<String>,
    identity: Option<DeviceIdentity>,
}
impl Session {
    pub fn new(backend: Box<dyn FtirBackend>) -> Self {
        Self {
            backend,
            state: StateHandle(Arc::new(Mutex::new(DeviceState::Disconnected))),
            port: None,
            status_text: None,
            identity: None,
        }
    }
    pub fn state(&self) -> DeviceState {
        self.state.get()
    }
    pub fn state_handle(&self) -> StateHandle {
        self.state.clone()
    }
    pub fn port(&self) -> Option<&PortName> {
        self.port.as_ref()
    }
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }
    fn set_state(&self, state: DeviceState) {
        let previous = self.state.get();
        if previous != state {
            debug!("session {previous} -> {state}");
        }
        self.state.set(state);
    }
    fn require_connected(&self, operation: &'static str) -> Result<PortName> {
        match (self.state.get(), &self.port) {
            (DeviceState::Connected, Some(port)) => Ok(port.clone()),
            (state, _) => Err(FtirError::InvalidState { operation, state }),
        }
    }
    /// Settles the state after a device call.
    fn finish<T>(&self, operation: &'static str, result: Result<T>) -> Result<T> {
        match &result {
            Err(err) if err.is_fault() => {
                error!("{operation} failed: {err}");
                self.set_state(DeviceState::Faulted);
            }
            Err(err) => {
                warn!("{operation} rejected: {err}");
                self.set_state(DeviceState::Connected);
            }
            Ok(_) => self.set_state(DeviceState::Connected),
        }
        result
    }
    fn run<T>(
        &mut self,
        operation: &'static str,
        call: impl FnOnce(&mut dyn FtirBackend, &PortName) -> Result<T>,
    ) -> Result<T> {
        let port = self.require_connected(operation)?;
        self.set_state(DeviceState::Busy);
        let result = call(self.backend.as_mut(), &port);
        self.finish(operation, result)
    }
    /// Opens `port`. Connecting again to the open port returns the status text of
    /// the first connect without touching the device.
    pub fn connect(&mut self, port: PortName) -> Result<String> {
        match self.state.get() {
            DeviceState::Connected if self.port.as_ref() == Some(&port) => {
                if let Some(status) = &self.status_text {
                    return Ok(status.clone());
                }
            }
            DeviceState::Connected | DeviceState::Busy => {
                return Err(FtirError::InvalidState {
                    operation: "connect",
                    state: self.state.get(),
                })
            }
            DeviceState::Disconnected | DeviceState::Faulted => {}
        }
        if let Some(previous) = self.port.take() {
            self.backend.release(&previous);
        }
        self.identity = None;
        self.status_text = None;
        self.set_state(DeviceState::Busy);
        match self.backend.connect(&port) {
            Ok(status) => {
                info!("connected to {port} via {}: {status}", self.backend.name());
                self.port = Some(port);
                self.status_text = Some(status.clone());
                self.set_state(DeviceState::Connected);
                Ok(status)
            }
            Err(err) => {
                error!("connect to {port} failed: {err}");
                self.set_state(DeviceState::Disconnected);
                Err(err)
            }
        }
    }
    pub fn disconnect(&mut self) {
        if let Some(port) = self.port.take() {
            self.backend.release(&port);
            info!("disconnected from {port}");
        }
        self.identity = None;
        self.status_text = None;
        self.set_state(DeviceState::Disconnected);
    }
    pub fn identify(&mut self) -> Result<DeviceIdentity> {
        let identity = self.run("read serial number", |backend, port| backend.serial_number(port))?;
        self.identity = Some(identity.clone());
        Ok(identity)
    }
    /// Handle of the connected instrument, asking the device on first use.
    pub fn handle(&mut self) -> Result<DeviceHandle> {
        match &self.identity {
            Some(identity) => Ok(identity.handle()),
            None => Ok(self.identify()?.handle()),
        }
    }
    pub fn capture(&mut self, delay_ms: u32, len: usize) -> Result<Interferogram> {
        self.run("capture", |backend, port| backend.capture_interferogram(port, delay_ms, len))
    }
    /// Runs the backend's processing. No device I/O is involved, so this works
    /// in any state but `Busy` and leaves the state alone.
    pub fn process(
        &mut self,
        interferogram: &Interferogram,
        calibration: &CalibrationData,
        grid: WavelengthGrid,
        mode: MeasurementMode,
    ) -> Result<Spectrum> {
        if self.state.get() == DeviceState::Busy {
            return Err(FtirError::InvalidState {
                operation: "process",
                state: DeviceState::Busy,
            });
        }
        let request = ProcessRequest::new(&interferogram.samples, calibration, grid, mode);
        self.backend.process(&request)
    }
    pub fn read_calibration(&mut self, waveform_len: usize, relation_len: usize) -> Result<CalibrationData> {
        self.run("read calibration", |backend, port| {
            backend.read_calibration(port, waveform_len, relation_len)
        })
    }
    pub fn write_calibration(&mut self, calibration_text: &str) -> Result<WriteReport> {
        self.run("write calibration", |backend, port| {
            backend.write_calibration(port, calibration_text)
        })
    }
    pub fn write_waveform(&mut self, max_voltage: f64, waveform_text: &str) -> Result<WriteReport> {
        self.run("write waveform", |backend, port| {
            backend.write_waveform(max_voltage, waveform_text, port)
        })
    }
    pub fn auto_align(&mut self) -> Result<()> {
        let handle = self.handle()?;
        self.run("auto align", |backend, _| backend.auto_align(handle))
    }
    pub fn auto_calibrate(&mut self, delay_ms: u32, laser_wavelength_nm: f64, voltage_waveform: &[f64]) -> Result<()> {
        self.run("auto wavelength calibration", |backend, port| {
            backend.auto_wavelength_calib(delay_ms, laser_wavelength_nm, voltage_waveform, port)
        })
    }
    /// Most recent error text of the backend. Allowed in every state.
    pub fn last_error(&mut self) -> Result<String> {
        self.backend.last_error()
    }
    /// Captures, processes and averages `settings.scan_average` scans, then
    /// trims them to the reporting window.
    pub fn measure(&mut self, settings: &MeasurementSettings) -> Result<Measurement> {
        settings.validate()?;
        if settings.align_first {
            self.auto_align()?;
        }
        let port = self.require_connected("measure")?;
        self.set_state(DeviceState::Busy);
        let result = self.measure_on(&port, settings);
        self.finish("measure", result)
    }
    fn measure_on(&mut self, port: &PortName, settings: &MeasurementSettings) -> Result<Measurement> {
        let started = Instant::now();
        let timeout = settings.timeout();
        let calibration =
            self.backend
                .read_calibration(port, settings.waveform_capacity, settings.relation_capacity)?;
        let mut accumulator = ScanAccumulator::with_capacity(settings.scan_average);
        for scan in 1..=settings.scan_average {
            if started.elapsed() > timeout {
                return Err(FtirError::Timeout(timeout));
            }
            let interferogram = self.capture_with_retries(port, settings)?;
            let request = ProcessRequest::new(&interferogram.samples, &calibration, settings.grid, settings.mode);
            let spectrum = self.backend.process(&request)?;
            accumulator.push(&spectrum)?;
            debug!("scan {scan}/{} done", settings.scan_average);
        }
        let average = accumulator
            .average()?
            .window(settings.window_min_nm, settings.window_max_nm)?;
        let scans = accumulator
            .scans()?
            .iter()
            .map(|s| s.window(settings.window_min_nm, settings.window_max_nm))
            .collect::<Result<Vec<_>>>()?;
        info!(
            "measured {} scans on {port} in {:.1?}",
            scans.len(),
            started.elapsed()
        );
        Ok(Measurement { scans, average })
    }
    fn capture_with_retries(&mut self, port: &PortName, settings: &MeasurementSettings) -> Result<Interferogram> {
        let mut attempt = 1;
        loop {
            match self
                .backend
                .capture_interferogram(port, settings.delay_ms, settings.interferogram_len)
            {
                Ok(scan) => return Ok(scan),
                Err(err) if err.is_fault() && attempt < settings.capture_attempts => {
                    warn!(
                        "capture attempt {attempt}/{} failed: {err}",
                        settings.capture_attempts
                    );
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
/// Processes recorded scans through a session's backend with one calibration.
pub struct SessionProcessor<'a> {
    session: &'a mut Session,
    calibration: CalibrationData,
    grid: WavelengthGrid,
    mode: MeasurementMode,
}
impl<'a> SessionProcessor<'a> {
    pub fn new(session: &'a mut Session, calibration: CalibrationData, grid: WavelengthGrid, mode: MeasurementMode) -> Self {
        Self {
            session,
            calibration,
            grid,
            mode,
        }
    }
}
impl SpectrumProcessor for SessionProcessor<'_> {
    fn process_scan(&mut self, scan: &Interferogram) -> Result<Spectrum> {
        self.session.process(scan, &self.calibration, self.grid, self.mode)
    }
}
impl Drop for Session {
    fn drop(&mut self) {
        if let Some(port) = self.port.take() {
            self.backend.release(&port);
        }
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::DeviceStatus;
    use std::collections::VecDeque;
    /// Backend with scripted capture outcomes.
    #[derive(Default)]
    struct Scripted {
        captures: VecDeque<Result<Vec<i32>>>,
        connects: usize,
        aligned: Vec<DeviceHandle>,
    }
    impl FtirBackend for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }
        fn connect(&mut self, port: &PortName) -> Result<String> {
            if port.as_str() == "COM9" {
                return Err(FtirError::PortUnavailable(port.to_string()));
            }
            self.connects += 1;
            Ok(format!("open #{}", self.connects))
        }
        fn serial_number(&mut self, _port: &PortName) -> Result<DeviceIdentity> {
            Ok(DeviceIdentity {
                serial_number: "SN-1".into(),
                device_number: 4,
            })
        }
        fn capture_interferogram(&mut self, port: &PortName, _delay_ms: u32, len: usize) -> Result<Interferogram> {
            match self.captures.pop_front() {
                Some(Ok(samples)) => Ok(Interferogram::new(port.as_str(), samples)),
                Some(Err(err)) => Err(err),
                None => Ok(Interferogram::new(port.as_str(), vec![1; len])),
            }
        }
        fn process(&mut self, request: &ProcessRequest<'_>) -> Result<Spectrum> {
            let level = request.interferogram.iter().map(|&v| v as f64).sum::<f64>();
            Spectrum::new(request.grid, request.mode, vec![level; request.grid.points])
        }
        fn read_calibration(&mut self, _port: &PortName, _w: usize, _r: usize) -> Result<CalibrationData> {
            Ok(CalibrationData {
                voltage_waveform: vec![0.0],
                calibration_relation: vec![0.0, 50_000.0],
            })
        }
        fn write_calibration(&mut self, _port: &PortName, _text: &str) -> Result<WriteReport> {
            Ok(WriteReport::ok())
        }
        fn write_waveform(&mut self, _v: f64, _text: &str, _port: &PortName) -> Result<WriteReport> {
            Ok(WriteReport::ok())
        }
        fn auto_align(&mut self, handle: DeviceHandle) -> Result<()> {
            self.aligned.push(handle);
            Ok(())
        }
        fn auto_wavelength_calib(&mut self, _d: u32, laser: f64, _w: &[f64], _p: &PortName) -> Result<()> {
            if laser <= 0.0 {
                return Err(FtirError::invalid("laser"));
            }
            Ok(())
        }
        fn last_error(&mut self) -> Result<String> {
            Ok(String::new())
        }
    }
    fn com3() -> PortName {
        PortName::new("COM3").unwrap()
    }
    fn settings(scans: usize) -> MeasurementSettings {
        MeasurementSettings {
            interferogram_len: 4,
            grid: WavelengthGrid::new(900.0, 1000.0, 11).unwrap(),
            window_min_nm: 920.0,
            window_max_nm: 960.0,
            scan_average: scans,
            ..MeasurementSettings::default()
        }
    }
    fn saturated() -> Result<Vec<i32>> {
        Err(FtirError::device("FTIR_GetSpectrum", 9))
    }
    #[test]
    fn recorded_scans_average_through_the_backend() {
        use crate::drivers::{ManualSource, SpectrumPipeline};
        let mut session = Session::new(Box::new(Scripted::default()));
        let calibration = CalibrationData {
            voltage_waveform: vec![0.0],
            calibration_relation: vec![0.0, 50_000.0],
        };
        let grid = settings(1).grid;
        let source = ManualSource::new(vec![
            Interferogram::new("COM3", vec![1, 1, 1, 1]),
            Interferogram::new("COM3", vec![3, 3, 3, 3]),
        ]);
        let processor = SessionProcessor::new(&mut session, calibration, grid, MeasurementMode::Raw);
        let mut pipeline = SpectrumPipeline::new(source, processor, 2);
        let average = pipeline.run().unwrap();
        assert_eq!(pipeline.accumulator().len(), 2);
        assert_eq!(average.values, vec![8.0; 11]);
        drop(pipeline);
        assert_eq!(session.state(), DeviceState::Disconnected);
    }
    #[test]
    fn operations_require_a_connection() {
        let mut session = Session::new(Box::new(Scripted::default()));
        let err = session.capture(0, 16).unwrap_err();
        assert!(matches!(err, FtirError::InvalidState { state: DeviceState::Disconnected, .. }));
        assert_eq!(session.state(), DeviceState::Disconnected);
    }
    #[test]
    fn repeated_connect_returns_cached_status() {
        let mut session = Session::new(Box::new(Scripted::default()));
        assert_eq!(session.connect(com3()).unwrap(), "open #1");
        assert_eq!(session.connect(com3()).unwrap(), "open #1");
        assert_eq!(session.state(), DeviceState::Connected);
        let err = session.connect(PortName::new("COM4").unwrap()).unwrap_err();
        assert!(matches!(err, FtirError::InvalidState { .. }));
        session.disconnect();
        assert_eq!(session.state(), DeviceState::Disconnected);
        assert_eq!(session.connect(com3()).unwrap(), "open #2");
    }
    #[test]
    fn failed_connect_stays_disconnected() {
        let mut session = Session::new(Box::new(Scripted::default()));
        assert_eq!(session.connect(PortName::new("COM9").unwrap()).unwrap_err().status_code(), 14);
        assert_eq!(session.state(), DeviceState::Disconnected);
        assert!(session.port().is_none());
    }
    #[test]
    fn device_errors_fault_but_argument_errors_do_not() {
        let backend = Scripted {
            captures: VecDeque::from(vec![saturated()]),
            ..Scripted::default()
        };
        let mut session = Session::new(Box::new(backend));
        session.connect(com3()).unwrap();
        assert!(session.auto_calibrate(0, -1.0, &[0.0]).is_err());
        assert_eq!(session.state(), DeviceState::Connected);
        assert_eq!(session.capture(0, 4).unwrap_err().status_code(), 9);
        assert_eq!(session.state(), DeviceState::Faulted);
        assert!(session.capture(0, 4).is_err());
        session.connect(com3()).unwrap();
        assert_eq!(session.state(), DeviceState::Connected);
    }
    #[test]
    fn measure_retries_and_averages() {
        let backend = Scripted {
            captures: VecDeque::from(vec![saturated(), Ok(vec![1, 1, 1, 1]), saturated(), Ok(vec![2, 2, 2, 2])]),
            ..Scripted::default()
        };
        let mut session = Session::new(Box::new(backend));
        session.connect(com3()).unwrap();
        let measurement = session.measure(&settings(2)).unwrap();
        assert_eq!(measurement.scans.len(), 2);
        assert_eq!(measurement.average.values, vec![6.0; 4]);
        assert_eq!(measurement.average.grid.min_nm, 920.0);
        assert!(measurement.average.grid.max_nm < 960.0);
        assert_eq!(session.state(), DeviceState::Connected);
    }
    #[test]
    fn measure_gives_up_after_the_last_attempt() {
        let backend = Scripted {
            captures: (0..5).map(|_| saturated()).collect(),
            ..Scripted::default()
        };
        let mut session = Session::new(Box::new(backend));
        session.connect(com3()).unwrap();
        let err = session.measure(&settings(1)).unwrap_err();
        assert!(matches!(
            err,
            FtirError::Device {
                status: DeviceStatus::DetectorSaturation,
                ..
            }
        ));
        assert_eq!(session.state(), DeviceState::Faulted);
    }
    #[test]
    fn measure_rejects_bad_scan_counts_without_faulting() {
        let mut session = Session::new(Box::new(Scripted::default()));
        session.connect(com3()).unwrap();
        assert!(session.measure(&settings(0)).is_err());
        assert!(session.measure(&settings(MAX_SCAN_AVERAGE + 1)).is_err());
        assert_eq!(session.state(), DeviceState::Connected);
    }
    #[test]
    fn timeout_grows_with_scan_count() {
        assert_eq!(settings(1).timeout(), Duration::from_millis(120_500));
        assert_eq!(settings(10).timeout(), Duration::from_secs(125));
    }
    #[test]
    fn state_is_visible_through_the_handle() {
        let mut session = Session::new(Box::new(Scripted::default()));
        let handle = session.state_handle();
        session.connect(com3()).unwrap();
        assert_eq!(handle.get(), DeviceState::Connected);
        session.auto_align().unwrap();
        session.disconnect();
        assert_eq!(handle.get(), DeviceState::Disconnected);
    }
}
