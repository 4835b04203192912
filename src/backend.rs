//! The device control façade: one method per driver entry point, owned values
//! in and out.
use crate::drivers::{Interferogram, Result, Spectrum, WavelengthGrid};
use crate::types::{CalibrationData, DeviceHandle, DeviceIdentity, MeasurementMode, PortName, WriteReport};
/// Inputs of one processing call.
#[derive(Clone, Debug)]
pub struct ProcessRequest<'a> {
    pub interferogram: &'a [i32],
    /// Status of the capture that produced `interferogram`; non-zero short-circuits.
    pub upstream_status: i32,
    pub voltage_waveform: &'a [f64],
    pub calibration_relation: &'a [f64],
    pub grid: WavelengthGrid,
    pub mode: MeasurementMode,
}
impl<'a> ProcessRequest<'a> {
    pub fn new(
        interferogram: &'a [i32],
        calibration: &'a CalibrationData,
        grid: WavelengthGrid,
        mode: MeasurementMode,
    ) -> Self {
        Self {
            interferogram,
            upstream_status: 0,
            voltage_waveform: &calibration.voltage_waveform,
            calibration_relation: &calibration.calibration_relation,
            grid,
            mode,
        }
    }
}
/// Blocking instrument operations. Each call performs exactly one action and
/// never retries on its own.
pub trait FtirBackend: Send {
    /// Short name for logs.
    fn name(&self) -> &'static str;
    fn connect(&mut self, port: &PortName) -> Result<String>;
    fn serial_number(&mut self, port: &PortName) -> Result<DeviceIdentity>;
    /// Waits `delay_ms`, then reads exactly `len` samples.
    fn capture_interferogram(&mut self, port: &PortName, delay_ms: u32, len: usize) -> Result<Interferogram>;
    fn process(&mut self, request: &ProcessRequest<'_>) -> Result<Spectrum>;
    fn read_calibration(&mut self, port: &PortName, waveform_len: usize, relation_len: usize) -> Result<CalibrationData>;
    fn write_calibration(&mut self, port: &PortName, calibration_text: &str) -> Result<WriteReport>;
    fn write_waveform(&mut self, max_voltage: f64, waveform_text: &str, port: &PortName) -> Result<WriteReport>;
    fn auto_align(&mut self, handle: DeviceHandle) -> Result<()>;
    fn auto_wavelength_calib(
        &mut self,
        delay_ms: u32,
        laser_wavelength_nm: f64,
        voltage_waveform: &[f64],
        port: &PortName,
    ) -> Result<()>;
    /// Most recent error text.
    fn last_error(&mut self) -> Result<String>;
    /// Forgets any per-port connection. The driver has no close call, so this
    /// only affects backend-side bookkeeping.
    fn release(&mut self, _port: &PortName) {}
}
