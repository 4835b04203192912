use std::path::PathBuf;
use log::debug;
use crate::backend::{FtirBackend, ProcessRequest};
use crate::drivers::{FtirError, Interferogram, Result, Spectrum};
use crate::library::FtirLibrary;
use crate::types::{CalibrationData, DeviceHandle, DeviceIdentity, PortName, WriteReport};
/// Backend that forwards every call to the vendor driver.
pub struct DllBackend {
    api: &'static FtirLibrary,
    text_capacity: usize,
}
impl DllBackend {
    pub fn open(library_path: impl Into<PathBuf>, text_capacity: usize) -> Result<Self> {
        let library_path = library_path.into();
        let api = FtirLibrary::instance(&library_path)?;
        debug!("dll backend using {}", api.path().display());
        Ok(Self {
            api,
            text_capacity: text_capacity.max(1),
        })
    }
}
fn delay_arg(delay_ms: u32) -> Result<i32> {
    i32::try_from(delay_ms).map_err(|_| FtirError::invalid(format!("delay {delay_ms} ms is too long")))
}
impl FtirBackend for DllBackend {
    fn name(&self) -> &'static str {
        "dll"
    }
    fn connect(&mut self, port: &PortName) -> Result<String> {
        self.api.connect(port, self.text_capacity)
    }
    fn serial_number(&mut self, port: &PortName) -> Result<DeviceIdentity> {
        self.api.serial_number(port, self.text_capacity)
    }
    fn capture_interferogram(&mut self, port: &PortName, delay_ms: u32, len: usize) -> Result<Interferogram> {
        if len == 0 {
            return Err(FtirError::invalid("interferogram length must be positive"));
        }
        let samples = self.api.get_spectrum(port, delay_arg(delay_ms)?, len)?;
        debug!("captured {} samples on {port}", samples.len());
        Ok(Interferogram::new(port.as_str(), samples))
    }
    fn process(&mut self, request: &ProcessRequest<'_>) -> Result<Spectrum> {
        if request.upstream_status != 0 {
            return Err(FtirError::Upstream(request.upstream_status));
        }
        request.grid.validate()?;
        let values = self.api.data_process(
            request.interferogram,
            request.upstream_status,
            request.voltage_waveform,
            request.calibration_relation,
            request.grid.min_nm as f32,
            request.mode.as_u16(),
            request.grid.max_nm as f32,
            request.grid.points,
        )?;
        Spectrum::new(request.grid, request.mode, values)
    }
    fn read_calibration(&mut self, port: &PortName, waveform_len: usize, relation_len: usize) -> Result<CalibrationData> {
        self.api.read_calib(port, waveform_len, relation_len)
    }
    fn write_calibration(&mut self, port: &PortName, calibration_text: &str) -> Result<WriteReport> {
        self.api.manual_save_calib(port, calibration_text)
    }
    fn write_waveform(&mut self, max_voltage: f64, waveform_text: &str, port: &PortName) -> Result<WriteReport> {
        self.api.manual_save_waveform(max_voltage, waveform_text, port)
    }
    fn auto_align(&mut self, handle: DeviceHandle) -> Result<()> {
        self.api.auto_align(handle)
    }
    fn auto_wavelength_calib(
        &mut self,
        delay_ms: u32,
        laser_wavelength_nm: f64,
        voltage_waveform: &[f64],
        port: &PortName,
    ) -> Result<()> {
        self.api
            .auto_wavelength_calib(delay_arg(delay_ms)?, laser_wavelength_nm, voltage_waveform, port)
    }
    fn last_error(&mut self) -> Result<String> {
        self.api.dll_status(self.text_capacity)
    }
}
