//! TOML configuration.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working simulator setup.
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use log::info;
use serde::{Deserialize, Serialize};
use crate::backend::FtirBackend;
use crate::calibration::CalibrationStore;
use crate::dll::DllBackend;
use crate::drivers::{FtirError, Result, WavelengthGrid};
use crate::session::{MeasurementSettings, DEFAULT_CAPTURE_ATTEMPTS, MAX_SCAN_AVERAGE, MIN_SCAN_AVERAGE};
use crate::simulator::SimulatedBackend;
use crate::types::{ConnectionMode, MeasurementMode, PortName};
/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "NANOFTIR_CONFIG";
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub device: DeviceConfig,
    pub measurement: MeasurementConfig,
    pub calibration: CalibrationConfig,
    pub simulation: SimulationConfig,
}
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub mode: ConnectionMode,
    pub port: String,
    pub library_path: PathBuf,
    /// Size of the text buffers handed to the driver.
    pub text_capacity: usize,
}
impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            mode: ConnectionMode::Simulation,
            port: "COM3".into(),
            library_path: PathBuf::from("nanoFTIR_V11c_x64.dll"),
            text_capacity: 1024,
        }
    }
}
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementConfig {
    pub delay_ms: u32,
    pub interferogram_len: usize,
    pub min_wavelength_nm: f64,
    pub max_wavelength_nm: f64,
    pub spectrum_points: usize,
    pub window_min_nm: f64,
    pub window_max_nm: f64,
    pub mode: MeasurementMode,
    pub scan_average: usize,
    pub auto_align: bool,
    pub capture_attempts: u32,
}
impl Default for MeasurementConfig {
    fn default() -> Self {
        let settings = MeasurementSettings::default();
        Self {
            delay_ms: settings.delay_ms,
            interferogram_len: settings.interferogram_len,
            min_wavelength_nm: settings.grid.min_nm,
            max_wavelength_nm: settings.grid.max_nm,
            spectrum_points: settings.grid.points,
            window_min_nm: settings.window_min_nm,
            window_max_nm: settings.window_max_nm,
            mode: settings.mode,
            scan_average: settings.scan_average,
            auto_align: settings.align_first,
            capture_attempts: DEFAULT_CAPTURE_ATTEMPTS,
        }
    }
}
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Where the simulator keeps per-port calibration files.
    pub directory: PathBuf,
    pub max_file_bytes: usize,
    pub waveform_capacity: usize,
    pub relation_capacity: usize,
    pub laser_wavelength_nm: f64,
}
impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("calibration"),
            max_file_bytes: 1 << 20,
            waveform_capacity: 4096,
            relation_capacity: 64,
            laser_wavelength_nm: 1550.0,
        }
    }
}
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub ports: Vec<String>,
    pub serial_prefix: String,
    pub first_device_number: i32,
    /// Optical path difference advanced per sample, in cm.
    pub opd_step_cm: f64,
    /// Source brightness; 1.0 is a comfortable level, 2.0 saturates when aligned.
    pub source_intensity: f64,
    pub initial_alignment: f64,
    /// Relative error of the factory calibration slope.
    pub initial_calibration_error: f64,
    /// Amplitude of the uniform detector noise, in ADC counts.
    pub noise: f64,
    pub drive_voltage: f64,
    pub seed: Option<u64>,
}
impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            ports: vec!["COM3".into()],
            serial_prefix: "NF-SIM-".into(),
            first_device_number: 1,
            opd_step_cm: 2.0e-5,
            source_intensity: 1.0,
            initial_alignment: 0.6,
            initial_calibration_error: 0.003,
            noise: 200.0,
            drive_voltage: 5.0,
            seed: None,
        }
    }
}
impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.ports.is_empty() {
            return Err(FtirError::Config("simulation.ports is empty".into()));
        }
        for port in &self.ports {
            PortName::new(port.as_str())
                .map_err(|e| FtirError::Config(format!("simulation.ports: {e}")))?;
        }
        if self.first_device_number < 0 {
            return Err(FtirError::Config("simulation.first_device_number must not be negative".into()));
        }
        if !(self.opd_step_cm.is_finite() && self.opd_step_cm > 0.0) {
            return Err(FtirError::Config("simulation.opd_step_cm must be positive".into()));
        }
        if !(self.source_intensity.is_finite() && self.source_intensity >= 0.0) {
            return Err(FtirError::Config("simulation.source_intensity must not be negative".into()));
        }
        if !(0.0..=1.0).contains(&self.initial_alignment) {
            return Err(FtirError::Config("simulation.initial_alignment must be within 0..=1".into()));
        }
        if !(self.initial_calibration_error.abs() < 0.5) {
            return Err(FtirError::Config("simulation.initial_calibration_error is too large".into()));
        }
        if !(self.noise.is_finite() && self.noise >= 0.0) {
            return Err(FtirError::Config("simulation.noise must not be negative".into()));
        }
        if !(self.drive_voltage.is_finite() && self.drive_voltage > 0.0) {
            return Err(FtirError::Config("simulation.drive_voltage must be positive".into()));
        }
        Ok(())
    }
}
impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text).map_err(|e| FtirError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        info!("loaded configuration from {}", path.display());
        Ok(config)
    }
    /// Explicit path first, then `NANOFTIR_CONFIG`, then the defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match env::var_os(CONFIG_ENV) {
            Some(path) if !path.is_empty() => Self::load(PathBuf::from(path)),
            _ => Ok(Self::default()),
        }
    }
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| FtirError::Config(e.to_string()))
    }
    pub fn validate(&self) -> Result<()> {
        PortName::new(self.device.port.as_str())
            .map_err(|e| FtirError::Config(format!("device.port: {e}")))?;
        if self.device.text_capacity == 0 {
            return Err(FtirError::Config("device.text_capacity must be positive".into()));
        }
        if self.calibration.max_file_bytes == 0 {
            return Err(FtirError::Config("calibration.max_file_bytes must be positive".into()));
        }
        if !(self.calibration.laser_wavelength_nm.is_finite() && self.calibration.laser_wavelength_nm > 0.0) {
            return Err(FtirError::Config("calibration.laser_wavelength_nm must be positive".into()));
        }
        let m = &self.measurement;
        if !(MIN_SCAN_AVERAGE..=MAX_SCAN_AVERAGE).contains(&m.scan_average) {
            return Err(FtirError::Config(format!(
                "measurement.scan_average must be within {MIN_SCAN_AVERAGE}..={MAX_SCAN_AVERAGE}"
            )));
        }
        self.measurement_settings()
            .and_then(|s| s.validate())
            .map_err(|e| FtirError::Config(format!("measurement: {e}")))?;
        self.simulation.validate()
    }
    pub fn port(&self) -> Result<PortName> {
        PortName::new(self.device.port.as_str())
    }
    pub fn measurement_settings(&self) -> Result<MeasurementSettings> {
        let m = &self.measurement;
        Ok(MeasurementSettings {
            delay_ms: m.delay_ms,
            interferogram_len: m.interferogram_len,
            grid: WavelengthGrid::new(m.min_wavelength_nm, m.max_wavelength_nm, m.spectrum_points)?,
            window_min_nm: m.window_min_nm,
            window_max_nm: m.window_max_nm,
            mode: m.mode,
            scan_average: m.scan_average,
            align_first: m.auto_align,
            capture_attempts: m.capture_attempts,
            waveform_capacity: self.calibration.waveform_capacity,
            relation_capacity: self.calibration.relation_capacity,
        })
    }
    pub fn calibration_store(&self) -> CalibrationStore {
        CalibrationStore::new(&self.calibration.directory, self.calibration.max_file_bytes)
    }
    pub fn build_simulator(&self) -> Result<SimulatedBackend> {
        SimulatedBackend::new(self.simulation.clone(), self.calibration_store())
    }
    /// Backend selected by `device.mode`.
    pub fn build_backend(&self) -> Result<Box<dyn FtirBackend>> {
        match self.device.mode {
            ConnectionMode::Simulation => Ok(Box::new(self.build_simulator()?)),
            ConnectionMode::Hardware => Ok(Box::new(DllBackend::open(
                &self.device.library_path,
                self.device.text_capacity,
            )?)),
        }
    }
}
