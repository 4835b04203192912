// src/types.rs
use std::fmt;
use serde::{Deserialize, Serialize};
use crate::drivers::{FtirError, Interferogram, Spectrum};
use crate::session::{DeviceState, MeasurementSettings};
/// Longest resource name accepted, matching the fixed buffers of the driver.
pub const MAX_PORT_NAME: usize = 255;
/// Which backend drives the instrument.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMode {
    #[default]
    Simulation,
    Hardware,
}
/// Serial / VISA resource name such as `COM3` or `ASRL3::INSTR`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PortName(String);
impl PortName {
    pub fn new(name: impl Into<String>) -> Result<Self, FtirError> {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(FtirError::invalid("port name is empty"));
        }
        if trimmed.len() > MAX_PORT_NAME {
            return Err(FtirError::invalid(format!(
                "port name longer than {MAX_PORT_NAME} bytes"
            )));
        }
        if trimmed.bytes().any(|b| b == 0 || !b.is_ascii() || b.is_ascii_control()) {
            return Err(FtirError::invalid("port name must be printable ASCII"));
        }
        Ok(Self(trimmed.to_string()))
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
    /// File-system friendly form, used to key per-port calibration files.
    ///
    /// Letters, digits and `-` are kept; every other byte, `_` included,
    /// becomes `_XX` in upper-case hex, so distinct ports never share a stem.
    pub fn file_stem(&self) -> String {
        let mut stem = String::with_capacity(self.0.len());
        for b in self.0.bytes() {
            if b.is_ascii_alphanumeric() || b == b'-' {
                stem.push(b as char);
            } else {
                stem.push_str(&format!("_{b:02X}"));
            }
        }
        stem
    }
}
impl TryFrom<String> for PortName {
    type Error = FtirError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        PortName::new(value)
    }
}
impl From<PortName> for String {
    fn from(value: PortName) -> Self {
        value.0
    }
}
impl fmt::Display for PortName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
/// Opaque handle of a connected instrument.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceHandle(pub u64);
/// Identity reported by the instrument.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub serial_number: String,
    pub device_number: i32,
}
impl DeviceIdentity {
    pub fn handle(&self) -> DeviceHandle {
        DeviceHandle(self.device_number as u32 as u64)
    }
}
/// Processing mode passed through to the driver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u16", into = "u16")]
pub enum MeasurementMode {
    #[default]
    Raw,
    Absorbance,
    Other(u16),
}
impl MeasurementMode {
    pub fn as_u16(&self) -> u16 {
        match self {
            MeasurementMode::Raw => 0,
            MeasurementMode::Absorbance => 1,
            MeasurementMode::Other(code) => *code,
        }
    }
}
impl From<u16> for MeasurementMode {
    fn from(value: u16) -> Self {
        match value {
            0 => MeasurementMode::Raw,
            1 => MeasurementMode::Absorbance,
            other => MeasurementMode::Other(other),
        }
    }
}
impl From<MeasurementMode> for u16 {
    fn from(value: MeasurementMode) -> Self {
        value.as_u16()
    }
}
impl fmt::Display for MeasurementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeasurementMode::Raw => f.write_str("raw"),
            MeasurementMode::Absorbance => f.write_str("absorbance"),
            MeasurementMode::Other(code) => write!(f, "mode {code}"),
        }
    }
}
/// Drive waveform and wavelength calibration stored for one port.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationData {
    pub voltage_waveform: Vec<f64>,
    pub calibration_relation: Vec<f64>,
}
/// Secondary failure flags of the two write operations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteReport {
    pub writing_error: bool,
    pub file_size_error: bool,
}
impl WriteReport {
    pub fn ok() -> Self {
        Self::default()
    }
    pub fn is_ok(&self) -> bool {
        !self.writing_error && !self.file_size_error
    }
    pub fn into_result(self, operation: &'static str) -> Result<(), FtirError> {
        if self.file_size_error {
            return Err(FtirError::invalid(format!("{operation}: data exceeds the file size limit")));
        }
        if self.writing_error {
            return Err(FtirError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("{operation}: write failed"),
            )));
        }
        Ok(())
    }
}
/// Commands handled by the device engine thread.
#[derive(Clone, Debug)]
pub enum DeviceCommand {
    Connect(PortName),
    Disconnect,
    Identify,
    Capture { delay_ms: u32, len: usize },
    Measure(MeasurementSettings),
    ReadCalibration,
    WriteCalibration(String),
    WriteWaveform { max_voltage: f64, waveform: String },
    AutoAlign,
    AutoCalibrate { delay_ms: u32, laser_wavelength_nm: f64 },
    LastError,
    Shutdown,
}
/// Messages the engine sends back to its owner.
#[derive(Clone, Debug)]
pub enum DeviceEvent {
    Log(String),
    State(DeviceState),
    Connected { status: String },
    Identity(DeviceIdentity),
    Interferogram(Interferogram),
    Spectrum(Spectrum),
    Calibration(CalibrationData),
    WriteReport(WriteReport),
    Done(&'static str),
    StatusText(String),
    Error { operation: &'static str, code: i32, message: String },
}
