//! Simulated nanoFTIR instrument.
//!
//! The model is a broadband source with one absorption band seen through a
//! Michelson interferometer that advances `opd_step_cm` of optical path per
//! sample. It stands in for the hardware so the façade, session and legacy
//! shim can run anywhere; it does not reproduce the vendor processing.
use std::collections::HashMap;
use std::f64::consts::PI;
use std::thread;
use std::time::Duration;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use crate::backend::{FtirBackend, ProcessRequest};
use crate::calibration::CalibrationStore;
use crate::config::SimulationConfig;
use crate::drivers::fft::{magnitude_spectrum, refined_peak_bin};
use crate::drivers::{DeviceStatus, FtirError, Interferogram, Result, Spectrum, SpectrumBuilder};
use crate::types::{CalibrationData, DeviceHandle, DeviceIdentity, PortName, WriteReport};
/// Full scale of the 24-bit detector ADC.
pub const ADC_LIMIT: i32 = 8_388_607;
const DC_LEVEL: f64 = 1_000_000.0;
const MODULATION: f64 = 4_000_000.0;
/// Peak-to-peak excursion below which the detector is considered dark.
const NO_LIGHT_THRESHOLD: i64 = 10_000;
const LINE_START_CM: f64 = 3000.0;
const LINE_END_CM: f64 = 12000.0;
const LINE_STEP_CM: f64 = 10.0;
const LASER_SAMPLES: usize = 8192;
struct SimDevice {
    identity: DeviceIdentity,
    connected: bool,
    alignment: f64,
}
pub struct SimulatedBackend {
    config: SimulationConfig,
    store: CalibrationStore,
    devices: HashMap<PortName, SimDevice>,
    lines: Vec<(f64, f64)>,
    builder: SpectrumBuilder,
    rng: StdRng,
    last_error: Option<String>,
}
impl SimulatedBackend {
    pub fn new(config: SimulationConfig, store: CalibrationStore) -> Result<Self> {
        config.validate()?;
        let mut devices = HashMap::new();
        for (idx, name) in config.ports.iter().enumerate() {
            let port = PortName::new(name.as_str())?;
            let device_number = config.first_device_number + idx as i32;
            devices.insert(
                port,
                SimDevice {
                    identity: DeviceIdentity {
                        serial_number: format!("{}{:04}", config.serial_prefix, device_number),
                        device_number,
                    },
                    connected: false,
                    alignment: config.initial_alignment,
                },
            );
        }
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            lines: source_lines(),
            builder: SpectrumBuilder::default(),
            config,
            store,
            devices,
            rng,
            last_error: None,
        })
    }
    pub fn alignment(&self, port: &PortName) -> Option<f64> {
        self.devices.get(port).map(|d| d.alignment)
    }
    /// Calibration used before anything has been saved for a port.
    pub fn default_calibration(&self) -> CalibrationData {
        let samples = 256;
        let voltage_waveform = (0..samples)
            .map(|i| {
                let phase = i as f64 / samples as f64;
                let tri = if phase < 0.5 { 4.0 * phase - 1.0 } else { 3.0 - 4.0 * phase };
                tri * self.config.drive_voltage
            })
            .collect();
        let slope = (1.0 + self.config.initial_calibration_error) / self.config.opd_step_cm;
        CalibrationData {
            voltage_waveform,
            calibration_relation: vec![0.0, slope],
        }
    }
    fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            warn!("simulator: {err}");
            self.last_error = Some(err.to_string());
        }
        result
    }
    fn connected_device(&mut self, port: &PortName, operation: &'static str) -> Result<&mut SimDevice> {
        match self.devices.get_mut(port) {
            Some(device) if device.connected => Ok(device),
            Some(_) => Err(FtirError::device(operation, DeviceStatus::ConnectionFailure.code())),
            None => Err(FtirError::PortUnavailable(port.to_string())),
        }
    }
    fn wait(&self, delay_ms: u32) {
        if delay_ms > 0 {
            thread::sleep(Duration::from_millis(delay_ms as u64));
        }
    }
    fn synthesize(&mut self, len: usize, alignment: f64) -> std::result::Result<Vec<i32>, DeviceStatus> {
        let intensity = self.config.source_intensity;
        let center = (len / 2) as f64;
        let noise = self.config.noise;
        let mut saturated = false;
        let mut samples = Vec::with_capacity(len);
        for n in 0..len {
            let opd = (n as f64 - center) * self.config.opd_step_cm;
            let fringe: f64 = self
                .lines
                .iter()
                .map(|&(nu, weight)| weight * (2.0 * PI * nu * opd).cos())
                .sum();
            let jitter = if noise > 0.0 { self.rng.gen_range(-noise..=noise) } else { 0.0 };
            let value = intensity * (DC_LEVEL + MODULATION * alignment * fringe) + jitter;
            if value.abs() >= ADC_LIMIT as f64 {
                saturated = true;
            }
            samples.push(value.clamp(-(ADC_LIMIT as f64), ADC_LIMIT as f64) as i32);
        }
        if saturated {
            return Err(DeviceStatus::DetectorSaturation);
        }
        let scan = Interferogram::new("", samples);
        if scan.modulation_depth() < NO_LIGHT_THRESHOLD {
            return Err(DeviceStatus::NoLight);
        }
        Ok(scan.samples)
    }
    fn stored_calibration(&self, port: &PortName) -> Result<CalibrationData> {
        Ok(self
            .store
            .load(port)?
            .unwrap_or_else(|| self.default_calibration()))
    }
}
/// Relative weights of the simulated source: a broad band centred at 6500 cm^-1
/// with an absorption line near 1450 nm.
fn source_lines() -> Vec<(f64, f64)> {
    let count = ((LINE_END_CM - LINE_START_CM) / LINE_STEP_CM) as usize + 1;
    let mut lines: Vec<(f64, f64)> = (0..count)
        .map(|i| {
            let nu = LINE_START_CM + i as f64 * LINE_STEP_CM;
            let envelope = (-((nu - 6500.0) / 1800.0).powi(2)).exp();
            let absorption = 1.0 - 0.4 * (-((nu - 6897.0) / 60.0).powi(2)).exp();
            (nu, envelope * absorption)
        })
        .collect();
    let total: f64 = lines.iter().map(|l| l.1).sum();
    for line in lines.iter_mut() {
        line.1 /= total;
    }
    lines
}
impl FtirBackend for SimulatedBackend {
    fn name(&self) -> &'static str {
        "simulator"
    }
    fn connect(&mut self, port: &PortName) -> Result<String> {
        let result = match self.devices.get_mut(port) {
            Some(device) => {
                if !device.connected {
                    info!("simulator: {port} opened");
                }
                device.connected = true;
                Ok(format!(
                    "Connected to {} on {port}",
                    device.identity.serial_number
                ))
            }
            None => Err(FtirError::PortUnavailable(port.to_string())),
        };
        self.record(result)
    }
    fn serial_number(&mut self, port: &PortName) -> Result<DeviceIdentity> {
        let result = self
            .connected_device(port, "FTIR_GetSerialNum_VISA")
            .map(|d| d.identity.clone());
        self.record(result)
    }
    fn capture_interferogram(&mut self, port: &PortName, delay_ms: u32, len: usize) -> Result<Interferogram> {
        let result = (|| -> Result<Interferogram> {
            if len == 0 {
                return Err(FtirError::invalid("interferogram length must be positive"));
            }
            let alignment = self.connected_device(port, "FTIR_GetSpectrum")?.alignment;
            self.wait(delay_ms);
            let samples = self
                .synthesize(len, alignment)
                .map_err(|status| FtirError::Device {
                    operation: "FTIR_GetSpectrum",
                    status,
                })?;
            debug!("simulator: captured {len} samples on {port}");
            Ok(Interferogram::new(port.as_str(), samples))
        })();
        self.record(result)
    }
    fn process(&mut self, request: &ProcessRequest<'_>) -> Result<Spectrum> {
        if request.upstream_status != 0 {
            return Err(FtirError::Upstream(request.upstream_status));
        }
        let result = self.builder.compute(
            request.interferogram,
            request.calibration_relation,
            request.grid,
            request.mode,
        );
        self.record(result)
    }
    fn read_calibration(&mut self, port: &PortName, waveform_len: usize, relation_len: usize) -> Result<CalibrationData> {
        let result = (|| -> Result<CalibrationData> {
            self.connected_device(port, "FTIR_ReadCalib")?;
            let mut data = self.stored_calibration(port)?;
            data.voltage_waveform.truncate(waveform_len);
            data.calibration_relation.truncate(relation_len);
            Ok(data)
        })();
        self.record(result)
    }
    fn write_calibration(&mut self, port: &PortName, calibration_text: &str) -> Result<WriteReport> {
        let result = (|| -> Result<WriteReport> {
            self.connected_device(port, "FTIR_ManualSaveCalib")?;
            self.store.write_calibration_text(port, calibration_text)
        })();
        self.record(result)
    }
    fn write_waveform(&mut self, max_voltage: f64, waveform_text: &str, port: &PortName) -> Result<WriteReport> {
        let result = (|| -> Result<WriteReport> {
            self.connected_device(port, "FTIR_ManualSaveWaveform")?;
            let fallback = self.default_calibration();
            self.store
                .write_waveform_text(port, max_voltage, waveform_text, &fallback)
        })();
        self.record(result)
    }
    fn auto_align(&mut self, handle: DeviceHandle) -> Result<()> {
        let result = match self
            .devices
            .values_mut()
            .find(|d| d.connected && d.identity.handle() == handle)
        {
            Some(device) => {
                info!(
                    "simulator: aligned {} ({:.2} -> 1.00)",
                    device.identity.serial_number, device.alignment
                );
                device.alignment = 1.0;
                Ok(())
            }
            None => Err(FtirError::device(
                "FTIR_AutoAlign",
                DeviceStatus::ConnectionFailure.code(),
            )),
        };
        self.record(result)
    }
    fn auto_wavelength_calib(
        &mut self,
        delay_ms: u32,
        laser_wavelength_nm: f64,
        voltage_waveform: &[f64],
        port: &PortName,
    ) -> Result<()> {
        let result = (|| -> Result<()> {
            self.connected_device(port, "FTIR_AutoWavelengthCalib")?;
            if !laser_wavelength_nm.is_finite() || laser_wavelength_nm <= 0.0 {
                return Err(FtirError::invalid(format!(
                    "laser wavelength {laser_wavelength_nm} nm is not valid"
                )));
            }
            if voltage_waveform.is_empty() {
                return Err(FtirError::invalid("voltage waveform is empty"));
            }
            let laser_cm = 1.0e7 / laser_wavelength_nm;
            let true_frequency = laser_cm * self.config.opd_step_cm;
            if true_frequency >= 0.5 {
                return Err(FtirError::invalid(format!(
                    "{laser_wavelength_nm} nm is below the sampling limit"
                )));
            }
            self.wait(delay_ms);
            let center = (LASER_SAMPLES / 2) as f64;
            let samples: Vec<i32> = (0..LASER_SAMPLES)
                .map(|n| {
                    let phase = 2.0 * PI * true_frequency * (n as f64 - center);
                    (DC_LEVEL + MODULATION * 0.5 * phase.cos()) as i32
                })
                .collect();
            let magnitudes = magnitude_spectrum(&samples, LASER_SAMPLES);
            let bin = refined_peak_bin(&magnitudes)
                .ok_or_else(|| FtirError::device("FTIR_AutoWavelengthCalib", DeviceStatus::NoLight.code()))?;
            let measured_frequency = bin / LASER_SAMPLES as f64;
            let slope = laser_cm / measured_frequency;
            let data = CalibrationData {
                voltage_waveform: voltage_waveform.to_vec(),
                calibration_relation: vec![0.0, slope],
            };
            self.store.save(port, &data)?;
            info!("simulator: calibrated {port} against {laser_wavelength_nm} nm, slope {slope:.3} cm^-1");
            Ok(())
        })();
        self.record(result)
    }
    fn last_error(&mut self) -> Result<String> {
        Ok(self
            .last_error
            .clone()
            .unwrap_or_else(|| "(no error)".to_string()))
    }
    fn release(&mut self, port: &PortName) {
        if let Some(device) = self.devices.get_mut(port) {
            device.connected = false;
        }
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::WavelengthGrid;
    use crate::types::MeasurementMode;
    fn sim(dir: &std::path::Path) -> SimulatedBackend {
        let config = SimulationConfig {
            seed: Some(7),
            initial_calibration_error: 0.0,
            ..SimulationConfig::default()
        };
        SimulatedBackend::new(config, CalibrationStore::new(dir, 1 << 16)).unwrap()
    }
    fn com3() -> PortName {
        PortName::new("COM3").unwrap()
    }
    #[test]
    fn unknown_port_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = sim(dir.path());
        let err = backend.connect(&PortName::new("COM99").unwrap()).unwrap_err();
        assert_eq!(err.status_code(), 14);
        assert!(backend.last_error().unwrap().contains("COM99"));
    }
    #[test]
    fn capture_requires_connection() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = sim(dir.path());
        assert!(backend.capture_interferogram(&com3(), 0, 128).is_err());
        assert!(backend.serial_number(&com3()).is_err());
        backend.connect(&com3()).unwrap();
        let scan = backend.capture_interferogram(&com3(), 0, 1024).unwrap();
        assert_eq!(scan.len(), 1024);
        assert_eq!(scan.zpd_index(), Some(512));
    }
    #[test]
    fn processed_spectrum_shows_the_absorption_band() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = sim(dir.path());
        backend.connect(&com3()).unwrap();
        let scan = backend.capture_interferogram(&com3(), 0, 4096).unwrap();
        let calibration = backend.read_calibration(&com3(), 1024, 16).unwrap();
        let grid = WavelengthGrid::new(900.0, 2600.0, 1701).unwrap();
        let request = ProcessRequest::new(&scan.samples, &calibration, grid, MeasurementMode::Raw);
        let spectrum = backend.process(&request).unwrap();
        let at = |wl: f64| spectrum.value_at(wl).unwrap();
        assert!(at(1450.0) < at(1400.0));
        assert!(at(1450.0) < at(1520.0));
        let peak = spectrum.peak_wavelength().unwrap();
        assert!(peak > 1450.0 && peak < 1700.0, "peak at {peak}");
    }
    #[test]
    fn saturation_and_darkness_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let bright = SimulationConfig {
            source_intensity: 2.0,
            initial_alignment: 1.0,
            ..SimulationConfig::default()
        };
        let mut backend = SimulatedBackend::new(bright, CalibrationStore::new(dir.path(), 1024)).unwrap();
        backend.connect(&com3()).unwrap();
        let err = backend.capture_interferogram(&com3(), 0, 512).unwrap_err();
        assert_eq!(err.status_code(), 9);
        let dark = SimulationConfig {
            source_intensity: 0.0,
            ..SimulationConfig::default()
        };
        let mut backend = SimulatedBackend::new(dark, CalibrationStore::new(dir.path(), 1024)).unwrap();
        backend.connect(&com3()).unwrap();
        let err = backend.capture_interferogram(&com3(), 0, 512).unwrap_err();
        assert_eq!(err.status_code(), 11);
    }
    #[test]
    fn auto_align_restores_full_modulation() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = sim(dir.path());
        backend.connect(&com3()).unwrap();
        let before = backend.capture_interferogram(&com3(), 0, 512).unwrap().modulation_depth();
        let handle = backend.serial_number(&com3()).unwrap().handle();
        backend.auto_align(handle).unwrap();
        assert_eq!(backend.alignment(&com3()), Some(1.0));
        let after = backend.capture_interferogram(&com3(), 0, 512).unwrap().modulation_depth();
        assert!(after > before);
        assert!(backend.auto_align(DeviceHandle(9999)).is_err());
    }
    #[test]
    fn auto_calibration_recovers_sample_spacing() {
        let dir = tempfile::tempdir().unwrap();
        let config = SimulationConfig {
            initial_calibration_error: 0.02,
            ..SimulationConfig::default()
        };
        let mut backend = SimulatedBackend::new(config, CalibrationStore::new(dir.path(), 1 << 16)).unwrap();
        backend.connect(&com3()).unwrap();
        let before = backend.read_calibration(&com3(), 512, 8).unwrap();
        assert!((before.calibration_relation[1] - 51_000.0).abs() < 1.0);
        backend
            .auto_wavelength_calib(0, 1550.0, &before.voltage_waveform, &com3())
            .unwrap();
        let after = backend.read_calibration(&com3(), 512, 8).unwrap();
        let expected = 1.0 / SimulationConfig::default().opd_step_cm;
        assert!((after.calibration_relation[1] / expected - 1.0).abs() < 1e-3);
        assert_eq!(after.voltage_waveform, before.voltage_waveform);
    }
    #[test]
    fn process_passes_upstream_errors_through() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = sim(dir.path());
        let calibration = backend.default_calibration();
        let grid = WavelengthGrid::new(900.0, 2600.0, 10).unwrap();
        let mut request = ProcessRequest::new(&[1, 2, 3], &calibration, grid, MeasurementMode::Raw);
        request.upstream_status = 11;
        let err = backend.process(&request).unwrap_err();
        assert!(matches!(err, FtirError::Upstream(11)));
        assert_eq!(err.status_code(), 11);
    }
}
