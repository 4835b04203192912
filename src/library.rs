use std::ffi::OsStr;
use std::os::raw::c_char;
use std::path::{Path, PathBuf};
use libloading::Library;
use log::{debug, info, warn};
use once_cell::sync::OnceCell;
use crate::drivers::{FtirError, Result};
use crate::ffi::{self, symbols, LVBoolean, LV_FALSE};
use crate::types::{CalibrationData, DeviceHandle, DeviceIdentity, PortName, WriteReport};
/// Resolved entry points of the vendor driver.
///
/// All symbols are looked up at load time so a missing export fails early
/// instead of in the middle of a measurement.
pub struct FtirLibrary {
    #[allow(dead_code)]
    lib: Library,
    path: PathBuf,
    auto_align: ffi::FTIR_AutoAlign,
    auto_wavelength_calib: ffi::FTIR_AutoWavelengthCalib,
    data_process: ffi::FTIR_DataProcess,
    device_connect: ffi::FTIR_DeviceConnect_VISA,
    get_serial_num: ffi::FTIR_GetSerialNum_VISA,
    get_spectrum: ffi::FTIR_GetSpectrum,
    manual_save_calib: ffi::FTIR_ManualSaveCalib,
    manual_save_waveform: ffi::FTIR_ManualSaveWaveform,
    read_calib: ffi::FTIR_ReadCalib,
    dll_status: ffi::LVDLLStatus,
}
impl FtirLibrary {
    pub fn load<P: AsRef<OsStr>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        // Safety: loading runs the DLL's initialisers; the LabVIEW runtime it
        // pulls in has no other load-time requirements.
        let lib = unsafe { Library::new(path) }?;
        // Safety: the signatures below mirror the vendor header one to one.
        let api = unsafe {
            Self {
                auto_align: *lib.get(symbols::AUTO_ALIGN)?,
                auto_wavelength_calib: *lib.get(symbols::AUTO_WAVELENGTH_CALIB)?,
                data_process: *lib.get(symbols::DATA_PROCESS)?,
                device_connect: *lib.get(symbols::DEVICE_CONNECT)?,
                get_serial_num: *lib.get(symbols::GET_SERIAL_NUM)?,
                get_spectrum: *lib.get(symbols::GET_SPECTRUM)?,
                manual_save_calib: *lib.get(symbols::MANUAL_SAVE_CALIB)?,
                manual_save_waveform: *lib.get(symbols::MANUAL_SAVE_WAVEFORM)?,
                read_calib: *lib.get(symbols::READ_CALIB)?,
                dll_status: *lib.get(symbols::DLL_STATUS)?,
                lib,
                path: PathBuf::from(path),
            }
        };
        info!("loaded FTIR driver from {}", path.to_string_lossy());
        Ok(api)
    }
    /// Process-wide instance; the first successful path wins.
    pub fn instance<P: AsRef<OsStr>>(path: P) -> Result<&'static FtirLibrary> {
        static API: OnceCell<FtirLibrary> = OnceCell::new();
        let requested = Path::new(path.as_ref());
        let api = API.get_or_try_init(|| Self::load(requested))?;
        warn_if_other_path(api.path(), requested);
        Ok(api)
    }
    /// File the driver was actually loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }
    fn check(code: i32, operation: &'static str) -> Result<()> {
        if code == 0 {
            Ok(())
        } else {
            Err(FtirError::device(operation, code))
        }
    }
    pub fn connect(&self, port: &PortName, status_capacity: usize) -> Result<String> {
        let mut port = c_text(port.as_str())?;
        let mut status = vec![0u8; status_capacity.max(1)];
        let code = unsafe {
            (self.device_connect)(
                port.as_mut_ptr() as *mut c_char,
                status.as_mut_ptr() as *mut c_char,
                to_len(status.len())?,
            )
        };
        let text = string_from_buffer(&status);
        debug!("FTIR_DeviceConnect_VISA -> {code} ({text})");
        Self::check(code, "FTIR_DeviceConnect_VISA")?;
        Ok(text)
    }
    pub fn serial_number(&self, port: &PortName, capacity: usize) -> Result<DeviceIdentity> {
        let mut port = c_text(port.as_str())?;
        let mut serial = vec![0u8; capacity.max(1)];
        let mut device_number: i32 = 0;
        let code = unsafe {
            (self.get_serial_num)(
                port.as_mut_ptr() as *mut c_char,
                serial.as_mut_ptr() as *mut c_char,
                &mut device_number as *mut i32,
                to_len(serial.len())?,
            )
        };
        Self::check(code, "FTIR_GetSerialNum_VISA")?;
        Ok(DeviceIdentity {
            serial_number: string_from_buffer(&serial),
            device_number,
        })
    }
    pub fn get_spectrum(&self, port: &PortName, delay_ms: i32, len: usize) -> Result<Vec<i32>> {
        let mut port = c_text(port.as_str())?;
        let mut data = vec![0i32; len];
        let code = unsafe {
            (self.get_spectrum)(
                port.as_mut_ptr() as *mut c_char,
                delay_ms,
                data.as_mut_ptr(),
                to_len(data.len())?,
            )
        };
        Self::check(code, "FTIR_GetSpectrum")?;
        Ok(data)
    }
    /// Runs the driver's processing. Inputs are copied so the caller's slices
    /// stay untouched whatever the driver does with its pointers.
    #[allow(clippy::too_many_arguments)]
    pub fn data_process(
        &self,
        interferogram: &[i32],
        error_in: i32,
        voltage_waveform: &[f64],
        calibration_relation: &[f64],
        min_wavelength: f32,
        measurement_mode: u16,
        max_wavelength: f32,
        len: usize,
    ) -> Result<Vec<f64>> {
        let mut interferogram = interferogram.to_vec();
        let mut voltage_waveform = voltage_waveform.to_vec();
        let mut calibration_relation = calibration_relation.to_vec();
        let mut spectrum = vec![0f64; len];
        let code = unsafe {
            (self.data_process)(
                interferogram.as_mut_ptr(),
                error_in,
                voltage_waveform.as_mut_ptr(),
                calibration_relation.as_mut_ptr(),
                min_wavelength,
                measurement_mode,
                max_wavelength,
                spectrum.as_mut_ptr(),
                to_len(interferogram.len())?,
                to_len(voltage_waveform.len())?,
                to_len(calibration_relation.len())?,
                to_len(spectrum.len())?,
            )
        };
        Self::check(code, "FTIR_DataProcess")?;
        Ok(spectrum)
    }
    pub fn read_calib(
        &self,
        port: &PortName,
        waveform_len: usize,
        relation_len: usize,
    ) -> Result<CalibrationData> {
        let mut port = c_text(port.as_str())?;
        let mut voltage_waveform = vec![0f64; waveform_len];
        let mut calibration_relation = vec![0f64; relation_len];
        let code = unsafe {
            (self.read_calib)(
                port.as_mut_ptr() as *mut c_char,
                voltage_waveform.as_mut_ptr(),
                calibration_relation.as_mut_ptr(),
                to_len(voltage_waveform.len())?,
                to_len(calibration_relation.len())?,
            )
        };
        Self::check(code, "FTIR_ReadCalib")?;
        Ok(CalibrationData {
            voltage_waveform,
            calibration_relation,
        })
    }
    pub fn manual_save_calib(&self, port: &PortName, calib_waveform: &str) -> Result<WriteReport> {
        let mut port = c_text(port.as_str())?;
        let mut text = c_text(calib_waveform)?;
        let mut writing_error: LVBoolean = LV_FALSE;
        let mut file_size_error: LVBoolean = LV_FALSE;
        let code = unsafe {
            (self.manual_save_calib)(
                port.as_mut_ptr() as *mut c_char,
                text.as_mut_ptr() as *mut c_char,
                &mut writing_error,
                &mut file_size_error,
            )
        };
        Self::check(code, "FTIR_ManualSaveCalib")?;
        Ok(WriteReport {
            writing_error: writing_error != LV_FALSE,
            file_size_error: file_size_error != LV_FALSE,
        })
    }
    pub fn manual_save_waveform(
        &self,
        max_voltage: f64,
        voltage_waveform: &str,
        port: &PortName,
    ) -> Result<WriteReport> {
        let mut text = c_text(voltage_waveform)?;
        let mut port = c_text(port.as_str())?;
        let mut writing_error: LVBoolean = LV_FALSE;
        let code = unsafe {
            (self.manual_save_waveform)(
                max_voltage,
                text.as_mut_ptr() as *mut c_char,
                port.as_mut_ptr() as *mut c_char,
                &mut writing_error,
            )
        };
        Self::check(code, "FTIR_ManualSaveWaveform")?;
        Ok(WriteReport {
            writing_error: writing_error != LV_FALSE,
            file_size_error: false,
        })
    }
    pub fn auto_align(&self, handle: DeviceHandle) -> Result<()> {
        let code = unsafe { (self.auto_align)(handle.0) };
        Self::check(code as i32, "FTIR_AutoAlign")
    }
    pub fn auto_wavelength_calib(
        &self,
        delay_ms: i32,
        laser_wavelength_nm: f64,
        voltage_waveform: &[f64],
        port: &PortName,
    ) -> Result<()> {
        let mut waveform = voltage_waveform.to_vec();
        let mut port = c_text(port.as_str())?;
        let code = unsafe {
            (self.auto_wavelength_calib)(
                delay_ms,
                laser_wavelength_nm,
                waveform.as_mut_ptr(),
                port.as_mut_ptr() as *mut c_char,
                to_len(waveform.len())?,
            )
        };
        Self::check(code, "FTIR_AutoWavelengthCalib")
    }
    /// Latest error text of the LabVIEW runtime. No module handle is known on
    /// this side, so a null module is passed.
    pub fn dll_status(&self, capacity: usize) -> Result<String> {
        let mut text = vec![0u8; capacity.max(1)];
        let code = unsafe {
            (self.dll_status)(
                text.as_mut_ptr() as *mut c_char,
                to_len(text.len())?,
                std::ptr::null_mut(),
            )
        };
        Self::check(code as i32, "LVDLLStatus")?;
        Ok(string_from_buffer(&text))
    }
}
/// NUL-terminated copy of `text`.
pub(crate) fn c_text(text: &str) -> Result<Vec<u8>> {
    if text.as_bytes().contains(&0) {
        return Err(FtirError::invalid("text passed to the driver contains NUL"));
    }
    let mut bytes = Vec::with_capacity(text.len() + 1);
    bytes.extend_from_slice(text.as_bytes());
    bytes.push(0);
    Ok(bytes)
}
/// Text up to the first NUL (or the whole buffer if there is none).
pub(crate) fn string_from_buffer(buffer: &[u8]) -> String {
    let end = buffer.iter().position(|&b| b == 0).unwrap_or(buffer.len());
    String::from_utf8_lossy(&buffer[..end]).into_owned()
}
pub(crate) fn to_len(len: usize) -> Result<i32> {
    i32::try_from(len).map_err(|_| FtirError::invalid(format!("buffer of {len} elements is too large")))
}
/// Returns true when `requested` names a different driver than the one loaded.
fn warn_if_other_path(loaded: &Path, requested: &Path) -> bool {
    if loaded == requested {
        return false;
    }
    warn!(
        "FTIR driver already loaded from {}; ignoring {}",
        loaded.display(),
        requested.display()
    );
    true
}
