//! Legacy fixed-buffer entry points.
//!
//! Each function keeps the driver's C signature and runs on a process-wide
//! backend. With the `legacy-abi` feature they are exported under the driver's
//! symbol names, so the cdylib can stand in for the vendor DLL.
//!
//! Buffers are validated before anything is written: a null pointer or a
//! non-positive length returns [`STATUS_INVALID_ARGUMENT`] and leaves every
//! output untouched.
use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_long, c_void};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::slice;
use std::sync::Mutex;
use log::{debug, error, info};
use once_cell::sync::Lazy;
use crate::backend::{FtirBackend, ProcessRequest};
use crate::config::Config;
use crate::drivers::error::{STATUS_INTERNAL, STATUS_INVALID_ARGUMENT, STATUS_OK};
use crate::drivers::{FtirError, Result, WavelengthGrid};
use crate::ffi::{LVBoolean, LV_FALSE, LV_TRUE};
use crate::types::{DeviceHandle, MeasurementMode, PortName};
static BACKEND: Lazy<Mutex<Option<Box<dyn FtirBackend>>>> = Lazy::new(|| Mutex::new(None));
/// Replaces the backend behind the legacy entry points, returning the previous one.
pub fn install(backend: Box<dyn FtirBackend>) -> Option<Box<dyn FtirBackend>> {
    info!("legacy entry points now use the {} backend", backend.name());
    BACKEND
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .replace(backend)
}
fn with_backend<T>(call: impl FnOnce(&mut dyn FtirBackend) -> Result<T>) -> Result<T> {
    let mut slot = BACKEND.lock().unwrap_or_else(|e| e.into_inner());
    if slot.is_none() {
        let config = Config::discover(None)?;
        *slot = Some(config.build_backend()?);
    }
    match slot.as_mut() {
        Some(backend) => call(backend.as_mut()),
        None => Err(FtirError::Config("no backend installed".into())),
    }
}
/// Runs `body`, turning errors and panics into a status code.
fn guard(operation: &'static str, body: impl FnOnce() -> Result<i32>) -> i32 {
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(code)) => code,
        Ok(Err(err)) => {
            debug!("{operation}: {err}");
            err.status_code()
        }
        Err(_) => {
            error!("{operation} panicked");
            STATUS_INTERNAL
        }
    }
}
fn checked_len(len: i32, what: &str) -> Result<usize> {
    if len <= 0 {
        return Err(FtirError::invalid(format!("{what} length must be positive, got {len}")));
    }
    Ok(len as usize)
}
unsafe fn port_arg(ptr: *const c_char) -> Result<PortName> {
    if ptr.is_null() {
        return Err(FtirError::invalid("port name is null"));
    }
    let text = CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| FtirError::invalid("port name is not UTF-8"))?;
    PortName::new(text)
}
unsafe fn text_arg(ptr: *const c_char, what: &str) -> Result<String> {
    if ptr.is_null() {
        return Err(FtirError::invalid(format!("{what} is null")));
    }
    Ok(CStr::from_ptr(ptr).to_string_lossy().into_owned())
}
unsafe fn input<'a, T>(ptr: *const T, len: i32, what: &str) -> Result<&'a [T]> {
    let len = checked_len(len, what)?;
    if ptr.is_null() {
        return Err(FtirError::invalid(format!("{what} buffer is null")));
    }
    Ok(slice::from_raw_parts(ptr, len))
}
unsafe fn output<'a, T>(ptr: *mut T, len: i32, what: &str) -> Result<&'a mut [T]> {
    let len = checked_len(len, what)?;
    if ptr.is_null() {
        return Err(FtirError::invalid(format!("{what} buffer is null")));
    }
    Ok(slice::from_raw_parts_mut(ptr, len))
}
fn non_null<T>(ptr: *mut T, what: &str) -> Result<()> {
    if ptr.is_null() {
        return Err(FtirError::invalid(format!("{what} is null")));
    }
    Ok(())
}
/// Copies `text` into `buffer`, cut on a character boundary so that the
/// terminating NUL always fits.
pub(crate) fn write_c_string(buffer: &mut [u8], text: &str) {
    let Some(room) = buffer.len().checked_sub(1) else {
        return;
    };
    let mut end = text.len().min(room);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    buffer[..end].copy_from_slice(&text.as_bytes()[..end]);
    buffer[end] = 0;
}
fn lv_bool(flag: bool) -> LVBoolean {
    if flag {
        LV_TRUE
    } else {
        LV_FALSE
    }
}
/// # Safety
/// No pointers are involved; `handle` is whatever `FTIR_GetSerialNum_VISA` reported.
#[cfg_attr(feature = "legacy-abi", export_name = "FTIR_AutoAlign")]
pub unsafe extern "C" fn ftir_auto_align(handle: u64) -> u32 {
    guard("FTIR_AutoAlign", || {
        with_backend(|b| b.auto_align(DeviceHandle(handle)))?;
        Ok(STATUS_OK)
    }) as u32
}
/// # Safety
/// `voltage_waveform` must point to `len` readable doubles and `com_port` to a
/// NUL-terminated string.
#[cfg_attr(feature = "legacy-abi", export_name = "FTIR_AutoWavelengthCalib")]
pub unsafe extern "C" fn ftir_auto_wavelength_calib(
    delay_time: i32,
    calib_laser_wavelength: f64,
    voltage_waveform: *mut f64,
    com_port: *mut c_char,
    len: i32,
) -> i32 {
    guard("FTIR_AutoWavelengthCalib", || {
        let delay = u32::try_from(delay_time)
            .map_err(|_| FtirError::invalid(format!("delay {delay_time} ms is negative")))?;
        let waveform = input(voltage_waveform as *const f64, len, "voltage waveform")?.to_vec();
        let port = port_arg(com_port)?;
        with_backend(|b| b.auto_wavelength_calib(delay, calib_laser_wavelength, &waveform, &port))?;
        Ok(STATUS_OK)
    })
}
/// # Safety
/// Each array must hold at least as many elements as its length argument:
/// `len` for the interferogram, `len2` for the waveform, `len3` for the relation
/// and `len4` for the spectrum. Inputs are only read.
#[cfg_attr(feature = "legacy-abi", export_name = "FTIR_DataProcess")]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn ftir_data_process(
    interferogram_data: *mut i32,
    error_in: i32,
    voltage_waveform: *mut f64,
    calibration_relation: *mut f64,
    min_wavelength: f32,
    measurement_mode: u16,
    max_wavelength: f32,
    spectrum: *mut f64,
    len: i32,
    len2: i32,
    len3: i32,
    len4: i32,
) -> i32 {
    guard("FTIR_DataProcess", || {
        if error_in != STATUS_OK {
            return Ok(error_in);
        }
        let interferogram = input(interferogram_data as *const i32, len, "interferogram")?.to_vec();
        let waveform = input(voltage_waveform as *const f64, len2, "voltage waveform")?.to_vec();
        let relation = input(calibration_relation as *const f64, len3, "calibration relation")?.to_vec();
        let points = checked_len(len4, "spectrum")?;
        non_null(spectrum, "spectrum buffer")?;
        let grid = WavelengthGrid::new(min_wavelength as f64, max_wavelength as f64, points)?;
        let request = ProcessRequest {
            interferogram: &interferogram,
            upstream_status: error_in,
            voltage_waveform: &waveform,
            calibration_relation: &relation,
            grid,
            mode: MeasurementMode::from(measurement_mode),
        };
        let result = with_backend(|b| b.process(&request))?;
        output(spectrum, len4, "spectrum")?.copy_from_slice(&result.values);
        Ok(STATUS_OK)
    })
}
/// # Safety
/// `com_port` must be NUL terminated and `connection_status` must hold `len` bytes.
#[cfg_attr(feature = "legacy-abi", export_name = "FTIR_DeviceConnect_VISA")]
pub unsafe extern "C" fn ftir_device_connect_visa(
    com_port: *mut c_char,
    connection_status: *mut c_char,
    len: i32,
) -> i32 {
    guard("FTIR_DeviceConnect_VISA", || {
        checked_len(len, "connection status")?;
        non_null(connection_status, "connection status buffer")?;
        let port = port_arg(com_port)?;
        let status = with_backend(|b| b.connect(&port))?;
        write_c_string(output(connection_status as *mut u8, len, "connection status")?, &status);
        Ok(STATUS_OK)
    })
}
/// # Safety
/// `com_port` must be NUL terminated, `serial_number` must hold `len` bytes and
/// `device_number` must be writable.
#[cfg_attr(feature = "legacy-abi", export_name = "FTIR_GetSerialNum_VISA")]
pub unsafe extern "C" fn ftir_get_serial_num_visa(
    com_port: *mut c_char,
    serial_number: *mut c_char,
    device_number: *mut i32,
    len: i32,
) -> i32 {
    guard("FTIR_GetSerialNum_VISA", || {
        checked_len(len, "serial number")?;
        non_null(serial_number, "serial number buffer")?;
        non_null(device_number, "device number")?;
        let port = port_arg(com_port)?;
        let identity = with_backend(|b| b.serial_number(&port))?;
        write_c_string(output(serial_number as *mut u8, len, "serial number")?, &identity.serial_number);
        *device_number = identity.device_number;
        Ok(STATUS_OK)
    })
}
/// # Safety
/// `com_port` must be NUL terminated and `interferogram_data` must hold `len` values.
#[cfg_attr(feature = "legacy-abi", export_name = "FTIR_GetSpectrum")]
pub unsafe extern "system" fn ftir_get_spectrum(
    com_port: *mut c_char,
    delay_time: i32,
    interferogram_data: *mut i32,
    len: i32,
) -> i32 {
    guard("FTIR_GetSpectrum", || {
        let count = checked_len(len, "interferogram")?;
        non_null(interferogram_data, "interferogram buffer")?;
        let delay = u32::try_from(delay_time)
            .map_err(|_| FtirError::invalid(format!("delay {delay_time} ms is negative")))?;
        let port = port_arg(com_port)?;
        let scan = with_backend(|b| b.capture_interferogram(&port, delay, count))?;
        if scan.len() != count {
            return Err(FtirError::LengthMismatch {
                expected: count,
                actual: scan.len(),
            });
        }
        output(interferogram_data, len, "interferogram")?.copy_from_slice(&scan.samples);
        Ok(STATUS_OK)
    })
}
/// # Safety
/// Both strings must be NUL terminated and both flags writable.
#[cfg_attr(feature = "legacy-abi", export_name = "FTIR_ManualSaveCalib")]
pub unsafe extern "C" fn ftir_manual_save_calib(
    com_port: *mut c_char,
    calib_waveform: *mut c_char,
    calib_writing_error: *mut LVBoolean,
    calib_file_size_error: *mut LVBoolean,
) -> i32 {
    guard("FTIR_ManualSaveCalib", || {
        non_null(calib_writing_error, "writing error flag")?;
        non_null(calib_file_size_error, "file size error flag")?;
        let port = port_arg(com_port)?;
        let text = text_arg(calib_waveform, "calibration text")?;
        *calib_writing_error = LV_FALSE;
        *calib_file_size_error = LV_FALSE;
        let report = with_backend(|b| b.write_calibration(&port, &text))?;
        *calib_writing_error = lv_bool(report.writing_error);
        *calib_file_size_error = lv_bool(report.file_size_error);
        Ok(STATUS_OK)
    })
}
/// # Safety
/// Both strings must be NUL terminated and the flag writable.
#[cfg_attr(feature = "legacy-abi", export_name = "FTIR_ManualSaveWaveform")]
pub unsafe extern "C" fn ftir_manual_save_waveform(
    max_voltage: f64,
    voltage_waveform: *mut c_char,
    com_port: *mut c_char,
    waveform_writing_error: *mut LVBoolean,
) -> i32 {
    guard("FTIR_ManualSaveWaveform", || {
        non_null(waveform_writing_error, "writing error flag")?;
        let text = text_arg(voltage_waveform, "waveform text")?;
        let port = port_arg(com_port)?;
        *waveform_writing_error = LV_FALSE;
        let report = with_backend(|b| b.write_waveform(max_voltage, &text, &port))?;
        *waveform_writing_error = lv_bool(report.writing_error);
        Ok(STATUS_OK)
    })
}
/// # Safety
/// `com_port` must be NUL terminated; `voltage_waveform` must hold `len` values
/// and `calibration_relation` `len2`.
#[cfg_attr(feature = "legacy-abi", export_name = "FTIR_ReadCalib")]
pub unsafe extern "C" fn ftir_read_calib(
    com_port: *mut c_char,
    voltage_waveform: *mut f64,
    calibration_relation: *mut f64,
    len: i32,
    len2: i32,
) -> i32 {
    guard("FTIR_ReadCalib", || {
        let waveform_len = checked_len(len, "voltage waveform")?;
        let relation_len = checked_len(len2, "calibration relation")?;
        non_null(voltage_waveform, "voltage waveform buffer")?;
        non_null(calibration_relation, "calibration relation buffer")?;
        let port = port_arg(com_port)?;
        let data = with_backend(|b| b.read_calibration(&port, waveform_len, relation_len))?;
        fill(output(voltage_waveform, len, "voltage waveform")?, &data.voltage_waveform);
        fill(output(calibration_relation, len2, "calibration relation")?, &data.calibration_relation);
        Ok(STATUS_OK)
    })
}
fn fill(buffer: &mut [f64], values: &[f64]) {
    let n = values.len().min(buffer.len());
    buffer[..n].copy_from_slice(&values[..n]);
    buffer[n..].fill(0.0);
}
/// # Safety
/// `err_str` must hold `err_str_len` bytes. `module` is ignored.
#[cfg_attr(feature = "legacy-abi", export_name = "LVDLLStatus")]
pub unsafe extern "C" fn lv_dll_status(err_str: *mut c_char, err_str_len: c_int, _module: *mut c_void) -> c_long {
    guard("LVDLLStatus", || {
        checked_len(err_str_len, "error string")?;
        non_null(err_str, "error string buffer")?;
        let text = with_backend(|b| b.last_error())?;
        write_c_string(output(err_str as *mut u8, err_str_len, "error string")?, &text);
        Ok(STATUS_OK)
    }) as c_long
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{format_calibration_text, format_waveform_text, CalibrationStore};
    use crate::config::SimulationConfig;
    use crate::drivers::error::STATUS_CALIBRATION_FORMAT;
    use crate::simulator::SimulatedBackend;
    use crate::types::CalibrationData;
    use serial_test::serial;
    fn install_simulator(dir: &std::path::Path, max_file_bytes: usize) {
        let config = SimulationConfig {
            seed: Some(5),
            initial_calibration_error: 0.0,
            ..SimulationConfig::default()
        };
        let backend = SimulatedBackend::new(config, CalibrationStore::new(dir, max_file_bytes)).unwrap();
        install(Box::new(backend));
    }
    fn c_buf(text: &str) -> Vec<u8> {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        bytes
    }
    fn connect(port: &mut [u8]) -> (i32, String) {
        let mut status = vec![0xAAu8; 128];
        let code = unsafe {
            ftir_device_connect_visa(port.as_mut_ptr() as *mut c_char, status.as_mut_ptr() as *mut c_char, 128)
        };
        let end = status.iter().position(|&b| b == 0).unwrap_or(0);
        (code, String::from_utf8_lossy(&status[..end]).into_owned())
    }
    #[test]
    fn strings_are_cut_on_char_boundaries() {
        let mut buffer = [0xFFu8; 5];
        write_c_string(&mut buffer, "aé€b");
        assert_eq!(&buffer[..4], b"a\xC3\xA9\0");
        let mut one = [0xFFu8; 1];
        write_c_string(&mut one, "abc");
        assert_eq!(one, [0]);
    }
    #[test]
    #[serial]
    fn zero_lengths_write_nothing() {
        let dir = tempfile::tempdir().unwrap();
        install_simulator(dir.path(), 1 << 16);
        let mut port = c_buf("COM3");
        let mut status = vec![0xAAu8; 16];
        let code = unsafe {
            ftir_device_connect_visa(port.as_mut_ptr() as *mut c_char, status.as_mut_ptr() as *mut c_char, 0)
        };
        assert_eq!(code, STATUS_INVALID_ARGUMENT);
        assert!(status.iter().all(|&b| b == 0xAA));
        let mut data = vec![7i32; 8];
        let code = unsafe { ftir_get_spectrum(port.as_mut_ptr() as *mut c_char, 0, data.as_mut_ptr(), -3) };
        assert_eq!(code, STATUS_INVALID_ARGUMENT);
        assert!(data.iter().all(|&v| v == 7));
        let code = unsafe { ftir_get_spectrum(port.as_mut_ptr() as *mut c_char, 0, std::ptr::null_mut(), 8) };
        assert_eq!(code, STATUS_INVALID_ARGUMENT);
    }
    #[test]
    #[serial]
    fn every_buffer_rejects_zero_length() {
        let dir = tempfile::tempdir().unwrap();
        install_simulator(dir.path(), 1 << 16);
        let mut port = c_buf("COM3");
        assert_eq!(connect(&mut port).0, STATUS_OK);
        let port_ptr = port.as_mut_ptr() as *mut c_char;
        for (len, len2) in [(0, 4), (4, 0)] {
            let mut waveform = vec![9.0f64; 4];
            let mut relation = vec![9.0f64; 4];
            let code = unsafe { ftir_read_calib(port_ptr, waveform.as_mut_ptr(), relation.as_mut_ptr(), len, len2) };
            assert_eq!(code, STATUS_INVALID_ARGUMENT, "read calib ({len}, {len2})");
            assert!(waveform.iter().chain(&relation).all(|&v| v == 9.0));
        }
        for zeroed in 0..4 {
            let mut lens = [64, 2, 2, 8];
            lens[zeroed] = 0;
            let mut scan = vec![100i32; 64];
            let mut waveform = vec![0.0f64, 5.0];
            let mut relation = vec![0.0f64, 50_000.0];
            let mut spectrum = vec![-1.0f64; 8];
            let code = unsafe {
                ftir_data_process(
                    scan.as_mut_ptr(),
                    0,
                    waveform.as_mut_ptr(),
                    relation.as_mut_ptr(),
                    900.0,
                    0,
                    2600.0,
                    spectrum.as_mut_ptr(),
                    lens[0],
                    lens[1],
                    lens[2],
                    lens[3],
                )
            };
            assert_eq!(code, STATUS_INVALID_ARGUMENT, "data process with length {zeroed} zeroed");
            assert!(spectrum.iter().all(|&v| v == -1.0));
            assert!(scan.iter().all(|&v| v == 100));
        }
        let mut serial = vec![0xAAu8; 16];
        let mut number = -1;
        let code = unsafe { ftir_get_serial_num_visa(port_ptr, serial.as_mut_ptr() as *mut c_char, &mut number, 0) };
        assert_eq!(code, STATUS_INVALID_ARGUMENT);
        assert!(serial.iter().all(|&b| b == 0xAA));
        assert_eq!(number, -1);
        let mut text = vec![0xAAu8; 16];
        let code = unsafe { lv_dll_status(text.as_mut_ptr() as *mut c_char, 0, std::ptr::null_mut()) };
        assert_eq!(code, STATUS_INVALID_ARGUMENT as c_long);
        assert!(text.iter().all(|&b| b == 0xAA));
        let mut before = vec![0.0f64; 2];
        let mut relation_before = vec![0.0f64; 2];
        unsafe { ftir_read_calib(port_ptr, before.as_mut_ptr(), relation_before.as_mut_ptr(), 2, 2) };
        let mut waveform = vec![0.0f64, 5.0];
        let code = unsafe { ftir_auto_wavelength_calib(0, 1550.0, waveform.as_mut_ptr(), port_ptr, 0) };
        assert_eq!(code, STATUS_INVALID_ARGUMENT);
        assert_eq!(waveform, vec![0.0, 5.0]);
        let mut after = vec![0.0f64; 2];
        let mut relation_after = vec![0.0f64; 2];
        unsafe { ftir_read_calib(port_ptr, after.as_mut_ptr(), relation_after.as_mut_ptr(), 2, 2) };
        assert_eq!((before, relation_before), (after, relation_after));
    }
    #[test]
    #[serial]
    fn repeated_connect_is_stable_and_unknown_ports_fail() {
        let dir = tempfile::tempdir().unwrap();
        install_simulator(dir.path(), 1 << 16);
        let mut port = c_buf("COM3");
        let first = connect(&mut port);
        let second = connect(&mut port);
        assert_eq!(first.0, STATUS_OK);
        assert_eq!(first, second);
        let mut other = c_buf("COM77");
        assert_eq!(connect(&mut other).0, 14);
        let mut text = vec![0u8; 256];
        let code = unsafe { lv_dll_status(text.as_mut_ptr() as *mut c_char, 256, std::ptr::null_mut()) };
        assert_eq!(code, 0);
        assert!(String::from_utf8_lossy(&text).contains("COM77"));
    }
    #[test]
    #[serial]
    fn serial_number_and_alignment() {
        let dir = tempfile::tempdir().unwrap();
        install_simulator(dir.path(), 1 << 16);
        let mut port = c_buf("COM3");
        connect(&mut port);
        let mut serial = vec![0u8; 32];
        let mut number = -1;
        let code = unsafe {
            ftir_get_serial_num_visa(
                port.as_mut_ptr() as *mut c_char,
                serial.as_mut_ptr() as *mut c_char,
                &mut number,
                32,
            )
        };
        assert_eq!(code, STATUS_OK);
        assert!(serial.starts_with(b"NF-SIM-0001\0"));
        assert_eq!(unsafe { ftir_auto_align(number as u64) }, 0);
        assert_eq!(unsafe { ftir_auto_align(9999) }, 14);
    }
    #[test]
    #[serial]
    fn write_flags_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        install_simulator(dir.path(), 16);
        let mut port = c_buf("COM3");
        connect(&mut port);
        let mut text = c_buf("1\t2\n3\t4\n5\t6\n7\t8\n9\t10\n");
        let (mut writing, mut size) = (LV_TRUE, LV_TRUE);
        let code = unsafe {
            ftir_manual_save_calib(
                port.as_mut_ptr() as *mut c_char,
                text.as_mut_ptr() as *mut c_char,
                &mut writing,
                &mut size,
            )
        };
        assert_eq!(code, STATUS_OK);
        assert_eq!((writing, size), (LV_FALSE, LV_TRUE));
        let mut garbage = c_buf("x\ty\n");
        let code = unsafe {
            ftir_manual_save_calib(
                port.as_mut_ptr() as *mut c_char,
                garbage.as_mut_ptr() as *mut c_char,
                &mut writing,
                &mut size,
            )
        };
        assert_eq!(code, STATUS_CALIBRATION_FORMAT);
        assert_eq!((writing, size), (LV_FALSE, LV_FALSE));
    }
    #[test]
    #[serial]
    fn calibration_round_trip_zero_fills() {
        let dir = tempfile::tempdir().unwrap();
        install_simulator(dir.path(), 1 << 16);
        let mut port = c_buf("COM3");
        connect(&mut port);
        let data = CalibrationData {
            voltage_waveform: vec![0.25, -1.5, 3.0000000000000004],
            calibration_relation: vec![1.0e-3, 49_999.5],
        };
        let mut text = c_buf(&format_calibration_text(&data));
        let (mut writing, mut size) = (LV_TRUE, LV_TRUE);
        unsafe {
            ftir_manual_save_calib(
                port.as_mut_ptr() as *mut c_char,
                text.as_mut_ptr() as *mut c_char,
                &mut writing,
                &mut size,
            );
        }
        assert_eq!((writing, size), (LV_FALSE, LV_FALSE));
        let mut waveform = vec![9.0f64; 5];
        let mut relation = vec![9.0f64; 2];
        let code = unsafe {
            ftir_read_calib(
                port.as_mut_ptr() as *mut c_char,
                waveform.as_mut_ptr(),
                relation.as_mut_ptr(),
                5,
                2,
            )
        };
        assert_eq!(code, STATUS_OK);
        assert_eq!(waveform, vec![0.25, -1.5, 3.0000000000000004, 0.0, 0.0]);
        assert_eq!(relation, data.calibration_relation);
        let mut wave_text = c_buf(&format_waveform_text(&[0.5, -0.5]));
        let mut wave_error = LV_TRUE;
        let code = unsafe {
            ftir_manual_save_waveform(
                2.0,
                wave_text.as_mut_ptr() as *mut c_char,
                port.as_mut_ptr() as *mut c_char,
                &mut wave_error,
            )
        };
        assert_eq!((code, wave_error), (STATUS_OK, LV_FALSE));
        unsafe {
            ftir_read_calib(port.as_mut_ptr() as *mut c_char, waveform.as_mut_ptr(), relation.as_mut_ptr(), 5, 2);
        }
        assert_eq!(waveform, vec![1.0, -1.0, 0.0, 0.0, 0.0]);
        assert_eq!(relation, data.calibration_relation);
    }
    #[test]
    #[serial]
    fn capture_then_process() {
        let dir = tempfile::tempdir().unwrap();
        install_simulator(dir.path(), 1 << 16);
        let mut port = c_buf("COM3");
        connect(&mut port);
        let mut scan = vec![0i32; 2048];
        let code = unsafe { ftir_get_spectrum(port.as_mut_ptr() as *mut c_char, 0, scan.as_mut_ptr(), 2048) };
        assert_eq!(code, STATUS_OK);
        let original = scan.clone();
        let mut waveform = vec![0.0f64, 5.0];
        let mut relation = vec![0.0f64, 50_000.0];
        let mut spectrum = vec![-1.0f64; 171];
        let code = unsafe {
            ftir_data_process(
                scan.as_mut_ptr(),
                0,
                waveform.as_mut_ptr(),
                relation.as_mut_ptr(),
                900.0,
                0,
                2600.0,
                spectrum.as_mut_ptr(),
                2048,
                2,
                2,
                171,
            )
        };
        assert_eq!(code, STATUS_OK);
        assert_eq!(scan, original);
        assert_eq!(relation, vec![0.0, 50_000.0]);
        assert!(spectrum.iter().all(|&v| v >= 0.0));
        assert!(spectrum.iter().any(|&v| v > 0.0));
    }
    #[test]
    #[serial]
    fn upstream_error_passes_through_untouched() {
        let dir = tempfile::tempdir().unwrap();
        install_simulator(dir.path(), 1 << 16);
        let mut scan = vec![1i32; 16];
        let mut waveform = vec![0.0f64; 2];
        let mut relation = vec![0.0f64, 50_000.0];
        let mut spectrum = vec![-1.0f64; 4];
        let code = unsafe {
            ftir_data_process(
                scan.as_mut_ptr(),
                11,
                waveform.as_mut_ptr(),
                relation.as_mut_ptr(),
                900.0,
                0,
                2600.0,
                spectrum.as_mut_ptr(),
                16,
                2,
                2,
                4,
            )
        };
        assert_eq!(code, 11);
        assert!(spectrum.iter().all(|&v| v == -1.0));
    }
}
