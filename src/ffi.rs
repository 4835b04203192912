//! Raw signatures of the nanoFTIR driver DLL.
//!
//! Widths follow the exported header exactly. `FTIR_GetSpectrum` is the one
//! `__stdcall` entry point; `extern "system"` resolves to stdcall on 32-bit
//! Windows and to the C convention everywhere else.
#![allow(non_camel_case_types)]
use std::os::raw::{c_char, c_int, c_long, c_void};
/// LabVIEW boolean, one byte, non-zero is true.
pub type LVBoolean = u8;
pub const LV_FALSE: LVBoolean = 0;
pub const LV_TRUE: LVBoolean = 1;
pub type FTIR_AutoAlign = unsafe extern "C" fn(handle: u64) -> u32;
pub type FTIR_AutoWavelengthCalib = unsafe extern "C" fn(
    delay_time: i32,
    calib_laser_wavelength: f64,
    voltage_waveform: *mut f64,
    com_port: *mut c_char,
    len: i32,
) -> i32;
pub type FTIR_DataProcess = unsafe extern "C" fn(
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
) -> i32;
pub type FTIR_DeviceConnect_VISA =
    unsafe extern "C" fn(com_port: *mut c_char, connection_status: *mut c_char, len: i32) -> i32;
pub type FTIR_GetSerialNum_VISA = unsafe extern "C" fn(
    com_port: *mut c_char,
    serial_number: *mut c_char,
    device_number: *mut i32,
    len: i32,
) -> i32;
pub type FTIR_GetSpectrum = unsafe extern "system" fn(
    com_port: *mut c_char,
    delay_time: i32,
    interferogram_data: *mut i32,
    len: i32,
) -> i32;
pub type FTIR_ManualSaveCalib = unsafe extern "C" fn(
    com_port: *mut c_char,
    calib_waveform: *mut c_char,
    calib_writing_error: *mut LVBoolean,
    calib_file_size_error: *mut LVBoolean,
) -> i32;
pub type FTIR_ManualSaveWaveform = unsafe extern "C" fn(
    max_voltage: f64,
    voltage_waveform: *mut c_char,
    com_port: *mut c_char,
    waveform_writing_error: *mut LVBoolean,
) -> i32;
pub type FTIR_ReadCalib = unsafe extern "C" fn(
    com_port: *mut c_char,
    voltage_waveform: *mut f64,
    calibration_relation: *mut f64,
    len: i32,
    len2: i32,
) -> i32;
pub type LVDLLStatus =
    unsafe extern "C" fn(err_str: *mut c_char, err_str_len: c_int, module: *mut c_void) -> c_long;
/// Exported symbol names, NUL terminated for `libloading`.
pub mod symbols {
    pub const AUTO_ALIGN: &[u8] = b"FTIR_AutoAlign\0";
    pub const AUTO_WAVELENGTH_CALIB: &[u8] = b"FTIR_AutoWavelengthCalib\0";
    pub const DATA_PROCESS: &[u8] = b"FTIR_DataProcess\0";
    pub const DEVICE_CONNECT: &[u8] = b"FTIR_DeviceConnect_VISA\0";
    pub const GET_SERIAL_NUM: &[u8] = b"FTIR_GetSerialNum_VISA\0";
    pub const GET_SPECTRUM: &[u8] = b"FTIR_GetSpectrum\0";
    pub const MANUAL_SAVE_CALIB: &[u8] = b"FTIR_ManualSaveCalib\0";
    pub const MANUAL_SAVE_WAVEFORM: &[u8] = b"FTIR_ManualSaveWaveform\0";
    pub const READ_CALIB: &[u8] = b"FTIR_ReadCalib\0";
    pub const DLL_STATUS: &[u8] = b"LVDLLStatus\0";
}
