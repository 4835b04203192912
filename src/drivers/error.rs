use std::fmt;
use thiserror::Error;
use crate::session::DeviceState;
/// Status codes returned by crate-side failures at the legacy boundary.
/// Device codes are positive, so these stay negative.
pub const STATUS_OK: i32 = 0;
pub const STATUS_INVALID_ARGUMENT: i32 = -1;
pub const STATUS_INVALID_STATE: i32 = -2;
pub const STATUS_CALIBRATION_FORMAT: i32 = -3;
pub const STATUS_IO: i32 = -4;
pub const STATUS_INTERNAL: i32 = -5;
pub const STATUS_TIMEOUT: i32 = -6;
/// Non-zero status reported by the instrument driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceStatus {
    DetectorSaturation,
    NoLight,
    LibraryLoad,
    ConnectionFailure,
    Unknown(i32),
}
impl DeviceStatus {
    pub fn from_code(code: i32) -> Self {
        match code {
            9 => DeviceStatus::DetectorSaturation,
            11 => DeviceStatus::NoLight,
            13 => DeviceStatus::LibraryLoad,
            14 => DeviceStatus::ConnectionFailure,
            other => DeviceStatus::Unknown(other),
        }
    }
    pub fn code(&self) -> i32 {
        match self {
            DeviceStatus::DetectorSaturation => 9,
            DeviceStatus::NoLight => 11,
            DeviceStatus::LibraryLoad => 13,
            DeviceStatus::ConnectionFailure => 14,
            DeviceStatus::Unknown(code) => *code,
        }
    }
    /// Message suitable for showing to an operator.
    pub fn user_message(&self) -> &'static str {
        match self {
            DeviceStatus::ConnectionFailure => {
                "Failed to connect to device. Please ensure it is connected to computer and try again."
            }
            _ => "Unknown error has occurred.",
        }
    }
}
impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceStatus::DetectorSaturation => write!(f, "detector saturation (9)"),
            DeviceStatus::NoLight => write!(f, "no light (11)"),
            DeviceStatus::LibraryLoad => write!(f, "failed to load DLL (13)"),
            DeviceStatus::ConnectionFailure => write!(f, "connection failure (14)"),
            DeviceStatus::Unknown(code) => write!(f, "status {code}"),
        }
    }
}
#[derive(Debug, Error)]
pub enum FtirError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{operation} failed: {status}")]
    Device {
        operation: &'static str,
        status: DeviceStatus,
    },
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: DeviceState,
    },
    #[error("upstream error {0} passed through")]
    Upstream(i32),
    #[error("port {0} is not available")]
    PortUnavailable(String),
    #[error("failed to load FTIR library: {0}")]
    Library(#[from] libloading::Error),
    #[error("malformed calibration data: {0}")]
    CalibrationFormat(String),
    #[error("length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("no scans accumulated yet")]
    NoScans,
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Serial(#[from] serialport::Error),
    #[error("failed to render plot: {0}")]
    Plot(String),
}
impl FtirError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        FtirError::InvalidArgument(msg.into())
    }
    pub fn device(operation: &'static str, code: i32) -> Self {
        FtirError::Device {
            operation,
            status: DeviceStatus::from_code(code),
        }
    }
    /// Status code as seen by legacy callers.
    pub fn status_code(&self) -> i32 {
        match self {
            FtirError::Device { status, .. } => status.code(),
            FtirError::Upstream(code) => *code,
            FtirError::PortUnavailable(_) => DeviceStatus::ConnectionFailure.code(),
            FtirError::Library(_) => DeviceStatus::LibraryLoad.code(),
            FtirError::InvalidArgument(_)
            | FtirError::LengthMismatch { .. }
            | FtirError::Config(_) => STATUS_INVALID_ARGUMENT,
            FtirError::InvalidState { .. } => STATUS_INVALID_STATE,
            FtirError::CalibrationFormat(_) | FtirError::Json(_) => STATUS_CALIBRATION_FORMAT,
            FtirError::Io(_) | FtirError::Serial(_) => STATUS_IO,
            FtirError::Timeout(_) => STATUS_TIMEOUT,
            FtirError::NoScans | FtirError::Plot(_) => STATUS_INTERNAL,
        }
    }
    /// Device errors move a session to `Faulted`; argument and state errors do not.
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            FtirError::Device { .. }
                | FtirError::PortUnavailable(_)
                | FtirError::Library(_)
                | FtirError::Io(_)
                | FtirError::Timeout(_)
        )
    }
}
impl<E: std::error::Error + Send + Sync + 'static> From<plotters::drawing::DrawingAreaErrorKind<E>>
    for FtirError
{
    fn from(value: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        FtirError::Plot(format!("{value:?}"))
    }
}
impl From<image::ImageError> for FtirError {
    fn from(value: image::ImageError) -> Self {
        FtirError::Plot(value.to_string())
    }
}
pub type Result<T> = std::result::Result<T, FtirError>;
