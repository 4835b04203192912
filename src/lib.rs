//! Control library for nanoFTIR spectrometers.
//!
//! [`FtirBackend`] is the device façade. [`DllBackend`] drives the vendor
//! driver, [`SimulatedBackend`] stands in for the hardware, and [`Session`]
//! adds the connection lifecycle and the averaged measurement workflow.
//! [`compat`] re-exposes the legacy fixed-buffer C entry points.
pub mod backend;
pub mod calibration;
pub mod compat;
pub mod config;
pub mod dll;
pub mod drivers;
pub mod engine;
pub mod ffi;
pub mod library;
pub mod recorder;
pub mod session;
pub mod simulator;
pub mod types;
pub use backend::{FtirBackend, ProcessRequest};
pub use calibration::CalibrationStore;
pub use config::Config;
pub use dll::DllBackend;
pub use drivers::{DeviceStatus, FtirError, Interferogram, Result, Spectrum, SpectrumPoint, WavelengthGrid};
pub use engine::Engine;
pub use session::{DeviceState, Measurement, MeasurementSettings, Session, SessionProcessor};
pub use simulator::SimulatedBackend;
pub use types::{CalibrationData, DeviceCommand, DeviceEvent, DeviceHandle, DeviceIdentity, MeasurementMode, PortName, WriteReport};
