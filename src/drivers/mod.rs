// src/drivers/mod.rs
pub mod buffer;
pub mod error;
pub mod fft;
pub mod pipeline;
pub mod plot;
pub mod source;
pub use buffer::ScanAccumulator;
pub use error::{DeviceStatus, FtirError, Result};
pub use fft::{Spectrum, SpectrumBuilder, SpectrumPoint, WavelengthGrid};
pub use pipeline::{LocalProcessor, SpectrumPipeline, SpectrumProcessor};
pub use plot::{render_interferogram_png, render_spectrum_png, PlotStyle};
pub use source::{Interferogram, InterferogramSource, ManualSource};
