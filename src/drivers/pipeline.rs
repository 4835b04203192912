use crate::drivers::buffer::ScanAccumulator;
use crate::drivers::error::FtirError;
use crate::drivers::fft::{Spectrum, SpectrumBuilder, WavelengthGrid};
use crate::drivers::source::{Interferogram, InterferogramSource};
use crate::types::{CalibrationData, MeasurementMode};
/// Turns one interferogram into a spectrum.
pub trait SpectrumProcessor {
    fn process_scan(&mut self, scan: &Interferogram) -> Result<Spectrum, FtirError>;
}
/// Local processing with a fixed calibration, for offline work on recorded scans.
pub struct LocalProcessor {
    builder: SpectrumBuilder,
    calibration: CalibrationData,
    grid: WavelengthGrid,
    mode: MeasurementMode,
}
impl LocalProcessor {
    pub fn new(calibration: CalibrationData, grid: WavelengthGrid, mode: MeasurementMode) -> Self {
        Self {
            builder: SpectrumBuilder::default(),
            calibration,
            grid,
            mode,
        }
    }
}
impl SpectrumProcessor for LocalProcessor {
    fn process_scan(&mut self, scan: &Interferogram) -> Result<Spectrum, FtirError> {
        scan.validate()?;
        self.builder.compute(
            &scan.samples,
            &self.calibration.calibration_relation,
            self.grid,
            self.mode,
        )
    }
}
/// Pulls scans from a source, processes them and keeps a running average.
pub struct SpectrumPipeline<S: InterferogramSource, P: SpectrumProcessor> {
    source: S,
    processor: P,
    accumulator: ScanAccumulator,
}
impl<S: InterferogramSource, P: SpectrumProcessor> SpectrumPipeline<S, P> {
    pub fn new(source: S, processor: P, scan_average: usize) -> Self {
        Self {
            source,
            processor,
            accumulator: ScanAccumulator::with_capacity(scan_average),
        }
    }
    pub fn pump_once(&mut self) -> Result<Option<Spectrum>, FtirError> {
        let Some(scan) = self.source.next_interferogram()? else {
            return Ok(None);
        };
        let spectrum = self.processor.process_scan(&scan)?;
        self.accumulator.push(&spectrum)?;
        Ok(Some(spectrum))
    }
    /// Pumps until the accumulator is full or the source runs dry.
    pub fn run(&mut self) -> Result<Spectrum, FtirError> {
        while !self.accumulator.is_full() {
            if self.pump_once()?.is_none() {
                break;
            }
        }
        self.accumulator.average()
    }
    pub fn accumulator(&self) -> &ScanAccumulator {
        &self.accumulator
    }
}
