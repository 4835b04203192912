use ndarray::{Array1, Array2, Axis};
use crate::drivers::fft::{Spectrum, WavelengthGrid};
use crate::drivers::FtirError;
use crate::types::MeasurementMode;
/// Collects spectra from repeated scans on one grid and averages them.
pub struct ScanAccumulator {
    grid: Option<WavelengthGrid>,
    mode: Option<MeasurementMode>,
    scans: Vec<Array1<f64>>,
    capacity: usize,
}
impl ScanAccumulator {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            grid: None,
            mode: None,
            scans: Vec::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }
    pub fn len(&self) -> usize {
        self.scans.len()
    }
    pub fn is_empty(&self) -> bool {
        self.scans.is_empty()
    }
    pub fn is_full(&self) -> bool {
        self.scans.len() >= self.capacity
    }
    pub fn push(&mut self, spectrum: &Spectrum) -> Result<(), FtirError> {
        match self.grid {
            None => {
                self.grid = Some(spectrum.grid);
                self.mode = Some(spectrum.mode);
            }
            Some(grid) if grid.points != spectrum.grid.points => {
                return Err(FtirError::LengthMismatch {
                    expected: grid.points,
                    actual: spectrum.grid.points,
                });
            }
            Some(grid) if grid != spectrum.grid => {
                return Err(FtirError::invalid("spectrum grid changed between scans"));
            }
            Some(_) => {}
        }
        if self.is_full() {
            self.scans.remove(0);
        }
        self.scans.push(Array1::from_vec(spectrum.values.clone()));
        Ok(())
    }
    /// Scans stacked as rows, for export.
    pub fn matrix(&self) -> Result<Array2<f64>, FtirError> {
        let grid = self.grid.ok_or(FtirError::NoScans)?;
        let mut matrix = Array2::zeros((self.scans.len(), grid.points));
        for (mut row, scan) in matrix.axis_iter_mut(Axis(0)).zip(&self.scans) {
            row.assign(scan);
        }
        Ok(matrix)
    }
    pub fn scans(&self) -> Result<Vec<Spectrum>, FtirError> {
        let grid = self.grid.ok_or(FtirError::NoScans)?;
        let mode = self.mode.unwrap_or_default();
        self.scans
            .iter()
            .map(|scan| Spectrum::new(grid, mode, scan.to_vec()))
            .collect()
    }
    pub fn average(&self) -> Result<Spectrum, FtirError> {
        let grid = self.grid.ok_or(FtirError::NoScans)?;
        let mode = self.mode.unwrap_or_default();
        let mean = self
            .matrix()?
            .mean_axis(Axis(0))
            .ok_or(FtirError::NoScans)?;
        Spectrum::new(grid, mode, mean.to_vec())
    }
}
