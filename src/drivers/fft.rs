use rustfft::{num_complex::Complex64, FftPlanner};
use serde::{Deserialize, Serialize};
use crate::drivers::FtirError;
use crate::types::MeasurementMode;
/// Default zero-fill target, matching the processing chain of the instrument software.
pub const DEFAULT_FFT_SIZE: usize = 4096;
/// Evenly spaced wavelength axis in nanometres, both ends inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WavelengthGrid {
    pub min_nm: f64,
    pub max_nm: f64,
    pub points: usize,
}
impl WavelengthGrid {
    pub fn new(min_nm: f64, max_nm: f64, points: usize) -> Result<Self, FtirError> {
        let grid = Self {
            min_nm,
            max_nm,
            points,
        };
        grid.validate()?;
        Ok(grid)
    }
    pub fn validate(&self) -> Result<(), FtirError> {
        if !(self.min_nm.is_finite() && self.max_nm.is_finite()) {
            return Err(FtirError::invalid("wavelength bounds must be finite"));
        }
        if self.min_nm <= 0.0 || self.max_nm <= self.min_nm {
            return Err(FtirError::invalid(format!(
                "wavelength range {}..{} nm is empty",
                self.min_nm, self.max_nm
            )));
        }
        if self.points == 0 {
            return Err(FtirError::invalid("spectrum length must be positive"));
        }
        Ok(())
    }
    pub fn step_nm(&self) -> f64 {
        if self.points < 2 {
            0.0
        } else {
            (self.max_nm - self.min_nm) / (self.points - 1) as f64
        }
    }
    pub fn wavelength(&self, index: usize) -> f64 {
        self.min_nm + self.step_nm() * index as f64
    }
    pub fn wavelengths(&self) -> Vec<f64> {
        (0..self.points).map(|i| self.wavelength(i)).collect()
    }
}
/// Single point of a processed spectrum, in the layout the capture tools export.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpectrumPoint {
    pub wavelength: f64,
    pub measured_value: f64,
}
/// Processed spectrum on a wavelength grid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    pub grid: WavelengthGrid,
    pub mode: MeasurementMode,
    pub values: Vec<f64>,
}
impl Spectrum {
    pub fn new(grid: WavelengthGrid, mode: MeasurementMode, values: Vec<f64>) -> Result<Self, FtirError> {
        if values.len() != grid.points {
            return Err(FtirError::LengthMismatch {
                expected: grid.points,
                actual: values.len(),
            });
        }
        Ok(Self { grid, mode, values })
    }
    pub fn points(&self) -> Vec<SpectrumPoint> {
        self.values
            .iter()
            .enumerate()
            .map(|(i, &v)| SpectrumPoint {
                wavelength: self.grid.wavelength(i),
                measured_value: v,
            })
            .collect()
    }
    /// Keeps the points with `min_nm <= wavelength < max_nm`.
    pub fn window(&self, min_nm: f64, max_nm: f64) -> Result<Spectrum, FtirError> {
        let kept: Vec<(f64, f64)> = self
            .points()
            .into_iter()
            .filter(|p| p.wavelength >= min_nm && p.wavelength < max_nm)
            .map(|p| (p.wavelength, p.measured_value))
            .collect();
        let (Some(first), Some(last)) = (kept.first(), kept.last()) else {
            return Err(FtirError::invalid(format!(
                "window {min_nm}..{max_nm} nm does not overlap the spectrum"
            )));
        };
        let grid = WavelengthGrid {
            min_nm: first.0,
            max_nm: if kept.len() == 1 { first.0 + 1.0 } else { last.0 },
            points: kept.len(),
        };
        Ok(Spectrum {
            grid,
            mode: self.mode,
            values: kept.into_iter().map(|(_, v)| v).collect(),
        })
    }
    /// Wavelength of the largest value.
    pub fn peak_wavelength(&self) -> Option<f64> {
        self.values
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| self.grid.wavelength(i))
    }
    /// Value at a wavelength, linearly interpolated between grid points.
    pub fn value_at(&self, wavelength_nm: f64) -> Option<f64> {
        let step = self.grid.step_nm();
        if self.values.is_empty() || wavelength_nm < self.grid.min_nm || wavelength_nm > self.grid.max_nm {
            return None;
        }
        if step == 0.0 {
            return self.values.first().copied();
        }
        let pos = (wavelength_nm - self.grid.min_nm) / step;
        let lo = (pos.floor() as usize).min(self.values.len() - 1);
        let hi = (lo + 1).min(self.values.len() - 1);
        let t = pos - lo as f64;
        Some(self.values[lo] * (1.0 - t) + self.values[hi] * t)
    }
}
/// Evaluates the calibration polynomial `c0 + c1 f + c2 f^2 + ...`.
pub fn wavenumber_at(relation: &[f64], normalized_frequency: f64) -> f64 {
    relation
        .iter()
        .rev()
        .fold(0.0, |acc, &c| acc * normalized_frequency + c)
}
/// Magnitude spectrum of a DC-free, Hann-apodised record, zero-filled to `fft_size`.
pub fn magnitude_spectrum(samples: &[i32], fft_size: usize) -> Vec<f64> {
    let n = samples.len();
    let mean = samples.iter().map(|&v| v as f64).sum::<f64>() / n.max(1) as f64;
    let mut window_sum = 0.0;
    let mut buffer: Vec<Complex64> = samples
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            let w = if n < 2 {
                1.0
            } else {
                0.5 - 0.5 * (2.0 * std::f64::consts::PI * i as f64 / (n - 1) as f64).cos()
            };
            window_sum += w;
            Complex64::new((v as f64 - mean) * w, 0.0)
        })
        .collect();
    buffer.resize(fft_size, Complex64::new(0.0, 0.0));
    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(fft_size);
    fft.process(&mut buffer);
    let scale = if window_sum > 0.0 { 2.0 / window_sum } else { 0.0 };
    buffer
        .iter()
        .take(fft_size / 2)
        .map(|c| c.norm() * scale)
        .collect()
}
/// Fractional bin of the strongest component, refined with a parabola through its neighbours.
pub fn refined_peak_bin(magnitudes: &[f64]) -> Option<f64> {
    let (k, _) = magnitudes
        .iter()
        .enumerate()
        .skip(1)
        .max_by(|a, b| a.1.total_cmp(b.1))?;
    if k == 0 || k + 1 >= magnitudes.len() {
        return Some(k as f64);
    }
    let (a, b, c) = (magnitudes[k - 1], magnitudes[k], magnitudes[k + 1]);
    let denom = a - 2.0 * b + c;
    if denom.abs() < f64::EPSILON {
        return Some(k as f64);
    }
    Some(k as f64 + 0.5 * (a - c) / denom)
}
/// Interferogram-to-spectrum transform used by the simulated instrument.
pub struct SpectrumBuilder {
    min_fft_size: usize,
}
impl Default for SpectrumBuilder {
    fn default() -> Self {
        Self::with_size(DEFAULT_FFT_SIZE)
    }
}
impl SpectrumBuilder {
    pub fn with_size(min_fft_size: usize) -> Self {
        Self {
            min_fft_size: min_fft_size.max(2),
        }
    }
    pub fn fft_size_for(&self, samples: usize) -> usize {
        samples.next_power_of_two().max(self.min_fft_size.next_power_of_two())
    }
    pub fn compute(
        &self,
        samples: &[i32],
        calibration_relation: &[f64],
        grid: WavelengthGrid,
        mode: MeasurementMode,
    ) -> Result<Spectrum, FtirError> {
        grid.validate()?;
        if samples.is_empty() {
            return Err(FtirError::invalid("interferogram has no samples"));
        }
        if calibration_relation.is_empty() {
            return Err(FtirError::invalid("calibration relation is empty"));
        }
        let fft_size = self.fft_size_for(samples.len());
        let magnitudes = magnitude_spectrum(samples, fft_size);
        let mut curve: Vec<(f64, f64)> = magnitudes
            .iter()
            .enumerate()
            .skip(1)
            .filter_map(|(k, &mag)| {
                let nu = wavenumber_at(calibration_relation, k as f64 / fft_size as f64);
                (nu > 0.0).then(|| (1.0e7 / nu, mag))
            })
            .collect();
        curve.sort_by(|a, b| a.0.total_cmp(&b.0));
        let mut values: Vec<f64> = grid
            .wavelengths()
            .into_iter()
            .map(|wl| interpolate(&curve, wl).max(0.0))
            .collect();
        if mode == MeasurementMode::Absorbance {
            let peak = values.iter().copied().fold(0.0f64, f64::max);
            if peak <= 0.0 {
                return Err(FtirError::invalid("spectrum has no signal to reference"));
            }
            let floor = peak * 1e-12;
            for v in values.iter_mut() {
                *v = -(v.max(floor) / peak).log10();
            }
        } else if mode != MeasurementMode::Raw {
            return Err(FtirError::invalid(format!(
                "measurement mode {} is not supported",
                mode.as_u16()
            )));
        }
        Spectrum::new(grid, mode, values)
    }
}
fn interpolate(curve: &[(f64, f64)], x: f64) -> f64 {
    let (Some(first), Some(last)) = (curve.first(), curve.last()) else {
        return 0.0;
    };
    if x < first.0 || x > last.0 {
        return 0.0;
    }
    let idx = curve.partition_point(|p| p.0 < x);
    if idx == 0 {
        return first.1;
    }
    if idx >= curve.len() {
        return last.1;
    }
    let (x0, y0) = curve[idx - 1];
    let (x1, y1) = curve[idx];
    if (x1 - x0).abs() < f64::EPSILON {
        return y1;
    }
    y0 + (y1 - y0) * (x - x0) / (x1 - x0)
}
