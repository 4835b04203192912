// src/recorder.rs
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::time::{Duration, UNIX_EPOCH};
use log::info;
use serde::{Deserialize, Serialize};
use crate::drivers::{render_interferogram_png, render_spectrum_png, FtirError, Interferogram, PlotStyle, Result, Spectrum};
/// On-disk form of an interferogram.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterferogramRecord {
    pub port: String,
    /// Milliseconds since the Unix epoch.
    pub captured_at_ms: u64,
    pub samples: Vec<i32>,
}
impl From<&Interferogram> for InterferogramRecord {
    fn from(scan: &Interferogram) -> Self {
        let captured_at_ms = scan
            .captured_at
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self {
            port: scan.port.clone(),
            captured_at_ms,
            samples: scan.samples.clone(),
        }
    }
}
impl From<InterferogramRecord> for Interferogram {
    fn from(record: InterferogramRecord) -> Self {
        Interferogram {
            captured_at: UNIX_EPOCH + Duration::from_millis(record.captured_at_ms),
            port: record.port,
            samples: record.samples,
        }
    }
}
/// Spectrum as `[{"wavelength": .., "measuredValue": ..}, ..]`.
pub fn save_spectrum_json(path: impl AsRef<Path>, spectrum: &Spectrum) -> Result<()> {
    let mut w = BufWriter::new(File::create(path.as_ref())?);
    serde_json::to_writer_pretty(&mut w, &spectrum.points())?;
    w.flush()?;
    info!("spectrum saved: {}", path.as_ref().display());
    Ok(())
}
/// One row per wavelength and one column per scan. All scans must share a grid.
pub fn save_spectra_csv(path: impl AsRef<Path>, scans: &[Spectrum]) -> Result<()> {
    let first = scans.first().ok_or(FtirError::NoScans)?;
    if let Some(other) = scans.iter().find(|s| s.grid != first.grid) {
        return Err(FtirError::LengthMismatch {
            expected: first.grid.points,
            actual: other.grid.points,
        });
    }
    let mut w = BufWriter::new(File::create(path.as_ref())?);
    write!(w, "wavelength")?;
    for i in 1..=scans.len() {
        write!(w, ",Scan {i}")?;
    }
    writeln!(w)?;
    for (row, wavelength) in first.grid.wavelengths().into_iter().enumerate() {
        write!(w, "{wavelength}")?;
        for scan in scans {
            write!(w, ",{}", scan.values[row])?;
        }
        writeln!(w)?;
    }
    w.flush()?;
    info!("{} scans saved: {}", scans.len(), path.as_ref().display());
    Ok(())
}
pub fn save_interferogram_json(path: impl AsRef<Path>, scan: &Interferogram) -> Result<()> {
    let mut w = BufWriter::new(File::create(path.as_ref())?);
    serde_json::to_writer(&mut w, &InterferogramRecord::from(scan))?;
    w.flush()?;
    Ok(())
}
pub fn load_interferogram_json(path: impl AsRef<Path>) -> Result<Interferogram> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    let record: InterferogramRecord = serde_json::from_reader(reader)?;
    let scan = Interferogram::from(record);
    scan.validate()?;
    Ok(scan)
}
pub fn save_interferogram_png(path: impl AsRef<Path>, scan: &Interferogram) -> Result<()> {
    std::fs::write(path.as_ref(), render_interferogram_png(scan, PlotStyle::default())?)?;
    Ok(())
}
pub fn save_spectrum_png(path: impl AsRef<Path>, spectrum: &Spectrum) -> Result<()> {
    std::fs::write(path.as_ref(), render_spectrum_png(spectrum, PlotStyle::default())?)?;
    Ok(())
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::WavelengthGrid;
    use crate::types::MeasurementMode;
    fn spectrum(values: Vec<f64>) -> Spectrum {
        let grid = WavelengthGrid::new(1000.0, 1002.0, values.len()).unwrap();
        Spectrum::new(grid, MeasurementMode::Raw, values).unwrap()
    }
    #[test]
    fn spectrum_json_uses_measured_value_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spectrum.json");
        save_spectrum_json(&path, &spectrum(vec![1.0, 2.0, 3.0])).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed[0]["wavelength"], 1000.0);
        assert_eq!(parsed[2]["measuredValue"], 3.0);
    }
    #[test]
    fn csv_has_one_column_per_scan() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scans.csv");
        save_spectra_csv(&path, &[spectrum(vec![1.0, 2.0, 3.0]), spectrum(vec![4.0, 5.0, 6.0])]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "wavelength,Scan 1,Scan 2");
        assert_eq!(lines[1], "1000,1,4");
        assert_eq!(lines[3], "1002,3,6");
        assert!(matches!(save_spectra_csv(&path, &[]), Err(FtirError::NoScans)));
    }
    #[test]
    fn interferogram_json_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.json");
        let scan = Interferogram::new("COM3", vec![5, -3, 7]);
        save_interferogram_json(&path, &scan).unwrap();
        let loaded = load_interferogram_json(&path).unwrap();
        assert_eq!(loaded.samples, scan.samples);
        assert_eq!(loaded.port, "COM3");
        std::fs::write(&path, r#"{"port":"COM3","capturedAtMs":0,"samples":[]}"#).unwrap();
        assert!(load_interferogram_json(&path).is_err());
    }
}
