//! Per-port calibration persistence and the spreadsheet-string codec used by the
//! save entry points.
//!
//! Calibration text holds one row per sample, `voltage<TAB>relation`. Once one
//! column runs out its cells stay empty. Waveform text is a single column of
//! normalised samples in `[-1, 1]`.
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use log::{debug, warn};
use crate::drivers::{FtirError, Result};
use crate::types::{CalibrationData, PortName, WriteReport};
pub fn parse_calibration_text(text: &str) -> Result<CalibrationData> {
    let mut data = CalibrationData::default();
    let mut voltage_done = false;
    let mut relation_done = false;
    for (row, line) in text.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let mut cells = line.split('\t');
        let voltage = cells.next().unwrap_or("").trim();
        let relation = cells.next().unwrap_or("").trim();
        if cells.next().is_some() {
            return Err(FtirError::CalibrationFormat(format!(
                "row {} has more than two columns",
                row + 1
            )));
        }
        push_cell(&mut data.voltage_waveform, &mut voltage_done, voltage, row, "voltage")?;
        push_cell(
            &mut data.calibration_relation,
            &mut relation_done,
            relation,
            row,
            "relation",
        )?;
    }
    if data.voltage_waveform.is_empty() || data.calibration_relation.is_empty() {
        return Err(FtirError::CalibrationFormat(
            "calibration text needs both a voltage and a relation column".into(),
        ));
    }
    Ok(data)
}
fn push_cell(
    column: &mut Vec<f64>,
    done: &mut bool,
    cell: &str,
    row: usize,
    name: &str,
) -> Result<()> {
    if cell.is_empty() {
        *done = true;
        return Ok(());
    }
    if *done {
        return Err(FtirError::CalibrationFormat(format!(
            "{name} column resumes at row {} after a gap",
            row + 1
        )));
    }
    column.push(parse_value(cell, row)?);
    Ok(())
}
fn parse_value(cell: &str, row: usize) -> Result<f64> {
    let value: f64 = cell.parse().map_err(|_| {
        FtirError::CalibrationFormat(format!("row {}: {cell:?} is not a number", row + 1))
    })?;
    if !value.is_finite() {
        return Err(FtirError::CalibrationFormat(format!(
            "row {}: value must be finite",
            row + 1
        )));
    }
    Ok(value)
}
pub fn format_calibration_text(data: &CalibrationData) -> String {
    let rows = data
        .voltage_waveform
        .len()
        .max(data.calibration_relation.len());
    let mut text = String::new();
    for i in 0..rows {
        if let Some(v) = data.voltage_waveform.get(i) {
            text.push_str(&v.to_string());
        }
        text.push('\t');
        if let Some(r) = data.calibration_relation.get(i) {
            text.push_str(&r.to_string());
        }
        text.push('\n');
    }
    text
}
pub fn parse_waveform_text(text: &str) -> Result<Vec<f64>> {
    let mut samples = Vec::new();
    for (row, line) in text.lines().enumerate() {
        let cell = line.trim();
        if cell.is_empty() {
            continue;
        }
        let value = parse_value(cell, row)?;
        if !(-1.0..=1.0).contains(&value) {
            return Err(FtirError::invalid(format!(
                "row {}: normalised waveform sample {value} is outside [-1, 1]",
                row + 1
            )));
        }
        samples.push(value);
    }
    if samples.is_empty() {
        return Err(FtirError::invalid("waveform text has no samples"));
    }
    Ok(samples)
}
pub fn format_waveform_text(samples: &[f64]) -> String {
    samples.iter().map(|v| format!("{v}\n")).collect()
}
/// One JSON file per port under a directory.
#[derive(Clone, Debug)]
pub struct CalibrationStore {
    directory: PathBuf,
    max_file_bytes: usize,
}
impl CalibrationStore {
    pub fn new(directory: impl Into<PathBuf>, max_file_bytes: usize) -> Self {
        Self {
            directory: directory.into(),
            max_file_bytes,
        }
    }
    pub fn path_for(&self, port: &PortName) -> PathBuf {
        self.directory.join(format!("{}.json", port.file_stem()))
    }
    pub fn load(&self, port: &PortName) -> Result<Option<CalibrationData>> {
        let path = self.path_for(port);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        let data = serde_json::from_slice(&bytes)?;
        debug!("loaded calibration for {port} from {}", path.display());
        Ok(Some(data))
    }
    pub fn save(&self, port: &PortName, data: &CalibrationData) -> Result<()> {
        fs::create_dir_all(&self.directory)?;
        let path = self.path_for(port);
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&serde_json::to_vec_pretty(data)?)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        debug!("saved calibration for {port} to {}", path.display());
        Ok(())
    }
    /// Replaces both columns from calibration text.
    ///
    /// Malformed text is an error; an oversize payload or a failed write is
    /// reported through the flags instead.
    pub fn write_calibration_text(&self, port: &PortName, text: &str) -> Result<WriteReport> {
        if text.len() > self.max_file_bytes {
            warn!(
                "calibration for {port} is {} bytes, limit is {}",
                text.len(),
                self.max_file_bytes
            );
            return Ok(WriteReport {
                writing_error: false,
                file_size_error: true,
            });
        }
        let data = parse_calibration_text(text)?;
        Ok(self.save_reporting(port, &data))
    }
    /// Scales a normalised waveform by `max_voltage` and stores it as the port's
    /// voltage waveform, keeping its relation (or `fallback`'s).
    pub fn write_waveform_text(
        &self,
        port: &PortName,
        max_voltage: f64,
        text: &str,
        fallback: &CalibrationData,
    ) -> Result<WriteReport> {
        if !max_voltage.is_finite() || max_voltage <= 0.0 {
            return Err(FtirError::invalid(format!(
                "max voltage must be positive, got {max_voltage}"
            )));
        }
        let samples = parse_waveform_text(text)?;
        let mut data = match self.load(port) {
            Ok(Some(existing)) => existing,
            Ok(None) => fallback.clone(),
            Err(err) => {
                warn!("ignoring unreadable calibration for {port}: {err}");
                fallback.clone()
            }
        };
        data.voltage_waveform = samples.into_iter().map(|s| s * max_voltage).collect();
        Ok(self.save_reporting(port, &data))
    }
    fn save_reporting(&self, port: &PortName, data: &CalibrationData) -> WriteReport {
        match self.save(port, data) {
            Ok(()) => WriteReport::ok(),
            Err(err) => {
                warn!("writing calibration for {port} failed: {err}");
                WriteReport {
                    writing_error: true,
                    file_size_error: false,
                }
            }
        }
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    fn port() -> PortName {
        PortName::new("COM3").unwrap()
    }
    #[test]
    fn text_round_trip_is_exact() {
        let data = CalibrationData {
            voltage_waveform: vec![0.1, -2.5e-7, 4.999999999999999, 1.0 / 3.0],
            calibration_relation: vec![0.0, 50_000.123456789],
        };
        let text = format_calibration_text(&data);
        assert_eq!(parse_calibration_text(&text).unwrap(), data);
    }
    #[test]
    fn rejects_gaps_and_garbage() {
        assert!(parse_calibration_text("1\t2\n\t3\n4\t5\n").is_err());
        assert!(parse_calibration_text("1\tx\n").is_err());
        assert!(parse_calibration_text("1\t2\t3\n").is_err());
        assert!(parse_calibration_text("1\t\n2\t\n").is_err());
        assert!(parse_calibration_text("").is_err());
    }
    #[test]
    fn store_round_trip_is_bit_exact() {
        let dir = tempfile::tempdir().unwrap();
        let store = CalibrationStore::new(dir.path(), 1 << 16);
        let text = "0.1\t0\n0.30000000000000004\t49999.99999999999\n-1e-300\t\n";
        let report = store.write_calibration_text(&port(), text).unwrap();
        assert!(report.is_ok());
        let loaded = store.load(&port()).unwrap().unwrap();
        assert_eq!(loaded, parse_calibration_text(text).unwrap());
        assert_eq!(loaded.voltage_waveform[2].to_bits(), (-1e-300f64).to_bits());
    }
    #[test]
    fn similar_port_names_keep_separate_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = CalibrationStore::new(dir.path(), 1 << 16);
        let visa = PortName::new("ASRL3::INSTR").unwrap();
        let lookalike = PortName::new("ASRL3__INSTR").unwrap();
        assert_ne!(store.path_for(&visa), store.path_for(&lookalike));
        store.write_calibration_text(&visa, "1\t2\n").unwrap();
        store.write_calibration_text(&lookalike, "9\t9\n").unwrap();
        let loaded = store.load(&visa).unwrap().unwrap();
        assert_eq!(loaded.voltage_waveform, vec![1.0]);
        assert_eq!(loaded.calibration_relation, vec![2.0]);
        let other = store.load(&lookalike).unwrap().unwrap();
        assert_eq!(other.voltage_waveform, vec![9.0]);
    }
    #[test]
    fn oversize_sets_only_file_size_flag() {
        let dir = tempfile::tempdir().unwrap();
        let store = CalibrationStore::new(dir.path(), 8);
        let report = store.write_calibration_text(&port(), "1\t2\n3\t4\n5\t6\n").unwrap();
        assert!(report.file_size_error);
        assert!(!report.writing_error);
        assert!(store.load(&port()).unwrap().is_none());
    }
    #[test]
    fn failed_write_sets_only_writing_flag() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"file").unwrap();
        let store = CalibrationStore::new(&blocker, 1 << 16);
        let report = store.write_calibration_text(&port(), "1\t2\n").unwrap();
        assert!(report.writing_error);
        assert!(!report.file_size_error);
    }
    #[test]
    fn waveform_is_scaled_and_keeps_relation() {
        let dir = tempfile::tempdir().unwrap();
        let store = CalibrationStore::new(dir.path(), 1 << 16);
        store.write_calibration_text(&port(), "0\t0\n0\t50000\n").unwrap();
        let fallback = CalibrationData::default();
        let report = store
            .write_waveform_text(&port(), 5.0, &format_waveform_text(&[0.0, 0.5, -1.0]), &fallback)
            .unwrap();
        assert!(report.is_ok());
        let loaded = store.load(&port()).unwrap().unwrap();
        assert_eq!(loaded.voltage_waveform, vec![0.0, 2.5, -5.0]);
        assert_eq!(loaded.calibration_relation, vec![0.0, 50000.0]);
        assert!(store.write_waveform_text(&port(), 0.0, "0.5\n", &fallback).is_err());
        assert!(store.write_waveform_text(&port(), 5.0, "1.5\n", &fallback).is_err());
    }
}
