use std::collections::VecDeque;
use std::time::SystemTime;
use crate::drivers::FtirError;
/// Raw interferogram as read from the detector ADC.
#[derive(Clone, Debug)]
pub struct Interferogram {
    pub captured_at: SystemTime,
    pub port: String,
    pub samples: Vec<i32>,
}
impl Interferogram {
    pub fn new(port: impl Into<String>, samples: Vec<i32>) -> Self {
        Self {
            captured_at: SystemTime::now(),
            port: port.into(),
            samples,
        }
    }
    pub fn validate(&self) -> Result<(), FtirError> {
        if self.samples.is_empty() {
            return Err(FtirError::invalid("interferogram has no samples"));
        }
        Ok(())
    }
    pub fn len(&self) -> usize {
        self.samples.len()
    }
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
    /// Peak-to-peak excursion of the raw samples.
    pub fn modulation_depth(&self) -> i64 {
        let min = self.samples.iter().copied().min().unwrap_or(0) as i64;
        let max = self.samples.iter().copied().max().unwrap_or(0) as i64;
        max - min
    }
    /// Index of the sample furthest from the mean, i.e. the centre burst.
    pub fn zpd_index(&self) -> Option<usize> {
        if self.samples.is_empty() {
            return None;
        }
        let mean = self.samples.iter().map(|&v| v as f64).sum::<f64>() / self.samples.len() as f64;
        self.samples
            .iter()
            .enumerate()
            .max_by(|a, b| {
                let da = (*a.1 as f64 - mean).abs();
                let db = (*b.1 as f64 - mean).abs();
                da.total_cmp(&db)
            })
            .map(|(i, _)| i)
    }
}
/// Anything that can yield interferograms on demand.
pub trait InterferogramSource {
    fn next_interferogram(&mut self) -> Result<Option<Interferogram>, FtirError>;
}
/// In-memory queue of recorded scans, drained in order.
pub struct ManualSource {
    queue: VecDeque<Interferogram>,
}
impl ManualSource {
    pub fn new(scans: impl IntoIterator<Item = Interferogram>) -> Self {
        Self {
            queue: scans.into_iter().collect(),
        }
    }
}
impl InterferogramSource for ManualSource {
    fn next_interferogram(&mut self) -> Result<Option<Interferogram>, FtirError> {
        Ok(self.queue.pop_front())
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn zpd_is_the_centre_burst() {
        let mut samples = vec![100; 64];
        samples[40] = 900;
        samples[41] = -300;
        let scan = Interferogram::new("COM3", samples);
        assert_eq!(scan.zpd_index(), Some(40));
        assert_eq!(scan.modulation_depth(), 1200);
    }
    #[test]
    fn empty_interferogram_is_rejected() {
        let scan = Interferogram::new("COM3", Vec::new());
        assert!(scan.validate().is_err());
        assert_eq!(scan.zpd_index(), None);
    }
    #[test]
    fn manual_source_drains_in_order() {
        let mut source = ManualSource::new(vec![
            Interferogram::new("COM3", vec![1]),
            Interferogram::new("COM3", vec![2]),
        ]);
        assert_eq!(source.next_interferogram().unwrap().unwrap().samples, vec![1]);
        assert_eq!(source.next_interferogram().unwrap().unwrap().samples, vec![2]);
        assert!(source.next_interferogram().unwrap().is_none());
    }
}
