use std::io::Cursor;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use plotters::prelude::LineSeries;
use plotters::prelude::*;
use crate::drivers::error::FtirError;
use crate::drivers::fft::Spectrum;
use crate::drivers::source::Interferogram;
#[derive(Clone, Debug)]
pub struct PlotStyle {
    pub width: u32,
    pub height: u32,
    pub background: RGBColor,
    pub line: RGBColor,
}
impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            width: 900,
            height: 400,
            background: RGBColor(10, 10, 10),
            line: CYAN,
        }
    }
}
pub fn render_interferogram_png(
    scan: &Interferogram,
    style: PlotStyle,
) -> Result<Vec<u8>, FtirError> {
    if scan.samples.is_empty() {
        return Err(FtirError::Plot("interferogram has no samples".into()));
    }
    let mut buffer = vec![0u8; (style.width * style.height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (style.width, style.height))
            .into_drawing_area();
        root.fill(&style.background)?;
        let y_min = scan.samples.iter().copied().min().unwrap_or(0) as f64;
        let y_max = scan.samples.iter().copied().max().unwrap_or(0) as f64;
        let y_bounds = if (y_max - y_min).abs() < f64::EPSILON {
            (y_min - 1.0, y_max + 1.0)
        } else {
            (y_min, y_max)
        };
        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .caption(
                format!("Interferogram ({})", scan.port),
                ("sans-serif", 20).into_font().color(&WHITE),
            )
            .set_label_area_size(LabelAreaPosition::Left, 70)
            .set_label_area_size(LabelAreaPosition::Bottom, 40)
            .build_cartesian_2d(0f64..scan.samples.len() as f64, y_bounds.0..y_bounds.1)?;
        chart
            .configure_mesh()
            .light_line_style(&WHITE.mix(0.1))
            .x_desc("sample")
            .draw()?;
        let series = scan
            .samples
            .iter()
            .enumerate()
            .map(|(i, v)| (i as f64, *v as f64));
        chart.draw_series(LineSeries::new(series, &style.line))?;
        root.present()?;
    }
    encode_png(&buffer, style.width, style.height)
}
pub fn render_spectrum_png(spectrum: &Spectrum, style: PlotStyle) -> Result<Vec<u8>, FtirError> {
    if spectrum.values.is_empty() {
        return Err(FtirError::Plot("spectrum has no values".into()));
    }
    let mut buffer = vec![0u8; (style.width * style.height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (style.width, style.height))
            .into_drawing_area();
        root.fill(&style.background)?;
        let finite = spectrum.values.iter().copied().filter(|v| v.is_finite());
        let y_max = finite.clone().fold(f64::MIN, f64::max).max(1e-3);
        let y_min = finite.fold(0.0f64, f64::min);
        let x_max = if spectrum.grid.max_nm > spectrum.grid.min_nm {
            spectrum.grid.max_nm
        } else {
            spectrum.grid.min_nm + 1.0
        };
        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .caption(
                format!("Spectrum ({})", spectrum.mode),
                ("sans-serif", 20).into_font().color(&WHITE),
            )
            .set_label_area_size(LabelAreaPosition::Left, 60)
            .set_label_area_size(LabelAreaPosition::Bottom, 40)
            .build_cartesian_2d(spectrum.grid.min_nm..x_max, y_min..y_max)?;
        chart
            .configure_mesh()
            .light_line_style(&WHITE.mix(0.1))
            .x_desc("wavelength (nm)")
            .draw()?;
        let series = spectrum
            .points()
            .into_iter()
            .filter(|p| p.measured_value.is_finite())
            .map(|p| (p.wavelength, p.measured_value));
        chart.draw_series(LineSeries::new(series, &style.line))?;
        root.present()?;
    }
    encode_png(&buffer, style.width, style.height)
}
fn encode_png(buffer: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FtirError> {
    let image = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, buffer.to_vec())
        .ok_or_else(|| FtirError::Plot("failed to allocate image buffer".into()))?;
    let mut output = Vec::new();
    let dynamic = DynamicImage::ImageRgb8(image);
    dynamic.write_to(&mut Cursor::new(&mut output), ImageFormat::Png)?;
    Ok(output)
}
