// src/main.rs
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use nanoftir::calibration::{format_calibration_text, parse_calibration_text};
use nanoftir::drivers::{DeviceStatus, LocalProcessor, ManualSource, SpectrumPipeline, SpectrumProcessor};
use nanoftir::recorder;
use nanoftir::types::ConnectionMode;
use nanoftir::{
    Config, DeviceCommand, DeviceEvent, Engine, Interferogram, MeasurementMode, PortName, Session, SessionProcessor,
    Spectrum,
};
const COMMAND_TIMEOUT: Duration = Duration::from_secs(300);
#[derive(Parser)]
#[command(name = "nanoftir")]
#[command(about = "Drive a nanoFTIR spectrometer (or its simulator)", long_about = None)]
struct Cli {
    /// TOML configuration; defaults to $NANOFTIR_CONFIG, then built-in defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Port to use instead of `device.port`
    #[arg(long, global = true)]
    port: Option<String>,
    #[command(subcommand)]
    command: Commands,
}
#[derive(Subcommand)]
enum Commands {
    /// List serial ports visible to the system
    Ports,
    /// Connect and print the device identity
    Connect,
    /// Capture one raw interferogram
    Capture {
        #[arg(long)]
        len: Option<usize>,
        #[arg(long)]
        delay_ms: Option<u32>,
        /// Write the interferogram as JSON
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long)]
        png: Option<PathBuf>,
    },
    /// Turn recorded interferograms into one averaged spectrum
    Process {
        /// Interferogram JSON files written by `capture --out`
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Calibration text; read from the device when omitted
        #[arg(long)]
        calibration: Option<PathBuf>,
        /// 0 = raw, 1 = absorbance
        #[arg(long)]
        mode: Option<u16>,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long)]
        png: Option<PathBuf>,
    },
    /// Averaged measurement using the configured settings
    Measure {
        #[arg(long)]
        scans: Option<usize>,
        /// Run auto-alignment first
        #[arg(long)]
        align: bool,
        #[arg(long)]
        mode: Option<u16>,
        /// Averaged spectrum as JSON
        #[arg(long)]
        json: Option<PathBuf>,
        /// Every scan as CSV columns
        #[arg(long)]
        csv: Option<PathBuf>,
        #[arg(long)]
        png: Option<PathBuf>,
    },
    /// Run the automatic alignment routine
    Align,
    /// Automatic wavelength calibration against a reference laser
    Calibrate {
        #[arg(long)]
        laser_nm: Option<f64>,
        #[arg(long, default_value_t = 0)]
        delay_ms: u32,
    },
    /// Print (or save) the stored calibration as text
    ReadCalib {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Store calibration text from a file
    WriteCalib { file: PathBuf },
    /// Store a normalised drive waveform from a file
    WriteWaveform {
        file: PathBuf,
        #[arg(long)]
        max_voltage: f64,
    },
    /// Print the driver's last error text
    Status,
}
fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let mut config = Config::discover(cli.config.as_deref()).context("loading configuration")?;
    if let Some(port) = &cli.port {
        config.device.port = port.clone();
    }
    match cli.command {
        Commands::Ports => list_ports(&config),
        Commands::Process {
            inputs,
            calibration,
            mode,
            out,
            png,
        } => process(&config, &inputs, calibration.as_deref(), mode, out, png),
        command => run_device_command(&config, command),
    }
}
fn list_ports(config: &Config) -> Result<()> {
    let ports = serialport::available_ports().context("enumerating serial ports")?;
    if ports.is_empty() {
        println!("no serial ports found");
    }
    for port in ports {
        println!("{}\t{:?}", port.port_name, port.port_type);
    }
    if config.device.mode == ConnectionMode::Simulation {
        for port in &config.simulation.ports {
            println!("{port}\tsimulated");
        }
    }
    Ok(())
}
/// Sends one command and turns an `Error` event into an error.
fn request(engine: &Engine, cmd: DeviceCommand, timeout: Duration) -> Result<Vec<DeviceEvent>> {
    let events = engine.request(cmd, timeout)?;
    for event in &events {
        match event {
            DeviceEvent::Log(line) => info!("{line}"),
            DeviceEvent::Error { operation, code, message } => {
                let hint = if *code > 0 {
                    DeviceStatus::from_code(*code).user_message()
                } else {
                    "Unknown error has occurred."
                };
                bail!("{operation} failed (status {code}): {message}\n{hint}");
            }
            _ => {}
        }
    }
    Ok(events)
}
fn connected_engine(config: &Config) -> Result<Engine> {
    let backend = config.build_backend().context("opening backend")?;
    let engine = Engine::start(Session::new(backend), config.measurement_settings()?);
    let port = config.port()?;
    for event in request(&engine, DeviceCommand::Connect(port.clone()), COMMAND_TIMEOUT)? {
        if let DeviceEvent::Connected { status } = event {
            info!("{port}: {status}");
        }
    }
    Ok(engine)
}
fn run_device_command(config: &Config, command: Commands) -> Result<()> {
    let engine = connected_engine(config)?;
    match command {
        Commands::Connect => {
            for event in request(&engine, DeviceCommand::Identify, COMMAND_TIMEOUT)? {
                if let DeviceEvent::Identity(id) = event {
                    println!("serial number: {}", id.serial_number);
                    println!("device number: {}", id.device_number);
                }
            }
        }
        Commands::Capture {
            len,
            delay_ms,
            out,
            png,
        } => {
            let cmd = DeviceCommand::Capture {
                delay_ms: delay_ms.unwrap_or(config.measurement.delay_ms),
                len: len.unwrap_or(config.measurement.interferogram_len),
            };
            for event in request(&engine, cmd, COMMAND_TIMEOUT)? {
                if let DeviceEvent::Interferogram(scan) = event {
                    println!(
                        "{} samples, modulation depth {}",
                        scan.len(),
                        scan.modulation_depth()
                    );
                    if let Some(path) = &out {
                        recorder::save_interferogram_json(path, &scan)?;
                    }
                    if let Some(path) = &png {
                        recorder::save_interferogram_png(path, &scan)?;
                    }
                }
            }
        }
        Commands::Measure {
            scans,
            align,
            mode,
            json,
            csv,
            png,
        } => {
            let mut settings = config.measurement_settings()?;
            if let Some(scans) = scans {
                settings.scan_average = scans;
            }
            if let Some(mode) = mode {
                settings.mode = MeasurementMode::from(mode);
            }
            settings.align_first |= align;
            let timeout = settings.timeout() + Duration::from_secs(10);
            let spectra: Vec<Spectrum> = request(&engine, DeviceCommand::Measure(settings), timeout)?
                .into_iter()
                .filter_map(|e| match e {
                    DeviceEvent::Spectrum(s) => Some(s),
                    _ => None,
                })
                .collect();
            let Some((average, scans)) = spectra.split_last() else {
                bail!("measurement produced no spectrum");
            };
            report_spectrum(average);
            if let Some(path) = &json {
                recorder::save_spectrum_json(path, average)?;
            }
            if let Some(path) = &csv {
                recorder::save_spectra_csv(path, scans)?;
            }
            if let Some(path) = &png {
                recorder::save_spectrum_png(path, average)?;
            }
        }
        Commands::Align => {
            request(&engine, DeviceCommand::AutoAlign, COMMAND_TIMEOUT)?;
            println!("alignment finished");
        }
        Commands::Calibrate { laser_nm, delay_ms } => {
            let cmd = DeviceCommand::AutoCalibrate {
                delay_ms,
                laser_wavelength_nm: laser_nm.unwrap_or(config.calibration.laser_wavelength_nm),
            };
            for event in request(&engine, cmd, COMMAND_TIMEOUT)? {
                if let DeviceEvent::Calibration(data) = event {
                    println!("calibration relation: {:?}", data.calibration_relation);
                }
            }
        }
        Commands::ReadCalib { out } => {
            for event in request(&engine, DeviceCommand::ReadCalibration, COMMAND_TIMEOUT)? {
                if let DeviceEvent::Calibration(data) = event {
                    let text = format_calibration_text(&data);
                    match &out {
                        Some(path) => fs::write(path, text)?,
                        None => print!("{text}"),
                    }
                }
            }
        }
        Commands::WriteCalib { file } => {
            let text = fs::read_to_string(&file).with_context(|| format!("reading {}", file.display()))?;
            check_report(
                request(&engine, DeviceCommand::WriteCalibration(text), COMMAND_TIMEOUT)?,
                "write calibration",
            )?;
            println!("calibration stored");
        }
        Commands::WriteWaveform { file, max_voltage } => {
            let waveform = fs::read_to_string(&file).with_context(|| format!("reading {}", file.display()))?;
            let cmd = DeviceCommand::WriteWaveform { max_voltage, waveform };
            check_report(request(&engine, cmd, COMMAND_TIMEOUT)?, "write waveform")?;
            println!("waveform stored");
        }
        Commands::Status => {
            for event in request(&engine, DeviceCommand::LastError, COMMAND_TIMEOUT)? {
                if let DeviceEvent::StatusText(text) = event {
                    println!("{text}");
                }
            }
        }
        Commands::Ports | Commands::Process { .. } => bail!("this command does not use a device"),
    }
    engine.shutdown();
    Ok(())
}
fn check_report(events: Vec<DeviceEvent>, operation: &'static str) -> Result<()> {
    for event in events {
        if let DeviceEvent::WriteReport(report) = event {
            report.into_result(operation)?;
        }
    }
    Ok(())
}
/// Averages the spectra of recorded scans. Calibration comes from a file when
/// given, which keeps the work offline; otherwise it is read from the device
/// and processing goes through the driver.
fn process(
    config: &Config,
    inputs: &[PathBuf],
    calibration: Option<&Path>,
    mode: Option<u16>,
    out: Option<PathBuf>,
    png: Option<PathBuf>,
) -> Result<()> {
    let scans = inputs
        .iter()
        .map(|path| {
            recorder::load_interferogram_json(path).with_context(|| format!("reading {}", path.display()))
        })
        .collect::<Result<Vec<Interferogram>>>()?;
    let settings = config.measurement_settings()?;
    let mode = mode.map(MeasurementMode::from).unwrap_or(settings.mode);
    let average = match calibration {
        Some(path) => {
            let calibration = parse_calibration_text(&fs::read_to_string(path)?)?;
            average_scans(scans, LocalProcessor::new(calibration, settings.grid, mode))?
        }
        None => {
            let first = scans.first().ok_or_else(|| anyhow!("no interferograms given"))?;
            let port = PortName::new(first.port.as_str()).or_else(|_| config.port())?;
            let mut session = Session::new(config.build_backend()?);
            session.connect(port)?;
            let calibration = session.read_calibration(settings.waveform_capacity, settings.relation_capacity)?;
            let average = average_scans(
                scans,
                SessionProcessor::new(&mut session, calibration, settings.grid, mode),
            )?;
            session.disconnect();
            average
        }
    };
    let spectrum = average.window(settings.window_min_nm, settings.window_max_nm)?;
    report_spectrum(&spectrum);
    if let Some(path) = &out {
        recorder::save_spectrum_json(path, &spectrum)?;
    }
    if let Some(path) = &png {
        recorder::save_spectrum_png(path, &spectrum)?;
    }
    Ok(())
}
fn average_scans<P: SpectrumProcessor>(scans: Vec<Interferogram>, processor: P) -> Result<Spectrum> {
    let count = scans.len();
    let mut pipeline = SpectrumPipeline::new(ManualSource::new(scans), processor, count);
    let average = pipeline.run()?;
    info!("averaged {} recorded scans", pipeline.accumulator().len());
    Ok(average)
}
fn report_spectrum(spectrum: &Spectrum) {
    println!(
        "{} points, {:.1}..{:.1} nm, {}",
        spectrum.values.len(),
        spectrum.grid.min_nm,
        spectrum.grid.max_nm,
        spectrum.mode
    );
    if let Some(peak) = spectrum.peak_wavelength() {
        println!("peak at {peak:.1} nm");
    }
}
