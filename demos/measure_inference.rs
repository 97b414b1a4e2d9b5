// Measure the current drawn by one inference burst
//
// Configures the board, runs a timed acquisition, and cuts the idle tail off the
// capture before printing a summary.

use clap::{Parser, ValueEnum};
use powershield_rs::{
    OutputFormat, PowerShield, ProtocolDialect, ShieldConfig, ShieldError, TemperatureUnit,
    TriggerSource,
};
use std::time::Duration;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Dialect {
    Legacy,
    V3,
}

#[derive(Debug, Parser)]
#[command(about = "Capture and trim one current burst from a PowerShield")]
struct Args {
    /// Serial port of the board
    #[arg(short, long, default_value = powershield_rs::shield_connector::DEFAULT_TTY)]
    port: String,

    #[arg(short, long, default_value_t = 115_200)]
    baud: u32,

    #[arg(short, long, value_enum, default_value = "v3")]
    dialect: Dialect,

    /// Acquisition time in seconds
    #[arg(long, default_value_t = 5)]
    acqtime: u32,

    /// Target supply in millivolts
    #[arg(long, default_value_t = 3300)]
    millivolts: u32,

    /// Sampling frequency in Hz
    #[arg(long, default_value_t = 10_000)]
    freq: u32,

    /// Wait for the hardware trigger instead of starting immediately
    #[arg(long)]
    hw_trigger: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    #[cfg(feature = "cpu-profiling")]
    let _client = tracy_client::Client::start();

    let args = Args::parse();
    let dialect = match args.dialect {
        Dialect::Legacy => ProtocolDialect::Legacy,
        Dialect::V3 => ProtocolDialect::V3,
    };

    let config = ShieldConfig::new(args.port)
        .baud_rate(args.baud)
        .dialect(dialect)
        .sample_timeout(Some(Duration::from_secs(u64::from(args.acqtime) + 5)));
    let mut shield = PowerShield::connect(config)?;

    println!("PowerShield Inference Measurement");
    println!("=================================\n");

    if dialect == ProtocolDialect::V3 {
        println!("Info:        {}", shield.get_info()?);
        println!("Version:     {}", shield.get_version()?);
        println!("API version: {}", shield.get_api_version()?);
        println!("Range [A]:   {:?}", shield.get_range()?);
    } else {
        println!("Version:     {}", shield.get_version()?);
    }
    println!("Status:      {}\n", shield.get_status()?);

    let trigger = match (args.hw_trigger, dialect) {
        (false, _) => TriggerSource::Software,
        (true, ProtocolDialect::V3) => TriggerSource::Hardware,
        (true, ProtocolDialect::Legacy) => TriggerSource::D7,
    };

    shield.set_acquisition_time(args.acqtime)?;
    shield.set_voltage(args.millivolts, None)?;
    shield.set_output_format(OutputFormat::AsciiDec)?;
    shield.set_trigger_source(trigger)?;
    shield.set_frequency(args.freq)?;

    let temperature = shield.get_temperature(TemperatureUnit::Celsius, false)?;
    println!("Board temperature: {:.1} degC", temperature);

    std::thread::sleep(Duration::from_secs(2));

    shield.start_acquisition()?;
    println!("Acquisition started");
    let samples = match shield.collect_samples() {
        Ok(samples) => samples,
        Err(ShieldError::AcquisitionInterrupted { samples, source }) => {
            eprintln!("Capture cut short ({}), keeping {} samples", source, samples.len());
            samples
        }
        Err(e) => return Err(e.into()),
    };
    shield.close()?;
    println!("Captured {} samples", samples.len());

    if samples.is_empty() {
        println!("Nothing to trim");
        return Ok(());
    }

    let burst = samples.trim_falling_edge()?;
    let df = burst.to_dataframe(Some(args.freq))?;
    println!("Burst spans {} samples", df.height());

    if !burst.is_empty() {
        let values = burst.as_slice();
        let peak = values.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let duration = values.len() as f64 / f64::from(args.freq);
        println!(
            "Peak {:.6} A, mean {:.6} A over {:.4} s",
            peak, mean, duration
        );
    }

    Ok(())
}
