//! Typed PowerShield commands and their wire form.
//!
//! Every command is a single text line `<verb> [args]`; the terminal appends CR LF.

use std::fmt;

/// Maximum characters per line of the legacy board's LCD.
pub const DISPLAY_LINE_MAX_CHARS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemperatureUnit {
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "degc",
            TemperatureUnit::Fahrenheit => "degf",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionMode {
    Dynamic,
    Static,
}

impl AcquisitionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AcquisitionMode::Dynamic => "dyn",
            AcquisitionMode::Static => "stat",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionMode {
    Optimized,
    HighCurrent,
}

impl FunctionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FunctionMode::Optimized => "optim",
            FunctionMode::HighCurrent => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputType {
    Energy,
    Current,
}

impl OutputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputType::Energy => "energy",
            OutputType::Current => "current",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    AsciiDec,
    BinHexa,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::AsciiDec => "ascii_dec",
            OutputFormat::BinHexa => "bin_hexa",
        }
    }
}

/// Supply rail selected by `volt` and `pwr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSignal {
    Vout,
    Vaux,
}

impl OutputSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputSignal::Vout => "vout",
            OutputSignal::Vaux => "vaux",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerMode {
    Auto,
    On,
    Off,
}

impl PowerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PowerMode::Auto => "auto",
            PowerMode::On => "on",
            PowerMode::Off => "off",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerStatus {
    NoStatus,
    Status,
}

impl PowerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PowerStatus::NoStatus => "nostatus",
            PowerStatus::Status => "status",
        }
    }
}

/// Target supply state once an acquisition ends (`pwrend`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    On,
    Off,
}

impl PowerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PowerState::On => "on",
            PowerState::Off => "off",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    Software,
    Hardware,
    /// Arduino D7 pin, legacy firmware only.
    D7,
}

impl TriggerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::Software => "sw",
            TriggerSource::Hardware => "hw",
            TriggerSource::D7 => "d7",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayLine {
    One,
    Two,
}

impl DisplayLine {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayLine::One => "1",
            DisplayLine::Two => "2",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Version,
    ApiVersion,
    /// Board identification (`powershield`)
    Info,
    Status,
    /// Measurement range in amperes
    Range,
    HardwareReset,
    TargetReset { seconds: u32 },
    AutoTest,
    Calibrate,
    Temperature { unit: TemperatureUnit, refresh: bool },
    Start,
    Stop,
    SetVoltage { millivolts: u32, output: Option<OutputSignal> },
    GetVoltage,
    Frequency(u32),
    AcquisitionTime(String),
    AcquisitionMode(AcquisitionMode),
    FunctionMode(FunctionMode),
    OutputType(OutputType),
    OutputFormat(OutputFormat),
    TriggerSource(TriggerSource),
    TriggerDelay(String),
    CurrentThreshold(String),
    PowerTargetMode {
        mode: PowerMode,
        signal: Option<OutputSignal>,
        status: Option<PowerStatus>,
    },
    PowerTargetEnd(PowerState),
    Display { line: DisplayLine, text: String },
    /// `htc` hands control to the host, `hrc` returns it
    UserControlledMode(bool),
}

impl Command {
    /// Caller-supplied text that goes to the wire as is.
    pub fn text_argument(&self) -> Option<&str> {
        match self {
            Command::AcquisitionTime(value)
            | Command::TriggerDelay(value)
            | Command::CurrentThreshold(value) => Some(value),
            Command::Display { text, .. } => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Help => write!(f, "help"),
            Command::Version => write!(f, "version"),
            Command::ApiVersion => write!(f, "apiver"),
            Command::Info => write!(f, "powershield"),
            Command::Status => write!(f, "status"),
            Command::Range => write!(f, "range"),
            Command::HardwareReset => write!(f, "psrst"),
            Command::TargetReset { seconds } => write!(f, "targrst {}", seconds),
            Command::AutoTest => write!(f, "autotest"),
            Command::Calibrate => write!(f, "calib"),
            Command::Temperature { unit, refresh } => {
                write!(f, "temp {}", unit.as_str())?;
                if *refresh {
                    write!(f, " refresh")?;
                }
                Ok(())
            }
            Command::Start => write!(f, "start"),
            Command::Stop => write!(f, "stop"),
            Command::SetVoltage { millivolts, output } => match output {
                Some(output) => write!(f, "volt {} {}m", output.as_str(), millivolts),
                None => write!(f, "volt {}m", millivolts),
            },
            Command::GetVoltage => write!(f, "volt get"),
            Command::Frequency(hz) => write!(f, "freq {}", hz),
            Command::AcquisitionTime(value) => write!(f, "acqtime {}", value),
            Command::AcquisitionMode(mode) => write!(f, "acqmode {}", mode.as_str()),
            Command::FunctionMode(mode) => write!(f, "funcmode {}", mode.as_str()),
            Command::OutputType(output) => write!(f, "output {}", output.as_str()),
            Command::OutputFormat(format) => write!(f, "format {}", format.as_str()),
            Command::TriggerSource(source) => write!(f, "trigsrc {}", source.as_str()),
            Command::TriggerDelay(value) => write!(f, "trigdelay {}", value),
            Command::CurrentThreshold(value) => write!(f, "currthres {}", value),
            Command::PowerTargetMode {
                mode,
                signal,
                status,
            } => {
                write!(f, "pwr")?;
                if let Some(signal) = signal {
                    write!(f, " {}", signal.as_str())?;
                }
                write!(f, " {}", mode.as_str())?;
                if let Some(status) = status {
                    write!(f, " {}", status.as_str())?;
                }
                Ok(())
            }
            Command::PowerTargetEnd(state) => write!(f, "pwrend {}", state.as_str()),
            Command::Display { line, text } => write!(f, "lcd {} \"{}\"", line.as_str(), text),
            Command::UserControlledMode(true) => write!(f, "htc"),
            Command::UserControlledMode(false) => write!(f, "hrc"),
        }
    }
}
