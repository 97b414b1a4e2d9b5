use serialport::SerialPort;
use std::fmt;

use crate::acquisition::{AcquisitionController, AcquisitionState, SampleSequence};
use crate::command::{
    AcquisitionMode, Command, DisplayLine, FunctionMode, OutputFormat, OutputSignal, OutputType,
    PowerMode, PowerState, PowerStatus, TemperatureUnit, TriggerSource, DISPLAY_LINE_MAX_CHARS,
};
use crate::dialect::ProtocolDialect;
use crate::sample_decoder::SampleEvent;
use crate::serial_terminal::{CancelToken, ShieldTerminal, ShieldTerminalError, Transport};
use crate::shield_connector::{ShieldConfig, ShieldConnector, ShieldConnectorError};

#[derive(Debug, thiserror::Error)]
pub enum ShieldError {
    #[error("Serial terminal error: {0}")]
    Terminal(#[from] ShieldTerminalError),

    #[error("Connector error: {0}")]
    Connector(#[from] ShieldConnectorError),

    #[error("Connection to the PowerShield is not open")]
    NotOpen,

    #[error("Connection to the PowerShield is already open")]
    AlreadyOpen,

    #[error("Connection to the PowerShield has been closed")]
    Closed,

    #[error("Command '{command}' is not available in the {dialect} dialect")]
    UnsupportedCommand {
        command: String,
        dialect: ProtocolDialect,
    },

    #[error("Display line {line} text has {len} characters, the LCD shows 16")]
    DisplayTextTooLong { line: &'static str, len: usize },

    #[error("Command {command:?} carries control characters or quotes")]
    InvalidArgument { command: String },

    #[error("No acquisition is running")]
    NotAcquiring,

    #[error("Acquisition interrupted after {} samples: {source}", .samples.len())]
    AcquisitionInterrupted {
        samples: SampleSequence,
        #[source]
        source: Box<ShieldError>,
    },

    #[error("Unexpected response to '{command}': '{response}'")]
    UnexpectedResponse { command: String, response: String },
}

enum Connection<T: Transport> {
    Unopened,
    Open(ShieldTerminal<T>),
    Closed,
}

/// Driver for one PowerShield board.
///
/// The driver owns its transport from [`open`](Self::open) until
/// [`close`](Self::close); a closed driver cannot be reopened.
pub struct PowerShield<T: Transport = Box<dyn SerialPort>> {
    config: ShieldConfig,
    connection: Connection<T>,
    acquisition: AcquisitionController,
    cancel: CancelToken,
}

impl PowerShield<Box<dyn SerialPort>> {
    /// Open the configured serial port and return a ready driver.
    pub fn connect(config: ShieldConfig) -> Result<Self, ShieldError> {
        let mut shield = Self::new(config);
        shield.open()?;
        Ok(shield)
    }

    pub fn open(&mut self) -> Result<(), ShieldError> {
        self.ensure_unopened()?;
        let port = ShieldConnector::open(&self.config)?;
        self.open_with(port)
    }
}

impl<T: Transport> PowerShield<T> {
    pub fn new(config: ShieldConfig) -> Self {
        Self {
            config,
            connection: Connection::Unopened,
            acquisition: AcquisitionController::new(),
            cancel: CancelToken::new(),
        }
    }

    /// Take ownership of an already opened byte channel.
    pub fn open_with(&mut self, transport: T) -> Result<(), ShieldError> {
        self.ensure_unopened()?;

        let mut terminal = ShieldTerminal::new(
            transport,
            self.config.dialect,
            self.config.poll,
            self.config.max_line_len,
        )
        .with_cancel_token(self.cancel.clone());
        terminal.flush()?;

        log::debug!("PowerShield connection open ({} dialect)", self.config.dialect);
        self.connection = Connection::Open(terminal);
        Ok(())
    }

    /// Release the transport. The driver is unusable afterwards.
    pub fn close(&mut self) -> Result<T, ShieldError> {
        match std::mem::replace(&mut self.connection, Connection::Closed) {
            Connection::Open(terminal) => {
                log::debug!("PowerShield connection closed");
                Ok(terminal.into_inner())
            }
            Connection::Unopened => {
                self.connection = Connection::Unopened;
                Err(ShieldError::NotOpen)
            }
            Connection::Closed => Err(ShieldError::Closed),
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.connection, Connection::Open(_))
    }

    pub fn config(&self) -> &ShieldConfig {
        &self.config
    }

    pub fn dialect(&self) -> ProtocolDialect {
        self.config.dialect
    }

    /// Handle for aborting a blocking call from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn ensure_unopened(&self) -> Result<(), ShieldError> {
        match self.connection {
            Connection::Unopened => Ok(()),
            Connection::Open(_) => Err(ShieldError::AlreadyOpen),
            Connection::Closed => Err(ShieldError::Closed),
        }
    }

    fn terminal(&mut self) -> Result<&mut ShieldTerminal<T>, ShieldError> {
        match &mut self.connection {
            Connection::Open(terminal) => Ok(terminal),
            Connection::Unopened => Err(ShieldError::NotOpen),
            Connection::Closed => Err(ShieldError::Closed),
        }
    }

    fn validate(&self, command: &Command) -> Result<(), ShieldError> {
        if !self.dialect().supports(command) {
            return Err(ShieldError::UnsupportedCommand {
                command: command.to_string(),
                dialect: self.dialect(),
            });
        }
        if let Command::Display { line, text } = command {
            let len = text.chars().count();
            if len > DISPLAY_LINE_MAX_CHARS {
                return Err(ShieldError::DisplayTextTooLong {
                    line: line.as_str(),
                    len,
                });
            }
        }
        if let Some(argument) = command.text_argument() {
            // A terminator or quote would split the line into further commands
            if argument.chars().any(|c| c.is_control() || c == '"') {
                return Err(ShieldError::InvalidArgument {
                    command: command.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Send one command and return the acknowledgement text.
    ///
    /// An end marker streamed while the acknowledgement is awaited ends a running
    /// acquisition.
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub fn execute(&mut self, command: &Command) -> Result<String, ShieldError> {
        self.validate(command)?;
        let terminal = self.terminal()?;
        let sent = terminal.send(&command.to_string());
        if terminal.take_stream_ended() {
            self.acquisition.observe(&SampleEvent::EndOfStream);
        }
        Ok(sent?)
    }

    pub fn get_help(&mut self) -> Result<String, ShieldError> {
        self.execute(&Command::Help)
    }

    pub fn get_info(&mut self) -> Result<String, ShieldError> {
        self.execute(&Command::Info)
    }

    pub fn get_version(&mut self) -> Result<String, ShieldError> {
        let response = self.execute(&Command::Version)?;
        Ok(strip_field(&response, "version:").to_string())
    }

    pub fn get_api_version(&mut self) -> Result<String, ShieldError> {
        let response = self.execute(&Command::ApiVersion)?;
        Ok(strip_field(&response, "apiver:").to_string())
    }

    pub fn get_status(&mut self) -> Result<String, ShieldError> {
        let response = self.execute(&Command::Status)?;
        Ok(strip_field(&response, "status").to_string())
    }

    /// Measurement range bounds in amperes.
    pub fn get_range(&mut self) -> Result<Vec<f64>, ShieldError> {
        let command = Command::Range;
        let response = self.execute(&command)?;
        parse_range(&response).ok_or_else(|| ShieldError::UnexpectedResponse {
            command: command.to_string(),
            response,
        })
    }

    pub fn hardware_reset(&mut self) -> Result<(), ShieldError> {
        self.execute(&Command::HardwareReset).map(drop)
    }

    /// Hold the target in reset for `seconds`.
    pub fn target_reset(&mut self, seconds: u32) -> Result<(), ShieldError> {
        self.execute(&Command::TargetReset { seconds }).map(drop)
    }

    pub fn auto_test(&mut self) -> Result<(), ShieldError> {
        self.execute(&Command::AutoTest).map(drop)
    }

    pub fn calibrate(&mut self) -> Result<(), ShieldError> {
        self.execute(&Command::Calibrate).map(drop)
    }

    pub fn get_temperature(
        &mut self,
        unit: TemperatureUnit,
        refresh: bool,
    ) -> Result<f64, ShieldError> {
        let command = Command::Temperature { unit, refresh };
        let response = self.execute(&command)?;
        parse_temperature(&response, unit).ok_or_else(|| ShieldError::UnexpectedResponse {
            command: command.to_string(),
            response,
        })
    }

    pub fn set_voltage(
        &mut self,
        millivolts: u32,
        output: Option<OutputSignal>,
    ) -> Result<(), ShieldError> {
        self.execute(&Command::SetVoltage { millivolts, output })
            .map(drop)
    }

    pub fn get_voltage(&mut self) -> Result<String, ShieldError> {
        self.execute(&Command::GetVoltage)
    }

    pub fn set_frequency(&mut self, hz: u32) -> Result<(), ShieldError> {
        self.execute(&Command::Frequency(hz)).map(drop)
    }

    /// Acquisition duration as the firmware spells it, e.g. `5`, `100m` or `0` for infinite.
    pub fn set_acquisition_time(&mut self, value: impl fmt::Display) -> Result<(), ShieldError> {
        self.execute(&Command::AcquisitionTime(value.to_string()))
            .map(drop)
    }

    pub fn set_acquisition_mode(&mut self, mode: AcquisitionMode) -> Result<(), ShieldError> {
        self.execute(&Command::AcquisitionMode(mode)).map(drop)
    }

    pub fn set_function_mode(&mut self, mode: FunctionMode) -> Result<(), ShieldError> {
        self.execute(&Command::FunctionMode(mode)).map(drop)
    }

    pub fn set_output_type(&mut self, output: OutputType) -> Result<(), ShieldError> {
        self.execute(&Command::OutputType(output)).map(drop)
    }

    pub fn set_output_format(&mut self, format: OutputFormat) -> Result<(), ShieldError> {
        self.execute(&Command::OutputFormat(format)).map(drop)
    }

    pub fn set_trigger_source(&mut self, source: TriggerSource) -> Result<(), ShieldError> {
        self.execute(&Command::TriggerSource(source)).map(drop)
    }

    pub fn set_trigger_delay(&mut self, value: impl fmt::Display) -> Result<(), ShieldError> {
        self.execute(&Command::TriggerDelay(value.to_string()))
            .map(drop)
    }

    pub fn set_current_threshold(&mut self, value: impl fmt::Display) -> Result<(), ShieldError> {
        self.execute(&Command::CurrentThreshold(value.to_string()))
            .map(drop)
    }

    pub fn set_power_target_mode(
        &mut self,
        mode: PowerMode,
        signal: Option<OutputSignal>,
        status: Option<PowerStatus>,
    ) -> Result<(), ShieldError> {
        self.execute(&Command::PowerTargetMode {
            mode,
            signal,
            status,
        })
        .map(drop)
    }

    pub fn set_power_target_end(&mut self, state: PowerState) -> Result<(), ShieldError> {
        self.execute(&Command::PowerTargetEnd(state)).map(drop)
    }

    /// Write up to two lines on the board's LCD.
    ///
    /// Both lines are checked before anything is sent.
    pub fn write_on_display(
        &mut self,
        line1: Option<&str>,
        line2: Option<&str>,
    ) -> Result<(), ShieldError> {
        let commands: Vec<Command> = [(DisplayLine::One, line1), (DisplayLine::Two, line2)]
            .into_iter()
            .filter_map(|(line, text)| {
                text.map(|text| Command::Display {
                    line,
                    text: text.to_string(),
                })
            })
            .collect();

        for command in &commands {
            self.validate(command)?;
        }
        for command in &commands {
            self.execute(command)?;
        }
        Ok(())
    }

    /// Hand control of the board to the host (`htc`) or give it back (`hrc`).
    pub fn set_user_controlled_mode(&mut self, enabled: bool) -> Result<(), ShieldError> {
        self.execute(&Command::UserControlledMode(enabled))
            .map(drop)
    }

    pub fn start_acquisition(&mut self) -> Result<(), ShieldError> {
        self.execute(&Command::Start)?;
        self.acquisition.start();
        Ok(())
    }

    pub fn stop_acquisition(&mut self) -> Result<(), ShieldError> {
        self.execute(&Command::Stop)?;
        self.acquisition.stop();
        Ok(())
    }

    pub fn acquisition_state(&self) -> AcquisitionState {
        self.acquisition.state()
    }

    /// True unless an acquisition is running; a driver that never started reads as ended.
    pub fn is_acquisition_ended(&self) -> bool {
        self.acquisition.is_ended()
    }

    /// Block for the next sample. `None` means the device ended the acquisition.
    pub fn read_sample(&mut self) -> Result<Option<f64>, ShieldError> {
        if self.acquisition.state() != AcquisitionState::Running {
            return Err(ShieldError::NotAcquiring);
        }

        loop {
            let event = self.terminal()?.next_sample_event()?;
            self.acquisition.observe(&event);
            match event {
                SampleEvent::Sample(value) => return Ok(Some(value)),
                SampleEvent::EndOfStream => return Ok(None),
                SampleEvent::Noise => {}
            }
        }
    }

    /// Read samples until the acquisition ends.
    ///
    /// If the stream fails part way, the samples received so far come back in
    /// [`ShieldError::AcquisitionInterrupted`] and the acquisition stays running.
    pub fn collect_samples(&mut self) -> Result<SampleSequence, ShieldError> {
        let mut samples = SampleSequence::new();
        match self.collect_samples_into(&mut samples) {
            Ok(()) => Ok(samples),
            Err(ShieldError::NotAcquiring) => Err(ShieldError::NotAcquiring),
            Err(source) => {
                log::warn!(
                    "Acquisition interrupted after {} samples: {}",
                    samples.len(),
                    source
                );
                Err(ShieldError::AcquisitionInterrupted {
                    samples,
                    source: Box::new(source),
                })
            }
        }
    }

    /// Append samples to `samples` until the acquisition ends.
    ///
    /// Samples read before an error stay in `samples`.
    pub fn collect_samples_into(&mut self, samples: &mut SampleSequence) -> Result<(), ShieldError> {
        #[cfg(feature = "cpu-profiling")]
        let _span = tracy_client::span!("collect_samples");

        if self.acquisition.state() != AcquisitionState::Running {
            return Err(ShieldError::NotAcquiring);
        }

        let before = samples.len();
        while !self.is_acquisition_ended() {
            if let Some(sample) = self.read_sample()? {
                samples.push(sample);
            }
        }
        log::debug!("Collected {} samples", samples.len() - before);
        Ok(())
    }
}

fn strip_field<'a>(response: &'a str, field: &str) -> &'a str {
    response
        .strip_prefix(field)
        .unwrap_or(response)
        .trim()
}

/// `range 1-9 10-3` lists bounds with `-` standing in for `E-`.
fn parse_range(response: &str) -> Option<Vec<f64>> {
    strip_field(response, "range")
        .split_whitespace()
        .map(|value| value.replace('-', "E-").parse::<f64>().ok())
        .collect()
}

/// `temp degc 27.5`, or `temp degc refresh 27.5` after a forced refresh.
fn parse_temperature(response: &str, unit: TemperatureUnit) -> Option<f64> {
    let value = strip_field(response, "temp");
    let value = strip_field(value, unit.as_str());
    let value = strip_field(value, "refresh");
    value.parse().ok()
}
