use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::time::Duration;

use crate::dialect::ProtocolDialect;
use crate::line_assembler::DEFAULT_MAX_LINE_LEN;
use crate::serial_terminal::PollConfig;

#[cfg(unix)]
pub const DEFAULT_TTY: &str = "/dev/ttyACM0";
#[cfg(windows)]
pub const DEFAULT_TTY: &str = "COM1";

/// Line rate of the board's virtual COM port.
pub const DEFAULT_BAUDRATE: u32 = 3_686_400;

#[derive(Debug, thiserror::Error)]
pub enum ShieldConnectorError {
    #[error("Failed to open serial port {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },
}

/// Everything needed to bring up a driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShieldConfig {
    pub port: String,
    pub baud_rate: u32,
    pub dialect: ProtocolDialect,
    pub poll: PollConfig,
    pub max_line_len: usize,
    /// Read timeout handed to the serial driver
    pub read_timeout: Duration,
}

impl ShieldConfig {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Self::default()
        }
    }

    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn dialect(mut self, dialect: ProtocolDialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll.interval = interval;
        self
    }

    /// `None` blocks until the device answers, however long that takes.
    pub fn ack_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.poll.ack_timeout = timeout;
        self
    }

    pub fn sample_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.poll.sample_timeout = timeout;
        self
    }

    pub fn max_line_len(mut self, max_line_len: usize) -> Self {
        self.max_line_len = max_line_len;
        self
    }
}

impl Default for ShieldConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_TTY.to_string(),
            baud_rate: DEFAULT_BAUDRATE,
            dialect: ProtocolDialect::default(),
            poll: PollConfig::default(),
            max_line_len: DEFAULT_MAX_LINE_LEN,
            read_timeout: Duration::from_millis(10),
        }
    }
}

pub struct ShieldConnector;

impl ShieldConnector {
    /// Open the configured port, 8N1 without flow control.
    pub fn open(config: &ShieldConfig) -> Result<Box<dyn SerialPort>, ShieldConnectorError> {
        log::debug!(
            "Opening PowerShield on {} at {} baud",
            config.port,
            config.baud_rate
        );

        serialport::new(&config.port, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(config.read_timeout)
            .open()
            .map_err(|source| ShieldConnectorError::Open {
                port: config.port.clone(),
                source,
            })
    }
}
