//! # PowerShield RS
//!
//! A Rust library for driving PowerShield current measurement boards over their
//! serial line.
//!
//! The board speaks a line-oriented text protocol: every command is acknowledged on
//! its own line, and during an acquisition the board streams one `MMMM-EE` encoded
//! sample per line until it prints an end marker. This crate wraps that protocol in a
//! blocking driver and ships the post-processing used to cut a current burst out of
//! a capture.
//!
//! ## Features
//!
//! - **Both firmware dialects**: legacy (`PowerShield >` banner) and V3 (`ack` framing),
//!   selected explicitly through [`ProtocolDialect`]
//! - **Typed commands**: every firmware command as a [`Command`] with a capability
//!   table per dialect
//! - **Bounded waits**: configurable poll interval and timeouts, plus a
//!   [`CancelToken`] to abort a blocking call from another thread
//! - **Sample streaming**: noise-tolerant decoding of the telemetry stream
//! - **Edge trimming**: [`trim_falling_edge`] isolates a burst from its idle tail
//! - **DataFrame output**: collected samples convert to a `polars` frame
//!
//! ## Examples
//!
//! ### Acquire and trim
//!
//! ```rust,no_run
//! use powershield_rs::{PowerShield, ShieldConfig, ProtocolDialect, OutputFormat, TriggerSource};
//!
//! let config = ShieldConfig::new("/dev/ttyACM0").dialect(ProtocolDialect::V3);
//! let mut shield = PowerShield::connect(config)?;
//!
//! shield.set_acquisition_time(5)?;
//! shield.set_voltage(3300, None)?;
//! shield.set_output_format(OutputFormat::AsciiDec)?;
//! shield.set_trigger_source(TriggerSource::Software)?;
//! shield.set_frequency(10_000)?;
//!
//! shield.start_acquisition()?;
//! let samples = shield.collect_samples()?;
//! shield.close()?;
//!
//! let burst = samples.trim_falling_edge()?;
//! println!("Burst lasted {} of {} samples", burst.len(), samples.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Edge trimming on its own
//!
//! ```rust
//! use powershield_rs::trim_falling_edge;
//!
//! let samples = [1.0, 2.0, 3.0, 10.0, 4.0, 3.0, 2.0, 1.0];
//! assert_eq!(trim_falling_edge(&samples).unwrap(), &[1.0, 2.0, 3.0]);
//! ```
//!
//! ### Decoding stream lines
//!
//! ```rust
//! use powershield_rs::{SampleDecoder, SampleEvent};
//!
//! assert_eq!(SampleDecoder::accept("1234-05").unwrap(), SampleEvent::Sample(0.01234));
//! assert_eq!(SampleDecoder::accept("end").unwrap(), SampleEvent::EndOfStream);
//! assert_eq!(SampleDecoder::accept("stlp >").unwrap(), SampleEvent::Noise);
//! ```

pub mod acquisition;
pub mod command;
pub mod dialect;
pub mod edge_trim;
pub mod line_assembler;
pub mod power_shield;
pub mod sample_decoder;
pub mod serial_terminal;
pub mod shield_connector;

#[cfg(test)]
mod mock_transport;

// Re-export the main types for convenience
pub use acquisition::{AcquisitionController, AcquisitionState, SampleSequence};

pub use command::{
    AcquisitionMode, Command, DisplayLine, FunctionMode, OutputFormat, OutputSignal, OutputType,
    PowerMode, PowerState, PowerStatus, TemperatureUnit, TriggerSource,
};

pub use dialect::{ProtocolDialect, ResponseFilter};

pub use edge_trim::{trim_falling_edge, EdgeTrimError};

pub use line_assembler::{LineAssembler, LineOverflow};

pub use sample_decoder::{SampleDecodeError, SampleDecoder, SampleEvent};

pub use serial_terminal::{CancelToken, PollConfig, ShieldTerminal, ShieldTerminalError, Transport};

pub use shield_connector::{ShieldConfig, ShieldConnector, ShieldConnectorError};

pub use power_shield::{PowerShield, ShieldError};
