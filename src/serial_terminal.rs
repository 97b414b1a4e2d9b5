use serialport::SerialPort;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::dialect::{ProtocolDialect, ResponseFilter};
use crate::line_assembler::{LineAssembler, LineOverflow};
use crate::sample_decoder::{
    SampleDecodeError, SampleDecoder, SampleEvent, END_OF_STREAM_MARKER,
};

const LINE_TERMINATOR: &str = "\r\n";

#[derive(Debug, thiserror::Error)]
pub enum ShieldTerminalError {
    #[error("Serial port error: {0}")]
    SerialPort(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout error: no {expected} from the device within {waited:?}")]
    Timeout {
        expected: &'static str,
        waited: Duration,
    },

    #[error("Operation cancelled while waiting for the device")]
    Cancelled,

    #[error("Line overflow: {0}")]
    LineOverflow(#[from] LineOverflow),

    #[error(transparent)]
    Decode(#[from] SampleDecodeError),
}

/// Byte channel to the board. Reads never block.
pub trait Transport {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), ShieldTerminalError>;

    /// Whatever bytes have arrived since the last call, possibly none.
    fn read_available(&mut self) -> Result<Vec<u8>, ShieldTerminalError>;

    /// Drop stale inbound data.
    fn clear_input(&mut self) -> Result<(), ShieldTerminalError> {
        Ok(())
    }
}

impl Transport for Box<dyn SerialPort> {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), ShieldTerminalError> {
        self.write_all(bytes)?;
        self.flush()?;
        Ok(())
    }

    fn read_available(&mut self) -> Result<Vec<u8>, ShieldTerminalError> {
        let waiting = self.bytes_to_read()? as usize;
        if waiting == 0 {
            return Ok(Vec::new());
        }

        let mut buffer = vec![0u8; waiting];
        match self.read(&mut buffer) {
            Ok(n) => {
                buffer.truncate(n);
                Ok(buffer)
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn clear_input(&mut self) -> Result<(), ShieldTerminalError> {
        self.clear(serialport::ClearBuffer::Input)?;
        Ok(())
    }
}

/// How the blocking waits poll the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Sleep between reads that returned nothing
    pub interval: Duration,
    /// Limit on waiting for a command acknowledgement; `None` waits forever
    pub ack_timeout: Option<Duration>,
    /// Limit on waiting for the next sample or end marker; `None` waits forever
    pub sample_timeout: Option<Duration>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(10),
            ack_timeout: Some(Duration::from_secs(10)),
            sample_timeout: Some(Duration::from_secs(5)),
        }
    }
}

/// Aborts the blocking wait of a terminal from another thread.
///
/// A cancellation is consumed by the wait it interrupts.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn take(&self) -> bool {
        self.cancelled.swap(false, Ordering::SeqCst)
    }
}

/// Line-oriented command channel to a PowerShield.
pub struct ShieldTerminal<T: Transport> {
    transport: T,
    assembler: LineAssembler,
    dialect: ProtocolDialect,
    poll: PollConfig,
    cancel: CancelToken,
    // An ack wait gave up; its late reply may still be on the line
    resync: bool,
    stream_ended: bool,
}

impl<T: Transport> ShieldTerminal<T> {
    pub fn new(transport: T, dialect: ProtocolDialect, poll: PollConfig, max_line_len: usize) -> Self {
        Self {
            transport,
            assembler: LineAssembler::new(max_line_len),
            dialect,
            poll,
            cancel: CancelToken::new(),
            resync: false,
            stream_ended: false,
        }
    }

    /// Share a token created before the terminal existed.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn dialect(&self) -> ProtocolDialect {
        self.dialect
    }

    pub fn poll_config(&self) -> PollConfig {
        self.poll
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Drop everything received but not yet consumed.
    pub fn flush(&mut self) -> Result<(), ShieldTerminalError> {
        self.transport.clear_input()?;
        self.assembler.clear();
        Ok(())
    }

    /// Send a command and block until the device acknowledges it.
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub fn send(&mut self, command: &str) -> Result<String, ShieldTerminalError> {
        if self.resync {
            log::debug!("Dropping stale input before '{}'", command);
            self.flush()?;
            self.resync = false;
        }
        self.write_line(command)?;
        let ack = self.wait_for_ack()?;
        log::debug!("Device acknowledged '{}': '{}'", command, ack);
        Ok(ack)
    }

    /// Write `command` followed by CR LF without waiting for a reply.
    pub fn write_line(&mut self, command: &str) -> Result<(), ShieldTerminalError> {
        log::debug!("Sending '{}'", command);
        let line = format!("{}{}", command, LINE_TERMINATOR);
        self.transport.write_bytes(line.as_bytes())
    }

    /// Block until an acknowledgement arrives, skipping all other lines.
    ///
    /// After a timeout or cancel the next [`send`](Self::send) flushes the input first.
    pub fn wait_for_ack(&mut self) -> Result<String, ShieldTerminalError> {
        let dialect = self.dialect;
        let timeout = self.poll.ack_timeout;
        let mut stream_ended = false;
        let result = self.poll_lines("acknowledgement", timeout, |line| {
            let ack = ResponseFilter::accept(line, dialect);
            if ack.is_none() && line.contains(END_OF_STREAM_MARKER) {
                stream_ended = true;
            }
            Ok(ack)
        });
        self.stream_ended |= stream_ended;

        if matches!(
            result,
            Err(ShieldTerminalError::Timeout { .. } | ShieldTerminalError::Cancelled)
        ) {
            self.resync = true;
        }
        result
    }

    /// Whether an end marker was skipped by an ack wait since the last call.
    pub fn take_stream_ended(&mut self) -> bool {
        std::mem::take(&mut self.stream_ended)
    }

    /// Block until the stream yields a sample or the end marker. Noise is skipped.
    pub fn next_sample_event(&mut self) -> Result<SampleEvent, ShieldTerminalError> {
        let timeout = self.poll.sample_timeout;
        self.poll_lines("sample", timeout, |line| {
            match SampleDecoder::accept(line)? {
                SampleEvent::Noise => Ok(None),
                event => Ok(Some(event)),
            }
        })
    }

    /// Poll-with-delay loop shared by every blocking wait.
    ///
    /// Buffered lines are offered to `on_line` before the transport is read again,
    /// and lines after the one that completes the wait stay buffered.
    fn poll_lines<R, F>(
        &mut self,
        expected: &'static str,
        timeout: Option<Duration>,
        mut on_line: F,
    ) -> Result<R, ShieldTerminalError>
    where
        F: FnMut(&str) -> Result<Option<R>, ShieldTerminalError>,
    {
        let start = Instant::now();

        loop {
            for line in self.assembler.lines() {
                if let Some(result) = on_line(&line?)? {
                    return Ok(result);
                }
            }

            if self.cancel.take() {
                log::debug!("Wait for {} cancelled", expected);
                return Err(ShieldTerminalError::Cancelled);
            }

            if let Some(limit) = timeout {
                let waited = start.elapsed();
                if waited >= limit {
                    return Err(ShieldTerminalError::Timeout { expected, waited });
                }
            }

            let bytes = self.transport.read_available()?;
            if bytes.is_empty() {
                thread::sleep(self.poll.interval);
            } else {
                self.assembler.extend(&bytes);
            }
        }
    }

    pub fn into_inner(self) -> T {
        self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_transport::ScriptedTransport;

    fn fast_poll() -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(1),
            ack_timeout: Some(Duration::from_millis(50)),
            sample_timeout: Some(Duration::from_millis(50)),
        }
    }

    fn terminal(transport: &ScriptedTransport, dialect: ProtocolDialect) -> ShieldTerminal<ScriptedTransport> {
        ShieldTerminal::new(transport.clone(), dialect, fast_poll(), 256)
    }

    #[test]
    fn test_send_appends_crlf_and_returns_ack() {
        let transport = ScriptedTransport::new();
        transport.reply(&["stlp > bo", "ot chatter\r\nack version: 1.2.3\r\n"]);
        let mut terminal = terminal(&transport, ProtocolDialect::V3);

        assert_eq!(terminal.send("version").unwrap(), "version: 1.2.3");
        assert_eq!(transport.written(), vec!["version\r\n".to_string()]);
    }

    #[test]
    fn test_lines_after_ack_are_kept_for_sampling() {
        let transport = ScriptedTransport::new();
        transport.reply(&["ack start\r\n0100-02\r\n"]);
        let mut terminal = terminal(&transport, ProtocolDialect::V3);

        terminal.send("start").unwrap();
        assert_eq!(terminal.next_sample_event().unwrap(), SampleEvent::Sample(1.0));
    }

    #[test]
    fn test_sample_events_skip_noise() {
        let transport = ScriptedTransport::new();
        transport.push_input(&["garbage\r\n\0\0", "0250-02\r\nstatus\r\n", "end\r\n"]);
        let mut terminal = terminal(&transport, ProtocolDialect::V3);

        assert_eq!(terminal.next_sample_event().unwrap(), SampleEvent::Sample(2.5));
        assert_eq!(terminal.next_sample_event().unwrap(), SampleEvent::EndOfStream);
    }

    #[test]
    fn test_missing_ack_times_out() {
        let transport = ScriptedTransport::new();
        transport.push_input(&["0100-02\r\n"]);
        let mut terminal = terminal(&transport, ProtocolDialect::Legacy);

        match terminal.send("status") {
            Err(ShieldTerminalError::Timeout { expected, waited }) => {
                assert_eq!(expected, "acknowledgement");
                assert!(waited >= Duration::from_millis(50));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_sample_times_out() {
        let transport = ScriptedTransport::new();
        transport.push_input(&["0100-02\r\nstlp > idle\r\n"]);
        let mut terminal = terminal(&transport, ProtocolDialect::V3);

        assert_eq!(terminal.next_sample_event().unwrap(), SampleEvent::Sample(1.0));
        match terminal.next_sample_event() {
            Err(ShieldTerminalError::Timeout { expected, waited }) => {
                assert_eq!(expected, "sample");
                assert!(waited >= Duration::from_millis(50));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_late_ack_is_flushed_after_timeout() {
        let transport = ScriptedTransport::new();
        let mut terminal = terminal(&transport, ProtocolDialect::V3);

        assert!(matches!(
            terminal.send("calib"),
            Err(ShieldTerminalError::Timeout { .. })
        ));
        transport.push_input(&["ack calib done\r\n"]);
        transport.reply(&["ack version: 1.2.3\r\n"]);

        assert_eq!(terminal.send("version").unwrap(), "version: 1.2.3");
        assert_eq!(transport.written(), vec!["calib\r\n", "version\r\n"]);
    }

    #[test]
    fn test_ack_wait_records_skipped_end_marker() {
        let transport = ScriptedTransport::new();
        transport.reply(&["0100-02\r\nend\r\nPowerShield > status ok\r\n"]);
        let mut terminal = terminal(&transport, ProtocolDialect::Legacy);

        assert_eq!(terminal.send("status").unwrap(), "status ok");
        assert!(terminal.take_stream_ended());
        assert!(!terminal.take_stream_ended());
    }

    #[test]
    fn test_cancel_aborts_wait_once() {
        let transport = ScriptedTransport::new();
        let mut terminal = ShieldTerminal::new(
            transport.clone(),
            ProtocolDialect::V3,
            PollConfig {
                ack_timeout: None,
                ..fast_poll()
            },
            256,
        );
        let token = terminal.cancel_token();
        token.cancel();

        assert!(matches!(
            terminal.send("calib"),
            Err(ShieldTerminalError::Cancelled)
        ));
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_from_other_thread() {
        let transport = ScriptedTransport::new();
        let mut terminal = ShieldTerminal::new(
            transport,
            ProtocolDialect::V3,
            PollConfig {
                ack_timeout: None,
                ..fast_poll()
            },
            256,
        );
        let token = terminal.cancel_token();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            token.cancel();
        });

        assert!(matches!(
            terminal.send("autotest"),
            Err(ShieldTerminalError::Cancelled)
        ));
        canceller.join().unwrap();
    }

    #[test]
    fn test_runaway_line_is_reported() {
        let transport = ScriptedTransport::new();
        let runaway = "x".repeat(300);
        transport.push_input(&[runaway.as_str()]);
        let mut terminal = terminal(&transport, ProtocolDialect::V3);

        assert!(matches!(
            terminal.next_sample_event(),
            Err(ShieldTerminalError::LineOverflow(_))
        ));
    }
}
