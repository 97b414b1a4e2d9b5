use crate::dialect::trim_padding;

/// Substring the firmware emits once an acquisition has finished.
pub const END_OF_STREAM_MARKER: &str = "end";

const MANTISSA_DIGITS: usize = 4;
const EXPONENT_DIGITS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleEvent {
    Sample(f64),
    EndOfStream,
    Noise,
}

#[derive(Debug, thiserror::Error)]
#[error("Failed to decode sample line {line:?}: {source}")]
pub struct SampleDecodeError {
    pub line: String,
    #[source]
    pub source: std::num::ParseIntError,
}

/// Classifies lines of the acquisition stream.
///
/// Telemetry uses the fixed `MMMM-EE` shape: a four digit mantissa and a two digit
/// count of decimal places, so `1234-05` is `0.01234`. Classification is line-local.
pub struct SampleDecoder;

impl SampleDecoder {
    /// Classify one line. The end marker wins over everything else.
    pub fn accept(line: &str) -> Result<SampleEvent, SampleDecodeError> {
        if line.contains(END_OF_STREAM_MARKER) {
            return Ok(SampleEvent::EndOfStream);
        }

        let text = trim_padding(line);
        if !Self::is_sample_shape(text) {
            log::trace!("Ignoring non-sample line: {:?}", line);
            return Ok(SampleEvent::Noise);
        }

        Self::decode(text).map(SampleEvent::Sample)
    }

    /// Exactly four ASCII digits, a hyphen, two ASCII digits.
    pub fn is_sample_shape(text: &str) -> bool {
        let bytes = text.as_bytes();
        bytes.len() == MANTISSA_DIGITS + 1 + EXPONENT_DIGITS
            && bytes[MANTISSA_DIGITS] == b'-'
            && bytes[..MANTISSA_DIGITS].iter().all(u8::is_ascii_digit)
            && bytes[MANTISSA_DIGITS + 1..].iter().all(u8::is_ascii_digit)
    }

    /// Decode an already shape-checked `MMMM-EE` field.
    pub fn decode(text: &str) -> Result<f64, SampleDecodeError> {
        let parse = |digits: &str| {
            digits.parse::<u32>().map_err(|source| SampleDecodeError {
                line: text.to_string(),
                source,
            })
        };

        let (mantissa, exponent) = text.split_once('-').unwrap_or((text, ""));
        let mantissa = parse(mantissa)?;
        let exponent = parse(exponent)?;

        if mantissa == 0 {
            return Ok(0.0);
        }
        Ok(f64::from(mantissa) / 10f64.powi(exponent as i32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= b.abs() * 1e-12
    }

    #[test]
    fn test_decodes_mantissa_exponent_lines() {
        for mantissa in [1u32, 7, 42, 1234, 9999] {
            for exponent in [0i32, 1, 5, 9, 12, 99] {
                let line = format!("{:04}-{:02}", mantissa, exponent);
                let expected = f64::from(mantissa) * 10f64.powi(-exponent);
                match SampleDecoder::accept(&line).unwrap() {
                    SampleEvent::Sample(value) => assert!(
                        close(value, expected),
                        "{} decoded to {}, expected {}",
                        line,
                        value,
                        expected
                    ),
                    other => panic!("{} classified as {:?}", line, other),
                }
            }
        }
    }

    #[test]
    fn test_zero_mantissa_is_zero() {
        for exponent in [0, 3, 99] {
            let line = format!("0000-{:02}", exponent);
            assert_eq!(
                SampleDecoder::accept(&line).unwrap(),
                SampleEvent::Sample(0.0)
            );
        }
    }

    #[test]
    fn test_padding_is_stripped() {
        assert_eq!(
            SampleDecoder::accept("\0\0 1500-03 \r").unwrap(),
            SampleEvent::Sample(1.5)
        );
    }

    #[test]
    fn test_other_lines_are_noise() {
        for line in [
            "",
            "123-04",
            "12345-04",
            "1234-4",
            "1234-045",
            "1234_04",
            "12a4-04",
            "ack start",
            "1234-04 extra",
            "+123-04",
        ] {
            assert_eq!(
                SampleDecoder::accept(line).unwrap(),
                SampleEvent::Noise,
                "{:?}",
                line
            );
        }
    }

    #[test]
    fn test_end_marker_takes_precedence() {
        assert_eq!(
            SampleDecoder::accept("ack end").unwrap(),
            SampleEvent::EndOfStream
        );
        assert_eq!(
            SampleDecoder::accept("summary end of acquisition").unwrap(),
            SampleEvent::EndOfStream
        );
        assert_eq!(
            SampleDecoder::accept("1234-05end").unwrap(),
            SampleEvent::EndOfStream
        );
    }
}
