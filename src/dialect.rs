use std::fmt;

use crate::command::{Command, TriggerSource};

/// The two textual protocol variants spoken by PowerShield firmware.
///
/// A driver is bound to one dialect for its whole lifetime; there is no
/// auto-detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolDialect {
    /// Older firmware. Acknowledgements carry the `PowerShield` banner.
    Legacy,
    /// Firmware with the `ack` / `stlp >` framing.
    #[default]
    V3,
}

impl ProtocolDialect {
    /// Token whose presence marks a line as an acknowledgement.
    pub fn ack_token(&self) -> &'static str {
        match self {
            ProtocolDialect::Legacy => "PowerShield",
            ProtocolDialect::V3 => "ack",
        }
    }

    /// Prefixes removed from an acknowledgement, in order.
    pub fn stripped_prefixes(&self) -> &'static [&'static str] {
        match self {
            ProtocolDialect::Legacy => &["PowerShield > "],
            ProtocolDialect::V3 => &["ack ", "stlp >"],
        }
    }

    /// Capability table: whether this firmware understands `command`.
    pub fn supports(&self, command: &Command) -> bool {
        match self {
            ProtocolDialect::Legacy => !matches!(
                command,
                Command::ApiVersion
                    | Command::Info
                    | Command::Range
                    | Command::PowerTargetMode { .. }
                    | Command::SetVoltage {
                        output: Some(_),
                        ..
                    }
                    | Command::Temperature { refresh: true, .. }
                    | Command::TriggerSource(TriggerSource::Hardware)
            ),
            ProtocolDialect::V3 => !matches!(
                command,
                Command::AcquisitionMode(_)
                    | Command::Display { .. }
                    | Command::TriggerSource(TriggerSource::D7)
            ),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolDialect::Legacy => "legacy",
            ProtocolDialect::V3 => "v3",
        }
    }
}

impl fmt::Display for ProtocolDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Picks acknowledgements out of device chatter.
pub struct ResponseFilter;

impl ResponseFilter {
    /// Returns the acknowledgement payload, or `None` for any other line.
    pub fn accept(line: &str, dialect: ProtocolDialect) -> Option<String> {
        if !line.contains(dialect.ack_token()) {
            log::trace!("Ignoring device chatter: {:?}", line);
            return None;
        }

        let mut text = line.to_string();
        for prefix in dialect.stripped_prefixes() {
            text = text.replace(prefix, "");
        }
        Some(trim_padding(&text).to_string())
    }
}

/// Trim whitespace and the NUL padding the firmware pads lines with.
pub(crate) fn trim_padding(text: &str) -> &str {
    text.trim_matches(|c: char| c.is_whitespace() || c == '\0')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::OutputSignal;

    #[test]
    fn test_v3_ack_is_stripped() {
        assert_eq!(
            ResponseFilter::accept("ack version: 1.2.3", ProtocolDialect::V3),
            Some("version: 1.2.3".to_string())
        );
        assert_eq!(
            ResponseFilter::accept("stlp > ack start\0\0", ProtocolDialect::V3),
            Some("start".to_string())
        );
    }

    #[test]
    fn test_legacy_ack_is_stripped() {
        assert_eq!(
            ResponseFilter::accept("PowerShield > ready", ProtocolDialect::Legacy),
            Some("ready".to_string())
        );
    }

    #[test]
    fn test_chatter_is_ignored() {
        assert_eq!(ResponseFilter::accept("0123-04", ProtocolDialect::V3), None);
        assert_eq!(
            ResponseFilter::accept("ack version: 1.2.3", ProtocolDialect::Legacy),
            None
        );
        assert_eq!(
            ResponseFilter::accept("PowerShield > ready", ProtocolDialect::V3),
            None
        );
    }

    #[test]
    fn test_capability_table() {
        let vaux = Command::SetVoltage {
            millivolts: 3300,
            output: Some(OutputSignal::Vaux),
        };
        assert!(ProtocolDialect::V3.supports(&vaux));
        assert!(!ProtocolDialect::Legacy.supports(&vaux));

        let lcd = Command::Display {
            line: crate::command::DisplayLine::One,
            text: "hello".to_string(),
        };
        assert!(ProtocolDialect::Legacy.supports(&lcd));
        assert!(!ProtocolDialect::V3.supports(&lcd));

        assert!(ProtocolDialect::Legacy.supports(&Command::Start));
        assert!(ProtocolDialect::V3.supports(&Command::Start));
    }
}
