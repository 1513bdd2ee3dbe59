use thiserror::Error;

use crate::hal::HalError;

/// Failure to turn command text into a value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("missing argument")]
    Empty,

    #[error("hex string must have an even number of characters, got {0}")]
    OddLength(usize),

    #[error("invalid hex character '{c}' at position {index}")]
    InvalidHex { c: char, index: usize },

    #[error("invalid integer '{0}'")]
    InvalidInt(String),

    #[error("destination holds {capacity} bytes but {needed} are required")]
    BufferSize { needed: usize, capacity: usize },
}

/// Frame buffer misuse
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame of {needed} bytes exceeds the {capacity}-byte buffer")]
    Overflow { needed: usize, capacity: usize },

    #[error("cannot append bytes to a frame of {0} bits (not byte aligned)")]
    NotByteAligned(usize),
}

/// Everything a console command can report.
///
/// The `Display` text is what the operator sees on the console, so the
/// messages keep the terse `Error. ...` style of the device firmware.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Error. Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Error. No NFC hardware attached")]
    NoHardware,

    #[error("Error. NFC chip failed to start")]
    NotReady,

    #[error("Error. NFC Field not activated.")]
    FieldOff,

    #[error("Error. Technology not set, select one with mode_* first")]
    TechnologyNotSet,

    #[error("Error. Emulation requires a listener mode (mode_emu_*)")]
    NotListener,

    #[error("Error. Timeout")]
    Timeout,

    #[error("Error. {what}: {source}")]
    Parse {
        what: &'static str,
        #[source]
        source: ParseError,
    },

    #[error("Error. {0}")]
    InvalidArgument(String),

    #[error("Error. {0}")]
    Frame(#[from] FrameError),

    #[error("Error. {context}: {source}")]
    Hal {
        context: &'static str,
        #[source]
        source: HalError,
    },

    #[error("Error. Console I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl CommandError {
    pub(crate) fn parse(what: &'static str) -> impl FnOnce(ParseError) -> Self {
        move |source| CommandError::Parse { what, source }
    }

    pub(crate) fn hal(context: &'static str) -> impl FnOnce(HalError) -> Self {
        move |source| CommandError::Hal { context, source }
    }
}

impl From<HalError> for CommandError {
    fn from(source: HalError) -> Self {
        match source {
            HalError::NotReady => CommandError::NotReady,
            source => CommandError::Hal {
                context: "Hardware error",
                source,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_messages_keep_firmware_wording() {
        assert_eq!(
            CommandError::NotReady.to_string(),
            "Error. NFC chip failed to start"
        );
        assert_eq!(
            CommandError::FieldOff.to_string(),
            "Error. NFC Field not activated."
        );
        assert_eq!(CommandError::Timeout.to_string(), "Error. Timeout");
    }

    #[test]
    fn hal_codes_are_reported_raw() {
        let err = CommandError::hal("Transmit failed")(HalError::Code(-3));
        assert_eq!(err.to_string(), "Error. Transmit failed: hardware error code -3");
    }

    #[test]
    fn not_ready_maps_to_chip_message() {
        let err: CommandError = HalError::NotReady.into();
        assert!(matches!(err, CommandError::NotReady));
    }

    #[test]
    fn parse_errors_name_the_argument() {
        let err = CommandError::parse("Command hex byte conversion error")(ParseError::OddLength(3));
        let s = err.to_string();
        assert!(s.contains("Command hex byte conversion error"));
        assert!(s.contains("even number"));
    }
}
