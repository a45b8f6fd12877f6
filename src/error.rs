use std::{error, fmt, io};

// -------------------------------------------------------------------------------------------------

/// Provides an enumeration of all possible errors reported by the granular engine.
#[derive(Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    InvalidWindowLength(usize),
    InvalidWindowType(usize),
    SourceRangeError {
        offset: usize,
        required: usize,
        available: usize,
    },
    ParameterError(String),
    SendError(String),
    IoError(io::Error),
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidWindowLength(length) => {
                write!(f, "Invalid grain window length: {length}")
            }
            Self::InvalidWindowType(index) => write!(f, "Invalid grain window type: {index}"),
            Self::SourceRangeError {
                offset,
                required,
                available,
            } => write!(
                f,
                "Source span at offset {offset} needs {required} samples, but only {available} are available"
            ),
            Self::ParameterError(str) => write!(f, "Invalid parameter: {str}"),
            Self::SendError(str) => write!(f, "Failed to send channel message: {str}"),
            Self::IoError(err) => err.fmt(f),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}
