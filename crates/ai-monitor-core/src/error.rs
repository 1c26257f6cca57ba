use thiserror::Error;

/// Error categories as laid out in the monitor's error-handling design:
/// invalid arguments, malformed wire data, unsupported features, transient
/// I/O conditions, and fatal conditions that force a listener-level
/// teardown.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("transient I/O condition: {0}")]
    Transient(String),

    #[error("fatal error: {0}")]
    Fatal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl MonitorError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Numeric status embedded in EVENT acknowledgements, mirroring the
    /// `OPRT_*` result codes the original handler forwarded to observers.
    pub fn code(&self) -> i32 {
        match self {
            MonitorError::InvalidArgument(_) => -1,
            MonitorError::Malformed(_) => -2,
            MonitorError::Unsupported(_) => -3,
            MonitorError::Transient(_) => -4,
            MonitorError::Fatal(_) => -5,
            MonitorError::Io(_) => -6,
        }
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
