//! Core error types and result handling
//!
//! Two failure channels exist on the server side and they must not be mixed:
//!
//! - [`ModbusError`] — transport- and frame-level failures. These are fatal to
//!   the connection they occur on (a malformed MBAP header leaves no valid
//!   transaction id to reply with), or fatal to the process at startup.
//! - [`ExceptionCode`] — protocol-level rejections of a single request. These
//!   are encoded into an exception PDU and sent back; the connection stays
//!   open and the client may retry.

use thiserror::Error;

/// Result type used throughout the library
pub type ModbusResult<T> = Result<T, ModbusError>;

/// Server-side Modbus error type
#[derive(Error, Debug)]
pub enum ModbusError {
    /// Malformed MBAP frame; no reply is possible, the connection is dropped
    #[error("Malformed frame: {message}")]
    Frame { message: String },

    /// Peer disconnected cleanly; normal client departure, not a failure
    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// Underlying transport failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration (bind address, space sizes)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Internal protocol invariant violation (e.g. reply PDU overflow)
    #[error("Protocol error: {message}")]
    Protocol { message: String },
}

impl ModbusError {
    /// Create a malformed-frame error
    pub fn frame<S: Into<String>>(message: S) -> Self {
        Self::Frame {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a protocol error
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// True for the errors that end a connection without being worth a log
    /// line above debug level
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::ConnectionClosed => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

/// Modbus exception codes returned inside an exception PDU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExceptionCode {
    /// Function code is not supported by the server (0x01)
    IllegalFunction = 0x01,
    /// Address range falls outside the addressed data space (0x02)
    IllegalDataAddress = 0x02,
    /// Quantity, byte count or value field is out of the allowed range (0x03)
    IllegalDataValue = 0x03,
    /// Unrecoverable server-side failure while servicing the request (0x04)
    ServerDeviceFailure = 0x04,
}

impl ExceptionCode {
    /// Raw exception byte as sent on the wire
    #[inline]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Human-readable description, matching the specification wording
    pub fn description(self) -> &'static str {
        match self {
            Self::IllegalFunction => "Illegal Function",
            Self::IllegalDataAddress => "Illegal Data Address",
            Self::IllegalDataValue => "Illegal Data Value",
            Self::ServerDeviceFailure => "Server Device Failure",
        }
    }
}

impl std::fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (0x{:02X})", self.description(), self.to_u8())
    }
}
