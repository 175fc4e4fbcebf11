//! Raw-frame trace hook
//!
//! The server core exposes an optional callback invoked with every raw
//! request frame (after a complete frame has been read) and every raw
//! response frame (before it is written). The embedder owns any formatting
//! beyond the built-in hex dump; the core only delivers bytes.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

/// Which way a traced frame is travelling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDirection {
    /// Bytes received from the client
    Request,
    /// Bytes about to be sent to the client
    Response,
}

impl fmt::Display for FrameDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request => write!(f, "QUERY"),
            Self::Response => write!(f, "RESPONSE"),
        }
    }
}

/// Callback receiving the direction and the raw frame bytes
pub type TraceCallback = Arc<dyn Fn(FrameDirection, &[u8]) + Send + Sync>;

/// Optional per-server frame tracer
///
/// Cloned into every connection task; disabled tracers cost one branch per
/// frame.
#[derive(Clone, Default)]
pub struct FrameTracer {
    callback: Option<TraceCallback>,
}

impl FrameTracer {
    /// A tracer that does nothing
    pub fn disabled() -> Self {
        Self::default()
    }

    /// A tracer that forwards every frame to `callback`
    pub fn with_callback(callback: TraceCallback) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    /// A tracer that hex-dumps frames via `tracing::debug!`
    pub fn hex_dump() -> Self {
        Self::with_callback(Arc::new(|direction, bytes| {
            debug!(
                "[{}] (Length: {}): {}",
                direction,
                bytes.len(),
                format_hex(bytes)
            );
        }))
    }

    /// Whether a callback is installed
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.callback.is_some()
    }

    /// Deliver one frame to the callback, if any
    #[inline]
    pub fn trace(&self, direction: FrameDirection, bytes: &[u8]) {
        if let Some(callback) = &self.callback {
            callback(direction, bytes);
        }
    }
}

impl fmt::Debug for FrameTracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameTracer")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// Space-separated uppercase hex, `01 A0 FF` style
pub fn format_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
