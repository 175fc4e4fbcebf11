//! # Modbus Station - Self-Contained Modbus TCP Server Core
//!
//! A pure-Rust Modbus TCP server: MBAP frame codec, function-code dispatch,
//! bounds-checked register store and async connection handling, with no
//! native library dependency.
//!
//! ## Supported Function Codes
//!
//! | Code | Function | Server |
//! |------|----------|--------|
//! | 0x01 | Read Coils | ✅ |
//! | 0x02 | Read Discrete Inputs | ✅ |
//! | 0x03 | Read Holding Registers | ✅ |
//! | 0x04 | Read Input Registers | ✅ |
//! | 0x05 | Write Single Coil | ✅ |
//! | 0x06 | Write Single Register | ✅ |
//! | 0x0F | Write Multiple Coils | ✅ |
//! | 0x10 | Write Multiple Registers | ✅ |
//!
//! Unsupported function codes are answered with an Illegal Function exception;
//! out-of-range addresses with Illegal Data Address; bad quantities, byte
//! counts or coil values with Illegal Data Value. All exceptions are
//! per-request: the connection stays open. Only a malformed MBAP frame drops
//! a connection, because without a valid header there is no transaction id to
//! reply with.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use modbus_station::{ModbusResult, ModbusTcpServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> ModbusResult<()> {
//!     let config = ServerConfig::new()
//!         .with_port(1502)
//!         .with_holding_registers(20);
//!
//!     let server = ModbusTcpServer::from_config(&config).await?;
//!     server.serve().await
//! }
//! ```

// ============================================================================
// Core modules
// ============================================================================

/// Core error types and result handling
pub mod error;

/// Modbus protocol constants based on official specification
pub mod constants;

/// High-performance PDU with stack-allocated fixed array
pub mod pdu;

/// MBAP frame codec: decode requests, encode replies and exceptions
pub mod frame;

/// Register store: the four addressable data spaces
pub mod store;

/// Function-code dispatch over the register store
pub mod dispatch;

/// TCP listener and per-connection handling
pub mod server;

/// Raw-frame trace hook
pub mod logging;

/// Server configuration surface
pub mod config;

// ============================================================================
// Re-exports for convenience
// ============================================================================

// === Async runtime (users can use modbus_station::tokio) ===
pub use tokio;

// === Core server API ===
pub use server::{ModbusTcpServer, SharedStore};

// === Error handling ===
pub use error::{ExceptionCode, ModbusError, ModbusResult};

// === Core types ===
pub use frame::MbapHeader;
pub use pdu::ModbusPdu;
pub use store::{RegisterStore, StoreLayout};

// === Configuration ===
pub use config::{ServerConfig, DEFAULT_REGISTER_COUNT, DEFAULT_TCP_PORT};

// === Dispatch (advanced usage: drive the core without the TCP layer) ===
pub use dispatch::dispatch;

// === Tracing hook ===
pub use logging::{FrameDirection, FrameTracer, TraceCallback};

// === Protocol limits (commonly needed constants) ===
pub use constants::{
    MAX_PDU_SIZE, MAX_READ_COILS, MAX_READ_REGISTERS, MAX_WRITE_COILS, MAX_WRITE_REGISTERS,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library information
pub fn info() -> String {
    format!(
        "Modbus Station v{} - self-contained Modbus TCP server core",
        VERSION
    )
}
