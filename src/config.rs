//! # Server Configuration
//!
//! The startup surface of the server: bind address, port, per-space register
//! counts and the debug flag. Consumed once to size the register store and
//! bind the listener; immutable afterwards.

use std::net::{IpAddr, SocketAddr};

use crate::error::{ModbusError, ModbusResult};
use crate::store::StoreLayout;

/// Default bind address.
pub const DEFAULT_BIND_IP: &str = "0.0.0.0";

/// Default Modbus TCP port.
pub const DEFAULT_TCP_PORT: u16 = 502;

/// Default number of holding registers.
pub const DEFAULT_REGISTER_COUNT: u16 = 10;

/// Modbus TCP server configuration.
///
/// Defaults match the classic demo server: listen on `0.0.0.0:502` with ten
/// holding registers and the other three spaces empty.
///
/// # Example
///
/// ```rust
/// use modbus_station::ServerConfig;
///
/// let config = ServerConfig::new()
///     .with_port(1502)
///     .with_holding_registers(20)
///     .with_debug(true);
///
/// assert_eq!(config.port, 1502);
/// assert_eq!(config.layout().holding_registers, 20);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// IP address to bind.
    pub ip: String,
    /// TCP port to bind.
    pub port: u16,
    /// Number of coils.
    pub coils: u16,
    /// Number of discrete inputs.
    pub discrete_inputs: u16,
    /// Number of holding registers.
    pub holding_registers: u16,
    /// Number of input registers.
    pub input_registers: u16,
    /// Enable raw-frame debug tracing.
    pub debug: bool,
}

impl ServerConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bind IP address.
    pub fn with_ip<S: Into<String>>(mut self, ip: S) -> Self {
        self.ip = ip.into();
        self
    }

    /// Set the bind port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the number of coils.
    pub fn with_coils(mut self, count: u16) -> Self {
        self.coils = count;
        self
    }

    /// Set the number of discrete inputs.
    pub fn with_discrete_inputs(mut self, count: u16) -> Self {
        self.discrete_inputs = count;
        self
    }

    /// Set the number of holding registers.
    pub fn with_holding_registers(mut self, count: u16) -> Self {
        self.holding_registers = count;
        self
    }

    /// Set the number of input registers.
    pub fn with_input_registers(mut self, count: u16) -> Self {
        self.input_registers = count;
        self
    }

    /// Enable or disable debug tracing.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// The register store layout described by this configuration.
    pub fn layout(&self) -> StoreLayout {
        StoreLayout {
            coils: self.coils,
            discrete_inputs: self.discrete_inputs,
            holding_registers: self.holding_registers,
            input_registers: self.input_registers,
        }
    }

    /// Combine IP and port into a bindable socket address.
    pub fn socket_addr(&self) -> ModbusResult<SocketAddr> {
        let ip: IpAddr = self
            .ip
            .parse()
            .map_err(|e| ModbusError::configuration(format!("Invalid IP address: {}", e)))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ip: DEFAULT_BIND_IP.to_string(),
            port: DEFAULT_TCP_PORT,
            coils: 0,
            discrete_inputs: 0,
            holding_registers: DEFAULT_REGISTER_COUNT,
            input_registers: 0,
            debug: false,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
