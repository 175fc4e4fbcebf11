//! Modbus Station server binary
//!
//! A standalone Modbus TCP server over the library core. The register map is
//! sized from the command line and starts zeroed; clients read and write it
//! over standard function codes 0x01-0x06/0x0F/0x10.
//!
//! Usage: server [-i IP] [-p PORT] [-r REG_COUNT] [--debug]
//! Example: server -i 192.168.1.100 -p 502 -r 20 --debug

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use modbus_station::{ModbusResult, ModbusTcpServer, ServerConfig};

#[derive(Parser, Debug)]
#[command(
    name = "modbus_station",
    version,
    about = "Modbus TCP server with an in-memory register map"
)]
struct Args {
    /// Server IP address to bind
    #[arg(short = 'i', long = "ip", default_value = "0.0.0.0")]
    ip: String,

    /// Server port to bind
    #[arg(short = 'p', long = "port", default_value_t = 502)]
    port: u16,

    /// Number of holding registers
    #[arg(short = 'r', long = "registers", default_value_t = 10)]
    registers: u16,

    /// Number of coils
    #[arg(long = "coils", default_value_t = 0)]
    coils: u16,

    /// Number of discrete inputs
    #[arg(long = "discrete-inputs", default_value_t = 0)]
    discrete_inputs: u16,

    /// Number of input registers
    #[arg(long = "input-registers", default_value_t = 0)]
    input_registers: u16,

    /// Enable debug output with raw frame dumps
    #[arg(long = "debug", default_value_t = false)]
    debug: bool,
}

fn init_tracing(debug: bool) {
    let default_filter = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn print_settings(config: &ServerConfig) {
    info!("Modbus Server Settings:");
    info!("  IP Address: {}", config.ip);
    info!("  Port: {}", config.port);
    info!(
        "  Register Count: {} holding, {} input, {} coils, {} discrete inputs",
        config.holding_registers, config.input_registers, config.coils, config.discrete_inputs
    );
    info!(
        "  Debug Mode: {}",
        if config.debug { "Enabled" } else { "Disabled" }
    );
}

#[tokio::main]
async fn main() -> ModbusResult<()> {
    let args = Args::parse();
    init_tracing(args.debug);

    let config = ServerConfig::new()
        .with_ip(args.ip)
        .with_port(args.port)
        .with_holding_registers(args.registers)
        .with_coils(args.coils)
        .with_discrete_inputs(args.discrete_inputs)
        .with_input_registers(args.input_registers)
        .with_debug(args.debug);

    print_settings(&config);

    // Bind/allocation failures propagate out and exit non-zero
    let server = ModbusTcpServer::from_config(&config).await?;
    server.serve().await
}
