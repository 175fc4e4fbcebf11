//! Modbus TCP server: listener and per-connection handling
//!
//! One tokio task per accepted connection; all tasks share a single register
//! store behind one mutex, so a multi-register write can never be observed
//! half-applied by a concurrent reader.
//!
//! Per-connection lifecycle: read a complete frame (MBAP header, then exactly
//! the PDU bytes the Length field promises), dispatch it against the store,
//! write the reply, repeat. Clean disconnect ends the loop silently; a
//! malformed header drops the connection without a reply, since there is no
//! trustworthy transaction id to answer with. Dispatch-level rejections are
//! answered with exception PDUs and the connection stays open.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::constants::{MAX_MBAP_LENGTH, MBAP_HEADER_LEN};
use crate::dispatch::dispatch;
use crate::error::{ModbusError, ModbusResult};
use crate::frame::{self, MbapHeader};
use crate::logging::{FrameDirection, FrameTracer};
use crate::pdu::ModbusPdu;
use crate::store::RegisterStore;
use crate::ServerConfig;

/// Shared handle to the server's register store
pub type SharedStore = Arc<Mutex<RegisterStore>>;

/// Async Modbus TCP server
pub struct ModbusTcpServer {
    listener: TcpListener,
    store: SharedStore,
    tracer: FrameTracer,
}

impl ModbusTcpServer {
    /// Bind the listener and take ownership of a shared store.
    ///
    /// Bind failure is fatal: the caller is expected to propagate it and exit
    /// non-zero.
    pub async fn bind(addr: SocketAddr, store: SharedStore) -> ModbusResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Modbus server listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            store,
            tracer: FrameTracer::disabled(),
        })
    }

    /// Build store and server from a [`ServerConfig`].
    ///
    /// Enables the hex-dump tracer when the config's debug flag is set.
    pub async fn from_config(config: &ServerConfig) -> ModbusResult<Self> {
        let addr = config.socket_addr()?;
        let store = Arc::new(Mutex::new(RegisterStore::new(config.layout())));
        let mut server = Self::bind(addr, store).await?;
        if config.debug {
            server.tracer = FrameTracer::hex_dump();
        }
        Ok(server)
    }

    /// Install a raw-frame tracer
    pub fn with_tracer(mut self, tracer: FrameTracer) -> Self {
        self.tracer = tracer;
        self
    }

    /// The address the listener is actually bound to (useful with port 0)
    pub fn local_addr(&self) -> ModbusResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared handle to the register store, for host-side seeding
    pub fn store(&self) -> SharedStore {
        Arc::clone(&self.store)
    }

    /// Accept connections forever, one handler task per client.
    ///
    /// Accept failures are logged and the loop continues; only the caller
    /// dropping the future stops the listener.
    pub async fn serve(&self) -> ModbusResult<()> {
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Error accepting client connection: {}", e);
                    continue;
                }
            };

            debug!("Client connected: {}", peer);
            let store = Arc::clone(&self.store);
            let tracer = self.tracer.clone();
            tokio::spawn(async move {
                match handle_connection(stream, store, tracer).await {
                    Ok(()) => debug!("Client disconnected: {}", peer),
                    Err(e) if e.is_disconnect() => debug!("Client disconnected: {}", peer),
                    Err(ModbusError::Frame { message }) => {
                        warn!("Dropping {}: malformed frame: {}", peer, message)
                    }
                    Err(e) => warn!("Connection error from {}: {}", peer, e),
                }
            });
        }
    }
}

/// Serve one client until it disconnects or sends garbage
async fn handle_connection(
    mut stream: TcpStream,
    store: SharedStore,
    tracer: FrameTracer,
) -> ModbusResult<()> {
    loop {
        let (header, request, raw) = match read_frame(&mut stream).await {
            Ok(frame) => frame,
            Err(ModbusError::ConnectionClosed) => return Ok(()),
            Err(e) => return Err(e),
        };
        tracer.trace(FrameDirection::Request, &raw);

        let reply = {
            let mut store = store.lock().await;
            dispatch(&request, &mut store)
        };

        let response = frame::encode(&header, &reply);
        tracer.trace(FrameDirection::Response, &response);
        stream.write_all(&response).await?;
    }
}

/// Read one complete frame: 7 header bytes, then exactly the PDU bytes the
/// Length field promises.
///
/// Returns the decoded header, the PDU, and the raw frame bytes for tracing.
/// EOF before any header byte is a clean [`ModbusError::ConnectionClosed`];
/// EOF mid-frame surfaces as an I/O error and ends the connection.
async fn read_frame(stream: &mut TcpStream) -> ModbusResult<(MbapHeader, ModbusPdu, Vec<u8>)> {
    let mut raw = vec![0u8; MBAP_HEADER_LEN - 1 + MAX_MBAP_LENGTH];

    if let Err(e) = stream.read_exact(&mut raw[..MBAP_HEADER_LEN]).await {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            return Err(ModbusError::ConnectionClosed);
        }
        return Err(e.into());
    }

    let header = MbapHeader::from_bytes(&raw[..MBAP_HEADER_LEN])?;
    let frame_len = MBAP_HEADER_LEN + header.pdu_len();
    stream.read_exact(&mut raw[MBAP_HEADER_LEN..frame_len]).await?;
    raw.truncate(frame_len);

    let pdu = ModbusPdu::from_slice(&raw[MBAP_HEADER_LEN..])?;
    Ok((header, pdu, raw))
}
