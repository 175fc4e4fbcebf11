//! End-to-end server tests over real TCP with hand-built frames
//!
//! Each test binds an ephemeral port, drives the server with raw Modbus TCP
//! bytes and asserts on the exact reply bytes, so the MBAP codec, dispatcher
//! and store are exercised together exactly as a real client would see them.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::{timeout, Duration};

use modbus_station::{ModbusTcpServer, RegisterStore, SharedStore, StoreLayout};

async fn spawn_server(layout: StoreLayout) -> (std::net::SocketAddr, SharedStore) {
    let store = Arc::new(Mutex::new(RegisterStore::new(layout)));
    let server = ModbusTcpServer::bind("127.0.0.1:0".parse().unwrap(), Arc::clone(&store))
        .await
        .expect("bind");
    let addr = server.local_addr().expect("local addr");
    tokio::spawn(async move { server.serve().await });
    (addr, store)
}

fn full_layout() -> StoreLayout {
    StoreLayout {
        coils: 16,
        discrete_inputs: 8,
        holding_registers: 10,
        input_registers: 4,
    }
}

/// Wrap a PDU in an MBAP header with the given transaction id, unit id 0x01
fn frame(transaction_id: u16, pdu: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(7 + pdu.len());
    bytes.extend_from_slice(&transaction_id.to_be_bytes());
    bytes.extend_from_slice(&[0x00, 0x00]);
    bytes.extend_from_slice(&(1 + pdu.len() as u16).to_be_bytes());
    bytes.push(0x01);
    bytes.extend_from_slice(pdu);
    bytes
}

/// Send one frame and read back the complete reply frame
async fn exchange(client: &mut TcpStream, request: &[u8]) -> Vec<u8> {
    client.write_all(request).await.expect("write");

    let mut header = [0u8; 7];
    client.read_exact(&mut header).await.expect("read header");
    let length = u16::from_be_bytes([header[4], header[5]]) as usize;

    let mut pdu = vec![0u8; length - 1];
    client.read_exact(&mut pdu).await.expect("read pdu");

    let mut reply = header.to_vec();
    reply.extend_from_slice(&pdu);
    reply
}

#[tokio::test]
async fn read_full_holding_space_returns_zeros() {
    let (addr, _store) = spawn_server(full_layout()).await;
    let mut client = TcpStream::connect(addr).await.unwrap();

    let reply = exchange(&mut client, &frame(0x0001, &[0x03, 0x00, 0x00, 0x00, 0x0A])).await;
    assert_eq!(&reply[..7], &[0x00, 0x01, 0x00, 0x00, 0x00, 0x17, 0x01]);
    assert_eq!(&reply[7..9], &[0x03, 0x14]);
    assert!(reply[9..].iter().all(|&b| b == 0));
    assert_eq!(reply[9..].len(), 20);
}

#[tokio::test]
async fn read_past_end_is_exception_and_connection_survives() {
    let (addr, _store) = spawn_server(full_layout()).await;
    let mut client = TcpStream::connect(addr).await.unwrap();

    // 5 + 10 > 10 holding registers
    let reply = exchange(&mut client, &frame(0x0002, &[0x03, 0x00, 0x05, 0x00, 0x0A])).await;
    assert_eq!(&reply[7..], &[0x83, 0x02]);

    // Same socket still serves valid requests afterwards
    let reply = exchange(&mut client, &frame(0x0003, &[0x03, 0x00, 0x05, 0x00, 0x05])).await;
    assert_eq!(&reply[7..9], &[0x03, 0x0A]);
}

#[tokio::test]
async fn unsupported_function_is_illegal_function() {
    let (addr, _store) = spawn_server(full_layout()).await;
    let mut client = TcpStream::connect(addr).await.unwrap();

    let reply = exchange(&mut client, &frame(0x0004, &[0x2B, 0x0E, 0x01, 0x00])).await;
    assert_eq!(&reply[7..], &[0xAB, 0x01]);
}

#[tokio::test]
async fn write_then_read_round_trip() {
    let (addr, _store) = spawn_server(full_layout()).await;
    let mut client = TcpStream::connect(addr).await.unwrap();

    let reply = exchange(&mut client, &frame(0x0010, &[0x06, 0x00, 0x03, 0x12, 0x34])).await;
    assert_eq!(&reply[7..], &[0x06, 0x00, 0x03, 0x12, 0x34]);

    let reply = exchange(&mut client, &frame(0x0011, &[0x03, 0x00, 0x03, 0x00, 0x01])).await;
    assert_eq!(&reply[7..], &[0x03, 0x02, 0x12, 0x34]);
}

#[tokio::test]
async fn transaction_id_echoed_for_normal_and_exception_replies() {
    let (addr, _store) = spawn_server(full_layout()).await;
    let mut client = TcpStream::connect(addr).await.unwrap();

    let reply = exchange(&mut client, &frame(0xBEEF, &[0x03, 0x00, 0x00, 0x00, 0x01])).await;
    assert_eq!(&reply[..2], &[0xBE, 0xEF]);

    let reply = exchange(&mut client, &frame(0xCAFE, &[0x03, 0x00, 0x05, 0x00, 0x0A])).await;
    assert_eq!(&reply[..2], &[0xCA, 0xFE]);
    assert_eq!(&reply[7..], &[0x83, 0x02]);
}

#[tokio::test]
async fn coil_write_and_read_back() {
    let (addr, _store) = spawn_server(full_layout()).await;
    let mut client = TcpStream::connect(addr).await.unwrap();

    let reply = exchange(&mut client, &frame(0x0020, &[0x05, 0x00, 0x02, 0xFF, 0x00])).await;
    assert_eq!(&reply[7..], &[0x05, 0x00, 0x02, 0xFF, 0x00]);

    // Coils 0-7: only coil 2 is on -> 0b0000_0100
    let reply = exchange(&mut client, &frame(0x0021, &[0x01, 0x00, 0x00, 0x00, 0x08])).await;
    assert_eq!(&reply[7..], &[0x01, 0x01, 0x04]);
}

#[tokio::test]
async fn write_multiple_registers_end_to_end() {
    let (addr, _store) = spawn_server(full_layout()).await;
    let mut client = TcpStream::connect(addr).await.unwrap();

    let reply = exchange(
        &mut client,
        &frame(
            0x0030,
            &[0x10, 0x00, 0x01, 0x00, 0x02, 0x04, 0x00, 0x0A, 0x01, 0x02],
        ),
    )
    .await;
    assert_eq!(&reply[7..], &[0x10, 0x00, 0x01, 0x00, 0x02]);

    let reply = exchange(&mut client, &frame(0x0031, &[0x03, 0x00, 0x01, 0x00, 0x02])).await;
    assert_eq!(&reply[7..], &[0x03, 0x04, 0x00, 0x0A, 0x01, 0x02]);
}

#[tokio::test]
async fn bad_protocol_id_closes_connection_without_reply() {
    let (addr, _store) = spawn_server(full_layout()).await;
    let mut client = TcpStream::connect(addr).await.unwrap();

    // Protocol id 1 instead of 0
    let mut bad = frame(0x0040, &[0x03, 0x00, 0x00, 0x00, 0x01]);
    bad[3] = 0x01;
    client.write_all(&bad).await.unwrap();

    // The server must close without sending a single byte. Unread bytes on
    // the dropped socket may surface as a reset rather than a clean EOF.
    let mut buf = [0u8; 1];
    let result = timeout(Duration::from_secs(5), client.read(&mut buf))
        .await
        .expect("server should close, not stall");
    match result {
        Ok(n) => assert_eq!(n, 0),
        Err(e) => assert_eq!(e.kind(), std::io::ErrorKind::ConnectionReset),
    }
}

#[tokio::test]
async fn undersized_length_field_closes_connection() {
    let (addr, _store) = spawn_server(full_layout()).await;
    let mut client = TcpStream::connect(addr).await.unwrap();

    // Length = 1 leaves no room for a function code
    let bad = [0x00, 0x41, 0x00, 0x00, 0x00, 0x01, 0x01];
    client.write_all(&bad).await.unwrap();

    let mut buf = [0u8; 1];
    let n = timeout(Duration::from_secs(5), client.read(&mut buf))
        .await
        .expect("server should close, not stall")
        .expect("read");
    assert_eq!(n, 0);
}

#[tokio::test]
async fn clean_disconnect_leaves_server_accepting() {
    let (addr, _store) = spawn_server(full_layout()).await;

    {
        let mut client = TcpStream::connect(addr).await.unwrap();
        let reply = exchange(&mut client, &frame(0x0050, &[0x03, 0x00, 0x00, 0x00, 0x01])).await;
        assert_eq!(&reply[7..9], &[0x03, 0x02]);
        // Dropped here: clean departure
    }

    let mut client = TcpStream::connect(addr).await.unwrap();
    let reply = exchange(&mut client, &frame(0x0051, &[0x03, 0x00, 0x00, 0x00, 0x01])).await;
    assert_eq!(&reply[7..9], &[0x03, 0x02]);
}

#[tokio::test]
async fn concurrent_clients_are_served_independently() {
    let (addr, _store) = spawn_server(full_layout()).await;

    let mut tasks = Vec::new();
    for i in 0u16..4 {
        tasks.push(tokio::spawn(async move {
            let mut client = TcpStream::connect(addr).await.unwrap();
            for round in 0u16..8 {
                let tid = i * 100 + round;
                let value = (i + 1) * 0x1000 + round;
                let address = i; // distinct register per client
                let mut pdu = vec![0x06, 0x00, address as u8];
                pdu.extend_from_slice(&value.to_be_bytes());
                let reply = exchange(&mut client, &frame(tid, &pdu)).await;
                assert_eq!(&reply[..2], &tid.to_be_bytes());
                assert_eq!(&reply[7..8], &[0x06]);
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
}

#[tokio::test]
async fn multi_register_write_is_atomic_under_concurrency() {
    let (addr, store) = spawn_server(full_layout()).await;

    // One writer flips registers 0..4 between two patterns; readers must only
    // ever observe a complete pattern, never a mix.
    let writer = tokio::spawn({
        async move {
            let mut client = TcpStream::connect(addr).await.unwrap();
            for round in 0u16..50 {
                let v: u16 = if round % 2 == 0 { 0x1111 } else { 0x2222 };
                let mut pdu = vec![0x10, 0x00, 0x00, 0x00, 0x04, 0x08];
                for _ in 0..4 {
                    pdu.extend_from_slice(&v.to_be_bytes());
                }
                let reply = exchange(&mut client, &frame(round, &pdu)).await;
                assert_eq!(&reply[7..8], &[0x10]);
            }
        }
    });

    let reader = tokio::spawn(async move {
        let mut client = TcpStream::connect(addr).await.unwrap();
        for round in 0u16..50 {
            let reply = exchange(&mut client, &frame(0x8000 + round, &[0x03, 0x00, 0x00, 0x00, 0x04])).await;
            let words: Vec<u16> = reply[9..]
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            assert!(
                words.iter().all(|&w| w == words[0]),
                "torn read observed: {:04X?}",
                words
            );
        }
    });

    writer.await.unwrap();
    reader.await.unwrap();

    // Final state is one full pattern
    let final_regs = store
        .lock()
        .await
        .read_holding_registers(0, 4)
        .unwrap();
    assert!(final_regs.iter().all(|&w| w == final_regs[0]));
}
