//! MBAP frame codec for Modbus TCP
//!
//! Pure transformation functions between raw bytes and (header, PDU) pairs.
//! No state is kept here; framing I/O lives in the server module.
//!
//! Wire layout (big-endian):
//!
//! ```text
//! +----------------+----------------+----------------+---------+-----+
//! | Transaction ID | Protocol ID    | Length         | Unit ID | PDU |
//! | 2 bytes        | 2 bytes (== 0) | 2 bytes        | 1 byte  | ... |
//! +----------------+----------------+----------------+---------+-----+
//! ```
//!
//! The Length field counts the Unit ID plus the PDU. Any disagreement between
//! Length and the bytes actually present is treated as a malformed frame;
//! there is no tolerant recovery.

use bytes::{BufMut, BytesMut};

use crate::constants::{MAX_MBAP_LENGTH, MBAP_HEADER_LEN};
use crate::error::{ExceptionCode, ModbusError, ModbusResult};
use crate::pdu::ModbusPdu;

/// Decoded MBAP header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbapHeader {
    /// Correlation token, echoed verbatim in the reply
    pub transaction_id: u16,
    /// Must be 0 for Modbus
    pub protocol_id: u16,
    /// Byte count of unit id + PDU
    pub length: u16,
    /// Addressed unit, echoed verbatim in the reply
    pub unit_id: u8,
}

impl MbapHeader {
    /// Parse the 7 header bytes. Length consistency against the PDU bytes is
    /// checked separately by [`decode`] (or by the server's framed read).
    pub fn from_bytes(bytes: &[u8]) -> ModbusResult<Self> {
        if bytes.len() < MBAP_HEADER_LEN {
            return Err(ModbusError::frame(format!(
                "header too short: {} bytes (need {})",
                bytes.len(),
                MBAP_HEADER_LEN
            )));
        }

        let header = Self {
            transaction_id: u16::from_be_bytes([bytes[0], bytes[1]]),
            protocol_id: u16::from_be_bytes([bytes[2], bytes[3]]),
            length: u16::from_be_bytes([bytes[4], bytes[5]]),
            unit_id: bytes[6],
        };
        header.validate()?;
        Ok(header)
    }

    /// Check the header's own invariants: protocol id 0 and a Length that can
    /// hold at least a unit id + function code without exceeding the PDU cap
    pub fn validate(&self) -> ModbusResult<()> {
        if self.protocol_id != 0 {
            return Err(ModbusError::frame(format!(
                "invalid protocol id: {} (expected 0)",
                self.protocol_id
            )));
        }
        if self.length < 2 {
            return Err(ModbusError::frame(format!(
                "length field too small: {} (minimum 2)",
                self.length
            )));
        }
        if self.length as usize > MAX_MBAP_LENGTH {
            return Err(ModbusError::frame(format!(
                "length field too large: {} (maximum {})",
                self.length, MAX_MBAP_LENGTH
            )));
        }
        Ok(())
    }

    /// Number of PDU bytes that follow the header according to Length
    #[inline]
    pub fn pdu_len(&self) -> usize {
        self.length as usize - 1
    }
}

/// Decode a complete frame into its header and PDU.
///
/// Fails with [`ModbusError::Frame`] if fewer than 7 bytes are present, the
/// protocol id is non-zero, or the Length field disagrees with the bytes
/// actually present (short or surplus alike).
pub fn decode(bytes: &[u8]) -> ModbusResult<(MbapHeader, ModbusPdu)> {
    let header = MbapHeader::from_bytes(bytes)?;

    let present = bytes.len() - MBAP_HEADER_LEN;
    if present != header.pdu_len() {
        return Err(ModbusError::frame(format!(
            "length mismatch: header says {} PDU bytes, {} present",
            header.pdu_len(),
            present
        )));
    }

    let pdu = ModbusPdu::from_slice(&bytes[MBAP_HEADER_LEN..])?;
    Ok((header, pdu))
}

/// Encode a reply frame.
///
/// The Length field is recomputed from the PDU's actual size; transaction id
/// and unit id are copied unchanged from the originating request's header.
pub fn encode(header: &MbapHeader, pdu: &ModbusPdu) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(MBAP_HEADER_LEN + pdu.len());
    buf.put_u16(header.transaction_id);
    buf.put_u16(0);
    buf.put_u16(1 + pdu.len() as u16);
    buf.put_u8(header.unit_id);
    buf.put_slice(pdu.as_slice());
    buf.to_vec()
}

/// Encode an exception reply frame for the given request function code.
pub fn encode_exception(header: &MbapHeader, function: u8, code: ExceptionCode) -> Vec<u8> {
    encode(header, &ModbusPdu::exception(function, code))
}
